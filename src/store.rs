use std::collections::BTreeMap;
use std::sync::Mutex;

use tracing::warn;

use crate::parse::parse_properties;
use crate::{Error, PropertyMap, Result, Vault, VaultPath};

/// Where notes live. The linker only ever talks to this trait.
pub trait NoteStore {
    /// All notes, in the order bulk operations should visit them.
    fn list_notes(&self) -> Result<Vec<VaultPath>>;

    fn exists(&self, path: &VaultPath) -> bool;

    fn read_text(&self, path: &VaultPath) -> Result<String>;

    fn write_text(&self, path: &VaultPath, text: &str) -> Result<()>;

    /// Create a new note. Fails if one already exists at `path`.
    fn create_note(&self, path: &VaultPath, text: &str) -> Result<()>;

    /// Header-block properties; `None` when the note has no header block.
    fn properties(&self, path: &VaultPath) -> Result<Option<PropertyMap>> {
        let text = self.read_text(path)?;
        parse_properties(&text)
    }

    /// Every note with its properties. Notes whose header block cannot be read or parsed
    /// are logged and listed without properties.
    fn snapshot(&self) -> Result<Vec<(VaultPath, Option<PropertyMap>)>> {
        let mut out = Vec::new();
        for path in self.list_notes()? {
            let props = match self.properties(&path) {
                Ok(props) => props,
                Err(err) => {
                    warn!(path = %path.as_str_lossy(), error = %err, "ignoring note properties");
                    None
                }
            };
            out.push((path, props));
        }
        Ok(out)
    }
}

impl NoteStore for Vault {
    fn list_notes(&self) -> Result<Vec<VaultPath>> {
        Ok(self.note_paths())
    }

    fn exists(&self, path: &VaultPath) -> bool {
        self.to_abs(path).is_file()
    }

    fn read_text(&self, path: &VaultPath) -> Result<String> {
        let abs = self.to_abs(path);
        std::fs::read_to_string(&abs).map_err(|e| Error::io(&abs, e))
    }

    fn write_text(&self, path: &VaultPath, text: &str) -> Result<()> {
        let abs = self.to_abs(path);
        std::fs::write(&abs, text).map_err(|e| Error::io(&abs, e))
    }

    fn create_note(&self, path: &VaultPath, text: &str) -> Result<()> {
        let abs = self.to_abs(path);
        if abs.exists() {
            return Err(Error::NoteAlreadyExists(path.clone()));
        }
        if let Some(parent) = abs.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        std::fs::write(&abs, text).map_err(|e| Error::io(&abs, e))
    }
}

/// In-memory notes, for embedding hosts that own storage themselves and for tests.
///
/// Counts writes so callers can check that unchanged notes were left alone.
#[derive(Debug, Default)]
pub struct MemoryStore {
    notes: Mutex<BTreeMap<VaultPath, String>>,
    writes: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, text: impl Into<String>) -> Result<VaultPath> {
        let path = VaultPath::try_from(path)?;
        let mut notes = self.notes.lock().unwrap_or_else(|e| e.into_inner());
        notes.insert(path.clone(), text.into());
        Ok(path)
    }

    pub fn remove(&self, path: &VaultPath) -> Option<String> {
        let mut notes = self.notes.lock().unwrap_or_else(|e| e.into_inner());
        notes.remove(path)
    }

    pub fn text(&self, path: &str) -> Option<String> {
        let path = VaultPath::try_from(path).ok()?;
        let notes = self.notes.lock().unwrap_or_else(|e| e.into_inner());
        notes.get(&path).cloned()
    }

    pub fn write_count(&self) -> usize {
        *self.writes.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn bump_writes(&self) {
        *self.writes.lock().unwrap_or_else(|e| e.into_inner()) += 1;
    }
}

impl NoteStore for MemoryStore {
    fn list_notes(&self) -> Result<Vec<VaultPath>> {
        let notes = self.notes.lock().unwrap_or_else(|e| e.into_inner());
        Ok(notes.keys().cloned().collect())
    }

    fn exists(&self, path: &VaultPath) -> bool {
        let notes = self.notes.lock().unwrap_or_else(|e| e.into_inner());
        notes.contains_key(path)
    }

    fn read_text(&self, path: &VaultPath) -> Result<String> {
        let notes = self.notes.lock().unwrap_or_else(|e| e.into_inner());
        notes
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NoteNotFound(path.clone()))
    }

    fn write_text(&self, path: &VaultPath, text: &str) -> Result<()> {
        {
            let mut notes = self.notes.lock().unwrap_or_else(|e| e.into_inner());
            let Some(slot) = notes.get_mut(path) else {
                return Err(Error::NoteNotFound(path.clone()));
            };
            *slot = text.to_string();
        }
        self.bump_writes();
        Ok(())
    }

    fn create_note(&self, path: &VaultPath, text: &str) -> Result<()> {
        {
            let mut notes = self.notes.lock().unwrap_or_else(|e| e.into_inner());
            if notes.contains_key(path) {
                return Err(Error::NoteAlreadyExists(path.clone()));
            }
            notes.insert(path.clone(), text.to_string());
        }
        self.bump_writes();
        Ok(())
    }
}
