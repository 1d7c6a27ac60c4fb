use std::path::{Component, Path, PathBuf};

use crate::{Error, Result, VaultConfig};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VaultPath(PathBuf);

impl VaultPath {
    /// Path of the note a wiki-style page name refers to (`Projects/X` -> `Projects/X.md`).
    pub fn from_page_name(name: &str) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidVaultPath("empty page name".into()));
        }
        Self::try_from(Path::new(&format!("{name}.md")))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Slash-separated form regardless of platform.
    pub fn as_str_lossy(&self) -> String {
        let parts: Vec<String> = self
            .0
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect();
        parts.join("/")
    }

    /// Slash-separated path with the final extension removed; this is the wiki link target.
    pub fn link_target(&self) -> String {
        let s = self.as_str_lossy();
        match self.0.extension().and_then(|e| e.to_str()) {
            Some(ext) => s[..s.len() - ext.len() - 1].to_string(),
            None => s,
        }
    }

    pub fn basename(&self) -> String {
        self.0
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

impl TryFrom<&Path> for VaultPath {
    type Error = Error;

    fn try_from(value: &Path) -> Result<Self> {
        if value.as_os_str().is_empty() {
            return Err(Error::InvalidVaultPath("empty path".into()));
        }
        if value.is_absolute() {
            return Err(Error::InvalidVaultPath(
                "absolute paths are not allowed".into(),
            ));
        }

        let mut cleaned = PathBuf::new();
        for c in value.components() {
            match c {
                Component::Prefix(_) | Component::RootDir => {
                    return Err(Error::InvalidVaultPath(
                        "absolute paths are not allowed".into(),
                    ));
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(Error::InvalidVaultPath(
                        "path traversal is not allowed".into(),
                    ));
                }
                Component::Normal(part) => cleaned.push(part),
            }
        }

        if cleaned.as_os_str().is_empty() {
            return Err(Error::InvalidVaultPath("empty path".into()));
        }

        Ok(Self(cleaned))
    }
}

impl TryFrom<&str> for VaultPath {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::try_from(Path::new(value))
    }
}

#[derive(Debug, Clone)]
pub struct Vault {
    root: PathBuf,
    cfg: VaultConfig,
}

impl Vault {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        Self::with_config(root, VaultConfig::default())
    }

    pub fn with_config(root: impl Into<PathBuf>, cfg: VaultConfig) -> Result<Self> {
        let root = root.into();
        if !root.exists() {
            return Err(Error::VaultNotFound(root));
        }
        let root = std::fs::canonicalize(&root).map_err(|e| Error::io(&root, e))?;
        Ok(Self { root, cfg })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &VaultConfig {
        &self.cfg
    }

    pub fn settings_path(&self) -> PathBuf {
        self.root.join(&self.cfg.settings_path)
    }

    pub fn to_abs(&self, rel: &VaultPath) -> PathBuf {
        self.root.join(rel.as_path())
    }

    pub fn to_rel(&self, abs: &Path) -> Result<VaultPath> {
        let abs = if abs.is_absolute() {
            abs.to_path_buf()
        } else {
            self.root.join(abs)
        };

        // Removed files can no longer be canonicalized; fall back to the parent.
        let abs = match std::fs::canonicalize(&abs) {
            Ok(p) => p,
            Err(_) => match (abs.parent(), abs.file_name()) {
                (Some(parent), Some(name)) => std::fs::canonicalize(parent)
                    .map(|p| p.join(name))
                    .unwrap_or(abs.clone()),
                _ => abs,
            },
        };
        if !abs.starts_with(&self.root) {
            return Err(Error::PathOutsideVault(abs));
        }
        let rel = abs
            .strip_prefix(&self.root)
            .map_err(|_| Error::PathOutsideVault(abs.clone()))?;
        VaultPath::try_from(rel)
    }

    pub fn is_ignored_rel(&self, rel: &Path) -> bool {
        rel.components().any(|c| {
            let Component::Normal(part) = c else {
                return false;
            };
            let s = part.to_string_lossy();
            self.cfg.ignore_dirs.iter().any(|d| d == &s)
        })
    }

    /// Whether a relative path names a note this crate reads and patches.
    pub fn is_note_rel(&self, rel: &Path) -> bool {
        if self.is_ignored_rel(rel) || rel.as_os_str().is_empty() {
            return false;
        }
        let file_name = rel.file_name().and_then(|s| s.to_str()).unwrap_or("");
        if file_name.starts_with('.') {
            return false;
        }
        let Some(ext) = rel.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        self.cfg
            .note_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
    }

    /// All notes in the vault, in a stable (sorted) enumeration order.
    pub fn note_paths(&self) -> Vec<VaultPath> {
        let mut out = Vec::new();
        for entry in walkdir::WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            if !self.is_note_rel(rel) {
                continue;
            }
            if let Ok(p) = VaultPath::try_from(rel) {
                out.push(p);
            }
        }
        out
    }
}
