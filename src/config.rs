use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Directory names to ignore anywhere in the path.
    pub ignore_dirs: Vec<String>,
    /// File extensions (without dot) that are considered notes.
    pub note_extensions: Vec<String>,
    /// Debounce window for filesystem events.
    pub watch_debounce: Duration,
    /// Settings file path (relative to vault root). A `.json` extension selects JSON.
    pub settings_path: PathBuf,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            ignore_dirs: vec![
                ".obsidian".into(),
                ".git".into(),
                ".trash".into(),
                "node_modules".into(),
                "target".into(),
            ],
            note_extensions: vec!["md".into()],
            watch_debounce: Duration::from_millis(400),
            settings_path: PathBuf::from(".obsidian/propgroups/settings.toml"),
        }
    }
}
