use std::path::PathBuf;

use crate::VaultPath;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("vault root does not exist: {0}")]
    VaultNotFound(PathBuf),

    #[error("invalid vault path: {0}")]
    InvalidVaultPath(String),

    #[error("path is outside vault: {0}")]
    PathOutsideVault(PathBuf),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("frontmatter yaml parse error: {0}")]
    FrontmatterYaml(#[from] serde_yaml::Error),

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("settings toml error: {0}")]
    SettingsToml(String),

    #[error("settings json error: {0}")]
    SettingsJson(#[from] serde_json::Error),

    #[error("source page #{index} is invalid: {reason}")]
    InvalidSourceConfig { index: usize, reason: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("hub page could not be resolved after creation: {}", .0.as_str_lossy())]
    HubPageMissing(VaultPath),

    #[error("note already exists: {}", .0.as_str_lossy())]
    NoteAlreadyExists(VaultPath),

    #[error("note not found: {}", .0.as_str_lossy())]
    NoteNotFound(VaultPath),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
