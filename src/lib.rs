mod condition;
mod config;
mod error;
mod groups;
pub mod hub;
mod linker;
mod parse;
mod properties;
pub mod rewrite;
mod service;
mod settings;
pub mod store;
pub mod suggest;
mod vault;

pub use crate::condition::{Combinator, Condition, Operator, SourceConfig, matches};
pub use crate::config::VaultConfig;
pub use crate::error::{Error, Result};
pub use crate::groups::{PropertyGroup, PropertyGroups, SuggestionData, ValueGroup};
pub use crate::hub::{insert_link, remove_link};
pub use crate::linker::{Linker, ReplaceReport, RuleReport, SyncReport};
pub use crate::parse::parse_properties;
pub use crate::properties::{PropertyMap, PropertyValue, is_reserved_property, normalize};
pub use crate::rewrite::{Rewrite, replace_value};
pub use crate::service::{LinkerEvent, LinkerService, SyncCause, WatchKind};
pub use crate::settings::{Settings, validate_source_config};
pub use crate::store::{MemoryStore, NoteStore};
pub use crate::vault::{Vault, VaultPath};
