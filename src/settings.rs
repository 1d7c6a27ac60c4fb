use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::hub::is_heading;
use crate::{Error, Result, SourceConfig};

/// Persisted plugin settings.
///
/// Components take a `&Settings` snapshot; live updates are done by handing out a new one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Property names hidden from the grouped view.
    #[serde(default, alias = "excludedProperties")]
    pub excluded_properties: Vec<String>,
    #[serde(default, alias = "sourcePages")]
    pub source_pages: Vec<SourceConfig>,
}

impl Settings {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).map_err(|err| Error::SettingsToml(err.to_string()))
    }

    pub fn from_json_str(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|err| Error::SettingsToml(err.to_string()))
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load settings; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "settings not found; using defaults");
                return Ok(Self::default());
            }
            Err(err) => {
                error!(path = %path.display(), error = %err, "failed to read settings");
                return Err(Error::io(path, err));
            }
        };

        let settings = if is_json(path) {
            Self::from_json_str(&text)?
        } else {
            Self::from_toml_str(&text)?
        };
        info!(
            path = %path.display(),
            source_pages = settings.source_pages.len(),
            excluded = settings.excluded_properties.len(),
            "settings loaded"
        );
        Ok(settings)
    }

    /// Validate, then write. Invalid settings are rejected before anything touches disk.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let text = if is_json(path) {
            self.to_json_string()?
        } else {
            self.to_toml_string()?
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        std::fs::write(path, text).map_err(|e| Error::io(path, e))?;
        info!(path = %path.display(), "settings saved");
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (index, cfg) in self.source_pages.iter().enumerate() {
            validate_source_config(cfg)
                .map_err(|reason| Error::InvalidSourceConfig { index, reason })?;
        }
        Ok(())
    }

    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.source_pages.iter().filter(|c| c.enabled)
    }

    pub fn excluded_set(&self) -> HashSet<String> {
        self.excluded_properties
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect()
    }

    /// Parse a comma-separated exclusion list as typed into a settings field.
    pub fn set_excluded_from_csv(&mut self, csv: &str) {
        self.excluded_properties = csv
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
    }
}

pub fn validate_source_config(cfg: &SourceConfig) -> std::result::Result<(), String> {
    if cfg.target_page.trim().is_empty() {
        return Err("target page is required".into());
    }
    let heading = cfg.target_heading.trim();
    if heading.is_empty() {
        return Err("target heading is required".into());
    }
    if !is_heading(heading) {
        return Err(format!(
            "target heading must be #s, a space and text (e.g. \"# Associated Pages\"), got {heading:?}"
        ));
    }

    for (i, c) in cfg.conditions.iter().enumerate() {
        if c.property_name.trim().is_empty() {
            return Err(format!("condition {} has no property name", i + 1));
        }
        if c.value.trim().is_empty() {
            return Err(format!("condition {} has no value", i + 1));
        }
    }

    let usable = cfg
        .effective_conditions()
        .iter()
        .filter(|c| c.is_usable() && !c.value.trim().is_empty())
        .count();
    if usable == 0 {
        return Err("at least one condition (property name and value) is required".into());
    }

    Ok(())
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}
