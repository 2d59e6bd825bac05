//! Per-project defaults read from `ef-migrations.toml`

use crate::error::{MigrateError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const SETTINGS_FILE: &str = "ef-migrations.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub assembly_name: Option<String>,

    #[serde(default)]
    pub bin_folder: Option<PathBuf>,

    #[serde(default)]
    pub config_path: Option<PathBuf>,

    #[serde(default)]
    pub connection_name: Option<String>,

    #[serde(default)]
    pub merge_config: bool,

    #[serde(default)]
    pub engine: Option<EngineCommand>,
}

/// External program that answers scaffolding requests
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineCommand {
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,
}

impl Settings {
    /// Load settings from the project root; a missing file yields defaults
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(SETTINGS_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        log::debug!("Loading settings from: {}", path.display());
        let content = fs::read_to_string(&path)?;
        Self::from_toml(&content).map_err(|message| MigrateError::Settings { path, message })
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }
}
