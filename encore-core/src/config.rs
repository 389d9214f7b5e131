use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::locale::Locale;
use crate::model::ModelVariant;

/// How to invoke the external stem separator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparatorConfig {
    pub interpreter: PathBuf,
    pub module: String,
    pub model: String,
}

impl Default for SeparatorConfig {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from("python3"),
            module: "demucs.separate".into(),
            model: "htdemucs_6s".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    pub sessions_root: PathBuf,
    pub models_dir: PathBuf,
    pub separator: SeparatorConfig,
    pub default_model: ModelVariant,
    pub default_duration: u32,
    pub locale: Locale,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            sessions_root: PathBuf::from("Sessions"),
            models_dir: default_models_dir(),
            separator: SeparatorConfig::default(),
            default_model: ModelVariant::Small,
            default_duration: 10,
            locale: Locale::English,
        }
    }
}

fn default_models_dir() -> PathBuf {
    let mut path = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("encore");
    path.push("models");
    path
}

pub fn config_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("encore");
    path.push("config.json");
    path
}

/// Load the user config, falling back to defaults when it is missing or
/// does not parse.
pub fn load_config() -> StudioConfig {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &Path) -> StudioConfig {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
            log::warn!("ignoring malformed config {}: {}", path.display(), e);
            StudioConfig::default()
        }),
        Err(_) => StudioConfig::default(),
    }
}

pub fn save_config(config: &StudioConfig) -> Result<()> {
    save_config_to(config, &config_path())
}

pub fn save_config_to(config: &StudioConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(config)?)?;
    Ok(())
}
