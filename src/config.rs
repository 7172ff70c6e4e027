use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const CONFIG_DIR_NAME: &str = ".filedeck";
const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot access settings: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid settings file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Home directory not found")]
    NoHomeDir,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Browsing root; the home directory when unset
    pub start_path: Option<PathBuf>,
    pub sort_by: String,
    pub sort_order: String,
    /// Extensions opened by the text screen
    pub text_extensions: Vec<String>,
    /// Default log filter when RUST_LOG is not set
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            start_path: None,
            sort_by: "name".to_string(),
            sort_order: "asc".to_string(),
            text_extensions: ["txt", "log", "json", "xml", "csv"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// ~/.filedeck
    pub fn config_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(CONFIG_DIR_NAME))
    }

    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join(SETTINGS_FILE_NAME))
    }

    /// Load settings, falling back to defaults on any error.
    /// The error is handed back so it can be logged once logging is up.
    pub fn load() -> (Self, Option<ConfigError>) {
        match Self::config_path() {
            Some(path) => Self::load_or_default(&path),
            None => (Self::default(), None),
        }
    }

    pub fn load_or_default(path: &Path) -> (Self, Option<ConfigError>) {
        match Self::load_from(path) {
            Ok(settings) => (settings, None),
            Err(e) => (Self::default(), Some(e)),
        }
    }

    /// A missing file is not an error: it yields the defaults
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path().ok_or(ConfigError::NoHomeDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn start_path(&self) -> PathBuf {
        self.start_path
            .clone()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("/"))
    }
}
