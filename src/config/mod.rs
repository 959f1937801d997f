//! Loader settings
//!
//! Settings come from three layers, later layers overriding earlier ones:
//! 1. Built-in defaults
//! 2. A TOML settings file (`observer-setup.toml` by default)
//! 3. Command-line overrides

mod defaults;

pub use defaults::{CONFIG_FILE, LOG_FILTER, WORKSPACE_PREFIX};

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Settings errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("cannot render settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Where workspaces are created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Parent directory of workspaces; the system temp directory when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,

    /// Prefix of workspace directory names
    pub prefix: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            prefix: WORKSPACE_PREFIX.to_string(),
        }
    }
}

impl WorkspaceConfig {
    /// Workspace configuration rooted at `base_dir`.
    pub fn in_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
            ..Self::default()
        }
    }

    /// Directory under which workspaces are created.
    pub fn base_dir(&self) -> PathBuf {
        self.base_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Logging settings of the command-line tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: LOG_FILTER.to_string(),
        }
    }
}

/// Complete settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupConfig {
    pub workspace: WorkspaceConfig,
    pub logging: LoggingConfig,
}

impl SetupConfig {
    /// Parse settings from TOML text. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load settings from a file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Load `path` when given, otherwise [`CONFIG_FILE`] when it exists,
    /// otherwise the defaults.
    ///
    /// An explicitly given file must exist.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = Path::new(CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Apply command-line overrides.
    pub fn with_workspace_dir(mut self, base_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = base_dir {
            self.workspace.base_dir = Some(dir);
        }
        self
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let prefix = &self.workspace.prefix;
        if prefix.contains('/') || prefix.contains('\\') || prefix == "." || prefix == ".." {
            return Err(ConfigError::Validation(format!(
                "workspace.prefix must be a plain file name prefix, got {:?}",
                prefix
            )));
        }
        if self.logging.filter.trim().is_empty() {
            return Err(ConfigError::Validation(
                "logging.filter must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
