//! Unified path management for berth files.
//!
//! ```text
//! ~/.config/berth/             # Config directory (or $BERTH_CONFIG_DIR)
//! ├── config.toml              # Application configuration
//! ├── prompts.json             # Persisted collections, one JSON document each
//! ├── chatThreads.json
//! ├── chatMessages.json
//! ├── downloads.json
//! ├── models.json
//! └── logs/                    # Application logs
//!     └── berth.log.YYYY-MM-DD
//! ```

use std::path::{Path, PathBuf};

use berth_core::error::{BerthError, Result};

/// Environment variable overriding the config directory.
pub const CONFIG_DIR_ENV: &str = "BERTH_CONFIG_DIR";

/// Collections persisted by the durable state store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceType {
    Prompts,
    ChatThreads,
    ChatMessages,
    Downloads,
    Models,
}

impl ServiceType {
    /// Key under which the collection is stored inside its JSON document.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Prompts => "prompts",
            Self::ChatThreads => "chatThreads",
            Self::ChatMessages => "chatMessages",
            Self::Downloads => "downloads",
            Self::Models => "models",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.json", self.key())
    }
}

/// Resolves every berth path from one base directory.
#[derive(Debug, Clone)]
pub struct BerthPaths {
    base: PathBuf,
}

impl BerthPaths {
    /// Uses `base_dir` when given (tests, `--config-dir`), otherwise
    /// `$BERTH_CONFIG_DIR`, otherwise the platform config directory.
    pub fn new(base_dir: Option<&Path>) -> Result<Self> {
        let base = match base_dir {
            Some(dir) => dir.to_path_buf(),
            None => Self::default_config_dir()?,
        };
        Ok(Self { base })
    }

    fn default_config_dir() -> Result<PathBuf> {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(dir));
        }
        dirs::config_dir()
            .map(|dir| dir.join("berth"))
            .ok_or_else(|| BerthError::config("Cannot find config directory"))
    }

    pub fn config_dir(&self) -> &Path {
        &self.base
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.toml")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base.join("logs")
    }

    pub fn state_file(&self, service: ServiceType) -> PathBuf {
        self.base.join(service.file_name())
    }
}
