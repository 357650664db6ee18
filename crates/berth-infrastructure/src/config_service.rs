//! Configuration service backed by `<config_dir>/config.toml`.

use std::path::Path;
use std::sync::{PoisonError, RwLock};

use berth_core::config::{ConfigProvider, RootConfig};
use berth_core::error::Result;

use crate::paths::BerthPaths;
use crate::storage::AtomicTomlFile;

/// Loads and caches the root configuration.
///
/// The file is created with defaults on first access. Writes go through
/// [`AtomicTomlFile::update`] so they are locked and atomic.
pub struct ConfigService {
    paths: BerthPaths,
    file: AtomicTomlFile<RootConfig>,
    cache: RwLock<Option<RootConfig>>,
}

impl ConfigService {
    pub fn new(paths: BerthPaths) -> Self {
        let file = AtomicTomlFile::new(paths.config_file());
        Self {
            paths,
            file,
            cache: RwLock::new(None),
        }
    }

    pub fn paths(&self) -> &BerthPaths {
        &self.paths
    }

    /// Forces a reload on next access.
    pub fn invalidate_cache(&self) {
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Persists the default model id and refreshes the cache.
    pub fn set_current_model_id(&self, model_id: Option<String>) -> Result<()> {
        let updated = self.file.update(RootConfig::default(), |config| {
            config.model.current_model_id = model_id.filter(|id| !id.is_empty());
            Ok(())
        })?;
        tracing::info!(
            model_id = ?updated.model.current_model_id,
            "[ConfigService] Default model updated"
        );
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = Some(updated);
        Ok(())
    }

    fn load_config(&self) -> Result<RootConfig> {
        match self.file.load()? {
            Some(config) => Ok(config),
            None => {
                let config = RootConfig::default();
                self.file.save(&config)?;
                tracing::info!(
                    path = %self.file.path().display(),
                    "[ConfigService] Created default configuration"
                );
                Ok(config)
            }
        }
    }
}

impl ConfigProvider for ConfigService {
    fn get_config(&self) -> Result<RootConfig> {
        if let Some(cached) = self.cache.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            return Ok(cached.clone());
        }

        let loaded = self.load_config()?;
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = Some(loaded.clone());
        Ok(loaded)
    }

    fn config_directory(&self) -> &Path {
        self.paths.config_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn service(dir: &TempDir) -> ConfigService {
        ConfigService::new(BerthPaths::new(Some(dir.path())).unwrap())
    }

    #[test]
    fn test_creates_default_config() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir);

        let config = service.get_config().unwrap();

        assert_eq!(config, RootConfig::default());
        assert!(temp_dir.path().join("config.toml").exists());
        assert_eq!(service.config_directory(), temp_dir.path());
    }

    #[test]
    fn test_reads_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join("config.toml"),
            "[model]\ncurrent_model_id = \"mistral\"\nhost_port = 9000\n",
        )
        .unwrap();

        let service = service(&temp_dir);
        assert_eq!(service.current_model_id().unwrap().as_deref(), Some("mistral"));
        assert_eq!(service.get_config().unwrap().model.host_port, 9000);
    }

    #[test]
    fn test_set_current_model_id_persists() {
        let temp_dir = TempDir::new().unwrap();
        service(&temp_dir).set_current_model_id(Some("m1".into())).unwrap();

        let fresh = service(&temp_dir);
        assert_eq!(fresh.current_model_id().unwrap().as_deref(), Some("m1"));
    }

    #[test]
    fn test_cache_survives_until_invalidated() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir);
        service.get_config().unwrap();

        std::fs::write(temp_dir.path().join("config.toml"), "[queue]\nmax_tokens = 7\n").unwrap();
        assert_eq!(service.get_config().unwrap().queue.max_tokens, 4096);

        service.invalidate_cache();
        assert_eq!(service.get_config().unwrap().queue.max_tokens, 7);
    }
}
