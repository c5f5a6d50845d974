use arc_swap::ArcSwap;
use std::path::Path;
use std::sync::Arc;

use super::AppConfig;
use crate::error::{AppError, Result};

/// Configuration store backed by an optional TOML file
///
/// Uses `ArcSwap` for lock-free reads. Nothing is written back: calibration
/// and runtime state are deliberately not persisted.
#[derive(Clone)]
pub struct ConfigStore {
    cache: Arc<ArcSwap<AppConfig>>,
}

impl ConfigStore {
    /// Load from `path`, or use defaults when no file is given
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let text = tokio::fs::read_to_string(path).await.map_err(|e| {
                    AppError::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                Self::parse(&text)?
            }
            None => AppConfig::default(),
        };
        config.validate()?;
        Ok(Self::from_config(config))
    }

    /// Parse TOML text; missing sections fall back to defaults
    pub fn parse(text: &str) -> Result<AppConfig> {
        toml::from_str(text).map_err(|e| AppError::Config(format!("Invalid config: {}", e)))
    }

    pub fn from_config(config: AppConfig) -> Self {
        Self {
            cache: Arc::new(ArcSwap::from_pointee(config)),
        }
    }

    /// Get current configuration (lock-free, zero-copy)
    pub fn get(&self) -> Arc<AppConfig> {
        self.cache.load_full()
    }

    /// Replace the configuration after validating it
    pub fn set(&self, config: AppConfig) -> Result<()> {
        config.validate()?;
        self.cache.store(Arc::new(config));
        Ok(())
    }

    /// Apply a mutation and store the result
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = (*self.get()).clone();
        f(&mut config);
        self.set(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureSourceConfig;
    use crate::video::StreamId;
    use std::io::Write;

    #[tokio::test]
    async fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[web]
port = 8443

[teleop]
dead_zone = 0.05
reset_timeout_secs = 0

[[video.streams]]
stream = "head"
width = 320
height = 240
fps = 15
source = {{ kind = "test_pattern" }}
"#
        )
        .unwrap();

        let store = ConfigStore::load(Some(file.path())).await.unwrap();
        let cfg = store.get();
        assert_eq!(cfg.web.port, 8443);
        assert_eq!(cfg.web.bind_address, "0.0.0.0");
        assert_eq!(cfg.teleop.dead_zone, 0.05);
        assert!(cfg.teleop.reset_timeout().is_none());
        assert_eq!(cfg.video.streams.len(), 1);
        let head = cfg.video.stream(StreamId::Head).unwrap();
        assert_eq!(head.source, CaptureSourceConfig::TestPattern);
    }

    #[tokio::test]
    async fn test_invalid_values_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[teleop]\ndead_zone = 0.7").unwrap();
        assert!(matches!(
            ConfigStore::load(Some(file.path())).await,
            Err(AppError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_defaults_without_file() {
        let store = ConfigStore::load(None).await.unwrap();
        assert_eq!(store.get().video.clock_rate, 90_000);
    }

    #[test]
    fn test_update_validates() {
        let store = ConfigStore::from_config(AppConfig::default());
        assert!(store.update(|c| c.teleop.lift_min = 5.0).is_err());
        assert_eq!(store.get().teleop.lift_min, 0.0);
        store.update(|c| c.web.port = 1234).unwrap();
        assert_eq!(store.get().web.port, 1234);
    }
}
