use std::fs::read_to_string;
use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::controllers::Controllers;
use crate::error::Error;
use crate::general::General;
use crate::node::NodeConfig;
use crate::storage::StorageConfig;

/// The fully assembled, file-loaded bootstrap configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub node: NodeConfig,
    pub controllers: Controllers,
    pub general: General,
    pub storage: StorageConfig,
}

impl Config {
    /// Load from a TOML file on disk, falling back to defaults if the
    /// file doesn't exist.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let config: Config = if let Ok(contents) = read_to_string(path) {
            let config = toml::from_str(&contents).map_err(|source| Error::Toml {
                path: path.display().to_string(),
                source,
            })?;
            info!("loaded \"{}\"", path.display());
            config
        } else {
            warn!(
                "\"{}\" doesn't exist, loading defaults instead",
                path.display()
            );
            Config::default()
        };

        config.check()?;
        Ok(config)
    }

    pub fn check(&self) -> Result<(), Error> {
        if self.node.node_id > 1023 {
            return Err(Error::NodeIdTooLarge(self.node.node_id));
        }
        Ok(())
    }
}

static CONFIG: Lazy<ArcSwap<Config>> = Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// Current process-wide configuration snapshot.
pub fn config() -> Arc<Config> {
    CONFIG.load().clone()
}

/// Load configuration from disk and install it as current.
pub fn load(path: &Path) -> Result<Arc<Config>, Error> {
    let config = Config::load(path)?;
    set(config)
}

/// Install a configuration as current, after validating it.
pub fn set(config: Config) -> Result<Arc<Config>, Error> {
    config.check()?;
    let config = Arc::new(config);
    CONFIG.store(config.clone());
    Ok(config)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_serializable() {
        let config = Config::default();
        toml::to_string(&config).unwrap();
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = Config::load(Path::new("/nonexistent/sdb.toml")).unwrap();
        assert_eq!(config.node.node_id, 0);
    }

    #[test]
    fn test_load_from_disk() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[node]\nnode_id = 5\n").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.node.node_id, 5);
    }

    #[test]
    fn test_rejects_node_id_too_large() {
        let mut config = Config::default();
        config.node.node_id = 2000;
        assert!(matches!(config.check(), Err(Error::NodeIdTooLarge(2000))));
    }

    #[test]
    fn test_set_and_get_roundtrip() {
        let mut config = Config::default();
        config.node.node_id = 7;
        set(config).unwrap();
        assert_eq!(config().node.node_id, 7);
    }
}
