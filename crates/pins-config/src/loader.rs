use std::path::Path;

use pins_common::{Error, Result};
use tracing::{debug, info};

use crate::model::MigratorConfig;

/// Reads `MigratorConfig` from YAML or TOML files.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate the config at `path`. The format is picked from the
    /// file extension.
    pub fn load(path: &Path) -> Result<MigratorConfig> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::io("failed to read config file", path, e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let config: MigratorConfig = match ext {
            "yml" | "yaml" => serde_yaml::from_str(&contents)
                .map_err(|e| Error::Config(format!("YAML parse error: {e}")))?,
            "toml" => toml::from_str(&contents)
                .map_err(|e| Error::Config(format!("TOML parse error: {e}")))?,
            other => {
                return Err(Error::Config(format!(
                    "unsupported config extension: {other}"
                )));
            }
        };

        config.validate()?;
        info!("config loaded from {}", path.display());
        Ok(config)
    }

    /// Load from `path` when given, otherwise fall back to the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<MigratorConfig> {
        match path {
            Some(path) => Self::load(path),
            None => {
                debug!("no config file given, using defaults");
                Ok(MigratorConfig::default())
            }
        }
    }
}
