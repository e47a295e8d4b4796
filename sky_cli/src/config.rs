use std::path::{Path, PathBuf};

use anyhow::Context;
use directories::ProjectDirs;
use sky_registry::ClientConfig;

pub const CONFIG_FILE_NAME: &str = "config.toml";

pub fn default_config_file(dirs: &ProjectDirs) -> PathBuf {
    dirs.config_dir().join(CONFIG_FILE_NAME)
}

/// Command line flags that replace single config fields.
#[derive(Debug, Default)]
pub struct Overrides {
    pub portal_url: Option<String>,
    pub api_key: Option<String>,
}

impl Overrides {
    pub fn apply(self, config: &mut ClientConfig) {
        if let Some(portal_url) = self.portal_url {
            config.portal_url = portal_url;
        }
        if let Some(api_key) = self.api_key {
            config.api_key = Some(api_key);
        }
    }
}

/// Reads the config file, falling back to defaults if it does not exist, and
/// validates the result after applying `overrides`.
pub fn load_config(path: &Path, overrides: Overrides) -> anyhow::Result<ClientConfig> {
    let mut config = if path.exists() {
        let toml_content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&toml_content)
            .with_context(|| format!("could not parse config file {}", path.display()))?
    } else {
        ClientConfig::default()
    };
    overrides.apply(&mut config);
    config.validate().context("invalid client config")?;
    Ok(config)
}
