use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;

use crate::{
    app::Cli,
    backend::{BackendConfig, StorageConfig},
    player::PlayerConfig,
};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ComparisonConfig {
    /// Place the SQA3D answer on a random side for each task.
    pub shuffle_sides: bool,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            shuffle_sides: true,
        }
    }
}

#[derive(Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub storage: StorageConfig,
    pub player: PlayerConfig,
    pub comparison: ComparisonConfig,
}

impl Config {
    pub fn read(file: &mut impl Read) -> anyhow::Result<Self> {
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .context("Failed to read config file")?;

        let config = toml::from_str(&contents).context("Failed to parse config file")?;
        Ok(config)
    }

    pub fn read_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let mut file = File::open(path).context("Failed to open config file")?;
        Self::read(&mut file)
    }

    pub fn from_cli_args(args: &Cli) -> anyhow::Result<Self> {
        let mut config = match &args.config {
            Some(config_path) => Self::read_path(config_path)?,
            None => {
                let default_config = PathBuf::from(DEFAULT_CONFIG_PATH);
                if default_config.exists() {
                    log::info!("Using default config file {DEFAULT_CONFIG_PATH}");
                    Self::read_path(default_config)?
                } else {
                    log::warn!("No config file found; using default config");
                    Config::default()
                }
            }
        };
        if let Some(backend_url) = &args.backend_url {
            config.backend.url = backend_url.clone();
        }
        if config.backend.api_key.is_empty() {
            log::warn!("No backend API key configured; requests will be anonymous");
        }
        Ok(config)
    }
}
