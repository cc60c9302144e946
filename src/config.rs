use directories_next::ProjectDirs;
use r4300_core::CpuConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::fs;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to find config directory")]
    ConfigDir,

    #[error("Failed to load config file: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to serialize config file: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to deserialize config file: {0}")]
    Deserialize(#[from] toml::de::Error),
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("No image given in the config file")]
    NoImage,

    #[error("Failed to read image '{}': {1}", .0.display())]
    Image(PathBuf, #[source] io::Error),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Raw big endian code image.
    pub image: PathBuf,
    /// Physical address in RDRAM where the image is copied to.
    pub load_address: u32,
    /// Virtual address where execution starts.
    pub entry: u32,
    /// Give up after this many instructions.
    pub max_steps: u64,
    /// Filter passed to the logger. `RUST_LOG` takes precedence.
    pub log_level: String,
    /// Stop right after an instruction at one of these virtual addresses has run.
    pub breakpoints: Vec<u32>,
    pub cpu: CpuConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            image: PathBuf::new(),
            load_address: 0x1000,
            entry: 0x8000_1000,
            max_steps: 10_000_000,
            log_level: String::from("info"),
            breakpoints: Vec::new(),
            cpu: CpuConfig::default(),
        }
    }
}

impl Config {
    /// The config file in the users config directory.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let project = ProjectDirs::from("r4300", "", "")
            .ok_or(ConfigError::ConfigDir)?;
        Ok(project.config_dir().join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Ok(toml::from_str(&fs::read_to_string(path)?)?)
    }

    /// Load the config file at `path`. If there is none, a default config file is written there
    /// first.
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::load(path);
        }
        let config = Self::default();
        config.store(path)?;
        Ok(config)
    }

    pub fn store(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let string = toml::to_string_pretty(self)?;
        Ok(file.write_all(string.as_bytes())?)
    }
}
