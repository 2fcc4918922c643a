//! Layered configuration: CLI flags override a config file, which overrides
//! environment variables, which override built-in defaults.
//! Mirrors the `config`-crate builder pattern the rest of this dependency
//! stack uses for its own settings file.

use std::env;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use color_eyre::eyre::Result;
use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::Deserialize;

pub static PROJECT_NAME: LazyLock<String> =
    LazyLock::new(|| env!("CARGO_CRATE_NAME").to_uppercase());

pub static CONFIG_FOLDER: LazyLock<Option<PathBuf>> = LazyLock::new(|| {
    env::var(format!("{}_CONFIG", &*PROJECT_NAME)).ok().map(PathBuf::from)
});

fn project_directory() -> Option<ProjectDirs> {
    ProjectDirs::from("io", "ringcopy", env!("CARGO_PKG_NAME"))
}

pub(crate) fn get_config_dir() -> PathBuf {
    if let Some(s) = CONFIG_FOLDER.clone() {
        s
    } else if let Some(proj_dirs) = project_directory() {
        proj_dirs.config_local_dir().to_path_buf()
    } else {
        PathBuf::from(".").join(".config")
    }
}

/// Non-CLI defaults, layered underneath whatever the command line sets
/// explicitly. Nothing here is read by the core driver loop itself; it only
/// shapes the demonstration tasks and the checkpoint cadence.
#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    #[serde(default = "default_checkpoint_interval_secs")]
    pub checkpoint_interval_secs: u64,
    #[serde(default)]
    pub checksum: bool,
    #[serde(default)]
    pub preserve: bool,
    #[serde(default = "default_fd_cache_size")]
    pub fd_cache_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: false,
            chunk_size: default_chunk_size(),
            checkpoint_interval_secs: default_checkpoint_interval_secs(),
            checksum: false,
            preserve: false,
            fd_cache_size: default_fd_cache_size(),
        }
    }
}

fn default_chunk_size() -> u64 {
    1024 * 1024
}

fn default_checkpoint_interval_secs() -> u64 {
    30
}

fn default_fd_cache_size() -> usize {
    64
}

impl Settings {
    pub fn load() -> Result<Self> {
        let builder = Config::builder()
            .add_source(File::from(get_config_dir().join("config")).required(false))
            .add_source(
                Environment::with_prefix(&PROJECT_NAME).separator("__").prefix_separator("_"),
            );
        let config = builder.build()?;
        Ok(config.try_deserialize().unwrap_or_default())
    }

    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval_secs)
    }
}
