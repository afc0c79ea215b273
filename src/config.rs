use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{anyhow, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use crate::cache::home_dir;

/// Environment variable that overrides the `$HOME` replacement when the config leaves it unset.
pub const DOWNLOAD_DIR_ENV: &str = "TOOLPIN_DOWNLOAD_DIR";

/// How acquisitions are executed.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Run on the worker pool; `acquire` returns immediately.
    #[default]
    Background,
    /// Run on the calling thread, never ask for approval.
    Headless,
}

/// Settings of a [`Provisioner`](crate::Provisioner), usually read from `toolpin.toml`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ProvisionerConfig {
    /// Replaces `$HOME` in descriptor base dirs.
    pub download_dir: Option<PathBuf>,
    /// Maximum number of acquisitions running at once.
    pub workers: usize,
    pub mode: Mode,
    /// Re-verify the retained download of a cached tool on every acquisition.
    pub verify_cached: bool,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            download_dir: None,
            workers: 4,
            mode: Mode::Background,
            verify_cached: false,
            connect_timeout_secs: 30,
            user_agent: format!("toolpin/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ProvisionerConfig {
    /// A configuration that runs everything on the calling thread.
    pub fn headless() -> Self {
        Self {
            mode: Mode::Headless,
            ..Self::default()
        }
    }

    /// Loads a configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file can't be read or deserialized.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ProvisionerConfig> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| e.into())
    }

    /// Loads `path` if it exists, the defaults otherwise.
    ///
    /// # Errors
    /// Returns an error if the file exists but is invalid.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<ProvisionerConfig> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Saves the configuration in pretty TOML format.
    ///
    /// # Errors
    /// Returns an error if the file can't be written or serialization fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// `<config dir>/toolpin.toml`.
    pub fn default_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("org", "toolpin", "toolpin")
            .ok_or_else(|| anyhow!("Could not get project directories"))?;
        Ok(dirs.config_dir().join("toolpin.toml"))
    }

    /// What `$HOME` in a descriptor base dir stands for.
    ///
    /// The configured download dir wins, then [`DOWNLOAD_DIR_ENV`], then the user's home.
    pub fn home_replacement(&self) -> crate::Result<PathBuf> {
        if let Some(dir) = &self.download_dir {
            return Ok(dir.clone());
        }
        match std::env::var_os(DOWNLOAD_DIR_ENV) {
            Some(dir) if !dir.is_empty() => Ok(PathBuf::from(dir)),
            _ => home_dir(),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
