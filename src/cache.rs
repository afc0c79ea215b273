use std::path::{Path, PathBuf};
use directories::BaseDirs;
use tracing::debug;
use crate::error::{Error, Result};

/// Placeholder in `baseDir` that is replaced by the user's home (or the configured download dir).
pub const HOME_PLACEHOLDER: &str = "$HOME";

/// Name of the directory under the base dir that holds one sub directory per version.
pub const CACHE_DIR: &str = "cache";

/// Returns the current user's home directory.
pub fn home_dir() -> Result<PathBuf> {
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine home directory",
            ))
        })
}

/// Substitutes [`HOME_PLACEHOLDER`] in a descriptor `baseDir`.
pub fn resolve_base_dir(base_dir: &str, home: &Path) -> PathBuf {
    PathBuf::from(base_dir.replace(HOME_PLACEHOLDER, &home.to_string_lossy()))
}

/// `<base>/cache/<version>`.
pub fn version_dir(base_dir: &Path, version: &str) -> PathBuf {
    base_dir.join(CACHE_DIR).join(version)
}

/// `<base>/cache/<version>/<command>`: where a provisioned command lives.
///
/// The existence of this file is the only record that a tool is provisioned.
pub fn command_path(base_dir: &Path, version: &str, cmd_file_name: &str) -> PathBuf {
    version_dir(base_dir, version).join(cmd_file_name)
}

/// Where the artifact is downloaded to: next to the command.
pub fn download_path(command_path: &Path, dl_file_name: &str) -> PathBuf {
    match command_path.parent() {
        Some(parent) => parent.join(dl_file_name),
        None => PathBuf::from(dl_file_name),
    }
}

/// Whether the command is already in the cache.
pub fn is_cached(command_path: &Path) -> bool {
    command_path.exists()
}

/// Removes the cached files of one tool version.
///
/// Returns `false` if nothing was cached.
pub fn remove_cached_version(base_dir: &Path, version: &str) -> Result<bool> {
    let dir = version_dir(base_dir, version);
    if !dir.exists() {
        return Ok(false);
    }
    std::fs::remove_dir_all(&dir)?;
    debug!(path = %dir.display(), "Removed cached version");
    Ok(true)
}
