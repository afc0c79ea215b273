use std::fmt;
use crate::descriptor::{Platform, Tool};
use crate::error::{Error, Result};

/// Operating systems a descriptor can list downloads for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsId {
    /// Windows, platform key `win`.
    Win,
    /// macOS, platform key `osx`.
    Osx,
    /// Linux, platform key `lnx`.
    Lnx,
}

impl OsId {
    /// Maps a `std::env::consts::OS` value.
    ///
    /// # Errors
    ///
    /// Any other operating system is [`Error::UnsupportedOperatingSystem`]: no platform entry
    /// could ever match it.
    pub fn from_os(os: &str) -> Result<OsId> {
        match os {
            "windows" => Ok(OsId::Win),
            "macos" => Ok(OsId::Osx),
            "linux" => Ok(OsId::Lnx),
            other => Err(Error::UnsupportedOperatingSystem(other.to_string())),
        }
    }

    /// The platform key prefix.
    pub fn key(&self) -> &'static str {
        match self {
            OsId::Win => "win",
            OsId::Osx => "osx",
            OsId::Lnx => "lnx",
        }
    }
}

impl fmt::Display for OsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// The operating system and CPU architecture downloads are resolved for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPlatform {
    /// Operating system.
    pub os: OsId,
    /// CPU architecture as used in platform keys (`amd64`, `arm64`, `386`, ...).
    pub arch: String,
}

impl HostPlatform {
    pub fn new(os: OsId, arch: impl Into<String>) -> Self {
        Self {
            os,
            arch: arch.into(),
        }
    }

    /// Detects the running host.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedOperatingSystem`] off Windows, macOS and Linux.
    pub fn current() -> Result<HostPlatform> {
        let os = OsId::from_os(std::env::consts::OS)?;
        Ok(HostPlatform::new(os, normalize_arch(std::env::consts::ARCH)))
    }

    /// The `<os>-<arch>` key.
    pub fn qualified_key(&self) -> String {
        format!("{}-{}", self.os.key(), self.arch)
    }
}

impl fmt::Display for HostPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

/// Maps Rust architecture names to the names release artifacts use.
pub fn normalize_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    }
}

/// Resolves the download entry for `host`.
///
/// The `<os>-<arch>` key wins over the plain `<os>` key.
///
/// # Errors
///
/// Returns [`Error::UnsupportedPlatform`] if neither key is present.
pub fn resolve_platform<'a>(tool_name: &str, tool: &'a Tool, host: &HostPlatform) -> Result<&'a Platform> {
    let qualified = host.qualified_key();
    tool.platforms
        .get(&qualified)
        .or_else(|| tool.platforms.get(host.os.key()))
        .ok_or(Error::UnsupportedPlatform {
            tool: tool_name.to_string(),
            platform: qualified,
        })
}
