//! Error types for tool provisioning.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for provisioning operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while acquiring a tool.
///
/// Every error returned by [`Provisioner::acquire`](crate::Provisioner::acquire) is wrapped
/// in [`Error::Tool`]; use [`Error::root`] to match on the underlying cause.
#[derive(Error, Debug)]
pub enum Error {
    /// The descriptor could not be fetched or parsed.
    #[error("Could not load tools descriptor at {location}: {message}")]
    Descriptor {
        /// URL or path of the descriptor.
        location: String,
        /// Error message.
        message: String,
    },

    /// The descriptor does not list the requested tool.
    #[error("Tool '{tool}' not found in descriptor {location}")]
    UnknownTool {
        /// The requested tool.
        tool: String,
        /// URL or path of the descriptor.
        location: String,
    },

    /// No platform entry matches the host.
    #[error("Tool '{tool}' has no download for platform '{platform}'")]
    UnsupportedPlatform {
        /// The tool name.
        tool: String,
        /// The most specific platform key that was looked up.
        platform: String,
    },

    /// The host operating system is neither Windows, macOS nor Linux.
    #[error("Unsupported operating system {0}")]
    UnsupportedOperatingSystem(String),

    /// HTTP failure while fetching an artifact.
    #[error("Failed to download {url}: {message}")]
    Network {
        /// The download URL.
        url: String,
        /// Error message.
        message: String,
    },

    /// Corrupt or unreadable archive.
    #[error("Failed to unpack {}: {message}", path.display())]
    Archive {
        /// The downloaded file.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// The expected checksum is not a valid SHA-256 hex string.
    #[error("Invalid SHA-256 checksum '{checksum}': {message}")]
    ChecksumFormat {
        /// The checksum as written in the descriptor.
        checksum: String,
        /// Error message.
        message: String,
    },

    /// Checksum mismatch after download.
    #[error("Failed to verify checksum for {}: expected {expected}, got {actual}", path.display())]
    Integrity {
        /// The verified file.
        path: PathBuf,
        /// The expected digest.
        expected: String,
        /// The computed digest.
        actual: String,
    },

    /// The download was cancelled.
    #[error("Download of {url} was cancelled")]
    Cancelled {
        /// The download URL.
        url: String,
    },

    /// The approval callback declined the download.
    #[error("Download of {tool} {required_version} was declined")]
    ApprovalDenied {
        /// The tool name.
        tool: String,
        /// The version that would have been downloaded.
        required_version: String,
    },

    /// The background worker running the pipeline stopped unexpectedly.
    #[error("Worker failed: {0}")]
    Worker(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Any of the above, tagged with the tool it happened for.
    #[error("Error while setting tool {tool}: {source}")]
    Tool {
        /// The tool name.
        tool: String,
        /// The underlying error.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a descriptor error.
    #[must_use]
    pub fn descriptor(location: impl Into<String>, message: impl ToString) -> Self {
        Self::Descriptor {
            location: location.into(),
            message: message.to_string(),
        }
    }

    /// Create a network error.
    #[must_use]
    pub fn network(url: impl Into<String>, message: impl ToString) -> Self {
        Self::Network {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create an archive error.
    #[must_use]
    pub fn archive(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Archive {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create a checksum format error.
    #[must_use]
    pub fn checksum_format(checksum: impl Into<String>, message: impl ToString) -> Self {
        Self::ChecksumFormat {
            checksum: checksum.into(),
            message: message.to_string(),
        }
    }

    /// Tag this error with a tool name. Already tagged errors are returned as is.
    #[must_use]
    pub fn for_tool(self, tool: impl Into<String>) -> Self {
        match self {
            Self::Tool { .. } => self,
            other => Self::Tool {
                tool: tool.into(),
                source: Box::new(other),
            },
        }
    }

    /// The underlying error, without the [`Error::Tool`] wrapper.
    #[must_use]
    pub fn root(&self) -> &Error {
        match self {
            Self::Tool { source, .. } => source.root(),
            other => other,
        }
    }

    /// The tool this error was raised for, if known.
    #[must_use]
    pub fn tool(&self) -> Option<&str> {
        match self {
            Self::Tool { tool, .. }
            | Self::UnknownTool { tool, .. }
            | Self::UnsupportedPlatform { tool, .. }
            | Self::ApprovalDenied { tool, .. } => Some(tool),
            _ => None,
        }
    }
}
