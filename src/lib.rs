//! # toolpin
//!
//! Provisions external command-line tools on demand. A tools descriptor (YAML or JSON,
//! usually hosted remotely) names every tool, the version it must have and a download
//! per platform. `toolpin` checks whether a compatible version is already installed and
//! otherwise downloads, unpacks and verifies the pinned version into a per-version cache.
//!
//! ```no_run
//! use toolpin::{Provisioner, ProvisionerConfig};
//!
//! # fn main() -> toolpin::Result<()> {
//! let provisioner = Provisioner::new(ProvisionerConfig::default())?;
//! let tkn = provisioner.acquire_blocking("tkn", "https://example.com/tools.yaml")?;
//! println!("{}", tkn.command_path.display());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules Overview
//! - [`descriptor`] – The descriptor model
//! - [`loader`] – Fetching and parsing descriptors
//! - [`platform`] – Host detection and platform entry selection
//! - [`probe`] – Version detection of installed tools
//! - [`cache`] – Cache directory layout
//! - [`download`] – Chunked, cancellable downloads
//! - [`archive`] – Unpacking of gz, tar and zip layers
//! - [`checksum`] – SHA-256 verification
//! - [`hooks`] – Progress, approval and cancellation callbacks
//! - [`provisioner`] – The acquisition pipeline and worker pool
//! - [`config`] – `toolpin.toml` settings

pub mod archive;
pub mod cache;
pub mod checksum;
pub mod config;
pub mod descriptor;
pub mod download;
pub mod error;
pub mod hooks;
pub mod loader;
pub mod platform;
pub mod probe;
pub mod provisioner;

pub use config::{Mode, ProvisionerConfig};
pub use descriptor::{Platform, Tool, ToolDescriptor};
pub use error::{Error, Result};
pub use hooks::{ApprovalRequest, Approver, AutoApprove, Hooks, NoProgress, ProgressSink};
pub use platform::{HostPlatform, OsId};
pub use probe::{CommandRunner, SystemCommandRunner};
pub use provisioner::{AcquireHandle, Provisioner, ProvisionerBuilder, Stage, ToolInstance, WorkerPool};
