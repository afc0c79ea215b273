use std::path::PathBuf;
use clap::{Parser, Subcommand};

#[derive(Debug, Parser, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct CLI {
    /// Configuration file. Defaults to `toolpin.toml` in the user config directory
    #[clap(long, global = true)]
    pub(crate) config: Option<PathBuf>,
    /// Log debug output to stderr
    #[clap(short, long, global = true)]
    pub(crate) verbose: bool,
    #[command(subcommand)]
    pub(crate) command: ToolpinCommand,
}

#[derive(Debug, Subcommand, Clone, PartialEq)]
pub enum ToolpinCommand {
    /// Makes a tool available, downloading the pinned version if needed
    Acquire {
        name: String,
        /// URL or path of the tools descriptor
        #[clap(long)]
        descriptor: String,
        /// Download without asking
        #[clap(short, long)]
        yes: bool,
        /// Run on the calling thread, never ask
        #[clap(long)]
        headless: bool,
        /// Replaces `$HOME` in the descriptor base dirs
        #[clap(long)]
        download_dir: Option<PathBuf>,
    },
    /// Lists the tools of a descriptor
    List {
        #[clap(long)]
        descriptor: String,
    },
    /// Outputs the cache path of a tool and whether it exists
    Which {
        name: String,
        #[clap(long)]
        descriptor: String,
        #[clap(long)]
        download_dir: Option<PathBuf>,
    },
    /// Checks the SHA-256 checksum of a file
    Verify {
        file: PathBuf,
        sha256: String,
    },
    /// Removes the cached version of a tool
    Clean {
        name: String,
        #[clap(long)]
        descriptor: String,
        #[clap(long)]
        download_dir: Option<PathBuf>,
    },
}
