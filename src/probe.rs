//! Detection of an already installed tool version.

use std::io;
use std::process::Command;
use tracing::debug;
use crate::descriptor::{Platform, Tool, VersionPattern};

/// Runs an executable and returns its combined output.
///
/// Only used to ask an installed tool for its version; exit codes are ignored.
pub trait CommandRunner: Send + Sync {
    fn run(&self, executable: &str, args: &[String]) -> io::Result<String>;
}

/// Runs commands as child processes, resolving the executable through `PATH`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, executable: &str, args: &[String]) -> io::Result<String> {
        let output = Command::new(executable).args(args).output()?;
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text)
    }
}

impl<F> CommandRunner for F
where
    F: Fn(&str, &[String]) -> io::Result<String> + Send + Sync,
{
    fn run(&self, executable: &str, args: &[String]) -> io::Result<String> {
        self(executable, args)
    }
}

/// Asks the installed command for its version.
///
/// Returns the first capture of the extract pattern on the first matching output line,
/// or an empty string when nothing matches, the tool has no extract pattern, or the
/// command cannot be run. A missing tool is expected, so failures are not errors.
pub fn probe_version(runner: &dyn CommandRunner, tool: &Tool, platform: &Platform) -> String {
    let Some(pattern) = &tool.version_extract else {
        return String::new();
    };
    match runner.run(&platform.cmd_file_name, &tool.version_args()) {
        Ok(output) => extract_version(pattern, &output).unwrap_or_default(),
        Err(e) => {
            debug!(command = %platform.cmd_file_name, error = %e, "Version probe failed");
            String::new()
        }
    }
}

/// Applies `pattern` line by line and returns the first capture.
pub fn extract_version(pattern: &VersionPattern, output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| pattern.extract(line))
        .map(String::from)
}

/// Whether a probed version makes a download unnecessary.
///
/// With a match pattern the whole version must match it; without one any detected
/// version is accepted.
pub fn is_compatible(version: &str, version_match: Option<&VersionPattern>) -> bool {
    match version_match {
        Some(pattern) => pattern.is_match(version),
        None => !version.trim().is_empty(),
    }
}
