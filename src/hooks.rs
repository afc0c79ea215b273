//! Callbacks the acquisition pipeline reports to: progress, approval and cancellation.

use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use crate::provisioner::Stage;

/// Receives download progress.
pub trait ProgressSink: Send + Sync {
    /// Called after every downloaded chunk with `bytes_read / content_length`.
    ///
    /// Not called when the server does not announce a length.
    fn report(&self, fraction: f64);

    /// Called on every pipeline state transition.
    fn stage(&self, _tool: &str, _stage: Stage) {}
}

impl<F> ProgressSink for F
where
    F: Fn(f64) + Send + Sync,
{
    fn report(&self, fraction: f64) {
        self(fraction)
    }
}

/// Discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _fraction: f64) {}
}

/// What the user is asked before a download starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRequest {
    /// The tool name.
    pub tool: String,
    /// The probed version, empty if the tool was not found.
    pub current_version: String,
    /// The version that would be downloaded.
    pub required_version: String,
}

impl ApprovalRequest {
    /// The question to show the user.
    pub fn message(&self) -> String {
        if self.current_version.trim().is_empty() {
            format!(
                "{tool} not found, do you want to download {tool} {required}?",
                tool = self.tool,
                required = self.required_version
            )
        } else {
            format!(
                "{tool} {current} found, required version is {required}, do you want to download {tool}?",
                tool = self.tool,
                current = self.current_version,
                required = self.required_version
            )
        }
    }

    /// Dialog title.
    pub fn title(&self) -> String {
        format!("{} tool required", self.tool)
    }
}

/// Decides whether a download may start.
pub trait Approver: Send + Sync {
    fn approve(&self, request: &ApprovalRequest) -> bool;
}

impl<F> Approver for F
where
    F: Fn(&ApprovalRequest) -> bool + Send + Sync,
{
    fn approve(&self, request: &ApprovalRequest) -> bool {
        self(request)
    }
}

/// Approves every download; the batch and test default.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApprove;

impl Approver for AutoApprove {
    fn approve(&self, _request: &ApprovalRequest) -> bool {
        true
    }
}

/// The collaborators of one acquisition.
#[derive(Clone)]
pub struct Hooks {
    pub progress: Arc<dyn ProgressSink>,
    pub approval: Arc<dyn Approver>,
    /// Checked once per downloaded chunk.
    pub cancel: CancellationToken,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, progress: impl ProgressSink + 'static) -> Self {
        self.progress = Arc::new(progress);
        self
    }

    pub fn with_approval(mut self, approval: impl Approver + 'static) -> Self {
        self.approval = Arc::new(approval);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            progress: Arc::new(NoProgress),
            approval: Arc::new(AutoApprove),
            cancel: CancellationToken::new(),
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
