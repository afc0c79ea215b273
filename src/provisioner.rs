//! The acquisition pipeline.
//!
//! `acquire` loads the descriptor, resolves the host platform, probes the installed
//! version and, only when it is not compatible and the cache path does not exist yet,
//! downloads, unpacks and verifies the tool:
//!
//! ```text
//! Idle -> Probing -> Done                                   (compatible, or cached)
//!      -> Probing -> AwaitingApproval -> Downloading -> Extracting -> Verifying -> Done
//! ```
//!
//! Any stage may end in `Failed`.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use reqwest::blocking::Client;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use crate::archive::decode;
use crate::cache::{command_path, download_path, is_cached, resolve_base_dir};
use crate::checksum::{normalize_checksum, sha256_file, verify};
use crate::config::{Mode, ProvisionerConfig};
use crate::descriptor::Platform;
use crate::download::download;
use crate::error::{Error, Result};
use crate::hooks::{ApprovalRequest, Hooks};
use crate::loader::load_descriptor;
use crate::platform::{resolve_platform, HostPlatform};
use crate::probe::{is_compatible, probe_version, CommandRunner, SystemCommandRunner};

/// Where a pipeline run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Idle,
    Probing,
    AwaitingApproval,
    Downloading,
    Extracting,
    Verifying,
    Done,
    Failed,
}

/// A usable tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInstance {
    /// The command to run: a cache path, or a bare name resolved through `PATH` when a
    /// compatible version is already installed.
    pub command_path: PathBuf,
    /// Whether this run downloaded the tool.
    pub was_downloaded: bool,
}

impl ToolInstance {
    pub fn new(command_path: impl Into<PathBuf>, was_downloaded: bool) -> Self {
        Self {
            command_path: command_path.into(),
            was_downloaded,
        }
    }
}

/// Bounded pool the pipeline runs on.
///
/// Network reads, unpacking and hashing block, so every run occupies one blocking
/// thread; at most `workers` runs execute at once.
pub struct WorkerPool {
    handle: Handle,
    permits: Arc<Semaphore>,
    runtime: Option<Runtime>,
}

impl WorkerPool {
    /// Starts a dedicated runtime.
    pub fn new(workers: usize) -> Result<WorkerPool> {
        let workers = workers.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(workers)
            .thread_name("toolpin-worker")
            .build()?;
        Ok(WorkerPool {
            handle: runtime.handle().clone(),
            permits: Arc::new(Semaphore::new(workers)),
            runtime: Some(runtime),
        })
    }

    /// Runs on an existing multi-threaded runtime.
    pub fn from_handle(handle: Handle, workers: usize) -> WorkerPool {
        WorkerPool {
            handle,
            permits: Arc::new(Semaphore::new(workers.max(1))),
            runtime: None,
        }
    }

    fn spawn<F>(&self, job: F) -> AcquireHandle
    where
        F: FnOnce() -> Result<ToolInstance> + Send + 'static,
    {
        let permits = self.permits.clone();
        let task = self.handle.spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| Error::Worker(e.to_string()))?;
            tokio::task::spawn_blocking(job)
                .await
                .map_err(|e| Error::Worker(e.to_string()))?
        });
        AcquireHandle {
            state: HandleState::Running(task),
        }
    }

    fn block_on(&self, handle: AcquireHandle) -> Result<ToolInstance> {
        self.handle.block_on(handle)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// The pending result of [`Provisioner::acquire`].
///
/// The run starts when the handle is created; awaiting it only collects the result.
/// A panicking run resolves to [`Error::Worker`].
pub struct AcquireHandle {
    state: HandleState,
}

enum HandleState {
    Ready(Option<Result<ToolInstance>>),
    Running(JoinHandle<Result<ToolInstance>>),
}

impl AcquireHandle {
    fn ready(result: Result<ToolInstance>) -> Self {
        Self {
            state: HandleState::Ready(Some(result)),
        }
    }
}

impl Future for AcquireHandle {
    type Output = Result<ToolInstance>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            HandleState::Ready(result) => Poll::Ready(
                result
                    .take()
                    .unwrap_or_else(|| Err(Error::Worker("result already taken".to_string()))),
            ),
            HandleState::Running(task) => Pin::new(task)
                .poll(cx)
                .map(|joined| joined.unwrap_or_else(|e| Err(Error::Worker(e.to_string())))),
        }
    }
}

/// Provisions tools described by remote descriptors.
///
/// Cheap to clone; clones share the worker pool and the per-tool locks.
#[derive(Clone)]
pub struct Provisioner {
    pipeline: Arc<Pipeline>,
    pool: Option<Arc<WorkerPool>>,
}

impl Provisioner {
    /// A provisioner with the system process runner and, in background mode, its own pool.
    pub fn new(config: ProvisionerConfig) -> Result<Provisioner> {
        Self::builder(config).build()
    }

    pub fn builder(config: ProvisionerConfig) -> ProvisionerBuilder {
        ProvisionerBuilder {
            config,
            runner: None,
            host: None,
            pool: None,
        }
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.pipeline.config
    }

    /// Starts acquiring `tool` as described at `location`, with default hooks.
    pub fn acquire(&self, tool: &str, location: &str) -> AcquireHandle {
        self.acquire_with(tool, location, Hooks::default())
    }

    /// Starts acquiring `tool` as described at `location`.
    ///
    /// In background mode the run is queued on the worker pool and the handle is returned
    /// at once. In headless mode the whole run happens on the calling thread, without
    /// asking for approval, and the handle is already resolved.
    pub fn acquire_with(&self, tool: &str, location: &str, hooks: Hooks) -> AcquireHandle {
        match (&self.pool, self.pipeline.config.mode) {
            (Some(pool), Mode::Background) => {
                let pipeline = self.pipeline.clone();
                let tool = tool.to_string();
                let location = location.to_string();
                pool.spawn(move || pipeline.run(&tool, &location, &hooks, false))
            }
            _ => AcquireHandle::ready(self.pipeline.run(tool, location, &hooks, true)),
        }
    }

    /// Acquires `tool` and waits for the result.
    ///
    /// Must not be called from within an async context.
    pub fn acquire_blocking(&self, tool: &str, location: &str) -> Result<ToolInstance> {
        self.acquire_blocking_with(tool, location, Hooks::default())
    }

    /// Like [`acquire_blocking`](Self::acquire_blocking) with explicit hooks.
    pub fn acquire_blocking_with(&self, tool: &str, location: &str, hooks: Hooks) -> Result<ToolInstance> {
        let handle = self.acquire_with(tool, location, hooks);
        match (&self.pool, handle.state) {
            (_, HandleState::Ready(Some(result))) => result,
            (Some(pool), state) => pool.block_on(AcquireHandle { state }),
            (None, _) => Err(Error::Worker("no worker pool".to_string())),
        }
    }

    /// Where `tool` is (or would be) cached, without probing or downloading.
    pub fn cache_path(&self, tool: &str, location: &str) -> Result<PathBuf> {
        self.pipeline
            .cache_path(tool, location)
            .map_err(|e| e.for_tool(tool))
    }
}

/// Configures a [`Provisioner`].
pub struct ProvisionerBuilder {
    config: ProvisionerConfig,
    runner: Option<Arc<dyn CommandRunner>>,
    host: Option<HostPlatform>,
    pool: Option<WorkerPool>,
}

impl ProvisionerBuilder {
    /// Replaces the process runner used to probe installed versions.
    pub fn runner(mut self, runner: impl CommandRunner + 'static) -> Self {
        self.runner = Some(Arc::new(runner));
        self
    }

    /// Resolves downloads for `host` instead of the running machine.
    pub fn host(mut self, host: HostPlatform) -> Self {
        self.host = Some(host);
        self
    }

    /// Runs background acquisitions on `pool` instead of a dedicated runtime.
    pub fn pool(mut self, pool: WorkerPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn build(self) -> Result<Provisioner> {
        let pool = match (self.pool, self.config.mode) {
            (Some(pool), _) => Some(pool),
            (None, Mode::Background) => Some(WorkerPool::new(self.config.workers)?),
            (None, Mode::Headless) => None,
        };
        Ok(Provisioner {
            pipeline: Arc::new(Pipeline {
                config: self.config,
                runner: self.runner.unwrap_or_else(|| Arc::new(SystemCommandRunner)),
                host: self.host,
                in_flight: Mutex::new(HashMap::new()),
            }),
            pool: pool.map(Arc::new),
        })
    }
}

struct Pipeline {
    config: ProvisionerConfig,
    runner: Arc<dyn CommandRunner>,
    host: Option<HostPlatform>,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Pipeline {
    /// One run for one tool. Runs for the same tool name are serialized.
    fn run(&self, tool_name: &str, location: &str, hooks: &Hooks, headless: bool) -> Result<ToolInstance> {
        let lock = self.tool_lock(tool_name);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.run_locked(tool_name, location, hooks, headless)
        };
        self.release_tool_lock(tool_name, lock);
        result
    }

    fn run_locked(&self, tool_name: &str, location: &str, hooks: &Hooks, headless: bool) -> Result<ToolInstance> {
        self.enter(hooks, tool_name, Stage::Idle);
        match self.steps(tool_name, location, hooks, headless) {
            Ok(instance) => {
                self.enter(hooks, tool_name, Stage::Done);
                Ok(instance)
            }
            Err(e) => {
                warn!(tool = tool_name, error = %e, "Acquisition failed");
                self.enter(hooks, tool_name, Stage::Failed);
                Err(e.for_tool(tool_name))
            }
        }
    }

    fn steps(&self, tool_name: &str, location: &str, hooks: &Hooks, headless: bool) -> Result<ToolInstance> {
        let client = self.client(location)?;
        let descriptor = load_descriptor(location, &client)?;
        let tool = descriptor.tool(tool_name)?;
        let host = self.host()?;
        let platform = resolve_platform(tool_name, tool, &host)?;

        self.enter(hooks, tool_name, Stage::Probing);
        let version = probe_version(self.runner.as_ref(), tool, platform);
        if is_compatible(&version, tool.version_match.as_ref()) {
            info!(tool = tool_name, %version, "Compatible version installed");
            return Ok(ToolInstance::new(&platform.cmd_file_name, false));
        }

        let base_dir = resolve_base_dir(&tool.base_dir, &self.config.home_replacement()?);
        let command = command_path(&base_dir, &tool.required_version, &platform.cmd_file_name);
        let dl_file_name = platform.download_file_name();
        let dl_path = download_path(&command, dl_file_name);
        if is_cached(&command) {
            debug!(tool = tool_name, path = %command.display(), "Using cached tool");
            if self.config.verify_cached {
                self.verify_cached(platform, &dl_path)?;
            }
            return Ok(ToolInstance::new(command, false));
        }

        if !(headless || tool.silent_mode) {
            self.enter(hooks, tool_name, Stage::AwaitingApproval);
            let request = ApprovalRequest {
                tool: tool_name.to_string(),
                current_version: version,
                required_version: tool.required_version.clone(),
            };
            if !hooks.approval.approve(&request) {
                return Err(Error::ApprovalDenied {
                    tool: request.tool,
                    required_version: request.required_version,
                });
            }
        }

        self.enter(hooks, tool_name, Stage::Downloading);
        download(&client, &platform.url, &dl_path, hooks)?;

        self.enter(hooks, tool_name, Stage::Extracting);
        decode(&dl_path, dl_file_name, &command)?;
        if !command.exists() {
            return Err(Error::archive(
                &dl_path,
                format!("{} not found after unpacking", platform.cmd_file_name),
            ));
        }

        if let Some(expected) = platform.checksum() {
            self.enter(hooks, tool_name, Stage::Verifying);
            check_integrity(&dl_path, expected)?;
        }
        info!(tool = tool_name, path = %command.display(), "Tool provisioned");
        Ok(ToolInstance::new(command, true))
    }

    fn cache_path(&self, tool_name: &str, location: &str) -> Result<PathBuf> {
        let client = self.client(location)?;
        let descriptor = load_descriptor(location, &client)?;
        let tool = descriptor.tool(tool_name)?;
        let platform = resolve_platform(tool_name, tool, &self.host()?)?;
        let base_dir = resolve_base_dir(&tool.base_dir, &self.config.home_replacement()?);
        Ok(command_path(&base_dir, &tool.required_version, &platform.cmd_file_name))
    }

    fn verify_cached(&self, platform: &Platform, dl_path: &Path) -> Result<()> {
        let Some(expected) = platform.checksum() else {
            return Ok(());
        };
        if !dl_path.exists() {
            warn!(path = %dl_path.display(), "Download of cached tool is gone, cannot re-verify");
            return Ok(());
        }
        check_integrity(dl_path, expected)
    }

    fn host(&self) -> Result<HostPlatform> {
        match &self.host {
            Some(host) => Ok(host.clone()),
            None => HostPlatform::current(),
        }
    }

    fn client(&self, location: &str) -> Result<Client> {
        Client::builder()
            .user_agent(self.config.user_agent.clone())
            .connect_timeout(self.config.connect_timeout())
            .build()
            .map_err(|e| Error::network(location, e))
    }

    fn tool_lock(&self, tool_name: &str) -> Arc<Mutex<()>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.entry(tool_name.to_string()).or_default().clone()
    }

    /// Drops the entry of `tool_name` once no other run holds or waits for it.
    fn release_tool_lock(&self, tool_name: &str, lock: Arc<Mutex<()>>) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        // Clones are only taken under `in_flight`, so the count is stable here.
        if Arc::strong_count(&lock) == 2 {
            in_flight.remove(tool_name);
        }
    }

    fn enter(&self, hooks: &Hooks, tool_name: &str, stage: Stage) {
        debug!(tool = tool_name, ?stage, "Stage");
        hooks.progress.stage(tool_name, stage);
    }
}

fn check_integrity(path: &Path, expected: &str) -> Result<()> {
    if verify(path, expected)? {
        return Ok(());
    }
    Err(Error::Integrity {
        path: path.to_path_buf(),
        expected: normalize_checksum(expected),
        actual: sha256_file(path)?,
    })
}
