//! Supervision of model-serving processes: spawn, health polling,
//! graceful termination and liveness reconciliation.

pub mod command;

pub use command::*;

use modelverse_core::{
    ChatMessage, CoreError, GenerationBackend, GenerationRequest, GenerationResponse,
    ModelResolver, Result, SamplingOverrides, Task, TaskEventSink, TaskId, TaskStatus, TaskUpdate,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::adapters::resolve_existing;
use crate::backend::{api_base, OpenAiCompatibleBackend};
use crate::events::TaskLogger;
use crate::lifecycle::TaskLifecycle;
use crate::ports::PortAllocator;
use crate::registry::{ProcessHandle, ProcessRegistry, SupervisedProcess};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SupervisorSettings {
    /// Delay between spawn and the first health probe
    pub warmup_ms: u64,
    pub poll_interval_ms: u64,
    pub health_attempts: u32,
    pub probe_timeout_ms: u64,
    /// Probe timeout used by status queries
    pub status_probe_timeout_ms: u64,
    /// Time between SIGTERM and SIGKILL
    pub grace_period_ms: u64,
    pub log_dir: PathBuf,
    pub port_start: u16,
    pub port_attempts: u16,
    pub python: String,
    pub log_tail_lines: usize,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            warmup_ms: 5_000,
            poll_interval_ms: 5_000,
            health_attempts: 20,
            probe_timeout_ms: 5_000,
            status_probe_timeout_ms: 2_000,
            grace_period_ms: 5_000,
            log_dir: PathBuf::from("logs"),
            port_start: 8000,
            port_attempts: 100,
            python: "python".to_string(),
            log_tail_lines: 20,
        }
    }
}

impl SupervisorSettings {
    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    pub fn warmup(&self) -> Duration {
        Self::ms(self.warmup_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Self::ms(self.poll_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Self::ms(self.probe_timeout_ms)
    }

    pub fn status_probe_timeout(&self) -> Duration {
        Self::ms(self.status_probe_timeout_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Self::ms(self.grace_period_ms)
    }
}

/// Liveness report for an inference task.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub task: Task,
    pub process_running: bool,
    pub api_available: bool,
}

pub struct ProcessSupervisor {
    lifecycle: TaskLifecycle,
    registry: Arc<ProcessRegistry>,
    resolver: Arc<dyn ModelResolver>,
    sink: Arc<dyn TaskEventSink>,
    allocator: PortAllocator<crate::ports::TcpPortProbe>,
    http: reqwest::Client,
    settings: SupervisorSettings,
}

impl ProcessSupervisor {
    pub fn new(
        lifecycle: TaskLifecycle,
        registry: Arc<ProcessRegistry>,
        resolver: Arc<dyn ModelResolver>,
        sink: Arc<dyn TaskEventSink>,
        settings: SupervisorSettings,
    ) -> Self {
        Self {
            allocator: PortAllocator::tcp(settings.port_start, settings.port_attempts),
            lifecycle,
            registry,
            resolver,
            sink,
            http: reqwest::Client::new(),
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<ProcessRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    pub fn log_path(&self, task_id: &TaskId) -> PathBuf {
        self.settings.log_dir.join(format!("inference_{task_id}.log"))
    }

    fn logger(&self, task_id: TaskId) -> TaskLogger {
        TaskLogger::new(task_id, self.lifecycle.store().clone(), self.sink.clone())
    }

    // ===== Start =====

    /// Spawn the serving process for `task_id` and wait until it answers
    /// health probes. Returns once the task is `Running`.
    pub async fn start(&self, task_id: TaskId) -> Result<ProcessHandle> {
        let logger = self.logger(task_id);
        let task = self.claim(task_id).await?;

        match self.launch(&task, &logger).await {
            Ok(process) => self.await_healthy(task_id, process, &logger).await,
            Err(e) => Err(self.fail(task_id, &logger, e).await),
        }
    }

    /// Move a pending task to `Starting`. A task is started at most once.
    async fn claim(&self, task_id: TaskId) -> Result<Task> {
        let _guard = self.lifecycle.locks().lock(task_id).await;
        let task = self.lifecycle.get(&task_id).await?;

        if task.inference_config().is_none() {
            return Err(CoreError::InvalidState(format!(
                "task {task_id} is not an inference task"
            )));
        }
        if self.registry.contains(&task_id) || task.status != TaskStatus::Pending {
            return Err(CoreError::InvalidState(format!(
                "task {task_id} cannot start from status {}",
                task.status
            )));
        }

        self.lifecycle
            .apply_locked(task_id, TaskUpdate::status(TaskStatus::Starting))
            .await?
            .ok_or_else(|| CoreError::InvalidState(format!("task {task_id} changed concurrently")))
    }

    async fn launch(&self, task: &Task, logger: &TaskLogger) -> Result<Arc<SupervisedProcess>> {
        let task_id = task.id;
        let config = task
            .inference_config()
            .ok_or_else(|| CoreError::InvalidState(format!("task {task_id} is not an inference task")))?;
        task.config.validate()?;

        let model_path = resolve_existing(self.resolver.as_ref(), &config.model_id).await?;
        let port = self.reserve_port(task_id, config.port).await?;

        let command = ServeCommand::build(config, &model_path, port, &self.settings.python);
        let log_path = self.log_path(&task_id);
        logger
            .info(format!("starting serving process on port {port}: {}", command.argv().join(" ")))
            .await;

        let child = match self.spawn(&command, &log_path).await {
            Ok(child) => child,
            Err(e) => {
                self.registry.release_port(port, task_id);
                return Err(e);
            }
        };

        let handle = ProcessHandle {
            task_id,
            pid: child.id(),
            port,
            command: command.argv(),
            log_path,
        };
        let process = {
            let _guard = self.lifecycle.locks().lock(task_id).await;
            let process = self.registry.register(SupervisedProcess::new(handle.clone(), child))?;

            let mut update = TaskUpdate::new().with_port(port).with_api_base(api_base(port));
            if let Some(pid) = handle.pid {
                update = update.with_pid(pid);
            }
            if self.lifecycle.apply_locked(task_id, update).await?.is_none() {
                // stopped while spawning
                drop(_guard);
                if let Some(process) = self.registry.remove(&task_id) {
                    self.terminate(&process).await;
                }
                return Err(CoreError::InvalidState(format!("task {task_id} stopped during startup")));
            }
            process
        };

        info!(task_id = %task_id, pid = ?handle.pid, port, "serving process spawned");
        Ok(process)
    }

    async fn reserve_port(&self, task_id: TaskId, requested: Option<u16>) -> Result<u16> {
        match requested {
            Some(port) if self.registry.reserve_port(port, task_id) => Ok(port),
            Some(port) => Err(CoreError::ResourceUnavailable(format!(
                "port {port} is held by another task"
            ))),
            None => {
                self.allocator
                    .allocate(|port| self.registry.reserve_port(port, task_id))
                    .await
            }
        }
    }

    async fn spawn(&self, command: &ServeCommand, log_path: &Path) -> Result<Child> {
        if let Some(dir) = log_path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .await?;

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CoreError::ProcessStartup(format!("{}: {e}", command.program)))?;

        let log_file = Arc::new(Mutex::new(log_file));
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump_lines(stdout, log_file.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump_lines(stderr, log_file));
        }

        Ok(child)
    }

    async fn await_healthy(
        &self,
        task_id: TaskId,
        process: Arc<SupervisedProcess>,
        logger: &TaskLogger,
    ) -> Result<ProcessHandle> {
        let port = process.handle.port;
        sleep(self.settings.warmup()).await;

        for attempt in 1..=self.settings.health_attempts {
            if !self.registry.contains(&task_id) {
                return Err(CoreError::InvalidState(format!("task {task_id} stopped during startup")));
            }
            if let Some(status) = exit_status(&process).await {
                let err = CoreError::ProcessStartup(format!("process exited during startup ({status})"));
                self.log_tail(&process.handle.log_path, logger).await;
                return Err(self.release_failed(task_id, logger, err).await.0);
            }

            if self.probe(port, self.settings.probe_timeout()).await {
                let applied = self.lifecycle.transition(task_id, TaskStatus::Running).await?;
                if applied.is_none() {
                    return Err(CoreError::InvalidState(format!("task {task_id} stopped during startup")));
                }
                logger.info(format!("serving process healthy on port {port}")).await;
                return Ok(process.handle.clone());
            }

            debug!(task_id = %task_id, attempt, "health probe not ready");
            if attempt < self.settings.health_attempts {
                sleep(self.settings.poll_interval()).await;
            }
        }

        self.log_tail(&process.handle.log_path, logger).await;
        let err = CoreError::HealthCheckTimeout(format!(
            "startup timeout after {} health checks",
            self.settings.health_attempts
        ));
        let (err, process) = self.release_failed(task_id, logger, err).await;
        if let Some(process) = process {
            self.terminate(&process).await;
        }
        Err(err)
    }

    /// Remove the handle and record the failure under one guard. The removed
    /// process is returned for termination outside the lock.
    async fn release_failed(
        &self,
        task_id: TaskId,
        logger: &TaskLogger,
        err: CoreError,
    ) -> (CoreError, Option<Arc<SupervisedProcess>>) {
        logger.error(format!("{err:?}")).await;
        let _guard = self.lifecycle.locks().lock(task_id).await;
        let process = self.registry.remove(&task_id);
        if let Err(e) = self
            .lifecycle
            .apply_locked(task_id, TaskUpdate::failed(err.to_string()))
            .await
        {
            warn!(task_id = %task_id, error = %e, "could not record failure");
        }
        (err, process)
    }

    async fn fail(&self, task_id: TaskId, logger: &TaskLogger, err: CoreError) -> CoreError {
        logger.error(format!("{err:?}")).await;
        if let Err(e) = self.lifecycle.fail(task_id, err.to_string()).await {
            warn!(task_id = %task_id, error = %e, "could not record failure");
        }
        err
    }

    async fn log_tail(&self, path: &Path, logger: &TaskLogger) {
        let tail = read_tail(path, self.settings.log_tail_lines).await;
        if !tail.is_empty() {
            logger
                .warn(format!("last {} log lines:\n{}", tail.len(), tail.join("\n")))
                .await;
        }
    }

    async fn probe(&self, port: u16, probe_timeout: Duration) -> bool {
        let url = format!("{}/v1/models", api_base(port));
        matches!(
            timeout(probe_timeout, self.http.get(&url).send()).await,
            Ok(Ok(response)) if response.status() == reqwest::StatusCode::OK
        )
    }

    // ===== Stop =====

    /// Stop the task's process. Returns `false` when there was nothing to stop.
    ///
    /// The task is marked `Stopped` under its lock; the SIGTERM grace period
    /// runs after the lock is released.
    pub async fn stop(&self, task_id: TaskId) -> Result<bool> {
        let logger = self.logger(task_id);
        let guard = self.lifecycle.locks().lock(task_id).await;

        if let Some(process) = self.registry.remove(&task_id) {
            let applied = self
                .lifecycle
                .apply_locked(task_id, TaskUpdate::status(TaskStatus::Stopped))
                .await;
            drop(guard);

            self.terminate(&process).await;
            applied?;
            logger.info("serving process stopped").await;
            return Ok(true);
        }

        let task = self.lifecycle.get(&task_id).await?;
        if task.status.is_active() {
            self.lifecycle
                .apply_locked(
                    task_id,
                    TaskUpdate::status(TaskStatus::Stopped)
                        .with_error("process no longer exists, marked as stopped"),
                )
                .await?;
            logger.warn("no supervised process found, marked as stopped").await;
            return Ok(true);
        }

        Ok(false)
    }

    /// SIGTERM, wait out the grace period, then SIGKILL.
    async fn terminate(&self, process: &SupervisedProcess) {
        let mut child = process.child.lock().await;
        if matches!(child.try_wait(), Ok(Some(_))) {
            return;
        }

        send_terminate(&mut child);
        match timeout(self.settings.grace_period(), child.wait()).await {
            Ok(_) => debug!(task_id = %process.handle.task_id, "process exited after SIGTERM"),
            Err(_) => {
                warn!(task_id = %process.handle.task_id, "grace period expired, killing process");
                if let Err(e) = child.kill().await {
                    warn!(task_id = %process.handle.task_id, error = %e, "kill failed");
                }
            }
        }
    }

    /// Stop every supervised process.
    pub async fn shutdown(&self) {
        for handle in self.registry.handles() {
            if let Err(e) = self.stop(handle.task_id).await {
                warn!(task_id = %handle.task_id, error = %e, "stop during shutdown failed");
            }
        }
    }

    // ===== Status =====

    /// Reconcile liveness with persisted status and report it.
    pub async fn status(&self, task_id: TaskId) -> Result<ServiceStatus> {
        let (task, process) = {
            let _guard = self.lifecycle.locks().lock(task_id).await;
            let mut task = self.lifecycle.get(&task_id).await?;
            let process = self.registry.get(&task_id);
            let alive = match &process {
                Some(process) => process.is_alive().await,
                None => false,
            };

            if task.status.is_running() && !alive {
                self.registry.remove(&task_id);
                if let Some(updated) = self
                    .lifecycle
                    .apply_locked(task_id, TaskUpdate::failed("process exited unexpectedly"))
                    .await?
                {
                    task = updated;
                }
                self.logger(task_id)
                    .error("serving process exited unexpectedly")
                    .await;
            }
            (task, process.filter(|_| alive))
        };

        let api_available = match (&process, task.port) {
            (Some(_), Some(port)) => self.probe(port, self.settings.status_probe_timeout()).await,
            _ => false,
        };

        Ok(ServiceStatus {
            task,
            process_running: process.is_some(),
            api_available,
        })
    }

    // ===== Generate =====

    /// Chat completion against a running task's own server. Absent
    /// overrides fall back to the task's sampling defaults.
    pub async fn generate(
        &self,
        task_id: TaskId,
        messages: Vec<ChatMessage>,
        overrides: SamplingOverrides,
    ) -> Result<GenerationResponse> {
        let task = self.lifecycle.get(&task_id).await?;
        let config = task
            .inference_config()
            .ok_or_else(|| CoreError::InvalidState(format!("task {task_id} is not an inference task")))?;
        if !task.status.is_running() {
            return Err(CoreError::InvalidState(format!(
                "task {task_id} is {}, not running",
                task.status
            )));
        }
        let port = task
            .port
            .ok_or_else(|| CoreError::InvalidState(format!("task {task_id} has no port")))?;

        let request = GenerationRequest::new(
            config.served_model_name.clone(),
            messages,
            overrides.resolve(&config.sampling),
        );
        let backend = OpenAiCompatibleBackend::with_client(self.http.clone(), api_base(port));
        let request_timeout = Duration::from_secs(config.request_timeout_secs);

        timeout(request_timeout, backend.generate(request))
            .await
            .map_err(|_| CoreError::Generation(format!("no response within {request_timeout:?}")))?
    }

    // ===== Cleanup =====

    /// Remove the task's log artifact. Refused while a process is supervised.
    pub async fn cleanup(&self, task_id: TaskId) -> Result<bool> {
        if self.registry.contains(&task_id) {
            return Err(CoreError::InvalidState(format!(
                "task {task_id} still has a running process"
            )));
        }
        match tokio::fs::remove_file(self.log_path(&task_id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

async fn exit_status(process: &SupervisedProcess) -> Option<std::process::ExitStatus> {
    process.child.lock().await.try_wait().ok().flatten()
}

async fn pump_lines<R>(stream: R, file: Arc<Mutex<tokio::fs::File>>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let mut file = file.lock().await;
        let written = async {
            file.write_all(line.as_bytes()).await?;
            file.write_all(b"\n").await?;
            file.flush().await
        };
        if let Err(e) = written.await {
            warn!(error = %e, "failed to write process log");
            break;
        }
    }
}

/// Last `lines` lines of a log file, empty if unreadable.
pub async fn read_tail(path: &Path, lines: usize) -> Vec<String> {
    let Ok(raw) = tokio::fs::read_to_string(path).await else {
        return Vec::new();
    };
    let all: Vec<&str> = raw.lines().collect();
    all[all.len().saturating_sub(lines)..]
        .iter()
        .map(|line| line.to_string())
        .collect()
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match child.id() {
        Some(pid) => {
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                warn!(pid, error = %e, "SIGTERM failed");
            }
        }
        None => {
            let _ = child.start_kill();
        }
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) {
    let _ = child.start_kill();
}
