use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use modelverse_core::{CoreError, Result, TaskId};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::Child;
use tokio::sync::{Mutex, OwnedMutexGuard};

// ===== Per-task Locks =====

/// One async mutex per task id. Every read-modify-write on a task goes
/// through its own lock; there is no registry-wide lock held across I/O.
#[derive(Debug, Default)]
pub struct TaskLocks {
    locks: DashMap<TaskId, Arc<Mutex<()>>>,
}

impl TaskLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, id: TaskId) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(id).or_default().clone();
        lock.lock_owned().await
    }

    /// Drop the lock entry for a finished task. Holders keep their guard.
    pub fn forget(&self, id: &TaskId) {
        self.locks.remove(id);
    }
}

// ===== Process Registry =====

/// Identity of a supervised serving process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessHandle {
    pub task_id: TaskId,
    pub pid: Option<u32>,
    pub port: u16,
    pub command: Vec<String>,
    pub log_path: PathBuf,
}

impl ProcessHandle {
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }
}

#[derive(Debug)]
pub struct SupervisedProcess {
    pub handle: ProcessHandle,
    pub child: Mutex<Child>,
}

impl SupervisedProcess {
    pub fn new(handle: ProcessHandle, child: Child) -> Self {
        Self {
            handle,
            child: Mutex::new(child),
        }
    }

    /// `true` while the child has not exited.
    pub async fn is_alive(&self) -> bool {
        matches!(self.child.lock().await.try_wait(), Ok(None))
    }
}

/// Liveness cache of supervised processes, keyed by task id.
///
/// Ports are reserved separately from registration so a port can be held
/// between allocation and spawn. A port is owned by at most one task.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    processes: DashMap<TaskId, Arc<SupervisedProcess>>,
    ports: DashMap<u16, TaskId>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `port` for `task_id`. Succeeds if it is already this task's.
    pub fn reserve_port(&self, port: u16, task_id: TaskId) -> bool {
        match self.ports.entry(port) {
            Entry::Occupied(entry) => *entry.get() == task_id,
            Entry::Vacant(entry) => {
                entry.insert(task_id);
                true
            }
        }
    }

    pub fn release_port(&self, port: u16, task_id: TaskId) {
        self.ports.remove_if(&port, |_, owner| *owner == task_id);
    }

    pub fn register(&self, process: SupervisedProcess) -> Result<Arc<SupervisedProcess>> {
        let task_id = process.handle.task_id;
        let port = process.handle.port;
        if !self.reserve_port(port, task_id) {
            return Err(CoreError::InvalidState(format!(
                "port {port} is held by another task"
            )));
        }
        match self.processes.entry(task_id) {
            Entry::Occupied(_) => Err(CoreError::InvalidState(format!(
                "task {task_id} already has a supervised process"
            ))),
            Entry::Vacant(entry) => {
                let process = Arc::new(process);
                entry.insert(process.clone());
                Ok(process)
            }
        }
    }

    pub fn get(&self, task_id: &TaskId) -> Option<Arc<SupervisedProcess>> {
        self.processes.get(task_id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.processes.contains_key(task_id)
    }

    /// Remove the handle and free its port.
    pub fn remove(&self, task_id: &TaskId) -> Option<Arc<SupervisedProcess>> {
        let (_, process) = self.processes.remove(task_id)?;
        self.release_port(process.handle.port, *task_id);
        Some(process)
    }

    pub fn active_ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self.ports.iter().map(|entry| *entry.key()).collect();
        ports.sort_unstable();
        ports
    }

    pub fn handles(&self) -> Vec<ProcessHandle> {
        self.processes
            .iter()
            .map(|entry| entry.value().handle.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    fn spawn_sleep() -> Child {
        Command::new("sleep")
            .arg("30")
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .unwrap()
    }

    fn handle(task_id: TaskId, port: u16) -> ProcessHandle {
        ProcessHandle {
            task_id,
            pid: None,
            port,
            command: vec!["sleep".into(), "30".into()],
            log_path: PathBuf::from("/tmp/unused.log"),
        }
    }

    #[test]
    fn test_port_reservation_is_exclusive() {
        let registry = ProcessRegistry::new();
        let a = TaskId::new();
        let b = TaskId::new();

        assert!(registry.reserve_port(8000, a));
        assert!(registry.reserve_port(8000, a));
        assert!(!registry.reserve_port(8000, b));

        registry.release_port(8000, b);
        assert!(!registry.reserve_port(8000, b));

        registry.release_port(8000, a);
        assert!(registry.reserve_port(8000, b));
    }

    #[tokio::test]
    async fn test_register_and_remove() {
        let registry = ProcessRegistry::new();
        let id = TaskId::new();

        let process = registry
            .register(SupervisedProcess::new(handle(id, 8100), spawn_sleep()))
            .unwrap();
        assert!(process.is_alive().await);
        assert_eq!(registry.active_ports(), vec![8100]);
        assert!(registry.contains(&id));

        let removed = registry.remove(&id).unwrap();
        removed.child.lock().await.kill().await.unwrap();
        assert!(registry.is_empty());
        assert!(registry.active_ports().is_empty());
    }

    #[tokio::test]
    async fn test_register_rejects_taken_port() {
        let registry = ProcessRegistry::new();
        let owner = TaskId::new();
        assert!(registry.reserve_port(8200, owner));

        let result = registry.register(SupervisedProcess::new(handle(TaskId::new(), 8200), spawn_sleep()));
        assert!(matches!(result, Err(CoreError::InvalidState(_))));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_task_lock_serializes_access() {
        let locks = Arc::new(TaskLocks::new());
        let id = TaskId::new();
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let guard = locks.lock(id).await;
        let task = {
            let locks = locks.clone();
            let counter = counter.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(id).await;
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            })
        };

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 0);
        drop(guard);
        task.await.unwrap();
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
