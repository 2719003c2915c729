use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bdl_platform::HideWindow;
use log::{debug, warn};
use thiserror::Error;
use tokio::process::{Child, Command};

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("executable {} does not exist", path.display())]
    Missing { path: PathBuf },
    #[error("failed to start {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug)]
pub struct ProcessHandle {
    pid: u32,
    child: Option<Child>,
}

impl ProcessHandle {
    #[must_use]
    pub fn from_child(child: Child) -> Self {
        Self {
            pid: child.id().unwrap_or_default(),
            child: Some(child),
        }
    }

    /// A handle for a process this launcher did not spawn; it cannot be
    /// waited on.
    #[must_use]
    pub fn untracked(pid: u32) -> Self {
        Self { pid, child: None }
    }

    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

#[derive(Debug)]
pub struct KillOutcome {
    pub pid: u32,
    pub name: String,
    pub result: Result<(), String>,
}

/// Result of terminating every instance of a process name.
#[derive(Debug, Default)]
pub struct KillReport {
    pub outcomes: Vec<KillOutcome>,
    /// Whether re-enumerating afterwards found no instance left.
    pub all_terminated: bool,
}

impl KillReport {
    #[must_use]
    pub fn killed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.killed()
    }
}

#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// # Errors
    /// Returns an error if the executable is missing or cannot be started.
    fn launch(&self, path: &Path) -> Result<ProcessHandle, LaunchError>;
    fn kill_all_named(&self, name: &str) -> KillReport;
    /// Wait for a spawned process to exit, at most `timeout` when given.
    /// Returns `false` on timeout or when the handle cannot be waited on.
    async fn wait_exit(&self, handle: &mut ProcessHandle, timeout: Option<Duration>) -> bool;
    fn is_running(&self, name: &str) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessController;

#[async_trait]
impl ProcessControl for ProcessController {
    fn launch(&self, path: &Path) -> Result<ProcessHandle, LaunchError> {
        if !path.is_file() {
            return Err(LaunchError::Missing {
                path: path.to_path_buf(),
            });
        }

        let mut command = Command::new(path);
        command.hide_window();
        if let Some(dir) = path.parent() {
            command.current_dir(dir);
        }
        let child = command.spawn().map_err(|source| LaunchError::Spawn {
            path: path.to_path_buf(),
            source,
        })?;

        let handle = ProcessHandle::from_child(child);
        debug!("Started {} (pid {})", path.display(), handle.pid);
        Ok(handle)
    }

    fn kill_all_named(&self, name: &str) -> KillReport {
        let instances = match bdl_platform::find_processes(name) {
            Ok(instances) => instances,
            Err(error) => {
                warn!("Failed to enumerate {name} processes: {error}");
                return KillReport::default();
            }
        };

        let outcomes = instances
            .into_iter()
            .map(|instance| {
                let result = bdl_platform::terminate(instance.pid).map_err(|e| e.to_string());
                if let Err(ref error) = result {
                    warn!("Failed to terminate {} ({}): {error}", instance.name, instance.pid);
                }
                KillOutcome {
                    pid: instance.pid,
                    name: instance.name,
                    result,
                }
            })
            .collect();

        KillReport {
            outcomes,
            all_terminated: !self.is_running(name),
        }
    }

    async fn wait_exit(&self, handle: &mut ProcessHandle, timeout: Option<Duration>) -> bool {
        let pid = handle.pid;
        let Some(child) = handle.child.as_mut() else {
            return false;
        };

        let status = match timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    debug!("pid {pid} still running after {limit:?}");
                    return false;
                }
            },
            None => child.wait().await,
        };

        match status {
            Ok(status) => {
                debug!("pid {pid} exited with {status}");
                true
            }
            Err(error) => {
                warn!("Failed to wait for pid {pid}: {error}");
                false
            }
        }
    }

    fn is_running(&self, name: &str) -> bool {
        bdl_platform::find_processes(name).is_ok_and(|instances| !instances.is_empty())
    }
}
