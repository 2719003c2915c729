use std::fmt;
use std::path::{Path, PathBuf};

use bdl_platform::{StartupEntry, StartupError, startup_command};
use log::debug;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToggleError {
    #[error("launcher not found at {}", path.display())]
    LauncherMissing { path: PathBuf },
    #[error(transparent)]
    Startup(#[from] StartupError),
}

/// Storage for the autostart value.
pub trait AutostartStore {
    /// # Errors
    /// Returns an error if the value cannot be written.
    fn register(&self, command: &str) -> Result<(), StartupError>;
    /// # Errors
    /// Returns an error if the value cannot be removed.
    fn unregister(&self) -> Result<bool, StartupError>;
    /// # Errors
    /// Returns an error if the value cannot be read.
    fn query(&self) -> Result<Option<String>, StartupError>;
}

impl AutostartStore for StartupEntry {
    fn register(&self, command: &str) -> Result<(), StartupError> {
        StartupEntry::register(self, command)
    }

    fn unregister(&self) -> Result<bool, StartupError> {
        StartupEntry::unregister(self)
    }

    fn query(&self) -> Result<Option<String>, StartupError> {
        StartupEntry::query(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    Added { command: String },
    Removed,
    NothingToRemove,
    Registered { command: String },
    NotRegistered,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added { command } => write!(f, "Launcher added to startup: {command}"),
            Self::Removed => f.write_str("Launcher removed from startup"),
            Self::NothingToRemove => f.write_str("Launcher was not in startup"),
            Self::Registered { command } => write!(f, "Launcher is in startup: {command}"),
            Self::NotRegistered => f.write_str("Launcher is not registered for startup"),
        }
    }
}

/// # Errors
/// Returns [`ToggleError::LauncherMissing`] when `launcher` does not exist.
pub fn add(store: &dyn AutostartStore, launcher: &Path) -> Result<Report, ToggleError> {
    if !launcher.is_file() {
        return Err(ToggleError::LauncherMissing {
            path: launcher.to_path_buf(),
        });
    }
    let command = startup_command(launcher);
    debug!("Registering startup command {command}");
    store.register(&command)?;
    Ok(Report::Added { command })
}

/// # Errors
/// Returns an error if the stored value cannot be removed.
pub fn remove(store: &dyn AutostartStore) -> Result<Report, ToggleError> {
    Ok(if store.unregister()? {
        Report::Removed
    } else {
        Report::NothingToRemove
    })
}

/// # Errors
/// Returns an error if the stored value cannot be read.
pub fn status(store: &dyn AutostartStore) -> Result<Report, ToggleError> {
    Ok(match store.query()? {
        Some(command) if !command.is_empty() => Report::Registered { command },
        _ => Report::NotRegistered,
    })
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use bdl_platform::StartupError;

    use super::{AutostartStore, Report, ToggleError, add, remove, status};

    #[derive(Default)]
    struct MemoryStore {
        value: RefCell<Option<String>>,
    }

    impl AutostartStore for MemoryStore {
        fn register(&self, command: &str) -> Result<(), StartupError> {
            *self.value.borrow_mut() = Some(command.to_string());
            Ok(())
        }

        fn unregister(&self) -> Result<bool, StartupError> {
            Ok(self.value.borrow_mut().take().is_some())
        }

        fn query(&self) -> Result<Option<String>, StartupError> {
            Ok(self.value.borrow().clone())
        }
    }

    #[test]
    fn add_refuses_missing_launcher() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let store = MemoryStore::default();

        let result = add(&store, &temp.path().join("bdl-launcher.exe"));

        assert!(matches!(result, Err(ToggleError::LauncherMissing { .. })));
        assert!(store.value.borrow().is_none());
    }

    #[test]
    fn add_status_remove_cycle() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let launcher = temp.path().join("bdl-launcher.exe");
        std::fs::write(&launcher, b"MZ").expect("launcher should be written");
        let store = MemoryStore::default();

        let added = add(&store, &launcher).expect("add should succeed");
        let expected = format!("\"{}\"", launcher.display());
        assert_eq!(
            added,
            Report::Added {
                command: expected.clone()
            }
        );
        assert_eq!(
            status(&store).expect("status should succeed"),
            Report::Registered { command: expected }
        );

        assert_eq!(remove(&store).expect("remove should succeed"), Report::Removed);
        assert_eq!(
            remove(&store).expect("second remove should succeed"),
            Report::NothingToRemove
        );
        assert_eq!(status(&store).expect("status should succeed"), Report::NotRegistered);
    }

    #[test]
    fn empty_value_counts_as_not_registered() {
        let store = MemoryStore::default();
        *store.value.borrow_mut() = Some(String::new());
        assert_eq!(status(&store).expect("status should succeed"), Report::NotRegistered);
    }
}
