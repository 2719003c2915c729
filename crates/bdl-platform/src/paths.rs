use std::path::{Path, PathBuf};
use thiserror::Error;

pub const LAUNCHER_EXE_NAME: &str = if cfg!(windows) {
    "bdl-launcher.exe"
} else {
    "bdl-launcher"
};

const MOD_DIR_NAME: &str = "BetterDiscord";
const TARGET_DIR_NAME: &str = "Discord";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LauncherPathsError {
    #[error("Could not determine the launcher executable directory")]
    ExecutableDirUnavailable,
    #[error("Could not determine roaming application data directory")]
    RoamingDirUnavailable,
    #[error("Could not determine local application data directory")]
    LocalDirUnavailable,
}

/// Filesystem locations used by the launcher and the startup toggler.
///
/// `base_dir` is the directory holding the launcher executable; the version
/// cache, log, settings and downloads live next to it.
#[derive(Debug, Clone)]
pub struct LauncherPaths {
    pub base_dir: PathBuf,
    pub roaming_dir: PathBuf,
    pub local_dir: PathBuf,
}

impl LauncherPaths {
    /// Resolve paths for the current user and executable.
    ///
    /// # Errors
    /// Returns an error when the executable location or a per-user data
    /// directory cannot be determined.
    pub fn new() -> Result<Self, LauncherPathsError> {
        let base_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .ok_or(LauncherPathsError::ExecutableDirUnavailable)?;

        Ok(Self {
            base_dir,
            roaming_dir: dirs::config_dir().ok_or(LauncherPathsError::RoamingDirUnavailable)?,
            local_dir: dirs::data_local_dir().ok_or(LauncherPathsError::LocalDirUnavailable)?,
        })
    }

    #[must_use]
    pub fn version_cache_file(&self) -> PathBuf {
        self.base_dir.join("discord_version.cache")
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.base_dir.join("launcher.log")
    }

    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("launcher.json")
    }

    #[must_use]
    pub fn staging_dir(&self) -> PathBuf {
        self.base_dir.join("downloads")
    }

    #[must_use]
    pub fn installer_file(&self) -> PathBuf {
        self.base_dir.join("BetterDiscordInstaller.exe")
    }

    #[must_use]
    pub fn launcher_executable(&self) -> PathBuf {
        self.base_dir.join(LAUNCHER_EXE_NAME)
    }

    /// `%APPDATA%\BetterDiscord`
    #[must_use]
    pub fn mod_root(&self) -> PathBuf {
        self.roaming_dir.join(MOD_DIR_NAME)
    }

    #[must_use]
    pub fn mod_data_dir(&self) -> PathBuf {
        self.mod_root().join("data")
    }

    /// `%LOCALAPPDATA%\Discord`
    #[must_use]
    pub fn target_root(&self) -> PathBuf {
        self.local_dir.join(TARGET_DIR_NAME)
    }

    /// Ensure the directories the launcher writes into exist.
    ///
    /// # Errors
    /// Returns an error if a directory cannot be created.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.staging_dir())?;
        Ok(())
    }
}
