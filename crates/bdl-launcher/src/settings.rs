use std::path::{Path, PathBuf};
use std::time::Duration;

use bdl_core::LauncherConfig;
use bdl_core::config::{DEFAULT_ASSET_SUFFIX, DEFAULT_INSTALLER_URL, DEFAULT_RELEASE_API_URL};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Optional overrides read from `launcher.json` next to the executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LauncherSettings {
    #[serde(default = "default_release_api_url")]
    pub release_api_url: String,

    #[serde(default = "default_asset_suffix")]
    pub asset_suffix: String,

    #[serde(default = "default_installer_url")]
    pub installer_url: String,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_retry_delays")]
    pub download_retry_delays_secs: Vec<u64>,

    #[serde(default = "default_replace_max_attempts")]
    pub replace_max_attempts: u32,

    #[serde(default = "default_replace_delay_ms")]
    pub replace_delay_ms: u64,

    #[serde(default = "default_launch_grace")]
    pub launch_grace_secs: u64,

    /// No limit when absent.
    #[serde(default)]
    pub installer_timeout_secs: Option<u64>,

    #[serde(default = "default_true")]
    pub kill_before_repair: bool,

    #[serde(default)]
    pub debug_logging: bool,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,
}

fn default_release_api_url() -> String {
    DEFAULT_RELEASE_API_URL.to_string()
}

fn default_asset_suffix() -> String {
    DEFAULT_ASSET_SUFFIX.to_string()
}

fn default_installer_url() -> String {
    DEFAULT_INSTALLER_URL.to_string()
}

fn default_http_timeout() -> u64 {
    30
}

fn default_retry_delays() -> Vec<u64> {
    vec![0, 2, 5]
}

fn default_replace_max_attempts() -> u32 {
    20
}

fn default_replace_delay_ms() -> u64 {
    1000
}

fn default_launch_grace() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            release_api_url: default_release_api_url(),
            asset_suffix: default_asset_suffix(),
            installer_url: default_installer_url(),
            http_timeout_secs: default_http_timeout(),
            download_retry_delays_secs: default_retry_delays(),
            replace_max_attempts: default_replace_max_attempts(),
            replace_delay_ms: default_replace_delay_ms(),
            launch_grace_secs: default_launch_grace(),
            installer_timeout_secs: None,
            kill_before_repair: default_true(),
            debug_logging: false,
            max_log_size_bytes: default_max_log_size_bytes(),
        }
    }
}

impl LauncherSettings {
    /// Load settings from `path`. A missing file yields the defaults.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from_path(path: &Path) -> Result<Self, SettingsError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(SettingsError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply(&self, config: &mut LauncherConfig) {
        config.release.api_url.clone_from(&self.release_api_url);
        config.release.asset_suffix.clone_from(&self.asset_suffix);
        config.release.installer_url.clone_from(&self.installer_url);
        config.release.http_timeout = Duration::from_secs(self.http_timeout_secs);
        config.release.download_retry_delays = self
            .download_retry_delays_secs
            .iter()
            .copied()
            .map(Duration::from_secs)
            .collect();
        if config.release.download_retry_delays.is_empty() {
            config.release.download_retry_delays.push(Duration::ZERO);
        }

        config.replace_max_attempts = self.replace_max_attempts.max(1);
        config.replace_delay = Duration::from_millis(self.replace_delay_ms);
        config.launch_grace = Duration::from_secs(self.launch_grace_secs);
        config.installer_timeout = self.installer_timeout_secs.map(Duration::from_secs);
        config.kill_before_repair = self.kill_before_repair;
    }
}
