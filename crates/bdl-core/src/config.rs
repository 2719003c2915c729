use std::path::{Path, PathBuf};
use std::time::Duration;

use bdl_platform::LauncherPaths;

pub const ASSET_FILE_NAME: &str = "betterdiscord.asar";
pub const DEFAULT_RELEASE_API_URL: &str =
    "https://api.github.com/repos/BetterDiscord/BetterDiscord/releases/latest";
pub const DEFAULT_ASSET_SUFFIX: &str = ".asar";
pub const DEFAULT_INSTALLER_URL: &str =
    "https://github.com/BetterDiscord/Installer/releases/latest/download/BetterDiscord-Windows.exe";

/// Where the target application lives and how its core module is laid out.
#[derive(Debug, Clone)]
pub struct TargetLayout {
    pub install_root: PathBuf,
    pub app_dir_prefix: String,
    pub executable_name: String,
    pub process_name: String,
    pub modules_dir: String,
    pub core_module_prefix: String,
    pub core_module_dir: String,
    pub entry_file_name: String,
}

impl TargetLayout {
    #[must_use]
    pub fn discord(install_root: PathBuf) -> Self {
        Self {
            install_root,
            app_dir_prefix: "app-".to_string(),
            executable_name: "Discord.exe".to_string(),
            process_name: "Discord.exe".to_string(),
            modules_dir: "modules".to_string(),
            core_module_prefix: "discord_desktop_core-".to_string(),
            core_module_dir: "discord_desktop_core".to_string(),
            entry_file_name: "index.js".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReleaseConfig {
    pub api_url: String,
    pub asset_suffix: String,
    pub installer_url: String,
    pub user_agent: String,
    pub http_timeout: Duration,
    pub download_retry_delays: Vec<Duration>,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_RELEASE_API_URL.to_string(),
            asset_suffix: DEFAULT_ASSET_SUFFIX.to_string(),
            installer_url: DEFAULT_INSTALLER_URL.to_string(),
            user_agent: format!("BetterDiscordLauncher/{}", env!("CARGO_PKG_VERSION")),
            http_timeout: Duration::from_secs(30),
            download_retry_delays: vec![
                Duration::ZERO,
                Duration::from_secs(2),
                Duration::from_secs(5),
            ],
        }
    }
}

/// Everything one launcher run needs, resolved up front and passed to each
/// component.
#[derive(Debug, Clone)]
pub struct LauncherConfig {
    pub target: TargetLayout,
    pub mod_root: PathBuf,
    pub asset_path: PathBuf,
    pub staging_dir: PathBuf,
    pub marker_file: PathBuf,
    pub installer_path: PathBuf,
    pub release: ReleaseConfig,
    pub replace_max_attempts: u32,
    pub replace_delay: Duration,
    pub launch_grace: Duration,
    pub installer_timeout: Option<Duration>,
    pub kill_before_repair: bool,
}

impl LauncherConfig {
    #[must_use]
    pub fn from_paths(paths: &LauncherPaths) -> Self {
        Self {
            target: TargetLayout::discord(paths.target_root()),
            mod_root: paths.mod_root(),
            asset_path: paths.mod_data_dir().join(ASSET_FILE_NAME),
            staging_dir: paths.staging_dir(),
            marker_file: paths.version_cache_file(),
            installer_path: paths.installer_file(),
            release: ReleaseConfig::default(),
            replace_max_attempts: 20,
            replace_delay: Duration::from_secs(1),
            launch_grace: Duration::from_secs(5),
            installer_timeout: None,
            kill_before_repair: true,
        }
    }

    /// The downloaded payload waiting to be swapped into `asset_path`.
    #[must_use]
    pub fn staged_asset_path(&self) -> PathBuf {
        let name = self
            .asset_path
            .file_name()
            .map_or_else(|| ASSET_FILE_NAME.into(), ToOwned::to_owned);
        self.staging_dir.join(name)
    }

    /// Substring whose presence in the entry file means it loads the payload.
    #[must_use]
    pub fn patch_marker(&self) -> String {
        file_name_or(&self.asset_path, ASSET_FILE_NAME)
    }
}

fn file_name_or(path: &Path, fallback: &str) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(fallback)
        .to_string()
}
