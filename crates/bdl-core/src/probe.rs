use std::path::{Path, PathBuf};

use log::debug;

use crate::config::TargetLayout;

/// Version reported when the executable carries no readable version
/// resource. Never equal to a cached marker, so it always forces a repair.
pub const UNKNOWN_VERSION: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetInstall {
    pub app_dir: PathBuf,
    pub executable: PathBuf,
    pub version: String,
}

impl TargetInstall {
    #[must_use]
    pub fn version_is_known(&self) -> bool {
        self.version != UNKNOWN_VERSION
    }
}

pub trait VersionReader {
    fn read_version(&self, executable: &Path) -> Option<String>;
}

/// Reads the executable's embedded file version resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileVersionReader;

impl VersionReader for FileVersionReader {
    fn read_version(&self, executable: &Path) -> Option<String> {
        bdl_platform::read_file_version(executable)
    }
}

#[derive(Debug, Clone)]
pub struct VersionProbe<R = FileVersionReader> {
    layout: TargetLayout,
    reader: R,
}

impl VersionProbe<FileVersionReader> {
    #[must_use]
    pub fn new(layout: TargetLayout) -> Self {
        Self::with_reader(layout, FileVersionReader)
    }
}

impl<R: VersionReader> VersionProbe<R> {
    pub fn with_reader(layout: TargetLayout, reader: R) -> Self {
        Self { layout, reader }
    }

    /// Locate the newest installed version and read its version string.
    pub fn probe(&self) -> Option<TargetInstall> {
        let app_dir = latest_versioned_dir(&self.layout.install_root, &self.layout.app_dir_prefix)?;
        let executable = app_dir.join(&self.layout.executable_name);
        if !executable.is_file() {
            debug!("{} not found", executable.display());
            return None;
        }

        let version = self
            .reader
            .read_version(&executable)
            .filter(|version| !version.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string());

        Some(TargetInstall {
            app_dir,
            executable,
            version,
        })
    }
}

/// The lexicographically greatest subdirectory of `base` whose name starts
/// with `prefix`.
#[must_use]
pub fn latest_versioned_dir(base: &Path, prefix: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(base).ok()?;
    entries
        .flatten()
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            name.starts_with(prefix).then_some(name)
        })
        .max()
        .map(|name| base.join(name))
}
