//! Keeps the payload file and the patched entry file in place while the
//! target application may still hold them open.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::atomic::{stage_sibling, write_atomic};
use crate::config::{LauncherConfig, TargetLayout};
use crate::probe::latest_versioned_dir;
use crate::release::{FetchError, ReleaseSource};
use crate::retry::{Attempt, RetryError, RetryPolicy};

const BACKUP_SUFFIX: &str = ".bak";

#[derive(Debug, Error)]
pub enum ReplaceError {
    #[error("source {} disappeared before attempt {attempt}", path.display())]
    SourceVanished { path: PathBuf, attempt: u32 },
    #[error("could not replace {} after {attempts} attempts: {source}", path.display())]
    ReplaceExhausted {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: io::Error,
    },
    #[error("failed to prepare {}: {source}", path.display())]
    Prepare {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("{context} {}: {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no backup exists for {}", path.display())]
    NoBackup { path: PathBuf },
}

impl PatchError {
    fn io(context: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum RepairError {
    #[error("payload {} is still missing after fetching", path.display())]
    AssetMissing { path: PathBuf },
    #[error(transparent)]
    Replace(#[from] ReplaceError),
    #[error("no patchable core module under {}", app_dir.display())]
    PatchTargetNotFound { app_dir: PathBuf },
    #[error(transparent)]
    Patch(#[from] PatchError),
}

/// How [`apply_entry_patch`] treated the entry file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryWrite {
    /// The entry file did not exist and was created; no backup was taken.
    Created,
    /// The original content was saved to the backup before overwriting.
    BackedUp,
    /// A backup already existed and was left untouched.
    Overwritten,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairReport {
    pub entry_path: PathBuf,
    pub entry_write: EntryWrite,
}

/// Performs the final atomic move of a fully written temporary file over the
/// destination.
pub trait FileSwap: Send + Sync {
    fn swap(&self, staged: &Path, destination: &Path) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RenameSwap;

impl FileSwap for RenameSwap {
    fn swap(&self, staged: &Path, destination: &Path) -> io::Result<()> {
        bdl_platform::replace_file(staged, destination)
    }
}

/// Copy `source` over `destination` through a temporary sibling, retrying the
/// swap while the destination is busy.
///
/// The source is checked before every attempt; if it is gone the operation
/// stops with [`ReplaceError::SourceVanished`] instead of using up the
/// remaining attempts.
///
/// # Errors
/// Returns [`ReplaceError::SourceVanished`], [`ReplaceError::ReplaceExhausted`]
/// or [`ReplaceError::Prepare`] when the destination directory cannot be
/// created.
pub async fn replace_asset_atomically<W: FileSwap + ?Sized>(
    source: &Path,
    destination: &Path,
    policy: &RetryPolicy,
    swap: &W,
) -> Result<(), ReplaceError> {
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ReplaceError::Prepare {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let max_attempts = policy.max_attempts();
    let result = policy
        .run(|attempt| {
            if !source.is_file() {
                return Attempt::Abort(io::Error::from(io::ErrorKind::NotFound));
            }
            match stage_and_swap(source, destination, swap) {
                Ok(()) => Attempt::Done(()),
                Err(error) if error.kind() == io::ErrorKind::NotFound && !source.exists() => {
                    Attempt::Abort(error)
                }
                Err(error) => {
                    warn!(
                        "Replace attempt {attempt}/{max_attempts} for {} failed: {error}",
                        destination.display()
                    );
                    Attempt::Retry(error)
                }
            }
        })
        .await;

    match result {
        Ok(()) => {
            debug!("Replaced {} from {}", destination.display(), source.display());
            Ok(())
        }
        Err(RetryError::Aborted { attempt, .. }) => Err(ReplaceError::SourceVanished {
            path: source.to_path_buf(),
            attempt,
        }),
        Err(RetryError::Exhausted { attempts, last }) => Err(ReplaceError::ReplaceExhausted {
            path: destination.to_path_buf(),
            attempts,
            source: last,
        }),
    }
}

fn stage_and_swap<W: FileSwap + ?Sized>(
    source: &Path,
    destination: &Path,
    swap: &W,
) -> io::Result<()> {
    let staged = stage_sibling(destination, |file| {
        let mut input = File::open(source)?;
        io::copy(&mut input, file).map(|_| ())
    })?;

    if let Err(error) = swap.swap(&staged, destination) {
        let _ = std::fs::remove_file(&staged);
        return Err(error);
    }
    Ok(())
}

/// Sibling file holding the entry file's pre-patch content.
#[must_use]
pub fn backup_path(entry_path: &Path) -> PathBuf {
    let mut name = entry_path.as_os_str().to_owned();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Write `patch_text` into the entry file.
///
/// A missing entry file is created from nothing and gets no backup. An
/// existing one is copied to its backup first, but only if no backup exists
/// yet: the backup always holds the content from before the first patch.
///
/// # Errors
/// Returns an error if the backup or the entry file cannot be written.
pub fn apply_entry_patch(entry_path: &Path, patch_text: &str) -> Result<EntryWrite, PatchError> {
    if !entry_path.exists() {
        if let Some(parent) = entry_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|error| PatchError::io("failed to create directory", parent, error))?;
        }
        std::fs::write(entry_path, patch_text)
            .map_err(|error| PatchError::io("failed to create entry file", entry_path, error))?;
        return Ok(EntryWrite::Created);
    }

    let backup = backup_path(entry_path);
    let outcome = if backup.exists() {
        EntryWrite::Overwritten
    } else {
        std::fs::copy(entry_path, &backup)
            .map_err(|error| PatchError::io("failed to back up entry file", &backup, error))?;
        EntryWrite::BackedUp
    };

    std::fs::write(entry_path, patch_text)
        .map_err(|error| PatchError::io("failed to write entry file", entry_path, error))?;
    Ok(outcome)
}

#[must_use]
pub fn is_patched(entry_path: &Path, marker: &str) -> bool {
    std::fs::read(entry_path)
        .map(|content| String::from_utf8_lossy(&content).contains(marker))
        .unwrap_or(false)
}

/// Put the pre-patch content back into the entry file.
///
/// # Errors
/// Returns [`PatchError::NoBackup`] when there is nothing to restore, or an
/// I/O error if the entry file cannot be overwritten.
pub fn restore_from_backup(entry_path: &Path) -> Result<(), PatchError> {
    let backup = backup_path(entry_path);
    if !backup.is_file() {
        return Err(PatchError::NoBackup {
            path: entry_path.to_path_buf(),
        });
    }

    let content = std::fs::read(&backup)
        .map_err(|error| PatchError::io("failed to read backup", &backup, error))?;
    std::fs::write(entry_path, content)
        .map_err(|error| PatchError::io("failed to restore entry file", entry_path, error))
}

/// Entry file of the newest core module under `app_dir`, if that module is
/// installed.
#[must_use]
pub fn locate_patch_target(layout: &TargetLayout, app_dir: &Path) -> Option<PathBuf> {
    let modules = app_dir.join(&layout.modules_dir);
    let module = latest_versioned_dir(&modules, &layout.core_module_prefix)?;
    let core_dir = module.join(&layout.core_module_dir);
    core_dir
        .is_dir()
        .then(|| core_dir.join(&layout.entry_file_name))
}

/// Entry file content that loads the payload ahead of the stock core module.
#[must_use]
pub fn patch_text(asset_path: &Path) -> String {
    let escaped = asset_path
        .to_string_lossy()
        .replace('\\', "\\\\")
        .replace('"', "\\\"");
    format!("require(\"{escaped}\");\nmodule.exports = require(\"./core.asar\");\n")
}

pub struct PatchApplier<W = RenameSwap> {
    staged_asset: PathBuf,
    asset_path: PathBuf,
    layout: TargetLayout,
    replace_policy: RetryPolicy,
    swap: W,
}

impl PatchApplier<RenameSwap> {
    #[must_use]
    pub fn new(config: &LauncherConfig) -> Self {
        Self::with_swap(config, RenameSwap)
    }
}

impl<W: FileSwap> PatchApplier<W> {
    pub fn with_swap(config: &LauncherConfig, swap: W) -> Self {
        Self {
            staged_asset: config.staged_asset_path(),
            asset_path: config.asset_path.clone(),
            layout: config.target.clone(),
            replace_policy: RetryPolicy::fixed(config.replace_max_attempts, config.replace_delay),
            swap,
        }
    }

    #[must_use]
    pub fn staged_asset(&self) -> &Path {
        &self.staged_asset
    }

    #[must_use]
    pub fn asset_path(&self) -> &Path {
        &self.asset_path
    }

    /// Fetch the payload into the staging directory unless it is already
    /// there. Callers must re-check the staged file afterwards.
    ///
    /// # Errors
    /// Returns an error if the payload cannot be fetched or written.
    pub async fn ensure_asset_present(&self, source: &dyn ReleaseSource) -> Result<(), FetchError> {
        if self.staged_asset.is_file() {
            return Ok(());
        }

        let fetched = source.fetch_asset().await?;
        let io_error = |context, source| FetchError::Io {
            context,
            path: self.staged_asset.display().to_string(),
            source,
        };
        if let Some(parent) = self.staged_asset.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|source| io_error("failed to create staging directory", source))?;
        }
        write_atomic(&self.staged_asset, &fetched.bytes)
            .map_err(|source| io_error("failed to write", source))?;

        info!(
            "Fetched {} ({} bytes) to {}",
            fetched.name,
            fetched.bytes.len(),
            self.staged_asset.display()
        );
        Ok(())
    }

    /// Remove the staged payload so the next cycle downloads a fresh one.
    pub fn discard_staged_asset(&self) {
        match std::fs::remove_file(&self.staged_asset) {
            Ok(()) => debug!("Discarded staged {}", self.staged_asset.display()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => warn!(
                "Failed to discard staged {}: {error}",
                self.staged_asset.display()
            ),
        }
    }

    /// # Errors
    /// See [`replace_asset_atomically`].
    pub async fn replace_asset(&self) -> Result<(), ReplaceError> {
        replace_asset_atomically(
            &self.staged_asset,
            &self.asset_path,
            &self.replace_policy,
            &self.swap,
        )
        .await
    }

    #[must_use]
    pub fn locate_patch_target(&self, app_dir: &Path) -> Option<PathBuf> {
        locate_patch_target(&self.layout, app_dir)
    }

    #[must_use]
    pub fn patch_text(&self) -> String {
        patch_text(&self.asset_path)
    }

    /// One full repair cycle: make sure the payload is staged, swap it into
    /// place, and patch the entry file of the newest core module.
    ///
    /// # Errors
    /// Returns the step that failed; nothing after it has been attempted.
    pub async fn repair(
        &self,
        source: &dyn ReleaseSource,
        app_dir: &Path,
    ) -> Result<RepairReport, RepairError> {
        if !self.staged_asset.is_file() {
            info!("Payload not staged, fetching latest release");
            if let Err(fetch_error) = self.ensure_asset_present(source).await {
                error!("Failed to fetch payload: {fetch_error}");
            }
        }
        if !self.staged_asset.is_file() {
            return Err(RepairError::AssetMissing {
                path: self.staged_asset.clone(),
            });
        }

        self.replace_asset().await?;
        info!("Payload installed at {}", self.asset_path.display());

        let entry_path =
            self.locate_patch_target(app_dir)
                .ok_or_else(|| RepairError::PatchTargetNotFound {
                    app_dir: app_dir.to_path_buf(),
                })?;

        let entry_write = apply_entry_patch(&entry_path, &self.patch_text())?;
        info!("Patched {} ({entry_write:?})", entry_path.display());

        Ok(RepairReport {
            entry_path,
            entry_write,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{
        EntryWrite, PatchError, apply_entry_patch, backup_path, is_patched, locate_patch_target,
        patch_text, restore_from_backup,
    };
    use crate::config::TargetLayout;

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).expect("file should be readable")
    }

    #[test]
    fn creating_entry_from_nothing_writes_patch_without_backup() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let entry = temp.path().join("discord_desktop_core").join("index.js");

        let outcome = apply_entry_patch(&entry, "P").expect("patch should apply");

        assert_eq!(outcome, EntryWrite::Created);
        assert_eq!(read(&entry), "P");
        assert!(!backup_path(&entry).exists());
    }

    #[test]
    fn backup_keeps_original_content_across_repeated_patches() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let entry = temp.path().join("index.js");
        std::fs::write(&entry, "X").expect("entry should be written");

        assert_eq!(
            apply_entry_patch(&entry, "Y").expect("first patch should apply"),
            EntryWrite::BackedUp
        );
        assert_eq!(read(&backup_path(&entry)), "X");
        assert_eq!(read(&entry), "Y");

        assert_eq!(
            apply_entry_patch(&entry, "Z").expect("second patch should apply"),
            EntryWrite::Overwritten
        );
        assert_eq!(read(&backup_path(&entry)), "X");
        assert_eq!(read(&entry), "Z");
    }

    #[test]
    fn applying_same_patch_twice_is_idempotent() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let entry = temp.path().join("index.js");
        std::fs::write(&entry, "module.exports = require('./core.asar');")
            .expect("entry should be written");

        apply_entry_patch(&entry, "P").expect("first patch should apply");
        let entry_after_first = read(&entry);
        let backup_after_first = read(&backup_path(&entry));

        apply_entry_patch(&entry, "P").expect("second patch should apply");

        assert_eq!(read(&entry), entry_after_first);
        assert_eq!(read(&backup_path(&entry)), backup_after_first);
    }

    #[test]
    fn is_patched_requires_existing_file_with_marker() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let entry = temp.path().join("index.js");
        assert!(!is_patched(&entry, "betterdiscord.asar"));

        std::fs::write(&entry, "module.exports = require('./core.asar');")
            .expect("entry should be written");
        assert!(!is_patched(&entry, "betterdiscord.asar"));

        std::fs::write(&entry, patch_text(Path::new("/data/betterdiscord.asar")))
            .expect("entry should be written");
        assert!(is_patched(&entry, "betterdiscord.asar"));
    }

    #[test]
    fn restore_from_backup_reverts_entry() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let entry = temp.path().join("index.js");
        std::fs::write(&entry, "original").expect("entry should be written");
        apply_entry_patch(&entry, "patched").expect("patch should apply");

        restore_from_backup(&entry).expect("restore should succeed");

        assert_eq!(read(&entry), "original");
        assert_eq!(read(&backup_path(&entry)), "original");
    }

    #[test]
    fn restore_without_backup_reports_no_backup() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let entry = temp.path().join("index.js");
        apply_entry_patch(&entry, "patched").expect("patch should apply");

        let result = restore_from_backup(&entry);

        assert!(matches!(result, Err(PatchError::NoBackup { .. })));
        assert_eq!(read(&entry), "patched");
    }

    #[test]
    fn patch_text_escapes_windows_paths() {
        let text = patch_text(Path::new("C:\\BD\\data\\betterdiscord.asar"));

        assert_eq!(
            text,
            "require(\"C:\\\\BD\\\\data\\\\betterdiscord.asar\");\n\
             module.exports = require(\"./core.asar\");\n"
        );
    }

    #[test]
    fn locate_patch_target_uses_newest_core_module() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let app_dir = temp.path().join("app-1.0.9170");
        let layout = TargetLayout::discord(temp.path().to_path_buf());
        assert!(locate_patch_target(&layout, &app_dir).is_none());

        for module in ["discord_desktop_core-1", "discord_desktop_core-3"] {
            std::fs::create_dir_all(
                app_dir
                    .join("modules")
                    .join(module)
                    .join("discord_desktop_core"),
            )
            .expect("module dir should be created");
        }
        std::fs::create_dir_all(app_dir.join("modules").join("discord_voice-1"))
            .expect("module dir should be created");

        let entry = locate_patch_target(&layout, &app_dir).expect("entry should be located");
        assert!(entry.ends_with(
            Path::new("discord_desktop_core-3")
                .join("discord_desktop_core")
                .join("index.js")
        ));
    }

    #[test]
    fn locate_patch_target_requires_inner_core_dir() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let app_dir = temp.path().join("app-1");
        std::fs::create_dir_all(app_dir.join("modules").join("discord_desktop_core-2"))
            .expect("module dir should be created");

        let layout = TargetLayout::discord(temp.path().to_path_buf());
        assert!(locate_patch_target(&layout, &app_dir).is_none());
    }
}
