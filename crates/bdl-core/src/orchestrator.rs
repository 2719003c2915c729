use std::path::{Path, PathBuf};

use log::{error, info, warn};

use crate::atomic::write_atomic;
use crate::config::LauncherConfig;
use crate::marker::VersionMarker;
use crate::patch::{PatchApplier, PatchError, is_patched, restore_from_backup};
use crate::probe::{FileVersionReader, TargetInstall, UNKNOWN_VERSION, VersionProbe, VersionReader};
use crate::process::ProcessControl;
use crate::release::ReleaseSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The modification is not installed at all.
    Install,
    /// On-disk state drifted; `version_changed` means the target updated
    /// since the last successful cycle.
    Repair { version_changed: bool },
    Skip,
}

#[derive(Debug, Clone, Copy)]
pub struct DriftState<'a> {
    pub mod_installed: bool,
    pub asset_present: bool,
    pub entry_patched: bool,
    pub current_version: &'a str,
    pub saved_version: &'a str,
}

#[must_use]
pub fn decide(state: &DriftState<'_>) -> Decision {
    if !state.mod_installed {
        return Decision::Install;
    }

    let version_changed =
        state.current_version == UNKNOWN_VERSION || state.current_version != state.saved_version;
    if version_changed || !state.asset_present || !state.entry_patched {
        Decision::Repair { version_changed }
    } else {
        Decision::Skip
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    TargetMissing,
    InstallFailed,
    Installed { launched: bool },
    RepairFailed,
    Launched { repaired: bool },
    LaunchedAfterRollback,
    LaunchFailed,
}

/// Runs one launcher pass: probe, decide, repair or install, launch.
pub struct Orchestrator<S, P, R = FileVersionReader> {
    config: LauncherConfig,
    source: S,
    processes: P,
    probe: VersionProbe<R>,
    applier: PatchApplier,
    marker: VersionMarker,
}

impl<S: ReleaseSource, P: ProcessControl> Orchestrator<S, P, FileVersionReader> {
    pub fn new(config: LauncherConfig, source: S, processes: P) -> Self {
        let probe = VersionProbe::new(config.target.clone());
        Self::with_probe(config, source, processes, probe)
    }
}

impl<S: ReleaseSource, P: ProcessControl, R: VersionReader> Orchestrator<S, P, R> {
    pub fn with_probe(
        config: LauncherConfig,
        source: S,
        processes: P,
        probe: VersionProbe<R>,
    ) -> Self {
        let applier = PatchApplier::new(&config);
        let marker = VersionMarker::new(config.marker_file.clone());
        Self {
            config,
            source,
            processes,
            probe,
            applier,
            marker,
        }
    }

    pub async fn run(&self) -> RunOutcome {
        if let Err(error) = self.marker.ensure_exists() {
            warn!("{error}");
        }

        let Some(install) = self.probe.probe() else {
            error!(
                "Discord not found under {}",
                self.config.target.install_root.display()
            );
            return RunOutcome::TargetMissing;
        };
        info!("Discord found: {}", install.executable.display());
        info!("Current Discord version: {}", install.version);
        if !install.version_is_known() {
            warn!("Discord version is unreadable; BetterDiscord will be repaired on every start");
        }

        let saved_version = self.marker.load().unwrap_or_else(|error| {
            warn!("{error}");
            String::new()
        });
        info!("Saved Discord version: {saved_version}");

        let entry_path = self.applier.locate_patch_target(&install.app_dir);
        let marker = self.config.patch_marker();
        let decision = decide(&DriftState {
            mod_installed: self.config.mod_root.is_dir(),
            asset_present: self.config.asset_path.is_file(),
            entry_patched: entry_path
                .as_deref()
                .is_some_and(|entry| is_patched(entry, &marker)),
            current_version: &install.version,
            saved_version: &saved_version,
        });

        match decision {
            Decision::Install => {
                info!(
                    "{} not found, starting installation",
                    self.config.mod_root.display()
                );
                self.install(&install).await
            }
            Decision::Repair { version_changed } => {
                info!("Repairing BetterDiscord (version changed: {version_changed})");
                let Some(entry_path) = self.repair(&install, version_changed).await else {
                    return RunOutcome::RepairFailed;
                };
                self.launch_with_fallback(&install.executable, Some(&entry_path), true)
                    .await
            }
            Decision::Skip => {
                info!("BetterDiscord is up to date");
                self.launch_with_fallback(&install.executable, entry_path.as_deref(), false)
                    .await
            }
        }
    }

    async fn repair(&self, install: &TargetInstall, version_changed: bool) -> Option<PathBuf> {
        if version_changed {
            self.applier.discard_staged_asset();
        }

        if self.config.kill_before_repair {
            let report = self.processes.kill_all_named(&self.config.target.process_name);
            if !report.outcomes.is_empty() {
                info!(
                    "Stopped {} of {} {} instances",
                    report.killed(),
                    report.outcomes.len(),
                    self.config.target.process_name
                );
            }
            if !report.all_terminated {
                warn!(
                    "{} is still running; replacing files under contention",
                    self.config.target.process_name
                );
            }
        }

        match self.applier.repair(&self.source, &install.app_dir).await {
            Ok(report) => {
                if let Err(error) = self.marker.store(&install.version) {
                    warn!("{error}");
                }
                info!("BetterDiscord repaired for Discord {}", install.version);
                Some(report.entry_path)
            }
            Err(error) => {
                error!("Repair failed: {error}");
                None
            }
        }
    }

    async fn install(&self, install: &TargetInstall) -> RunOutcome {
        let installer = match self.source.fetch_installer().await {
            Ok(bytes) => bytes,
            Err(error) => {
                error!("Failed to download installer: {error}");
                return RunOutcome::InstallFailed;
            }
        };

        let installer_path = &self.config.installer_path;
        if let Err(error) = write_atomic(installer_path, &installer) {
            error!("Failed to save installer to {}: {error}", installer_path.display());
            return RunOutcome::InstallFailed;
        }
        info!("Installer saved to {}", installer_path.display());

        let mut handle = match self.processes.launch(installer_path) {
            Ok(handle) => handle,
            Err(error) => {
                error!("Failed to start installer: {error}");
                return RunOutcome::InstallFailed;
            }
        };
        info!("Installer started, waiting for it to exit");
        if !self
            .processes
            .wait_exit(&mut handle, self.config.installer_timeout)
            .await
        {
            warn!("Installer did not report exit");
        }

        if !self.config.mod_root.is_dir() {
            error!(
                "{} still missing after installation",
                self.config.mod_root.display()
            );
            return RunOutcome::InstallFailed;
        }

        info!("BetterDiscord installed, launching Discord");
        RunOutcome::Installed {
            launched: self.launch_and_confirm(&install.executable).await,
        }
    }

    async fn launch_with_fallback(
        &self,
        executable: &Path,
        entry_path: Option<&Path>,
        repaired: bool,
    ) -> RunOutcome {
        if self.launch_and_confirm(executable).await {
            return RunOutcome::Launched { repaired };
        }

        let Some(entry_path) = entry_path else {
            error!("Discord did not start and there is no entry file to roll back");
            return RunOutcome::LaunchFailed;
        };

        warn!("Discord did not start, restoring {}", entry_path.display());
        match restore_from_backup(entry_path) {
            Ok(()) => info!("Entry file restored from backup"),
            Err(error @ PatchError::NoBackup { .. }) => {
                error!("{error}");
                return RunOutcome::LaunchFailed;
            }
            Err(error) => {
                error!("Rollback failed: {error}");
                return RunOutcome::LaunchFailed;
            }
        }

        if self.launch_and_confirm(executable).await {
            RunOutcome::LaunchedAfterRollback
        } else {
            error!("Discord did not start after rollback");
            RunOutcome::LaunchFailed
        }
    }

    async fn launch_and_confirm(&self, executable: &Path) -> bool {
        info!("Launching {}", executable.display());
        if let Err(error) = self.processes.launch(executable) {
            error!("{error}");
            return false;
        }

        tokio::time::sleep(self.config.launch_grace).await;
        let running = self.processes.is_running(&self.config.target.process_name);
        if running {
            info!("Discord is running");
        }
        running
    }
}
