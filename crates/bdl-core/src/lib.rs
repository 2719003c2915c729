//! Core logic of the BetterDiscord launcher.
//!
//! - Locating the installed Discord and its version ([`VersionProbe`]).
//! - Fetching the payload from the release API ([`AssetFetcher`]).
//! - Swapping the payload into place and patching the entry file
//!   ([`PatchApplier`]).
//! - Starting, stopping and watching Discord ([`ProcessController`]).
//! - Sequencing a launcher run ([`Orchestrator`]).

mod atomic;
pub mod config;
mod marker;
pub mod orchestrator;
pub mod patch;
pub mod probe;
pub mod process;
pub mod release;
pub mod retry;

pub use config::{LauncherConfig, ReleaseConfig, TargetLayout};
pub use marker::{MarkerError, VersionMarker};
pub use orchestrator::{Decision, Orchestrator, RunOutcome};
pub use patch::{
    EntryWrite, FileSwap, PatchApplier, PatchError, RenameSwap, RepairError, RepairReport,
    ReplaceError, apply_entry_patch, backup_path, is_patched, replace_asset_atomically,
    restore_from_backup,
};
pub use probe::{TargetInstall, UNKNOWN_VERSION, VersionProbe, VersionReader};
pub use process::{
    KillOutcome, KillReport, LaunchError, ProcessControl, ProcessController, ProcessHandle,
};
pub use release::{AssetDescriptor, AssetFetcher, FetchError, FetchedAsset, ReleaseSource};
pub use retry::{Attempt, Backoff, RetryError, RetryPolicy};
