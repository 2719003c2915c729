use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bdl_core::{
    FetchError, FetchedAsset, KillReport, LaunchError, LauncherConfig, Orchestrator,
    ProcessControl, ProcessHandle, ReleaseSource, RunOutcome, VersionProbe, VersionReader,
    backup_path,
};
use bdl_platform::LauncherPaths;
use tempfile::TempDir;

const ORIGINAL_ENTRY: &str = "module.exports = require('./core.asar');\n";
const PAYLOAD: &[u8] = b"betterdiscord payload";
const INSTALLER: &[u8] = b"MZ installer";

#[derive(Default)]
struct SourceCalls {
    assets: AtomicUsize,
    installers: AtomicUsize,
}

struct FakeSource {
    available: bool,
    calls: Arc<SourceCalls>,
}

#[async_trait]
impl ReleaseSource for FakeSource {
    async fn fetch_asset(&self) -> Result<FetchedAsset, FetchError> {
        self.calls.assets.fetch_add(1, Ordering::SeqCst);
        if !self.available {
            return Err(FetchError::NoMatchingAsset {
                suffix: ".asar".to_string(),
            });
        }
        Ok(FetchedAsset {
            name: "betterdiscord.asar".to_string(),
            bytes: PAYLOAD.to_vec(),
        })
    }

    async fn fetch_installer(&self) -> Result<Vec<u8>, FetchError> {
        self.calls.installers.fetch_add(1, Ordering::SeqCst);
        Ok(INSTALLER.to_vec())
    }
}

#[derive(Default)]
struct ProcessLog {
    launches: Mutex<Vec<PathBuf>>,
    kills: AtomicUsize,
}

impl ProcessLog {
    fn launches(&self) -> Vec<PathBuf> {
        self.launches.lock().expect("launch log lock").clone()
    }
}

struct FakeProcesses {
    log: Arc<ProcessLog>,
    running: Mutex<VecDeque<bool>>,
    installer: PathBuf,
    installs_into: Option<PathBuf>,
}

impl FakeProcesses {
    fn new(log: &Arc<ProcessLog>, fixture: &Fixture, running: &[bool]) -> Self {
        Self {
            log: Arc::clone(log),
            running: Mutex::new(running.iter().copied().collect()),
            installer: fixture.config.installer_path.clone(),
            installs_into: None,
        }
    }
}

#[async_trait]
impl ProcessControl for FakeProcesses {
    fn launch(&self, path: &Path) -> Result<ProcessHandle, LaunchError> {
        if !path.is_file() {
            return Err(LaunchError::Missing {
                path: path.to_path_buf(),
            });
        }
        let mut launches = self.log.launches.lock().expect("launch log lock");
        launches.push(path.to_path_buf());
        if path == self.installer
            && let Some(mod_root) = &self.installs_into
        {
            std::fs::create_dir_all(mod_root).expect("installer creates mod root");
        }
        Ok(ProcessHandle::untracked(1000 + u32::try_from(launches.len()).unwrap_or(0)))
    }

    fn kill_all_named(&self, _name: &str) -> KillReport {
        self.log.kills.fetch_add(1, Ordering::SeqCst);
        KillReport {
            outcomes: Vec::new(),
            all_terminated: true,
        }
    }

    async fn wait_exit(&self, _handle: &mut ProcessHandle, _timeout: Option<Duration>) -> bool {
        true
    }

    fn is_running(&self, _name: &str) -> bool {
        self.running
            .lock()
            .expect("running script lock")
            .pop_front()
            .unwrap_or(true)
    }
}

struct FixedVersion(Option<&'static str>);

impl VersionReader for FixedVersion {
    fn read_version(&self, _executable: &Path) -> Option<String> {
        self.0.map(str::to_string)
    }
}

struct Fixture {
    _temp: TempDir,
    config: LauncherConfig,
    executable: PathBuf,
    entry: PathBuf,
}

fn fixture() -> Fixture {
    let temp = tempfile::tempdir().expect("create temp dir");
    let paths = LauncherPaths {
        base_dir: temp.path().join("launcher"),
        roaming_dir: temp.path().join("Roaming"),
        local_dir: temp.path().join("Local"),
    };
    paths.ensure_dirs().expect("create launcher dirs");

    let mut config = LauncherConfig::from_paths(&paths);
    config.replace_delay = Duration::from_millis(1);
    config.replace_max_attempts = 3;
    config.launch_grace = Duration::ZERO;

    let app_dir = config.target.install_root.join("app-1.0.9170");
    let core_dir = app_dir
        .join("modules")
        .join("discord_desktop_core-1")
        .join("discord_desktop_core");
    std::fs::create_dir_all(&core_dir).expect("create core module dir");
    let executable = app_dir.join("Discord.exe");
    std::fs::write(&executable, b"MZ").expect("write discord exe");
    let entry = core_dir.join("index.js");
    std::fs::write(&entry, ORIGINAL_ENTRY).expect("write entry file");
    std::fs::create_dir_all(&config.mod_root).expect("create mod root");

    Fixture {
        _temp: temp,
        config,
        executable,
        entry,
    }
}

fn orchestrator(
    fixture: &Fixture,
    version: Option<&'static str>,
    source: FakeSource,
    processes: FakeProcesses,
) -> Orchestrator<FakeSource, FakeProcesses, FixedVersion> {
    let probe = VersionProbe::with_reader(fixture.config.target.clone(), FixedVersion(version));
    Orchestrator::with_probe(fixture.config.clone(), source, processes, probe)
}

fn source(calls: &Arc<SourceCalls>) -> FakeSource {
    FakeSource {
        available: true,
        calls: Arc::clone(calls),
    }
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).expect("read file")
}

fn marker(fixture: &Fixture) -> String {
    read(&fixture.config.marker_file).trim().to_string()
}

#[tokio::test]
async fn first_run_repairs_and_records_version() {
    let fixture = fixture();
    let calls = Arc::new(SourceCalls::default());
    let log = Arc::new(ProcessLog::default());

    let outcome = orchestrator(
        &fixture,
        Some("1.0.9170.0"),
        source(&calls),
        FakeProcesses::new(&log, &fixture, &[]),
    )
    .run()
    .await;

    assert_eq!(outcome, RunOutcome::Launched { repaired: true });
    assert_eq!(calls.assets.load(Ordering::SeqCst), 1);
    assert_eq!(log.kills.load(Ordering::SeqCst), 1);
    assert_eq!(log.launches(), vec![fixture.executable.clone()]);
    assert_eq!(
        std::fs::read(&fixture.config.asset_path).expect("read installed payload"),
        PAYLOAD
    );
    assert!(read(&fixture.entry).contains("betterdiscord.asar"));
    assert_eq!(read(&backup_path(&fixture.entry)), ORIGINAL_ENTRY);
    assert_eq!(marker(&fixture), "1.0.9170.0");
}

#[tokio::test]
async fn consistent_state_skips_repair_on_next_run() {
    let fixture = fixture();
    let calls = Arc::new(SourceCalls::default());
    let log = Arc::new(ProcessLog::default());

    for _ in 0..2 {
        orchestrator(
            &fixture,
            Some("1.0.9170.0"),
            source(&calls),
            FakeProcesses::new(&log, &fixture, &[]),
        )
        .run()
        .await;
    }
    let patched = read(&fixture.entry);

    let outcome = orchestrator(
        &fixture,
        Some("1.0.9170.0"),
        source(&calls),
        FakeProcesses::new(&log, &fixture, &[]),
    )
    .run()
    .await;

    assert_eq!(outcome, RunOutcome::Launched { repaired: false });
    assert_eq!(calls.assets.load(Ordering::SeqCst), 1);
    assert_eq!(log.kills.load(Ordering::SeqCst), 1);
    assert_eq!(log.launches().len(), 3);
    assert_eq!(read(&fixture.entry), patched);
    assert_eq!(read(&backup_path(&fixture.entry)), ORIGINAL_ENTRY);
}

#[tokio::test]
async fn version_change_fetches_fresh_payload() {
    let fixture = fixture();
    let calls = Arc::new(SourceCalls::default());
    let log = Arc::new(ProcessLog::default());

    for version in ["1.0.9170.0", "1.0.9171.0"] {
        let outcome = orchestrator(
            &fixture,
            Some(version),
            source(&calls),
            FakeProcesses::new(&log, &fixture, &[]),
        )
        .run()
        .await;
        assert_eq!(outcome, RunOutcome::Launched { repaired: true });
    }

    assert_eq!(calls.assets.load(Ordering::SeqCst), 2);
    assert_eq!(marker(&fixture), "1.0.9171.0");
    assert_eq!(read(&backup_path(&fixture.entry)), ORIGINAL_ENTRY);
}

#[tokio::test]
async fn unknown_version_repairs_every_run() {
    let fixture = fixture();
    let calls = Arc::new(SourceCalls::default());
    let log = Arc::new(ProcessLog::default());

    for _ in 0..2 {
        let outcome = orchestrator(
            &fixture,
            None,
            source(&calls),
            FakeProcesses::new(&log, &fixture, &[]),
        )
        .run()
        .await;
        assert_eq!(outcome, RunOutcome::Launched { repaired: true });
    }

    assert_eq!(log.kills.load(Ordering::SeqCst), 2);
    assert_eq!(marker(&fixture), "unknown");
}

#[tokio::test]
async fn failed_start_rolls_back_and_relaunches_once() {
    let fixture = fixture();
    let calls = Arc::new(SourceCalls::default());
    let log = Arc::new(ProcessLog::default());

    let outcome = orchestrator(
        &fixture,
        Some("1.0.9170.0"),
        source(&calls),
        FakeProcesses::new(&log, &fixture, &[false, true]),
    )
    .run()
    .await;

    assert_eq!(outcome, RunOutcome::LaunchedAfterRollback);
    assert_eq!(log.launches().len(), 2);
    assert_eq!(read(&fixture.entry), ORIGINAL_ENTRY);
}

#[tokio::test]
async fn failed_start_without_backup_gives_up() {
    let fixture = fixture();
    std::fs::remove_file(&fixture.entry).expect("remove entry file");
    let calls = Arc::new(SourceCalls::default());
    let log = Arc::new(ProcessLog::default());

    let outcome = orchestrator(
        &fixture,
        Some("1.0.9170.0"),
        source(&calls),
        FakeProcesses::new(&log, &fixture, &[false, false]),
    )
    .run()
    .await;

    assert_eq!(outcome, RunOutcome::LaunchFailed);
    assert_eq!(log.launches().len(), 1);
    assert!(!backup_path(&fixture.entry).exists());
    assert!(read(&fixture.entry).contains("betterdiscord.asar"));
}

#[tokio::test]
async fn unavailable_payload_aborts_before_launch() {
    let fixture = fixture();
    let calls = Arc::new(SourceCalls::default());
    let log = Arc::new(ProcessLog::default());
    let unavailable = FakeSource {
        available: false,
        calls: Arc::clone(&calls),
    };

    let outcome = orchestrator(
        &fixture,
        Some("1.0.9170.0"),
        unavailable,
        FakeProcesses::new(&log, &fixture, &[]),
    )
    .run()
    .await;

    assert_eq!(outcome, RunOutcome::RepairFailed);
    assert_eq!(calls.assets.load(Ordering::SeqCst), 1);
    assert!(log.launches().is_empty());
    assert_eq!(read(&fixture.entry), ORIGINAL_ENTRY);
    assert_eq!(marker(&fixture), "");
}

#[tokio::test]
async fn missing_target_stops_the_run() {
    let fixture = fixture();
    std::fs::remove_dir_all(&fixture.config.target.install_root).expect("remove discord");
    let calls = Arc::new(SourceCalls::default());
    let log = Arc::new(ProcessLog::default());

    let outcome = orchestrator(
        &fixture,
        Some("1.0.9170.0"),
        source(&calls),
        FakeProcesses::new(&log, &fixture, &[]),
    )
    .run()
    .await;

    assert_eq!(outcome, RunOutcome::TargetMissing);
    assert_eq!(calls.assets.load(Ordering::SeqCst), 0);
    assert!(log.launches().is_empty());
}

#[tokio::test]
async fn missing_mod_root_runs_installer_then_launches() {
    let fixture = fixture();
    std::fs::remove_dir_all(&fixture.config.mod_root).expect("remove mod root");
    let calls = Arc::new(SourceCalls::default());
    let log = Arc::new(ProcessLog::default());
    let mut processes = FakeProcesses::new(&log, &fixture, &[]);
    processes.installs_into = Some(fixture.config.mod_root.clone());

    let outcome = orchestrator(&fixture, Some("1.0.9170.0"), source(&calls), processes)
        .run()
        .await;

    assert_eq!(outcome, RunOutcome::Installed { launched: true });
    assert_eq!(calls.installers.load(Ordering::SeqCst), 1);
    assert_eq!(calls.assets.load(Ordering::SeqCst), 0);
    assert_eq!(
        log.launches(),
        vec![fixture.config.installer_path.clone(), fixture.executable.clone()]
    );
    assert_eq!(
        std::fs::read(&fixture.config.installer_path).expect("read installer"),
        INSTALLER
    );
}

#[tokio::test]
async fn installer_that_leaves_no_mod_root_fails_install() {
    let fixture = fixture();
    std::fs::remove_dir_all(&fixture.config.mod_root).expect("remove mod root");
    let calls = Arc::new(SourceCalls::default());
    let log = Arc::new(ProcessLog::default());

    let outcome = orchestrator(
        &fixture,
        Some("1.0.9170.0"),
        source(&calls),
        FakeProcesses::new(&log, &fixture, &[]),
    )
    .run()
    .await;

    assert_eq!(outcome, RunOutcome::InstallFailed);
    assert_eq!(log.launches(), vec![fixture.config.installer_path.clone()]);
}
