mod logging;
mod settings;

use std::io::{self, BufRead, Write};

use bdl_core::{AssetFetcher, LauncherConfig, Orchestrator, ProcessController, RunOutcome};
use bdl_platform::LauncherPaths;
use clap::Parser;
use log::{error, info, warn};

use crate::logging::{LogOptions, init_logging};
use crate::settings::LauncherSettings;

#[derive(Debug, Parser)]
#[command(
    name = "bdl-launcher",
    version,
    about = "Keeps BetterDiscord injected into Discord and starts Discord"
)]
struct Cli {
    /// Keep the console window open and mirror the log to it.
    #[arg(long)]
    console: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if !cli.console {
        bdl_platform::hide_console_window();
    }

    let paths = match LauncherPaths::new() {
        Ok(paths) => paths,
        Err(error) => {
            eprintln!("{error}");
            return;
        }
    };
    if let Err(error) = paths.ensure_dirs() {
        eprintln!(
            "Failed to create launcher directories in {}: {error}",
            paths.base_dir.display()
        );
    }

    let (settings, settings_error) = match LauncherSettings::load_from_path(&paths.settings_file())
    {
        Ok(settings) => (settings, None),
        Err(error) => (LauncherSettings::default(), Some(error)),
    };

    init_logging(
        &paths.log_file(),
        LogOptions {
            console: cli.console,
            debug: settings.debug_logging,
            max_size: settings.max_log_size_bytes,
        },
    );
    info!("BetterDiscord launcher {} starting", env!("CARGO_PKG_VERSION"));
    if let Some(error) = settings_error {
        warn!("{error}; using default settings");
    }

    let mut config = LauncherConfig::from_paths(&paths);
    settings.apply(&mut config);

    let outcome = run(config).await;
    info!("Launcher finished: {outcome:?}");

    if cli.console {
        wait_for_enter();
    }
}

async fn run(config: LauncherConfig) -> Option<RunOutcome> {
    let fetcher = match AssetFetcher::new(&config.release) {
        Ok(fetcher) => fetcher,
        Err(error) => {
            error!("Failed to set up HTTP client: {error}");
            return None;
        }
    };

    Some(
        Orchestrator::new(config, fetcher, ProcessController)
            .run()
            .await,
    )
}

fn wait_for_enter() {
    print!("Press Enter to exit...");
    let _ = io::stdout().flush();
    let mut line = String::new();
    let _ = io::stdin().lock().read_line(&mut line);
}
