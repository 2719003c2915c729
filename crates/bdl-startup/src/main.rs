mod toggle;

use std::io::{self, BufRead, Write};
use std::path::Path;

use bdl_platform::{LauncherPaths, StartupEntry};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

use crate::toggle::{AutostartStore, Report, ToggleError};

#[derive(Debug, Parser)]
#[command(
    name = "bdl-startup",
    version,
    about = "Adds or removes the BetterDiscord launcher from Windows startup"
)]
struct Cli {
    /// Print diagnostic output.
    #[arg(long, global = true)]
    verbose: bool,

    /// Without a command, an interactive menu is shown.
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
enum Command {
    /// Start the launcher when the current user logs in.
    Add,
    /// Stop starting the launcher at login.
    Remove,
    /// Show the registered startup command.
    Status,
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let _ = TermLogger::init(
        level,
        ConfigBuilder::new().add_filter_allow_str("bdl").build(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    );

    let paths = match LauncherPaths::new() {
        Ok(paths) => paths,
        Err(error) => {
            eprintln!("Error: {error}");
            std::process::exit(1);
        }
    };
    let launcher = paths.launcher_executable();
    let entry = StartupEntry::default();

    match cli.command {
        Some(command) => {
            if let Err(error) = execute(command, &entry, &launcher) {
                eprintln!("Error: {error}");
                std::process::exit(1);
            }
        }
        None => interactive(&entry, &launcher),
    }
}

fn execute(
    command: Command,
    store: &dyn AutostartStore,
    launcher: &Path,
) -> Result<(), ToggleError> {
    let report: Report = match command {
        Command::Add => toggle::add(store, launcher)?,
        Command::Remove => toggle::remove(store)?,
        Command::Status => toggle::status(store)?,
    };
    println!("{report}");
    Ok(())
}

fn menu_choice(input: &str) -> Option<Option<Command>> {
    match input.trim() {
        "1" => Some(Some(Command::Add)),
        "2" => Some(Some(Command::Remove)),
        "3" => Some(Some(Command::Status)),
        "4" | "q" => Some(None),
        _ => None,
    }
}

fn interactive(store: &dyn AutostartStore, launcher: &Path) {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        println!("=== BetterDiscord Launcher Autostart Manager ===");
        println!("Launcher path:\n{}\n", launcher.display());
        println!("1. Add to startup");
        println!("2. Remove from startup");
        println!("3. Check startup status");
        println!("4. Exit");
        print!("Choose an option (1-4): ");
        let _ = io::stdout().flush();

        let Some(Ok(line)) = lines.next() else {
            return;
        };
        match menu_choice(&line) {
            Some(Some(command)) => {
                if let Err(error) = execute(command, store, launcher) {
                    println!("Error: {error}");
                }
            }
            Some(None) => return,
            None => println!("Invalid choice, try again."),
        }
        println!();
    }
}
