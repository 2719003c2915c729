//! Platform glue for the BetterDiscord launcher: per-user paths, the
//! autostart registry entry, executable version metadata, process
//! enumeration, child process windows and the console window.

mod commands;
mod console;
mod file_version;
mod fs;
mod paths;
mod processes;
mod startup;

pub use commands::HideWindow;
pub use console::hide_console_window;
pub use file_version::read_file_version;
pub use fs::{replace_file, temp_sibling};
pub use paths::{LAUNCHER_EXE_NAME, LauncherPaths, LauncherPathsError};
pub use processes::{ProcessInfo, find_processes, terminate};
pub use startup::{DEFAULT_VALUE_NAME, StartupEntry, StartupError, startup_command};
