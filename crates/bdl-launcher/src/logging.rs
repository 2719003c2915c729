use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};

/// Append-only log file that is reopened when something deletes it between
/// writes.
struct ReopeningLogFile {
    path: PathBuf,
    file: Option<File>,
}

impl ReopeningLogFile {
    fn open(path: PathBuf) -> io::Result<Self> {
        let file = open_append(&path)?;
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    fn current(&mut self) -> io::Result<&mut File> {
        let file = match self.file.take() {
            Some(file) if self.path.exists() => file,
            _ => {
                if let Some(parent) = self.path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                open_append(&self.path)?
            }
        };
        Ok(self.file.insert(file))
    }
}

impl Write for ReopeningLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.current()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Drop the older half of the log once it grows past `max_size`, cutting at
/// a line boundary. Returns whether the file was trimmed.
fn trim_to_newest_half(log_path: &Path, max_size: u64) -> bool {
    let oversized = std::fs::metadata(log_path).is_ok_and(|meta| meta.len() > max_size);
    if !oversized {
        return false;
    }
    let Ok(contents) = std::fs::read(log_path) else {
        return false;
    };

    let middle = contents.len() / 2;
    let keep_from = contents[middle..]
        .iter()
        .position(|&byte| byte == b'\n')
        .map_or(middle, |offset| middle + offset + 1);
    std::fs::write(log_path, &contents[keep_from..]).is_ok()
}

#[derive(Debug, Clone, Copy)]
pub struct LogOptions {
    pub console: bool,
    pub debug: bool,
    pub max_size: u64,
}

fn level_for(options: LogOptions) -> LevelFilter {
    if options.debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Route `log` records from the launcher crates to `log_path`, and to the
/// terminal as well when running with a console.
pub fn init_logging(log_path: &Path, options: LogOptions) {
    let trimmed = trim_to_newest_half(log_path, options.max_size);

    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str("bdl")
        .build();
    let level = level_for(options);

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    match ReopeningLogFile::open(log_path.to_path_buf()) {
        Ok(writer) => loggers.push(WriteLogger::new(level, config.clone(), writer)),
        Err(error) => eprintln!("Cannot open log file {}: {error}", log_path.display()),
    }
    if options.console {
        loggers.push(TermLogger::new(
            level,
            config,
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ));
    }

    if loggers.is_empty() || CombinedLogger::init(loggers).is_err() {
        return;
    }
    if trimmed {
        log::debug!("Trimmed {} to its newest half", log_path.display());
    }
}
