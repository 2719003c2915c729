use std::io;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
}

/// List running processes whose executable name equals `name`
/// (case-insensitive, `.exe` suffix optional).
///
/// # Errors
/// Returns an error if the process table cannot be enumerated.
pub fn find_processes(name: &str) -> io::Result<Vec<ProcessInfo>> {
    imp::find_processes(name)
}

/// Forcefully terminate the process with the given id.
///
/// # Errors
/// Returns an error if the process cannot be opened or terminated.
pub fn terminate(pid: u32) -> io::Result<()> {
    imp::terminate(pid)
}

#[cfg_attr(not(windows), allow(dead_code))]
fn names_match(candidate: &str, wanted: &str) -> bool {
    let strip = |value: &str| -> String {
        let lower = value.to_ascii_lowercase();
        lower
            .strip_suffix(".exe")
            .map_or_else(|| lower.clone(), str::to_string)
    };
    strip(candidate) == strip(wanted)
}

#[cfg(windows)]
mod imp {
    use std::io;

    use windows_sys::Win32::Foundation::{CloseHandle, INVALID_HANDLE_VALUE};
    use windows_sys::Win32::System::Diagnostics::ToolHelp::{
        CreateToolhelp32Snapshot, PROCESSENTRY32W, Process32FirstW, Process32NextW,
        TH32CS_SNAPPROCESS,
    };
    use windows_sys::Win32::System::Threading::{OpenProcess, PROCESS_TERMINATE, TerminateProcess};

    use super::{ProcessInfo, names_match};

    pub(super) fn find_processes(name: &str) -> io::Result<Vec<ProcessInfo>> {
        let mut found = Vec::new();

        // SAFETY: the snapshot handle is checked before use and closed on
        // every path; `entry.dwSize` is initialised as the API requires.
        unsafe {
            let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0);
            if snapshot == INVALID_HANDLE_VALUE {
                return Err(io::Error::last_os_error());
            }

            let mut entry: PROCESSENTRY32W = std::mem::zeroed();
            entry.dwSize = u32::try_from(std::mem::size_of::<PROCESSENTRY32W>())
                .unwrap_or(u32::MAX);

            let mut has_entry = Process32FirstW(snapshot, &mut entry) != 0;
            while has_entry {
                let len = entry
                    .szExeFile
                    .iter()
                    .position(|&c| c == 0)
                    .unwrap_or(entry.szExeFile.len());
                let exe_name = String::from_utf16_lossy(&entry.szExeFile[..len]);
                if names_match(&exe_name, name) {
                    found.push(ProcessInfo {
                        pid: entry.th32ProcessID,
                        name: exe_name,
                    });
                }
                has_entry = Process32NextW(snapshot, &mut entry) != 0;
            }

            CloseHandle(snapshot);
        }

        Ok(found)
    }

    pub(super) fn terminate(pid: u32) -> io::Result<()> {
        // SAFETY: the process handle is checked for null and closed after use.
        unsafe {
            let handle = OpenProcess(PROCESS_TERMINATE, 0, pid);
            if handle.is_null() {
                return Err(io::Error::last_os_error());
            }
            let terminated = TerminateProcess(handle, 1);
            let error = io::Error::last_os_error();
            CloseHandle(handle);
            if terminated == 0 {
                return Err(error);
            }
        }
        Ok(())
    }
}

#[cfg(not(windows))]
mod imp {
    use std::io;
    use std::process::{Command, Stdio};

    use super::ProcessInfo;
    use crate::commands::HideWindow;

    fn process_name(name: &str) -> &str {
        name.strip_suffix(".exe").unwrap_or(name)
    }

    pub(super) fn find_processes(name: &str) -> io::Result<Vec<ProcessInfo>> {
        let wanted = process_name(name);
        let output = Command::new("pgrep")
            .hide_window()
            .args(["-x", wanted])
            .stderr(Stdio::null())
            .output()?;

        // pgrep exits with 1 when nothing matched.
        if !output.status.success() && output.status.code() != Some(1) {
            return Err(io::Error::other(format!(
                "pgrep exited with {}",
                output.status
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| line.trim().parse::<u32>().ok())
            .map(|pid| ProcessInfo {
                pid,
                name: wanted.to_string(),
            })
            .collect())
    }

    pub(super) fn terminate(pid: u32) -> io::Result<()> {
        let status = Command::new("kill")
            .hide_window()
            .args(["-KILL", &pid.to_string()])
            .stderr(Stdio::null())
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!("kill {pid} exited with {status}")))
        }
    }
}
