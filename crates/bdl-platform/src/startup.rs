//! Per-user autostart entry under `HKCU\Software\Microsoft\Windows\CurrentVersion\Run`.

use std::path::Path;

use thiserror::Error;

pub const DEFAULT_VALUE_NAME: &str = "BetterDiscordLauncher";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartupError {
    #[error("{operation} failed with registry status {status}")]
    Registry { operation: &'static str, status: u32 },
    #[error("startup value contains invalid UTF-16")]
    InvalidValue,
    #[error("startup entries are only supported on Windows")]
    Unsupported,
}

#[derive(Debug, Clone)]
pub struct StartupEntry {
    value_name: String,
}

impl Default for StartupEntry {
    fn default() -> Self {
        Self::new(DEFAULT_VALUE_NAME)
    }
}

impl StartupEntry {
    pub fn new(value_name: impl Into<String>) -> Self {
        Self {
            value_name: value_name.into(),
        }
    }

    #[must_use]
    pub fn value_name(&self) -> &str {
        &self.value_name
    }

    /// Write `command` as the autostart value.
    ///
    /// # Errors
    /// Returns an error if the Run key cannot be opened or written.
    pub fn register(&self, command: &str) -> Result<(), StartupError> {
        imp::set_value(&self.value_name, command)
    }

    /// Delete the autostart value. Returns `false` when there was nothing to
    /// delete.
    ///
    /// # Errors
    /// Returns an error if the Run key cannot be opened or the value cannot be
    /// removed.
    pub fn unregister(&self) -> Result<bool, StartupError> {
        imp::delete_value(&self.value_name)
    }

    /// Read the stored autostart command, if any.
    ///
    /// # Errors
    /// Returns an error if the Run key cannot be opened or read.
    pub fn query(&self) -> Result<Option<String>, StartupError> {
        imp::get_value(&self.value_name)
    }
}

/// The command line stored in the Run key: the executable path, quoted.
#[must_use]
pub fn startup_command(executable: &Path) -> String {
    format!("\"{}\"", executable.to_string_lossy().replace('"', "\\\""))
}

#[cfg(windows)]
mod imp {
    use windows_sys::Win32::Foundation::ERROR_FILE_NOT_FOUND;
    use windows_sys::Win32::System::Registry::{
        HKEY, HKEY_CURRENT_USER, KEY_QUERY_VALUE, KEY_SET_VALUE, REG_SAM_FLAGS, REG_SZ,
        RegCloseKey, RegDeleteValueW, RegOpenKeyExW, RegQueryValueExW, RegSetValueExW,
    };

    use super::StartupError;

    const RUN_SUBKEY: &str = "Software\\Microsoft\\Windows\\CurrentVersion\\Run";

    fn wide(value: &str) -> Vec<u16> {
        value.encode_utf16().chain(std::iter::once(0)).collect()
    }

    struct RunKey(HKEY);

    impl RunKey {
        fn open(access: REG_SAM_FLAGS, operation: &'static str) -> Result<Self, StartupError> {
            let subkey = wide(RUN_SUBKEY);
            // SAFETY: `subkey` is a NUL-terminated UTF-16 buffer alive for the
            // call; `hkey` is only used after a successful open.
            unsafe {
                let mut hkey: HKEY = std::mem::zeroed();
                let status =
                    RegOpenKeyExW(HKEY_CURRENT_USER, subkey.as_ptr(), 0, access, &mut hkey);
                if status != 0 {
                    return Err(StartupError::Registry { operation, status });
                }
                Ok(Self(hkey))
            }
        }
    }

    impl Drop for RunKey {
        fn drop(&mut self) {
            // SAFETY: the handle came from a successful `RegOpenKeyExW`.
            unsafe {
                RegCloseKey(self.0);
            }
        }
    }

    pub(super) fn set_value(name: &str, command: &str) -> Result<(), StartupError> {
        let key = RunKey::open(KEY_SET_VALUE, "RegOpenKeyExW")?;
        let name = wide(name);
        let data = wide(command);
        let byte_len = u32::try_from(data.len() * 2).map_err(|_| StartupError::InvalidValue)?;

        // SAFETY: `data` outlives the call and `byte_len` covers it including
        // the terminating NUL.
        let status = unsafe {
            RegSetValueExW(
                key.0,
                name.as_ptr(),
                0,
                REG_SZ,
                data.as_ptr().cast::<u8>(),
                byte_len,
            )
        };
        if status != 0 {
            return Err(StartupError::Registry {
                operation: "RegSetValueExW",
                status,
            });
        }
        Ok(())
    }

    pub(super) fn delete_value(name: &str) -> Result<bool, StartupError> {
        let key = RunKey::open(KEY_SET_VALUE, "RegOpenKeyExW")?;
        let name = wide(name);

        // SAFETY: `name` is NUL-terminated and alive for the call.
        let status = unsafe { RegDeleteValueW(key.0, name.as_ptr()) };
        match status {
            0 => Ok(true),
            ERROR_FILE_NOT_FOUND => Ok(false),
            status => Err(StartupError::Registry {
                operation: "RegDeleteValueW",
                status,
            }),
        }
    }

    pub(super) fn get_value(name: &str) -> Result<Option<String>, StartupError> {
        let key = RunKey::open(KEY_QUERY_VALUE, "RegOpenKeyExW")?;
        let name = wide(name);
        let mut byte_len: u32 = 0;

        // SAFETY: first call only queries the required buffer size.
        let status = unsafe {
            RegQueryValueExW(
                key.0,
                name.as_ptr(),
                std::ptr::null(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                &mut byte_len,
            )
        };
        if status == ERROR_FILE_NOT_FOUND {
            return Ok(None);
        }
        if status != 0 {
            return Err(StartupError::Registry {
                operation: "RegQueryValueExW",
                status,
            });
        }

        let mut buffer = vec![0_u16; (byte_len as usize).div_ceil(2)];
        // SAFETY: `buffer` holds at least `byte_len` bytes.
        let status = unsafe {
            RegQueryValueExW(
                key.0,
                name.as_ptr(),
                std::ptr::null(),
                std::ptr::null_mut(),
                buffer.as_mut_ptr().cast::<u8>(),
                &mut byte_len,
            )
        };
        if status != 0 {
            return Err(StartupError::Registry {
                operation: "RegQueryValueExW",
                status,
            });
        }

        buffer.truncate((byte_len as usize) / 2);
        while buffer.last() == Some(&0) {
            buffer.pop();
        }
        let value = String::from_utf16(&buffer).map_err(|_| StartupError::InvalidValue)?;
        Ok((!value.is_empty()).then_some(value))
    }
}

#[cfg(not(windows))]
mod imp {
    use super::StartupError;

    pub(super) fn set_value(_name: &str, _command: &str) -> Result<(), StartupError> {
        Err(StartupError::Unsupported)
    }

    pub(super) fn delete_value(_name: &str) -> Result<bool, StartupError> {
        Err(StartupError::Unsupported)
    }

    pub(super) fn get_value(_name: &str) -> Result<Option<String>, StartupError> {
        Err(StartupError::Unsupported)
    }
}
