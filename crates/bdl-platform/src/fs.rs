use std::path::Path;

/// Atomically move `src` over `dst`, replacing any existing file.
///
/// On Windows this is `MoveFileExW` with `MOVEFILE_REPLACE_EXISTING`, which
/// fails with a sharing violation while another process holds `dst` open
/// without `FILE_SHARE_DELETE`.
///
/// # Errors
/// Returns the OS error of the failed move.
pub fn replace_file(src: &Path, dst: &Path) -> std::io::Result<()> {
    #[cfg(target_os = "windows")]
    {
        use std::os::windows::ffi::OsStrExt;
        use windows_sys::Win32::Storage::FileSystem::{
            MOVEFILE_REPLACE_EXISTING, MOVEFILE_WRITE_THROUGH, MoveFileExW,
        };

        let src_utf16: Vec<u16> = src
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();
        let dst_utf16: Vec<u16> = dst
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        // SAFETY: both paths are NUL-terminated UTF-16 buffers that live for
        // the duration of the FFI call.
        let moved = unsafe {
            MoveFileExW(
                src_utf16.as_ptr(),
                dst_utf16.as_ptr(),
                MOVEFILE_REPLACE_EXISTING | MOVEFILE_WRITE_THROUGH,
            )
        };
        if moved != 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::fs::rename(src, dst)
    }
}

/// Path of a not-yet-existing temporary sibling of `path` for attempt
/// `attempt`.
#[must_use]
pub fn temp_sibling(path: &Path, attempt: u8) -> Option<std::path::PathBuf> {
    let parent = path.parent()?;
    let file_name = path.file_name()?.to_string_lossy();
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    let pid = std::process::id();
    Some(parent.join(format!(".{file_name}.{pid}.{timestamp}.{attempt}.tmp")))
}
