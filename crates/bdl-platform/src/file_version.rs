use std::path::Path;

/// Read the file version embedded in an executable's version resource, as
/// `major.minor.build.revision`.
///
/// Returns `None` when the file has no version resource, cannot be read, or
/// the host is not Windows.
#[must_use]
pub fn read_file_version(path: &Path) -> Option<String> {
    imp::read_file_version(path)
}

#[cfg(windows)]
mod imp {
    use std::os::windows::ffi::OsStrExt;
    use std::path::Path;

    use log::debug;
    use windows_sys::Win32::Storage::FileSystem::{
        GetFileVersionInfoSizeW, GetFileVersionInfoW, VS_FIXEDFILEINFO, VerQueryValueW,
    };

    pub(super) fn read_file_version(path: &Path) -> Option<String> {
        let path_wide: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();
        let root: Vec<u16> = "\\\0".encode_utf16().collect();

        // SAFETY: every pointer handed to the version APIs is either a
        // NUL-terminated buffer owned here or an out-parameter; the fixed info
        // pointer returned by `VerQueryValueW` points into `data`, which stays
        // alive until the fields are copied out.
        unsafe {
            let mut handle = 0_u32;
            let size = GetFileVersionInfoSizeW(path_wide.as_ptr(), &mut handle);
            if size == 0 {
                debug!("No version resource in {}", path.display());
                return None;
            }

            let mut data = vec![0_u8; size as usize];
            if GetFileVersionInfoW(path_wide.as_ptr(), 0, size, data.as_mut_ptr().cast()) == 0 {
                return None;
            }

            let mut info: *mut std::ffi::c_void = std::ptr::null_mut();
            let mut info_len = 0_u32;
            if VerQueryValueW(data.as_ptr().cast(), root.as_ptr(), &mut info, &mut info_len) == 0
                || info.is_null()
                || (info_len as usize) < std::mem::size_of::<VS_FIXEDFILEINFO>()
            {
                return None;
            }

            let fixed = &*info.cast::<VS_FIXEDFILEINFO>();
            Some(super::format_version(
                fixed.dwFileVersionMS,
                fixed.dwFileVersionLS,
            ))
        }
    }
}

#[cfg(not(windows))]
mod imp {
    use std::path::Path;

    pub(super) fn read_file_version(_path: &Path) -> Option<String> {
        None
    }
}

#[cfg_attr(not(windows), allow(dead_code))]
fn format_version(most_significant: u32, least_significant: u32) -> String {
    format!(
        "{}.{}.{}.{}",
        most_significant >> 16,
        most_significant & 0xFFFF,
        least_significant >> 16,
        least_significant & 0xFFFF
    )
}
