use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bdl_platform::{replace_file, temp_sibling};

/// Create a fresh temporary sibling of `destination` and hand it to `fill`.
/// The file is synced before returning; on any error it is removed.
pub(crate) fn stage_sibling<F>(destination: &Path, fill: F) -> io::Result<PathBuf>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let mut created = None;
    for attempt in 0..16_u8 {
        let candidate = temp_sibling(destination, attempt).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "destination has no parent")
        })?;
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(file) => {
                created = Some((candidate, file));
                break;
            }
            Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {}
            Err(error) => return Err(error),
        }
    }

    let Some((path, mut file)) = created else {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "failed to create unique temp file",
        ));
    };

    let filled = fill(&mut file).and_then(|()| file.sync_all());
    drop(file);
    if let Err(error) = filled {
        let _ = std::fs::remove_file(&path);
        return Err(error);
    }
    Ok(path)
}

/// Move a staged file over `destination`, removing the staged file if the
/// move fails.
pub(crate) fn commit(staged: &Path, destination: &Path) -> io::Result<()> {
    if let Err(error) = replace_file(staged, destination) {
        let _ = std::fs::remove_file(staged);
        return Err(error);
    }
    Ok(())
}

/// Write `data` to `path` through a temporary sibling so readers see either
/// the previous content or all of `data`.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let staged = stage_sibling(path, |file| file.write_all(data))?;
    commit(&staged, path)
}
