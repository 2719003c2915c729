use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::atomic::write_atomic;

#[derive(Debug, Error)]
#[error("{context} {}: {source}", path.display())]
pub struct MarkerError {
    context: &'static str,
    path: PathBuf,
    #[source]
    source: std::io::Error,
}

/// The last target version a patch cycle completed for, cached as plain text.
#[derive(Debug, Clone)]
pub struct VersionMarker {
    path: PathBuf,
}

impl VersionMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn error(&self, context: &'static str, source: std::io::Error) -> MarkerError {
        MarkerError {
            context,
            path: self.path.clone(),
            source,
        }
    }

    /// Create the marker file empty if it does not exist yet.
    ///
    /// # Errors
    /// Returns an error if the file or its directory cannot be created.
    pub fn ensure_exists(&self) -> Result<(), MarkerError> {
        if self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|source| self.error("failed to create directory for", source))?;
        }
        std::fs::write(&self.path, "").map_err(|source| self.error("failed to create", source))
    }

    /// The stored version, trimmed; empty when nothing has been stored.
    ///
    /// # Errors
    /// Returns an error if an existing marker file cannot be read.
    pub fn load(&self) -> Result<String, MarkerError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(content.trim().to_string()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(source) => Err(self.error("failed to read", source)),
        }
    }

    /// # Errors
    /// Returns an error if the marker cannot be written.
    pub fn store(&self, version: &str) -> Result<(), MarkerError> {
        write_atomic(&self.path, version.as_bytes())
            .map_err(|source| self.error("failed to write", source))
    }
}

#[cfg(test)]
mod tests {
    use super::VersionMarker;

    #[test]
    fn ensure_exists_creates_empty_marker_once() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let marker = VersionMarker::new(temp.path().join("discord_version.cache"));

        marker.ensure_exists().expect("marker should be created");
        assert_eq!(marker.load().expect("marker should load"), "");

        marker.store("1.0.9170.0").expect("marker should be stored");
        marker.ensure_exists().expect("existing marker should be kept");
        assert_eq!(marker.load().expect("marker should load"), "1.0.9170.0");
    }

    #[test]
    fn load_trims_whitespace_and_tolerates_missing_file() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let marker = VersionMarker::new(temp.path().join("discord_version.cache"));
        assert_eq!(marker.load().expect("missing marker should load"), "");

        std::fs::write(marker.path(), "  1.0.9001.0\r\n").expect("marker should be written");
        assert_eq!(marker.load().expect("marker should load"), "1.0.9001.0");
    }
}
