//! Pidfiles: single-integer text files naming a daemon's process.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{PlatformError, Result};

/// A pidfile at a fixed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Wraps a pidfile path. Nothing touches the filesystem yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the pidfile.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the file exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Creates the file empty if missing, along with its parent directory.
    pub fn create_empty(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| PlatformError::resource(parent, e.to_string()))?;
        }
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| PlatformError::resource(&self.path, e.to_string()))?;
        Ok(())
    }

    /// Overwrites the file with `pid`.
    pub fn write(&self, pid: u32) -> Result<()> {
        let mut file = std::fs::File::create(&self.path)
            .map_err(|e| PlatformError::pidfile(&self.path, e.to_string()))?;
        writeln!(file, "{pid}").map_err(|e| PlatformError::pidfile(&self.path, e.to_string()))?;
        file.sync_all()?;
        Ok(())
    }

    /// Reads the recorded PID.
    ///
    /// # Errors
    /// Returns [`PlatformError::Pidfile`] if the file is missing, empty or
    /// not a positive integer.
    pub fn read(&self) -> Result<u32> {
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| PlatformError::pidfile(&self.path, e.to_string()))?;
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(PlatformError::pidfile(&self.path, "empty"));
        }
        match trimmed.parse::<u32>() {
            Ok(0) | Err(_) => Err(PlatformError::pidfile(
                &self.path,
                format!("not a PID: {trimmed:?}"),
            )),
            Ok(pid) => Ok(pid),
        }
    }

    /// Removes the file. A missing file is not an error.
    pub fn remove(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PlatformError::pidfile(&self.path, e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = PidFile::new(dir.path().join("run/distccd.pid"));

        pidfile.create_empty().unwrap();
        assert!(pidfile.exists());
        assert!(pidfile.read().is_err(), "empty pidfile has no PID");

        pidfile.write(4242).unwrap();
        assert_eq!(pidfile.read().unwrap(), 4242);
        assert_eq!(
            std::fs::read_to_string(pidfile.path()).unwrap(),
            "4242\n"
        );
    }

    #[test]
    fn test_read_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = PidFile::new(dir.path().join("x.pid"));
        std::fs::write(pidfile.path(), "not-a-pid").unwrap();
        assert!(matches!(pidfile.read(), Err(PlatformError::Pidfile { .. })));

        std::fs::write(pidfile.path(), "0\n").unwrap();
        assert!(pidfile.read().is_err());
    }

    #[test]
    fn test_read_missing() {
        let pidfile = PidFile::new("/nonexistent/dccinit/x.pid");
        let err = pidfile.read().unwrap_err();
        assert!(err.is_gone());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = PidFile::new(dir.path().join("x.pid"));
        pidfile.write(1).unwrap();
        pidfile.remove().unwrap();
        assert!(!pidfile.exists());
        pidfile.remove().unwrap();
    }

    #[test]
    fn test_create_empty_keeps_content() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = PidFile::new(dir.path().join("x.pid"));
        pidfile.write(77).unwrap();
        pidfile.create_empty().unwrap();
        assert_eq!(pidfile.read().unwrap(), 77);
    }

    proptest::proptest! {
        #[test]
        fn prop_daemon_written_pid_is_read(
            pid in 1u32..=4_194_304,
            lead in "[ \t\n]{0,3}",
            trail in "[ \t\n]{0,3}",
        ) {
            let dir = tempfile::tempdir().unwrap();
            let pidfile = PidFile::new(dir.path().join("d.pid"));
            std::fs::write(pidfile.path(), format!("{lead}{pid}{trail}")).unwrap();
            proptest::prop_assert_eq!(pidfile.read().unwrap(), pid);
        }
    }
}
