//! Platform error types.

use std::path::PathBuf;

/// Result type alias for platform operations.
pub type Result<T> = std::result::Result<T, PlatformError>;

/// Platform-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// Operation not supported on this OS.
    #[error("platform not supported: {0}")]
    NotSupported(String),

    /// Spawn failed.
    #[error("failed to spawn process: {0}")]
    Spawn(String),

    /// Signal delivery failed.
    #[error("failed to send signal: {0}")]
    Signal(String),

    /// Target process does not exist.
    #[error("no such process: {0}")]
    NoSuchProcess(u32),

    /// Account lookup failed.
    #[error("unknown account: {0}")]
    Account(String),

    /// Pidfile is missing, empty or does not hold a PID.
    #[error("invalid pidfile {}: {reason}", path.display())]
    Pidfile {
        /// Path of the pidfile.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// Filesystem permission or ownership change failed.
    #[error("failed to set up {}: {reason}", path.display())]
    Resource {
        /// Path being prepared.
        path: PathBuf,
        /// Underlying failure.
        reason: String,
    },

    /// Terminal attribute access failed.
    #[error("terminal error: {0}")]
    Terminal(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PlatformError {
    /// Creates a not supported error.
    #[must_use]
    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported(msg.into())
    }

    /// Creates a spawn error.
    #[must_use]
    pub fn spawn(msg: impl Into<String>) -> Self {
        Self::Spawn(msg.into())
    }

    /// Creates a signal error.
    #[must_use]
    pub fn signal(msg: impl Into<String>) -> Self {
        Self::Signal(msg.into())
    }

    /// Creates a pidfile error.
    #[must_use]
    pub fn pidfile(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Pidfile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a resource setup error.
    #[must_use]
    pub fn resource(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Resource {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the error means the target process is already gone.
    #[must_use]
    pub const fn is_gone(&self) -> bool {
        matches!(self, Self::NoSuchProcess(_) | Self::Pidfile { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlatformError::pidfile("/run/distccd.pid", "empty");
        assert_eq!(err.to_string(), "invalid pidfile /run/distccd.pid: empty");
    }

    #[test]
    fn test_is_gone() {
        assert!(PlatformError::NoSuchProcess(42).is_gone());
        assert!(PlatformError::pidfile("/x", "missing").is_gone());
        assert!(!PlatformError::signal("EPERM").is_gone());
    }
}
