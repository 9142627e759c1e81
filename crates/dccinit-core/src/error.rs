//! Error types for dccinit-core.
//!
//! PID 1 has no crash recovery: every failure mode is an explicit variant and
//! the supervisor decides per variant whether it is fatal.

use std::time::Duration;

use dccinit_platform::PlatformError;

/// Result type alias for supervisor operations.
pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Comprehensive error type for supervisor operations.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// Configuration error (bad layout file, invalid values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Files or accounts a daemon needs could not be set up.
    #[error("{daemon}: resource setup failed: {reason}")]
    ResourceSetup {
        /// Daemon name.
        daemon: String,
        /// Underlying failure.
        reason: String,
    },

    /// Executable missing or fork/exec refused.
    #[error("{daemon}: spawn failed: {reason}")]
    Spawn {
        /// Daemon name.
        daemon: String,
        /// Underlying failure.
        reason: String,
    },

    /// Readiness probe gave up.
    #[error("{daemon}: not ready after {} ({})", humantime::format_duration(*elapsed), last_error.as_deref().unwrap_or("no attempt completed"))]
    ReadinessTimeout {
        /// Daemon name.
        daemon: String,
        /// Time spent probing.
        elapsed: Duration,
        /// Last failure observed by the probe.
        last_error: Option<String>,
    },

    /// Stop found nothing to stop (missing/stale pidfile, process gone).
    #[error("{daemon}: stop failed: {reason}")]
    Stop {
        /// Daemon name.
        daemon: String,
        /// Underlying failure.
        reason: String,
    },

    /// External provisioning step failed.
    #[error("provisioning failed: {0}")]
    Provisioning(String),

    /// Invalid state for operation (programming error).
    #[error("invalid state: {0}")]
    State(String),

    /// Platform error.
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SupervisorError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a resource setup error.
    #[must_use]
    pub fn resource_setup(daemon: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ResourceSetup {
            daemon: daemon.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a spawn error.
    #[must_use]
    pub fn spawn(daemon: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Spawn {
            daemon: daemon.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a stop error.
    #[must_use]
    pub fn stop(daemon: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Stop {
            daemon: daemon.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a provisioning error.
    #[must_use]
    pub fn provisioning(msg: impl Into<String>) -> Self {
        Self::Provisioning(msg.into())
    }

    /// Creates an invalid-state error.
    #[must_use]
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    /// Returns true if the daemon never came up (it is marked not running and
    /// the supervisor moves on to the next one).
    #[must_use]
    pub const fn is_start_failure(&self) -> bool {
        matches!(
            self,
            Self::ResourceSetup { .. } | Self::Spawn { .. } | Self::ReadinessTimeout { .. }
        )
    }

    /// Returns true if the error is logged and otherwise ignored.
    #[must_use]
    pub const fn is_benign(&self) -> bool {
        matches!(self, Self::Stop { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SupervisorError::spawn("distccd", "No such file or directory");
        assert_eq!(
            err.to_string(),
            "distccd: spawn failed: No such file or directory"
        );
    }

    #[test]
    fn test_readiness_timeout_display() {
        let err = SupervisorError::ReadinessTimeout {
            daemon: "distccd".into(),
            elapsed: Duration::from_secs(30),
            last_error: Some("connection refused".into()),
        };
        assert_eq!(
            err.to_string(),
            "distccd: not ready after 30s (connection refused)"
        );
    }

    #[test]
    fn test_classification() {
        assert!(SupervisorError::spawn("x", "y").is_start_failure());
        assert!(SupervisorError::resource_setup("x", "y").is_start_failure());
        assert!(!SupervisorError::stop("x", "y").is_start_failure());
        assert!(SupervisorError::stop("x", "gone").is_benign());
        assert!(!SupervisorError::config("bad").is_benign());
    }

    #[test]
    fn test_platform_error_is_transparent() {
        let err: SupervisorError = PlatformError::NoSuchProcess(7).into();
        assert_eq!(err.to_string(), "no such process: 7");
    }
}
