//! Error types for dccinit-stats.

use std::net::SocketAddr;

/// Result type alias for the stats transformer.
pub type Result<T> = std::result::Result<T, StatsError>;

/// Stats transformer errors.
#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    /// The listen socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The upstream `--stats` endpoint did not answer usefully.
    #[error("querying the --stats server at {addr}: {reason}")]
    Upstream {
        /// Upstream address.
        addr: SocketAddr,
        /// What went wrong.
        reason: String,
    },

    /// Available memory could not be determined.
    #[error("memory information unavailable: {0}")]
    Memory(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StatsError {
    /// Creates an upstream error.
    #[must_use]
    pub fn upstream(addr: SocketAddr, reason: impl std::fmt::Display) -> Self {
        Self::Upstream {
            addr,
            reason: reason.to_string(),
        }
    }

    /// Creates a memory error.
    #[must_use]
    pub fn memory(reason: impl Into<String>) -> Self {
        Self::Memory(reason.into())
    }
}
