// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # dccinit-stats
//!
//! `dcc-free-mem`: an HTTP server in front of distccd's `--stats` endpoint
//! that adds a `dcc_free_mem <N> MB` line (available memory in MiB) to the
//! statistics page, so build clients can weigh hosts by free memory.
//!
//! ```text
//! client ──GET :3633──► dcc-free-mem ──GET :3634──► distccd --stats
//!                            │
//!                            └── /proc/meminfo (MemAvailable)
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod logs;
pub mod meminfo;
pub mod server;
pub mod transform;
pub mod upstream;

pub use error::{Result, StatsError};
pub use logs::RequestLog;
pub use server::{StatsConfig, StatsServer};
