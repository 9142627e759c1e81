// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # dccinit-platform
//!
//! Unix plumbing for the dccinit container supervisor:
//!
//! - **Signals**: signal numbers, delivery, null-signal liveness probes
//! - **Pidfiles**: the authoritative record of a daemon's PID
//! - **Accounts**: service account lookup, ownership and permission bits
//! - **Spawning**: detached (`setsid`) daemons and foreground commands with
//!   privilege drop
//! - **Detection**: is a reaping init running at PID 1?
//! - **Syslog**: `<timestamp> <host> <component>[<pid>]: <message>` lines in a
//!   plain file
//! - **Terminal**: echo settings snapshot and restore
//!
//! ## Example
//!
//! ```rust,no_run
//! use dccinit_platform::{PidFile, Signal, send_signal};
//!
//! let pidfile = PidFile::new("/run/distccd.pid");
//! if let Ok(pid) = pidfile.read() {
//!     let _ = send_signal(pid, Signal::Term);
//! }
//! ```

#![warn(missing_docs)]

pub mod account;
pub mod detect;
pub mod error;
pub mod pidfile;
pub mod signal;
pub mod spawn;
pub mod syslog;
pub mod terminal;

pub use account::{ServiceAccount, running_as_root, set_mode};
pub use detect::{InitMode, detect_init_mode, is_container};
pub use error::{PlatformError, Result};
pub use pidfile::PidFile;
pub use signal::{Signal, is_alive, send_signal};
pub use spawn::{ProcessSpec, StdioMode};
pub use syslog::Syslog;
pub use terminal::TerminalGuard;
