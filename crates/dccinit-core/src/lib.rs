// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # dccinit-core
//!
//! Supervisor core for the dccinit container init.
//!
//! - [`ManagedDaemon`] wraps one external daemon: files, detached spawn,
//!   pidfile, stop with SIGKILL escalation
//! - [`ReadinessProbe`] polls a daemon's endpoint until it answers
//! - [`SignalRouter`] turns the first termination signal into a
//!   [`ShutdownEvent`]; [`exit_code`] maps events to exit codes
//! - [`ServiceSupervisor`] drives startup, the foreground command or the
//!   watch on the primary daemon, and the single teardown pass
//!
//! ## Example
//!
//! ```rust,no_run
//! use dccinit_core::{RunOptions, ServiceSupervisor, SignalRouter, SupervisorConfig};
//!
//! # async fn example() -> dccinit_core::Result<u8> {
//! let config = SupervisorConfig::default();
//! let mut router = SignalRouter::install()?;
//! let mut supervisor = ServiceSupervisor::new(config, RunOptions::default());
//! let outcome = supervisor.run(&mut router).await;
//! Ok(outcome.exit_code)
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod daemon;
pub mod error;
pub mod provision;
pub mod readiness;
pub mod session;
pub mod signals;
pub mod supervisor;
#[cfg(test)]
pub mod tests;
pub mod types;

pub use config::{
    DaemonSpec, ProvisionConfig, ProvisionFailurePolicy, RunOptions, SupervisorConfig,
    default_jobs,
};
pub use daemon::ManagedDaemon;
pub use error::{Result, SupervisorError};
pub use provision::{CommandProvisioner, ProvisionOutcome, Provisioner};
pub use readiness::{ProbeTarget, ReadinessCheckResult, ReadinessError, ReadinessProbe};
pub use session::{SupervisorSession, TeardownReport};
pub use signals::{SignalRouter, SignalTrigger, exit_code, exit_status_code, signal_exit_code};
pub use supervisor::{RunOutcome, ServiceSupervisor};
pub use types::{
    DaemonRole, DaemonStatus, FailureReason, ShutdownEvent, SupervisorState,
};
