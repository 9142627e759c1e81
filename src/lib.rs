// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! dccinit: PID 1 supervisor for distcc build-service containers.
//!
//! Starts the scheduler, the distcc worker and the statistics transformer in
//! order, waits for each to answer, then either watches the worker or runs a
//! foreground command. Any shutdown trigger leads to one reverse-order
//! teardown.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use dccinit::prelude::*;
//!
//! # async fn example() -> dccinit::core::Result<u8> {
//! let mut router = SignalRouter::install()?;
//! let options = RunOptions::default();
//! let outcome = ServiceSupervisor::new(SupervisorConfig::default(), options)
//!     .run(&mut router)
//!     .await;
//! Ok(outcome.exit_code)
//! # }
//! ```

pub mod cli;

pub use dccinit_core as core;
pub use dccinit_platform as platform;

/// Prelude module for common imports.
pub mod prelude {
    pub use dccinit_core::{
        DaemonRole, DaemonSpec, DaemonStatus, ManagedDaemon, RunOptions, RunOutcome,
        ServiceSupervisor, ShutdownEvent, SignalRouter, SupervisorConfig, SupervisorError,
        TeardownReport,
    };
    pub use dccinit_platform::{InitMode, PidFile, Signal, Syslog};
}
