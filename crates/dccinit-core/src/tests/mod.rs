//! Scenario tests for the supervisor.
//!
//! Real child processes (`/bin/sleep`, `/bin/sh`) stand in for the managed
//! daemons and real TCP listeners stand in for their endpoints.
//!
//! | Module | Covers |
//! |--------|--------|
//! | `watch` | Watch mode: signals, organic death, readiness failures |
//! | `foreground` | Foreground-command mode exit codes and signal forwarding |
//! | `teardown` | Reverse-order teardown, pidfile cleanup |
//! | `provisioning` | Provisioning policies |

pub mod provisioning;

pub use harness::Fixture;
pub use mocks::MockProvisioner;
