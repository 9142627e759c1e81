//! Core types for supervisor lifecycle management.
//!
//! Explicit state machines, no implicit transitions.

use serde::{Deserialize, Serialize};

use dccinit_platform::Signal;

/// Managed daemon lifecycle state.
///
/// ```text
/// Stopped → Starting → (WaitingReady) → Running → Stopping → Stopped
///               ↓              ↓
///            Failed ←──────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DaemonStatus {
    /// Registered, not started (or stopped again).
    Stopped,
    /// Files prepared, process being spawned.
    Starting,
    /// Process spawned, readiness probe pending.
    WaitingReady,
    /// Process running and (if probed) answering.
    Running,
    /// Stop signal sent, waiting for exit.
    Stopping,
    /// Never became ready.
    Failed(FailureReason),
}

impl DaemonStatus {
    /// Returns true if the daemon is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed(_))
    }

    /// Returns true if a process was spawned and not yet stopped.
    #[must_use]
    pub const fn has_process(&self) -> bool {
        matches!(self, Self::WaitingReady | Self::Running | Self::Stopping)
    }

    /// Short lowercase label for logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::WaitingReady => "waiting-ready",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Failed(_) => "failed",
        }
    }
}

impl std::fmt::Display for DaemonStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(reason) => write!(f, "failed({reason})"),
            other => f.write_str(other.label()),
        }
    }
}

/// Why a daemon never reached `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// Log files, pidfile or account could not be prepared.
    ResourceSetup,
    /// Executable missing or fork/exec refused.
    Spawn,
    /// Readiness probe timed out.
    ReadinessTimeout,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::ResourceSetup => "resource-setup",
            Self::Spawn => "spawn",
            Self::ReadinessTimeout => "readiness-timeout",
        })
    }
}

/// Role of a daemon in the container; fixes startup order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonRole {
    /// cron-like scheduler.
    Scheduler,
    /// The primary worker (distccd); its death ends watch mode.
    Worker,
    /// Auxiliary stats transformer.
    Stats,
}

impl DaemonRole {
    /// All roles in startup order.
    pub const STARTUP_ORDER: [Self; 3] = [Self::Scheduler, Self::Worker, Self::Stats];
}

/// Supervisor state machine.
///
/// ```text
/// Init → SanityChecked → ServicesStarting → ServicesReady
///                              ↓                  ↓
///                           Aborted     ForegroundRun | Watching
///                              ↓                  ↓
///                              └──→ TearingDown ←─┘ → Terminated
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupervisorState {
    /// Constructed, nothing done yet.
    Init,
    /// Init-mode check done (possibly with a warning).
    SanityChecked,
    /// Provisioning and daemon startup in progress.
    ServicesStarting,
    /// Startup pass complete.
    ServicesReady,
    /// Running the user's foreground command.
    ForegroundRun,
    /// Blocking on the primary daemon's liveness.
    Watching,
    /// Startup failed without a foreground command to mask it.
    Aborted,
    /// Stopping daemons.
    TearingDown,
    /// Done; the process is about to exit.
    Terminated,
}

impl SupervisorState {
    /// Returns true if `next` is a legal successor.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        use SupervisorState::*;
        matches!(
            (*self, next),
            (Init, SanityChecked)
                | (SanityChecked, ServicesStarting)
                | (ServicesStarting, ServicesReady | Aborted)
                | (ServicesReady, ForegroundRun | Watching | Aborted)
                | (
                    Init | SanityChecked | ServicesStarting | ServicesReady | ForegroundRun
                        | Watching | Aborted,
                    TearingDown
                )
                | (TearingDown, Terminated)
        )
    }
}

/// The single event that ends a supervisor run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutdownEvent {
    /// A termination signal arrived.
    Signal(Signal),
    /// The watched primary daemon exited on its own.
    PrimaryExited {
        /// Daemon name.
        daemon: String,
        /// Exit code, if it exited normally.
        code: Option<i32>,
        /// Terminating signal number, if killed.
        signal: Option<i32>,
    },
    /// The foreground command finished with this exit status.
    CommandExited(u8),
    /// Startup failed and no foreground command masked it.
    Aborted(String),
}

impl std::fmt::Display for ShutdownEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Signal(sig) => write!(f, "received {sig}"),
            Self::PrimaryExited { daemon, code, signal } => match (code, signal) {
                (Some(code), _) => write!(f, "{daemon} exited with code {code}"),
                (None, Some(sig)) => write!(f, "{daemon} killed by signal {sig}"),
                (None, None) => write!(f, "{daemon} exited"),
            },
            Self::CommandExited(code) => write!(f, "command exited with code {code}"),
            Self::Aborted(reason) => write!(f, "aborted: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daemon_status_transitions() {
        assert!(DaemonStatus::Stopped.is_terminal());
        assert!(DaemonStatus::Failed(FailureReason::Spawn).is_terminal());
        assert!(!DaemonStatus::Running.is_terminal());

        assert!(DaemonStatus::Running.has_process());
        assert!(DaemonStatus::WaitingReady.has_process());
        assert!(!DaemonStatus::Starting.has_process());
        assert!(!DaemonStatus::Failed(FailureReason::ReadinessTimeout).has_process());
    }

    #[test]
    fn test_daemon_status_display() {
        assert_eq!(DaemonStatus::Running.to_string(), "running");
        assert_eq!(
            DaemonStatus::Failed(FailureReason::ReadinessTimeout).to_string(),
            "failed(readiness-timeout)"
        );
    }

    #[test]
    fn test_startup_order() {
        let mut sorted = DaemonRole::STARTUP_ORDER;
        sorted.sort();
        assert_eq!(sorted, DaemonRole::STARTUP_ORDER);
    }

    #[test]
    fn test_supervisor_happy_path() {
        use SupervisorState::*;
        let path = [
            Init,
            SanityChecked,
            ServicesStarting,
            ServicesReady,
            Watching,
            TearingDown,
            Terminated,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_supervisor_illegal_transitions() {
        use SupervisorState::*;
        assert!(!Init.can_transition_to(Watching));
        assert!(!Terminated.can_transition_to(TearingDown));
        assert!(!TearingDown.can_transition_to(Watching));
        assert!(!Watching.can_transition_to(ForegroundRun));
        assert!(ServicesStarting.can_transition_to(Aborted));
        assert!(Aborted.can_transition_to(TearingDown));
    }

    #[test]
    fn test_shutdown_event_display() {
        assert_eq!(
            ShutdownEvent::Signal(Signal::Int).to_string(),
            "received SIGINT"
        );
        let died = ShutdownEvent::PrimaryExited {
            daemon: "distccd".into(),
            code: None,
            signal: Some(9),
        };
        assert_eq!(died.to_string(), "distccd killed by signal 9");
    }
}
