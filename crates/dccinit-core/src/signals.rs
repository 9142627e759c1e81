//! Signal routing and exit codes.
//!
//! Termination signals are funneled into the supervisor's control loop as a
//! single [`Signal`] value. The router disarms after the first delivery; later
//! deliveries are swallowed so a second Ctrl-C cannot interrupt teardown.

use std::process::ExitStatus;

use tokio::sync::mpsc;

use dccinit_platform::Signal;

use crate::error::Result;
use crate::types::ShutdownEvent;

/// Signals that end a supervisor run.
pub const SHUTDOWN_SIGNALS: [Signal; 3] = [Signal::Int, Signal::Hup, Signal::Term];

/// Exit code of a shutdown triggered by `sig`.
#[must_use]
pub const fn signal_exit_code(sig: Signal) -> u8 {
    (128 + sig.as_i32()) as u8
}

/// Exit code for a shutdown event.
#[must_use]
pub const fn exit_code(event: &ShutdownEvent) -> u8 {
    match event {
        ShutdownEvent::Signal(sig) => signal_exit_code(*sig),
        // the primary died; report it as if the container had been stopped
        ShutdownEvent::PrimaryExited { .. } => signal_exit_code(Signal::Term),
        ShutdownEvent::CommandExited(code) => *code,
        ShutdownEvent::Aborted(_) => 1,
    }
}

/// Shell-style exit code of a finished child: its own code, or `128 + n` if
/// killed by signal `n`.
#[must_use]
pub fn exit_status_code(status: ExitStatus) -> u8 {
    if let Some(code) = status.code() {
        return (code & 0xff) as u8;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return (128 + sig) as u8;
        }
    }
    1
}

/// Where signals come from.
enum Source {
    #[cfg(unix)]
    Os {
        interrupt: tokio::signal::unix::Signal,
        hangup: tokio::signal::unix::Signal,
        terminate: tokio::signal::unix::Signal,
    },
    Manual(mpsc::UnboundedReceiver<Signal>),
}

/// Delivers the first termination signal to the control loop.
pub struct SignalRouter {
    source: Source,
    armed: bool,
}

impl std::fmt::Debug for SignalRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match self.source {
            #[cfg(unix)]
            Source::Os { .. } => "os",
            Source::Manual(_) => "manual",
        };
        f.debug_struct("SignalRouter")
            .field("source", &source)
            .field("armed", &self.armed)
            .finish()
    }
}

impl SignalRouter {
    /// Installs handlers for SIGINT, SIGHUP and SIGTERM.
    ///
    /// Once installed, the default disposition (terminate) no longer applies
    /// to these signals for the rest of the process.
    ///
    /// # Errors
    /// Returns an I/O error if a handler cannot be registered.
    #[cfg(unix)]
    pub fn install() -> Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            source: Source::Os {
                interrupt: signal(SignalKind::interrupt())?,
                hangup: signal(SignalKind::hangup())?,
                terminate: signal(SignalKind::terminate())?,
            },
            armed: true,
        })
    }

    /// Creates a router fed by a [`SignalTrigger`].
    #[must_use]
    pub fn manual() -> (Self, SignalTrigger) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                source: Source::Manual(rx),
                armed: true,
            },
            SignalTrigger { tx },
        )
    }

    /// Returns true until the first signal has been delivered.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.armed
    }

    /// Waits for the first termination signal.
    ///
    /// Never resolves once disarmed or if a manual trigger has been dropped.
    pub async fn recv(&mut self) -> Signal {
        if !self.armed {
            return std::future::pending().await;
        }

        let received = match &mut self.source {
            #[cfg(unix)]
            Source::Os {
                interrupt,
                hangup,
                terminate,
            } => tokio::select! {
                Some(()) = interrupt.recv() => Some(Signal::Int),
                Some(()) = hangup.recv() => Some(Signal::Hup),
                Some(()) = terminate.recv() => Some(Signal::Term),
                else => None,
            },
            Source::Manual(rx) => rx.recv().await,
        };

        match received {
            Some(sig) => {
                self.armed = false;
                tracing::info!(signal = %sig, "shutdown signal received");
                sig
            }
            None => std::future::pending().await,
        }
    }
}

/// Sends signals into a manual [`SignalRouter`].
#[derive(Debug, Clone)]
pub struct SignalTrigger {
    tx: mpsc::UnboundedSender<Signal>,
}

impl SignalTrigger {
    /// Delivers `sig`; ignored if the router is gone.
    pub fn send(&self, sig: Signal) {
        let _ = self.tx.send(sig);
    }

    /// Delivers SIGINT.
    pub fn interrupt(&self) {
        self.send(Signal::Int);
    }

    /// Delivers SIGHUP.
    pub fn hangup(&self) {
        self.send(Signal::Hup);
    }

    /// Delivers SIGTERM.
    pub fn terminate(&self) {
        self.send(Signal::Term);
    }
}
