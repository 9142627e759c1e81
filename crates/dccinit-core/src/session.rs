//! Supervisor session: the daemons of one run and the teardown routine.

use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};

use dccinit_platform::{Syslog, TerminalGuard};

use crate::config::SupervisorConfig;
use crate::daemon::ManagedDaemon;
use crate::error::{Result, SupervisorError};
use crate::types::DaemonRole;

/// What teardown did, per daemon.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Every daemon whose stop was attempted, in stop order.
    pub sequence: Vec<String>,
    /// Daemons stopped cleanly.
    pub stopped: Vec<String>,
    /// Daemons whose stop reported an error (logged, treated as stopped).
    pub failed_stops: Vec<(String, String)>,
    /// Daemons that never started or never became ready.
    pub skipped: Vec<String>,
}

/// State owned by one supervisor run.
#[derive(Debug)]
pub struct SupervisorSession {
    daemons: Vec<ManagedDaemon>,
    watched: Option<usize>,
    torn_down: AtomicBool,
    terminal: Option<TerminalGuard>,
    syslog: Syslog,
}

impl SupervisorSession {
    /// Builds the enabled daemons of `config` in startup order.
    #[must_use]
    pub fn new(config: &SupervisorConfig, syslog: Syslog) -> Self {
        let daemons = config
            .enabled_daemons()
            .map(|(role, spec)| ManagedDaemon::new(role, spec.clone()))
            .collect();
        Self::with_daemons(daemons, syslog)
    }

    /// Builds a session from explicit daemons, given in startup order.
    #[must_use]
    pub fn with_daemons(daemons: Vec<ManagedDaemon>, syslog: Syslog) -> Self {
        Self {
            daemons,
            watched: None,
            torn_down: AtomicBool::new(false),
            terminal: None,
            syslog,
        }
    }

    /// Daemons in startup order.
    #[must_use]
    pub fn daemons(&self) -> &[ManagedDaemon] {
        &self.daemons
    }

    pub(crate) fn daemons_mut(&mut self) -> &mut [ManagedDaemon] {
        &mut self.daemons
    }

    /// The daemon holding `role`, if enabled.
    #[must_use]
    pub fn daemon(&self, role: DaemonRole) -> Option<&ManagedDaemon> {
        self.daemons.iter().find(|d| d.role() == role)
    }

    /// Lifecycle log.
    #[must_use]
    pub const fn syslog(&self) -> &Syslog {
        &self.syslog
    }

    /// Snapshots terminal settings so teardown can restore them.
    pub fn capture_terminal(&mut self) {
        self.terminal = TerminalGuard::capture();
    }

    /// Starts watching the daemon holding `role` for organic death.
    ///
    /// # Errors
    /// Returns [`SupervisorError::State`] if that daemon is not running.
    pub fn watch(&mut self, role: DaemonRole) -> Result<()> {
        let idx = self
            .daemons
            .iter()
            .position(|d| d.role() == role && d.is_running())
            .ok_or_else(|| SupervisorError::state(format!("no running {role:?} daemon to watch")))?;
        self.watched = Some(idx);
        Ok(())
    }

    /// Name of the watched daemon.
    #[must_use]
    pub fn watched(&self) -> Option<&str> {
        self.watched.map(|idx| self.daemons[idx].name())
    }

    /// Stops watching; a later exit of that daemon is no longer an event.
    pub fn release_watch(&mut self) {
        if let Some(idx) = self.watched.take() {
            tracing::debug!(daemon = %self.daemons[idx].name(), "liveness watch released");
        }
    }

    /// Resolves when the watched daemon exits. Never resolves without one.
    pub async fn wait_watched(&mut self) -> Result<ExitStatus> {
        match self.watched {
            Some(idx) => self.daemons[idx].wait_exit().await,
            None => std::future::pending().await,
        }
    }

    /// Returns true once teardown has run.
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Stops every started daemon in reverse startup order.
    ///
    /// Runs once; later calls return `None`.
    pub async fn teardown(&mut self) -> Option<TeardownReport> {
        if self
            .torn_down
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("teardown already executed");
            return None;
        }

        self.release_watch();
        self.syslog.log("stopping services");

        let mut report = TeardownReport::default();
        for daemon in self.daemons.iter_mut().rev() {
            let name = daemon.name().to_string();
            if !daemon.status().has_process() {
                tracing::debug!(daemon = %name, status = %daemon.status(), "not started, skipping");
                report.skipped.push(name);
                continue;
            }

            report.sequence.push(name.clone());
            self.syslog.log(format!("stopping {name}"));
            match daemon.stop().await {
                Ok(()) => {
                    self.syslog.log(format!("{name} stopped"));
                    report.stopped.push(name);
                }
                Err(e) => {
                    if e.is_benign() {
                        tracing::info!(daemon = %name, error = %e, "stop found nothing to stop");
                    } else {
                        tracing::error!(daemon = %name, error = %e, "stop failed");
                    }
                    self.syslog.log(format!("{name} stop: {e}"));
                    report.failed_stops.push((name, e.to_string()));
                }
            }
        }

        if let Some(terminal) = self.terminal.take()
            && let Err(e) = terminal.restore()
        {
            tracing::warn!(error = %e, "terminal settings not restored");
        }

        tracing::info!(
            stopped = report.stopped.len(),
            failed = report.failed_stops.len(),
            skipped = report.skipped.len(),
            "teardown complete"
        );
        Some(report)
    }
}
