//! The service supervisor.
//!
//! [`ServiceSupervisor::run`] drives one container lifetime: sanity check,
//! provisioning, ordered daemon startup with readiness confirmation, then
//! either a foreground command or a watch on the primary daemon. Whatever ends
//! the run becomes one [`ShutdownEvent`]; teardown follows exactly once and
//! the exit code is derived from the event.

use std::path::Path;

use dccinit_platform::{
    InitMode, ProcessSpec, ServiceAccount, Syslog, detect_init_mode, send_signal,
};

use crate::config::{RunOptions, SupervisorConfig};
use crate::error::{Result, SupervisorError};
use crate::provision::{CommandProvisioner, Provisioner};
use crate::readiness::{ReadinessError, ReadinessProbe};
use crate::session::{SupervisorSession, TeardownReport};
use crate::signals::{SignalRouter, exit_code, exit_status_code};
use crate::types::{DaemonRole, FailureReason, ShutdownEvent, SupervisorState};

/// Exit code when the foreground command cannot be started.
pub const COMMAND_NOT_FOUND: u8 = 127;

/// Syslog component for the supervisor itself.
pub const COMPONENT: &str = "dccinit";

/// Result of a supervisor run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Process exit code.
    pub exit_code: u8,
    /// What ended the run.
    pub event: ShutdownEvent,
    /// What teardown did.
    pub teardown: TeardownReport,
}

/// Drives startup, the terminal mode and teardown.
pub struct ServiceSupervisor {
    config: SupervisorConfig,
    options: RunOptions,
    state: SupervisorState,
    session: SupervisorSession,
    probe: ReadinessProbe,
    provisioner: Option<Box<dyn Provisioner>>,
    init_mode: Option<InitMode>,
}

impl std::fmt::Debug for ServiceSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceSupervisor")
            .field("state", &self.state)
            .field("options", &self.options)
            .field("session", &self.session)
            .field("provisioner", &self.provisioner.is_some())
            .finish_non_exhaustive()
    }
}

impl ServiceSupervisor {
    /// Creates a supervisor for `config`.
    #[must_use]
    pub fn new(config: SupervisorConfig, options: RunOptions) -> Self {
        let syslog = Syslog::new(&config.syslog, COMPONENT);
        let session = SupervisorSession::new(&config, syslog);
        let probe = ReadinessProbe::new(config.probe_interval);
        let provisioner = config
            .provision
            .clone()
            .map(|p| Box::new(CommandProvisioner::new(p)) as Box<dyn Provisioner>);

        Self {
            config,
            options,
            state: SupervisorState::Init,
            session,
            probe,
            provisioner,
            init_mode: None,
        }
    }

    /// Replaces the provisioning step.
    #[must_use]
    pub fn with_provisioner(mut self, provisioner: impl Provisioner + 'static) -> Self {
        self.provisioner = Some(Box::new(provisioner));
        self
    }

    /// Uses `mode` instead of inspecting PID 1.
    #[must_use]
    pub fn with_init_mode(mut self, mode: InitMode) -> Self {
        self.init_mode = Some(mode);
        self
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SupervisorState {
        self.state
    }

    /// The session (daemons, teardown guard).
    #[must_use]
    pub const fn session(&self) -> &SupervisorSession {
        &self.session
    }

    /// Runs the container lifetime to completion.
    pub async fn run(&mut self, router: &mut SignalRouter) -> RunOutcome {
        self.session.capture_terminal();

        let event = self.drive(router).await;
        match &event {
            ShutdownEvent::Aborted(reason) => {
                tracing::error!(reason = %reason, "startup aborted");
            }
            other => tracing::info!(event = %other, "shutting down"),
        }
        self.session.syslog().log(format!("shutting down: {event}"));

        self.transition(SupervisorState::TearingDown);
        let teardown = self.session.teardown().await.unwrap_or_default();
        self.transition(SupervisorState::Terminated);

        let exit_code = exit_code(&event);
        self.session
            .syslog()
            .log(format!("terminated with exit code {exit_code}"));
        RunOutcome {
            exit_code,
            event,
            teardown,
        }
    }

    async fn drive(&mut self, router: &mut SignalRouter) -> ShutdownEvent {
        self.sanity_check();
        self.transition(SupervisorState::SanityChecked);
        self.transition(SupervisorState::ServicesStarting);

        let startup = tokio::select! {
            sig = router.recv() => return ShutdownEvent::Signal(sig),
            startup = self.start_services() => startup,
        };

        let failed = match startup {
            Ok(failed) => failed,
            Err(e) => {
                self.transition(SupervisorState::Aborted);
                return ShutdownEvent::Aborted(e.to_string());
            }
        };
        self.transition(SupervisorState::ServicesReady);

        if let Some(command) = self.options.command.clone() {
            if !failed.is_empty() {
                tracing::warn!(
                    failed = %failed.join(", "),
                    "some services are not running, running the command anyway"
                );
            }
            self.transition(SupervisorState::ForegroundRun);
            return self.run_foreground(&command, router).await;
        }

        if !failed.is_empty() {
            self.transition(SupervisorState::Aborted);
            return ShutdownEvent::Aborted(format!("not ready: {}", failed.join(", ")));
        }
        self.transition(SupervisorState::Watching);
        self.watch(router).await
    }

    fn transition(&mut self, next: SupervisorState) {
        if self.state.can_transition_to(next) {
            tracing::debug!(from = ?self.state, to = ?next, "state transition");
            self.state = next;
        } else {
            tracing::warn!(from = ?self.state, to = ?next, "illegal state transition ignored");
        }
    }

    fn sanity_check(&mut self) {
        let mode = self.init_mode.take().unwrap_or_else(detect_init_mode);
        match mode.warning() {
            Some(warning) => {
                tracing::warn!(init = %mode, "{warning}");
                self.session.syslog().log(warning);
            }
            None => tracing::debug!(init = %mode, "init process check passed"),
        }
    }

    /// Provisions and starts every daemon. Returns the names of daemons that
    /// did not come up; an error means provisioning aborted the run.
    async fn start_services(&mut self) -> Result<Vec<String>> {
        if let Some(provisioner) = &self.provisioner {
            match provisioner.provision().await {
                Ok(outcome) => tracing::info!(outcome = ?outcome, "provisioning done"),
                Err(e) => {
                    self.session.syslog().log(e.to_string());
                    if self
                        .config
                        .on_provision_failure
                        .should_abort(self.options.has_command())
                    {
                        return Err(e);
                    }
                    tracing::error!(
                        error = %e,
                        "provisioning failed, the build service is unusable"
                    );
                }
            }
        }

        let Self {
            session,
            probe,
            options,
            ..
        } = self;
        let syslog = session.syslog().clone();

        let mut failed = Vec::new();
        for daemon in session.daemons_mut() {
            let name = daemon.name().to_string();
            if let Err(e) = start_daemon(daemon, probe, options, &syslog).await {
                tracing::error!(daemon = %name, error = %e, "daemon did not start");
                syslog.log(e.to_string());
                failed.push(name);
            }
        }
        Ok(failed)
    }

    async fn watch(&mut self, router: &mut SignalRouter) -> ShutdownEvent {
        if let Err(e) = self.session.watch(DaemonRole::Worker) {
            return ShutdownEvent::Aborted(e.to_string());
        }
        let daemon = self.session.watched().unwrap_or_default().to_string();

        tracing::info!(daemon = %daemon, "service running");
        self.session.syslog().log("service running");

        let exited = tokio::select! {
            sig = router.recv() => return ShutdownEvent::Signal(sig),
            exited = self.session.wait_watched() => exited,
        };

        let (code, signal) = match exited {
            Ok(status) => (status.code(), exit_signal(status)),
            Err(e) => {
                tracing::error!(daemon = %daemon, error = %e, "lost track of daemon");
                (None, None)
            }
        };
        let event = ShutdownEvent::PrimaryExited {
            daemon,
            code,
            signal,
        };

        tracing::error!(event = %event, "primary daemon terminated unexpectedly");
        self.session
            .syslog()
            .log(format!("{event}; shutting the container down"));

        // a signal during the grace period only shortens it
        tokio::select! {
            _ = router.recv() => {}
            () = tokio::time::sleep(self.config.grace_period) => {}
        }
        event
    }

    async fn run_foreground(&mut self, command: &[String], router: &mut SignalRouter) -> ShutdownEvent {
        let Some((program, args)) = command.split_first() else {
            return ShutdownEvent::Aborted("empty command".to_string());
        };

        let account = if self.options.run_as_root {
            None
        } else {
            match self.config.service_user.as_deref().map(ServiceAccount::lookup) {
                Some(Ok(account)) => Some(account),
                Some(Err(e)) => return ShutdownEvent::Aborted(e.to_string()),
                None => None,
            }
        };

        let program = Path::new(program);
        let spawned = ProcessSpec::foreground(program, args)
            .run_as(account.as_ref())
            .spawn();
        let (mut child, pid) = match spawned {
            Ok(spawned) => spawned,
            Err(e) => {
                tracing::error!(error = %e, "command could not be started");
                self.session.syslog().log(e.to_string());
                return ShutdownEvent::CommandExited(COMMAND_NOT_FOUND);
            }
        };
        tracing::info!(
            pid = pid,
            command = %command.join(" "),
            user = account.as_ref().map_or("root", |a| a.name.as_str()),
            "running command"
        );

        let status = tokio::select! {
            status = child.wait() => status,
            sig = router.recv() => {
                tracing::info!(pid = pid, signal = %sig, "forwarding signal to command");
                if let Err(e) = send_signal(pid, sig) {
                    tracing::debug!(pid = pid, error = %e, "signal not delivered");
                }
                if tokio::time::timeout(self.config.grace_period, child.wait()).await.is_err() {
                    tracing::warn!(pid = pid, "command ignored the signal, killing it");
                    if let Err(e) = child.kill().await {
                        tracing::debug!(pid = pid, error = %e, "kill failed");
                    }
                }
                return ShutdownEvent::Signal(sig);
            }
        };

        match status {
            Ok(status) => {
                let code = exit_status_code(status);
                tracing::info!(code = code, "command finished");
                ShutdownEvent::CommandExited(code)
            }
            Err(e) => {
                tracing::error!(error = %e, "waiting for command failed");
                ShutdownEvent::CommandExited(1)
            }
        }
    }
}

async fn start_daemon(
    daemon: &mut crate::daemon::ManagedDaemon,
    probe: &ReadinessProbe,
    options: &RunOptions,
    syslog: &Syslog,
) -> Result<()> {
    daemon.prepare()?;
    let pid = daemon.start(options)?;
    syslog.log(format!("started {} (pid {pid})", daemon.name()));

    let Some(target) = daemon.spec().probe.clone() else {
        return Ok(());
    };

    match probe.wait_ready(&target, options.startup_timeout).await {
        Ok(elapsed) => {
            daemon.mark_ready()?;
            tracing::info!(daemon = %daemon.name(), elapsed = ?elapsed, "ready");
            syslog.log(format!("{} ready", daemon.name()));
            Ok(())
        }
        Err(ReadinessError::Timeout {
            elapsed,
            last_error,
        }) => {
            // the start succeeded, so it gets its stop
            if let Err(e) = daemon.stop().await {
                tracing::debug!(daemon = %daemon.name(), error = %e, "stop after timeout");
            }
            daemon.mark_failed(FailureReason::ReadinessTimeout);
            Err(SupervisorError::ReadinessTimeout {
                daemon: daemon.name().to_string(),
                elapsed,
                last_error,
            })
        }
    }
}

fn exit_signal(status: std::process::ExitStatus) -> Option<i32> {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.signal()
    }
    #[cfg(not(unix))]
    {
        let _ = status;
        None
    }
}
