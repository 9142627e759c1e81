//! Managed daemons.
//!
//! A [`ManagedDaemon`] owns one external executable: the files it needs, the
//! detached child process, and the pidfile recording its PID. Every successful
//! [`start`](ManagedDaemon::start) is paired with exactly one
//! [`stop`](ManagedDaemon::stop), and only `stop` removes the pidfile.

use std::path::Path;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;
use tokio::time::Instant;

use dccinit_platform::{PidFile, ProcessSpec, ServiceAccount, Signal, is_alive, send_signal, set_mode};

use crate::config::{DaemonSpec, RunOptions};
use crate::error::{Result, SupervisorError};
use crate::types::{DaemonRole, DaemonStatus, FailureReason};

/// Permission bits for files handed to a daemon.
pub const FILE_MODE: u32 = 0o644;

/// Permission bits for directories created for a daemon.
pub const DIR_MODE: u32 = 0o755;

/// How long to wait for a process after SIGKILL.
const KILL_WAIT: Duration = Duration::from_secs(5);

/// Poll interval when waiting on a process we are not the parent of.
const EXIT_POLL: Duration = Duration::from_millis(50);

/// One externally-executed long-running process.
#[derive(Debug)]
pub struct ManagedDaemon {
    role: DaemonRole,
    spec: DaemonSpec,
    pidfile: PidFile,
    account: Option<ServiceAccount>,
    status: DaemonStatus,
    child: Option<Child>,
    pid: Option<u32>,
}

impl ManagedDaemon {
    /// Creates a stopped daemon from its spec.
    #[must_use]
    pub fn new(role: DaemonRole, spec: DaemonSpec) -> Self {
        let pidfile = PidFile::new(&spec.pidfile);
        Self {
            role,
            spec,
            pidfile,
            account: None,
            status: DaemonStatus::Stopped,
            child: None,
            pid: None,
        }
    }

    /// Logical name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Role in the container.
    #[must_use]
    pub const fn role(&self) -> DaemonRole {
        self.role
    }

    /// The daemon's spec.
    #[must_use]
    pub const fn spec(&self) -> &DaemonSpec {
        &self.spec
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn status(&self) -> DaemonStatus {
        self.status
    }

    /// PID of the running process, if started.
    #[must_use]
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// The daemon's pidfile.
    #[must_use]
    pub const fn pidfile(&self) -> &PidFile {
        &self.pidfile
    }

    /// Resolved run-as account, after [`prepare`](Self::prepare).
    #[must_use]
    pub const fn account(&self) -> Option<&ServiceAccount> {
        self.account.as_ref()
    }

    /// Last known state; no OS poll.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == DaemonStatus::Running
    }

    /// Creates the pidfile and log files with the right owner and mode.
    ///
    /// # Errors
    /// Returns [`SupervisorError::ResourceSetup`] and marks the daemon failed
    /// if the account is unknown or any file cannot be set up.
    pub fn prepare(&mut self) -> Result<()> {
        if self.status != DaemonStatus::Stopped {
            return Err(SupervisorError::state(format!(
                "{}: prepare while {}",
                self.spec.name, self.status
            )));
        }

        match self.prepare_files() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.discard_pidfile();
                self.status = DaemonStatus::Failed(FailureReason::ResourceSetup);
                Err(SupervisorError::resource_setup(&self.spec.name, e))
            }
        }
    }

    /// Removes the pidfile left by `prepare` when no process got recorded.
    fn discard_pidfile(&self) {
        if let Err(e) = self.pidfile.remove() {
            tracing::debug!(daemon = %self.spec.name, error = %e, "pidfile not removed");
        }
    }

    fn prepare_files(&mut self) -> dccinit_platform::Result<()> {
        self.account = match &self.spec.user {
            Some(user) => Some(ServiceAccount::lookup(user)?),
            None => None,
        };
        let account = self.account.as_ref();

        if let Some(parent) = self.pidfile.path().parent() {
            ensure_dir(parent, account)?;
        }
        self.pidfile.create_empty()?;
        hand_over(self.pidfile.path(), account)?;

        for log in &self.spec.log_files {
            if let Some(parent) = log.parent() {
                ensure_dir(parent, account)?;
            }
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log)
                .map_err(|e| dccinit_platform::PlatformError::resource(log, e.to_string()))?;
            hand_over(log, account)?;
        }

        tracing::debug!(daemon = %self.spec.name, "resources prepared");
        Ok(())
    }

    /// Spawns the daemon detached and records its PID.
    ///
    /// Returns the PID. The daemon moves to `WaitingReady` if it has a probe,
    /// `Running` otherwise.
    ///
    /// # Errors
    /// Returns [`SupervisorError::State`] unless stopped, and
    /// [`SupervisorError::Spawn`] if the process cannot be started.
    pub fn start(&mut self, options: &RunOptions) -> Result<u32> {
        if self.status != DaemonStatus::Stopped {
            return Err(SupervisorError::state(format!(
                "{}: start while {}",
                self.spec.name, self.status
            )));
        }
        self.status = DaemonStatus::Starting;

        let args = self.spec.render_args(options);
        let spawned = ProcessSpec::daemon(&self.spec.program, &args)
            .run_as(self.account.as_ref())
            .spawn();
        let (mut child, pid) = match spawned {
            Ok(spawned) => spawned,
            Err(e) => {
                self.discard_pidfile();
                self.status = DaemonStatus::Failed(FailureReason::Spawn);
                return Err(SupervisorError::spawn(&self.spec.name, e));
            }
        };

        if let Err(e) = self.pidfile.write(pid) {
            // no pidfile means no stop; do not leave an untracked process
            if let Err(kill) = child.start_kill() {
                tracing::debug!(daemon = %self.spec.name, pid = pid, error = %kill, "kill failed");
            }
            self.discard_pidfile();
            self.status = DaemonStatus::Failed(FailureReason::ResourceSetup);
            return Err(SupervisorError::resource_setup(&self.spec.name, e));
        }

        self.child = Some(child);
        self.pid = Some(pid);
        self.status = if self.spec.probe.is_some() {
            DaemonStatus::WaitingReady
        } else {
            DaemonStatus::Running
        };

        tracing::info!(daemon = %self.spec.name, pid = pid, "started");
        Ok(pid)
    }

    /// Confirms readiness after a successful probe.
    ///
    /// # Errors
    /// Returns [`SupervisorError::State`] unless waiting for readiness.
    pub fn mark_ready(&mut self) -> Result<()> {
        match self.status {
            DaemonStatus::WaitingReady => {
                self.status = DaemonStatus::Running;
                Ok(())
            }
            DaemonStatus::Running => Ok(()),
            other => Err(SupervisorError::state(format!(
                "{}: mark_ready while {other}",
                self.spec.name
            ))),
        }
    }

    /// Records why the daemon never became ready.
    pub fn mark_failed(&mut self, reason: FailureReason) {
        tracing::debug!(daemon = %self.spec.name, reason = %reason, "marked failed");
        self.status = DaemonStatus::Failed(reason);
    }

    /// Resolves when the child exits on its own.
    ///
    /// # Errors
    /// Returns [`SupervisorError::State`] if no child was spawned.
    pub async fn wait_exit(&mut self) -> Result<ExitStatus> {
        let child = self.child.as_mut().ok_or_else(|| {
            SupervisorError::state(format!("{}: no process to wait for", self.spec.name))
        })?;
        Ok(child.wait().await?)
    }

    /// Stops the daemon and removes its pidfile.
    ///
    /// Sends the configured stop signal to the PID in the pidfile, waits up
    /// to the stop timeout, then escalates to SIGKILL.
    ///
    /// # Errors
    /// Returns [`SupervisorError::State`] if no process was started, and
    /// [`SupervisorError::Stop`] if the pidfile is missing or stale or the
    /// process had already exited. The pidfile is removed in every case.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.status.has_process() {
            return Err(SupervisorError::state(format!(
                "{}: stop while {}",
                self.spec.name, self.status
            )));
        }
        self.status = DaemonStatus::Stopping;

        let result = self.terminate().await;

        if let Err(e) = self.pidfile.remove() {
            tracing::warn!(daemon = %self.spec.name, error = %e, "pidfile not removed");
        }
        self.child = None;
        self.pid = None;
        self.status = DaemonStatus::Stopped;

        match &result {
            Ok(()) => tracing::info!(daemon = %self.spec.name, "stopped"),
            Err(e) => tracing::debug!(daemon = %self.spec.name, error = %e, "stop incomplete"),
        }
        result
    }

    async fn terminate(&mut self) -> Result<()> {
        if let Some(child) = self.child.as_mut()
            && let Ok(Some(status)) = child.try_wait()
        {
            return Err(SupervisorError::stop(
                &self.spec.name,
                format!("process already exited ({status})"),
            ));
        }

        let pid = self
            .pidfile
            .read()
            .map_err(|e| SupervisorError::stop(&self.spec.name, e))?;

        match send_signal(pid, self.spec.stop_signal) {
            Ok(()) => {}
            Err(e) if e.is_gone() => return Err(SupervisorError::stop(&self.spec.name, e)),
            Err(e) => return Err(e.into()),
        }
        tracing::debug!(
            daemon = %self.spec.name,
            pid = pid,
            signal = %self.spec.stop_signal,
            "stop signal sent"
        );

        if self.wait_for_exit(pid, self.spec.stop_timeout).await {
            return Ok(());
        }

        tracing::warn!(
            daemon = %self.spec.name,
            pid = pid,
            timeout = ?self.spec.stop_timeout,
            "did not exit in time, sending SIGKILL"
        );
        match send_signal(pid, Signal::Kill) {
            Ok(()) => {}
            Err(e) if e.is_gone() => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        if self.wait_for_exit(pid, KILL_WAIT).await {
            Ok(())
        } else {
            Err(SupervisorError::stop(
                &self.spec.name,
                format!("pid {pid} survived SIGKILL"),
            ))
        }
    }

    /// Waits for `pid` to go away. Our own child is reaped; anything else is
    /// polled with the null signal.
    async fn wait_for_exit(&mut self, pid: u32, timeout: Duration) -> bool {
        if self.pid == Some(pid)
            && let Some(child) = self.child.as_mut()
        {
            return tokio::time::timeout(timeout, child.wait()).await.is_ok();
        }

        let deadline = Instant::now() + timeout;
        while is_alive(pid) {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(EXIT_POLL).await;
        }
        true
    }
}

fn ensure_dir(dir: &Path, account: Option<&ServiceAccount>) -> dccinit_platform::Result<()> {
    if dir.as_os_str().is_empty() || dir.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(dir)
        .map_err(|e| dccinit_platform::PlatformError::resource(dir, e.to_string()))?;
    set_mode(dir, DIR_MODE)?;
    if let Some(account) = account {
        account.chown(dir)?;
    }
    Ok(())
}

fn hand_over(path: &Path, account: Option<&ServiceAccount>) -> dccinit_platform::Result<()> {
    set_mode(path, FILE_MODE)?;
    if let Some(account) = account {
        account.chown(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sleeper(dir: &Path) -> DaemonSpec {
        DaemonSpec::new("sleeper", "/bin/sleep", dir.join("run/sleeper.pid"))
            .with_args(["30"])
            .with_log_files([dir.join("log/sleeper.log")])
            .with_stop_timeout(Duration::from_secs(2))
    }

    #[test]
    fn test_new_daemon_is_stopped() {
        let daemon = ManagedDaemon::new(
            DaemonRole::Worker,
            DaemonSpec::new("w", "/bin/true", "/tmp/w.pid"),
        );
        assert_eq!(daemon.status(), DaemonStatus::Stopped);
        assert!(!daemon.is_running());
        assert!(daemon.pid().is_none());
    }

    #[test]
    fn test_prepare_creates_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut daemon = ManagedDaemon::new(DaemonRole::Worker, sleeper(dir.path()));
        daemon.prepare().unwrap();

        assert!(daemon.pidfile().exists());
        assert!(dir.path().join("log/sleeper.log").exists());

        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(dir.path().join("run")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, DIR_MODE);
        let mode = std::fs::metadata(daemon.pidfile().path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, FILE_MODE);
    }

    #[test]
    fn test_prepare_unknown_account_fails() {
        let dir = tempfile::tempdir().unwrap();
        let spec = sleeper(dir.path()).with_user("no-such-user-dccinit");
        let mut daemon = ManagedDaemon::new(DaemonRole::Worker, spec);

        let err = daemon.prepare().unwrap_err();
        assert!(matches!(err, SupervisorError::ResourceSetup { .. }));
        assert_eq!(
            daemon.status(),
            DaemonStatus::Failed(FailureReason::ResourceSetup)
        );
    }

    #[test]
    fn test_start_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = sleeper(dir.path());
        spec.program = PathBuf::from("/nonexistent/dccinit-daemon");
        let mut daemon = ManagedDaemon::new(DaemonRole::Worker, spec);
        daemon.prepare().unwrap();

        let err = daemon.start(&RunOptions::default()).unwrap_err();
        assert!(matches!(err, SupervisorError::Spawn { .. }));
        assert_eq!(daemon.status(), DaemonStatus::Failed(FailureReason::Spawn));
        assert!(!daemon.is_running());
        assert!(!daemon.pidfile().exists());
    }

    #[test]
    fn test_failed_prepare_leaves_no_pidfile() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("not-a-dir"), "").unwrap();
        let spec = sleeper(dir.path()).with_log_files([dir.path().join("not-a-dir/sleeper.log")]);
        let mut daemon = ManagedDaemon::new(DaemonRole::Worker, spec);

        let err = daemon.prepare().unwrap_err();
        assert!(matches!(err, SupervisorError::ResourceSetup { .. }));
        assert!(!daemon.pidfile().exists());
    }

    #[tokio::test]
    async fn test_start_stop_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut daemon = ManagedDaemon::new(DaemonRole::Worker, sleeper(dir.path()));
        daemon.prepare().unwrap();

        let pid = daemon.start(&RunOptions::default()).unwrap();
        assert!(daemon.is_running());
        assert_eq!(daemon.pidfile().read().unwrap(), pid);
        assert!(is_alive(pid));

        daemon.stop().await.unwrap();
        assert_eq!(daemon.status(), DaemonStatus::Stopped);
        assert!(!daemon.pidfile().exists());
        assert!(!is_alive(pid));
    }

    #[tokio::test]
    async fn test_double_start_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut daemon = ManagedDaemon::new(DaemonRole::Worker, sleeper(dir.path()));
        daemon.prepare().unwrap();
        daemon.start(&RunOptions::default()).unwrap();

        let err = daemon.start(&RunOptions::default()).unwrap_err();
        assert!(matches!(err, SupervisorError::State(_)));

        daemon.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_after_organic_exit() {
        let dir = tempfile::tempdir().unwrap();
        let spec = sleeper(dir.path()).with_args(["0"]);
        let mut daemon = ManagedDaemon::new(DaemonRole::Worker, spec);
        daemon.prepare().unwrap();
        daemon.start(&RunOptions::default()).unwrap();

        let status = daemon.wait_exit().await.unwrap();
        assert!(status.success());

        let err = daemon.stop().await.unwrap_err();
        assert!(err.is_benign());
        assert!(!daemon.pidfile().exists());
        assert_eq!(daemon.status(), DaemonStatus::Stopped);
    }

    #[tokio::test]
    async fn test_stop_escalates_to_kill() {
        let dir = tempfile::tempdir().unwrap();
        let spec = DaemonSpec::new("stubborn", "/bin/sh", dir.path().join("stubborn.pid"))
            .with_args(["-c", "trap '' TERM; while :; do sleep 1; done"])
            .with_stop_timeout(Duration::from_millis(300));
        let mut daemon = ManagedDaemon::new(DaemonRole::Worker, spec);
        daemon.prepare().unwrap();
        let pid = daemon.start(&RunOptions::default()).unwrap();
        // let the shell install its trap
        tokio::time::sleep(Duration::from_millis(200)).await;

        daemon.stop().await.unwrap();
        assert!(!is_alive(pid));
        assert!(!daemon.pidfile().exists());
    }

    #[tokio::test]
    async fn test_stop_never_started() {
        let mut daemon = ManagedDaemon::new(
            DaemonRole::Stats,
            DaemonSpec::new("idle", "/bin/true", "/tmp/idle.pid"),
        );
        let err = daemon.stop().await.unwrap_err();
        assert!(matches!(err, SupervisorError::State(_)));
    }

    #[tokio::test]
    async fn test_probed_daemon_waits_for_ready() {
        let dir = tempfile::tempdir().unwrap();
        let spec = sleeper(dir.path()).with_probe(crate::readiness::ProbeTarget::tcp("127.0.0.1:1"));
        let mut daemon = ManagedDaemon::new(DaemonRole::Worker, spec);
        daemon.prepare().unwrap();
        daemon.start(&RunOptions::default()).unwrap();

        assert_eq!(daemon.status(), DaemonStatus::WaitingReady);
        assert!(!daemon.is_running());
        daemon.mark_ready().unwrap();
        assert!(daemon.is_running());

        daemon.stop().await.unwrap();
        daemon.mark_failed(FailureReason::ReadinessTimeout);
        assert!(daemon.mark_ready().is_err());
    }
}
