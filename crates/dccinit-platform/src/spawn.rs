//! Building commands for managed processes.
//!
//! Daemons are detached into their own session so terminal signals aimed at
//! the supervisor do not reach them; both daemons and foreground commands
//! may drop privileges to a service account.

use std::path::Path;
use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::account::ServiceAccount;
use crate::error::{PlatformError, Result};

/// How the child's standard streams are wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdioMode {
    /// stdin/stdout/stderr go to `/dev/null`.
    Null,
    /// The child shares the supervisor's terminal.
    Inherit,
}

/// Builder for a child process launched by the supervisor.
#[derive(Debug, Clone)]
pub struct ProcessSpec<'a> {
    program: &'a Path,
    args: &'a [String],
    account: Option<&'a ServiceAccount>,
    detach: bool,
    stdio: StdioMode,
}

impl<'a> ProcessSpec<'a> {
    /// A detached, silent daemon process.
    #[must_use]
    pub fn daemon(program: &'a Path, args: &'a [String]) -> Self {
        Self {
            program,
            args,
            account: None,
            detach: true,
            stdio: StdioMode::Null,
        }
    }

    /// A foreground process attached to the supervisor's terminal.
    #[must_use]
    pub fn foreground(program: &'a Path, args: &'a [String]) -> Self {
        Self {
            program,
            args,
            account: None,
            detach: false,
            stdio: StdioMode::Inherit,
        }
    }

    /// Runs the process as `account`. Root accounts keep the current
    /// credentials.
    #[must_use]
    pub const fn run_as(mut self, account: Option<&'a ServiceAccount>) -> Self {
        self.account = account;
        self
    }

    /// Builds the tokio command without spawning it.
    #[must_use]
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(self.program);
        cmd.args(self.args);

        match self.stdio {
            StdioMode::Null => {
                cmd.stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null());
            }
            StdioMode::Inherit => {
                cmd.stdin(Stdio::inherit())
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit());
            }
        }

        if let Some(account) = self.account {
            cmd.envs(account.env());
            #[cfg(unix)]
            if account.uid != nix::unistd::geteuid().as_raw() {
                // std drops supplementary groups itself when leaving root
                cmd.uid(account.uid).gid(account.gid);
            }
        }

        #[cfg(unix)]
        if self.detach {
            #[allow(unsafe_code)]
            // SAFETY: setsid(2) is async-signal-safe and touches no memory
            // of the parent.
            unsafe {
                cmd.pre_exec(|| {
                    nix::unistd::setsid().map_err(std::io::Error::from)?;
                    Ok(())
                });
            }
        }

        cmd
    }

    /// Spawns the process and returns the child with its PID.
    ///
    /// # Errors
    /// Returns [`PlatformError::Spawn`] if the executable is missing or the
    /// OS refuses to fork/exec.
    pub fn spawn(&self) -> Result<(Child, u32)> {
        let child = self.command().spawn().map_err(|e| {
            PlatformError::spawn(format!("{}: {e}", self.program.display()))
        })?;
        let pid = child
            .id()
            .ok_or_else(|| PlatformError::spawn("process exited before its PID was read"))?;

        tracing::debug!(
            program = %self.program.display(),
            pid = pid,
            detached = self.detach,
            user = self.account.map(|a| a.name.as_str()).unwrap_or("-"),
            "spawned process"
        );
        Ok((child, pid))
    }
}
