//! Unix signals and process liveness.
//!
//! Signal numbers are the Linux values; the exit status of a signal-driven
//! shutdown is derived from them (`128 + n`).

use serde::{Deserialize, Serialize};

use crate::error::{PlatformError, Result};

#[cfg(unix)]
use nix::sys::signal::{Signal as NixSignal, kill as nix_kill};
#[cfg(unix)]
use nix::unistd::Pid;

/// Unix-style signals used by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    /// Hangup (terminal closed).
    Hup,
    /// Interrupt (Ctrl+C).
    Int,
    /// Quit.
    Quit,
    /// Terminate (docker stop).
    Term,
    /// Kill (immediate termination).
    Kill,
    /// User signal 1.
    Usr1,
    /// User signal 2.
    Usr2,
}

impl Signal {
    /// Returns the Unix signal number.
    #[must_use]
    pub const fn as_i32(&self) -> i32 {
        match self {
            Self::Hup => 1,
            Self::Int => 2,
            Self::Quit => 3,
            Self::Kill => 9,
            Self::Usr1 => 10,
            Self::Usr2 => 12,
            Self::Term => 15,
        }
    }

    /// Creates a signal from a Unix signal number.
    #[must_use]
    pub const fn from_i32(sig: i32) -> Option<Self> {
        match sig {
            1 => Some(Self::Hup),
            2 => Some(Self::Int),
            3 => Some(Self::Quit),
            9 => Some(Self::Kill),
            10 => Some(Self::Usr1),
            12 => Some(Self::Usr2),
            15 => Some(Self::Term),
            _ => None,
        }
    }

    /// Conventional short name, e.g. `SIGINT`.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Hup => "SIGHUP",
            Self::Int => "SIGINT",
            Self::Quit => "SIGQUIT",
            Self::Term => "SIGTERM",
            Self::Kill => "SIGKILL",
            Self::Usr1 => "SIGUSR1",
            Self::Usr2 => "SIGUSR2",
        }
    }

    #[cfg(unix)]
    const fn to_nix(self) -> NixSignal {
        match self {
            Self::Hup => NixSignal::SIGHUP,
            Self::Int => NixSignal::SIGINT,
            Self::Quit => NixSignal::SIGQUIT,
            Self::Term => NixSignal::SIGTERM,
            Self::Kill => NixSignal::SIGKILL,
            Self::Usr1 => NixSignal::SIGUSR1,
            Self::Usr2 => NixSignal::SIGUSR2,
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Signal {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        let bare = upper.strip_prefix("SIG").unwrap_or(&upper);
        match bare {
            "HUP" => Ok(Self::Hup),
            "INT" => Ok(Self::Int),
            "QUIT" => Ok(Self::Quit),
            "TERM" => Ok(Self::Term),
            "KILL" => Ok(Self::Kill),
            "USR1" => Ok(Self::Usr1),
            "USR2" => Ok(Self::Usr2),
            _ => bare
                .parse::<i32>()
                .ok()
                .and_then(Self::from_i32)
                .ok_or_else(|| PlatformError::signal(format!("unknown signal {s:?}"))),
        }
    }
}

/// Sends `sig` to `pid`.
///
/// # Errors
/// Returns [`PlatformError::NoSuchProcess`] if the process does not exist,
/// [`PlatformError::Signal`] for any other refusal.
pub fn send_signal(pid: u32, sig: Signal) -> Result<()> {
    #[cfg(unix)]
    {
        match nix_kill(Pid::from_raw(pid as i32), sig.to_nix()) {
            Ok(()) => {
                tracing::debug!(pid = pid, signal = %sig, "sent signal");
                Ok(())
            }
            Err(nix::errno::Errno::ESRCH) => Err(PlatformError::NoSuchProcess(pid)),
            Err(e) => Err(PlatformError::signal(format!("kill({pid}, {sig}) failed: {e}"))),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = (pid, sig);
        Err(PlatformError::not_supported("signals"))
    }
}

/// Returns true if a process with this PID exists (null signal probe).
///
/// Zombies still count as existing; callers owning the child must reap it.
#[must_use]
pub fn is_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        if pid == 0 {
            return false;
        }
        // EPERM means it exists but belongs to someone else
        matches!(
            nix_kill(Pid::from_raw(pid as i32), None),
            Ok(()) | Err(nix::errno::Errno::EPERM)
        )
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}
