//! Terminal echo restoration.
//!
//! Foreground commands (and interrupted ones in particular) can leave the
//! controlling terminal with echo disabled. The supervisor snapshots the
//! attributes at startup and puts them back during teardown.

#[cfg(unix)]
use nix::sys::termios::{self, SetArg, Termios};

use crate::error::{PlatformError, Result};

/// Saved terminal attributes of stdin.
pub struct TerminalGuard {
    #[cfg(unix)]
    saved: Termios,
}

impl std::fmt::Debug for TerminalGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalGuard").finish_non_exhaustive()
    }
}

impl TerminalGuard {
    /// Captures stdin's attributes, or `None` if stdin is not a terminal.
    #[must_use]
    pub fn capture() -> Option<Self> {
        #[cfg(unix)]
        {
            use std::io::IsTerminal;

            let stdin = std::io::stdin();
            if !stdin.is_terminal() {
                return None;
            }
            termios::tcgetattr(&stdin)
                .ok()
                .map(|saved| Self { saved })
        }

        #[cfg(not(unix))]
        {
            None
        }
    }

    /// Writes the saved attributes back to stdin.
    pub fn restore(&self) -> Result<()> {
        #[cfg(unix)]
        {
            termios::tcsetattr(std::io::stdin(), SetArg::TCSANOW, &self.saved)
                .map_err(|e| PlatformError::Terminal(format!("tcsetattr: {e}")))
        }

        #[cfg(not(unix))]
        {
            Err(PlatformError::not_supported("terminal attributes"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_matches_tty() {
        // Under a test harness stdin is usually not a terminal.
        use std::io::IsTerminal;

        let is_tty = std::io::stdin().is_terminal();
        assert_eq!(TerminalGuard::capture().is_some(), is_tty && cfg!(unix));
    }

    #[test]
    fn test_restore_roundtrip_when_tty() {
        if let Some(guard) = TerminalGuard::capture() {
            guard.restore().unwrap();
        }
    }
}
