//! Emulated system log.
//!
//! Containers usually have no syslog daemon, so lifecycle messages are
//! appended directly to a file in the classic format:
//!
//! ```text
//! Oct 19 14:03:11 build-7 dccinit[1]: distccd ready after 412ms
//! ```
//!
//! A line that cannot be written is printed to stderr instead.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

/// Appends formatted lines to a syslog-style file.
#[derive(Debug, Clone)]
pub struct Syslog {
    path: PathBuf,
    host: String,
    component: String,
    pid: u32,
}

impl Syslog {
    /// Creates a writer tagging lines with `component` and the current PID.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, component: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            host: hostname(),
            component: component.into(),
            pid: std::process::id(),
        }
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one line; falls back to stderr on failure.
    pub fn log(&self, message: impl AsRef<str>) {
        let line = self.format_line(Local::now(), message.as_ref());
        if let Err(e) = self.append(&line) {
            tracing::debug!(path = %self.path.display(), error = %e, "syslog write failed");
            eprint!("{line}");
        }
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }

    fn format_line(&self, at: DateTime<Local>, message: &str) -> String {
        format!(
            "{} {} {}[{}]: {}\n",
            at.format("%b %e %H:%M:%S"),
            self.host,
            self.component,
            self.pid,
            message.trim_end()
        )
    }
}

fn hostname() -> String {
    #[cfg(unix)]
    {
        nix::unistd::gethostname()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string())
    }

    #[cfg(not(unix))]
    {
        "localhost".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_line() {
        let syslog = Syslog {
            path: PathBuf::from("/dev/null"),
            host: "build-7".into(),
            component: "dccinit".into(),
            pid: 1,
        };
        let at = Local.with_ymd_and_hms(2024, 3, 5, 9, 7, 1).unwrap();
        assert_eq!(
            syslog.format_line(at, "distccd ready\n"),
            "Mar  5 09:07:01 build-7 dccinit[1]: distccd ready\n"
        );
    }

    #[test]
    fn test_log_appends() {
        let dir = tempfile::tempdir().unwrap();
        let syslog = Syslog::new(dir.path().join("syslog"), "dccinit");
        syslog.log("first");
        Syslog::new(syslog.path(), "dcc-free-mem").log("second");

        let content = std::fs::read_to_string(syslog.path()).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(&format!("dccinit[{}]: first", std::process::id())));
        assert!(lines[1].ends_with(&format!("dcc-free-mem[{}]: second", std::process::id())));
    }

    #[test]
    fn test_log_unwritable_does_not_fail() {
        let syslog = Syslog::new("/nonexistent/dir/syslog", "dccinit");
        syslog.log("goes to stderr");
    }
}
