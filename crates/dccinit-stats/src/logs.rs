//! Web-server style access and error logs.

use std::io::Write;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use dccinit_platform::Syslog;

/// Appends `<addr> - - [<date>] <message>` lines to the access and error
/// logs. A line that cannot be written goes to the syslog and stderr.
#[derive(Debug, Clone)]
pub struct RequestLog {
    access: PathBuf,
    error: PathBuf,
    syslog: Syslog,
}

impl RequestLog {
    /// Creates the logger.
    #[must_use]
    pub fn new(access: impl Into<PathBuf>, error: impl Into<PathBuf>, syslog: Syslog) -> Self {
        Self {
            access: access.into(),
            error: error.into(),
            syslog,
        }
    }

    /// The syslog writer.
    #[must_use]
    pub const fn syslog(&self) -> &Syslog {
        &self.syslog
    }

    /// Records one served request.
    pub fn access(&self, client: IpAddr, request_line: &str, code: u16, size: Option<usize>) {
        let size = size.map_or_else(|| "-".to_string(), |s| s.to_string());
        let message = format!("\"{request_line}\" {code} {size}");
        self.write(&self.access, client, &message);
    }

    /// Records a problem while serving a request.
    pub fn error(&self, client: IpAddr, message: &str) {
        tracing::warn!(client = %client, "{message}");
        self.write(&self.error, client, message);
    }

    fn write(&self, path: &Path, client: IpAddr, message: &str) {
        let line = format_line(Local::now(), client, message);
        let written = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(line.as_bytes()));

        if let Err(e) = written {
            tracing::debug!(path = %path.display(), error = %e, "log write failed");
            self.syslog.log(format!(
                "failed to log a message to file \"{}\":",
                path.display()
            ));
            self.syslog.log(line.trim_end());
            eprint!("{line}");
        }
    }
}

fn format_line(now: DateTime<Local>, client: IpAddr, message: &str) -> String {
    format!("{client} - - [{}] {message}\n", now.format("%d/%b/%Y %H:%M:%S"))
}
