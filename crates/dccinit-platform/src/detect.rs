//! Init-mode detection.
//!
//! The supervisor expects a real init (`docker run --init`) to sit at PID 1
//! and reap orphaned grandchildren. Running without one is tolerated but
//! reported.

use std::path::Path;

/// Process names accepted as a reaping init at PID 1.
pub const KNOWN_INITS: &[&str] = &[
    "docker-init",
    "tini",
    "dumb-init",
    "catatonit",
    "s6-svscan",
    "systemd",
    "init",
];

/// How the current process tree is rooted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitMode {
    /// A known init is PID 1 and we are its descendant.
    UnderInit(String),
    /// We are PID 1 ourselves; orphans will not be reaped.
    SelfPid1,
    /// Some other process is PID 1.
    Unknown(String),
    /// PID 1 could not be inspected.
    Undetectable,
}

impl InitMode {
    /// Returns true if orphaned processes will be reaped.
    #[must_use]
    pub const fn is_init_capable(&self) -> bool {
        matches!(self, Self::UnderInit(_))
    }

    /// Human-readable warning for non init-capable modes.
    #[must_use]
    pub fn warning(&self) -> Option<String> {
        match self {
            Self::UnderInit(_) => None,
            Self::SelfPid1 => Some(
                "running as PID 1 without an init; orphaned processes will not be reaped \
                 (start the container with `docker run --init`)"
                    .to_string(),
            ),
            Self::Unknown(name) => Some(format!(
                "PID 1 is {name:?}, not a known init; orphaned processes may not be reaped"
            )),
            Self::Undetectable => Some("could not determine the process at PID 1".to_string()),
        }
    }
}

impl std::fmt::Display for InitMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnderInit(name) => write!(f, "under-init({name})"),
            Self::SelfPid1 => f.write_str("pid1"),
            Self::Unknown(name) => write!(f, "unknown({name})"),
            Self::Undetectable => f.write_str("undetectable"),
        }
    }
}

/// Inspects `/proc/1/comm` and our own PID.
#[must_use]
pub fn detect_init_mode() -> InitMode {
    classify(std::process::id(), read_pid1_comm(Path::new("/proc/1/comm")))
}

fn read_pid1_comm(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn classify(own_pid: u32, pid1_comm: Option<String>) -> InitMode {
    if own_pid == 1 {
        return InitMode::SelfPid1;
    }
    match pid1_comm {
        Some(name) if KNOWN_INITS.contains(&name.as_str()) => InitMode::UnderInit(name),
        Some(name) => InitMode::Unknown(name),
        None => InitMode::Undetectable,
    }
}

/// Checks if running inside a container.
#[must_use]
pub fn is_container() -> bool {
    // Docker marker file
    if Path::new("/.dockerenv").exists() {
        return true;
    }

    // cgroup markers
    if let Ok(content) = std::fs::read_to_string("/proc/1/cgroup")
        && (content.contains("docker") || content.contains("containerd") || content.contains("lxc"))
    {
        return true;
    }

    std::env::var("container").is_ok()
}
