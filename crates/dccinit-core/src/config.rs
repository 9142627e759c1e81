//! Supervisor configuration.
//!
//! The built-in defaults describe the stock distcc container: cron, distccd
//! and the `dcc-free-mem` stats transformer. Image variants that differ only
//! in paths, ports or the presence of the stats transformer override fields
//! from a TOML file instead of carrying their own entrypoint. Configuration is
//! validated at load time.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use dccinit_platform::Signal;

use crate::error::{Result, SupervisorError};
use crate::readiness::{DEFAULT_PROBE_INTERVAL, ProbeTarget};
use crate::types::DaemonRole;

/// Default nice level passed to the worker.
pub const DEFAULT_NICE: i32 = 5;

/// Default per-daemon readiness timeout.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Container layout: which daemons exist and where their files live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorConfig {
    /// Account foreground commands run as (unless `--root`).
    pub service_user: Option<String>,

    /// Syslog-style file receiving lifecycle lines.
    pub syslog: PathBuf,

    /// Pause between detecting the primary daemon's death and teardown.
    #[serde(with = "humantime_serde")]
    pub grace_period: Duration,

    /// Pause between readiness probe attempts.
    #[serde(with = "humantime_serde")]
    pub probe_interval: Duration,

    /// What a failed provisioning step means.
    pub on_provision_failure: ProvisionFailurePolicy,

    /// External toolchain provisioning step.
    pub provision: Option<ProvisionConfig>,

    /// cron-like scheduler.
    pub scheduler: DaemonSpec,

    /// The primary worker daemon.
    pub worker: DaemonSpec,

    /// Stats transformer in front of the worker's statistics endpoint.
    pub stats: DaemonSpec,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            service_user: Some("distcc".to_string()),
            syslog: PathBuf::from("/var/log/syslog"),
            grace_period: Duration::from_secs(2),
            probe_interval: DEFAULT_PROBE_INTERVAL,
            on_provision_failure: ProvisionFailurePolicy::default(),
            provision: None,
            scheduler: DaemonSpec::default_scheduler(),
            worker: DaemonSpec::default_worker(),
            stats: DaemonSpec::default_stats(),
        }
    }
}

impl SupervisorConfig {
    /// Loads and validates a layout file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SupervisorError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses and validates TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| SupervisorError::config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the daemon spec for a role.
    #[must_use]
    pub const fn spec(&self, role: DaemonRole) -> &DaemonSpec {
        match role {
            DaemonRole::Scheduler => &self.scheduler,
            DaemonRole::Worker => &self.worker,
            DaemonRole::Stats => &self.stats,
        }
    }

    /// Enabled daemons in startup order.
    pub fn enabled_daemons(&self) -> impl Iterator<Item = (DaemonRole, &DaemonSpec)> {
        DaemonRole::STARTUP_ORDER
            .into_iter()
            .map(|role| (role, self.spec(role)))
            .filter(|(_, spec)| spec.enabled)
    }

    /// Validates the layout.
    pub fn validate(&self) -> Result<()> {
        if !self.worker.enabled {
            return Err(SupervisorError::config("the worker daemon cannot be disabled"));
        }
        if self.probe_interval.is_zero() {
            return Err(SupervisorError::config("probe_interval must be positive"));
        }
        if let Some(user) = &self.service_user
            && user.is_empty()
        {
            return Err(SupervisorError::config("service_user cannot be empty"));
        }

        let mut names = HashSet::new();
        let mut pidfiles = HashSet::new();
        for (_, spec) in self.enabled_daemons() {
            spec.validate()?;
            if !names.insert(spec.name.as_str()) {
                return Err(SupervisorError::config(format!(
                    "duplicate daemon name {:?}",
                    spec.name
                )));
            }
            if !pidfiles.insert(spec.pidfile.as_path()) {
                return Err(SupervisorError::config(format!(
                    "pidfile {} shared by several daemons",
                    spec.pidfile.display()
                )));
            }
        }

        if let Some(provision) = &self.provision
            && provision.program.as_os_str().is_empty()
        {
            return Err(SupervisorError::config("provision.program cannot be empty"));
        }
        Ok(())
    }
}

/// One managed daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonSpec {
    /// Logical name (used in logs and as the syslog component).
    pub name: String,

    /// Executable path.
    pub program: PathBuf,

    /// Arguments; `{jobs}` and `{nice}` are substituted at start.
    #[serde(default)]
    pub args: Vec<String>,

    /// Pidfile written at start and removed at stop.
    pub pidfile: PathBuf,

    /// Log files created and chowned before start.
    #[serde(default)]
    pub log_files: Vec<PathBuf>,

    /// Account to run as; `None` keeps the supervisor's credentials.
    #[serde(default)]
    pub user: Option<String>,

    /// Endpoint confirming readiness.
    #[serde(default)]
    pub probe: Option<ProbeTarget>,

    /// Signal sent by stop.
    #[serde(default = "default_stop_signal")]
    pub stop_signal: Signal,

    /// How long stop waits before escalating to SIGKILL.
    #[serde(default = "default_stop_timeout", with = "humantime_serde")]
    pub stop_timeout: Duration,

    /// Whether this daemon is part of the container at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_stop_signal() -> Signal {
    Signal::Term
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_true() -> bool {
    true
}

impl DaemonSpec {
    /// Creates a spec with required fields; everything else defaulted.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        program: impl Into<PathBuf>,
        pidfile: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: vec![],
            pidfile: pidfile.into(),
            log_files: vec![],
            user: None,
            probe: None,
            stop_signal: default_stop_signal(),
            stop_timeout: default_stop_timeout(),
            enabled: true,
        }
    }

    /// Sets the argument vector.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the log files.
    #[must_use]
    pub fn with_log_files<I, P>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.log_files = files.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the run-as account.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Sets the readiness probe.
    #[must_use]
    pub fn with_probe(mut self, probe: ProbeTarget) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Sets the stop timeout.
    #[must_use]
    pub const fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Marks the daemon as absent from this container.
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Expands `{jobs}` and `{nice}` in the argument vector.
    #[must_use]
    pub fn render_args(&self, options: &RunOptions) -> Vec<String> {
        let jobs = options.jobs.to_string();
        let nice = options.nice.to_string();
        self.args
            .iter()
            .map(|arg| arg.replace("{jobs}", &jobs).replace("{nice}", &nice))
            .collect()
    }

    /// Checks that the daemon can be started as described.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(SupervisorError::config("daemon name cannot be empty"));
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(SupervisorError::config(format!(
                "daemon name {:?} must contain only alphanumerics, '-', '_' and '.'",
                self.name
            )));
        }
        if self.program.as_os_str().is_empty() {
            return Err(SupervisorError::config(format!(
                "{}: program cannot be empty",
                self.name
            )));
        }
        if self.pidfile.as_os_str().is_empty() {
            return Err(SupervisorError::config(format!(
                "{}: pidfile cannot be empty",
                self.name
            )));
        }
        if let Some(probe) = &self.probe
            && probe.address().is_empty()
        {
            return Err(SupervisorError::config(format!(
                "{}: probe address cannot be empty",
                self.name
            )));
        }
        Ok(())
    }

    /// Stock cron scheduler.
    #[must_use]
    pub fn default_scheduler() -> Self {
        Self::new("cron", "/usr/sbin/cron", "/run/crond.pid").with_args(["-f"])
    }

    /// Stock distccd worker; statistics on 3634, fronted by the transformer.
    #[must_use]
    pub fn default_worker() -> Self {
        Self::new("distccd", "/usr/bin/distccd", "/run/distccd.pid")
            .with_args([
                "--daemon",
                "--no-detach",
                "--port",
                "3632",
                "--stats",
                "--stats-port",
                "3634",
                "--listen",
                "0.0.0.0",
                "--allow-private",
                "--jobs",
                "{jobs}",
                "--nice",
                "{nice}",
                "--log-level",
                "info",
                "--log-file",
                "/var/log/distccd.log",
            ])
            .with_log_files(["/var/log/distccd.log"])
            .with_user("distcc")
            .with_probe(ProbeTarget::http("127.0.0.1:3634"))
    }

    /// Stock `dcc-free-mem` stats transformer on 3633.
    #[must_use]
    pub fn default_stats() -> Self {
        Self::new("dcc-free-mem", "/usr/local/bin/dcc-free-mem", "/run/dcc-free-mem.pid")
            .with_args([
                "3633",
                "3634",
                "--access-log",
                "/var/log/access.log",
                "--error-log",
                "/var/log/error.log",
                "--system-log",
                "/var/log/syslog",
            ])
            .with_log_files(["/var/log/access.log", "/var/log/error.log"])
            .with_user("distcc")
            .with_probe(ProbeTarget::http("127.0.0.1:3633"))
    }
}

/// External toolchain provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvisionConfig {
    /// Installer executable.
    pub program: PathBuf,

    /// Installer arguments.
    #[serde(default)]
    pub args: Vec<String>,

    /// Marker written on success; its presence skips the step.
    #[serde(default)]
    pub stamp_file: Option<PathBuf>,
}

/// Behavior when provisioning fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ProvisionFailurePolicy {
    /// Always abort.
    Abort,
    /// Abort unless a foreground command was requested.
    #[default]
    AbortUnlessCommand,
    /// Log and continue.
    Continue,
}

impl ProvisionFailurePolicy {
    /// Returns true if a provisioning failure should abort this run.
    #[must_use]
    pub const fn should_abort(&self, has_command: bool) -> bool {
        match self {
            Self::Abort => true,
            Self::AbortUnlessCommand => !has_command,
            Self::Continue => false,
        }
    }
}

/// Per-invocation options from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Worker concurrency.
    pub jobs: u32,
    /// Worker niceness.
    pub nice: i32,
    /// Readiness timeout per probed daemon.
    pub startup_timeout: Duration,
    /// Run the foreground command as root.
    pub run_as_root: bool,
    /// Foreground command; `None` selects watch mode.
    pub command: Option<Vec<String>>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            nice: DEFAULT_NICE,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            run_as_root: false,
            command: None,
        }
    }
}

impl RunOptions {
    /// Returns true in foreground-command mode.
    #[must_use]
    pub const fn has_command(&self) -> bool {
        self.command.is_some()
    }
}

/// CPU count minus two, at least one.
#[must_use]
pub fn default_jobs() -> u32 {
    let cpus = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
    jobs_for_cpus(cpus)
}

/// Worker concurrency for a machine with `cpus` CPUs.
#[must_use]
pub fn jobs_for_cpus(cpus: usize) -> u32 {
    u32::try_from(cpus.saturating_sub(2)).unwrap_or(u32::MAX).max(1)
}

/// Serde helper for humantime durations.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serializes a duration as a human-readable string.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    /// Deserializes a duration from a human-readable string.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_layout_is_valid() {
        let config = SupervisorConfig::default();
        config.validate().unwrap();

        let names: Vec<_> = config.enabled_daemons().map(|(_, s)| s.name.as_str()).collect();
        assert_eq!(names, ["cron", "distccd", "dcc-free-mem"]);
        assert_eq!(config.service_user.as_deref(), Some("distcc"));
        assert!(config.provision.is_none());
    }

    #[test]
    fn test_render_args() {
        let options = RunOptions {
            jobs: 4,
            nice: 5,
            ..RunOptions::default()
        };
        let args = DaemonSpec::default_worker().render_args(&options);
        let jobs = args.iter().position(|a| a == "--jobs").unwrap();
        assert_eq!(args[jobs + 1], "4");
        let nice = args.iter().position(|a| a == "--nice").unwrap();
        assert_eq!(args[nice + 1], "5");
        assert!(!args.iter().any(|a| a.contains('{')));
    }

    #[test]
    fn test_from_toml_overrides() {
        let config = SupervisorConfig::from_toml(
            r#"
            syslog = "/tmp/syslog"
            grace_period = "500ms"
            on_provision_failure = "abort"

            [provision]
            program = "/usr/local/sbin/install-compilers"
            args = ["gcc-13"]
            stamp_file = "/var/lib/dccinit/compilers.stamp"

            [stats]
            name = "dcc-free-mem"
            program = "/usr/local/bin/dcc-free-mem"
            pidfile = "/run/dcc-free-mem.pid"
            enabled = false

            [worker]
            name = "distccd"
            program = "/usr/bin/distccd"
            pidfile = "/var/run/distccd-3632.pid"
            stop_timeout = "3s"
            probe = { kind = "tcp", address = "127.0.0.1:3632" }
            "#,
        )
        .unwrap();

        assert_eq!(config.grace_period, Duration::from_millis(500));
        assert_eq!(config.on_provision_failure, ProvisionFailurePolicy::Abort);
        assert!(!config.stats.enabled);
        assert_eq!(config.enabled_daemons().count(), 2);
        assert_eq!(config.worker.stop_timeout, Duration::from_secs(3));
        assert_eq!(config.worker.stop_signal, Signal::Term);
        assert_eq!(config.worker.probe, Some(ProbeTarget::tcp("127.0.0.1:3632")));
        // untouched sections keep the stock layout
        assert_eq!(config.scheduler, DaemonSpec::default_scheduler());
        assert_eq!(
            config.provision.unwrap().stamp_file,
            Some(PathBuf::from("/var/lib/dccinit/compilers.stamp"))
        );
    }

    #[test]
    fn test_from_toml_rejects_unknown_field() {
        let err = SupervisorConfig::from_toml("bogus = 1").unwrap_err();
        assert!(matches!(err, SupervisorError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_disabled_worker() {
        let mut config = SupervisorConfig::default();
        config.worker = config.worker.disabled();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_shared_pidfile() {
        let mut config = SupervisorConfig::default();
        config.stats.pidfile = config.worker.pidfile.clone();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("shared"));
    }

    #[test]
    fn test_validate_rejects_duplicate_names() {
        let mut config = SupervisorConfig::default();
        config.scheduler.name = "distccd".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_ignores_disabled_duplicates() {
        let mut config = SupervisorConfig::default();
        config.stats = DaemonSpec::default_worker().disabled();
        config.validate().unwrap();
    }

    #[test]
    fn test_spec_validate_invalid_name() {
        let spec = DaemonSpec::new("bad name!", "/bin/true", "/run/x.pid");
        assert!(spec.validate().is_err());
        let spec = DaemonSpec::new("ok", "", "/run/x.pid");
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_provision_failure_policy() {
        assert!(ProvisionFailurePolicy::Abort.should_abort(true));
        assert!(ProvisionFailurePolicy::AbortUnlessCommand.should_abort(false));
        assert!(!ProvisionFailurePolicy::AbortUnlessCommand.should_abort(true));
        assert!(!ProvisionFailurePolicy::Continue.should_abort(false));
    }

    #[test]
    fn test_jobs_for_cpus() {
        assert_eq!(jobs_for_cpus(0), 1);
        assert_eq!(jobs_for_cpus(1), 1);
        assert_eq!(jobs_for_cpus(3), 1);
        assert_eq!(jobs_for_cpus(16), 14);
        assert!(default_jobs() >= 1);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dccinit.toml");
        std::fs::write(&path, "grace_period = \"1s\"\nservice_user = \"builder\"\n").unwrap();

        let config = SupervisorConfig::load(&path).unwrap();
        assert_eq!(config.grace_period, Duration::from_secs(1));
        assert_eq!(config.service_user.as_deref(), Some("builder"));

        let err = SupervisorConfig::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    proptest! {
        #[test]
        fn render_args_substitutes_every_placeholder(jobs in 1u32..512, nice in -20i32..20) {
            let spec = DaemonSpec::new("w", "/bin/w", "/run/w.pid")
                .with_args(["-j{jobs}", "{nice}", "{jobs}{nice}", "plain"]);
            let options = RunOptions { jobs, nice, ..RunOptions::default() };
            let args = spec.render_args(&options);
            prop_assert_eq!(&args[0], &format!("-j{jobs}"));
            prop_assert_eq!(&args[1], &nice.to_string());
            prop_assert_eq!(&args[2], &format!("{jobs}{nice}"));
            prop_assert_eq!(&args[3], "plain");
        }
    }
}
