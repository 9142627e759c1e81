//! Command line of the `dccinit` binary.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use clap::error::ErrorKind;

use dccinit_core::RunOptions;
use dccinit_core::config::{DEFAULT_NICE, default_jobs};

/// Exit code for a malformed command line.
pub const USAGE_EXIT_CODE: u8 = 2;

/// Start the distcc build service and keep it running.
///
/// Without a command, waits until the worker daemon exits or a termination
/// signal arrives. With `-- COMMAND [ARGS...]`, runs the command in the
/// foreground instead and exits with its status.
#[derive(Debug, Parser)]
#[command(name = "dccinit", version, about, long_about = None)]
pub struct Cli {
    /// Number of compile jobs the worker accepts [default: CPUs - 2, at least 1]
    #[arg(short = 'j', long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub jobs: Option<u32>,

    /// Niceness of the worker daemon.
    #[arg(short = 'n', long, value_name = "N", default_value_t = DEFAULT_NICE, allow_negative_numbers = true)]
    pub nice: i32,

    /// Seconds to wait for each daemon to answer on its endpoint.
    #[arg(long, value_name = "SECONDS", default_value_t = 30)]
    pub startup_timeout: u64,

    /// Run the foreground command as root instead of the service account.
    #[arg(long)]
    pub root: bool,

    /// TOML file describing the daemons; built-in defaults otherwise.
    #[arg(short = 'c', long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Command to run in the foreground, after `--`.
    #[arg(last = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

/// What the command line asks for.
#[derive(Debug)]
pub enum Invocation {
    /// Start the service.
    Run(Cli),
    /// Help or version text was requested; print it and exit 0.
    Info(clap::Error),
    /// The command line is malformed; print the error and exit 2.
    Usage(clap::Error),
}

impl Invocation {
    /// Parses `args`, including the program name.
    pub fn parse<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        match Cli::try_parse_from(args) {
            Ok(cli) => Self::Run(cli),
            Err(e) => match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => Self::Info(e),
                _ => Self::Usage(e),
            },
        }
    }
}

impl Cli {
    /// Runtime options for the supervisor.
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            jobs: self.jobs.unwrap_or_else(default_jobs),
            nice: self.nice,
            startup_timeout: Duration::from_secs(self.startup_timeout),
            run_as_root: self.root,
            command: (!self.command.is_empty()).then(|| self.command.clone()),
        }
    }
}
