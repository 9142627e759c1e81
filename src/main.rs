//! dccinit - start the distcc build service and supervise it as PID 1.
//!
//! ```bash
//! dccinit --jobs 8                 # watch the worker until a signal arrives
//! dccinit -- make -j16             # run a build in the foreground
//! ```

use std::process::ExitCode;

use anyhow::Context;

use dccinit::cli::{Cli, Invocation, USAGE_EXIT_CODE};
use dccinit::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = match Invocation::parse(std::env::args_os()) {
        Invocation::Run(cli) => cli,
        Invocation::Info(info) => {
            let _ = info.print();
            return ExitCode::SUCCESS;
        }
        Invocation::Usage(e) => {
            let _ = e.print();
            return ExitCode::from(USAGE_EXIT_CODE);
        }
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!(error = format!("{e:#}"), "dccinit failed to start");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    let config = match &cli.config {
        Some(path) => SupervisorConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SupervisorConfig::default(),
    };
    let options = cli.run_options();
    tracing::info!(
        jobs = options.jobs,
        nice = options.nice,
        foreground = options.has_command(),
        "starting"
    );

    let mut router = SignalRouter::install().context("installing signal handlers")?;
    let mut supervisor = ServiceSupervisor::new(config, options);
    let outcome = supervisor.run(&mut router).await;

    tracing::info!(
        event = %outcome.event,
        exit_code = outcome.exit_code,
        stopped = outcome.teardown.stopped.len(),
        "exiting"
    );
    Ok(outcome.exit_code)
}
