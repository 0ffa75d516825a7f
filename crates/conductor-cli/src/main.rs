//! Conductor - workflow runner
//!
//! Runs a workflow file against agents reachable over NATS. Each agent is
//! served by an `AgentWorker` listening on its inbox subject.
//!
//! # Usage
//!
//! ```bash
//! # Check a workflow without running it
//! conductor validate workflows/report.yaml
//!
//! # Run it, stopping at the first failed step
//! CONDUCTOR_NATS_URL=nats://nats.internal:4222 \
//!     conductor run workflows/report.yaml --halt-on-failure --json
//! ```

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use conductor_bus::{BusTransport, MessageBus, NatsBus};
use conductor_core::RegistryDispatcher;
use conductor_orchestrator::{
    ExecutionMode, FailurePolicy, Orchestrator, RetryPolicy, StepState, WorkflowDefinition,
    WorkflowRunReport,
};

use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "conductor", version, about = "Run multi-agent workflows")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a workflow and list its steps without running it
    Validate {
        /// Workflow file (.yaml, .yml or .json)
        file: PathBuf,
    },
    /// Run a workflow
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Workflow file (.yaml, .yml or .json)
    file: PathBuf,

    /// TOML configuration file
    #[arg(long, env = "CONDUCTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Remote agent ids served at their standard inbox (comma separated)
    #[arg(long, value_delimiter = ',')]
    agents: Vec<String>,

    /// Stop issuing steps after the first failure
    #[arg(long)]
    halt_on_failure: bool,

    /// Attempts per step, including the first
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Per-dispatch timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Run independent steps concurrently, at most this many at once
    #[arg(long)]
    concurrent: Option<usize>,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut AppConfig) {
        if self.halt_on_failure {
            config.orchestrator.failure_policy = FailurePolicy::HaltOnFirstFailure;
        }
        if let Some(max_attempts) = self.max_attempts {
            config.orchestrator.retry = RetryPolicy {
                max_attempts,
                ..config.orchestrator.retry
            };
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.dispatch.timeout_ms = timeout_ms;
        }
        if let Some(max_parallel) = self.concurrent {
            config.orchestrator.execution = ExecutionMode::Concurrent { max_parallel };
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    match Cli::parse().command {
        Command::Validate { file } => validate(file),
        Command::Run(args) => run(args).await,
    }
}

fn validate(file: PathBuf) -> Result<ExitCode> {
    let workflow = WorkflowDefinition::load(&file)
        .with_context(|| format!("Failed to load workflow {}", file.display()))?;

    println!("{}: {} step(s)", workflow.name, workflow.steps.len());
    let mut malformed = 0;
    for (index, step) in workflow.steps.iter().enumerate() {
        let label = step.label(index);
        match step.prepare() {
            Ok((agent, _)) => println!("  {:>3}. {label} -> {agent}", index + 1),
            Err(reason) => {
                malformed += 1;
                println!("  {:>3}. {label} (will be skipped: {reason})", index + 1);
            }
        }
    }

    if malformed > 0 {
        warn!(malformed, "Workflow has steps that will be skipped");
    }
    Ok(ExitCode::SUCCESS)
}

async fn run(args: RunArgs) -> Result<ExitCode> {
    info!("Starting conductor v{}", env!("CARGO_PKG_VERSION"));

    let workflow = WorkflowDefinition::load(&args.file)
        .with_context(|| format!("Failed to load workflow {}", args.file.display()))?;

    let mut config = AppConfig::load(args.config.as_deref())?;
    args.apply(&mut config);

    let registry = config
        .registry(&args.agents, &workflow)
        .context("Invalid agent configuration")?;
    info!(agents = ?registry.ids(), "Agents registered");

    let bus = Arc::new(
        NatsBus::connect(config.nats_config())
            .await
            .context("Failed to connect to NATS")?,
    );

    let dispatcher = RegistryDispatcher::new(Arc::new(registry))
        .with_transport(Arc::new(BusTransport::new(bus.clone())))
        .with_config(config.dispatch.clone());
    let orchestrator = Orchestrator::new(dispatcher).with_config(config.orchestrator);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight steps");
            on_signal.cancel();
        }
    });

    let report = orchestrator
        .run_workflow_with_cancel(&workflow, cancel)
        .await;

    if let Err(e) = bus.disconnect().await {
        error!(error = %e, "Failed to disconnect from NATS");
    }

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        print_report(&report);
    }

    Ok(if report.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn print_report(report: &WorkflowRunReport) {
    println!(
        "{} [{}] {:?} in {}ms",
        report.workflow_name, report.run_id, report.outcome, report.total_time_ms
    );

    for entry in &report.entries {
        let detail = match (entry.outcome.skip_reason(), entry.outcome.envelope()) {
            (Some(reason), _) => format!("skipped: {reason}"),
            (None, Some(envelope)) => match envelope.error() {
                Some(error) => error.to_string(),
                None => envelope
                    .result()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            },
            (None, None) => String::new(),
        };
        let attempts = entry.outcome.attempts().len();
        let retries = if attempts > 1 {
            format!(" after {attempts} attempts")
        } else {
            String::new()
        };
        println!(
            "  {:>3}. {} {:?}{retries}: {detail}",
            entry.index + 1,
            entry.label,
            entry.state()
        );
    }

    println!(
        "{} succeeded, {} failed, {} skipped",
        report.count(StepState::Success),
        report.count(StepState::Failure),
        report.count(StepState::Skipped)
    );
}
