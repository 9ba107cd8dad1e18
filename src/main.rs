//! Trustgate CLI entry point.
//!
//! Provides `parse`, `classify`, `validate`, `usage`, and `chain`
//! subcommands for inspecting constraints, checking delegation proposals
//! against a trust store document, and classifying governance usage.
//! Results are printed to stdout as JSON; logs go to stderr.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::debug;

use trustgate::config::TrustgateConfig;
use trustgate::delegation::DelegationProposal;
use trustgate::governance::{GovernanceEvaluator, UsageMetric};
use trustgate::logging;
use trustgate::{GovernanceService, InMemoryTrustStore, PrincipalId};

/// Trust delegation and governance validation.
#[derive(Parser)]
#[command(name = "trustgate", version, about)]
struct Cli {
    /// Config file to read instead of `~/.trustgate/config.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Parse a `kind:field:value` constraint and print its structure.
    Parse {
        /// Raw constraint string.
        raw: String,
    },
    /// Classify a single usage reading against a limit.
    Classify {
        /// Metric the reading belongs to.
        #[arg(long, value_enum)]
        metric: MetricArg,
        /// Current consumption.
        #[arg(long)]
        current: f64,
        /// Configured limit; omit for an unlimited metric.
        #[arg(long)]
        limit: Option<f64>,
    },
    /// Validate a delegation proposal against the source's stored envelope.
    Validate {
        /// Trust store JSON document. Defaults to `store.path` from config.
        #[arg(long)]
        store: Option<PathBuf>,
        /// Proposal JSON file.
        #[arg(long)]
        proposal: PathBuf,
    },
    /// Classify a principal's current usage snapshot.
    Usage {
        /// Trust store JSON document. Defaults to `store.path` from config.
        #[arg(long)]
        store: Option<PathBuf>,
        /// Principal to evaluate.
        #[arg(long)]
        principal: String,
    },
    /// Print the delegation chain ending at a principal.
    Chain {
        /// Trust store JSON document. Defaults to `store.path` from config.
        #[arg(long)]
        store: Option<PathBuf>,
        /// Principal at the end of the chain.
        #[arg(long)]
        principal: String,
    },
}

/// Metric names accepted on the command line.
#[derive(Clone, Copy, ValueEnum)]
enum MetricArg {
    Budget,
    RequestsPerMinute,
    RequestsPerHour,
    RequestsPerDay,
}

impl From<MetricArg> for UsageMetric {
    fn from(arg: MetricArg) -> Self {
        match arg {
            MetricArg::Budget => Self::Budget,
            MetricArg::RequestsPerMinute => Self::RequestsPerMinute,
            MetricArg::RequestsPerHour => Self::RequestsPerHour,
            MetricArg::RequestsPerDay => Self::RequestsPerDay,
        }
    }
}

/// JSON view of a parsed constraint.
#[derive(Serialize)]
struct ParsedConstraint<'a> {
    kind: &'a str,
    field: &'a str,
    value: &'a str,
    numeric: Option<f64>,
    serialized: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config =
        TrustgateConfig::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    let _logging_guard = logging::init(&config.logging)?;

    match cli.command {
        Command::Parse { raw } => handle_parse(&raw),
        Command::Classify {
            metric,
            current,
            limit,
        } => handle_classify(&config, metric.into(), current, limit),
        Command::Validate { store, proposal } => {
            handle_validate(&config, store.as_deref(), &proposal).await
        }
        Command::Usage { store, principal } => {
            handle_usage(&config, store.as_deref(), principal).await
        }
        Command::Chain { store, principal } => {
            handle_chain(&config, store.as_deref(), principal).await
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}

fn handle_parse(raw: &str) -> anyhow::Result<ExitCode> {
    let constraint = trustgate::parse_constraint(raw)?;
    print_json(&ParsedConstraint {
        kind: constraint.kind().as_str(),
        field: constraint.field(),
        value: constraint.value().raw(),
        numeric: constraint.value().as_number(),
        serialized: trustgate::serialize_constraint(&constraint),
    })?;
    Ok(ExitCode::SUCCESS)
}

fn handle_classify(
    config: &TrustgateConfig,
    metric: UsageMetric,
    current: f64,
    limit: Option<f64>,
) -> anyhow::Result<ExitCode> {
    let evaluator = GovernanceEvaluator::new(config.thresholds);
    print_json(&evaluator.classify_usage(metric, current, limit))?;
    Ok(ExitCode::SUCCESS)
}

/// Build a service over the store document at `store`, or the configured
/// default.
async fn open_service(
    config: &TrustgateConfig,
    store: Option<&Path>,
) -> anyhow::Result<GovernanceService<InMemoryTrustStore>> {
    let path = store
        .or(config.store.path.as_deref())
        .context("no trust store given; pass --store or set TRUSTGATE_STORE_PATH")?;
    let store = InMemoryTrustStore::load(path)
        .await
        .with_context(|| format!("failed to load trust store {}", path.display()))?;
    debug!(path = %path.display(), principals = store.len().await, "trust store ready");
    Ok(GovernanceService::new(
        Arc::new(store),
        GovernanceEvaluator::new(config.thresholds),
    ))
}

async fn handle_validate(
    config: &TrustgateConfig,
    store: Option<&Path>,
    proposal: &Path,
) -> anyhow::Result<ExitCode> {
    let service = open_service(config, store).await?;
    let contents = tokio::fs::read_to_string(proposal)
        .await
        .with_context(|| format!("failed to read proposal {}", proposal.display()))?;
    let proposal: DelegationProposal = serde_json::from_str(&contents)
        .with_context(|| format!("invalid proposal {}", proposal.display()))?;

    let report = service.validate_for_source(&proposal).await?;
    print_json(&report)?;
    Ok(if report.is_valid() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn handle_usage(
    config: &TrustgateConfig,
    store: Option<&Path>,
    principal: String,
) -> anyhow::Result<ExitCode> {
    let service = open_service(config, store).await?;
    let report = service.evaluate_usage(&PrincipalId::new(principal)).await?;
    print_json(&report)?;
    Ok(ExitCode::SUCCESS)
}

async fn handle_chain(
    config: &TrustgateConfig,
    store: Option<&Path>,
    principal: String,
) -> anyhow::Result<ExitCode> {
    let service = open_service(config, store).await?;
    let chain = service.chain_for(&PrincipalId::new(principal)).await?;
    print_json(&chain)?;
    Ok(ExitCode::SUCCESS)
}
