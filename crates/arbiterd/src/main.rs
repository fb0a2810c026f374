//! Arbiter daemon
//!
//! The `arbiterd` command drives the warehouse arbitration core.
//!
//! ## Commands
//!
//! - `replay`: feed a JSON-lines script of submissions, cycles, locks and
//!   planner responses through the orchestrator
//! - `show-config`: print the effective configuration as TOML
//! - `verify-ledger`: check the hash chain of a persistent audit ledger

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, Level};

use arbiter_core::{
    init_tracing, ArbiterConfig, AuditLedger, MemoryAuditLedger, Orchestrator, ResourceModel,
    TracingOptions,
};
use arbiter_ledger::SurrealAuditLedger;

mod script;

#[derive(Parser)]
#[command(name = "arbiterd")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Warehouse agent arbitration daemon", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// TOML configuration file
    #[arg(short, long, global = true, env = "ARBITER_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(flatten)]
    ledger: LedgerArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Settings that win over the configuration file.
#[derive(Args, Debug, Default)]
struct Overrides {
    #[arg(long, global = true, env = "ARBITER_ESCALATION_TIMEOUT_SECS")]
    escalation_timeout_secs: Option<u64>,

    #[arg(long, global = true, env = "ARBITER_WORKER_PARALLELISM")]
    worker_parallelism: Option<usize>,

    #[arg(long, global = true, env = "ARBITER_MAX_COMMIT_RETRIES")]
    max_commit_retries: Option<u32>,

    #[arg(long, global = true, env = "ARBITER_MIN_CONFIDENCE")]
    min_confidence_for_auto: Option<f64>,
}

#[derive(Args, Debug)]
struct LedgerArgs {
    /// Audit ledger endpoint: `memory`, `mem://`, `surrealkv://<dir>` or `ws://<host>`
    #[arg(long = "ledger", global = true, env = "ARBITER_LEDGER", default_value = "memory")]
    endpoint: String,

    #[arg(long, global = true, env = "ARBITER_LEDGER_NAMESPACE", default_value = "arbiter")]
    ledger_namespace: String,

    #[arg(long, global = true, env = "ARBITER_LEDGER_DATABASE", default_value = "audit")]
    ledger_database: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON-lines command script through the orchestrator
    Replay {
        /// Script path
        input: PathBuf,

        /// Also print every orchestrator event
        #[arg(long)]
        events: bool,
    },

    /// Print the effective configuration
    ShowConfig,

    /// Verify the audit ledger hash chain
    VerifyLedger,
}

impl Overrides {
    fn apply(&self, config: &mut ArbiterConfig) {
        if let Some(v) = self.escalation_timeout_secs {
            config.escalation_timeout_secs = v;
        }
        if let Some(v) = self.worker_parallelism {
            config.worker_parallelism = v;
        }
        if let Some(v) = self.max_commit_retries {
            config.max_commit_retries = v;
        }
        if let Some(v) = self.min_confidence_for_auto {
            config.min_confidence_for_auto = Some(v);
        }
    }
}

impl LedgerArgs {
    async fn open(&self) -> Result<Arc<dyn AuditLedger>> {
        if self.endpoint == "memory" {
            return Ok(Arc::new(MemoryAuditLedger::new()));
        }
        let ledger = SurrealAuditLedger::connect(
            &self.endpoint,
            &self.ledger_namespace,
            &self.ledger_database,
        )
        .await
        .with_context(|| format!("failed to open audit ledger at {}", self.endpoint))?;
        Ok(Arc::new(ledger))
    }
}

async fn load_config(cli: &Cli) -> Result<ArbiterConfig> {
    let mut config = match &cli.config {
        Some(path) => ArbiterConfig::load(path)
            .await
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ArbiterConfig::default(),
    };
    cli.overrides.apply(&mut config);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn tracing_options(cli: &Cli, config: &ArbiterConfig) -> TracingOptions {
    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    TracingOptions::new(cli.json, level).with_filter(config.log_filter.clone())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli).await?;

    init_tracing(&tracing_options(&cli, &config));

    match &cli.command {
        Commands::Replay { input, events } => replay(&cli, config, input, *events).await,
        Commands::ShowConfig => {
            let rendered = toml::to_string_pretty(&config).context("failed to render config")?;
            print!("{rendered}");
            Ok(())
        }
        Commands::VerifyLedger => {
            let ledger = cli.ledger.open().await?;
            let verified = ledger
                .verify_chain()
                .await
                .context("audit ledger chain is broken")?;
            println!("{verified} entries verified");
            Ok(())
        }
    }
}

async fn replay(cli: &Cli, config: ArbiterConfig, input: &Path, events: bool) -> Result<()> {
    let content = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("failed to read script {}", input.display()))?;
    let commands = script::parse(&content)?;

    let ledger = cli.ledger.open().await?;
    let orchestrator = Orchestrator::new(config, Arc::new(ResourceModel::new()), ledger)
        .context("failed to start orchestrator")?;

    let printer = events.then(|| {
        let mut rx = orchestrator.subscribe();
        tokio::spawn(async move {
            use tokio::sync::broadcast::error::RecvError;
            loop {
                match rx.recv().await {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(line) => println!("{{\"event\":{line}}}"),
                        Err(e) => tracing::warn!(error = %e, "unprintable event"),
                    },
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "event printer lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    });

    info!(commands = commands.len(), script = %input.display(), "replay.start");
    for (index, command) in commands.into_iter().enumerate() {
        let output = script::apply(&orchestrator, command)
            .await
            .with_context(|| format!("command {} failed", index + 1))?;
        println!("{}", serde_json::json!({ "command": index + 1, "result": output }));
    }

    let drained = orchestrator.shutdown().await;
    println!("{}", serde_json::json!({ "drained": drained }));
    drop(orchestrator);

    if let Some(printer) = printer {
        printer.await.context("event printer panicked")?;
    }
    Ok(())
}
