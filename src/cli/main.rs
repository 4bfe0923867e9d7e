use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use teacher_performance_analytics::config::Config;
use teacher_performance_analytics::orchestration::{
    AnalysisRequest, AnalysisService, BatchOutcome, Caller, StaticPeerDataSource,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tpa-cli")]
#[command(about = "Teacher performance analytics CLI", long_about = None, version)]
struct Cli {
    /// Configuration file layered over the built-in defaults
    #[arg(short, long, global = true, env = "TPA_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct CallerArgs {
    /// Role of the caller
    #[arg(short, long, default_value = "admin")]
    role: String,

    /// User id of the caller
    #[arg(short, long, default_value = "cli")]
    user: String,

    /// Teachers the caller supervises (comma separated)
    #[arg(long, value_delimiter = ',')]
    assigned: Vec<String>,
}

impl CallerArgs {
    fn caller(&self) -> Caller {
        Caller::new(&self.user, &self.role).with_assigned_teachers(self.assigned.iter().cloned())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one teacher's evaluations
    Analyze {
        /// JSON file holding an analysis request
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// JSON file of peer groups, overriding the configured source
        #[arg(short, long, value_name = "FILE")]
        peers: Option<PathBuf>,

        #[command(flatten)]
        caller: CallerArgs,

        /// Print single-line JSON
        #[arg(long)]
        compact: bool,
    },

    /// Analyze a JSON array of requests
    Batch {
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        #[arg(short, long, value_name = "FILE")]
        peers: Option<PathBuf>,

        #[command(flatten)]
        caller: CallerArgs,

        #[arg(long)]
        compact: bool,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load().context("failed to load configuration")?,
    };

    init_tracing(&config);

    match cli.command {
        Commands::Analyze {
            input,
            peers,
            caller,
            compact,
        } => {
            let request: AnalysisRequest = read_json(&input)?;
            let service = build_service(&config, peers.as_deref())?;

            let report = service.analyze(&caller.caller(), request).await?;
            info!(headline = %report.headline(), "Report ready");
            print_json(&report, compact)?;
        }
        Commands::Batch {
            input,
            peers,
            caller,
            compact,
        } => {
            let requests: Vec<AnalysisRequest> = read_json(&input)?;
            let service = build_service(&config, peers.as_deref())?;

            let results = service.analyze_batch(&caller.caller(), requests).await;
            let failed = results
                .iter()
                .filter(|r| matches!(r.outcome, BatchOutcome::Failed { .. }))
                .count();
            info!(total = results.len(), failed, "Batch finished");
            print_json(&results, compact)?;
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout carries only the report
fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.observability.log_level.clone().into());
    let json = config.observability.json_logs;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

fn build_service(config: &Config, peers: Option<&Path>) -> Result<AnalysisService> {
    let service = AnalysisService::from_config(config).context("failed to build analysis service")?;
    match peers {
        Some(path) => {
            let source = StaticPeerDataSource::from_file(path)
                .with_context(|| format!("failed to load peer groups from {}", path.display()))?;
            Ok(service.with_peer_source(Arc::new(source)))
        }
        None => Ok(service),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

fn print_json<T: Serialize>(value: &T, compact: bool) -> Result<()> {
    let rendered = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{}", rendered);
    Ok(())
}
