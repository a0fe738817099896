//! ModelMirror CLI: audit a trained classifier for group fairness and target
//! leakage, and export the findings as a PDF or text report.

mod commands;
mod render;
mod select;

use clap::Parser;
use modelmirror_core::AuditError;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// ModelMirror: fairness and leakage audits for trained models
#[derive(Parser, Debug)]
#[command(name = "modelmirror", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (holds `.modelmirror/config.toml`)
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Predict with a model, evaluate fairness, check leakage and export a report
    Audit(AuditArgs),
    /// Evaluate fairness from truth, prediction and group columns of a dataset
    Fairness(FairnessArgs),
    /// Rank numeric features by absolute correlation with the target
    Leakage(LeakageArgs),
    /// Preview a dataset and optionally check it against a model's features
    Inspect(InspectArgs),
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Debug)]
struct AuditArgs {
    /// Model file (.json, .pkl, .joblib, .py or .onnx)
    #[arg(short, long)]
    model: PathBuf,

    /// Dataset file (.csv, .tsv, .xlsx, .ods or .parquet)
    #[arg(short, long)]
    data: PathBuf,

    /// Ground-truth column (prompted for when omitted)
    #[arg(short, long)]
    target: Option<String>,

    /// Protected attribute column (prompted for when omitted)
    #[arg(short, long)]
    protected: Option<String>,

    /// Prediction label that counts as a positive selection
    #[arg(long)]
    positive_label: Option<String>,

    /// Report destination (.pdf or .txt)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Skip permutation feature attribution
    #[arg(long)]
    no_explain: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(clap::Args, Debug)]
struct FairnessArgs {
    /// Dataset file holding truth, prediction and group columns
    #[arg(short, long)]
    data: PathBuf,

    /// Ground-truth column
    #[arg(long)]
    truth: Option<String>,

    /// Prediction column
    #[arg(long)]
    pred: Option<String>,

    /// Protected attribute column
    #[arg(long)]
    group: Option<String>,

    /// Prediction label that counts as a positive selection
    #[arg(long)]
    positive_label: Option<String>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(clap::Args, Debug)]
struct LeakageArgs {
    /// Dataset file
    #[arg(short, long)]
    data: PathBuf,

    /// Numeric target column
    #[arg(short, long)]
    target: Option<String>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(clap::Args, Debug)]
struct InspectArgs {
    /// Dataset file
    #[arg(short, long)]
    data: PathBuf,

    /// Model whose declared features are checked against the dataset
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Rows to preview
    #[arg(short, long, default_value_t = 5)]
    rows: usize,
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create default configuration file
    Init,
    /// Show current configuration
    Show,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "modelmirror", "modelmirror")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "modelmirror.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let config = modelmirror_core::load_config(Some(&workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let ctx = commands::Context {
        workspace,
        config,
        quiet: cli.quiet,
    };

    match commands::handle_command(cli.command, &ctx).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => match err.downcast_ref::<AuditError>() {
            // unreadable dataset or model: message only
            Some(audit) if audit.is_ingestion() => {
                eprintln!("\n  Could not load input: {audit}\n");
                Ok(ExitCode::FAILURE)
            }
            _ => Err(err),
        },
    }
}
