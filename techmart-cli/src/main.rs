//! TechMart CLI: clean the store and print ranked reports.
//!
//! Every subcommand opens the configured store, does its work, and closes it.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// TechMart: data-quality cleaning and ranked reporting
#[derive(Parser, Debug)]
#[command(name = "techmart", version, about, long_about = None)]
struct Cli {
    /// SQLite store to analyse (overrides `database.path` from config)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Workspace directory
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table, global = true)]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Count missing values and list non-numeric leftovers
    Detect {
        /// Table to scan (defaults to every configured target)
        #[arg(short, long)]
        table: Option<String>,
        /// Columns to scan, comma-separated
        #[arg(long, value_delimiter = ',', requires = "table")]
        columns: Vec<String>,
    },
    /// Apply the configured rewrite rules
    Clean {
        /// Only clean this table
        #[arg(short, long)]
        table: Option<String>,
        /// Only clean this column
        #[arg(long)]
        column: Option<String>,
    },
    /// Ranked grouped aggregates
    Rank {
        #[command(subcommand)]
        report: RankReport,
    },
    /// Customer spending with share of total revenue
    Share,
    /// Build the configured indexes
    Index {
        /// Rebuild indexes that already exist
        #[arg(long)]
        rebuild: bool,
    },
    /// Store revenue by category, employee and loyalty tier
    Revenue {
        /// Categories to include (repeatable; defaults to config)
        #[arg(long = "category")]
        categories: Vec<String>,
        /// Include every category
        #[arg(long, conflicts_with = "categories")]
        all: bool,
    },
    /// Run the full cleaning and reporting pipeline
    Run,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum RankReport {
    /// Average sales performance per store location
    Location,
    /// Best-selling products within each category
    Products {
        /// Products kept per category (defaults to config)
        #[arg(short = 'n', long)]
        top_n: Option<u32>,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create a default configuration file
    Init,
    /// Show current configuration
    Show,
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "techmart", "techmart")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "techmart.log");
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

    let ctx = commands::Context {
        workspace,
        config_file: cli.config,
        database: cli.database,
        format: cli.format,
    };
    commands::handle_command(cli.command, &ctx)
}
