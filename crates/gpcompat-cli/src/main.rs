use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gpcompat_check::{print_report, CheckerSettings, ConcurrentChecker, ReportOptions, RuleStore, StatsAggregator};
use gpcompat_core::Config;
use gpcompat_log::{note_stderr_write, open_log, spawn_query_stream, StreamConfig};
use gpcompat_sql::QueryNormalizer;
use gpcompat_target::PgConnection;

/// gpcompat - check captured Greenplum queries against a PostgreSQL-compatible target
#[derive(Parser)]
#[command(name = "gpcompat")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: gpcompat.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check logged queries against the target engine
    Check(CheckArgs),

    /// Print the normalized form of a query (argument or stdin)
    Normalize {
        query: Option<String>,
    },
}

/// Overrides for the config file
#[derive(Args)]
struct CheckArgs {
    /// Session query log (newline-delimited JSON, `.gz` allowed)
    #[arg(long)]
    query_log: Option<PathBuf>,

    /// Sort the query log in memory before checking
    #[arg(long)]
    need_sort: bool,

    /// Check queries from failed transactions
    #[arg(long)]
    include_failed: Option<bool>,

    /// Limit the number of requests, 0 means unlimited
    #[arg(long)]
    requests_limit: Option<usize>,

    /// Print progress every N queries
    #[arg(long)]
    progress_every: Option<usize>,

    /// Comma-separated target connection strings
    #[arg(long)]
    connection: Option<String>,

    /// Connections per target
    #[arg(long)]
    pool_size: Option<usize>,

    /// Pool bring-up timeout in seconds
    #[arg(long)]
    connect_timeout: Option<u64>,

    /// Connect over TLS
    #[arg(long)]
    tls: bool,

    /// How many queries may be checked in parallel
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Known-issue rules, empty to skip
    #[arg(long)]
    rules_file: Option<PathBuf>,

    /// Where rules with updated counts are written, empty to skip
    #[arg(long)]
    write_updated_rules: Option<PathBuf>,

    /// Sort written rules by count
    #[arg(long)]
    sort_by_count: Option<bool>,

    /// Full stats file with query examples
    #[arg(long)]
    stats_file: Option<PathBuf>,

    /// Checkpoint interval in queries, 0 disables checkpoints
    #[arg(long)]
    write_stats_every: Option<u64>,

    /// List known issues instead of unknown ones
    #[arg(long)]
    print_known_issues: Option<bool>,

    /// Print example queries for known issues
    #[arg(long)]
    print_query_for_known_issues: Option<bool>,

    /// Log unknown issues as they are found
    #[arg(long)]
    print_progress: Option<bool>,

    /// Print the end-of-run summary
    #[arg(long)]
    print_stats: Option<bool>,

    /// Number of issues in the summary
    #[arg(long)]
    top_issues: Option<usize>,
}

impl CheckArgs {
    fn apply(self, config: &mut Config) {
        if let Some(path) = self.query_log {
            config.input.query_log = Some(path);
        }
        config.input.need_sort |= self.need_sort;
        if let Some(value) = self.include_failed {
            config.input.include_failed = value;
        }
        if let Some(value) = self.requests_limit {
            config.input.requests_limit = value;
        }
        if let Some(value) = self.progress_every {
            config.input.progress_every = value;
        }

        if let Some(value) = self.connection {
            config.target.connection = value;
        }
        if self.pool_size.is_some() {
            config.target.pool_size = self.pool_size;
        }
        if let Some(value) = self.connect_timeout {
            config.target.connect_timeout_secs = value;
        }
        config.target.tls |= self.tls;

        if let Some(value) = self.concurrency {
            config.check.concurrency = value;
        }

        if let Some(path) = self.rules_file {
            config.rules.rules_file = Some(path);
        }
        if let Some(path) = self.write_updated_rules {
            config.rules.write_updated_rules = Some(path);
        }
        if let Some(value) = self.sort_by_count {
            config.rules.sort_by_count = value;
        }

        if let Some(path) = self.stats_file {
            config.output.stats_file = Some(path);
        }
        if let Some(value) = self.write_stats_every {
            config.output.write_stats_every = value;
        }
        if let Some(value) = self.print_known_issues {
            config.output.print_known_issues = value;
        }
        if let Some(value) = self.print_query_for_known_issues {
            config.output.print_query_for_known_issues = value;
        }
        if let Some(value) = self.print_progress {
            config.output.print_progress = value;
        }
        if let Some(value) = self.print_stats {
            config.output.print_stats = value;
        }
        if let Some(value) = self.top_issues {
            config.output.top_issues = value;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(|| {
            note_stderr_write();
            std::io::stderr()
        }))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let config = load_config(cli.config.as_deref(), cli.verbose)?;

    match cli.command {
        Commands::Check(args) => check_command(config, args).await,
        Commands::Normalize { query } => normalize_command(query),
    }
}

fn load_config(path: Option<&Path>, verbose: bool) -> Result<Config> {
    let default_path = Path::new("gpcompat.toml");

    if let Some(path) = path {
        Config::from_file(path).with_context(|| format!("Failed to load config {}", path.display()))
    } else if default_path.exists() {
        Config::from_file(default_path).context("Failed to load gpcompat.toml")
    } else {
        if verbose {
            eprintln!("{}", "No config file found, using defaults".yellow());
        }
        Ok(Config::default())
    }
}

/// Check command - run every logged query against the target
async fn check_command(mut config: Config, args: CheckArgs) -> Result<()> {
    args.apply(&mut config);
    config.validate()?;

    let rules = match config.rules_file() {
        None => {
            info!("Skip read rules file.");
            RuleStore::new()
        }
        Some(path) => {
            info!("Reading rules file {:?}...", path);
            RuleStore::load_from_file(path).context("Failed to read rules file")?
        }
    };
    info!("Loaded {} rules", rules.len());

    info!("Connecting to target...");
    let pool = PgConnection::open_pool(
        &config.target.connection_strings(),
        config.pool_size(),
        Duration::from_secs(config.target.connect_timeout_secs),
        config.target.tls,
    )
    .await
    .context("Failed to open target connection pool")?;
    info!("Opened {} connections", pool.size());

    let log_path = config.query_log().context("query log path is required")?;
    let reader = open_log(log_path)?;
    let stream = StreamConfig::from_input(&config.input, config.check.concurrency * 2);
    let (queries, producer) = spawn_query_stream(reader, stream);

    let stats = Arc::new(StatsAggregator::new());
    let checker = ConcurrentChecker::new(
        Arc::new(pool),
        Arc::new(rules),
        stats.clone(),
        CheckerSettings::from_config(&config),
    )?;

    info!("Start check queries");
    let summary = checker.run(queries).await?;
    let read = producer.await.context("Query log reader failed")?;
    info!(
        "Checked {} queries ({} records read, {} malformed, {} duplicates)",
        summary.processed, read.records_read, read.malformed, read.duplicates
    );
    if read.truncated {
        eprintln!("{}", "Query log ended with a truncated record".yellow());
    }

    if config.output.print_stats {
        print_report(&stats, &ReportOptions::from(&config.output));
    }

    Ok(())
}

/// Normalize command - show what the target engine will be sent
fn normalize_command(query: Option<String>) -> Result<()> {
    let query = match query {
        Some(query) => query,
        None => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("Failed to read query from stdin")?;
            input
        }
    };

    println!("{}", QueryNormalizer::normalize(&query));
    Ok(())
}
