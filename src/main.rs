mod analysis;
mod database;
mod error;
mod ingest;
mod utils;

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::analysis::{charts, export};
use crate::database::catalog::{self, QuerySpec, CATALOG};
use crate::database::repo::{value_to_text, ArtifactStore, QueryResult};
use crate::ingest::fetcher::{is_known_classification, HttpPageSource, CLASSIFICATIONS};
use crate::ingest::pipeline::{self, Progress};
use crate::utils::config::{save_api_key, HarvestConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Harvest museum artifact records into SQLite and analyse them", long_about = None)]
struct Cli {
    /// SQLite database file
    #[arg(short, long, global = true)]
    db_path: Option<PathBuf>,

    /// Settings file with HARVARD_API_KEY and friends
    #[arg(long, global = true, default_value = ".env")]
    env_file: PathBuf,

    #[arg(long, global = true)]
    api_key: Option<String>,

    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch artifacts of one classification and store them
    Collect {
        #[arg(short, long)]
        classification: String,
        #[arg(short, long, default_value_t = 2500)]
        limit: usize,
        #[command(flatten)]
        tuning: FetchTuning,
    },
    /// Fetch and normalize a few artifacts without storing them
    Preview {
        #[arg(short, long)]
        classification: String,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
        #[command(flatten)]
        output: OutputArgs,
        #[command(flatten)]
        tuning: FetchTuning,
    },
    /// List the canned queries
    Catalog,
    /// Run a canned query by number or label
    Query {
        key: String,
        /// Parameter override, e.g. -p culture=Roman
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Run ad-hoc read-only SQL
    Sql {
        sql: String,
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Draw one of the canned charts
    Chart {
        /// classification, culture, century, hue or department
        key: String,
        #[arg(short, long, default_value_t = 40)]
        width: usize,
    },
    /// Row counts, recent artifacts and collection progress
    Stats {
        /// Collection size to measure progress against
        #[arg(long)]
        goal: Option<u64>,
    },
    /// List known classifications
    Classifications,
    /// Save the API key to the settings file
    Configure {
        key: String,
    },
    /// Drop and recreate all tables
    Reset {
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args, Debug)]
struct FetchTuning {
    #[arg(long)]
    page_size: Option<u32>,
    /// Minimum delay between requests
    #[arg(long)]
    delay_ms: Option<u64>,
    #[arg(long)]
    retries: Option<u32>,
    /// First retry delay; doubles on each further retry
    #[arg(long)]
    backoff_ms: Option<u64>,
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Write the rows to a CSV file
    #[arg(long)]
    csv: Option<PathBuf>,
    /// Print rows as JSON instead of a table
    #[arg(long)]
    json: bool,
}

fn parse_param(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected name=value, got '{s}'"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut config = HarvestConfig::load(&cli.env_file).context("Failed to load settings")?;
    if let Some(path) = &cli.db_path {
        config.db_path = path.clone();
    }
    if let Some(key) = &cli.api_key {
        config.api_key = Some(key.clone());
    }
    if let Some(url) = &cli.base_url {
        config.base_url = url.trim_end_matches('/').to_string();
    }

    match cli.command {
        Command::Classifications => {
            for (name, id) in CLASSIFICATIONS {
                println!("{name:<12} {id}");
            }
            Ok(())
        }
        Command::Catalog => {
            for q in CATALOG {
                let params: Vec<&str> = q.params.iter().map(|p| p.name).collect();
                if params.is_empty() {
                    println!("{:>2}. {}", q.id, q.label);
                } else {
                    println!("{:>2}. {} [{}]", q.id, q.label, params.join(", "));
                }
            }
            Ok(())
        }
        Command::Configure { key } => {
            save_api_key(&cli.env_file, &key).context("Failed to save API key")?;
            info!(path = %cli.env_file.display(), "API key saved");
            Ok(())
        }
        Command::Preview { classification, limit, output, tuning } => {
            let config = tuning.apply(config);
            let source = HttpPageSource::new(&config)?;
            let result = pipeline::preview(&source, &config, &classification, limit);
            for e in &result.errors {
                warn!("{e}");
            }
            if result.skipped > 0 {
                warn!(skipped = result.skipped, "Some records could not be normalized");
            }
            emit(&pipeline::summary_table(&result.records), &output)
        }
        Command::Collect { classification, limit, tuning } => {
            let config = tuning.apply(config);
            collect(&config, &classification, limit)
        }
        other => {
            let mut store = ArtifactStore::open(&config.db_path)
                .with_context(|| format!("Failed to open database {}", config.db_path.display()))?;
            run_store_command(&mut store, &config, other)
        }
    }
}

impl FetchTuning {
    fn apply(&self, mut config: HarvestConfig) -> HarvestConfig {
        if let Some(size) = self.page_size {
            config = config.with_page_size(size);
        }
        if let Some(ms) = self.delay_ms {
            config.request_delay = Duration::from_millis(ms);
        }
        if let Some(n) = self.retries {
            config.max_retries = n;
        }
        if let Some(ms) = self.backoff_ms {
            config.initial_backoff = Duration::from_millis(ms);
        }
        config
    }
}

fn collect(config: &HarvestConfig, classification: &str, limit: usize) -> Result<()> {
    if !is_known_classification(classification) {
        warn!(classification, "Not a known classification; the API may return nothing");
    }
    let source = HttpPageSource::new(config)?;
    let mut store = ArtifactStore::open(&config.db_path)
        .with_context(|| format!("Failed to open database {}", config.db_path.display()))?;

    let bar = ProgressBar::new(limit as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );
    let report = pipeline::run_ingestion(&mut store, &source, config, classification, limit, |p: Progress| {
        if let Some(available) = p.available {
            bar.set_length(available.min(p.target as u64));
        }
        bar.set_position(p.fetched as u64);
        bar.set_message(format!("{} stored", p.stored));
    });
    bar.finish_and_clear();

    println!(
        "Stored {} of {} requested {} artifacts ({} skipped)",
        report.records_stored, report.records_requested, report.classification, report.records_skipped
    );
    if !report.is_complete() {
        println!("Collection ended early:");
        for e in &report.errors {
            println!("  {e}");
        }
    }
    if report.aborted {
        bail!("collection aborted after {} records", report.records_stored);
    }
    Ok(())
}

fn run_store_command(store: &mut ArtifactStore, config: &HarvestConfig, command: Command) -> Result<()> {
    match command {
        Command::Query { key, params, output } => {
            let query = catalog::find(&key).with_context(|| format!("No catalog query '{key}'"))?;
            info!(id = query.id, "{}", query.label);
            let result = catalog::run_query(store, QuerySpec::Catalog(&key), &params)?;
            emit(&result, &output)
        }
        Command::Sql { sql, params, output } => {
            let result = catalog::run_query(store, QuerySpec::Sql(&sql), &params)?;
            emit(&result, &output)
        }
        Command::Chart { key, width } => {
            let chart = charts::find_chart(&key).with_context(|| {
                let keys: Vec<&str> = charts::CHARTS.iter().map(|c| c.key).collect();
                format!("No chart '{key}'; choose one of {}", keys.join(", "))
            })?;
            let text = charts::draw(store, chart, width)?;
            if text.is_empty() {
                println!("No data yet");
            } else {
                print!("{text}");
            }
            Ok(())
        }
        Command::Stats { goal } => {
            let counts = store.table_counts()?;
            println!("Artifacts:      {}", counts.metadata);
            println!("Media records:  {}", counts.media);
            println!("Color records:  {}", counts.colors);

            let recent = store.recent_artifacts(10)?;
            if recent.is_empty() {
                println!("\nNo data yet - run `collect` first");
                return Ok(());
            }
            println!("\nRecent entries:");
            print_table(&recent);

            let goal = goal.unwrap_or(config.goal).max(1);
            let done = counts.metadata.max(0) as u64;
            println!(
                "\nProgress: {done} / {goal} artifacts ({:.1}%)",
                goal_progress(done, goal)
            );
            Ok(())
        }
        Command::Reset { yes } => {
            if !yes {
                bail!("refusing to reset {} without --yes", config.db_path.display());
            }
            store.reset()?;
            Ok(())
        }
        Command::Collect { .. }
        | Command::Preview { .. }
        | Command::Catalog
        | Command::Classifications
        | Command::Configure { .. } => unreachable!("handled before the store is opened"),
    }
}

/// Percentage of `goal` reached, capped at 100.
fn goal_progress(done: u64, goal: u64) -> f64 {
    (done as f64 / goal.max(1) as f64 * 100.0).min(100.0)
}

fn emit(result: &QueryResult, output: &OutputArgs) -> Result<()> {
    if let Some(path) = &output.csv {
        let bytes = export::export_csv(result)?;
        fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
        info!(rows = result.len(), path = %path.display(), "Wrote CSV");
    }
    if output.json {
        println!("{}", serde_json::to_string_pretty(&result.records())?);
    } else if result.is_empty() {
        println!("No results found");
    } else {
        print_table(result);
        println!("({} rows)", result.len());
    }
    Ok(())
}

const MAX_CELL: usize = 40;

fn print_table(result: &QueryResult) {
    let cells: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| row.iter().map(|v| clip(&value_to_text(v))).collect())
        .collect();

    let widths: Vec<usize> = result
        .columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            cells
                .iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |values: Vec<&str>| {
        values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{v:<width$}", width = *w))
            .collect::<Vec<_>>()
            .join(" | ")
    };

    println!("{}", line(result.columns.iter().map(String::as_str).collect()));
    println!(
        "{}",
        widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-")
    );
    for row in &cells {
        println!("{}", line(row.iter().map(String::as_str).collect()));
    }
}

fn clip(s: &str) -> String {
    let flat = s.replace(['\n', '\r'], " ");
    if flat.chars().count() > MAX_CELL {
        let cut: String = flat.chars().take(MAX_CELL - 3).collect();
        format!("{cut}...")
    } else {
        flat
    }
}
