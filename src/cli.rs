//! CLI commands for cleanbet-api.
//!
//! Supports API server mode plus one-shot analysis, predictions, imports and
//! result reconciliation against the configured database.

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::form_sync::{sync_forms, JsonFormProvider};
use crate::pipeline::{run_analysis, AnalysisContext, AnalysisOutcome, AnalysisRequest};
use crate::predictions::{get_predictions, PredictionRequest, PredictionResponse, Region};
use crate::results::{reconcile_result, ResultRequest};
use crate::scoring::StrategyKind;
use crate::storage::{MeetingStore, Runner, SqliteStore};

#[derive(Parser)]
#[command(name = "cleanbet-api")]
#[command(version, about = "Clean-Bet: horse racing form analysis API and CLI", long_about = None)]
pub struct Cli {
    /// Database path override
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the API server
    Serve {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Score, persist and rank the runners of a date
    Analyze {
        /// Event date (YYYY-MM-DD)
        #[arg(short, long)]
        date: NaiveDate,

        /// Scoring strategy (deterministic, heuristic)
        #[arg(short, long)]
        strategy: Option<StrategyKind>,

        /// Seed for the heuristic random source
        #[arg(long)]
        seed: Option<u64>,

        /// Also show the top N (1-3) per time slot
        #[arg(long)]
        top_n: Option<usize>,

        /// Output format (json, table)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Show the day's top stored selections
    Predictions {
        /// Event date (YYYY-MM-DD)
        #[arg(short, long)]
        date: NaiveDate,

        /// Region filter (UK, Ireland, Both, All)
        #[arg(short, long, default_value = "Both")]
        region: Region,

        /// Output format (json, table)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Load a race card (JSON array of runners)
    ImportCard {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Country of every event on the card, for region filters
        #[arg(short, long)]
        country: Option<String>,
    },

    /// Sync scraped form (JSON keyed by selection link) for a date's runners
    ImportForms {
        /// Event date (YYYY-MM-DD)
        #[arg(short, long)]
        date: NaiveDate,

        #[arg(short, long, value_name = "FILE")]
        file: PathBuf,
    },

    /// Record a race result against a stored selection
    Reconcile {
        /// Event date (YYYY-MM-DD)
        #[arg(short, long)]
        date: NaiveDate,

        #[arg(long)]
        selection_id: i64,

        /// Finishing position, e.g. 1 or 1/9
        #[arg(long)]
        position: String,

        /// Starting price, e.g. 5/2
        #[arg(long)]
        price: String,
    },

    /// List events and race times for a date
    Events {
        /// Event date (YYYY-MM-DD)
        #[arg(short, long)]
        date: NaiveDate,
    },

    /// Set a business tunable (delta, total_runs, bet_value, average_postion)
    SetConfig { key: String, value: String },
}

/// Open the configured database
pub fn open_store(config: &AppConfig) -> anyhow::Result<Arc<SqliteStore>> {
    let store = SqliteStore::new(Path::new(&config.database.path))
        .with_context(|| format!("Failed to open store at {}", config.database.path))?;
    Ok(Arc::new(store))
}

/// Open the database and load the tunables
pub fn open_context(config: &AppConfig) -> anyhow::Result<Arc<AnalysisContext>> {
    let store = open_store(config)?;
    let context = AnalysisContext::new(store, config.analysis.clone())
        .context("Failed to load business tunables")?;
    Ok(Arc::new(context))
}

/// Run analysis for a date and print the outcome.
pub fn run_analyze(
    config: &AppConfig,
    date: NaiveDate,
    strategy: Option<StrategyKind>,
    seed: Option<u64>,
    top_n: Option<usize>,
    format: &str,
) -> anyhow::Result<()> {
    let context = open_context(config)?;
    let request = AnalysisRequest {
        event_date: date,
        strategy,
        seed,
        top_n,
    };
    let outcome = run_analysis(&context, &request)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&outcome)?),
        _ => print_analysis_table(&outcome),
    }
    Ok(())
}

fn print_analysis_table(outcome: &AnalysisOutcome) {
    println!("Date: {}  Strategy: {:?}", outcome.event_date, outcome.strategy);
    println!();

    println!("=== Selections ===");
    println!(
        "  {:>6}  {:<24} {:>7} {:>7} {:>6} {:>6}",
        "Time", "Selection", "Score", "Match", "Pref", "Dist"
    );
    for s in &outcome.selections {
        let match_score = s
            .match_score()
            .map(|m| format!("{:.2}", m))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:>6}  {:<24} {:>7.2} {:>7} {:>6} {:>6}",
            s.analysis.runner.event_time,
            s.analysis.runner.selection_name,
            s.total_score(),
            match_score,
            s.analysis.preferred_distance,
            s.analysis.current_distance
        );
    }
    println!();

    println!("=== Best Per Slot ===");
    for (slot, best) in &outcome.best_per_slot {
        println!("  {:>6}: {}", slot, best.analysis.runner.selection_name);
    }
    println!();

    if let Some(top) = &outcome.top_per_slot {
        println!("=== Top Per Slot ===");
        for (slot, entries) in top {
            let names: Vec<&str> = entries
                .iter()
                .map(|e| e.analysis.runner.selection_name.as_str())
                .collect();
            println!("  {:>6}: {}", slot, names.join(", "));
        }
        println!();
    }

    if !outcome.skipped.is_empty() {
        println!("=== Skipped ===");
        for s in &outcome.skipped {
            println!("  {} ({}): {}", s.selection_name, s.selection_id, s.reason);
        }
        println!();
    }

    println!("Persisted {} rows", outcome.persisted);
}

/// Print the top stored selections for a date.
pub fn run_predictions(
    config: &AppConfig,
    date: NaiveDate,
    region: Region,
    format: &str,
) -> anyhow::Result<()> {
    let context = open_context(config)?;
    let request = PredictionRequest {
        event_date: date,
        region,
    };
    let response = get_predictions(context.store(), context.tunables(), &request)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&response)?),
        _ => print_predictions_table(&response),
    }
    Ok(())
}

fn print_predictions_table(response: &PredictionResponse) {
    println!("=== Predictions ({}) ===", response.status);
    for (i, p) in response.selections.iter().enumerate() {
        println!(
            "  {:2}. {:>6} {:<16} {:<24} {:>7.2}  {}",
            i + 1,
            p.event_time,
            p.event_name,
            p.selection_name,
            p.total_score,
            p.odds.as_deref().unwrap_or("-")
        );
    }
    println!();
    println!("Total bet:    {:.2}", response.total_bet);
    println!("Total return: {:.2}", response.total_return);
}

/// Load a race card into the meetings table.
pub fn run_import_card(config: &AppConfig, file: &Path, country: Option<&str>) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read race card: {}", file.display()))?;
    let runners: Vec<Runner> = serde_json::from_str(&text).context("Invalid race card")?;

    for runner in &runners {
        store.insert_runner(runner)?;
        if let Some(country) = country {
            store.insert_event(&runner.event_name, country)?;
        }
    }
    eprintln!("Imported {} runners", runners.len());
    Ok(())
}

/// Sync form records for the runners of a date.
pub fn run_import_forms(config: &AppConfig, date: NaiveDate, file: &Path) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let provider = JsonFormProvider::from_path(file)?;
    let report = sync_forms(&provider, store.as_ref(), date)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Record a race result.
pub fn run_reconcile(config: &AppConfig, request: ResultRequest) -> anyhow::Result<()> {
    let context = open_context(config)?;
    let response = reconcile_result(context.store(), context.tunables(), &request)?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// List the events of a date.
pub fn run_events(config: &AppConfig, date: NaiveDate) -> anyhow::Result<()> {
    let store = open_store(config)?;
    for event in store.events_for_date(date)? {
        println!("{:<24} {}", event.event_name, event.event_times);
    }
    Ok(())
}

pub fn run_set_config(config: &AppConfig, key: &str, value: &str) -> anyhow::Result<()> {
    let store = open_store(config)?;
    store.set_config(key, value)?;
    eprintln!("Set {} = {}", key, value);
    Ok(())
}
