//! plan-runner: batch runner for the sales planning pipeline.
//!
//! Usage:
//!   plan-runner import-reference --db plan.db --file data/reference.json
//!   plan-runner sync-clients     --db plan.db --facts facts.csv --since 2025-01-01
//!   plan-runner aggregate        --db plan.db --facts facts.csv --since 2025-01-01 [--dry-run]
//!   plan-runner budget           --db plan.db --period 2027 [--cutoff 10] [--rebuild] [--dry-run]
//!   plan-runner forecast         --db plan.db --period 2027 --version 1 [--overwrite] [--dry-run]
//!
//! Common flags: --config <pipeline.json>, --max-shown <n>, --as-of <YYYY-MM-DD>.
//! Every command prints its run summary as JSON on stdout.

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use salesplan_core::{
    budget_generator::{BudgetGenerator, BudgetOptions},
    config::PipelineConfig,
    forecast_publisher::{ForecastOptions, ForecastPublisher},
    reference_importer::{ReferenceData, ReferenceImporter},
    sales_aggregator::{AggregationOptions, SalesAggregator},
    source::{CsvFactSource, FactWindow},
    store::PlanStore,
    types::RunMode,
};
use std::env;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let Some(command) = args.get(1).map(String::as_str) else {
        bail!("missing command (import-reference | sync-clients | aggregate | budget | forecast)");
    };

    let db = str_arg(&args, "--db").unwrap_or("plan.db");
    let config = match str_arg(&args, "--config") {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    let mode = RunMode::from_dry_run_flag(has_flag(&args, "--dry-run"));
    let max_shown = parse_arg(&args, "--max-shown", config.diagnostics.max_shown);
    let today = match str_arg(&args, "--as-of") {
        Some(s) => parse_date(s)?,
        None => Local::now().date_naive(),
    };

    let store = PlanStore::open(db)?;
    store.migrate()?;
    log::info!("plan-runner {command} on {db} ({mode:?})");

    let summary = match command {
        "import-reference" => {
            let file = str_arg(&args, "--file").context("--file is required")?;
            let data = ReferenceData::load(file)?;
            let summary = ReferenceImporter::new(&store, &config).import(&data, mode)?;
            serde_json::to_value(summary)?
        }
        "sync-clients" => {
            let mut source = CsvFactSource::new(required(&args, "--facts")?);
            let window = FactWindow::new(since(&args)?, today);
            let summary = ReferenceImporter::new(&store, &config)
                .sync_clients_from_feed(&mut source, &window, mode)?;
            serde_json::to_value(summary)?
        }
        "aggregate" => {
            let mut source = CsvFactSource::new(required(&args, "--facts")?);
            let options = AggregationOptions {
                start: since(&args)?,
                as_of: today,
                mode,
                max_shown,
            };
            let summary = SalesAggregator::new(&store, &config).run(&mut source, &options);
            let failed = !summary.succeeded();
            println!("{}", serde_json::to_string_pretty(&summary)?);
            if failed {
                bail!("sales aggregation failed and was rolled back");
            }
            return Ok(());
        }
        "budget" => {
            let options = BudgetOptions {
                planning_period: required(&args, "--period")?.parse()?,
                cutoff_month: str_arg(&args, "--cutoff").map(|s| s.parse::<u32>()).transpose()?,
                today,
                rebuild: has_flag(&args, "--rebuild"),
                mode,
                max_shown,
            };
            let summary = BudgetGenerator::new(&store, &config).run(&options)?;
            serde_json::to_value(summary)?
        }
        "forecast" => {
            let options = ForecastOptions {
                planning_period: required(&args, "--period")?.parse()?,
                version: required(&args, "--version")?.parse()?,
                overwrite: has_flag(&args, "--overwrite"),
                mode,
                max_shown,
            };
            let summary = ForecastPublisher::new(&store, &config).run(&options)?;
            serde_json::to_value(summary)?
        }
        other => bail!("unknown command '{other}'"),
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn since(args: &[String]) -> Result<NaiveDate> {
    parse_date(required(args, "--since")?)
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date '{s}'"))
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn str_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn required<'a>(args: &'a [String], flag: &str) -> Result<&'a str> {
    str_arg(args, flag).with_context(|| format!("{flag} is required"))
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
