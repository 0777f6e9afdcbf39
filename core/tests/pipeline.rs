//! End-to-end: reference import, CSV feed aggregation, budget, forecast.

mod common;

use common::{approx, date, store};
use salesplan_core::{
    budget_generator::{BudgetGenerator, BudgetOptions},
    config::PipelineConfig,
    forecast_publisher::{ForecastOptions, ForecastPublisher},
    keys::RejectReason,
    reference_importer::{ReferenceData, ReferenceImporter},
    sales_aggregator::{AggregationOptions, SalesAggregator},
    source::CsvFactSource,
    types::RunMode,
};

const REFERENCE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../data/reference.json");
const FACTS: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../data/facts.sample.csv");
const CONFIG: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../data/pipeline.json");

fn aggregation() -> AggregationOptions {
    AggregationOptions {
        start: date(2025, 1, 1),
        as_of: date(2026, 10, 17),
        mode: RunMode::Commit,
        max_shown: 10,
    }
}

#[test]
fn sample_config_loads() {
    let config = PipelineConfig::load(CONFIG).unwrap();
    assert!(config.validate().is_ok());
}

#[test]
fn sample_data_flows_through_every_stage() {
    let store = store();
    let config = PipelineConfig::default_test();

    ReferenceImporter::new(&store, &config)
        .import(&ReferenceData::load(REFERENCE).unwrap(), RunMode::Commit)
        .unwrap();
    let ac001_130 = store.find_cpc("AC001", "130").unwrap().unwrap().id;
    let ac001_170 = store.find_cpc("AC001", "170").unwrap().unwrap().id;
    let bx200_110 = store.find_cpc("BX200", "110").unwrap().unwrap().id;

    // Sales
    let mut feed = CsvFactSource::new(FACTS);
    let sales = SalesAggregator::new(&store, &config).run(&mut feed, &aggregation());
    assert!(sales.succeeded(), "failure: {:?}", sales.failure);
    assert_eq!(sales.rows_seen, 6);
    assert_eq!(sales.rows_rejected, 1);
    assert_eq!(sales.rejected_by_reason.get(&RejectReason::ClientGroupShape), Some(&1));
    assert_eq!(sales.buckets, 5);
    assert_eq!(sales.rows_upserted, 5);
    assert_eq!(sales.degraded_batches, 0);

    let volume = |entity, year, month| {
        store
            .sales_ledger_row(entity, year, month)
            .unwrap()
            .map(|r| r.volume)
    };
    assert_eq!(volume(ac001_130, 2025, 2), Some(120.5));
    assert_eq!(volume(ac001_130, 2026, 5), Some(80.25));
    assert_eq!(volume(ac001_130, 2026, 12), Some(55.0));
    assert_eq!(volume(ac001_170, 2026, 6), Some(14.0));
    assert!(approx(volume(bx200_110, 2026, 7).unwrap(), 42.13));

    // Budget: only AC001/130 has curves.
    let budget = BudgetGenerator::new(&store, &config)
        .run(&BudgetOptions {
            planning_period: 2027,
            cutoff_month: Some(9),
            today: date(2026, 10, 17),
            rebuild: false,
            mode: RunMode::Commit,
            max_shown: 10,
        })
        .unwrap();
    assert_eq!(budget.entities_examined, 3);
    assert_eq!(budget.entities_budgeted, 1);
    assert_eq!(budget.entities_skipped, 2);
    assert_eq!(store.budget_rows(2027).unwrap().len(), 12);

    // 200.75 run rate over 77% seasonality, plus 5% best case.
    let audit = store.budget_audit_rows(ac001_130, 2027).unwrap();
    assert!(approx(audit[0].run_rate_base, 200.75));
    assert!(approx(audit[0].cumulative_seasonality, 77.0));
    assert!((audit[0].annual_total - 273.75).abs() < 0.011);

    // Forecast
    let forecast = ForecastPublisher::new(&store, &config)
        .run(&ForecastOptions {
            planning_period: 2027,
            version: 1,
            overwrite: true,
            mode: RunMode::Commit,
            max_shown: 10,
        })
        .unwrap();
    assert_eq!(forecast.rows_written, 12);
    assert_eq!(forecast.rows_excluded, 0);
    let rows = store.forecast_rows(2027, 1).unwrap();
    assert!(rows.iter().all(|r| r.entity_id == ac001_130));
    let budget_rows = store.budget_rows(2027).unwrap();
    assert_eq!(
        rows.iter().map(|r| r.volume).collect::<Vec<_>>(),
        budget_rows.iter().map(|r| r.volume).collect::<Vec<_>>()
    );
}

#[test]
fn missing_feed_file_is_a_reported_failure() {
    let store = store();
    let config = PipelineConfig::default_test();

    let mut feed = CsvFactSource::new("/nonexistent/facts.csv");
    let summary = SalesAggregator::new(&store, &config).run(&mut feed, &aggregation());

    assert!(!summary.succeeded());
    assert!(!summary.committed);
    assert_eq!(store.sales_ledger_count().unwrap(), 0);
}
