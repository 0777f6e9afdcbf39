//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use chrono::NaiveDate;
use salesplan_core::{
    numeric::decimal_from_f64,
    seasonality::SeasonalityCurve,
    source::RawFactRow,
    store::{CaseAdjustmentRow, PlanStore, SalesLedgerRow},
    types::{EntityId, PlanningPeriod},
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Migrated in-memory store.
pub fn store() -> PlanStore {
    init_logging();
    let store = PlanStore::in_memory().expect("in-memory store");
    store.migrate().expect("migrate");
    store
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn cpc(store: &PlanStore, client_group: &str, profit_center: &str) -> EntityId {
    store
        .insert_cpc_if_missing(client_group, profit_center)
        .expect("insert cpc")
        .0
        .id
}

/// A realized fact measured in the sales unit of measure.
pub fn fact(client_group: &str, profit_center: &str, year: i32, month: u32, quantity: f64) -> RawFactRow {
    RawFactRow {
        client_group: client_group.into(),
        profit_center: profit_center.into(),
        product_group: String::new(),
        year,
        month,
        uom_quantity: Some(quantity),
        cubic_quantity: None,
        open_order: false,
        unreadable_quantities: Vec::new(),
    }
}

/// Store a curve given January..December percentages.
pub fn curve(store: &PlanStore, profit_center: &str, period: PlanningPeriod, pct: [f64; 12]) {
    let mut percentages = [rust_decimal::Decimal::ZERO; 12];
    for (slot, value) in percentages.iter_mut().zip(pct) {
        *slot = decimal_from_f64(value).expect("finite percentage");
    }
    store
        .upsert_seasonality_curve(&SeasonalityCurve::new(profit_center, period, percentages))
        .expect("store curve");
}

pub fn ledger(store: &PlanStore, entity_id: EntityId, year: i32, month: u32, volume: f64) {
    store
        .upsert_sales_row(&SalesLedgerRow {
            entity_id,
            year,
            month,
            volume,
        })
        .expect("ledger row");
}

pub fn case_adjustment(
    store: &PlanStore,
    entity_id: EntityId,
    period: PlanningPeriod,
    best_case: f64,
    skip_budget: bool,
) {
    store
        .upsert_case_adjustment(&CaseAdjustmentRow {
            entity_id,
            planning_period: period,
            best_case,
            skip_budget,
        })
        .expect("case adjustment");
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

/// A migrated store backed by a temporary file, for tests that need a
/// second connection to the same database.
pub fn file_store() -> (PlanStore, std::path::PathBuf) {
    init_logging();
    let path = std::env::temp_dir().join(format!("salesplan-{}.db", uuid::Uuid::new_v4()));
    let store = PlanStore::open(path.to_str().expect("utf-8 temp path")).expect("file store");
    store.migrate().expect("migrate");
    (store, path)
}

/// Write `contents` to a fresh temporary CSV file.
pub fn temp_csv(contents: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("salesplan-{}.csv", uuid::Uuid::new_v4()));
    std::fs::write(&path, contents).expect("write temp csv");
    path
}

pub fn remove_db(path: &std::path::Path) {
    for suffix in ["", "-wal", "-shm"] {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        let _ = std::fs::remove_file(name);
    }
}
