//! Budget generator integration tests.

mod common;

use common::{approx, case_adjustment, cpc, curve, date, file_store, ledger, remove_db, store};
use salesplan_core::{
    budget_generator::{BudgetGenerator, BudgetOptions, SkipReason},
    config::PipelineConfig,
    store::{BudgetRow, PlanStore},
    types::{EntityId, RunMode},
};

const PERIOD: i32 = 2027;

/// P-1 curve: 5% in each of January..March, the rest spread evenly.
const PRIOR: [f64; 12] = [5.0, 5.0, 5.0, 8.5, 8.5, 8.5, 8.5, 8.5, 8.5, 8.5, 8.5, 17.0];
/// P curve, January..December. Sums to 100.
const TARGET: [f64; 12] = [12.5, 12.5, 12.5, 8.0, 5.0, 3.0, 3.0, 3.0, 3.0, 12.5, 12.5, 12.5];

fn options(cutoff: Option<u32>, rebuild: bool, mode: RunMode) -> BudgetOptions {
    BudgetOptions {
        planning_period: PERIOD,
        cutoff_month: cutoff,
        today: date(2026, 10, 17),
        rebuild,
        mode,
        max_shown: 5,
    }
}

/// One entity on profit center 130 with a 4000 run rate, both curves and
/// a 10% best case: 40% seasonality, 10000 estimate, 11000 annual total.
fn seed_reference_entity(store: &PlanStore) -> EntityId {
    let entity = cpc(store, "AC001", "130");
    for month in 1..=3 {
        ledger(store, entity, 2025, month, 500.0);
    }
    ledger(store, entity, 2026, 4, 1000.0);
    ledger(store, entity, 2026, 6, 1500.0);
    curve(store, "130", PERIOD - 1, PRIOR);
    curve(store, "130", PERIOD, TARGET);
    case_adjustment(store, entity, PERIOD, 10.0, false);
    entity
}

fn month_volume(rows: &[BudgetRow], month: u32) -> i64 {
    rows.iter()
        .find(|r| r.month == month)
        .map(|r| r.volume)
        .expect("month present")
}

#[test]
fn run_rate_is_annualized_and_spread_over_the_period() {
    let store = store();
    let config = PipelineConfig::default_test();
    let entity = seed_reference_entity(&store);

    let summary = BudgetGenerator::new(&store, &config)
        .run(&options(Some(9), false, RunMode::Commit))
        .unwrap();

    assert_eq!(summary.cutoff_month, 9);
    assert_eq!(summary.entities_examined, 1);
    assert_eq!(summary.entities_budgeted, 1);
    assert_eq!(summary.entities_skipped, 0);
    assert_eq!(summary.rows_inserted, 12);
    assert_eq!(summary.rows_updated, 0);

    let rows = store.budget_rows_for_entity(entity, PERIOD).unwrap();
    assert_eq!(rows.len(), 12);
    assert_eq!(month_volume(&rows, 4), 880);
    assert_eq!(month_volume(&rows, 5), 550);
    assert_eq!(month_volume(&rows, 6), 330);
    assert_eq!(month_volume(&rows, 10), 1375);
    assert_eq!(month_volume(&rows, 1), 1375);
    assert_eq!(rows.iter().map(|r| r.volume).sum::<i64>(), 11000);
}

#[test]
fn audit_records_every_intermediate_value() {
    let store = store();
    let config = PipelineConfig::default_test();
    let entity = seed_reference_entity(&store);

    BudgetGenerator::new(&store, &config)
        .run(&options(Some(9), false, RunMode::Commit))
        .unwrap();

    let audit = store.budget_audit_rows(entity, PERIOD).unwrap();
    assert_eq!(audit.len(), 12);
    for row in &audit {
        assert_eq!(row.cutoff_month, 9);
        assert!(approx(row.run_rate_base, 4000.0));
        assert!(approx(row.best_case, 10.0));
        assert!(approx(row.cumulative_seasonality, 40.0));
        assert!(approx(row.annual_estimate, 10000.0));
        assert!(approx(row.annual_total, 11000.0));
    }
    let april = audit.iter().find(|r| r.month == 4).unwrap();
    assert!(approx(april.month_percentage, 8.0));
    assert!(approx(april.month_volume, 880.0));
}

#[test]
fn cutoff_defaults_to_current_month_and_is_clamped() {
    let store = store();
    let config = PipelineConfig::default_test();
    seed_reference_entity(&store);
    let generator = BudgetGenerator::new(&store, &config);

    let october = generator.run(&options(None, false, RunMode::DryRun)).unwrap();
    assert_eq!(october.cutoff_month, 10);

    let early = generator.run(&options(Some(3), false, RunMode::DryRun)).unwrap();
    assert_eq!(early.cutoff_month, 9);
}

#[test]
fn entities_without_inputs_are_skipped_entirely() {
    let store = store();
    let config = PipelineConfig::default_test();
    let budgeted = seed_reference_entity(&store);

    // No sales at all.
    let no_sales = cpc(&store, "BX200", "130");
    // Sales, but no curves for the profit center.
    let no_curves = cpc(&store, "CX300", "140");
    ledger(&store, no_curves, 2026, 5, 100.0);
    // Sales and a P-1 curve, but nothing for the target period.
    let no_target = cpc(&store, "DX400", "150");
    ledger(&store, no_target, 2025, 2, 100.0);
    curve(&store, "150", PERIOD - 1, PRIOR);

    let summary = BudgetGenerator::new(&store, &config)
        .run(&options(Some(9), false, RunMode::Commit))
        .unwrap();

    assert_eq!(summary.entities_examined, 4);
    assert_eq!(summary.entities_budgeted, 1);
    assert_eq!(summary.entities_skipped, 3);
    assert_eq!(summary.skipped_by_reason.get(&SkipReason::NoRunRate), Some(&1));
    assert_eq!(summary.skipped_by_reason.get(&SkipReason::NoSeasonality), Some(&1));
    assert_eq!(summary.skipped_by_reason.get(&SkipReason::MissingTargetCurve), Some(&1));

    for entity in [no_sales, no_curves, no_target] {
        assert!(store.budget_rows_for_entity(entity, PERIOD).unwrap().is_empty());
        assert!(store.budget_audit_rows(entity, PERIOD).unwrap().is_empty());
    }
    assert_eq!(store.budget_rows(PERIOD).unwrap().len(), 12);
    assert!(store
        .budget_rows(PERIOD)
        .unwrap()
        .iter()
        .all(|r| r.entity_id == budgeted));
}

#[test]
fn second_run_updates_in_place() {
    let store = store();
    let config = PipelineConfig::default_test();
    let entity = seed_reference_entity(&store);
    let generator = BudgetGenerator::new(&store, &config);

    generator.run(&options(Some(9), false, RunMode::Commit)).unwrap();
    let first = store.budget_rows_for_entity(entity, PERIOD).unwrap();
    let summary = generator.run(&options(Some(9), false, RunMode::Commit)).unwrap();

    assert_eq!(summary.rows_inserted, 0);
    assert_eq!(summary.rows_updated, 12);
    assert_eq!(summary.rows_cleared, 0);
    assert_eq!(store.budget_rows_for_entity(entity, PERIOD).unwrap(), first);
}

#[test]
fn rebuild_clears_stale_rows_first() {
    let store = store();
    let config = PipelineConfig::default_test();
    seed_reference_entity(&store);
    let stale = cpc(&store, "BX200", "130");
    store
        .upsert_budget_row(&BudgetRow {
            entity_id: stale,
            planning_period: PERIOD,
            month: 4,
            volume: 999,
        })
        .unwrap();
    let generator = BudgetGenerator::new(&store, &config);

    let without = generator.run(&options(Some(9), false, RunMode::Commit)).unwrap();
    assert_eq!(without.rows_cleared, 0);
    assert_eq!(store.budget_rows_for_entity(stale, PERIOD).unwrap().len(), 1);

    let with = generator.run(&options(Some(9), true, RunMode::Commit)).unwrap();
    assert_eq!(with.rows_cleared, 13);
    assert_eq!(with.rows_inserted, 12);
    assert_eq!(with.rows_updated, 0);
    assert!(store.budget_rows_for_entity(stale, PERIOD).unwrap().is_empty());
    assert_eq!(store.budget_rows(PERIOD).unwrap().len(), 12);
}

#[test]
fn dry_run_computes_but_leaves_tables_untouched() {
    let store = store();
    let config = PipelineConfig::default_test();
    let entity = seed_reference_entity(&store);

    let summary = BudgetGenerator::new(&store, &config)
        .run(&options(Some(9), true, RunMode::DryRun))
        .unwrap();

    assert_eq!(summary.entities_budgeted, 1);
    assert_eq!(summary.rows_inserted, 12);
    assert!(store.budget_rows(PERIOD).unwrap().is_empty());
    assert!(store.budget_audit_rows(entity, PERIOD).unwrap().is_empty());
}

#[test]
fn failure_mid_entity_rolls_back_the_whole_run() {
    let (store, path) = file_store();
    let config = PipelineConfig::default_test();
    let entity = seed_reference_entity(&store);

    // Audit writes for December fail; April..November are already written
    // by then.
    let saboteur = rusqlite::Connection::open(&path).unwrap();
    saboteur
        .execute_batch(
            "CREATE TRIGGER reject_december_audit BEFORE INSERT ON budget_audit
             WHEN NEW.month = 12
             BEGIN SELECT RAISE(ABORT, 'audit rejected'); END;",
        )
        .unwrap();
    drop(saboteur);

    let result = BudgetGenerator::new(&store, &config).run(&options(Some(9), false, RunMode::Commit));

    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("audit rejected"));
    assert!(store.budget_rows(PERIOD).unwrap().is_empty());
    assert!(store.budget_audit_rows(entity, PERIOD).unwrap().is_empty());

    drop(store);
    remove_db(&path);
}

#[test]
fn run_rate_beyond_decimal_range_skips_the_entity() {
    let store = store();
    let config = PipelineConfig::default_test();
    let budgeted = seed_reference_entity(&store);

    // Each month fits a decimal; their sum does not.
    let huge = cpc(&store, "BX200", "130");
    ledger(&store, huge, 2025, 1, 5e28);
    ledger(&store, huge, 2025, 2, 5e28);

    let summary = BudgetGenerator::new(&store, &config)
        .run(&options(Some(9), false, RunMode::Commit))
        .unwrap();

    assert_eq!(summary.entities_budgeted, 1);
    assert_eq!(summary.entities_skipped, 1);
    assert_eq!(summary.skipped_by_reason.get(&SkipReason::OutOfRange), Some(&1));
    assert_eq!(summary.skipped.shown()[0].entity_id, huge);
    assert!(store.budget_rows_for_entity(huge, PERIOD).unwrap().is_empty());
    assert_eq!(store.budget_rows_for_entity(budgeted, PERIOD).unwrap().len(), 12);
}
