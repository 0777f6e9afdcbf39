//! salesplan-core: sales ledger aggregation, budget generation and
//! forecast publication over a SQLite planning database.
//!
//! Pipeline order (each stage is an independent batch run):
//!   1. SalesAggregator: raw facts → sales_ledger
//!   2. BudgetGenerator: sales_ledger → budget + budget_audit
//!   3. ForecastPublisher: budget → forecast (versioned)
//!
//! Reference data (cpc, seasonality_curve, case_adjustment) is seeded by
//! the ReferenceImporter and is read-only to the three stages.

pub mod batch;
pub mod budget_generator;
pub mod config;
pub mod cpc_index;
pub mod diagnostics;
pub mod error;
pub mod forecast_publisher;
pub mod keys;
pub mod numeric;
pub mod reference_importer;
pub mod sales_aggregator;
pub mod seasonality;
pub mod source;
pub mod store;
pub mod types;
