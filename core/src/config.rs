use crate::store::{max_batch_rows, FORECAST_COLUMNS, SALES_LEDGER_COLUMNS};
use serde::{Deserialize, Serialize};

// ── Sales aggregation ──────────────────────────────────────────────

/// Remaps a profit center to another one for specific product groups,
/// e.g. 190 + product group P130 → 130.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReclassificationRule {
    pub profit_center: String,
    pub product_groups: Vec<String>,
    pub target: String,
}

/// Folds several profit centers into one bucket, e.g. 170 + 172 → 170.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRule {
    pub profit_centers: Vec<String>,
    pub target: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SalesConfig {
    /// Places kept when an accumulated monthly total is written.
    pub decimal_places: u32,
    pub batch_size: usize,
    /// Profit centers whose volume is measured in cubic meters; every
    /// other profit center uses the sales unit-of-measure quantity.
    pub cubic_meter_profit_centers: Vec<String>,
    pub reclassifications: Vec<ReclassificationRule>,
    pub merges: Vec<MergeRule>,
}

impl Default for SalesConfig {
    fn default() -> Self {
        Self {
            decimal_places: 2,
            batch_size: 1000,
            cubic_meter_profit_centers: vec!["110".into(), "120".into()],
            reclassifications: vec![
                ReclassificationRule {
                    profit_center: "190".into(),
                    product_groups: vec!["P130".into(), "P131".into()],
                    target: "130".into(),
                },
                ReclassificationRule {
                    profit_center: "190".into(),
                    product_groups: vec!["P160".into()],
                    target: "160".into(),
                },
            ],
            merges: vec![MergeRule {
                profit_centers: vec!["170".into(), "172".into()],
                target: "170".into(),
            }],
        }
    }
}

// ── Budget generation ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// The run-rate cutoff month is clamped into [cutoff_floor, cutoff_ceiling]
    /// so the run-rate window always covers a minimum number of months.
    pub cutoff_floor: u32,
    pub cutoff_ceiling: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            cutoff_floor: 9,
            cutoff_ceiling: 12,
        }
    }
}

// ── Forecast publication ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub batch_size: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self { batch_size: 1000 }
    }
}

// ── Diagnostics ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Rejected or failed rows described per run; the rest are only counted.
    pub max_shown: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self { max_shown: 20 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub sales: SalesConfig,
    pub budget: BudgetConfig,
    pub forecast: ForecastConfig,
    pub diagnostics: DiagnosticsConfig,
}

impl PipelineConfig {
    /// Load from a JSON file. Missing sections fall back to defaults.
    /// In tests, use PipelineConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: PipelineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sales.batch_size == 0 || self.forecast.batch_size == 0 {
            anyhow::bail!("batch_size must be at least 1");
        }
        // Every row of a batch binds one parameter per column.
        let sales_cap = max_batch_rows(SALES_LEDGER_COLUMNS);
        if self.sales.batch_size > sales_cap {
            anyhow::bail!(
                "sales.batch_size {} exceeds {sales_cap} rows per statement",
                self.sales.batch_size
            );
        }
        let forecast_cap = max_batch_rows(FORECAST_COLUMNS);
        if self.forecast.batch_size > forecast_cap {
            anyhow::bail!(
                "forecast.batch_size {} exceeds {forecast_cap} rows per statement",
                self.forecast.batch_size
            );
        }
        if self.sales.decimal_places > 10 {
            anyhow::bail!(
                "sales.decimal_places {} is out of range (0..=10)",
                self.sales.decimal_places
            );
        }
        let (floor, ceiling) = (self.budget.cutoff_floor, self.budget.cutoff_ceiling);
        if !(1..=12).contains(&floor) || !(1..=12).contains(&ceiling) || floor > ceiling {
            anyhow::bail!("invalid cutoff bounds [{floor}, {ceiling}]");
        }
        for rule in &self.sales.reclassifications {
            if rule.target.chars().count() != 3 {
                anyhow::bail!("reclassification target '{}' is not 3 characters", rule.target);
            }
        }
        for rule in &self.sales.merges {
            if rule.target.chars().count() != 3 {
                anyhow::bail!("merge target '{}' is not 3 characters", rule.target);
            }
        }
        Ok(())
    }

    /// Defaults with small batches, so tests exercise multi-batch writes.
    pub fn default_test() -> Self {
        let mut config = Self::default();
        config.sales.batch_size = 3;
        config.forecast.batch_size = 5;
        config.diagnostics.max_shown = 5;
        config
    }
}
