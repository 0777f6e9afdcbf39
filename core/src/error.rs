use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Source feed error: {0}")]
    SourceFeed(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown month name '{0}'")]
    UnknownMonthName(String),

    #[error("Seasonality curve {profit_center}/{planning_period} has no value for {month}")]
    IncompleteCurve {
        profit_center: String,
        planning_period: i32,
        month: &'static str,
    },

    #[error("Invalid CPC key {client_group}/{profit_center}: {reason}")]
    InvalidCpcKey {
        client_group: String,
        profit_center: String,
        reason: &'static str,
    },

    #[error("Value {0} is not a finite number")]
    NonFinite(f64),

    #[error("Value {0} is outside the decimal range")]
    DecimalRange(f64),

    #[error("Decimal overflow while computing {0}")]
    Overflow(&'static str),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PlanError {
    /// Numbers that are valid but too large to carry as decimals.
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, PlanError::DecimalRange(_) | PlanError::Overflow(_))
    }
}

pub type PlanResult<T> = Result<T, PlanError>;
