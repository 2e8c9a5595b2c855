//! Query execution output and the per-product forecast attached to it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One result row. The key set depends on the data that produced it.
pub type Row = Map<String, Value>;

/// Row key under which a product forecast is merged.
pub const FORECAST_KEY: &str = "forecast";

/// Demand forecast for one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub daily_velocity: f64,
    pub forecast_quantity: f64,
    pub safety_stock: f64,
    /// Exactly `forecast_quantity + safety_stock`.
    pub total_needed: f64,
    pub forecast_days: u32,
    /// R² of the trend fit, within \[0, 1\].
    pub confidence: f64,
}

impl Forecast {
    /// Read a forecast back out of a row, if one was merged into it.
    pub fn from_row(row: &Row) -> Option<Self> {
        row.get(FORECAST_KEY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub data: Vec<Row>,
    pub forecast_applied: bool,
    pub row_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_executed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn new(data: Vec<Row>, forecast_applied: bool) -> Self {
        let row_count = data.len();
        Self {
            data,
            forecast_applied,
            row_count,
            query_executed: None,
            error: None,
        }
    }

    /// Empty result carrying the reason execution failed.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::new(Vec::new(), false)
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query_executed = Some(query.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// String field of a row, if present.
pub fn row_str<'a>(row: &'a Row, key: &str) -> Option<&'a str> {
    row.get(key).and_then(Value::as_str)
}

/// Numeric field of a row, if present and numeric.
pub fn row_f64(row: &Row, key: &str) -> Option<f64> {
    row.get(key).and_then(Value::as_f64)
}
