//! Plan: the data-retrieval and aggregation strategy derived from an Intent.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{FORECAST_DAYS_RANGE, ForecastSettings, HISTORICAL_DAYS_RANGE};

/// Store data sources the reporting dialect can read from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Orders,
    Products,
    Customers,
}

impl DataSource {
    pub const ALL: [DataSource; 3] = [DataSource::Orders, DataSource::Products, DataSource::Customers];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Orders => "orders",
            DataSource::Products => "products",
            DataSource::Customers => "customers",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|d| d.as_str() == s)
    }

    /// Fields the reporting dialect exposes for this source.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            DataSource::Orders => &[
                "created_at",
                "order_id",
                "total_price",
                "subtotal_price",
                "product_name",
                "product_id",
                "quantity",
                "line_item_price",
                "customer_email",
                "customer_id",
            ],
            DataSource::Products => &[
                "product_id",
                "product_name",
                "product_type",
                "vendor",
                "inventory_quantity",
                "price",
                "sku",
            ],
            DataSource::Customers => &[
                "customer_id",
                "customer_email",
                "customer_name",
                "total_spent",
                "order_count",
                "created_at",
            ],
        }
    }
}

impl core::fmt::Display for DataSource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastMethod {
    #[default]
    LinearRegression,
}

impl ForecastMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForecastMethod::LinearRegression => "linear_regression",
        }
    }

    /// Only one method exists; every name maps onto it.
    pub fn normalize(_s: &str) -> Self {
        ForecastMethod::LinearRegression
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastConfig {
    pub method: ForecastMethod,
    pub historical_days: u32,
    pub forecast_days: u32,
}

impl ForecastConfig {
    pub fn from_settings(settings: &ForecastSettings) -> Self {
        Self {
            method: ForecastMethod::LinearRegression,
            historical_days: settings.historical_days,
            forecast_days: settings.forecast_days,
        }
    }
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self::from_settings(&ForecastSettings::default())
    }
}

/// Retrieval strategy for one request. Immutable once planned.
///
/// Invariants (established by [`Plan::normalized`]):
/// - `data_sources` and `aggregations` are non-empty
/// - `forecast_config` is present iff `requires_forecast`
/// - forecast windows lie within the ranges configuration accepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub data_sources: Vec<DataSource>,
    pub primary_metric: String,
    pub aggregations: Vec<String>,
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
    #[serde(default)]
    pub requires_forecast: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forecast_config: Option<ForecastConfig>,
    #[serde(default)]
    pub group_by: Vec<String>,
}

impl Plan {
    pub fn new(data_sources: Vec<DataSource>, primary_metric: impl Into<String>) -> Self {
        Self {
            data_sources,
            primary_metric: primary_metric.into(),
            aggregations: Vec::new(),
            filters: BTreeMap::new(),
            requires_forecast: false,
            forecast_config: None,
            group_by: Vec::new(),
        }
    }

    pub fn with_aggregations<I, S>(mut self, aggregations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aggregations = aggregations.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    pub fn with_group_by<I, S>(mut self, group_by: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by = group_by.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_forecast(mut self, config: ForecastConfig) -> Self {
        self.requires_forecast = true;
        self.forecast_config = Some(config);
        self
    }

    /// Enforce the plan invariants, repairing rather than rejecting.
    pub fn normalized(mut self, settings: &ForecastSettings) -> Self {
        let mut seen = Vec::with_capacity(self.data_sources.len());
        for source in self.data_sources {
            if !seen.contains(&source) {
                seen.push(source);
            }
        }
        if seen.is_empty() {
            seen.push(DataSource::Orders);
        }
        self.data_sources = seen;

        if self.primary_metric.trim().is_empty() {
            self.primary_metric = "quantity_sold".to_string();
        }

        self.aggregations.retain(|a| !a.trim().is_empty());
        if self.aggregations.is_empty() {
            self.aggregations.push("sum".to_string());
        }

        if self.requires_forecast {
            let mut config = self
                .forecast_config
                .unwrap_or_else(|| ForecastConfig::from_settings(settings));
            config.historical_days = config
                .historical_days
                .clamp(*HISTORICAL_DAYS_RANGE.start(), *HISTORICAL_DAYS_RANGE.end());
            config.forecast_days = config
                .forecast_days
                .clamp(*FORECAST_DAYS_RANGE.start(), *FORECAST_DAYS_RANGE.end());
            self.forecast_config = Some(config);
        } else {
            self.forecast_config = None;
        }

        self
    }

    pub fn primary_source(&self) -> DataSource {
        self.data_sources.first().copied().unwrap_or(DataSource::Orders)
    }

    pub fn filter(&self, key: &str) -> Option<&str> {
        self.filters.get(key).map(String::as_str)
    }

    pub fn groups_by(&self, field: &str) -> bool {
        self.group_by.iter().any(|g| g == field)
    }
}
