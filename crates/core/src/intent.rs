//! Intent: what the question is asking for.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Closed set of analytics domains a question can belong to.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// Future inventory needs, reorder quantities, stock planning.
    InventoryForecasting,
    /// Current stock levels and availability.
    InventoryStatus,
    /// Product sales performance and revenue.
    #[default]
    SalesAnalysis,
    /// Customer behavior and repeat purchases.
    CustomerAnalysis,
    /// Top/bottom products and comparisons.
    ProductRanking,
}

impl Domain {
    pub const ALL: [Domain; 5] = [
        Domain::InventoryForecasting,
        Domain::InventoryStatus,
        Domain::SalesAnalysis,
        Domain::CustomerAnalysis,
        Domain::ProductRanking,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::InventoryForecasting => "inventory_forecasting",
            Domain::InventoryStatus => "inventory_status",
            Domain::SalesAnalysis => "sales_analysis",
            Domain::CustomerAnalysis => "customer_analysis",
            Domain::ProductRanking => "product_ranking",
        }
    }

    /// Strict lookup; `None` for anything outside the closed set.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|d| d.as_str() == s)
    }

    /// Lenient lookup: unknown values become the default domain.
    pub fn normalize(s: &str) -> Self {
        Self::parse(s).unwrap_or_default()
    }
}

impl core::fmt::Display for Domain {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical time windows a question can refer to.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "last_7_days")]
    Last7Days,
    #[default]
    #[serde(rename = "last_30_days")]
    Last30Days,
    #[serde(rename = "last_90_days")]
    Last90Days,
    #[serde(rename = "next_7_days")]
    Next7Days,
    #[serde(rename = "next_30_days")]
    Next30Days,
}

impl TimeRange {
    pub const ALL: [TimeRange; 5] = [
        TimeRange::Last7Days,
        TimeRange::Last30Days,
        TimeRange::Last90Days,
        TimeRange::Next7Days,
        TimeRange::Next30Days,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::Last7Days => "last_7_days",
            TimeRange::Last30Days => "last_30_days",
            TimeRange::Last90Days => "last_90_days",
            TimeRange::Next7Days => "next_7_days",
            TimeRange::Next30Days => "next_30_days",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|r| r.as_str() == s)
    }

    pub fn normalize(s: &str) -> Self {
        Self::parse(s).unwrap_or_default()
    }

    pub fn days(&self) -> u32 {
        match self {
            TimeRange::Last7Days | TimeRange::Next7Days => 7,
            TimeRange::Last30Days | TimeRange::Next30Days => 30,
            TimeRange::Last90Days => 90,
        }
    }

    pub fn is_future(&self) -> bool {
        matches!(self, TimeRange::Next7Days | TimeRange::Next30Days)
    }

    /// Snap an arbitrary window onto the nearest canonical range.
    pub fn from_window(days: u32, future: bool) -> Self {
        match (future, days) {
            (true, 0..=7) => TimeRange::Next7Days,
            (true, _) => TimeRange::Next30Days,
            (false, 0..=7) => TimeRange::Last7Days,
            (false, 8..=30) => TimeRange::Last30Days,
            (false, _) => TimeRange::Last90Days,
        }
    }
}

impl core::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured classification of a question. Immutable once classified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub domain: Domain,
    /// Always within \[0, 1\] when built through [`Intent::new`].
    pub confidence: f64,
    #[serde(default)]
    pub entities: BTreeMap<String, String>,
    #[serde(default)]
    pub time_range: TimeRange,
    #[serde(default)]
    pub requires_forecast: bool,
}

impl Intent {
    pub fn new(domain: Domain, confidence: f64) -> Self {
        Self {
            domain,
            confidence: clamp_unit(confidence),
            entities: BTreeMap::new(),
            time_range: TimeRange::default(),
            requires_forecast: false,
        }
    }

    /// Safe default used whenever classification fails.
    pub fn fallback() -> Self {
        Self::new(Domain::SalesAnalysis, 0.3)
    }

    pub fn with_entity(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entities.insert(key.into(), value.into());
        self
    }

    pub fn with_time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = time_range;
        self
    }

    pub fn with_forecast(mut self, requires_forecast: bool) -> Self {
        self.requires_forecast = requires_forecast;
        self
    }

    pub fn entity(&self, key: &str) -> Option<&str> {
        self.entities.get(key).map(String::as_str)
    }

    pub fn product_name(&self) -> Option<&str> {
        self.entity("product_name")
    }
}

/// Clamp into \[0, 1\]; NaN becomes 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn unknown_domain_normalizes_to_sales_analysis() {
        assert_eq!(Domain::normalize("weather_report"), Domain::SalesAnalysis);
        assert_eq!(Domain::normalize(""), Domain::SalesAnalysis);
        assert_eq!(Domain::normalize(" Inventory_Status "), Domain::InventoryStatus);
    }

    #[test]
    fn time_range_serializes_with_canonical_names() {
        let json = serde_json::to_string(&TimeRange::Next30Days).unwrap();
        assert_eq!(json, "\"next_30_days\"");
        let parsed: TimeRange = serde_json::from_str("\"last_7_days\"").unwrap();
        assert_eq!(parsed, TimeRange::Last7Days);
    }

    #[test]
    fn windows_snap_to_nearest_canonical_range() {
        assert_eq!(TimeRange::from_window(7, false), TimeRange::Last7Days);
        assert_eq!(TimeRange::from_window(14, false), TimeRange::Last30Days);
        assert_eq!(TimeRange::from_window(365, false), TimeRange::Last90Days);
        assert_eq!(TimeRange::from_window(1, true), TimeRange::Next7Days);
        assert_eq!(TimeRange::from_window(30, true), TimeRange::Next30Days);
    }

    #[test]
    fn fallback_intent_matches_documented_defaults() {
        let intent = Intent::fallback();
        assert_eq!(intent.domain, Domain::SalesAnalysis);
        assert_eq!(intent.confidence, 0.3);
        assert!(intent.entities.is_empty());
        assert_eq!(intent.time_range, TimeRange::Last30Days);
        assert!(!intent.requires_forecast);
    }

    #[test]
    fn nan_confidence_clamps_to_zero() {
        assert_eq!(Intent::new(Domain::SalesAnalysis, f64::NAN).confidence, 0.0);
    }

    proptest! {
        #[test]
        fn normalized_domain_is_always_in_the_closed_set(raw in ".{0,40}") {
            let d = Domain::normalize(&raw);
            prop_assert!(Domain::ALL.contains(&d));
        }

        #[test]
        fn intent_confidence_is_always_clamped(c in proptest::num::f64::ANY) {
            let intent = Intent::new(Domain::ProductRanking, c);
            prop_assert!((0.0..=1.0).contains(&intent.confidence));
        }
    }
}
