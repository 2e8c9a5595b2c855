//! Stage 2: question + intent → [`Plan`].

use std::sync::Arc;

use serde_json::Value;
use shopcast_ai::CompletionService;
use shopcast_ai::parser::{extract_json_object, truncate_for_log};
use shopcast_core::{
    DataSource, Domain, ForecastConfig, ForecastMethod, ForecastSettings, Intent, ParseError, Plan,
};
use tracing::warn;

use crate::lenient::{str_field, string_list, string_map};

const MAX_TOKENS: u32 = 1500;

/// Static per-domain plan, used by the rule planner and as the fallback.
pub fn default_plan(domain: Domain, settings: &ForecastSettings) -> Plan {
    match domain {
        Domain::InventoryForecasting => Plan::new(vec![DataSource::Orders, DataSource::Products], "quantity_sold")
            .with_aggregations(["sum", "daily_average"])
            .with_filter("date_range", "last_90_days")
            .with_forecast(ForecastConfig::from_settings(settings))
            .with_group_by(["product_name"]),
        Domain::InventoryStatus => Plan::new(vec![DataSource::Products], "inventory_quantity")
            .with_aggregations(["sum"])
            .with_filter("stock_threshold", "50")
            .with_group_by(["product_name"]),
        Domain::SalesAnalysis => Plan::new(vec![DataSource::Orders], "quantity_sold")
            .with_aggregations(["sum", "count"])
            .with_filter("date_range", "last_30_days")
            .with_group_by(["product_name"]),
        Domain::CustomerAnalysis => Plan::new(vec![DataSource::Customers, DataSource::Orders], "order_count")
            .with_aggregations(["count", "sum"])
            .with_filter("date_range", "last_90_days")
            .with_group_by(["customer_email"]),
        Domain::ProductRanking => Plan::new(vec![DataSource::Orders], "total_quantity")
            .with_aggregations(["sum"])
            .with_filter("date_range", "last_30_days")
            .with_filter("limit", "5")
            .with_group_by(["product_name"]),
    }
}

/// Completion-backed planner.
pub struct QueryPlanner {
    completion: Arc<dyn CompletionService>,
    settings: ForecastSettings,
}

impl QueryPlanner {
    pub fn new(completion: Arc<dyn CompletionService>, settings: ForecastSettings) -> Self {
        Self { completion, settings }
    }

    /// Never fails; any service or parse error yields the domain's default plan.
    pub async fn plan(&self, question: &str, intent: &Intent) -> Plan {
        let prompt = planning_prompt(question, intent);
        let reply = match self.completion.complete(&prompt, MAX_TOKENS).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(service = self.completion.name(), error = %e, domain = %intent.domain, "query planning failed; using default plan");
                return default_plan(intent.domain, &self.settings);
            }
        };

        parse_plan(&reply, &self.settings).unwrap_or_else(|e| {
            warn!(error = %e, response = %truncate_for_log(&reply, 200), "unparsable plan; using default plan");
            default_plan(intent.domain, &self.settings)
        })
    }
}

fn planning_prompt(question: &str, intent: &Intent) -> String {
    let entities = serde_json::to_string(&intent.entities).unwrap_or_default();
    format!(
        r#"Plan the data retrieval for this store analytics question.

Question: "{question}"

Intent:
- Domain: {domain}
- Entities: {entities}
- Time range: {time_range}
- Requires forecast: {forecast}

Data sources:
1. orders - order transactions (date, total, product, quantity)
2. products - product catalog (name, SKU, price, inventory)
3. customers - customer records (email, orders, lifetime value)

Reply with a single JSON object and nothing else, shaped exactly like:
{{
  "data_sources": ["orders", "products"],
  "primary_metric": "quantity_sold",
  "aggregations": ["sum", "daily_average"],
  "filters": {{"date_range": "last_90_days", "product_name": "Blue T-Shirt"}},
  "requires_forecast": true,
  "forecast_config": {{"method": "linear_regression", "historical_days": 90, "forecast_days": 30}},
  "group_by": ["product_name", "date"]
}}"#,
        domain = intent.domain,
        time_range = intent.time_range,
        forecast = intent.requires_forecast,
    )
}

/// Lenient plan parsing. Unknown data sources are dropped and invariants are
/// restored through [`Plan::normalized`], which also clamps forecast windows.
pub fn parse_plan(text: &str, settings: &ForecastSettings) -> Result<Plan, ParseError> {
    let map = extract_json_object(text)?;

    let sources = string_list(map.get("data_sources"))
        .iter()
        .filter_map(|s| DataSource::parse(s))
        .collect();
    let metric = str_field(&map, "primary_metric").unwrap_or("quantity_sold");

    let mut plan = Plan::new(sources, metric)
        .with_aggregations(string_list(map.get("aggregations")))
        .with_group_by(string_list(map.get("group_by")));
    plan.filters.extend(string_map(map.get("filters")));
    plan.requires_forecast = map.get("requires_forecast").and_then(Value::as_bool).unwrap_or(false);
    plan.forecast_config = map
        .get("forecast_config")
        .and_then(Value::as_object)
        .map(|cfg| {
            let days = |key: &str, default: u32| {
                cfg.get(key)
                    .and_then(Value::as_u64)
                    .and_then(|d| u32::try_from(d).ok())
                    .filter(|d| *d > 0)
                    .unwrap_or(default)
            };
            ForecastConfig {
                method: ForecastMethod::normalize(str_field(cfg, "method").unwrap_or_default()),
                historical_days: days("historical_days", settings.historical_days),
                forecast_days: days("forecast_days", settings.forecast_days),
            }
        });

    Ok(plan.normalized(settings))
}

/// Deterministic planner: the default plan refined from the intent.
#[derive(Debug, Clone)]
pub struct RulePlanner {
    settings: ForecastSettings,
}

impl RulePlanner {
    pub fn new(settings: ForecastSettings) -> Self {
        Self { settings }
    }

    pub fn plan(&self, _question: &str, intent: &Intent) -> Plan {
        let mut plan = default_plan(intent.domain, &self.settings);

        if let Some(product) = intent.product_name() {
            plan.filters.insert("product_name".into(), product.to_string());
        }
        if intent.domain != Domain::InventoryForecasting && intent.entity("time_period").is_some() {
            plan.filters.insert("date_range".into(), intent.time_range.as_str().to_string());
        }
        plan.requires_forecast |= intent.requires_forecast;

        plan.normalized(&self.settings)
    }
}
