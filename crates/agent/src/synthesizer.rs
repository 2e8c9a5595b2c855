//! Stage 5: results → business-readable [`Insights`].

use std::sync::Arc;

use serde_json::{Value, json};
use shopcast_ai::CompletionService;
use shopcast_ai::parser::{extract_json_object, truncate_for_log};
use shopcast_core::{
    ExecutionResult, FORECAST_KEY, Forecast, Insights, Intent, ParseError, Plan, Row, row_f64, row_str,
};
use tracing::warn;

use crate::lenient::{str_field, string_list};

const MAX_TOKENS: u32 = 2000;
const LOW_STOCK: f64 = 50.0;

/// Completion-backed synthesizer.
pub struct InsightSynthesizer {
    completion: Arc<dyn CompletionService>,
}

impl InsightSynthesizer {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self { completion }
    }

    /// Never fails; falls back to [`fallback_insights`] when the model is unusable.
    pub async fn synthesize(
        &self,
        question: &str,
        intent: &Intent,
        _plan: &Plan,
        _query: &str,
        result: &ExecutionResult,
    ) -> Insights {
        if result.is_empty() {
            return Insights::no_data();
        }

        let prompt = synthesis_prompt(question, intent, &result.data);
        let reply = match self.completion.complete(&prompt, MAX_TOKENS).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(service = self.completion.name(), error = %e, "insight synthesis failed; using rule-based insights");
                return fallback_insights(result);
            }
        };

        match parse_insights(&reply) {
            Ok(insights) => insights.with_total_rows(result.data.len()),
            Err(e) => {
                warn!(error = %e, response = %truncate_for_log(&reply, 200), "unparsable insights; using rule-based insights");
                fallback_insights(result)
            }
        }
    }
}

fn synthesis_prompt(question: &str, intent: &Intent, rows: &[Row]) -> String {
    let forecasts = forecast_details(rows);
    let forecasts = if forecasts.is_empty() {
        "No forecasting applied".to_string()
    } else {
        forecasts
    };

    format!(
        r#"Turn these store analytics results into insights a store owner can act on right away.

Question: "{question}"
Domain: {domain}

Data:
{data}

Forecast:
{forecasts}

Style:
- Plain everyday language, no statistics jargon
- Round numbers so they read naturally ("about 8" rather than 8.3)
- Explain any calculation in simple terms
- Address the owner as "you" and focus on what to do next

Reply with a single JSON object and nothing else, shaped exactly like:
{{
  "summary": "One sentence that answers the question",
  "key_findings": ["First finding", "Second finding"],
  "recommendations": ["First recommendation", "Second recommendation"],
  "data_summary": {{"total_products": 5, "date_range": "last 7 days", "key_metric": "units sold"}}
}}"#,
        domain = intent.domain,
        data = summarize_rows(rows),
    )
}

/// One line per row for the first five rows, then a count of the rest.
pub fn summarize_rows(rows: &[Row]) -> String {
    let mut lines: Vec<String> = rows.iter().take(5).filter_map(describe_row).collect();
    if rows.len() > 5 {
        lines.push(format!("... and {} more rows", rows.len() - 5));
    }
    if lines.is_empty() {
        return serde_json::to_string(&rows.iter().take(3).collect::<Vec<_>>()).unwrap_or_default();
    }
    lines.join("\n")
}

fn describe_row(row: &Row) -> Option<String> {
    if let Some(forecast) = Forecast::from_row(row) {
        let product = row_str(row, "product_name").unwrap_or("Unknown");
        return Some(format!(
            "- {product}: daily velocity {} units, needs {} units for the next {} days",
            fmt_num(forecast.daily_velocity),
            fmt_num(forecast.total_needed),
            forecast.forecast_days
        ));
    }
    if let (Some(product), Some(quantity)) = (row_str(row, "product_name"), row_f64(row, "quantity")) {
        return Some(format!("- {product}: {} units sold", fmt_num(quantity)));
    }
    if let (Some(product), Some(stock)) = (row_str(row, "product_name"), row_f64(row, "inventory_quantity")) {
        return Some(format!("- {product}: {} units in stock", fmt_num(stock)));
    }
    if let Some(orders) = row_f64(row, "orders") {
        let email = customer_email(row).unwrap_or("unknown");
        return Some(format!("- Customer {email}: {} orders", fmt_num(orders)));
    }
    None
}

/// Forecast lines for up to three distinct products.
fn forecast_details(rows: &[Row]) -> String {
    let forecasts = distinct_forecasts(rows, 3);
    if forecasts.is_empty() {
        return String::new();
    }
    let mut lines = vec!["Forecasting applied:".to_string()];
    lines.extend(forecasts.iter().map(|(product, f)| {
        format!(
            "- {product}: {} units needed ({} projected + {} safety stock)",
            fmt_num(f.total_needed),
            fmt_num(f.forecast_quantity),
            fmt_num(f.safety_stock)
        )
    }));
    lines.join("\n")
}

fn parse_insights(text: &str) -> Result<Insights, ParseError> {
    let map = extract_json_object(text)?;
    Ok(Insights {
        summary: str_field(&map, "summary").unwrap_or("Analysis completed").to_string(),
        key_findings: string_list(map.get("key_findings")),
        recommendations: string_list(map.get("recommendations")),
        data_summary: map
            .get("data_summary")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
    })
}

/// Rule-based insights, keyed by the shape of the first row.
pub fn fallback_insights(result: &ExecutionResult) -> Insights {
    let rows = &result.data;
    let Some(first) = rows.first() else {
        return Insights::no_data();
    };

    let mut findings = Vec::new();
    let mut recommendations = Vec::new();

    if first.contains_key(FORECAST_KEY) {
        for (product, forecast) in distinct_forecasts(rows, 3) {
            findings.push(format!(
                "You sell about {} {} per day",
                fmt_num(forecast.daily_velocity.round()),
                plural(&product)
            ));
            recommendations.push(format!(
                "Order approximately {} units of {product} for the next {} days",
                fmt_num(forecast.total_needed),
                forecast.forecast_days
            ));
        }
    } else if first.contains_key("inventory_quantity") {
        let low: Vec<&Row> = rows
            .iter()
            .filter(|r| row_f64(r, "inventory_quantity").unwrap_or(0.0) < LOW_STOCK)
            .collect();
        if !low.is_empty() {
            findings.push(format!("{} products have low inventory", low.len()));
            for row in low.iter().take(2) {
                let product = row_str(row, "product_name").unwrap_or("Unknown");
                let stock = row_f64(row, "inventory_quantity").unwrap_or(0.0);
                findings.push(format!("{product} has only {} units in stock", fmt_num(stock)));
                recommendations.push(format!("Restock {product} soon to avoid running out"));
            }
        }
    } else if first.contains_key("quantity") {
        let total: f64 = rows.iter().map(|r| row_f64(r, "quantity").unwrap_or(0.0)).sum();
        findings.push(format!("Total of {} units sold", fmt_num(total)));
        if let Some((product, units)) = top_seller(rows) {
            findings.push(format!("{product} is your top seller with {} units", fmt_num(units)));
        }
    } else if first.contains_key("orders") {
        let repeat = rows
            .iter()
            .filter(|r| row_f64(r, "orders").unwrap_or(0.0) > 1.0)
            .count();
        findings.push(format!("{repeat} customers placed repeat orders"));
        let busiest = rows
            .iter()
            .filter_map(|r| Some((customer_email(r)?, row_f64(r, "orders")?)))
            .fold(None::<(&str, f64)>, |best, cur| match best {
                Some(b) if b.1 >= cur.1 => Some(b),
                _ => Some(cur),
            });
        if let Some((email, orders)) = busiest {
            findings.push(format!("{email} is your most frequent buyer with {} orders", fmt_num(orders)));
        }
    }

    if findings.is_empty() {
        findings.push("Data retrieved successfully".to_string());
    }
    if recommendations.is_empty() {
        recommendations.push("Review the data to identify trends".to_string());
    }

    let mut data_summary = serde_json::Map::new();
    data_summary.insert("total_rows".into(), json!(rows.len()));
    data_summary.insert("forecast_applied".into(), json!(result.forecast_applied));

    Insights {
        summary: format!("Found {} results for your query", rows.len()),
        key_findings: findings,
        recommendations,
        data_summary,
    }
}

/// First `limit` distinct products carrying a forecast, in row order.
fn distinct_forecasts(rows: &[Row], limit: usize) -> Vec<(&str, Forecast)> {
    let mut out: Vec<(&str, Forecast)> = Vec::new();
    for row in rows {
        if out.len() == limit {
            break;
        }
        let product = row_str(row, "product_name").unwrap_or("Unknown");
        if out.iter().any(|(p, _)| *p == product) {
            continue;
        }
        if let Some(forecast) = Forecast::from_row(row) {
            out.push((product, forecast));
        }
    }
    out
}

/// Product with the greatest summed quantity; ties go to the first seen.
fn top_seller(rows: &[Row]) -> Option<(&str, f64)> {
    let mut totals: Vec<(&str, f64)> = Vec::new();
    for row in rows {
        let Some(product) = row_str(row, "product_name") else {
            continue;
        };
        let quantity = row_f64(row, "quantity").unwrap_or(0.0);
        match totals.iter_mut().find(|(p, _)| *p == product) {
            Some((_, sum)) => *sum += quantity,
            None => totals.push((product, quantity)),
        }
    }
    totals
        .into_iter()
        .fold(None, |best: Option<(&str, f64)>, cur| match best {
            Some(b) if b.1 >= cur.1 => Some(b),
            _ => Some(cur),
        })
}

fn customer_email(row: &Row) -> Option<&str> {
    row_str(row, "email").or_else(|| row_str(row, "customer_email"))
}

fn plural(name: &str) -> String {
    if name.ends_with(['s', 'S']) {
        name.to_string()
    } else {
        format!("{name}s")
    }
}

/// Whole numbers without a fractional part, everything else to one decimal.
fn fmt_num(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{}", x as i64)
    } else {
        format!("{x:.1}")
    }
}
