//! Stage 1: question → [`Intent`].

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::Value;
use shopcast_ai::CompletionService;
use shopcast_ai::parser::{extract_json_object, truncate_for_log};
use shopcast_core::{Domain, Intent, ParseError, TimeRange};
use tracing::warn;

use crate::lenient::{str_field, string_map};

const MAX_TOKENS: u32 = 1000;

/// Completion-backed classifier.
pub struct IntentClassifier {
    completion: Arc<dyn CompletionService>,
}

impl IntentClassifier {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self { completion }
    }

    /// Never fails; any service or parse error yields [`Intent::fallback`].
    pub async fn classify(&self, question: &str) -> Intent {
        let reply = match self.completion.complete(&classification_prompt(question), MAX_TOKENS).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(service = self.completion.name(), error = %e, "intent classification failed; using fallback intent");
                return Intent::fallback();
            }
        };

        parse_intent(&reply).unwrap_or_else(|e| {
            warn!(error = %e, response = %truncate_for_log(&reply, 200), "unparsable intent; using fallback intent");
            Intent::fallback()
        })
    }
}

fn classification_prompt(question: &str) -> String {
    format!(
        r#"Classify the intent of this store analytics question.

Question: "{question}"

Domains:
1. inventory_forecasting - how much stock will be needed, reorder quantities, stock planning
2. inventory_status - current stock levels, sold-out items, availability
3. sales_analysis - sales performance, revenue, units sold
4. customer_analysis - customer behaviour, repeat purchases, loyalty
5. product_ranking - best or worst products, comparisons, rankings

Reply with a single JSON object and nothing else, shaped exactly like:
{{
  "domain": "inventory_forecasting",
  "confidence": 0.92,
  "entities": {{"product_name": "Blue T-Shirt", "time_period": "next month"}},
  "time_range": "next_30_days",
  "requires_forecast": true
}}

- domain: one of the five domains above
- confidence: number between 0 and 1
- entities: products, time periods or metrics named in the question
- time_range: one of last_7_days, last_30_days, last_90_days, next_7_days, next_30_days
- requires_forecast: true when the question asks about the future"#
    )
}

/// Lenient intent parsing: unknown domains and ranges fall back to defaults,
/// confidence is clamped, missing fields are filled in.
pub fn parse_intent(text: &str) -> Result<Intent, ParseError> {
    let map = extract_json_object(text)?;

    let domain = match str_field(&map, "domain") {
        Some(raw) => Domain::parse(raw).unwrap_or_else(|| {
            warn!(domain = raw, "unknown intent domain; defaulting to sales_analysis");
            Domain::default()
        }),
        None => Domain::default(),
    };
    let confidence = map.get("confidence").and_then(Value::as_f64).unwrap_or(0.5);

    let mut intent = Intent::new(domain, confidence)
        .with_time_range(str_field(&map, "time_range").map(TimeRange::normalize).unwrap_or_default())
        .with_forecast(map.get("requires_forecast").and_then(Value::as_bool).unwrap_or(false));
    intent.entities.extend(string_map(map.get("entities")));
    Ok(intent)
}

/// Products the keyword classifier recognizes by name.
pub const PRODUCT_CATALOG: [&str; 5] = ["Blue T-Shirt", "Red Hoodie", "Black Jeans", "White Sneakers", "Green Cap"];

static FORECAST_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(forecast\w*|predict\w*|projection\w*|reorder\w*|restock\w*|demand|will i need|going to sell|need\s+(for\s+)?next)\b")
        .expect("valid regex")
});
static STOCK_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(stock|stocks|in stock|inventory|inventories|available|availability|sold out|run(ning)? out)\b")
        .expect("valid regex")
});
static CUSTOMER_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(customers?|repeat|loyal\w*|buyers?|shoppers?|clients?)\b").expect("valid regex")
});
static RANKING_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(top|best|worst|bottom|most popular|rank\w*|highest|lowest)\b").expect("valid regex")
});
static TIME_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(last|next|past)\s+(?:(\d+)\s+)?(day|week|month|quarter|year)s?\b").expect("valid regex")
});

/// Deterministic classifier: keyword rules in precedence order, no external calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, question: &str) -> Intent {
        let (domain, confidence) = if FORECAST_WORDS.is_match(question) {
            (Domain::InventoryForecasting, 0.85)
        } else if STOCK_WORDS.is_match(question) {
            (Domain::InventoryStatus, 0.8)
        } else if CUSTOMER_WORDS.is_match(question) {
            (Domain::CustomerAnalysis, 0.8)
        } else if RANKING_WORDS.is_match(question) {
            (Domain::ProductRanking, 0.8)
        } else {
            (Domain::SalesAnalysis, 0.6)
        };
        let forecasting = domain == Domain::InventoryForecasting;

        let mut intent = Intent::new(domain, confidence).with_forecast(forecasting);
        if let Some(product) = match_product(question) {
            intent = intent.with_entity("product_name", product);
        }

        let time_range = match time_phrase(question) {
            Some((phrase, range)) => {
                intent = intent.with_entity("time_period", phrase);
                range
            }
            None if forecasting => TimeRange::Next30Days,
            None => TimeRange::Last30Days,
        };
        intent.with_time_range(time_range)
    }
}

/// Lowercase alphanumerics only, so "Blue T-Shirts" and "blue tshirt" compare equal.
fn fold(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn match_product(question: &str) -> Option<&'static str> {
    let folded = fold(question);
    PRODUCT_CATALOG.into_iter().find(|p| folded.contains(&fold(p)))
}

fn time_phrase(question: &str) -> Option<(String, TimeRange)> {
    let caps = TIME_PHRASE.captures(question)?;
    let direction = caps.get(1)?.as_str().to_ascii_lowercase();
    let count: u32 = caps.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(1);
    let unit_days: u32 = match caps.get(3)?.as_str().to_ascii_lowercase().as_str() {
        "day" => 1,
        "week" => 7,
        "month" => 30,
        "quarter" => 90,
        _ => 365,
    };
    let phrase = caps.get(0)?.as_str().to_ascii_lowercase();
    let range = TimeRange::from_window(count.saturating_mul(unit_days), direction == "next");
    Some((phrase, range))
}
