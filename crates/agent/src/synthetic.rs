//! Demo-mode data: plausible rows synthesized from the shape of the query.

use chrono::{Days, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use shopcast_core::{Plan, Row};

use crate::intent::PRODUCT_CATALOG;

/// `(name, current stock, units sold per day)`
const INVENTORY: [(&str, u32, u32); 5] = [
    ("Blue T-Shirt", 45, 8),
    ("Red Hoodie", 120, 5),
    ("Black Jeans", 15, 12),
    ("White Sneakers", 8, 10),
    ("Green Cap", 200, 3),
];

/// `(email, orders, total spent)`
const CUSTOMERS: [(&str, u32, f64); 5] = [
    ("john.smith@example.com", 5, 450.0),
    ("sarah.jones@example.com", 3, 280.0),
    ("mike.brown@example.com", 7, 620.0),
    ("emma.davis@example.com", 4, 380.0),
    ("alex.wilson@example.com", 2, 190.0),
];

/// `(name, units sold, revenue)`
const RANKING: [(&str, u32, u32); 5] = [
    ("Blue T-Shirt", 680, 13600),
    ("Red Hoodie", 420, 16800),
    ("Black Jeans", 350, 21000),
    ("White Sneakers", 290, 23200),
    ("Green Cap", 180, 3600),
];

/// Which kind of rows a query asks for.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Dataset {
    Inventory,
    Customers,
    Ranking,
    Sales,
}

impl Dataset {
    /// Pick the dataset from the query text, checked in precedence order.
    pub fn for_query(query: &str) -> Self {
        let upper = query.to_ascii_uppercase();
        if upper.contains("INVENTORY") || upper.contains("STOCK") {
            Dataset::Inventory
        } else if upper.contains("CUSTOMER") {
            Dataset::Customers
        } else if upper.contains("LIMIT 5") || upper.contains(" TOP ") {
            Dataset::Ranking
        } else {
            Dataset::Sales
        }
    }
}

/// Synthetic row generator. Each call draws from its own RNG.
#[derive(Debug, Clone)]
pub struct SyntheticData {
    seed: Option<u64>,
    default_historical_days: u32,
}

impl SyntheticData {
    pub fn new(default_historical_days: u32) -> Self {
        Self {
            seed: None,
            default_historical_days,
        }
    }

    /// Make every call replay the same sequence.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    pub fn generate(&self, query: &str, plan: &Plan) -> Vec<Row> {
        match Dataset::for_query(query) {
            Dataset::Inventory => inventory_rows(),
            Dataset::Customers => customer_rows(),
            Dataset::Ranking => {
                let limit = plan
                    .filter("limit")
                    .and_then(|l| l.trim().parse::<usize>().ok())
                    .unwrap_or(RANKING.len());
                ranking_rows(limit)
            }
            Dataset::Sales => {
                let days = plan
                    .forecast_config
                    .map(|c| c.historical_days)
                    .unwrap_or(self.default_historical_days);
                sales_rows(&mut self.rng(), Utc::now().date_naive(), days)
            }
        }
    }
}

fn inventory_rows() -> Vec<Row> {
    INVENTORY
        .iter()
        .map(|(name, stock, velocity)| {
            let days_until_stockout = if *velocity > 0 {
                (*stock as f64 / *velocity as f64 * 10.0).round() / 10.0
            } else {
                999.0
            };
            to_row(json!({
                "product_name": name,
                "inventory_quantity": stock,
                "daily_velocity": velocity,
                "days_until_stockout": days_until_stockout,
            }))
        })
        .collect()
}

fn customer_rows() -> Vec<Row> {
    CUSTOMERS
        .iter()
        .filter(|(_, orders, _)| *orders > 1)
        .map(|(email, orders, spent)| {
            to_row(json!({
                "email": email,
                "orders": orders,
                "total_spent": spent,
            }))
        })
        .collect()
}

fn ranking_rows(limit: usize) -> Vec<Row> {
    RANKING
        .iter()
        .take(limit)
        .map(|(name, quantity, revenue)| {
            to_row(json!({
                "product_name": name,
                "quantity": quantity,
                "revenue": revenue,
            }))
        })
        .collect()
}

/// Daily sales for the first three catalog products, `days + 1` points each
/// ending today: a random base level, a slight upward trend and Gaussian noise.
pub fn sales_rows(rng: &mut impl Rng, today: NaiveDate, days: u32) -> Vec<Row> {
    let start = today.checked_sub_days(Days::new(days as u64)).unwrap_or(today);
    let mut rows = Vec::with_capacity(3 * (days as usize + 1));

    for product in PRODUCT_CATALOG.iter().take(3) {
        let base = rng.gen_range(5..15) as f64;
        for day in 0..=days {
            let date = start.checked_add_days(Days::new(day as u64)).unwrap_or(today);
            let trend = day as f64 * 0.01;
            let noise = gaussian(rng, 0.0, 2.0);
            let quantity = (base + trend + noise).trunc().max(0.0) as u64;
            let price = rng.gen_range(20.0..50.0);
            let total_sales = (quantity as f64 * price * 100.0).round() / 100.0;

            rows.push(to_row(json!({
                "date": date.format("%Y-%m-%d").to_string(),
                "product_name": product,
                "quantity": quantity,
                "total_sales": total_sales,
            })));
        }
    }
    rows
}

/// Box-Muller sample from N(mean, std_dev).
fn gaussian(rng: &mut impl Rng, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = 1.0 - rng.r#gen::<f64>();
    let u2: f64 = rng.r#gen::<f64>();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std_dev * z
}

fn to_row(value: serde_json::Value) -> Row {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Row::new(),
    }
}
