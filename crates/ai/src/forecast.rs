use std::collections::BTreeMap;

use serde_json::Value;
use shopcast_core::{FORECAST_DAYS_RANGE, FORECAST_KEY, Forecast, ForecastSettings, Row, row_f64, row_str};

use crate::result::AiError;

/// Forecasts keyed by product name.
pub type ForecastSet = BTreeMap<String, Forecast>;

/// Ordinary least-squares fit of a series against its zero-based index.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// Coefficient of determination over the observed points, within \[0, 1\].
    pub r_squared: f64,
}

impl LinearFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Fit `ys[i]` against `i`. Pure and deterministic.
pub fn fit_linear(ys: &[f64]) -> LinearFit {
    if ys.is_empty() {
        return LinearFit {
            slope: 0.0,
            intercept: 0.0,
            r_squared: 0.0,
        };
    }

    // Zero variance: flat line through the value, nothing explained.
    if ys.iter().all(|y| *y == ys[0]) {
        return LinearFit {
            slope: 0.0,
            intercept: ys[0],
            r_squared: 0.0,
        };
    }

    let n = ys.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = mean(ys);

    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in ys.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }

    let slope = if den == 0.0 { 0.0 } else { num / den };
    let intercept = y_mean - slope * x_mean;

    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for (i, y) in ys.iter().enumerate() {
        let fitted = slope * i as f64 + intercept;
        ss_res += (y - fitted) * (y - fitted);
        ss_tot += (y - y_mean) * (y - y_mean);
    }

    let r_squared = if ss_tot == 0.0 {
        0.0
    } else {
        (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
    };

    LinearFit {
        slope,
        intercept,
        r_squared,
    }
}

/// Linear-trend demand forecaster.
///
/// Model:
/// - Group rows by `product_name`, reading `quantity` in row order as a daily series.
/// - Fit a straight line and project it `forecast_days` ahead, never below zero.
/// - Add a safety buffer of `safety_stock_multiplier - 1` on top of the projection.
#[derive(Debug, Clone)]
pub struct ForecastEngine {
    settings: ForecastSettings,
    /// Products with fewer observations are skipped.
    min_history: usize,
}

impl ForecastEngine {
    pub fn new(settings: ForecastSettings) -> Self {
        Self {
            settings,
            min_history: 7,
        }
    }

    pub fn with_min_history(mut self, min_history: usize) -> Self {
        self.min_history = min_history;
        self
    }

    pub fn settings(&self) -> &ForecastSettings {
        &self.settings
    }

    fn validate(&self, forecast_days: u32) -> Result<(), AiError> {
        let m = self.settings.safety_stock_multiplier;
        if !(m.is_finite() && m >= 1.0) {
            return Err(AiError::InvalidInput(format!(
                "safety_stock_multiplier must be a finite number >= 1, got {m}"
            )));
        }
        if !FORECAST_DAYS_RANGE.contains(&forecast_days) {
            return Err(AiError::InvalidInput(format!(
                "forecast_days must be within {}..={}, got {forecast_days}",
                FORECAST_DAYS_RANGE.start(),
                FORECAST_DAYS_RANGE.end()
            )));
        }
        if self.min_history < 2 {
            return Err(AiError::InvalidInput(
                "min_history must be >= 2 to fit a trend".to_string(),
            ));
        }
        Ok(())
    }

    /// Forecast one product's quantity series, or `None` if the history is too short.
    pub fn forecast_series(&self, quantities: &[f64], forecast_days: u32) -> Result<Option<Forecast>, AiError> {
        self.validate(forecast_days)?;
        if quantities.len() < self.min_history {
            return Ok(None);
        }

        let fit = fit_linear(quantities);
        let n = quantities.len();
        let projected: f64 = (n..n + forecast_days as usize)
            .map(|x| fit.predict(x as f64).max(0.0))
            .sum();

        let recent = &quantities[n.saturating_sub(30)..];
        let daily_velocity = round_to(mean(recent), 1);

        let forecast_quantity = projected.round();
        let safety_stock = (forecast_quantity * (self.settings.safety_stock_multiplier - 1.0)).round();

        Ok(Some(Forecast {
            daily_velocity,
            forecast_quantity,
            safety_stock,
            total_needed: forecast_quantity + safety_stock,
            forecast_days,
            confidence: fit.r_squared,
        }))
    }

    /// Forecast every product that appears in `rows`.
    pub fn forecast(&self, rows: &[Row], forecast_days: u32) -> Result<ForecastSet, AiError> {
        self.validate(forecast_days)?;

        let mut series: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for row in rows {
            if let Some(product) = row_str(row, "product_name") {
                series
                    .entry(product)
                    .or_default()
                    .push(row_f64(row, "quantity").unwrap_or(0.0));
            }
        }

        let mut out = ForecastSet::new();
        for (product, quantities) in series {
            match self.forecast_series(&quantities, forecast_days)? {
                Some(forecast) => {
                    out.insert(product.to_string(), forecast);
                }
                None => {
                    tracing::debug!(
                        product,
                        observations = quantities.len(),
                        min_history = self.min_history,
                        "skipping product with insufficient history"
                    );
                }
            }
        }
        Ok(out)
    }

    /// Forecast and merge the result into every row of each forecast product.
    ///
    /// Row order and count are preserved; rows of skipped products are untouched.
    pub fn apply(&self, mut rows: Vec<Row>, forecast_days: u32) -> Result<(Vec<Row>, ForecastSet), AiError> {
        let forecasts = self.forecast(&rows, forecast_days)?;

        for row in &mut rows {
            let Some(forecast) = row_str(row, "product_name").and_then(|p| forecasts.get(p)) else {
                continue;
            };
            let value = serde_json::to_value(forecast).unwrap_or(Value::Null);
            row.insert(FORECAST_KEY.to_string(), value);
        }

        tracing::info!(
            products = forecasts.len(),
            rows = rows.len(),
            forecast_days,
            "forecast applied"
        );
        Ok((rows, forecasts))
    }
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / (xs.len() as f64)
}

fn round_to(x: f64, decimals: i32) -> f64 {
    let f = 10f64.powi(decimals);
    (x * f).round() / f
}
