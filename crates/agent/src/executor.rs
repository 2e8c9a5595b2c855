//! Stage 4: query + plan → [`ExecutionResult`], with optional forecasting.

use std::sync::Arc;

use async_trait::async_trait;
use shopcast_ai::ForecastEngine;
use shopcast_core::{BackendError, ExecutionResult, Plan, Row, Settings, ShopCredentials};
use tracing::{info, warn};

use crate::synthetic::SyntheticData;

/// The store's analytics query endpoint.
#[async_trait]
pub trait AnalyticsBackend: Send + Sync {
    async fn run_query(&self, query: &str, credentials: &ShopCredentials) -> Result<Vec<Row>, BackendError>;
}

/// Live-store backend. Querying a real store is not wired up yet; every query
/// returns no rows.
#[derive(Debug, Default, Clone, Copy)]
pub struct StoreAnalyticsBackend;

#[async_trait]
impl AnalyticsBackend for StoreAnalyticsBackend {
    async fn run_query(&self, _query: &str, credentials: &ShopCredentials) -> Result<Vec<Row>, BackendError> {
        warn!(
            shop_domain = %credentials.shop_domain,
            "store analytics API is not implemented; returning no rows"
        );
        Ok(Vec::new())
    }
}

enum RowSource {
    Synthetic(SyntheticData),
    Backend(Arc<dyn AnalyticsBackend>),
}

/// Runs a query against synthetic data or a backend, then forecasts when the plan asks for it.
pub struct QueryExecutor {
    source: RowSource,
    engine: ForecastEngine,
}

impl QueryExecutor {
    /// Demo mode synthesizes rows; otherwise queries go to [`StoreAnalyticsBackend`].
    pub fn from_settings(settings: &Settings) -> Self {
        if settings.demo_mode {
            Self::synthetic(SyntheticData::new(settings.forecast.historical_days), settings)
        } else {
            Self::with_backend(Arc::new(StoreAnalyticsBackend), settings)
        }
    }

    pub fn synthetic(data: SyntheticData, settings: &Settings) -> Self {
        Self {
            source: RowSource::Synthetic(data),
            engine: ForecastEngine::new(settings.forecast),
        }
    }

    pub fn with_backend(backend: Arc<dyn AnalyticsBackend>, settings: &Settings) -> Self {
        Self {
            source: RowSource::Backend(backend),
            engine: ForecastEngine::new(settings.forecast),
        }
    }

    pub fn with_engine(mut self, engine: ForecastEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Never fails; errors come back as an empty result carrying the message.
    pub async fn execute(&self, query: &str, credentials: &ShopCredentials, plan: &Plan) -> ExecutionResult {
        let rows = match &self.source {
            RowSource::Synthetic(data) => data.generate(query, plan),
            RowSource::Backend(backend) => match backend.run_query(query, credentials).await {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(error = %e, shop_domain = %credentials.shop_domain, "query execution failed");
                    return ExecutionResult::failed(e.to_string()).with_query(query);
                }
            },
        };

        if !plan.requires_forecast {
            return ExecutionResult::new(rows, false).with_query(query);
        }

        let forecast_days = plan
            .forecast_config
            .map(|c| c.forecast_days)
            .unwrap_or(self.engine.settings().forecast_days);

        match self.engine.apply(rows, forecast_days) {
            Ok((rows, forecasts)) => {
                info!(products = forecasts.len(), forecast_days, "forecasting applied");
                ExecutionResult::new(rows, true).with_query(query)
            }
            Err(e) => {
                warn!(error = %e, "forecasting failed");
                ExecutionResult::failed(e.to_string()).with_query(query)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shopcast_core::{DataSource, ForecastConfig, ForecastSettings, Forecast, FORECAST_KEY};

    struct FixedBackend(Result<Vec<Row>, BackendError>);

    #[async_trait]
    impl AnalyticsBackend for FixedBackend {
        async fn run_query(&self, _query: &str, _credentials: &ShopCredentials) -> Result<Vec<Row>, BackendError> {
            self.0.clone()
        }
    }

    fn credentials() -> ShopCredentials {
        ShopCredentials {
            shop_domain: "demo.myshopify.com".into(),
            access_token: "shpat_test".into(),
        }
    }

    fn forecast_plan() -> Plan {
        Plan::new(vec![DataSource::Orders], "quantity_sold").with_forecast(ForecastConfig {
            historical_days: 30,
            ..ForecastConfig::default()
        })
    }

    #[tokio::test]
    async fn demo_forecasts_attach_to_every_sales_row() {
        let executor = QueryExecutor::synthetic(SyntheticData::new(90).with_seed(1), &Settings::default());
        let result = executor
            .execute("FROM orders SHOW product_name, SUM(quantity) AS total_quantity", &credentials(), &forecast_plan())
            .await;

        assert!(result.forecast_applied);
        assert_eq!(result.row_count, 3 * 31);
        assert!(result.error.is_none());
        for row in &result.data {
            let forecast = Forecast::from_row(row).expect("every product has 31 observations");
            assert_eq!(forecast.total_needed, forecast.forecast_quantity + forecast.safety_stock);
            assert_eq!(forecast.forecast_days, 30);
        }
    }

    #[tokio::test]
    async fn plans_without_forecast_leave_rows_alone() {
        let executor = QueryExecutor::synthetic(SyntheticData::new(90), &Settings::default());
        let plan = Plan::new(vec![DataSource::Products], "inventory_quantity");
        let result = executor
            .execute("FROM products SHOW product_name, inventory_quantity", &credentials(), &plan)
            .await;

        assert!(!result.forecast_applied);
        assert_eq!(result.row_count, 5);
        assert!(result.data.iter().all(|r| !r.contains_key(FORECAST_KEY)));
        assert_eq!(
            result.query_executed.as_deref(),
            Some("FROM products SHOW product_name, inventory_quantity")
        );
    }

    #[tokio::test]
    async fn backend_errors_become_an_empty_result() {
        let backend = FixedBackend(Err(BackendError::Unavailable("timeout".into())));
        let executor = QueryExecutor::with_backend(Arc::new(backend), &Settings::default());
        let result = executor.execute("FROM orders SHOW x", &credentials(), &forecast_plan()).await;

        assert!(result.data.is_empty());
        assert_eq!(result.row_count, 0);
        assert!(!result.forecast_applied);
        assert_eq!(result.error.as_deref(), Some("analytics backend unavailable: timeout"));
    }

    #[tokio::test]
    async fn placeholder_backend_returns_nothing() {
        let settings = Settings {
            demo_mode: false,
            ..Settings::default()
        };
        let result = QueryExecutor::from_settings(&settings)
            .execute("FROM orders SHOW x", &credentials(), &forecast_plan())
            .await;
        assert!(result.data.is_empty());
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn invalid_forecast_settings_become_an_empty_result() {
        let rows = vec![json!({"product_name": "Green Cap", "quantity": 3})
            .as_object()
            .cloned()
            .unwrap()];
        let executor = QueryExecutor::with_backend(Arc::new(FixedBackend(Ok(rows))), &Settings::default())
            .with_engine(ForecastEngine::new(ForecastSettings {
                safety_stock_multiplier: f64::NAN,
                ..ForecastSettings::default()
            }));
        let result = executor.execute("FROM orders SHOW x", &credentials(), &forecast_plan()).await;

        assert!(result.data.is_empty());
        assert!(result.error.unwrap().contains("safety_stock_multiplier"));
    }
}
