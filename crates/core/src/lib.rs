//! `shopcast-core`: data model shared by every pipeline stage.
//!
//! This crate contains **pure** types (no I/O, no async, no completion service).
//! Closed enumerations normalize unknown input to a default instead of rejecting
//! it, so stages can accept loosely-formed completions without losing type safety.

pub mod config;
pub mod dialect;
pub mod error;
pub mod execution;
pub mod id;
pub mod insights;
pub mod intent;
pub mod plan;
pub mod request;
pub mod response;

pub use config::{
    CompletionSettings, ConfigError, FORECAST_DAYS_RANGE, ForecastSettings, HISTORICAL_DAYS_RANGE, LogFormat,
    LogSettings, Settings,
};
pub use dialect::{DialectError, Field, OrderBy, ReportQuery};
pub use error::{BackendError, ParseError, PipelineError, ServiceError};
pub use execution::{ExecutionResult, FORECAST_KEY, Forecast, Row, row_f64, row_str};
pub use id::RequestId;
pub use insights::Insights;
pub use intent::{Domain, Intent, TimeRange, clamp_unit};
pub use plan::{DataSource, ForecastConfig, ForecastMethod, Plan};
pub use request::{QueryRequest, ShopCredentials};
pub use response::{PipelineResponse, PipelineStatus, ResponseMetadata, Strategy};
