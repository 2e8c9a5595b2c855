//! `shopcast-ai`
//!
//! **Responsibility:** everything that talks to, or stands in for, a model.
//!
//! - [`completion`]: the completion-service boundary, an HTTP adapter and test doubles.
//! - [`parser`]: pulling JSON objects and report queries out of free-form completions.
//! - [`forecast`]: deterministic linear-trend demand forecasting.
//!
//! Nothing in this crate knows about pipeline stages; it only provides the pieces
//! they are built from.

pub mod completion;
pub mod forecast;
pub mod parser;
pub mod result;

pub use completion::{AnthropicCompletion, CompletionService};
pub use forecast::{ForecastEngine, ForecastSet, LinearFit, fit_linear};
pub use result::AiError;
