//! `shopcast-agent`
//!
//! **Responsibility:** the five-stage question-answering pipeline.
//!
//! Each stage has a completion-backed variant and a deterministic variant. Stages
//! never fail: any internal error degrades to the documented fallback, so the only
//! failure boundary is the orchestrator.
//!
//! 1. [`intent`]: question → [`Intent`](shopcast_core::Intent)
//! 2. [`planner`]: question + intent → [`Plan`](shopcast_core::Plan)
//! 3. [`generator`]: question + intent + plan → reporting query
//! 4. [`executor`]: query + plan → [`ExecutionResult`](shopcast_core::ExecutionResult), with forecasting
//! 5. [`synthesizer`]: everything above → [`Insights`](shopcast_core::Insights)

pub mod executor;
pub mod generator;
pub mod intent;
pub mod orchestrator;
pub mod planner;
pub mod synthesizer;
pub mod synthetic;

mod lenient;

pub use executor::{AnalyticsBackend, QueryExecutor, StoreAnalyticsBackend};
pub use generator::{QueryGenerator, template_query};
pub use intent::{IntentClassifier, KeywordClassifier};
pub use orchestrator::{
    LlmOrchestrator, LocalOrchestrator, Orchestrator, build_orchestrator, completion_from_settings,
    overall_confidence, process_with_budget,
};
pub use planner::{QueryPlanner, RulePlanner, default_plan};
pub use synthesizer::{InsightSynthesizer, fallback_insights};
pub use synthetic::{Dataset, SyntheticData};
