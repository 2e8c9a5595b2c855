//! Pipeline orchestration: the one place a request can fail.
//!
//! Both strategies run the same stage sequence; they differ only in how each stage is
//! answered. A request fails on a blank question, on a panic escaping any stage,
//! or when [`process_with_budget`] runs out of time. Everything else degrades
//! inside the stage that hit it.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use shopcast_ai::parser::truncate_for_log;
use shopcast_ai::{AnthropicCompletion, CompletionService};
use shopcast_core::{
    ExecutionResult, Insights, Intent, PipelineError, PipelineResponse, PipelineStatus, Plan, QueryRequest,
    RequestId, ResponseMetadata, Settings, Strategy, clamp_unit,
};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::executor::QueryExecutor;
use crate::generator::{QueryGenerator, template_query};
use crate::intent::{IntentClassifier, KeywordClassifier};
use crate::planner::{QueryPlanner, RulePlanner};
use crate::synthesizer::{InsightSynthesizer, fallback_insights};

/// Answers one analytics question end to end.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    fn strategy(&self) -> Strategy;

    /// Never fails at the type level; failures come back as `status = failed`.
    async fn process_query(&self, request: &QueryRequest) -> PipelineResponse;
}

/// `0.6 × intent confidence + 0.4 × data factor`, clamped to \[0, 1\].
pub fn overall_confidence(intent_confidence: f64, has_data: bool) -> f64 {
    let data_factor = if has_data { 1.0 } else { 0.5 };
    clamp_unit(0.6 * intent_confidence + 0.4 * data_factor)
}

/// The four stages that differ between strategies. Execution is shared.
#[async_trait]
trait Stages: Send + Sync {
    async fn classify(&self, question: &str) -> Intent;
    async fn plan(&self, question: &str, intent: &Intent) -> Plan;
    async fn generate(&self, question: &str, intent: &Intent, plan: &Plan) -> String;
    async fn synthesize(
        &self,
        question: &str,
        intent: &Intent,
        plan: &Plan,
        query: &str,
        result: &ExecutionResult,
    ) -> Insights;
}

/// Every stage consults the completion service.
pub struct LlmOrchestrator {
    classifier: IntentClassifier,
    planner: QueryPlanner,
    generator: QueryGenerator,
    synthesizer: InsightSynthesizer,
    executor: QueryExecutor,
}

impl LlmOrchestrator {
    pub fn new(completion: Arc<dyn CompletionService>, settings: &Settings) -> Self {
        Self {
            classifier: IntentClassifier::new(completion.clone()),
            planner: QueryPlanner::new(completion.clone(), settings.forecast),
            generator: QueryGenerator::new(completion.clone()),
            synthesizer: InsightSynthesizer::new(completion),
            executor: QueryExecutor::from_settings(settings),
        }
    }

    pub fn with_executor(mut self, executor: QueryExecutor) -> Self {
        self.executor = executor;
        self
    }
}

#[async_trait]
impl Stages for LlmOrchestrator {
    async fn classify(&self, question: &str) -> Intent {
        self.classifier.classify(question).await
    }

    async fn plan(&self, question: &str, intent: &Intent) -> Plan {
        self.planner.plan(question, intent).await
    }

    async fn generate(&self, question: &str, intent: &Intent, plan: &Plan) -> String {
        self.generator.generate(question, intent, plan).await
    }

    async fn synthesize(
        &self,
        question: &str,
        intent: &Intent,
        plan: &Plan,
        query: &str,
        result: &ExecutionResult,
    ) -> Insights {
        self.synthesizer.synthesize(question, intent, plan, query, result).await
    }
}

#[async_trait]
impl Orchestrator for LlmOrchestrator {
    fn strategy(&self) -> Strategy {
        Strategy::Llm
    }

    async fn process_query(&self, request: &QueryRequest) -> PipelineResponse {
        guarded(self, &self.executor, Strategy::Llm, request).await
    }
}

/// Keyword and template rules only; needs no completion service.
pub struct LocalOrchestrator {
    classifier: KeywordClassifier,
    planner: RulePlanner,
    executor: QueryExecutor,
}

impl LocalOrchestrator {
    pub fn new(settings: &Settings) -> Self {
        Self {
            classifier: KeywordClassifier::new(),
            planner: RulePlanner::new(settings.forecast),
            executor: QueryExecutor::from_settings(settings),
        }
    }

    pub fn with_executor(mut self, executor: QueryExecutor) -> Self {
        self.executor = executor;
        self
    }
}

#[async_trait]
impl Stages for LocalOrchestrator {
    async fn classify(&self, question: &str) -> Intent {
        self.classifier.classify(question)
    }

    async fn plan(&self, question: &str, intent: &Intent) -> Plan {
        self.planner.plan(question, intent)
    }

    async fn generate(&self, _question: &str, intent: &Intent, plan: &Plan) -> String {
        template_query(intent, plan)
    }

    async fn synthesize(
        &self,
        _question: &str,
        _intent: &Intent,
        _plan: &Plan,
        _query: &str,
        result: &ExecutionResult,
    ) -> Insights {
        fallback_insights(result)
    }
}

#[async_trait]
impl Orchestrator for LocalOrchestrator {
    fn strategy(&self) -> Strategy {
        Strategy::Local
    }

    async fn process_query(&self, request: &QueryRequest) -> PipelineResponse {
        guarded(self, &self.executor, Strategy::Local, request).await
    }
}

/// LLM strategy when a completion service is supplied, local otherwise.
pub fn build_orchestrator(
    settings: &Settings,
    completion: Option<Arc<dyn CompletionService>>,
) -> Arc<dyn Orchestrator> {
    match completion {
        Some(completion) => Arc::new(LlmOrchestrator::new(completion, settings)),
        None => Arc::new(LocalOrchestrator::new(settings)),
    }
}

/// A Messages-API client, if a usable API key is configured.
pub fn completion_from_settings(settings: &Settings) -> Option<Arc<dyn CompletionService>> {
    settings.completion.credential()?;
    match AnthropicCompletion::new(settings.completion.clone()) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            warn!(error = %e, "completion client unavailable; falling back to local strategy");
            None
        }
    }
}

/// Run `request` under a wall-clock budget.
pub async fn process_with_budget(
    orchestrator: &dyn Orchestrator,
    request: &QueryRequest,
    budget: Duration,
) -> PipelineResponse {
    match tokio::time::timeout(budget, orchestrator.process_query(request)).await {
        Ok(response) => response,
        Err(_) => {
            let err = PipelineError::Timeout(budget);
            error!(
                error = %err,
                shop_domain = %request.shop_domain,
                strategy = orchestrator.strategy().as_str(),
                "pipeline_failed"
            );
            PipelineResponse::failed(&err)
        }
    }
}

async fn guarded<S: Stages>(
    stages: &S,
    executor: &QueryExecutor,
    strategy: Strategy,
    request: &QueryRequest,
) -> PipelineResponse {
    let request_id = RequestId::new();
    let span = info_span!(
        "pipeline",
        request_id = %request_id,
        shop_domain = %request.shop_domain,
        strategy = strategy.as_str()
    );

    let outcome = AssertUnwindSafe(run_pipeline(stages, executor, strategy, request_id, request))
        .catch_unwind()
        .instrument(span.clone())
        .await;

    let err = match outcome {
        Ok(Ok(response)) => return response,
        Ok(Err(err)) => err,
        Err(payload) => PipelineError::Panicked(panic_message(payload.as_ref())),
    };
    span.in_scope(|| error!(error = %err, "pipeline_failed"));
    PipelineResponse::failed(&err)
}

async fn run_pipeline<S: Stages>(
    stages: &S,
    executor: &QueryExecutor,
    strategy: Strategy,
    request_id: RequestId,
    request: &QueryRequest,
) -> Result<PipelineResponse, PipelineError> {
    let question = request.question.trim();
    if question.is_empty() {
        return Err(PipelineError::EmptyQuestion);
    }

    let intent = stages.classify(question).await;
    info!(
        question = %truncate_for_log(question, 100),
        domain = %intent.domain,
        confidence = intent.confidence,
        requires_forecast = intent.requires_forecast,
        "intent_classified"
    );

    let plan = stages.plan(question, &intent).await;
    if plan.requires_forecast != intent.requires_forecast {
        debug!(
            intent = intent.requires_forecast,
            plan = plan.requires_forecast,
            "plan overrides intent on forecasting"
        );
    }
    info!(
        data_sources = plan.data_sources.len(),
        primary_metric = %plan.primary_metric,
        requires_forecast = plan.requires_forecast,
        "query_planned"
    );

    let query = stages.generate(question, &intent, &plan).await;
    info!(query = %query, "query_generated");

    let result = executor.execute(&query, &request.credentials(), &plan).await;
    info!(row_count = result.row_count, forecast_applied = result.forecast_applied, "query_executed");

    let insights = stages.synthesize(question, &intent, &plan, &query, &result).await;
    info!(findings = insights.key_findings.len(), "insights_synthesized");

    let confidence = overall_confidence(intent.confidence, !result.is_empty());
    info!(confidence, "pipeline_completed");

    Ok(PipelineResponse {
        status: PipelineStatus::Completed,
        metadata: Some(ResponseMetadata {
            request_id,
            shop_domain: request.shop_domain.clone(),
            data_points: result.row_count,
            forecast_applied: result.forecast_applied,
            strategy,
        }),
        intent: Some(intent),
        query,
        insights,
        confidence,
        error: None,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticData;
    use shopcast_ai::completion::testing::{FailingCompletion, PanickingCompletion, SlowCompletion};
    use shopcast_core::Domain;

    fn request(question: &str) -> QueryRequest {
        QueryRequest::new(question, "demo.myshopify.com", "shpat_test")
    }

    fn local() -> LocalOrchestrator {
        let settings = Settings::default();
        LocalOrchestrator::new(&settings)
            .with_executor(QueryExecutor::synthetic(SyntheticData::new(90).with_seed(3), &settings))
    }

    #[test]
    fn confidence_blends_intent_and_data() {
        assert!((overall_confidence(0.9, true) - 0.94).abs() < 1e-9);
        assert!((overall_confidence(0.5, false) - 0.5).abs() < 1e-9);
        assert_eq!(overall_confidence(2.0, true), 1.0);
        assert_eq!(overall_confidence(-3.0, false), 0.0);
    }

    #[test]
    fn strategy_follows_the_completion_service() {
        let settings = Settings::default();
        assert_eq!(build_orchestrator(&settings, None).strategy(), Strategy::Local);
        let completion: Arc<dyn CompletionService> = Arc::new(FailingCompletion::default());
        assert_eq!(build_orchestrator(&settings, Some(completion)).strategy(), Strategy::Llm);
    }

    #[test]
    fn placeholder_keys_yield_no_completion_service() {
        let mut settings = Settings::default();
        assert!(completion_from_settings(&settings).is_none());

        settings.completion.api_key = Some("your_anthropic_api_key_here".into());
        assert!(completion_from_settings(&settings).is_none());

        settings.completion.api_key = Some("sk-ant-test".into());
        assert_eq!(completion_from_settings(&settings).map(|c| c.name()), Some("anthropic"));
    }

    #[tokio::test]
    async fn blank_questions_fail() {
        let response = local().process_query(&request("   ")).await;
        assert_eq!(response.status, PipelineStatus::Failed);
        assert_eq!(response.error.as_deref(), Some("question cannot be empty"));
        assert!(response.intent.is_none());
        assert!(response.metadata.is_none());
        assert_eq!(response.insights, Insights::failure());
    }

    #[tokio::test]
    async fn local_pipeline_fills_in_metadata() {
        let response = local().process_query(&request("Which products are low on stock?")).await;

        assert!(response.is_completed());
        assert_eq!(response.intent.as_ref().map(|i| i.domain), Some(Domain::InventoryStatus));
        assert_eq!(
            response.query,
            "FROM products SHOW product_name, inventory_quantity WHERE inventory_quantity < 50"
        );
        let metadata = response.metadata.unwrap();
        assert_eq!(metadata.strategy, Strategy::Local);
        assert_eq!(metadata.shop_domain, "demo.myshopify.com");
        assert_eq!(metadata.data_points, 5);
        assert!(!metadata.forecast_applied);
        assert_eq!(response.insights.total_rows(), Some(5));
    }

    #[tokio::test]
    async fn panics_become_failed_responses() {
        let orchestrator = LlmOrchestrator::new(Arc::new(PanickingCompletion), &Settings::default());
        let response = orchestrator.process_query(&request("top products?")).await;

        assert_eq!(response.status, PipelineStatus::Failed);
        assert_eq!(
            response.error.as_deref(),
            Some("pipeline stage panicked: completion service blew up")
        );
        assert_eq!(response.query, "");
        assert_eq!(response.confidence, 0.0);
    }

    #[tokio::test]
    async fn slow_requests_hit_the_budget() {
        let orchestrator = LlmOrchestrator::new(
            Arc::new(SlowCompletion::new(Duration::from_secs(30), "{}")),
            &Settings::default(),
        );
        let response = process_with_budget(&orchestrator, &request("top products?"), Duration::from_secs(1)).await;

        assert_eq!(response.status, PipelineStatus::Failed);
        assert_eq!(response.error.as_deref(), Some("request exceeded its time budget of 1s"));
    }

    #[test]
    fn panic_payloads_are_readable() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42_u8), "unknown panic");
    }
}
