use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::PipelineError;
use crate::id::RequestId;
use crate::insights::Insights;
use crate::intent::Intent;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Completed,
    Failed,
}

/// Which orchestrator strategy answered the request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Every stage consults the completion service.
    Llm,
    /// Keyword and template rules only.
    Local,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Llm => "llm",
            Strategy::Local => "local",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub request_id: RequestId,
    pub shop_domain: String,
    pub data_points: usize,
    pub forecast_applied: bool,
    pub strategy: Strategy,
}

/// Final answer for one request, built exactly once by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResponse {
    pub status: PipelineStatus,
    /// Absent only on failure; serialized as `{}` then.
    #[serde(
        serialize_with = "intent_or_empty_object",
        deserialize_with = "intent_from_object",
        default
    )]
    pub intent: Option<Intent>,
    pub query: String,
    pub insights: Insights,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineResponse {
    /// Valid-shaped empty response for a request that could not be processed.
    pub fn failed(error: &PipelineError) -> Self {
        Self {
            status: PipelineStatus::Failed,
            intent: None,
            query: String::new(),
            insights: Insights::failure(),
            confidence: 0.0,
            metadata: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == PipelineStatus::Completed
    }
}

fn intent_or_empty_object<S: Serializer>(intent: &Option<Intent>, s: S) -> Result<S::Ok, S::Error> {
    match intent {
        Some(intent) => intent.serialize(s),
        None => serde_json::Map::new().serialize(s),
    }
}

fn intent_from_object<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Intent>, D::Error> {
    match Value::deserialize(d)? {
        Value::Null => Ok(None),
        Value::Object(map) if map.is_empty() => Ok(None),
        other => serde_json::from_value(other)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
