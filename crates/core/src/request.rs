use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One analytics question, as handed to an orchestrator.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    pub shop_domain: String,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
}

impl QueryRequest {
    pub fn new(
        question: impl Into<String>,
        shop_domain: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            question: question.into(),
            shop_domain: shop_domain.into(),
            access_token: access_token.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn credentials(&self) -> ShopCredentials {
        ShopCredentials {
            shop_domain: self.shop_domain.clone(),
            access_token: self.access_token.clone(),
        }
    }
}

impl core::fmt::Debug for QueryRequest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QueryRequest")
            .field("question", &self.question)
            .field("shop_domain", &self.shop_domain)
            .field("access_token", &"<redacted>")
            .field("context", &self.context)
            .finish()
    }
}

/// Store identity and token handed to the analytics backend.
#[derive(Clone, PartialEq, Eq)]
pub struct ShopCredentials {
    pub shop_domain: String,
    pub access_token: String,
}

impl core::fmt::Debug for ShopCredentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ShopCredentials")
            .field("shop_domain", &self.shop_domain)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_never_contains_the_token() {
        let request = QueryRequest::new("top products?", "demo.myshopify.com", "shpat_secret");
        assert!(!format!("{request:?}").contains("shpat_secret"));
        assert!(!format!("{:?}", request.credentials()).contains("shpat_secret"));
    }
}
