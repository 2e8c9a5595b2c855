use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Business-readable answer to a question. Terminal artifact of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insights {
    pub summary: String,
    #[serde(default)]
    pub key_findings: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub data_summary: Map<String, Value>,
}

impl Insights {
    /// Fixed answer for a query that matched no data.
    pub fn no_data() -> Self {
        let mut data_summary = Map::new();
        data_summary.insert("total_rows".into(), json!(0));
        data_summary.insert("status".into(), json!("no_data"));

        Self {
            summary: "No data found for this query".to_string(),
            key_findings: vec![
                "No matching data was found in your store".to_string(),
                "Try adjusting the time range or product filters".to_string(),
            ],
            recommendations: vec![
                "Check if the product name is spelled correctly".to_string(),
                "Try expanding the date range for your query".to_string(),
            ],
            data_summary,
        }
    }

    /// Stub carried by a failed pipeline response.
    pub fn failure() -> Self {
        Self {
            summary: "Failed to process query".to_string(),
            key_findings: Vec::new(),
            recommendations: Vec::new(),
            data_summary: Map::new(),
        }
    }

    /// Overwrite `data_summary.total_rows` with the true row count.
    pub fn with_total_rows(mut self, total_rows: usize) -> Self {
        self.data_summary.insert("total_rows".into(), json!(total_rows));
        self
    }

    pub fn total_rows(&self) -> Option<u64> {
        self.data_summary.get("total_rows").and_then(Value::as_u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_data_insights_report_zero_rows() {
        let insights = Insights::no_data();
        assert_eq!(insights.total_rows(), Some(0));
        assert_eq!(insights.data_summary["status"], "no_data");
        assert_eq!(insights.key_findings.len(), 2);
        assert_eq!(insights.recommendations.len(), 2);
    }

    #[test]
    fn total_rows_is_overwritten() {
        let mut insights = Insights::failure();
        insights.data_summary.insert("total_rows".into(), json!(999));
        assert_eq!(insights.with_total_rows(12).total_rows(), Some(12));
    }
}
