use std::process::{Command, Output};

use serde_json::Value;

fn shopcast(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_shopcast"))
        .args(args)
        .env_remove("ANTHROPIC_API_KEY")
        .env_remove("RUST_LOG")
        .env("DEMO_MODE", "true")
        .env("LOG_LEVEL", "warn")
        .env("LOG_FORMAT", "json")
        .output()
        .expect("failed to run shopcast")
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is a single JSON document")
}

#[test]
fn ask_prints_a_completed_response() {
    let output = shopcast(&["ask", "Which products are low on stock?", "--local"]);
    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));

    let body = stdout_json(&output);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["intent"]["domain"], "inventory_status");
    assert_eq!(
        body["query"],
        "FROM products SHOW product_name, inventory_quantity WHERE inventory_quantity < 50"
    );
    assert_eq!(body["metadata"]["strategy"], "local");
    assert_eq!(body["metadata"]["shop_domain"], "demo.myshopify.com");
    assert_eq!(body["insights"]["key_findings"][0], "3 products have low inventory");
}

#[test]
fn forecast_question_carries_forecasts() {
    let output = shopcast(&[
        "ask",
        "How many Blue T-Shirts will I need next month?",
        "--shop",
        "acme.myshopify.com",
        "--context",
        r#"{"currency": "EUR"}"#,
    ]);
    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));

    let body = stdout_json(&output);
    assert_eq!(body["intent"]["domain"], "inventory_forecasting");
    assert_eq!(body["intent"]["requires_forecast"], true);
    assert_eq!(body["metadata"]["forecast_applied"], true);
    assert_eq!(body["metadata"]["shop_domain"], "acme.myshopify.com");
}

#[test]
fn blank_question_exits_with_the_failure_code() {
    let output = shopcast(&["ask", "  "]);
    assert_eq!(output.status.code(), Some(2));

    let body = stdout_json(&output);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["intent"], serde_json::json!({}));
    assert_eq!(body["error"], "question cannot be empty");
}

#[test]
fn invalid_context_is_a_usage_error() {
    let output = shopcast(&["ask", "top products?", "--context", "[1]"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("--context must be a JSON object"));
}

#[test]
fn invalid_configuration_is_reported() {
    let output = Command::new(env!("CARGO_BIN_EXE_shopcast"))
        .args(["config"])
        .env("FORECAST_DAYS", "0")
        .output()
        .expect("failed to run shopcast");
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid configuration"));
}

#[test]
fn config_redacts_the_api_key() {
    let output = Command::new(env!("CARGO_BIN_EXE_shopcast"))
        .args(["config"])
        .env("ANTHROPIC_API_KEY", "sk-ant-very-secret")
        .env("LOG_FORMAT", "pretty")
        .output()
        .expect("failed to run shopcast");
    assert_eq!(output.status.code(), Some(0));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("sk-ant-very-secret"));
    let body: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(body["completion"]["api_key"], "<redacted>");
    assert_eq!(body["strategy"], "llm");
    assert_eq!(body["log"]["format"], "pretty");
}
