//! `shopcast` command line: answer one analytics question and print the response.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value, json};
use shopcast_agent::{LocalOrchestrator, Orchestrator, build_orchestrator, completion_from_settings, process_with_budget};
use shopcast_core::{LogFormat, QueryRequest, Settings};
use tracing::info;

/// Exit code for a request that came back `status = failed`.
pub const EXIT_FAILED: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "shopcast")]
#[command(about = "Answer store analytics questions with insights and demand forecasts")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Ask one question and print the pipeline response as JSON
    Ask {
        /// The question, in plain language
        question: String,

        /// Store domain
        #[arg(long, env = "SHOP_DOMAIN", default_value = "demo.myshopify.com")]
        shop: String,

        /// Store access token
        #[arg(long, env = "SHOP_ACCESS_TOKEN", default_value = "", hide_env_values = true)]
        token: String,

        /// Extra request context as a JSON object
        #[arg(long)]
        context: Option<String>,

        /// Use keyword rules and templates even when an API key is configured
        #[arg(long)]
        local: bool,

        /// Pretty-print the response
        #[arg(long)]
        pretty: bool,
    },

    /// Print the effective configuration with secrets redacted
    Config,
}

pub async fn run(cli: Cli) -> Result<ExitCode> {
    let settings = Settings::from_env().context("invalid configuration")?;
    shopcast_observability::init(&settings.log);

    match cli.command {
        Commands::Ask {
            question,
            shop,
            token,
            context,
            local,
            pretty,
        } => {
            let mut request = QueryRequest::new(question, shop, token);
            if let Some(raw) = context {
                request = request.with_context(parse_context(&raw)?);
            }

            let orchestrator: Arc<dyn Orchestrator> = if local {
                Arc::new(LocalOrchestrator::new(&settings))
            } else {
                build_orchestrator(&settings, completion_from_settings(&settings))
            };
            info!(
                strategy = orchestrator.strategy().as_str(),
                demo_mode = settings.demo_mode,
                "answering question"
            );

            let response = process_with_budget(orchestrator.as_ref(), &request, settings.agent_timeout).await;
            print_json(&serde_json::to_value(&response)?, pretty)?;

            Ok(if response.is_completed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_FAILED)
            })
        }
        Commands::Config => {
            print_json(&config_json(&settings), true)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// `--context` must be a JSON object.
pub fn parse_context(raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw).context("--context is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("--context must be a JSON object, got {other}"),
    }
}

/// Effective settings as JSON. The API key is only ever reported as set or unset.
pub fn config_json(settings: &Settings) -> Value {
    let strategy = if settings.completion.credential().is_some() { "llm" } else { "local" };
    json!({
        "app_name": settings.app_name,
        "environment": settings.environment,
        "demo_mode": settings.demo_mode,
        "agent_timeout_secs": settings.agent_timeout.as_secs(),
        "strategy": strategy,
        "completion": {
            "api_key": settings.completion.credential().map(|_| "<redacted>"),
            "model": settings.completion.model,
            "max_tokens": settings.completion.max_tokens,
            "temperature": settings.completion.temperature,
            "max_retries": settings.completion.max_retries,
            "request_timeout_secs": settings.completion.request_timeout.as_secs(),
        },
        "forecast": {
            "forecast_days": settings.forecast.forecast_days,
            "historical_days": settings.forecast.historical_days,
            "safety_stock_multiplier": settings.forecast.safety_stock_multiplier,
        },
        "log": {
            "level": settings.log.level,
            "format": match settings.log.format {
                LogFormat::Json => "json",
                LogFormat::Pretty => "pretty",
            },
        },
    })
}

fn print_json(value: &Value, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{text}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ask_parses_flags() {
        let cli = Cli::try_parse_from([
            "shopcast",
            "ask",
            "What are my top 5 products?",
            "--shop",
            "acme.myshopify.com",
            "--local",
        ])
        .unwrap();

        match cli.command {
            Commands::Ask {
                question, shop, local, pretty, ..
            } => {
                assert_eq!(question, "What are my top 5 products?");
                assert_eq!(shop, "acme.myshopify.com");
                assert!(local);
                assert!(!pretty);
            }
            Commands::Config => panic!("expected ask"),
        }
    }

    #[test]
    fn ask_requires_a_question() {
        assert!(Cli::try_parse_from(["shopcast", "ask"]).is_err());
    }

    #[test]
    fn context_must_be_an_object() {
        assert_eq!(parse_context(r#"{"currency": "EUR"}"#).unwrap()["currency"], "EUR");
        assert!(parse_context("[1, 2]").is_err());
        assert!(parse_context("{not json").is_err());
    }

    #[test]
    fn config_output_never_contains_the_api_key() {
        let mut settings = Settings::default();
        settings.completion.api_key = Some("sk-ant-secret".into());

        let config = config_json(&settings);
        assert!(!config.to_string().contains("sk-ant-secret"));
        assert_eq!(config["completion"]["api_key"], "<redacted>");
        assert_eq!(config["strategy"], "llm");
        assert_eq!(config["forecast"]["forecast_days"], 30);
        assert_eq!(config["log"]["format"], "json");

        assert_eq!(config_json(&Settings::default())["completion"]["api_key"], Value::Null);
    }
}
