//! Service configuration.
//!
//! Everything tunable lives in [`Settings`], which is built once at startup and
//! passed explicitly into orchestrators and the forecast engine. Nothing here is
//! global.

use std::ops::RangeInclusive;
use std::time::Duration;

use thiserror::Error;

/// Placeholder shipped in `.env.example`; treated the same as no key.
pub const API_KEY_PLACEHOLDER: &str = "your_anthropic_api_key_here";

/// Accepted projection horizons, in days.
pub const FORECAST_DAYS_RANGE: RangeInclusive<u32> = 1..=365;
/// Accepted history windows, in days.
pub const HISTORICAL_DAYS_RANGE: RangeInclusive<u32> = 7..=730;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("{0} is required when DEMO_MODE is off")]
    MissingRequired(&'static str),
}

/// Forecasting knobs shared by the planner and the forecast engine.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ForecastSettings {
    pub forecast_days: u32,
    pub historical_days: u32,
    /// 1.2 means a 20% safety buffer on top of projected demand.
    pub safety_stock_multiplier: f64,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            forecast_days: 30,
            historical_days: 90,
            safety_stock_multiplier: 1.2,
        }
    }
}

/// Completion-service client settings.
#[derive(Clone, PartialEq)]
pub struct CompletionSettings {
    pub api_key: Option<String>,
    pub model: String,
    /// Ceiling on the token budget of any single request.
    pub max_tokens: u32,
    pub temperature: f64,
    pub max_retries: u32,
    pub request_timeout: Duration,
}

impl CompletionSettings {
    /// The API key, unless it is blank or the shipped placeholder.
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty() && *k != API_KEY_PLACEHOLDER)
    }
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 4096,
            temperature: 0.7,
            max_retries: 3,
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl core::fmt::Debug for CompletionSettings {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CompletionSettings")
            .field("api_key", &self.credential().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("max_retries", &self.max_retries)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub app_name: String,
    pub environment: String,
    /// Synthesize data locally instead of calling the analytics backend.
    pub demo_mode: bool,
    /// Overall wall-clock budget for one request.
    pub agent_timeout: Duration,
    pub completion: CompletionSettings,
    pub forecast: ForecastSettings,
    pub log: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "Shopify Analytics AI Service".to_string(),
            environment: "development".to_string(),
            demo_mode: true,
            agent_timeout: Duration::from_secs(120),
            completion: CompletionSettings::default(),
            forecast: ForecastSettings::default(),
            log: LogSettings::default(),
        }
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup; unset keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut s = Settings::default();

        if let Some(v) = get("APP_NAME") {
            s.app_name = v;
        }
        if let Some(v) = get("ENVIRONMENT") {
            s.environment = v;
        }
        if let Some(v) = get("DEMO_MODE") {
            s.demo_mode = parse_bool("DEMO_MODE", &v)?;
        }
        if let Some(v) = get("AGENT_TIMEOUT") {
            let secs: u64 = parse_num("AGENT_TIMEOUT", &v)?;
            s.agent_timeout = Duration::from_secs(in_range("AGENT_TIMEOUT", secs, 10, 600)?);
        }

        s.completion.api_key = get("ANTHROPIC_API_KEY");
        if let Some(v) = get("ANTHROPIC_MODEL") {
            s.completion.model = v;
        }
        if let Some(v) = get("ANTHROPIC_MAX_TOKENS") {
            s.completion.max_tokens = parse_num("ANTHROPIC_MAX_TOKENS", &v)?;
        }
        if let Some(v) = get("ANTHROPIC_TEMPERATURE") {
            let t: f64 = parse_num("ANTHROPIC_TEMPERATURE", &v)?;
            s.completion.temperature = in_range("ANTHROPIC_TEMPERATURE", t, 0.0, 1.0)?;
        }
        if let Some(v) = get("MAX_RETRIES") {
            let n: u32 = parse_num("MAX_RETRIES", &v)?;
            s.completion.max_retries = in_range("MAX_RETRIES", n, 1, 10)?;
        }

        if let Some(v) = get("FORECAST_DAYS") {
            let n: u32 = parse_num("FORECAST_DAYS", &v)?;
            s.forecast.forecast_days = in_range(
                "FORECAST_DAYS",
                n,
                *FORECAST_DAYS_RANGE.start(),
                *FORECAST_DAYS_RANGE.end(),
            )?;
        }
        if let Some(v) = get("HISTORICAL_DAYS") {
            let n: u32 = parse_num("HISTORICAL_DAYS", &v)?;
            s.forecast.historical_days = in_range(
                "HISTORICAL_DAYS",
                n,
                *HISTORICAL_DAYS_RANGE.start(),
                *HISTORICAL_DAYS_RANGE.end(),
            )?;
        }
        if let Some(v) = get("SAFETY_STOCK_MULTIPLIER") {
            let m: f64 = parse_num("SAFETY_STOCK_MULTIPLIER", &v)?;
            s.forecast.safety_stock_multiplier = in_range("SAFETY_STOCK_MULTIPLIER", m, 1.0, 2.0)?;
        }

        if let Some(v) = get("LOG_LEVEL") {
            s.log.level = v.to_ascii_lowercase();
        }
        if let Some(v) = get("LOG_FORMAT") {
            s.log.format = match v.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" | "console" | "text" => LogFormat::Pretty,
                other => {
                    return Err(ConfigError::Invalid {
                        key: "LOG_FORMAT",
                        reason: format!("expected json or pretty, got {other:?}"),
                    });
                }
            };
        }

        s.validate()?;
        Ok(s)
    }

    /// Cross-field checks that apply outside demo mode.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.demo_mode && self.completion.credential().is_none() {
            return Err(ConfigError::MissingRequired("ANTHROPIC_API_KEY"));
        }
        Ok(())
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            key,
            reason: format!("expected a boolean, got {other:?}"),
        }),
    }
}

fn parse_num<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    raw.parse::<T>().map_err(|e| ConfigError::Invalid {
        key,
        reason: format!("{raw:?}: {e}"),
    })
}

fn in_range<T>(key: &'static str, value: T, min: T, max: T) -> Result<T, ConfigError>
where
    T: PartialOrd + core::fmt::Display + Copy,
{
    if value >= min && value <= max {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            key,
            reason: format!("{value} is outside {min}..={max}"),
        })
    }
}
