pub mod cancel;
pub mod coordinator;
pub mod domain;
pub mod llm;
pub mod orchestrator;
pub mod scoring;

pub mod config {
    use anyhow::{ensure, Context};
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use std::time::Duration;

    use crate::domain::context::SpreadBounds;
    use crate::llm::ProviderKind;

    const DEFAULT_PROVIDERS: &str = "deterministic";
    const DEFAULT_SPREAD: &str = "0.1";
    const DEFAULT_MIN_SPREAD: &str = "0.01";
    const DEFAULT_MAX_SPREAD: &str = "0.5";
    const DEFAULT_VALIDITY_HOURS: i64 = 24;
    const DEFAULT_HISTORY_DAYS: i64 = 30;
    const MAX_VALIDITY_HOURS: i64 = 8_760;
    const MAX_HISTORY_DAYS: i64 = 36_500;
    const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

    const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
    const DEFAULT_OPENAI_MODEL: &str = "gpt-4";
    const DEFAULT_OPENAI_MAX_TOKENS: u32 = 1000;
    const DEFAULT_OPENAI_TIMEOUT_SECS: u64 = 60;

    const DEFAULT_LOCAL_BASE_URL: &str = "http://localhost:11434";
    const DEFAULT_LOCAL_MODEL: &str = "llama3";
    const DEFAULT_LOCAL_TIMEOUT_SECS: u64 = 30;

    const DEFAULT_TEMPERATURE: f64 = 0.3;

    /// Process-wide configuration. Built once at startup and shared read-only.
    #[derive(Debug, Clone)]
    pub struct Settings {
        pub ai_enabled: bool,
        pub fallback_enabled: bool,
        /// Adapter chain, in the order providers are tried.
        pub providers: Vec<ProviderKind>,
        pub bounds: SpreadBounds,
        pub weights: FactorWeights,
        pub validity_hours: i64,
        pub history_days: i64,
        pub request_timeout: Duration,
        pub openai: OpenAiSettings,
        pub local: LocalSettings,
        pub sentry_dsn: Option<String>,
    }

    /// Weights of the three scoring factors. Expected to sum to 1.0; not enforced.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct FactorWeights {
        pub volatility: f64,
        pub volume: f64,
        pub history: f64,
    }

    impl Default for FactorWeights {
        fn default() -> Self {
            Self {
                volatility: 0.3,
                volume: 0.4,
                history: 0.3,
            }
        }
    }

    #[derive(Debug, Clone)]
    pub struct OpenAiSettings {
        pub api_key: Option<String>,
        pub base_url: String,
        pub model: String,
        pub temperature: f64,
        pub max_tokens: u32,
        pub timeout: Duration,
    }

    #[derive(Debug, Clone)]
    pub struct LocalSettings {
        pub base_url: String,
        pub model: String,
        pub temperature: f64,
        pub top_p: f64,
        pub top_k: u32,
        pub timeout: Duration,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Self::from_lookup(|key| std::env::var(key).ok())
        }

        pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
        where
            F: Fn(&str) -> Option<String>,
        {
            let var = |key: &str| {
                lookup(key)
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
            };
            let parsed = |key: &str| var(key).and_then(|s| s.parse::<f64>().ok());
            let flag = |key: &str, default: bool| {
                var(key)
                    .and_then(|s| s.to_ascii_lowercase().parse::<bool>().ok())
                    .unwrap_or(default)
            };
            let decimal = |key: &str, default: &str| -> anyhow::Result<Decimal> {
                let raw = var(key).unwrap_or_else(|| default.to_string());
                Decimal::from_str(&raw).with_context(|| format!("{key} is not a decimal: {raw}"))
            };
            let secs = |key: &str, default: u64| {
                Duration::from_secs(
                    var(key)
                        .and_then(|s| s.parse::<u64>().ok())
                        .unwrap_or(default),
                )
            };

            let providers = var("AI_LLM_PROVIDERS")
                .unwrap_or_else(|| DEFAULT_PROVIDERS.to_string())
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ProviderKind::from_str)
                .collect::<anyhow::Result<Vec<_>>>()?;

            let bounds = SpreadBounds {
                min_spread: decimal("AI_REBATE_MIN_SPREAD", DEFAULT_MIN_SPREAD)?,
                max_spread: decimal("AI_REBATE_MAX_SPREAD", DEFAULT_MAX_SPREAD)?,
                default_spread: decimal("AI_REBATE_DEFAULT_SPREAD", DEFAULT_SPREAD)?,
            };
            bounds.validate()?;

            let defaults = FactorWeights::default();
            let weights = FactorWeights {
                volatility: parsed("AI_REBATE_VOLATILITY_WEIGHT").unwrap_or(defaults.volatility),
                volume: parsed("AI_REBATE_VOLUME_WEIGHT").unwrap_or(defaults.volume),
                history: parsed("AI_REBATE_HISTORY_WEIGHT").unwrap_or(defaults.history),
            };
            ensure!(
                weights.volatility >= 0.0 && weights.volume >= 0.0 && weights.history >= 0.0,
                "factor weights must be non-negative (got {weights:?})"
            );

            let validity_hours = var("AI_REBATE_VALIDITY_HOURS")
                .and_then(|s| s.parse::<i64>().ok())
                .filter(|h| *h > 0)
                .unwrap_or(DEFAULT_VALIDITY_HOURS);
            let history_days = var("AI_REBATE_HISTORY_DAYS")
                .and_then(|s| s.parse::<i64>().ok())
                .filter(|d| *d > 0)
                .unwrap_or(DEFAULT_HISTORY_DAYS);
            ensure!(
                validity_hours <= MAX_VALIDITY_HOURS,
                "AI_REBATE_VALIDITY_HOURS must be at most {MAX_VALIDITY_HOURS} (got {validity_hours})"
            );
            ensure!(
                history_days <= MAX_HISTORY_DAYS,
                "AI_REBATE_HISTORY_DAYS must be at most {MAX_HISTORY_DAYS} (got {history_days})"
            );

            Ok(Self {
                ai_enabled: flag("AI_LLM_ENABLED", true),
                fallback_enabled: flag("AI_LLM_FALLBACK_ENABLED", true),
                providers,
                bounds,
                weights,
                validity_hours,
                history_days,
                request_timeout: secs("REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
                openai: OpenAiSettings {
                    api_key: var("OPENAI_API_KEY"),
                    base_url: var("OPENAI_BASE_URL")
                        .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
                    model: var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
                    temperature: parsed("OPENAI_TEMPERATURE").unwrap_or(DEFAULT_TEMPERATURE),
                    max_tokens: var("OPENAI_MAX_TOKENS")
                        .and_then(|s| s.parse::<u32>().ok())
                        .unwrap_or(DEFAULT_OPENAI_MAX_TOKENS),
                    timeout: secs("OPENAI_TIMEOUT_SECS", DEFAULT_OPENAI_TIMEOUT_SECS),
                },
                local: LocalSettings {
                    base_url: var("LOCAL_LLM_BASE_URL")
                        .unwrap_or_else(|| DEFAULT_LOCAL_BASE_URL.to_string()),
                    model: var("LOCAL_LLM_MODEL").unwrap_or_else(|| DEFAULT_LOCAL_MODEL.to_string()),
                    temperature: parsed("LOCAL_LLM_TEMPERATURE").unwrap_or(DEFAULT_TEMPERATURE),
                    top_p: parsed("LOCAL_LLM_TOP_P").unwrap_or(0.9),
                    top_k: var("LOCAL_LLM_TOP_K")
                        .and_then(|s| s.parse::<u32>().ok())
                        .unwrap_or(40),
                    timeout: secs("LOCAL_LLM_TIMEOUT_SECS", DEFAULT_LOCAL_TIMEOUT_SECS),
                },
                sentry_dsn: var("SENTRY_DSN"),
            })
        }
    }

}
