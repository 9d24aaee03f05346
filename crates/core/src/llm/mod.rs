pub mod deterministic;
pub mod error;
pub mod json;
pub mod local;
pub mod openai;
pub mod prompt;
pub mod registry;

use crate::domain::context::RecommendationContext;
use crate::domain::contract::SpreadPayload;
use crate::llm::error::ProviderError;
use serde::Serialize;
use std::str::FromStr;
use std::time::Duration;

/// Adapter identifiers accepted in the provider chain configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Local,
    Deterministic,
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "local" | "ollama" => Ok(Self::Local),
            "deterministic" | "fallback" => Ok(Self::Deterministic),
            other => anyhow::bail!("unknown LLM provider: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub context: &'a RecommendationContext,
    pub prompt: &'a str,
}

/// What an adapter hands back: free text still to be coerced, or a payload it built itself.
#[derive(Debug, Clone)]
pub enum ProviderReply {
    Text(String),
    Structured(SpreadPayload),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderDescriptor {
    pub provider: String,
    pub model: String,
    pub available: bool,
}

#[async_trait::async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    /// Upper bound for one `generate` call.
    fn timeout(&self) -> Duration;

    /// Deterministic adapters never touch the network.
    fn is_deterministic(&self) -> bool {
        false
    }

    async fn is_available(&self) -> bool;

    async fn generate(&self, request: GenerationRequest<'_>) -> Result<ProviderReply, ProviderError>;
}
