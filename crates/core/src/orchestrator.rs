//! Sequential provider fallback chain.
//!
//! Adapters are tried strictly in configured order. The first adapter that is
//! available and returns a reply wins; every failure (error, timeout or not
//! available) is logged and the next adapter is tried. No adapter is retried.

use crate::cancel::CancellationToken;
use crate::config::Settings;
use crate::domain::context::RecommendationContext;
use crate::domain::contract::SpreadPayload;
use crate::llm::error::ProviderError;
use crate::llm::prompt::PromptComposer;
use crate::llm::registry::build_adapters;
use crate::llm::{json, GenerationRequest, ProviderAdapter, ProviderDescriptor, ProviderReply};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug)]
pub struct AttemptFailure {
    pub provider: String,
    pub error: ProviderError,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.provider, self.error)
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("no LLM providers configured")]
    NoProviders,

    #[error("all LLM providers failed ({})", summarize(.attempts))]
    AllProvidersExhausted { attempts: Vec<AttemptFailure> },

    #[error("recommendation cancelled")]
    Cancelled,
}

fn summarize(attempts: &[AttemptFailure]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// The winning adapter's payload, clamped to the context bounds.
#[derive(Debug, Clone)]
pub struct ProviderOutcome {
    pub payload: SpreadPayload,
    pub provider: String,
    pub model: String,
    pub deterministic: bool,
}

pub struct ProviderOrchestrator {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
    composer: PromptComposer,
}

impl ProviderOrchestrator {
    pub fn new(adapters: Vec<Arc<dyn ProviderAdapter>>) -> Self {
        Self {
            adapters,
            composer: PromptComposer::new(),
        }
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Ok(Self::new(build_adapters(settings)?))
    }

    /// Name, model and live availability of every adapter, in chain order.
    pub async fn describe(&self) -> Vec<ProviderDescriptor> {
        let mut out = Vec::with_capacity(self.adapters.len());
        for adapter in &self.adapters {
            out.push(ProviderDescriptor {
                provider: adapter.name().to_string(),
                model: adapter.model().to_string(),
                available: adapter.is_available().await,
            });
        }
        out
    }

    pub async fn recommend(
        &self,
        ctx: &RecommendationContext,
        cancel: &CancellationToken,
    ) -> Result<ProviderOutcome, OrchestratorError> {
        if self.adapters.is_empty() {
            return Err(OrchestratorError::NoProviders);
        }

        let prompt = self.composer.compose(ctx);
        let mut attempts = Vec::new();

        for (attempt, adapter) in self.adapters.iter().enumerate() {
            let provider = adapter.name().to_string();
            let timeout = adapter.timeout();

            let available = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(OrchestratorError::Cancelled),
                checked = tokio::time::timeout(timeout, adapter.is_available()) => checked.unwrap_or(false),
            };
            if !available {
                tracing::debug!(provider = %provider, attempt, "provider unavailable; skipping");
                attempts.push(AttemptFailure {
                    provider,
                    error: ProviderError::Unavailable,
                });
                continue;
            }

            let request = GenerationRequest {
                context: ctx,
                prompt: &prompt,
            };
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(provider = %provider, customer = %ctx.customer.code, "recommendation cancelled mid-call");
                    return Err(OrchestratorError::Cancelled);
                }
                res = tokio::time::timeout(timeout, adapter.generate(request)) => res,
            };

            let reply = match result {
                Ok(Ok(reply)) => reply,
                Ok(Err(err)) => {
                    tracing::warn!(provider = %provider, attempt, error = %err, "provider call failed");
                    attempts.push(AttemptFailure { provider, error: err });
                    continue;
                }
                Err(_) => {
                    tracing::warn!(provider = %provider, attempt, timeout = ?timeout, "provider call timed out");
                    attempts.push(AttemptFailure {
                        provider,
                        error: ProviderError::Timeout(timeout),
                    });
                    continue;
                }
            };

            let payload = match reply {
                ProviderReply::Text(text) => json::coerce(&text, ctx),
                ProviderReply::Structured(payload) => payload.clamp_to(&ctx.bounds),
            };

            tracing::info!(
                provider = %provider,
                customer = %ctx.customer.code,
                currency = %ctx.currency,
                attempt,
                spread = %payload.recommended_spread,
                parse_failed = payload.parse_failed,
                "provider produced recommendation"
            );

            return Ok(ProviderOutcome {
                payload,
                provider,
                model: adapter.model().to_string(),
                deterministic: adapter.is_deterministic(),
            });
        }

        Err(OrchestratorError::AllProvidersExhausted { attempts })
    }
}
