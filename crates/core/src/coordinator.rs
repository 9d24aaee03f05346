//! Entry point for one recommendation: AI chain first, deterministic scoring
//! second, a degraded default last. Only "AI unavailable and fallback disabled"
//! and cancellation reach the caller as errors.

use crate::cancel::CancellationToken;
use crate::config::Settings;
use crate::domain::context::{RecommendationContext, RecommendationRequest, SpreadBounds};
use crate::domain::contract::SpreadPayload;
use crate::domain::recommendation::{FactorBreakdown, Provenance, RecommendationResult, ValidityWindow};
use crate::llm::deterministic::{self, payload_from_outcome};
use crate::llm::ProviderDescriptor;
use crate::orchestrator::{OrchestratorError, ProviderOrchestrator, ProviderOutcome};
use crate::scoring::ScoringEngine;
use chrono::Utc;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

const DEGRADED_PROVIDER: &str = "degraded";
const DEGRADED_MODEL: &str = "none";
const DEGRADED_CONFIDENCE: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecommendationError {
    #[error("AI recommendation unavailable and deterministic fallback is disabled")]
    FallbackDisabled,

    #[error("recommendation cancelled")]
    Cancelled,
}

pub struct RecommendationCoordinator {
    ai_enabled: bool,
    fallback_enabled: bool,
    validity_hours: i64,
    history_days: i64,
    bounds: SpreadBounds,
    orchestrator: ProviderOrchestrator,
    engine: ScoringEngine,
}

impl RecommendationCoordinator {
    pub fn new(settings: &Settings, orchestrator: ProviderOrchestrator) -> Self {
        Self {
            ai_enabled: settings.ai_enabled,
            fallback_enabled: settings.fallback_enabled,
            validity_hours: settings.validity_hours,
            history_days: settings.history_days,
            bounds: settings.bounds,
            orchestrator,
            engine: ScoringEngine::new(settings.weights),
        }
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let orchestrator = ProviderOrchestrator::from_settings(settings)?;
        Ok(Self::new(settings, orchestrator))
    }

    /// Windows and summarises the request history with the configured bounds.
    pub fn build_context(&self, request: RecommendationRequest) -> RecommendationContext {
        RecommendationContext::from_request(request, self.bounds, self.history_days)
    }

    pub async fn describe_providers(&self) -> Vec<ProviderDescriptor> {
        self.orchestrator.describe().await
    }

    pub async fn generate(
        &self,
        ctx: &RecommendationContext,
    ) -> Result<RecommendationResult, RecommendationError> {
        self.generate_with_cancel(ctx, &CancellationToken::new()).await
    }

    pub async fn generate_with_cancel(
        &self,
        ctx: &RecommendationContext,
        cancel: &CancellationToken,
    ) -> Result<RecommendationResult, RecommendationError> {
        if cancel.is_cancelled() {
            return Err(RecommendationError::Cancelled);
        }

        if self.ai_enabled {
            match self.orchestrator.recommend(ctx, cancel).await {
                Ok(outcome) => return Ok(self.provider_result(ctx, outcome)),
                Err(OrchestratorError::Cancelled) => return Err(RecommendationError::Cancelled),
                Err(err) => {
                    tracing::warn!(
                        customer = %ctx.customer.code,
                        currency = %ctx.currency,
                        error = %err,
                        "AI recommendation failed"
                    );
                }
            }
        } else {
            tracing::debug!(customer = %ctx.customer.code, "AI path disabled");
        }

        if !self.fallback_enabled {
            tracing::error!(
                customer = %ctx.customer.code,
                currency = %ctx.currency,
                "no AI recommendation and deterministic fallback disabled"
            );
            return Err(RecommendationError::FallbackDisabled);
        }

        Ok(self.score_directly(ctx))
    }

    fn score_directly(&self, ctx: &RecommendationContext) -> RecommendationResult {
        match self.engine.score_context(ctx) {
            Ok(outcome) => self.assemble(
                ctx,
                payload_from_outcome(outcome, ctx),
                Provenance {
                    provider: deterministic::PROVIDER_NAME.to_string(),
                    model: deterministic::MODEL_NAME.to_string(),
                    used_fallback_path: true,
                    used_ai_path: false,
                },
            ),
            Err(err) => {
                tracing::error!(
                    customer = %ctx.customer.code,
                    currency = %ctx.currency,
                    error = %err,
                    "scoring failed; returning default spread"
                );
                self.degraded(ctx, &err.to_string())
            }
        }
    }

    /// Chain results always carry the neutral factor placeholder, whichever
    /// adapter answered.
    fn provider_result(&self, ctx: &RecommendationContext, outcome: ProviderOutcome) -> RecommendationResult {
        let provenance = Provenance {
            provider: outcome.provider,
            model: outcome.model,
            used_fallback_path: outcome.deterministic || outcome.payload.parse_failed,
            used_ai_path: true,
        };
        let payload = SpreadPayload {
            factors: None,
            ..outcome.payload
        };
        self.assemble(ctx, payload, provenance)
    }

    fn degraded(&self, ctx: &RecommendationContext, cause: &str) -> RecommendationResult {
        let payload = SpreadPayload {
            recommended_spread: ctx.bounds.clamped_default(),
            confidence_score: DEGRADED_CONFIDENCE,
            reasoning: format!(
                "Recommendation could not be computed ({cause}); the default spread was applied."
            ),
            risk_assessment: "Risk not assessed; manual review recommended.".to_string(),
            market_analysis: "Market analysis unavailable.".to_string(),
            key_factors: Vec::new(),
            factors: None,
            parse_failed: false,
        };
        self.assemble(
            ctx,
            payload,
            Provenance {
                provider: DEGRADED_PROVIDER.to_string(),
                model: DEGRADED_MODEL.to_string(),
                used_fallback_path: true,
                used_ai_path: false,
            },
        )
    }

    /// Payloads without their own factor breakdown get the neutral placeholder.
    fn assemble(
        &self,
        ctx: &RecommendationContext,
        payload: SpreadPayload,
        provenance: Provenance,
    ) -> RecommendationResult {
        RecommendationResult {
            recommendation_id: Uuid::new_v4(),
            customer_code: ctx.customer.code.clone(),
            currency: ctx.currency.clone(),
            as_of_date: ctx.as_of_date,
            recommended_spread: ctx.bounds.clamp(payload.recommended_spread),
            confidence_score: payload.confidence_score.max(Decimal::ZERO).min(Decimal::ONE),
            reasoning: payload.reasoning,
            risk_assessment: payload.risk_assessment,
            market_analysis: payload.market_analysis,
            key_factors: payload.key_factors,
            factors: payload.factors.unwrap_or_else(FactorBreakdown::neutral),
            provenance,
            validity: ValidityWindow::starting_at(Utc::now(), self.validity_hours),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::tests::{context, dec, record};
    use crate::llm::deterministic::DeterministicAdapter;
    use crate::llm::ProviderAdapter;
    use crate::orchestrator::tests::{Script, ScriptedAdapter, VALID_REPLY};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned()).unwrap()
    }

    fn coordinator(vars: &[(&str, &str)], adapters: Vec<Arc<dyn ProviderAdapter>>) -> RecommendationCoordinator {
        RecommendationCoordinator::new(&settings(vars), ProviderOrchestrator::new(adapters))
    }

    fn assert_structurally_valid(result: &RecommendationResult, ctx: &RecommendationContext) {
        assert!(result.recommended_spread >= ctx.bounds.min_spread);
        assert!(result.recommended_spread <= ctx.bounds.max_spread);
        assert!(result.confidence_score >= Decimal::ZERO);
        assert!(result.confidence_score <= Decimal::ONE);
        assert!(result.validity.expires_at > result.validity.generated_at);
    }

    #[tokio::test]
    async fn ai_disabled_uses_scoring_engine() {
        let c = coordinator(&[("AI_LLM_ENABLED", "false")], Vec::new());
        let ctx = context(1.0, 0.0);

        let result = c.generate(&ctx).await.unwrap();
        assert_eq!(result.recommended_spread, dec("0.044"));
        assert_eq!(result.confidence_score, dec("0.1"));
        assert!(!result.provenance.used_ai_path);
        assert!(result.provenance.used_fallback_path);
        assert_eq!(result.factors.volatility, dec("0.5"));
        assert_eq!(result.customer_code, "CUST-001");
        assert_structurally_valid(&result, &ctx);
    }

    #[tokio::test]
    async fn ai_disabled_without_fallback_is_fatal() {
        let c = coordinator(
            &[("AI_LLM_ENABLED", "false"), ("AI_LLM_FALLBACK_ENABLED", "false")],
            Vec::new(),
        );
        let err = c.generate(&context(1.0, 0.0)).await.unwrap_err();
        assert_eq!(err, RecommendationError::FallbackDisabled);
    }

    #[tokio::test]
    async fn exhausted_chain_without_fallback_is_fatal() {
        let c = coordinator(
            &[("AI_LLM_FALLBACK_ENABLED", "false")],
            vec![Arc::new(ScriptedAdapter::new("a", Script::Fail))],
        );
        let err = c.generate(&context(1.0, 0.0)).await.unwrap_err();
        assert_eq!(err, RecommendationError::FallbackDisabled);
    }

    #[tokio::test]
    async fn model_reply_marks_ai_path_with_neutral_factors() {
        let c = coordinator(
            &[],
            vec![Arc::new(ScriptedAdapter::new("remote", Script::Reply(VALID_REPLY)))],
        );
        let ctx = context(1.0, 0.0);

        let result = c.generate(&ctx).await.unwrap();
        assert_eq!(result.recommended_spread, dec("0.2"));
        assert_eq!(result.provenance.provider, "remote");
        assert!(result.provenance.used_ai_path);
        assert!(!result.provenance.used_fallback_path);
        assert_eq!(result.factors, FactorBreakdown::neutral());
        assert_structurally_valid(&result, &ctx);
    }

    #[tokio::test]
    async fn deterministic_adapter_in_chain_gets_neutral_factors() {
        let weights = settings(&[]).weights;
        let c = coordinator(
            &[],
            vec![
                Arc::new(ScriptedAdapter::new("remote", Script::Fail)),
                Arc::new(DeterministicAdapter::new(ScoringEngine::new(weights))),
            ],
        );
        let ctx = context(1.0, 0.0);

        let result = c.generate(&ctx).await.unwrap();
        assert_eq!(result.provenance.provider, "deterministic");
        assert!(result.provenance.used_ai_path);
        assert!(result.provenance.used_fallback_path);
        assert_eq!(result.recommended_spread, dec("0.044"));
        assert_eq!(result.factors, FactorBreakdown::neutral());
    }

    #[tokio::test]
    async fn unparseable_model_reply_yields_default_spread_on_fallback_path() {
        let c = coordinator(
            &[],
            vec![Arc::new(ScriptedAdapter::new("remote", Script::Reply("garbage")))],
        );
        let ctx = context(1.0, 0.0);

        let result = c.generate(&ctx).await.unwrap();
        assert_eq!(result.provenance.provider, "remote");
        assert!(result.provenance.used_ai_path);
        assert!(result.provenance.used_fallback_path);
        assert_eq!(result.recommended_spread, ctx.bounds.default_spread);
        assert!(result.confidence_score <= dec("0.3"));
        assert_eq!(result.factors, FactorBreakdown::neutral());
    }

    #[tokio::test]
    async fn failing_chain_falls_through_to_scoring() {
        let c = coordinator(
            &[],
            vec![
                Arc::new(ScriptedAdapter::new("a", Script::Fail)),
                Arc::new(ScriptedAdapter::new("b", Script::Reply(VALID_REPLY)).unavailable()),
            ],
        );
        let mut ctx = context(1.0, 0.0);
        ctx.history = (1..=10).map(|d| record(d, Some("0.4"))).collect();

        let result = c.generate(&ctx).await.unwrap();
        assert!(!result.provenance.used_ai_path);
        assert_eq!(result.provenance.provider, "deterministic");
        assert_structurally_valid(&result, &ctx);
    }

    #[tokio::test]
    async fn scoring_error_degrades_to_default_spread() {
        let c = coordinator(&[("AI_LLM_ENABLED", "false")], Vec::new());
        let ctx = context(f64::NAN, 0.0);

        let result = c.generate(&ctx).await.unwrap();
        assert_eq!(result.recommended_spread, dec("0.1"));
        assert_eq!(result.confidence_score, dec("0.5"));
        assert_eq!(result.provenance.provider, "degraded");
        assert!(result.key_factors.is_empty());
        assert_structurally_valid(&result, &ctx);
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let c = coordinator(&[], vec![Arc::new(ScriptedAdapter::new("a", Script::Hang))]);
        let token = CancellationToken::new();
        token.cancel();
        let err = c.generate_with_cancel(&context(1.0, 0.0), &token).await.unwrap_err();
        assert_eq!(err, RecommendationError::Cancelled);
    }

    #[tokio::test]
    async fn validity_window_uses_configured_hours() {
        let c = coordinator(&[("AI_LLM_ENABLED", "false"), ("AI_REBATE_VALIDITY_HOURS", "6")], Vec::new());
        let result = c.generate(&context(1.0, 0.0)).await.unwrap();
        let span = result.validity.expires_at - result.validity.generated_at;
        assert_eq!(span.num_hours(), 6);
    }

    #[test]
    fn build_context_applies_configured_window() {
        let c = coordinator(&[("AI_REBATE_HISTORY_DAYS", "7")], Vec::new());
        let request = RecommendationRequest {
            customer_code: "CUST-009".to_string(),
            customer_name: String::new(),
            risk_level: 1.0,
            trading_volume: 0.0,
            currency: "eur".to_string(),
            as_of_date: chrono::NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
            history: vec![record(10, Some("0.2")), record(25, Some("0.3"))],
        };
        let ctx = c.build_context(request);
        assert_eq!(ctx.currency, "EUR");
        assert_eq!(ctx.history.len(), 1);
    }
}
