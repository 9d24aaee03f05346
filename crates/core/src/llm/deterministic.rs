use crate::domain::context::RecommendationContext;
use crate::domain::contract::SpreadPayload;
use crate::domain::currency;
use crate::llm::error::ProviderError;
use crate::llm::{GenerationRequest, ProviderAdapter, ProviderReply};
use crate::scoring::{ScoreOutcome, ScoringEngine};
use std::time::Duration;

pub const PROVIDER_NAME: &str = "deterministic";
pub const MODEL_NAME: &str = "weighted-scoring";
const NEUTRAL_VOLATILITY: f64 = 0.5;

const KEY_FACTORS: [&str; 4] = [
    "historical performance",
    "market volatility",
    "customer risk level",
    "liquidity",
];

/// Closed-form scoring behind the adapter interface. Always available, never
/// touches the network, and returns a structured payload instead of text.
#[derive(Debug, Clone, Copy)]
pub struct DeterministicAdapter {
    engine: ScoringEngine,
}

impl DeterministicAdapter {
    pub fn new(engine: ScoringEngine) -> Self {
        Self { engine }
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for DeterministicAdapter {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn model(&self) -> &str {
        MODEL_NAME
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(1)
    }

    fn is_deterministic(&self) -> bool {
        true
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn generate(&self, request: GenerationRequest<'_>) -> Result<ProviderReply, ProviderError> {
        let ctx = request.context;
        let outcome = self
            .engine
            .score_context(ctx)
            .map_err(|e| ProviderError::Rejected(e.to_string()))?;
        Ok(ProviderReply::Structured(payload_from_outcome(outcome, ctx)))
    }
}

/// Wraps a score in the same payload shape model output is coerced into.
pub fn payload_from_outcome(outcome: ScoreOutcome, ctx: &RecommendationContext) -> SpreadPayload {
    SpreadPayload {
        recommended_spread: outcome.spread,
        confidence_score: outcome.confidence,
        reasoning: outcome.reason,
        risk_assessment: risk_assessment(ctx),
        market_analysis: market_analysis(ctx),
        key_factors: KEY_FACTORS.iter().map(|s| s.to_string()).collect(),
        factors: Some(outcome.factors),
        parse_failed: false,
    }
}

fn risk_assessment(ctx: &RecommendationContext) -> String {
    let risk = ctx.customer.risk_level;
    let volatility = ctx.avg_market_volatility().unwrap_or(NEUTRAL_VOLATILITY);

    if risk > 1.5 || volatility > 0.7 {
        let mut out = String::from("High risk:");
        if risk > 1.5 {
            out.push_str(" customer risk level is elevated;");
        }
        if volatility > 0.7 {
            out.push_str(" market volatility is high;");
        }
        out.push_str(" a conservative pricing strategy is advised.");
        out
    } else if risk < 0.8 && volatility < 0.3 {
        "Low risk: good customer credit and a stable market; preferential pricing can be considered."
            .to_string()
    } else {
        "Medium risk: customer and market conditions are within normal ranges; standard pricing applies."
            .to_string()
    }
}

fn market_analysis(ctx: &RecommendationContext) -> String {
    let mut out = String::from("Market analysis:");
    if let Some(volatility) = ctx.avg_market_volatility() {
        if volatility > 0.6 {
            out.push_str(" the market is volatile, monitor it closely;");
        } else {
            out.push_str(" the market is relatively stable, which supports precise pricing;");
        }
    }
    out.push(' ');
    out.push_str(currency::market_note(&ctx.currency));
    out
}
