use crate::domain::context::SpreadBounds;
use crate::domain::recommendation::FactorBreakdown;
use anyhow::{bail, Context};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

/// Confidence attached to a payload synthesised after a parse failure.
pub const DEGRADED_CONFIDENCE: Decimal = Decimal::from_parts(3, 0, 0, false, 1);

/// Output contract requested from models. Field names are part of the prompt.
pub const OUTPUT_FIELDS: [&str; 6] = [
    "recommendedSpread",
    "confidenceScore",
    "reasoning",
    "riskAssessment",
    "marketAnalysis",
    "keyFactors",
];

/// Validated provider output, already clamped to the request bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadPayload {
    pub recommended_spread: Decimal,
    pub confidence_score: Decimal,
    pub reasoning: String,
    pub risk_assessment: String,
    pub market_analysis: String,
    pub key_factors: Vec<String>,
    /// Set by providers that compute factors explicitly.
    pub factors: Option<FactorBreakdown>,
    /// True when the payload was synthesised because extraction failed.
    pub parse_failed: bool,
}

impl SpreadPayload {
    pub fn degraded(bounds: &SpreadBounds, cause: &str) -> Self {
        Self {
            recommended_spread: bounds.clamped_default(),
            confidence_score: DEGRADED_CONFIDENCE,
            reasoning: format!(
                "Model response could not be parsed; the default spread was applied. Cause: {cause}"
            ),
            risk_assessment: "Conservative risk assessment applied because the response could not be parsed."
                .to_string(),
            market_analysis: "Market analysis unavailable; manual review recommended.".to_string(),
            key_factors: Vec::new(),
            factors: None,
            parse_failed: true,
        }
    }

    /// Forces spread into `[min, max]` and confidence into `[0, 1]`.
    pub fn clamp_to(mut self, bounds: &SpreadBounds) -> Self {
        let spread = bounds.clamp(self.recommended_spread);
        if spread != self.recommended_spread {
            tracing::warn!(
                proposed = %self.recommended_spread,
                min = %bounds.min_spread,
                max = %bounds.max_spread,
                "recommended spread outside bounds; clamped"
            );
            self.recommended_spread = spread;
        }
        self.confidence_score = self.confidence_score.max(Decimal::ZERO).min(Decimal::ONE);
        self
    }
}

/// Loose shape of the model's JSON. Models routinely quote numbers or omit keys,
/// so everything is optional here and checked in `validate_and_into_payload`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmSpreadRecommendation {
    #[serde(default)]
    pub recommended_spread: Option<LenientNumber>,
    #[serde(default)]
    pub confidence_score: Option<LenientNumber>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub risk_assessment: Option<String>,
    #[serde(default)]
    pub market_analysis: Option<String>,
    #[serde(default)]
    pub key_factors: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LenientNumber {
    Number(serde_json::Number),
    Text(String),
}

impl LenientNumber {
    fn to_decimal(&self) -> anyhow::Result<Decimal> {
        let raw = match self {
            LenientNumber::Number(n) => n.to_string(),
            LenientNumber::Text(s) => s.trim().trim_end_matches('%').trim().to_string(),
        };
        Decimal::from_str(&raw)
            .or_else(|_| Decimal::from_scientific(&raw))
            .with_context(|| format!("not a decimal: {raw}"))
    }
}

impl LlmSpreadRecommendation {
    pub fn validate_and_into_payload(self, bounds: &SpreadBounds) -> anyhow::Result<SpreadPayload> {
        let Some(spread) = self.recommended_spread else {
            bail!("missing field recommendedSpread");
        };
        let Some(confidence) = self.confidence_score else {
            bail!("missing field confidenceScore");
        };
        let recommended_spread = spread
            .to_decimal()
            .context("invalid recommendedSpread")?;
        let confidence_score = confidence
            .to_decimal()
            .context("invalid confidenceScore")?;

        let reasoning = self
            .reasoning
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .context("missing field reasoning")?;

        let key_factors = self
            .key_factors
            .unwrap_or_default()
            .into_iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .filter(|s| !s.is_empty())
            .collect();

        Ok(SpreadPayload {
            recommended_spread,
            confidence_score,
            reasoning,
            risk_assessment: self.risk_assessment.unwrap_or_default().trim().to_string(),
            market_analysis: self.market_analysis.unwrap_or_default().trim().to_string(),
            key_factors,
            factors: None,
            parse_failed: false,
        }
        .clamp_to(bounds))
    }
}
