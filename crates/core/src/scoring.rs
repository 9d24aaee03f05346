//! Deterministic multi-factor spread scoring.
//!
//! Four factors are derived from the billing history and the customer:
//! volatility, volume, historical performance and a risk adjustment. The first
//! three are blended with configurable weights against the default spread, the
//! result is scaled by the risk adjustment and clamped into the business bounds.
//! Factors and spread are rounded half-up to 6 places, confidence to 4.

use crate::config::FactorWeights;
use crate::domain::context::{HistoricalRecord, RecommendationContext, SpreadBounds};
use crate::domain::currency;
use crate::domain::recommendation::FactorBreakdown;
use rust_decimal::prelude::*;
use rust_decimal::RoundingStrategy;
use thiserror::Error;

const NEUTRAL_FACTOR: f64 = 0.5;
const DEFAULT_PROFIT_MARGIN: f64 = 0.05;
const DEFAULT_LIQUIDITY_SCORE: f64 = 5.0;
const HIGH_VOLUME_THRESHOLD: f64 = 10_000.0;
const TRADING_VOLUME_SCALE: f64 = 100_000.0;
const FULL_CONFIDENCE_DATA_POINTS: f64 = 30.0;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScoringError {
    #[error("non-finite value for {field}")]
    NonFinite { field: &'static str },
}

#[derive(Debug, Clone, Copy)]
pub struct ScoringInput<'a> {
    pub risk_level: f64,
    pub trading_volume: f64,
    pub records: &'a [HistoricalRecord],
    pub currency: &'a str,
    pub bounds: &'a SpreadBounds,
}

impl<'a> ScoringInput<'a> {
    pub fn from_context(ctx: &'a RecommendationContext) -> Self {
        Self {
            risk_level: ctx.customer.risk_level,
            trading_volume: ctx.customer.trading_volume,
            records: &ctx.history,
            currency: &ctx.currency,
            bounds: &ctx.bounds,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreOutcome {
    pub spread: Decimal,
    pub confidence: Decimal,
    pub factors: FactorBreakdown,
    pub reason: String,
    pub data_points: usize,
}

/// Stateless apart from its weights; identical inputs always give identical output.
#[derive(Debug, Clone, Copy)]
pub struct ScoringEngine {
    weights: FactorWeights,
}

impl ScoringEngine {
    pub fn new(weights: FactorWeights) -> Self {
        Self { weights }
    }

    pub fn score_context(&self, ctx: &RecommendationContext) -> Result<ScoreOutcome, ScoringError> {
        self.score(&ScoringInput::from_context(ctx))
    }

    pub fn score(&self, input: &ScoringInput<'_>) -> Result<ScoreOutcome, ScoringError> {
        let volatility = round6(volatility_factor(input.records), "volatility")?;
        let volume = round6(volume_factor(input.records), "volume")?;
        let history = round6(history_factor(input.records), "history")?;
        let risk = round6(
            risk_adjustment(input.risk_level, input.trading_volume, input.currency),
            "risk_adjustment",
        )?;

        let blend = volatility * weight(self.weights.volatility)?
            + volume * weight(self.weights.volume)?
            + history * weight(self.weights.history)?;
        let base = half_up(input.bounds.default_spread * blend, 6);
        let adjusted = half_up(base * risk, 6);
        let spread = input.bounds.clamp(adjusted);

        let data_points = input.records.len();
        let data_quality = (data_points as f64 / FULL_CONFIDENCE_DATA_POINTS).min(1.0);
        let volatility_penalty = 1.0 - volatility.to_f64().unwrap_or(NEUTRAL_FACTOR) * 0.3;
        let confidence = round_to(
            (data_quality * volatility_penalty).clamp(0.1, 1.0),
            4,
            "confidence",
        )?;

        let factors = FactorBreakdown {
            volatility,
            volume,
            history,
            risk_adjustment: risk,
        };

        tracing::debug!(
            currency = input.currency,
            data_points,
            %volatility,
            %volume,
            %history,
            %risk,
            %spread,
            %confidence,
            "scored spread"
        );

        Ok(ScoreOutcome {
            spread,
            confidence,
            reason: explain(&factors, spread),
            factors,
            data_points,
        })
    }
}

/// Sample standard deviation over (mean + 1), clamped to [0, 1]. Records without
/// a market volatility contribute their transaction amount instead.
fn volatility_factor(records: &[HistoricalRecord]) -> f64 {
    let samples: Vec<f64> = records
        .iter()
        .filter_map(|r| {
            r.market_volatility
                .or(r.transaction_amount)
                .and_then(|v| v.to_f64())
        })
        .collect();

    if samples.is_empty() {
        return NEUTRAL_FACTOR;
    }

    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let std_dev = if samples.len() < 2 {
        0.0
    } else {
        let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
        var.sqrt()
    };

    let ratio = std_dev / (mean + 1.0);
    if ratio.is_nan() {
        0.0
    } else {
        ratio.clamp(0.0, 1.0)
    }
}

/// Higher average volume lowers the factor. Records without a volume count as zero.
fn volume_factor(records: &[HistoricalRecord]) -> f64 {
    if records.is_empty() {
        return NEUTRAL_FACTOR;
    }
    let total: f64 = records
        .iter()
        .map(|r| r.transaction_volume.unwrap_or(0) as f64)
        .sum();
    let avg = total / records.len() as f64;
    1.0 - (avg / HIGH_VOLUME_THRESHOLD).min(1.0)
}

fn history_factor(records: &[HistoricalRecord]) -> f64 {
    let margin = mean_of(records, |r| r.profit_margin).unwrap_or(DEFAULT_PROFIT_MARGIN);
    let liquidity = mean_of(records, |r| r.liquidity_score).unwrap_or(DEFAULT_LIQUIDITY_SCORE);
    ((margin * 10.0 + liquidity / 10.0) / 2.0).clamp(0.0, 1.0)
}

fn risk_adjustment(risk_level: f64, trading_volume: f64, currency_code: &str) -> f64 {
    let currency_risk = currency::risk_weight(currency_code);
    let raw = (risk_level * 0.4 + currency_risk * 0.6) * (1.0 + trading_volume / TRADING_VOLUME_SCALE);
    raw.clamp(0.5, 2.0)
}

fn mean_of<F>(records: &[HistoricalRecord], field: F) -> Option<f64>
where
    F: Fn(&HistoricalRecord) -> Option<Decimal>,
{
    let values: Vec<f64> = records
        .iter()
        .filter_map(|r| field(r).and_then(|v| v.to_f64()))
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn weight(w: f64) -> Result<Decimal, ScoringError> {
    Decimal::from_f64(w).ok_or(ScoringError::NonFinite { field: "weights" })
}

fn round6(v: f64, field: &'static str) -> Result<Decimal, ScoringError> {
    round_to(v, 6, field)
}

fn round_to(v: f64, dp: u32, field: &'static str) -> Result<Decimal, ScoringError> {
    Decimal::from_f64(v)
        .map(|d| half_up(d, dp))
        .ok_or(ScoringError::NonFinite { field })
}

fn half_up(d: Decimal, dp: u32) -> Decimal {
    d.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

fn explain(f: &FactorBreakdown, spread: Decimal) -> String {
    let high = Decimal::new(7, 1);
    let low = Decimal::new(3, 1);
    let mut out = String::from("Weighted scoring analysis:");

    if f.volatility > high {
        out.push_str(" market volatility is high;");
    } else if f.volatility < low {
        out.push_str(" market volatility is low;");
    }
    if f.volume > high {
        out.push_str(" transaction volume is light;");
    } else if f.volume < low {
        out.push_str(" transaction volume is heavy;");
    }
    if f.history > high {
        out.push_str(" historical performance is strong;");
    } else if f.history < low {
        out.push_str(" historical performance is weak;");
    }
    if f.risk_adjustment > Decimal::new(12, 1) {
        out.push_str(" elevated risk adjustment applied.");
    } else if f.risk_adjustment < Decimal::new(8, 1) {
        out.push_str(" reduced risk adjustment applied.");
    } else {
        out.push_str(" factors balanced.");
    }
    out.push_str(&format!(" Recommended spread {spread}."));
    out
}
