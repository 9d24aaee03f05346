use crate::domain::currency;
use anyhow::ensure;
use chrono::{Duration, NaiveDate};
use rust_decimal::prelude::*;
use rust_decimal::RoundingStrategy;
use serde::{Deserialize, Serialize};

const DEFAULT_PROFIT_MARGIN: &str = "0.05";
const DEFAULT_LIQUIDITY_SCORE: &str = "5.0";
const DEFAULT_MARKET_VOLATILITY: &str = "0.5";

const DEFAULT_MARKET_CONDITION: &str = "standard market conditions";
const DEFAULT_CUSTOMER_PROFILE: &str = "standard customer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadBounds {
    pub min_spread: Decimal,
    pub max_spread: Decimal,
    pub default_spread: Decimal,
}

impl SpreadBounds {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.min_spread >= Decimal::ZERO,
            "min_spread must be non-negative (got {})",
            self.min_spread
        );
        ensure!(
            self.min_spread <= self.max_spread,
            "min_spread {} exceeds max_spread {}",
            self.min_spread,
            self.max_spread
        );
        ensure!(
            (self.min_spread..=self.max_spread).contains(&self.default_spread),
            "default_spread {} outside [{}, {}]",
            self.default_spread,
            self.min_spread,
            self.max_spread
        );
        Ok(())
    }

    pub fn clamp(&self, spread: Decimal) -> Decimal {
        spread.max(self.min_spread).min(self.max_spread)
    }

    /// Default spread, forced into range in case the bounds were built by hand.
    pub fn clamped_default(&self) -> Decimal {
        self.clamp(self.default_spread)
    }
}

/// One billing record for the customer/currency pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRecord {
    pub billing_date: NaiveDate,
    pub transaction_amount: Option<Decimal>,
    pub transaction_volume: Option<i64>,
    pub market_volatility: Option<Decimal>,
    pub liquidity_score: Option<Decimal>,
    pub profit_margin: Option<Decimal>,
}

/// Aggregates over the history window. All fields are `None` when there was no history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoricalSummary {
    pub avg_transaction_volume: Option<Decimal>,
    pub avg_transaction_amount: Option<Decimal>,
    pub avg_profit_margin: Option<Decimal>,
    pub avg_liquidity_score: Option<Decimal>,
    pub avg_market_volatility: Option<Decimal>,
}

impl HistoricalSummary {
    pub fn from_records(records: &[HistoricalRecord]) -> Self {
        if records.is_empty() {
            return Self::default();
        }

        Self {
            avg_transaction_volume: aggregate(
                "transaction_volume",
                records,
                |r| r.transaction_volume.map(Decimal::from),
                Decimal::ZERO,
            ),
            avg_transaction_amount: aggregate(
                "transaction_amount",
                records,
                |r| r.transaction_amount,
                Decimal::ZERO,
            ),
            avg_profit_margin: aggregate(
                "profit_margin",
                records,
                |r| r.profit_margin,
                constant(DEFAULT_PROFIT_MARGIN),
            ),
            avg_liquidity_score: aggregate(
                "liquidity_score",
                records,
                |r| r.liquidity_score,
                constant(DEFAULT_LIQUIDITY_SCORE),
            ),
            avg_market_volatility: aggregate(
                "market_volatility",
                records,
                |r| r.market_volatility,
                constant(DEFAULT_MARKET_VOLATILITY),
            ),
        }
    }
}

fn constant(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap_or_default()
}

/// Mean of a field, `default` when no record carries it, `None` when the sum
/// does not fit in a `Decimal`.
fn aggregate<F>(
    field: &'static str,
    records: &[HistoricalRecord],
    value: F,
    default: Decimal,
) -> Option<Decimal>
where
    F: Fn(&HistoricalRecord) -> Option<Decimal>,
{
    let values: Vec<Decimal> = records.iter().filter_map(value).collect();
    if values.is_empty() {
        return Some(default);
    }
    let avg = average(&values);
    if avg.is_none() {
        tracing::warn!(field, records = values.len(), "aggregate overflowed; treating as absent");
    }
    avg
}

fn average(values: &[Decimal]) -> Option<Decimal> {
    let sum = values
        .iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(*v))?;
    sum.checked_div(Decimal::from(values.len()))
        .map(|avg| avg.round_dp_with_strategy(6, RoundingStrategy::MidpointAwayFromZero))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub code: String,
    pub name: String,
    /// 1.0 is the baseline.
    pub risk_level: f64,
    pub trading_volume: f64,
}

/// Everything a provider needs to produce one recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationContext {
    pub customer: CustomerProfile,
    pub currency: String,
    pub as_of_date: NaiveDate,
    pub summary: HistoricalSummary,
    pub bounds: SpreadBounds,
    #[serde(default)]
    pub market_condition: Option<String>,
    #[serde(default)]
    pub customer_profile: Option<String>,
    /// Records the summary was computed from.
    #[serde(default)]
    pub history: Vec<HistoricalRecord>,
}

impl RecommendationContext {
    pub fn from_request(
        request: RecommendationRequest,
        bounds: SpreadBounds,
        history_days: i64,
    ) -> Self {
        // Dates near the calendar limits clamp the window instead of overflowing.
        let window_start = Duration::try_days(history_days)
            .and_then(|d| request.as_of_date.checked_sub_signed(d))
            .unwrap_or(NaiveDate::MIN);
        let history: Vec<HistoricalRecord> = request
            .history
            .into_iter()
            .filter(|r| (window_start..=request.as_of_date).contains(&r.billing_date))
            .collect();

        let summary = HistoricalSummary::from_records(&history);
        let market_condition = describe_market(&summary, &request.currency);
        let customer_profile = describe_customer(request.risk_level, request.trading_volume);

        Self {
            customer: CustomerProfile {
                code: request.customer_code,
                name: request.customer_name,
                risk_level: request.risk_level,
                trading_volume: request.trading_volume,
            },
            currency: request.currency.trim().to_ascii_uppercase(),
            as_of_date: request.as_of_date,
            summary,
            bounds,
            market_condition: Some(market_condition),
            customer_profile: Some(customer_profile),
            history,
        }
    }

    pub fn market_condition(&self) -> &str {
        self.market_condition
            .as_deref()
            .unwrap_or(DEFAULT_MARKET_CONDITION)
    }

    pub fn customer_profile(&self) -> &str {
        self.customer_profile
            .as_deref()
            .unwrap_or(DEFAULT_CUSTOMER_PROFILE)
    }

    pub fn avg_market_volatility(&self) -> Option<f64> {
        self.summary.avg_market_volatility.and_then(|v| v.to_f64())
    }
}

fn default_risk_level() -> f64 {
    1.0
}

/// Inbound request, before history is windowed and summarised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRequest {
    pub customer_code: String,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default = "default_risk_level")]
    pub risk_level: f64,
    #[serde(default)]
    pub trading_volume: f64,
    pub currency: String,
    pub as_of_date: NaiveDate,
    #[serde(default)]
    pub history: Vec<HistoricalRecord>,
}

impl RecommendationRequest {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            !self.customer_code.trim().is_empty(),
            "customer_code must be non-empty"
        );
        ensure!(
            !self.currency.trim().is_empty(),
            "currency must be non-empty"
        );
        ensure!(
            self.risk_level.is_finite() && self.risk_level > 0.0,
            "risk_level must be a positive number (got {})",
            self.risk_level
        );
        ensure!(
            self.trading_volume.is_finite() && self.trading_volume >= 0.0,
            "trading_volume must be non-negative (got {})",
            self.trading_volume
        );
        Ok(())
    }
}

fn describe_market(summary: &HistoricalSummary, currency_code: &str) -> String {
    let mut out = String::new();
    if let Some(volatility) = summary.avg_market_volatility.and_then(|v| v.to_f64()) {
        if volatility > 0.7 {
            out.push_str("Market volatility is elevated. ");
        } else if volatility < 0.3 {
            out.push_str("Market is relatively stable. ");
        } else {
            out.push_str("Market volatility is normal. ");
        }
    }
    out.push_str(currency::market_note(currency_code));
    out
}

fn describe_customer(risk_level: f64, trading_volume: f64) -> String {
    let risk = if risk_level > 1.5 {
        "High-risk customer"
    } else if risk_level < 0.8 {
        "Low-risk preferred customer"
    } else {
        "Standard-risk customer"
    };
    let activity = if trading_volume > 50_000.0 {
        "high-frequency trading with large volume"
    } else if trading_volume > 10_000.0 {
        "moderate trading frequency"
    } else {
        "low trading frequency"
    };
    format!("{risk}, {activity}")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    pub(crate) fn bounds() -> SpreadBounds {
        SpreadBounds {
            min_spread: dec("0.01"),
            max_spread: dec("0.5"),
            default_spread: dec("0.1"),
        }
    }

    pub(crate) fn record(day: u32, volatility: Option<&str>) -> HistoricalRecord {
        HistoricalRecord {
            billing_date: NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
            transaction_amount: Some(dec("1500")),
            transaction_volume: Some(40),
            market_volatility: volatility.map(dec),
            liquidity_score: Some(dec("6")),
            profit_margin: Some(dec("0.04")),
        }
    }

    pub(crate) fn context(risk_level: f64, trading_volume: f64) -> RecommendationContext {
        RecommendationContext::from_request(
            RecommendationRequest {
                customer_code: "CUST-001".to_string(),
                customer_name: "Harbor Trading".to_string(),
                risk_level,
                trading_volume,
                currency: "USD".to_string(),
                as_of_date: NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
                history: Vec::new(),
            },
            bounds(),
            30,
        )
    }

    #[test]
    fn empty_history_leaves_aggregates_absent() {
        let summary = HistoricalSummary::from_records(&[]);
        assert_eq!(summary, HistoricalSummary::default());
    }

    #[test]
    fn summary_uses_documented_defaults_for_missing_fields() {
        let mut r = record(2, None);
        r.profit_margin = None;
        r.liquidity_score = None;
        let summary = HistoricalSummary::from_records(&[r]);
        assert_eq!(summary.avg_profit_margin, Some(dec("0.05")));
        assert_eq!(summary.avg_liquidity_score, Some(dec("5")));
        assert_eq!(summary.avg_market_volatility, Some(dec("0.5")));
        assert_eq!(summary.avg_transaction_volume, Some(dec("40")));
    }

    #[test]
    fn from_request_windows_history_and_describes_customer() {
        let request = RecommendationRequest {
            customer_code: "CUST-002".to_string(),
            customer_name: "Pacific".to_string(),
            risk_level: 1.8,
            trading_volume: 60_000.0,
            currency: "gbp".to_string(),
            as_of_date: NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
            history: vec![
                record(1, Some("0.8")),
                record(20, Some("0.9")),
                HistoricalRecord {
                    billing_date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
                    ..record(1, Some("0.1"))
                },
            ],
        };

        let ctx = RecommendationContext::from_request(request, bounds(), 30);
        assert_eq!(ctx.currency, "GBP");
        assert_eq!(ctx.history.len(), 2);
        assert_eq!(ctx.summary.avg_market_volatility, Some(dec("0.85")));
        assert!(ctx.market_condition().starts_with("Market volatility is elevated"));
        assert_eq!(
            ctx.customer_profile(),
            "High-risk customer, high-frequency trading with large volume"
        );
    }

    #[test]
    fn clamp_respects_bounds() {
        let b = bounds();
        assert_eq!(b.clamp(dec("0.9")), dec("0.5"));
        assert_eq!(b.clamp(dec("0.001")), dec("0.01"));
        assert_eq!(b.clamp(dec("0.2")), dec("0.2"));
    }

    #[test]
    fn request_validation_rejects_non_positive_risk() {
        let mut req = RecommendationRequest {
            customer_code: "C".to_string(),
            customer_name: String::new(),
            risk_level: 0.0,
            trading_volume: 0.0,
            currency: "USD".to_string(),
            as_of_date: NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
            history: Vec::new(),
        };
        assert!(req.validate().is_err());
        req.risk_level = 1.0;
        assert!(req.validate().is_ok());
        req.currency = "  ".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn overflowing_amounts_leave_aggregate_absent() {
        let mut a = record(10, Some("0.4"));
        a.transaction_amount = Some(Decimal::MAX);
        let mut b = record(11, Some("0.6"));
        b.transaction_amount = Some(Decimal::MAX);

        let ctx = RecommendationContext::from_request(
            RecommendationRequest {
                customer_code: "CUST-003".to_string(),
                customer_name: String::new(),
                risk_level: 1.0,
                trading_volume: 0.0,
                currency: "USD".to_string(),
                as_of_date: NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
                history: vec![a, b],
            },
            bounds(),
            30,
        );
        assert_eq!(ctx.summary.avg_transaction_amount, None);
        assert_eq!(ctx.summary.avg_market_volatility, Some(dec("0.5")));
        assert_eq!(ctx.history.len(), 2);
    }

    #[test]
    fn earliest_representable_date_does_not_overflow_window() {
        let request: RecommendationRequest = serde_json::from_str(
            r#"{"customer_code": "C", "currency": "USD", "as_of_date": "-262143-01-05",
                "history": [{"billing_date": "-262143-01-02"}]}"#,
        )
        .unwrap();
        assert!(request.validate().is_ok());

        let ctx = RecommendationContext::from_request(request, bounds(), 30);
        assert_eq!(ctx.history.len(), 1);

        let far = RecommendationContext::from_request(
            RecommendationRequest {
                as_of_date: NaiveDate::MAX,
                history: vec![record(1, None)],
                ..serde_json::from_str::<RecommendationRequest>(
                    r#"{"customer_code": "C", "currency": "USD", "as_of_date": "2026-03-31"}"#,
                )
                .unwrap()
            },
            bounds(),
            i64::MAX,
        );
        assert_eq!(far.history.len(), 1);
    }
}
