use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Final, structurally valid answer handed back to the caller for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub recommendation_id: Uuid,
    pub customer_code: String,
    pub currency: String,
    pub as_of_date: NaiveDate,
    pub recommended_spread: Decimal,
    pub confidence_score: Decimal,
    pub reasoning: String,
    pub risk_assessment: String,
    pub market_analysis: String,
    pub key_factors: Vec<String>,
    pub factors: FactorBreakdown,
    pub provenance: Provenance,
    pub validity: ValidityWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactorBreakdown {
    pub volatility: Decimal,
    pub volume: Decimal,
    pub history: Decimal,
    pub risk_adjustment: Decimal,
}

impl FactorBreakdown {
    /// Placeholder for results whose provider did not report factors.
    pub fn neutral() -> Self {
        Self {
            volatility: Decimal::new(5, 1),
            volume: Decimal::new(5, 1),
            history: Decimal::new(5, 1),
            risk_adjustment: Decimal::ONE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub provider: String,
    pub model: String,
    pub used_fallback_path: bool,
    pub used_ai_path: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityWindow {
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ValidityWindow {
    /// Expiry saturates at the latest representable instant.
    pub fn starting_at(generated_at: DateTime<Utc>, hours: i64) -> Self {
        let expires_at = Duration::try_hours(hours)
            .and_then(|d| generated_at.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            generated_at,
            expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn validity_window_spans_configured_hours() {
        let at = Utc.with_ymd_and_hms(2026, 3, 31, 9, 0, 0).unwrap();
        let w = ValidityWindow::starting_at(at, 24);
        assert_eq!(w.expires_at, Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap());
    }

    #[test]
    fn oversized_window_saturates_instead_of_overflowing() {
        let at = Utc.with_ymd_and_hms(2026, 3, 31, 9, 0, 0).unwrap();
        assert_eq!(ValidityWindow::starting_at(at, 10_000_000_000).expires_at, DateTime::<Utc>::MAX_UTC);
        assert_eq!(ValidityWindow::starting_at(at, i64::MAX).expires_at, DateTime::<Utc>::MAX_UTC);
    }
}
