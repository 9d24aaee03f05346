//! Per-currency constants used by both scoring and prompt context.

/// Fixed risk weight per currency. Reserve currencies are cheapest, anything
/// outside the table is treated as illiquid.
pub fn risk_weight(code: &str) -> f64 {
    match code.trim().to_ascii_uppercase().as_str() {
        "USD" | "EUR" => 0.8,
        "GBP" | "JPY" | "CHF" => 0.9,
        "CNY" | "CAD" | "AUD" => 1.0,
        "HKD" | "SGD" => 1.1,
        _ => 1.2,
    }
}

/// Short market note for a currency, used in descriptors and narratives.
pub fn market_note(code: &str) -> &'static str {
    match code.trim().to_ascii_uppercase().as_str() {
        "USD" => "USD liquidity is deep and the reserve-currency status keeps it stable.",
        "EUR" => "EUR pricing is sensitive to ECB policy moves.",
        "JPY" => "JPY carries safe-haven demand and is sensitive to rate policy.",
        "GBP" => "GBP reacts visibly to UK political and economic news; volatility is relatively high.",
        "CNY" => "CNY internationalisation is progressing but the rate remains tightly managed.",
        _ => "Liquidity in this currency is moderate; geopolitical risk needs extra attention.",
    }
}
