//! Prompt composition for spread recommendations.
//!
//! Every prompt carries the same data block and output contract; the scenario
//! only changes the framing and the pricing priorities stated up front.

use crate::domain::context::RecommendationContext;
use crate::domain::contract::OUTPUT_FIELDS;
use rust_decimal::Decimal;
use std::fmt::Write as _;

const HIGH_VOLATILITY: f64 = 0.7;
const HIGH_RISK: f64 = 1.5;
const LOW_RISK: f64 = 0.8;
const HIGH_TRADING_VOLUME: f64 = 50_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    Standard,
    Conservative,
    Preferential,
    Volatility,
}

impl Scenario {
    /// First match wins: volatility, then high risk, then low-risk high-volume.
    pub fn classify(risk_level: f64, market_volatility: Option<f64>, trading_volume: f64) -> Self {
        if market_volatility.is_some_and(|v| v > HIGH_VOLATILITY) {
            Self::Volatility
        } else if risk_level > HIGH_RISK {
            Self::Conservative
        } else if risk_level < LOW_RISK && trading_volume > HIGH_TRADING_VOLUME {
            Self::Preferential
        } else {
            Self::Standard
        }
    }

    pub fn for_context(ctx: &RecommendationContext) -> Self {
        Self::classify(
            ctx.customer.risk_level,
            ctx.avg_market_volatility(),
            ctx.customer.trading_volume,
        )
    }

    fn preamble(self) -> &'static [&'static str] {
        match self {
            Self::Standard => &[
                "You are a senior FX pricing and risk specialist advising a bank on rebate spreads.",
                "Recommend the optimal spread for the customer below, weighing credit history,",
                "market liquidity and volatility, currency characteristics, competitive position",
                "and regulatory constraints in a balanced way.",
            ],
            Self::Conservative => &[
                "You are a risk management specialist pricing a HIGH-RISK customer.",
                "Prefer risk control over yield: widen the spread enough to hedge the customer's risk,",
                "include liquidity risk compensation, and state the risk limits and monitoring you",
                "would attach to this price.",
            ],
            Self::Preferential => &[
                "You are a client relationship pricing specialist for a LOW-RISK, HIGH-VOLUME customer.",
                "Offer a competitive spread that protects the relationship and long-term value,",
                "keep the desk competitive with peers, and balance profitability against",
                "customer satisfaction.",
            ],
            Self::Volatility => &[
                "You are a market risk specialist. The market is currently HIGHLY VOLATILE.",
                "Add compensation for volatility risk, assume a shortened validity for this price,",
                "describe the dynamic re-pricing triggers you would use, and call out the",
                "real-time monitoring required.",
            ],
        }
    }
}

/// Builds the instruction text sent to text-generating providers.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptComposer;

impl PromptComposer {
    pub fn new() -> Self {
        Self
    }

    pub fn compose(&self, ctx: &RecommendationContext) -> String {
        self.compose_for(Scenario::for_context(ctx), ctx)
    }

    pub fn compose_for(&self, scenario: Scenario, ctx: &RecommendationContext) -> String {
        let mut out = scenario.preamble().join("\n");
        out.push_str("\n\n");
        push_data_block(&mut out, ctx);
        out.push('\n');
        push_output_contract(&mut out, ctx);
        out
    }
}

fn fmt_opt(v: Option<Decimal>) -> String {
    v.map(|d| d.normalize().to_string())
        .unwrap_or_else(|| "n/a (no history)".to_string())
}

fn push_data_block(out: &mut String, ctx: &RecommendationContext) {
    let s = &ctx.summary;
    let b = &ctx.bounds;
    // Writing to a String cannot fail.
    let _ = write!(
        out,
        "## Customer\n\
- Customer code: {code}\n\
- Customer name: {name}\n\
- Currency: {currency}\n\
- Recommendation date: {date}\n\
- Risk level: {risk} (1.0 = baseline)\n\
- Trading volume: {volume}\n\
\n\
## Historical aggregates\n\
- Average transaction volume: {avg_volume}\n\
- Average transaction amount: {avg_amount}\n\
- Average profit margin: {avg_margin}\n\
- Average liquidity score (1-10): {avg_liquidity}\n\
- Average market volatility: {avg_volatility}\n\
\n\
## Market condition\n\
{market}\n\
\n\
## Customer profile\n\
{profile}\n\
\n\
## Business bounds\n\
- Minimum spread: {min}\n\
- Maximum spread: {max}\n\
- Default spread: {default}\n",
        code = ctx.customer.code,
        name = ctx.customer.name,
        currency = ctx.currency,
        date = ctx.as_of_date,
        risk = ctx.customer.risk_level,
        volume = ctx.customer.trading_volume,
        avg_volume = fmt_opt(s.avg_transaction_volume),
        avg_amount = fmt_opt(s.avg_transaction_amount),
        avg_margin = fmt_opt(s.avg_profit_margin),
        avg_liquidity = fmt_opt(s.avg_liquidity_score),
        avg_volatility = fmt_opt(s.avg_market_volatility),
        market = ctx.market_condition(),
        profile = ctx.customer_profile(),
        min = b.min_spread.normalize(),
        max = b.max_spread.normalize(),
        default = b.default_spread.normalize(),
    );
}

fn push_output_contract(out: &mut String, ctx: &RecommendationContext) {
    let min = ctx.bounds.min_spread.normalize();
    let max = ctx.bounds.max_spread.normalize();
    let _ = write!(
        out,
        "## Output\n\
Respond with ONLY a JSON object inside a ```json fenced block, with exactly these keys: {keys}.\n\
```json\n\
{{\n\
  \"recommendedSpread\": <number between {min} and {max}>,\n\
  \"confidenceScore\": <number between 0 and 1>,\n\
  \"reasoning\": \"pricing logic behind the spread\",\n\
  \"riskAssessment\": \"customer risk assessment and mitigations\",\n\
  \"marketAnalysis\": \"market environment and trend\",\n\
  \"keyFactors\": [\"factor 1\", \"factor 2\", \"factor 3\"]\n\
}}\n\
```\n\
Rules:\n\
- recommendedSpread MUST be within [{min}, {max}]\n\
- confidenceScore MUST be within [0, 1] and reflect data quality and market certainty\n\
- Use double quotes, no comments, no trailing commas\n",
        keys = OUTPUT_FIELDS.join(", "),
    );
}
