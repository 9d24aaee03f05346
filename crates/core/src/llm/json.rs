use crate::domain::context::RecommendationContext;
use crate::domain::contract::{LlmSpreadRecommendation, SpreadPayload};
use anyhow::Context;

const FENCE: &str = "```";
const JSON_FENCE: &str = "```json";

/// Body of the first ```json fenced block (tag matched case-insensitively).
pub fn extract_fenced_json(text: &str) -> Option<&str> {
    let lower = text.to_ascii_lowercase();
    let start = lower.find(JSON_FENCE)? + JSON_FENCE.len();
    let body = &text[start..];
    let end = body.find(FENCE).unwrap_or(body.len());
    let inner = body[..end].trim();
    if inner.is_empty() {
        None
    } else {
        Some(inner)
    }
}

/// Every balanced `{ ... }` literal, in order of its opening brace. Braces inside
/// JSON strings are ignored. One pass over the text, however deep the nesting.
pub fn balanced_objects(text: &str) -> impl Iterator<Item = &str> + '_ {
    let mut open: Vec<usize> = Vec::new();
    let mut spans: Vec<(usize, usize)> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            // Quotes in surrounding prose do not open strings.
            '"' if !open.is_empty() => in_string = true,
            '{' => open.push(i),
            '}' => {
                if let Some(start) = open.pop() {
                    spans.push((start, i));
                }
            }
            _ => {}
        }
    }

    spans.sort_unstable_by_key(|&(start, _)| start);
    spans.into_iter().map(move |(start, end)| &text[start..=end])
}

fn parse_candidate(candidate: &str, ctx: &RecommendationContext) -> anyhow::Result<SpreadPayload> {
    serde_json::from_str::<LlmSpreadRecommendation>(candidate)
        .with_context(|| format!("not a recommendation object: {candidate}"))?
        .validate_and_into_payload(&ctx.bounds)
}

/// Turns free-form model output into a validated payload.
///
/// Precedence: a ```json fenced block, then balanced brace literals left to right.
/// When neither yields a valid recommendation a degraded payload is returned
/// (default spread, low confidence) instead of an error.
pub fn coerce(text: &str, ctx: &RecommendationContext) -> SpreadPayload {
    let mut last_err: Option<anyhow::Error> = None;

    if let Some(fenced) = extract_fenced_json(text) {
        match parse_candidate(fenced, ctx) {
            Ok(payload) => return payload,
            Err(err) => last_err = Some(err),
        }
    }

    for candidate in balanced_objects(text) {
        match parse_candidate(candidate, ctx) {
            Ok(payload) => return payload,
            Err(err) => last_err = Some(err),
        }
    }

    let cause = last_err
        .map(|e| format!("{e:#}"))
        .unwrap_or_else(|| "no JSON object found in response".to_string());
    tracing::warn!(
        customer = %ctx.customer.code,
        error = %cause,
        "LLM output not parseable; using degraded payload"
    );
    tracing::debug!(raw_output = text, "unparseable LLM output");
    SpreadPayload::degraded(&ctx.bounds, &cause)
}
