//! Numeric signal extraction from free text.
//!
//! Only the first mention of each kind is used; nothing is summed across
//! mentions. A kind with no match stays `None`.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::models::Signals;

static MONEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\$\s?([0-9]{1,3}(?:,[0-9]{3})+(?:\.[0-9]+)?|[0-9]+(?:\.[0-9]+)?)(?:\s?(billion|bn|b|million|mm|m|thousand|k)\b)?",
    )
    .expect("valid money regex")
});

static SQFT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([0-9][0-9,]{2,})[\s-]?(?:sq\.?\s?ft\b\.?|square[\s-]+f(?:ee|oo)t\b|sf\b)")
        .expect("valid sqft regex")
});

static JOBS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b([0-9][0-9,]*)\s+(?:new\s+)?jobs?\b").expect("valid jobs regex")
});

fn multiplier(suffix: Option<&str>) -> f64 {
    match suffix.map(str::to_ascii_lowercase).as_deref() {
        Some("billion" | "bn" | "b") => 1_000_000_000.0,
        Some("million" | "mm" | "m") => 1_000_000.0,
        Some("thousand" | "k") => 1_000.0,
        _ => 1.0,
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse::<f64>().ok()
}

fn money(caps: Captures<'_>) -> Option<f64> {
    let value = parse_number(caps.get(1)?.as_str())?;
    Some(value * multiplier(caps.get(2).map(|m| m.as_str())))
}

fn first_number(re: &Regex, text: &str) -> Option<f64> {
    re.captures(text).and_then(|c| parse_number(c.get(1)?.as_str()))
}

/// Pull investment, area and job counts out of `text`.
pub fn extract_signals(text: &str) -> Signals {
    if text.is_empty() {
        return Signals::default();
    }
    Signals {
        investment_usd: MONEY_RE.captures(text).and_then(money),
        sqft: first_number(&SQFT_RE, text),
        jobs: first_number(&JOBS_RE, text),
    }
}
