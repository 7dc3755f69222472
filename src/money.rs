//! Conversion of human-entered major-unit amounts into integer cents.
//!
//! Every monetary value past this boundary is an `i64` cent count; floating
//! point only appears transiently while a JSON number is rounded into cents.

use serde::Deserialize;

/// A major-unit amount as it arrives at the API boundary: a JSON number
/// (`10.5`) or a human-entered decimal string (`"10,50"`).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MajorAmount {
    Number(f64),
    Text(String),
}

impl MajorAmount {
    /// Convert to integer cents, rounding to the nearest cent.
    pub fn to_cents(&self) -> Option<i64> {
        match self {
            MajorAmount::Number(value) => {
                if !value.is_finite() {
                    return None;
                }
                Some((value * 100.0).round() as i64)
            }
            MajorAmount::Text(text) => parse_amount_to_cents(text),
        }
    }
}

/// Parse a decimal string with comma or dot separator into cents.
/// At most two decimal places; an empty input or a bare sign is rejected.
pub fn parse_amount_to_cents(input: &str) -> Option<i64> {
    let mut s = input.trim().to_string();
    if s.is_empty() {
        return None;
    }
    let negative = s.starts_with('-');
    if negative {
        s.remove(0);
        if s.is_empty() {
            return None;
        }
    }
    s = s.replace(',', ".");
    let mut parts = s.split('.');
    let whole_str = parts.next()?;
    let frac_str = parts.next();
    if parts.next().is_some() {
        return None;
    }
    let whole: i64 = whole_str.parse().ok()?;
    let frac = match frac_str {
        None => 0,
        Some(frac) => {
            if frac.len() > 2 {
                return None;
            }
            let mut padded = frac.to_string();
            while padded.len() < 2 {
                padded.push('0');
            }
            padded.parse::<i64>().ok()?
        }
    };
    let cents = whole * 100 + frac;
    Some(if negative { -cents } else { cents })
}
