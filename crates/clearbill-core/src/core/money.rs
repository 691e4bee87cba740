// crates/clearbill-core/src/core/money.rs
// ============================================================================
// Module: Clearbill Money Model
// Description: Fixed-precision decimal helpers for monetary arithmetic.
// Purpose: Keep all money handling decimal-exact with banker's rounding.
// Dependencies: bigdecimal
// ============================================================================

//! ## Overview
//! All monetary values in Clearbill are [`BigDecimal`]. Binary floating point
//! never touches money. Intermediate products keep full precision; rounding to
//! two fractional digits happens once, at the final comparison step, using
//! banker's rounding (half-even).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use bigdecimal::rounding::RoundingMode;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Rate amount tolerance in dollars: billed-vs-expected differences within
/// this band validate as PASS.
pub const AMOUNT_TOLERANCE: &str = "0.02";

/// Billing increment remainder tolerance.
pub const INCREMENT_TOLERANCE: &str = "0.001";

// ============================================================================
// SECTION: Rounding and Parsing
// ============================================================================

/// Rounds a decimal to two fractional digits using banker's rounding.
#[must_use]
pub fn round_currency(value: &BigDecimal) -> BigDecimal {
    value.with_scale_round(2, RoundingMode::HalfEven)
}

/// Returns the amount tolerance as a decimal.
#[must_use]
pub fn amount_tolerance() -> BigDecimal {
    // The literal is a valid decimal; `unwrap_or_default` keeps the
    // constructor infallible without a panic path.
    BigDecimal::from_str(AMOUNT_TOLERANCE).unwrap_or_default()
}

/// Returns the billing increment tolerance as a decimal.
#[must_use]
pub fn increment_tolerance() -> BigDecimal {
    BigDecimal::from_str(INCREMENT_TOLERANCE).unwrap_or_default()
}

/// Parses a monetary string, stripping currency symbols, thousands
/// separators, and whitespace.
///
/// Returns `None` when the cleaned value is empty or not a valid decimal.
#[must_use]
pub fn parse_money(raw: &str) -> Option<BigDecimal> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '$' | ',') && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    BigDecimal::from_str(&cleaned).ok()
}

/// Formats a decimal as a dollar string with two fractional digits,
/// e.g. `$600.00`.
#[must_use]
pub fn format_dollars(value: &BigDecimal) -> String {
    let mut out = String::with_capacity(16);
    // Infallible for String targets.
    let _ = write!(out, "${}", round_currency(value));
    out
}

/// Formats a quantity without trailing normalization, preserving the scale
/// the supplier billed in.
#[must_use]
pub fn format_quantity(value: &BigDecimal) -> String {
    value.normalized().to_string()
}
