// crates/clearbill-core/src/validate/rate.rs
// ============================================================================
// Module: Clearbill Rate Validator
// Description: Billed-amount checks against contracted rate cards.
// Purpose: Find the applicable rate card and emit per-line rate findings.
// Dependencies: crate::core, bigdecimal, time
// ============================================================================

//! ## Overview
//! For each line the validator selects the rate card effective at the service
//! date (most recent `effective_from` wins) and checks billed amount against
//! `quantity x contracted_rate` with a small tolerance, billed quantity
//! against the card's unit cap, and travel/expense components against
//! all-inclusive bundling. Every check yields a finding; multiple findings
//! per line are normal and all are recorded.

// ============================================================================
// SECTION: Imports
// ============================================================================

use bigdecimal::BigDecimal;
use time::Date;

use crate::core::Finding;
use crate::core::LineItem;
use crate::core::RateCard;
use crate::core::RequiredAction;
use crate::core::ValidationSeverity;
use crate::core::ValidationStatus;
use crate::core::ValidationType;
use crate::core::money::amount_tolerance;
use crate::core::money::format_dollars;
use crate::core::money::format_quantity;
use crate::core::money::round_currency;
use crate::core::party::Contract;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Billing components that an all-inclusive rate card prohibits billing
/// separately.
const TRAVEL_COMPONENTS: &[&str] =
    &["TRAVEL_TRANSPORT", "TRAVEL_LODGING", "TRAVEL_MEALS", "MILEAGE"];

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// Rate validation outcome: the findings plus the expected payable amount
/// derived from the applicable card, when one was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateOutcome {
    /// Findings in check order.
    pub findings: Vec<Finding>,
    /// Rate applied from the selected card.
    pub mapped_rate: Option<BigDecimal>,
    /// Expected amount when the amount check failed (payable cap).
    pub expected_amount: Option<BigDecimal>,
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Runs all rate checks for a single line item.
///
/// Pure: reads the line, the contract, and the candidate rate cards for the
/// line's taxonomy code; writes nothing. `today` supplies the fallback
/// service date for lines that carry none.
#[must_use]
pub fn validate_rates(
    line: &LineItem,
    contract: &Contract,
    rate_cards: &[RateCard],
    today: Date,
) -> RateOutcome {
    let mut outcome = RateOutcome {
        findings: Vec::new(),
        mapped_rate: None,
        expected_amount: None,
    };

    let Some(taxonomy_code) = &line.taxonomy_code else {
        outcome.findings.push(Finding {
            validation_type: ValidationType::Rate,
            rate_card_id: None,
            guideline_id: None,
            status: ValidationStatus::Fail,
            severity: ValidationSeverity::Error,
            message: "Line item could not be classified to a taxonomy code. \
                      Rate validation requires a valid service classification. \
                      Please clarify the service description or request reclassification."
                .to_owned(),
            expected_value: None,
            actual_value: None,
            required_action: RequiredAction::RequestReclassification,
        });
        return outcome;
    };

    let service_date = line.service_date.unwrap_or(today);
    let Some(card) = select_rate_card(rate_cards, service_date) else {
        outcome.findings.push(Finding {
            validation_type: ValidationType::Rate,
            rate_card_id: None,
            guideline_id: None,
            status: ValidationStatus::Fail,
            severity: ValidationSeverity::Error,
            message: format!(
                "No contracted rate found for service '{taxonomy_code}' under contract \
                 '{}'. This service may not be covered or may require carrier \
                 pre-approval.",
                contract.name
            ),
            expected_value: None,
            actual_value: None,
            required_action: RequiredAction::RequestReclassification,
        });
        return outcome;
    };

    outcome.mapped_rate = Some(card.contracted_rate.clone());

    let (amount_finding, expected) = check_amount(line, card);
    if amount_finding.status == ValidationStatus::Fail {
        outcome.expected_amount = Some(expected.clone());
    }
    outcome.findings.push(amount_finding);

    if let Some(max_units) = &card.max_units {
        let (units_finding, capped) = check_max_units(line, card, max_units);
        if units_finding.status == ValidationStatus::Fail
            && let Some(capped) = capped
        {
            // Payable is capped at max_units x rate when the cap is breached.
            outcome.expected_amount = Some(capped);
        }
        outcome.findings.push(units_finding);
    }

    if card.is_all_inclusive
        && let Some(bundling_finding) = check_bundling(line, card)
    {
        outcome.findings.push(bundling_finding);
    }

    outcome
}

/// Selects the applicable rate card: effective at the service date, greatest
/// `effective_from` wins.
fn select_rate_card(rate_cards: &[RateCard], service_date: Date) -> Option<&RateCard> {
    rate_cards
        .iter()
        .filter(|card| card.covers(service_date))
        .max_by_key(|card| card.effective_from)
}

// ============================================================================
// SECTION: Checks
// ============================================================================

/// Checks billed amount against `quantity x contracted_rate`.
fn check_amount(line: &LineItem, card: &RateCard) -> (Finding, BigDecimal) {
    let expected = round_currency(&(&line.raw_quantity * &card.contracted_rate));
    let billed = &line.raw_amount;
    let diff = billed - &expected;
    let tolerance = amount_tolerance();
    let unit_label = line.raw_unit.as_deref().unwrap_or("units");

    let finding = if diff.abs() <= tolerance {
        Finding {
            validation_type: ValidationType::Rate,
            rate_card_id: Some(card.id),
            guideline_id: None,
            status: ValidationStatus::Pass,
            severity: ValidationSeverity::Info,
            message: format!(
                "Amount validated: billed {} matches contracted rate {} x {} units = {}.",
                format_dollars(billed),
                format_dollars(&card.contracted_rate),
                format_quantity(&line.raw_quantity),
                format_dollars(&expected),
            ),
            expected_value: Some(format_dollars(&expected)),
            actual_value: Some(format_dollars(billed)),
            required_action: RequiredAction::None,
        }
    } else if diff > tolerance {
        Finding {
            validation_type: ValidationType::Rate,
            rate_card_id: Some(card.id),
            guideline_id: None,
            status: ValidationStatus::Fail,
            severity: ValidationSeverity::Error,
            message: format!(
                "Billed amount {} exceeds contracted rate. Contracted rate: {} x {} \
                 {unit_label} = {}. Overage: {}. Payment will be limited to {}.",
                format_dollars(billed),
                format_dollars(&card.contracted_rate),
                format_quantity(&line.raw_quantity),
                format_dollars(&expected),
                format_dollars(&diff),
                format_dollars(&expected),
            ),
            expected_value: Some(format_dollars(&expected)),
            actual_value: Some(format_dollars(billed)),
            required_action: RequiredAction::AcceptReduction,
        }
    } else {
        // Underbilled: unusual but not blocking; paid as billed.
        Finding {
            validation_type: ValidationType::Rate,
            rate_card_id: Some(card.id),
            guideline_id: None,
            status: ValidationStatus::Warning,
            severity: ValidationSeverity::Warning,
            message: format!(
                "Billed amount {} is less than contracted rate ({} x {} = {}). \
                 Amount will be paid as billed.",
                format_dollars(billed),
                format_dollars(&card.contracted_rate),
                format_quantity(&line.raw_quantity),
                format_dollars(&expected),
            ),
            expected_value: Some(format_dollars(&expected)),
            actual_value: Some(format_dollars(billed)),
            required_action: RequiredAction::None,
        }
    };

    (finding, expected)
}

/// Checks billed quantity against the card's unit cap. Returns the capped
/// payable amount alongside a FAIL finding.
fn check_max_units(
    line: &LineItem,
    card: &RateCard,
    max_units: &BigDecimal,
) -> (Finding, Option<BigDecimal>) {
    let unit_label = line.raw_unit.as_deref().unwrap_or("units");
    if &line.raw_quantity > max_units {
        let capped = round_currency(&(max_units * &card.contracted_rate));
        let taxonomy = line.taxonomy_code.as_ref().map_or("", |code| code.as_str());
        let finding = Finding {
            validation_type: ValidationType::Rate,
            rate_card_id: Some(card.id),
            guideline_id: None,
            status: ValidationStatus::Fail,
            severity: ValidationSeverity::Error,
            message: format!(
                "Quantity {} {unit_label} exceeds contract maximum of {} for {taxonomy}. \
                 Payment will be limited to {} units x {}.",
                format_quantity(&line.raw_quantity),
                format_quantity(max_units),
                format_quantity(max_units),
                format_dollars(&card.contracted_rate),
            ),
            expected_value: Some(format!("max {} units", format_quantity(max_units))),
            actual_value: Some(format!("{} units", format_quantity(&line.raw_quantity))),
            required_action: RequiredAction::AcceptReduction,
        };
        return (finding, Some(capped));
    }

    (
        Finding {
            validation_type: ValidationType::Rate,
            rate_card_id: Some(card.id),
            guideline_id: None,
            status: ValidationStatus::Pass,
            severity: ValidationSeverity::Info,
            message: format!(
                "Quantity {} within contract maximum of {}.",
                format_quantity(&line.raw_quantity),
                format_quantity(max_units),
            ),
            expected_value: None,
            actual_value: None,
            required_action: RequiredAction::None,
        },
        None,
    )
}

/// Flags travel/expense components billed separately under an all-inclusive
/// rate.
fn check_bundling(line: &LineItem, card: &RateCard) -> Option<Finding> {
    let component = line.billing_component.as_deref()?;
    if !TRAVEL_COMPONENTS.contains(&component) {
        return None;
    }
    let domain = line.taxonomy_code.as_ref().map_or("", |code| code.domain());
    Some(Finding {
        validation_type: ValidationType::Rate,
        rate_card_id: Some(card.id),
        guideline_id: None,
        status: ValidationStatus::Fail,
        severity: ValidationSeverity::Error,
        message: format!(
            "The contracted rate for {domain} services is all-inclusive (rate card: {}). \
             Travel and expense charges ({component}) must not be billed separately. \
             This line will not be approved.",
            format_dollars(&card.contracted_rate),
        ),
        expected_value: Some("Not separately billable (all-inclusive rate)".to_owned()),
        actual_value: Some(format!("{} ({component})", format_dollars(&line.raw_amount))),
        required_action: RequiredAction::Reupload,
    })
}
