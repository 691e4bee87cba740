// crates/clearbill-core/src/validate/guideline.rs
// ============================================================================
// Module: Clearbill Guideline Validator
// Description: Structured contract-rule evaluation per line item.
// Purpose: Evaluate narrative-derived rules and cite their source verbatim.
// Dependencies: crate::core, bigdecimal, serde_json, tracing
// ============================================================================

//! ## Overview
//! Guidelines are structured rules derived from contract narrative language.
//! Each carries a `rule_type` and a `rule_params` document. Evaluation is
//! deterministic and side-effect free: unknown rule types are skipped with a
//! warning, malformed parameters are skipped, and an evaluation failure is
//! converted into a WARNING finding so a bad rule can never fail the
//! pipeline. Every FAIL message cites the narrative source verbatim.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::str::FromStr;

use bigdecimal::BigDecimal;
use tracing::warn;

use crate::core::Finding;
use crate::core::Guideline;
use crate::core::LineItem;
use crate::core::RequiredAction;
use crate::core::ValidationSeverity;
use crate::core::ValidationStatus;
use crate::core::ValidationType;
use crate::core::money::format_dollars;
use crate::core::money::format_quantity;
use crate::core::money::increment_tolerance;

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Runs every applicable guideline against a single line item.
///
/// Pure: reads the line and the guideline list; writes nothing. Returns one
/// finding per applicable guideline that did not pass cleanly.
#[must_use]
pub fn validate_guidelines(line: &LineItem, guidelines: &[Guideline]) -> Vec<Finding> {
    guidelines
        .iter()
        .filter(|guideline| guideline.active && applies_to(guideline, line))
        .filter_map(|guideline| evaluate(guideline, line))
        .collect()
}

/// Applicability filter: taxonomy code match (most specific), else domain
/// match, else global within the contract.
fn applies_to(guideline: &Guideline, line: &LineItem) -> bool {
    if let Some(code) = &guideline.taxonomy_code {
        return line.taxonomy_code.as_ref() == Some(code);
    }
    if let Some(domain) = &guideline.domain {
        return line
            .taxonomy_code
            .as_ref()
            .is_some_and(|code| code.domain() == domain.as_str());
    }
    true
}

/// Dispatches to the rule handler. Returns `None` on PASS or when the rule
/// cannot be interpreted.
fn evaluate(guideline: &Guideline, line: &LineItem) -> Option<Finding> {
    match guideline.rule_type.as_str() {
        "max_units" => check_max_units(guideline, line),
        "requires_auth" => check_requires_auth(guideline, line),
        "billing_increment" => check_billing_increment(guideline, line),
        "bundling_prohibition" => check_bundling_prohibition(guideline, line),
        "cap_amount" => check_cap_amount(guideline, line),
        other => {
            warn!(guideline_id = %guideline.id, rule_type = other, "unknown guideline rule type");
            None
        }
    }
}

/// Produces the evaluation-failure WARNING finding for a guideline.
fn unevaluable(guideline: &Guideline) -> Finding {
    Finding {
        validation_type: ValidationType::Guideline,
        rate_card_id: None,
        guideline_id: Some(guideline.id),
        status: ValidationStatus::Warning,
        severity: ValidationSeverity::Warning,
        message: format!(
            "Guideline check could not be evaluated (rule_type={:?}). Carrier review required.",
            guideline.rule_type
        ),
        expected_value: None,
        actual_value: None,
        required_action: RequiredAction::None,
    }
}

// ============================================================================
// SECTION: Parameter Extraction
// ============================================================================

/// Reads a decimal parameter, accepting JSON numbers or numeric strings.
fn decimal_param(guideline: &Guideline, key: &str) -> Option<BigDecimal> {
    let value = guideline.rule_params.get(key)?;
    let rendered = match value {
        serde_json::Value::Number(number) => number.to_string(),
        serde_json::Value::String(text) => text.clone(),
        _ => return None,
    };
    match BigDecimal::from_str(&rendered) {
        Ok(decimal) => Some(decimal),
        Err(err) => {
            warn!(guideline_id = %guideline.id, key, error = %err,
                "invalid decimal in guideline params");
            None
        }
    }
}

/// Reads a string parameter.
fn str_param<'a>(guideline: &'a Guideline, key: &str) -> Option<&'a str> {
    guideline.rule_params.get(key).and_then(serde_json::Value::as_str)
}

/// Formats the contract narrative source as an inline citation.
fn narrative_cite(guideline: &Guideline) -> String {
    guideline
        .narrative_source
        .as_ref()
        .map(|source| format!("Contract reference: \"{source}\""))
        .unwrap_or_default()
}

// ============================================================================
// SECTION: Rule Handlers
// ============================================================================

/// `max_units`: `{max: decimal, period: "per_claim" | "per_invoice" | "per_day"}`.
fn check_max_units(guideline: &Guideline, line: &LineItem) -> Option<Finding> {
    let Some(max_units) = decimal_param(guideline, "max") else {
        warn!(guideline_id = %guideline.id, "invalid max_units params");
        return None;
    };
    let period = str_param(guideline, "period").unwrap_or("per_claim");

    if line.raw_quantity <= max_units {
        return None;
    }

    let unit_label = line.raw_unit.as_deref().unwrap_or("units");
    let required_action = if guideline.severity == ValidationSeverity::Error {
        RequiredAction::AcceptReduction
    } else {
        RequiredAction::None
    };
    Some(Finding {
        validation_type: ValidationType::Guideline,
        rate_card_id: None,
        guideline_id: Some(guideline.id),
        status: ValidationStatus::Fail,
        severity: guideline.severity,
        message: format!(
            "Quantity {} {unit_label} exceeds contract guideline maximum of {} {period}. {}",
            format_quantity(&line.raw_quantity),
            format_quantity(&max_units),
            narrative_cite(guideline),
        ),
        expected_value: Some(format!("max {} ({period})", format_quantity(&max_units))),
        actual_value: Some(format_quantity(&line.raw_quantity)),
        required_action,
    })
}

/// `requires_auth`: `{required: bool, auth_field: string}`.
///
/// Line items carry no authorization field yet, so the rule flags a WARNING
/// requesting documentation; an attached document satisfies it.
fn check_requires_auth(guideline: &Guideline, _line: &LineItem) -> Option<Finding> {
    let required = guideline
        .rule_params
        .get("required")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(true);
    if !required {
        return None;
    }

    Some(Finding {
        validation_type: ValidationType::Guideline,
        rate_card_id: None,
        guideline_id: Some(guideline.id),
        status: ValidationStatus::Warning,
        severity: ValidationSeverity::Warning,
        message: format!(
            "This service may require prior authorization per contract guidelines. \
             Please attach authorization documentation if applicable. {}",
            narrative_cite(guideline),
        ),
        expected_value: None,
        actual_value: None,
        required_action: RequiredAction::AttachDoc,
    })
}

/// `billing_increment`: `{min_increment: decimal, unit: string}`. Quantity
/// must be a multiple of the increment within a `1e-3` remainder tolerance.
fn check_billing_increment(guideline: &Guideline, line: &LineItem) -> Option<Finding> {
    let min_increment = decimal_param(guideline, "min_increment")?;
    if min_increment <= BigDecimal::from(0) {
        return Some(unevaluable(guideline));
    }

    let remainder = &line.raw_quantity % &min_increment;
    if remainder.abs() <= increment_tolerance() {
        return None;
    }

    let unit_label = str_param(guideline, "unit")
        .map(str::to_owned)
        .or_else(|| line.raw_unit.clone())
        .unwrap_or_else(|| "units".to_owned());
    Some(Finding {
        validation_type: ValidationType::Guideline,
        rate_card_id: None,
        guideline_id: Some(guideline.id),
        status: ValidationStatus::Fail,
        severity: guideline.severity,
        message: format!(
            "Quantity {} {unit_label} is not a valid billing increment. Contract requires \
             billing in increments of {} {unit_label}. Please round to the nearest {} \
             {unit_label}. {}",
            format_quantity(&line.raw_quantity),
            format_quantity(&min_increment),
            format_quantity(&min_increment),
            narrative_cite(guideline),
        ),
        expected_value: Some(format!(
            "multiple of {} {unit_label}",
            format_quantity(&min_increment)
        )),
        actual_value: Some(format!("{} {unit_label}", format_quantity(&line.raw_quantity))),
        required_action: RequiredAction::Reupload,
    })
}

/// `bundling_prohibition`: `{prohibited_components: [string]}`.
fn check_bundling_prohibition(guideline: &Guideline, line: &LineItem) -> Option<Finding> {
    let prohibited: Vec<&str> = guideline
        .rule_params
        .get("prohibited_components")
        .and_then(serde_json::Value::as_array)
        .map(|values| values.iter().filter_map(serde_json::Value::as_str).collect())
        .unwrap_or_default();

    let component = line.billing_component.as_deref()?;
    if !prohibited.contains(&component) {
        return None;
    }

    Some(Finding {
        validation_type: ValidationType::Guideline,
        rate_card_id: None,
        guideline_id: Some(guideline.id),
        status: ValidationStatus::Fail,
        severity: guideline.severity,
        message: format!(
            "Billing component '{component}' is not separately billable under this \
             contract. Prohibited components: {}. {}",
            prohibited.join(", "),
            narrative_cite(guideline),
        ),
        expected_value: Some("Not separately billable".to_owned()),
        actual_value: Some(component.to_owned()),
        required_action: RequiredAction::Reupload,
    })
}

/// `cap_amount`: `{max_amount: decimal}`.
fn check_cap_amount(guideline: &Guideline, line: &LineItem) -> Option<Finding> {
    let max_amount = decimal_param(guideline, "max_amount")?;
    if line.raw_amount <= max_amount {
        return None;
    }

    Some(Finding {
        validation_type: ValidationType::Guideline,
        rate_card_id: None,
        guideline_id: Some(guideline.id),
        status: ValidationStatus::Fail,
        severity: guideline.severity,
        message: format!(
            "Billed amount {} exceeds contract cap of {}. Payment will be limited to {}. {}",
            format_dollars(&line.raw_amount),
            format_dollars(&max_amount),
            format_dollars(&max_amount),
            narrative_cite(guideline),
        ),
        expected_value: Some(format!("max {}", format_dollars(&max_amount))),
        actual_value: Some(format_dollars(&line.raw_amount)),
        required_action: RequiredAction::AcceptReduction,
    })
}
