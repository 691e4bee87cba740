// crates/clearbill-core/tests/guideline_validator_unit.rs
// ============================================================================
// Module: Guideline Validator Unit Tests
// Description: Structured rule evaluation, applicability, and citations.
// Purpose: Pin guideline semantics including narrative citation verbatim.
// ============================================================================

//! Guideline validation tests over in-memory lines and rules.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::str::FromStr;

use bigdecimal::BigDecimal;
use clearbill_core::ContractId;
use clearbill_core::Guideline;
use clearbill_core::GuidelineId;
use clearbill_core::InvoiceId;
use clearbill_core::LineItem;
use clearbill_core::LineItemId;
use clearbill_core::LineItemStatus;
use clearbill_core::RequiredAction;
use clearbill_core::TaxonomyCode;
use clearbill_core::ValidationSeverity;
use clearbill_core::ValidationStatus;
use clearbill_core::validate::validate_guidelines;
use serde_json::json;
use time::macros::date;

fn dec(text: &str) -> BigDecimal {
    BigDecimal::from_str(text).unwrap()
}

fn guideline(
    taxonomy_code: Option<&str>,
    domain: Option<&str>,
    rule_type: &str,
    rule_params: serde_json::Value,
    narrative: Option<&str>,
) -> Guideline {
    Guideline {
        id: GuidelineId::generate(),
        contract_id: ContractId::generate(),
        taxonomy_code: taxonomy_code.map(TaxonomyCode::new),
        domain: domain.map(str::to_owned),
        rule_type: rule_type.to_owned(),
        rule_params,
        severity: ValidationSeverity::Error,
        narrative_source: narrative.map(str::to_owned),
        active: true,
    }
}

fn line(code: &str, component: &str, amount: &str, quantity: &str) -> LineItem {
    LineItem {
        id: LineItemId::generate(),
        invoice_id: InvoiceId::generate(),
        invoice_version: 1,
        line_number: 1,
        status: LineItemStatus::Classified,
        raw_description: "Airfare for examining physician".to_owned(),
        raw_code: None,
        raw_amount: dec(amount),
        raw_quantity: dec(quantity),
        raw_unit: Some("hour".to_owned()),
        claim_number: None,
        service_date: Some(date!(2025 - 03 - 15)),
        taxonomy_code: Some(TaxonomyCode::new(code)),
        billing_component: Some(component.to_owned()),
        mapping_confidence: None,
        mapping_rule_id: None,
        mapped_rate: None,
        expected_amount: None,
        ai_assessment: None,
    }
}

#[test]
fn cap_amount_breach_cites_narrative_verbatim() {
    let narrative = "Airfare reimbursement capped at $400 per exam";
    let rules = vec![guideline(
        Some("IME.PHY_EXAM.TRAVEL_TRANSPORT"),
        None,
        "cap_amount",
        json!({ "max_amount": "400.00" }),
        Some(narrative),
    )];
    let findings = validate_guidelines(
        &line("IME.PHY_EXAM.TRAVEL_TRANSPORT", "TRAVEL_TRANSPORT", "500.00", "1"),
        &rules,
    );

    assert_eq!(findings.len(), 1);
    let finding = &findings[0];
    assert_eq!(finding.status, ValidationStatus::Fail);
    assert_eq!(finding.required_action, RequiredAction::AcceptReduction);
    assert!(finding.message.contains("$400"));
    assert!(finding.message.contains(narrative), "narrative must be cited verbatim");
}

#[test]
fn cap_amount_at_cap_passes() {
    let rules = vec![guideline(
        Some("IME.PHY_EXAM.TRAVEL_TRANSPORT"),
        None,
        "cap_amount",
        json!({ "max_amount": "400.00" }),
        None,
    )];
    let findings = validate_guidelines(
        &line("IME.PHY_EXAM.TRAVEL_TRANSPORT", "TRAVEL_TRANSPORT", "400.00", "1"),
        &rules,
    );
    assert!(findings.is_empty());
}

#[test]
fn max_units_breach_fails_with_reduction_on_error_severity() {
    let rules = vec![guideline(
        Some("INV.SURVEILLANCE.PROF_FEE"),
        None,
        "max_units",
        json!({ "max": "8", "period": "per_day" }),
        Some("Surveillance limited to 8 hours per day"),
    )];
    let findings =
        validate_guidelines(&line("INV.SURVEILLANCE.PROF_FEE", "PROF_FEE", "900.00", "10"), &rules);

    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].status, ValidationStatus::Fail);
    assert_eq!(findings[0].required_action, RequiredAction::AcceptReduction);
    assert!(findings[0].message.contains("per_day"));
}

#[test]
fn max_units_warning_severity_requires_no_action() {
    let mut rule = guideline(
        Some("INV.SURVEILLANCE.PROF_FEE"),
        None,
        "max_units",
        json!({ "max": "8" }),
        None,
    );
    rule.severity = ValidationSeverity::Warning;
    let findings =
        validate_guidelines(&line("INV.SURVEILLANCE.PROF_FEE", "PROF_FEE", "900.00", "10"), &[rule]);
    assert_eq!(findings[0].required_action, RequiredAction::None);
}

#[test]
fn billing_increment_remainder_boundary() {
    let rules = vec![guideline(
        None,
        Some("ENG"),
        "billing_increment",
        json!({ "min_increment": "0.25", "unit": "hour" }),
        None,
    )];

    // 1.25 is an exact multiple.
    let exact = validate_guidelines(&line("ENG.FILE_REVIEW.PROF_FEE", "PROF_FEE", "1.00", "1.25"), &rules);
    assert!(exact.is_empty());

    // Remainder 0.001 sits exactly at the tolerance.
    let at_tolerance =
        validate_guidelines(&line("ENG.FILE_REVIEW.PROF_FEE", "PROF_FEE", "1.00", "0.251"), &rules);
    assert!(at_tolerance.is_empty());

    // 1.3 leaves remainder 0.05 and fails.
    let invalid =
        validate_guidelines(&line("ENG.FILE_REVIEW.PROF_FEE", "PROF_FEE", "1.00", "1.3"), &rules);
    assert_eq!(invalid.len(), 1);
    assert_eq!(invalid[0].status, ValidationStatus::Fail);
    assert_eq!(invalid[0].required_action, RequiredAction::Reupload);
}

#[test]
fn bundling_prohibition_flags_listed_components() {
    let rules = vec![guideline(
        None,
        Some("IME"),
        "bundling_prohibition",
        json!({ "prohibited_components": ["TRAVEL_TRANSPORT", "MILEAGE"] }),
        Some("All travel is included in the examination fee"),
    )];

    let flagged = validate_guidelines(
        &line("IME.PHY_EXAM.MILEAGE", "MILEAGE", "31.49", "47"),
        &rules,
    );
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0].required_action, RequiredAction::Reupload);

    let clean =
        validate_guidelines(&line("IME.PHY_EXAM.PROF_FEE", "PROF_FEE", "600.00", "1"), &rules);
    assert!(clean.is_empty());
}

#[test]
fn requires_auth_warns_requesting_documentation() {
    let rules = vec![guideline(
        Some("IME.MULTI_SPECIALTY.PROF_FEE"),
        None,
        "requires_auth",
        json!({ "required": true, "auth_field": "auth_number" }),
        Some("Multi-specialty panels require prior authorization"),
    )];
    let findings = validate_guidelines(
        &line("IME.MULTI_SPECIALTY.PROF_FEE", "PROF_FEE", "1200.00", "1"),
        &rules,
    );

    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].status, ValidationStatus::Warning);
    assert_eq!(findings[0].required_action, RequiredAction::AttachDoc);
}

#[test]
fn requires_auth_not_required_passes() {
    let rules = vec![guideline(
        Some("IME.MULTI_SPECIALTY.PROF_FEE"),
        None,
        "requires_auth",
        json!({ "required": false }),
        None,
    )];
    let findings = validate_guidelines(
        &line("IME.MULTI_SPECIALTY.PROF_FEE", "PROF_FEE", "1200.00", "1"),
        &rules,
    );
    assert!(findings.is_empty());
}

#[test]
fn unknown_rule_type_produces_no_finding() {
    let rules = vec![guideline(None, None, "quantum_audit", json!({}), None)];
    let findings =
        validate_guidelines(&line("IME.PHY_EXAM.PROF_FEE", "PROF_FEE", "600.00", "1"), &rules);
    assert!(findings.is_empty());
}

#[test]
fn malformed_params_are_skipped_not_fatal() {
    let rules = vec![guideline(
        None,
        None,
        "cap_amount",
        json!({ "max_amount": { "nested": true } }),
        None,
    )];
    let findings =
        validate_guidelines(&line("IME.PHY_EXAM.PROF_FEE", "PROF_FEE", "600.00", "1"), &rules);
    assert!(findings.is_empty());
}

#[test]
fn applicability_prefers_code_then_domain_then_global() {
    let wrong_code = guideline(
        Some("IME.ADDENDUM.PROF_FEE"),
        None,
        "cap_amount",
        json!({ "max_amount": "1.00" }),
        None,
    );
    let wrong_domain =
        guideline(None, Some("ENG"), "cap_amount", json!({ "max_amount": "1.00" }), None);
    let global = guideline(None, None, "cap_amount", json!({ "max_amount": "100.00" }), None);
    let rules = vec![wrong_code, wrong_domain, global];

    let findings =
        validate_guidelines(&line("IME.PHY_EXAM.PROF_FEE", "PROF_FEE", "600.00", "1"), &rules);
    // Only the global cap applies; the scoped rules miss this line.
    assert_eq!(findings.len(), 1);
    assert!(findings[0].message.contains("$100.00"));
}

#[test]
fn inactive_guidelines_are_not_evaluated() {
    let mut rule = guideline(None, None, "cap_amount", json!({ "max_amount": "1.00" }), None);
    rule.active = false;
    let findings =
        validate_guidelines(&line("IME.PHY_EXAM.PROF_FEE", "PROF_FEE", "600.00", "1"), &[rule]);
    assert!(findings.is_empty());
}
