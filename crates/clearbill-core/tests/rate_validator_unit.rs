// crates/clearbill-core/tests/rate_validator_unit.rs
// ============================================================================
// Module: Rate Validator Unit Tests
// Description: Amount, unit-cap, bundling, and card-selection checks.
// Purpose: Pin rate validation semantics including tolerance boundaries.
// ============================================================================

//! Rate validation tests over in-memory line items and rate cards.

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
use clearbill_core::Contract;
use clearbill_core::ContractId;
use clearbill_core::GeographyScope;
use clearbill_core::InvoiceId;
use clearbill_core::LineItem;
use clearbill_core::LineItemId;
use clearbill_core::LineItemStatus;
use clearbill_core::RateCard;
use clearbill_core::RateCardId;
use clearbill_core::RequiredAction;
use clearbill_core::SupplierId;
use clearbill_core::TaxonomyCode;
use clearbill_core::ValidationStatus;
use clearbill_core::core::identifiers::CarrierId;
use clearbill_core::validate::validate_rates;
use time::Date;
use time::macros::date;

fn dec(text: &str) -> BigDecimal {
    BigDecimal::from_str(text).unwrap()
}

fn contract() -> Contract {
    Contract {
        id: ContractId::generate(),
        supplier_id: SupplierId::generate(),
        carrier_id: CarrierId::generate(),
        name: "Acme IME Services Agreement 2025".to_owned(),
        effective_from: date!(2025 - 01 - 01),
        effective_to: None,
        geography_scope: GeographyScope::National,
        state_codes: None,
        active: true,
    }
}

fn card(contract_id: ContractId, code: &str, rate: &str) -> RateCard {
    RateCard {
        id: RateCardId::generate(),
        contract_id,
        taxonomy_code: TaxonomyCode::new(code),
        contracted_rate: dec(rate),
        max_units: None,
        is_all_inclusive: false,
        effective_from: date!(2025 - 01 - 01),
        effective_to: None,
    }
}

fn line(code: Option<&str>, amount: &str, quantity: &str) -> LineItem {
    LineItem {
        id: LineItemId::generate(),
        invoice_id: InvoiceId::generate(),
        invoice_version: 1,
        line_number: 1,
        status: LineItemStatus::Classified,
        raw_description: "IME Physician Examination".to_owned(),
        raw_code: None,
        raw_amount: dec(amount),
        raw_quantity: dec(quantity),
        raw_unit: Some("report".to_owned()),
        claim_number: Some("CLM-001".to_owned()),
        service_date: Some(date!(2025 - 03 - 15)),
        taxonomy_code: code.map(TaxonomyCode::new),
        billing_component: Some("PROF_FEE".to_owned()),
        mapping_confidence: None,
        mapping_rule_id: None,
        mapped_rate: None,
        expected_amount: None,
        ai_assessment: None,
    }
}

const TODAY: Date = date!(2025 - 06 - 01);

#[test]
fn exact_amount_passes_with_expected_value() {
    let contract = contract();
    let cards = vec![card(contract.id, "IME.PHY_EXAM.PROF_FEE", "600.00")];
    let outcome =
        validate_rates(&line(Some("IME.PHY_EXAM.PROF_FEE"), "600.00", "1"), &contract, &cards, TODAY);

    assert_eq!(outcome.findings.len(), 1);
    let finding = &outcome.findings[0];
    assert_eq!(finding.status, ValidationStatus::Pass);
    assert_eq!(finding.expected_value.as_deref(), Some("$600.00"));
    assert_eq!(finding.actual_value.as_deref(), Some("$600.00"));
    assert!(outcome.expected_amount.is_none());
    assert_eq!(outcome.mapped_rate, Some(dec("600.00")));
}

#[test]
fn amount_within_tolerance_passes_at_tolerance_plus_epsilon_fails() {
    let contract = contract();
    let cards = vec![card(contract.id, "IME.PHY_EXAM.PROF_FEE", "600.00")];

    let at_tolerance =
        validate_rates(&line(Some("IME.PHY_EXAM.PROF_FEE"), "600.02", "1"), &contract, &cards, TODAY);
    assert_eq!(at_tolerance.findings[0].status, ValidationStatus::Pass);

    let past_tolerance =
        validate_rates(&line(Some("IME.PHY_EXAM.PROF_FEE"), "600.03", "1"), &contract, &cards, TODAY);
    assert_eq!(past_tolerance.findings[0].status, ValidationStatus::Fail);
}

#[test]
fn overbill_fails_with_reduction_and_expected_amount() {
    let contract = contract();
    let cards = vec![card(contract.id, "IME.PHY_EXAM.PROF_FEE", "600.00")];
    let outcome =
        validate_rates(&line(Some("IME.PHY_EXAM.PROF_FEE"), "725.00", "1"), &contract, &cards, TODAY);

    let finding = &outcome.findings[0];
    assert_eq!(finding.status, ValidationStatus::Fail);
    assert_eq!(finding.required_action, RequiredAction::AcceptReduction);
    assert_eq!(finding.expected_value.as_deref(), Some("$600.00"));
    assert_eq!(finding.actual_value.as_deref(), Some("$725.00"));
    assert_eq!(outcome.expected_amount, Some(dec("600.00")));
}

#[test]
fn underbill_warns_and_is_paid_as_billed() {
    let contract = contract();
    let cards = vec![card(contract.id, "IME.PHY_EXAM.MILEAGE", "0.67")];
    // 47 miles x $0.67 = $31.49; billed $28.20 is under the contracted rate.
    let outcome =
        validate_rates(&line(Some("IME.PHY_EXAM.MILEAGE"), "28.20", "47"), &contract, &cards, TODAY);

    let finding = &outcome.findings[0];
    assert_eq!(finding.status, ValidationStatus::Warning);
    assert_eq!(finding.required_action, RequiredAction::None);
    assert_eq!(finding.expected_value.as_deref(), Some("$31.49"));
    assert!(outcome.expected_amount.is_none(), "underbilling never caps payment");
}

#[test]
fn unclassified_line_fails_requesting_reclassification() {
    let contract = contract();
    let outcome = validate_rates(&line(None, "600.00", "1"), &contract, &[], TODAY);

    assert_eq!(outcome.findings.len(), 1);
    assert_eq!(outcome.findings[0].status, ValidationStatus::Fail);
    assert_eq!(outcome.findings[0].required_action, RequiredAction::RequestReclassification);
}

#[test]
fn missing_rate_card_fails_with_contract_name_in_message() {
    let contract = contract();
    let outcome =
        validate_rates(&line(Some("IME.PHY_EXAM.PROF_FEE"), "600.00", "1"), &contract, &[], TODAY);

    assert_eq!(outcome.findings.len(), 1);
    let finding = &outcome.findings[0];
    assert_eq!(finding.status, ValidationStatus::Fail);
    assert_eq!(finding.required_action, RequiredAction::RequestReclassification);
    assert!(finding.message.contains("No contracted rate"));
    assert!(finding.message.contains(&contract.name));
}

#[test]
fn max_units_breach_caps_payable_at_cap_times_rate() {
    let contract = contract();
    let mut lodging = card(contract.id, "IME.PHY_EXAM.TRAVEL_LODGING", "200.00");
    lodging.max_units = Some(dec("1"));
    let cards = vec![lodging];

    let mut item = line(Some("IME.PHY_EXAM.TRAVEL_LODGING"), "400.00", "2");
    item.billing_component = Some("TRAVEL_LODGING".to_owned());
    let outcome = validate_rates(&item, &contract, &cards, TODAY);

    // The amount check passes (2 x 200 = 400); the unit cap fails it.
    let statuses: Vec<ValidationStatus> =
        outcome.findings.iter().map(|finding| finding.status).collect();
    assert_eq!(statuses, vec![ValidationStatus::Pass, ValidationStatus::Fail]);
    assert_eq!(outcome.findings[1].required_action, RequiredAction::AcceptReduction);
    assert_eq!(outcome.expected_amount, Some(dec("200.00")));
}

#[test]
fn all_inclusive_rate_rejects_separate_travel_billing() {
    let contract = contract();
    let mut exam = card(contract.id, "IME.PHY_EXAM.MILEAGE", "600.00");
    exam.is_all_inclusive = true;
    let cards = vec![exam];

    let mut item = line(Some("IME.PHY_EXAM.MILEAGE"), "31.49", "47");
    item.billing_component = Some("MILEAGE".to_owned());
    let outcome = validate_rates(&item, &contract, &cards, TODAY);

    let bundling = outcome
        .findings
        .iter()
        .find(|finding| finding.required_action == RequiredAction::Reupload)
        .expect("bundling finding");
    assert_eq!(bundling.status, ValidationStatus::Fail);
    assert!(bundling.message.contains("all-inclusive"));
}

#[test]
fn most_recent_effective_card_wins() {
    let contract = contract();
    let mut old = card(contract.id, "IME.PHY_EXAM.PROF_FEE", "550.00");
    old.effective_from = date!(2024 - 01 - 01);
    let new = card(contract.id, "IME.PHY_EXAM.PROF_FEE", "600.00");
    let cards = vec![old, new];

    let outcome =
        validate_rates(&line(Some("IME.PHY_EXAM.PROF_FEE"), "600.00", "1"), &contract, &cards, TODAY);
    assert_eq!(outcome.findings[0].status, ValidationStatus::Pass);
    assert_eq!(outcome.mapped_rate, Some(dec("600.00")));
}

#[test]
fn card_effective_exactly_on_service_date_is_eligible() {
    let contract = contract();
    let mut exam = card(contract.id, "IME.PHY_EXAM.PROF_FEE", "600.00");
    exam.effective_from = date!(2025 - 03 - 15);
    let cards = vec![exam];

    let outcome =
        validate_rates(&line(Some("IME.PHY_EXAM.PROF_FEE"), "600.00", "1"), &contract, &cards, TODAY);
    assert_eq!(outcome.findings[0].status, ValidationStatus::Pass);
}

#[test]
fn card_expired_the_day_before_service_date_is_ineligible() {
    let contract = contract();
    let mut exam = card(contract.id, "IME.PHY_EXAM.PROF_FEE", "600.00");
    exam.effective_to = Some(date!(2025 - 03 - 14));
    let cards = vec![exam];

    let outcome =
        validate_rates(&line(Some("IME.PHY_EXAM.PROF_FEE"), "600.00", "1"), &contract, &cards, TODAY);
    assert_eq!(outcome.findings[0].status, ValidationStatus::Fail);
    assert!(outcome.findings[0].message.contains("No contracted rate"));
}

#[test]
fn absent_service_date_falls_back_to_today() {
    let contract = contract();
    let mut exam = card(contract.id, "IME.PHY_EXAM.PROF_FEE", "600.00");
    exam.effective_from = date!(2025 - 05 - 01);
    let cards = vec![exam];

    let mut item = line(Some("IME.PHY_EXAM.PROF_FEE"), "600.00", "1");
    item.service_date = None;
    let outcome = validate_rates(&item, &contract, &cards, TODAY);
    assert_eq!(outcome.findings[0].status, ValidationStatus::Pass);
}

#[test]
fn intermediate_products_round_half_even_at_comparison() {
    let contract = contract();
    let cards = vec![card(contract.id, "ENG.FILE_REVIEW.PROF_FEE", "185.25")];
    // 2.5 x 185.25 = 463.125; half-even rounds to 463.12.
    let mut item = line(Some("ENG.FILE_REVIEW.PROF_FEE"), "463.12", "2.5");
    item.raw_unit = Some("hour".to_owned());
    let outcome = validate_rates(&item, &contract, &cards, TODAY);
    assert_eq!(outcome.findings[0].status, ValidationStatus::Pass);
    assert_eq!(outcome.findings[0].expected_value.as_deref(), Some("$463.12"));
}
