// crates/clearbill-core/tests/classifier_unit.rs
// ============================================================================
// Module: Classifier Unit Tests
// Description: Layered rule resolution, ranking, and override protocol.
// Purpose: Pin classification precedence and the supersedes chain law.
// ============================================================================

//! Classification engine tests over built-in and persisted rule snapshots.

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

use clearbill_core::Classifier;
use clearbill_core::Confidence;
use clearbill_core::ConfidenceLabel;
use clearbill_core::ConfirmedBy;
use clearbill_core::MappingRule;
use clearbill_core::MappingRuleId;
use clearbill_core::MatchType;
use clearbill_core::SupplierId;
use clearbill_core::TaxonomyCode;
use clearbill_core::Timestamp;
use clearbill_core::classify::OverrideRequest;
use clearbill_core::classify::plan_override;
use time::macros::datetime;

fn now() -> Timestamp {
    Timestamp::new(datetime!(2025-06-01 12:00:00 UTC))
}

fn rule(
    supplier_id: Option<SupplierId>,
    match_type: MatchType,
    pattern: &str,
    code: &str,
    weight: f64,
) -> MappingRule {
    MappingRule {
        id: MappingRuleId::generate(),
        supplier_id,
        match_type,
        match_pattern: pattern.to_owned(),
        taxonomy_code: TaxonomyCode::new(code),
        billing_component: code.rsplit('.').next().unwrap_or("PROF_FEE").to_owned(),
        confidence_weight: weight,
        confidence_label: ConfidenceLabel::from_weight(weight),
        confirmed_by: ConfirmedBy::System,
        version: 1,
        effective_from: Timestamp::new(datetime!(2025-01-01 0:00:00 UTC)),
        effective_to: None,
        supersedes_rule_id: None,
    }
}

#[test]
fn builtin_classifies_ime_physician_exam() {
    let result = Classifier.classify("IME Physician Examination", None, &[], &[], now());
    assert_eq!(
        result.taxonomy_code.as_ref().map(TaxonomyCode::as_str),
        Some("IME.PHY_EXAM.PROF_FEE")
    );
    assert!(!result.is_unrecognized());
    assert!(result.matched_rule_id.is_none(), "built-in rules carry no rule id");
}

#[test]
fn builtin_classifies_surveillance_high_confidence() {
    let result = Classifier.classify("Claimant surveillance - 8 hours", None, &[], &[], now());
    assert_eq!(
        result.taxonomy_code.as_ref().map(TaxonomyCode::as_str),
        Some("INV.SURVEILLANCE.PROF_FEE")
    );
    assert_eq!(result.confidence, Confidence::High);
}

#[test]
fn unmatched_description_is_unrecognized_with_zero_weight() {
    let result =
        Classifier.classify("Completely unrecognizable xyzzy entry", None, &[], &[], now());
    assert!(result.is_unrecognized());
    assert!(result.taxonomy_code.is_none());
    assert!((result.confidence_weight - 0.0).abs() < f64::EPSILON);
}

#[test]
fn keyword_hyphen_and_period_forms_both_match() {
    let hyphen = Classifier.classify("Multi-specialty IME panel", None, &[], &[], now());
    let period = Classifier.classify("Multi.specialty IME panel", None, &[], &[], now());
    let collapsed = Classifier.classify("Multispecialty IME panel", None, &[], &[], now());
    for result in [hyphen, period, collapsed] {
        assert_eq!(
            result.taxonomy_code.as_ref().map(TaxonomyCode::as_str),
            Some("IME.MULTI_SPECIALTY.PROF_FEE")
        );
    }
}

#[test]
fn confidence_buckets_follow_weight_thresholds() {
    assert_eq!(Confidence::from_weight(0.85), Confidence::High);
    assert_eq!(Confidence::from_weight(0.84), Confidence::Medium);
    assert_eq!(Confidence::from_weight(0.65), Confidence::Medium);
    assert_eq!(Confidence::from_weight(0.64), Confidence::Low);
}

#[test]
fn supplier_rules_beat_global_rules_and_builtins() {
    let supplier_id = SupplierId::generate();
    let supplier_rules = vec![rule(
        Some(supplier_id),
        MatchType::KeywordSet,
        "ime,exam",
        "IME.RECORDS_REVIEW.PROF_FEE",
        0.70,
    )];
    let global_rules =
        vec![rule(None, MatchType::KeywordSet, "ime,exam", "IME.ADDENDUM.PROF_FEE", 0.95)];

    let result = Classifier.classify(
        "IME physician exam",
        None,
        &supplier_rules,
        &global_rules,
        now(),
    );
    // Supplier-specific source wins even against a heavier global rule.
    assert_eq!(
        result.taxonomy_code.as_ref().map(TaxonomyCode::as_str),
        Some("IME.RECORDS_REVIEW.PROF_FEE")
    );
    assert_eq!(result.matched_rule_id, Some(supplier_rules[0].id));
}

#[test]
fn global_rules_beat_builtins() {
    let global_rules =
        vec![rule(None, MatchType::KeywordSet, "surveillance", "INV.AOE_COE.PROF_FEE", 0.50)];
    let result = Classifier.classify("Surveillance day one", None, &[], &global_rules, now());
    assert_eq!(
        result.taxonomy_code.as_ref().map(TaxonomyCode::as_str),
        Some("INV.AOE_COE.PROF_FEE")
    );
}

#[test]
fn exact_code_match_is_case_insensitive() {
    let supplier_id = SupplierId::generate();
    let rules = vec![rule(
        Some(supplier_id),
        MatchType::ExactCode,
        "IME-001",
        "IME.PHY_EXAM.PROF_FEE",
        0.90,
    )];
    let result = Classifier.classify("whatever text", Some("ime-001"), &rules, &[], now());
    assert_eq!(result.match_type, Some(MatchType::ExactCode));
    assert_eq!(
        result.taxonomy_code.as_ref().map(TaxonomyCode::as_str),
        Some("IME.PHY_EXAM.PROF_FEE")
    );
}

#[test]
fn equal_weight_ties_break_on_match_type_specificity() {
    let keyword = rule(None, MatchType::KeywordSet, "addendum", "IME.ADDENDUM.PROF_FEE", 0.80);
    let exact = rule(None, MatchType::ExactCode, "add-01", "IME.PEER_REVIEW.PROF_FEE", 0.80);
    let result =
        Classifier.classify("addendum report", Some("ADD-01"), &[], &[keyword, exact], now());
    assert_eq!(result.match_type, Some(MatchType::ExactCode));
}

#[test]
fn invalid_persisted_regex_is_skipped_without_crashing() {
    let rules = vec![
        rule(None, MatchType::RegexPattern, "([unclosed", "IME.ADDENDUM.PROF_FEE", 0.99),
        rule(None, MatchType::KeywordSet, "addendum", "IME.ADDENDUM.PROF_FEE", 0.80),
    ];
    let result = Classifier.classify("addendum report", None, &[], &rules, now());
    assert_eq!(result.match_type, Some(MatchType::KeywordSet));
}

#[test]
fn expired_rules_are_ignored() {
    let mut expired =
        rule(None, MatchType::KeywordSet, "surveillance", "INV.AOE_COE.PROF_FEE", 0.99);
    expired.effective_to = Some(Timestamp::new(datetime!(2025-02-01 0:00:00 UTC)));
    let result = Classifier.classify("surveillance", None, &[], &[expired], now());
    // Falls through to the built-in surveillance rule.
    assert_eq!(
        result.taxonomy_code.as_ref().map(TaxonomyCode::as_str),
        Some("INV.SURVEILLANCE.PROF_FEE")
    );
}

#[test]
fn override_of_empty_slot_starts_a_fresh_chain() {
    let request = OverrideRequest {
        supplier_id: None,
        match_type: MatchType::KeywordSet,
        match_pattern: "records review".to_owned(),
        taxonomy_code: TaxonomyCode::new("IME.RECORDS_REVIEW.PROF_FEE"),
        billing_component: "PROF_FEE".to_owned(),
    };
    let plan = plan_override(request, None, |_| None, now()).unwrap();
    assert!(plan.expire_rule_id.is_none());
    assert_eq!(plan.new_rule.version, 1);
    assert!(plan.new_rule.supersedes_rule_id.is_none());
    assert_eq!(plan.new_rule.confirmed_by, ConfirmedBy::CarrierOverride);
    assert!((plan.new_rule.confidence_weight - 1.0).abs() < f64::EPSILON);
    assert_eq!(plan.new_rule.confidence_label, ConfidenceLabel::High);
}

#[test]
fn override_chain_walks_back_through_full_history() {
    let first = rule(None, MatchType::KeywordSet, "peer review", "IME.PEER_REVIEW.PROF_FEE", 0.8);

    let request = |code: &str| OverrideRequest {
        supplier_id: None,
        match_type: MatchType::KeywordSet,
        match_pattern: "peer review".to_owned(),
        taxonomy_code: TaxonomyCode::new(code),
        billing_component: "PROF_FEE".to_owned(),
    };

    let plan_two =
        plan_override(request("IME.RECORDS_REVIEW.PROF_FEE"), Some(&first), |_| None, now())
            .unwrap();
    assert_eq!(plan_two.expire_rule_id, Some(first.id));
    assert_eq!(plan_two.new_rule.version, 2);
    assert_eq!(plan_two.new_rule.supersedes_rule_id, Some(first.id));

    let second = plan_two.new_rule;
    let first_clone = first.clone();
    let plan_three = plan_override(
        request("IME.ADDENDUM.PROF_FEE"),
        Some(&second),
        move |id| (id == first_clone.id).then(|| first_clone.clone()),
        now(),
    )
    .unwrap();
    // Version equals the chain length; supersedes points at the prior head.
    assert_eq!(plan_three.new_rule.version, 3);
    assert_eq!(plan_three.new_rule.supersedes_rule_id, Some(second.id));
}

#[test]
fn cyclic_supersedes_chain_is_rejected() {
    let mut first = rule(None, MatchType::KeywordSet, "skip,trace", "INV.SKIP_TRACE.PROF_FEE", 0.9);
    let mut second =
        rule(None, MatchType::KeywordSet, "skip,trace", "INV.SKIP_TRACE.PROF_FEE", 0.9);
    first.supersedes_rule_id = Some(second.id);
    second.supersedes_rule_id = Some(first.id);

    let request = OverrideRequest {
        supplier_id: None,
        match_type: MatchType::KeywordSet,
        match_pattern: "skip,trace".to_owned(),
        taxonomy_code: TaxonomyCode::new("INV.SKIP_TRACE.PROF_FEE"),
        billing_component: "PROF_FEE".to_owned(),
    };
    let lookup_first = first.clone();
    let lookup_second = second.clone();
    let outcome = plan_override(
        request,
        Some(&first),
        move |id| {
            if id == lookup_first.id {
                Some(lookup_first.clone())
            } else if id == lookup_second.id {
                Some(lookup_second.clone())
            } else {
                None
            }
        },
        now(),
    );
    assert!(outcome.is_err(), "cyclic chain must be rejected");
}
