// crates/clearbill-store-sqlite/tests/sqlite_store_unit.rs
// ============================================================================
// Module: SQLite Store Unit Tests
// Description: Schema bootstrap, CAS transitions, audit stamps, round-trips.
// Purpose: Pin the durable store behavior beneath the pipeline.
// ============================================================================

//! Store-level tests against in-memory and on-disk SQLite databases.

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
use clearbill_core::AuditEntityType;
use clearbill_core::Carrier;
use clearbill_core::CarrierId;
use clearbill_core::ConfidenceLabel;
use clearbill_core::ConfirmedBy;
use clearbill_core::Contract;
use clearbill_core::ContractId;
use clearbill_core::GeographyScope;
use clearbill_core::Invoice;
use clearbill_core::InvoiceId;
use clearbill_core::InvoiceStatus;
use clearbill_core::InvoiceStore;
use clearbill_core::MappingRule;
use clearbill_core::MappingRuleId;
use clearbill_core::MatchType;
use clearbill_core::NewAuditEvent;
use clearbill_core::StoreError;
use clearbill_core::StoreTxn;
use clearbill_core::Supplier;
use clearbill_core::SupplierId;
use clearbill_core::TaxonomyCode;
use clearbill_core::Timestamp;
use clearbill_core::TransitionError;
use clearbill_core::runtime;
use clearbill_store_sqlite::SqliteInvoiceStore;
use serde_json::json;
use time::OffsetDateTime;
use time::macros::date;
use time::macros::datetime;
use uuid::Uuid;

fn now() -> Timestamp {
    Timestamp::new(OffsetDateTime::now_utc())
}

fn dec(text: &str) -> BigDecimal {
    BigDecimal::from_str(text).unwrap()
}

/// Seeds taxonomy plus a carrier/supplier/contract triple; returns their ids.
fn seed_parties<T: StoreTxn>(txn: &mut T) -> (CarrierId, SupplierId, ContractId) {
    runtime::seed_taxonomy(txn).unwrap();
    let carrier = Carrier {
        id: CarrierId::generate(),
        name: "Acme Insurance Group".to_owned(),
        short_code: "ACME".to_owned(),
        active: true,
    };
    txn.insert_carrier(&carrier).unwrap();
    let supplier = Supplier {
        id: SupplierId::generate(),
        name: "Meridian IME Services".to_owned(),
        tax_id: None,
        active: true,
    };
    txn.insert_supplier(&supplier).unwrap();
    let contract = Contract {
        id: ContractId::generate(),
        supplier_id: supplier.id,
        carrier_id: carrier.id,
        name: "Acme IME Services Agreement 2025".to_owned(),
        effective_from: date!(2025 - 01 - 01),
        effective_to: None,
        geography_scope: GeographyScope::National,
        state_codes: None,
        active: true,
    };
    txn.insert_contract(&contract).unwrap();
    (carrier.id, supplier.id, contract.id)
}

fn draft_invoice(supplier_id: SupplierId, contract_id: ContractId) -> Invoice {
    Invoice {
        id: InvoiceId::generate(),
        supplier_id,
        contract_id,
        invoice_number: "INV-1001".to_owned(),
        invoice_date: date!(2025 - 03 - 01),
        status: InvoiceStatus::Draft,
        current_version: 1,
        file_pointer: None,
        file_format: None,
        submitted_at: None,
        submission_notes: None,
    }
}

fn mapping_rule(supplier_id: Option<SupplierId>, pattern: &str) -> MappingRule {
    MappingRule {
        id: MappingRuleId::generate(),
        supplier_id,
        match_type: MatchType::KeywordSet,
        match_pattern: pattern.to_owned(),
        taxonomy_code: TaxonomyCode::new("IME.PHY_EXAM.PROF_FEE"),
        billing_component: "PROF_FEE".to_owned(),
        confidence_weight: 0.9,
        confidence_label: ConfidenceLabel::High,
        confirmed_by: ConfirmedBy::System,
        version: 1,
        effective_from: Timestamp::new(datetime!(2025-01-01 0:00:00 UTC)),
        effective_to: None,
        supersedes_rule_id: None,
    }
}

#[test]
fn schema_bootstrap_is_idempotent_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clearbill.db");
    {
        let mut store = SqliteInvoiceStore::open_at(&path).unwrap();
        let mut txn = store.begin().unwrap();
        seed_parties(&mut txn);
        txn.commit().unwrap();
    }
    // Re-opening an existing database must not recreate or damage anything.
    let mut store = SqliteInvoiceStore::open_at(&path).unwrap();
    let mut txn = store.begin().unwrap();
    let item = txn.taxonomy_item(&TaxonomyCode::new("IME.PHY_EXAM.PROF_FEE")).unwrap();
    assert!(item.is_some());
}

#[test]
fn taxonomy_upsert_preserves_persisted_active_flag() {
    let mut store = SqliteInvoiceStore::open_in_memory().unwrap();
    let mut txn = store.begin().unwrap();
    runtime::seed_taxonomy(&mut txn).unwrap();

    // Administratively deactivate one code, then reseed.
    let code = TaxonomyCode::new("IME.NO_SHOW.NO_SHOW_FEE");
    let mut item = txn.taxonomy_item(&code).unwrap().unwrap();
    item.active = false;
    // Direct SQL is not exposed; emulate the admin update through upsert on a
    // fresh row by reinserting with active=false first.
    let fresh_code = TaxonomyCode::new("IME.TEST_ONLY.PROF_FEE");
    let mut fresh = item.clone();
    fresh.code = fresh_code.clone();
    fresh.active = false;
    txn.upsert_taxonomy_item(&fresh).unwrap();

    let mut reseeded = fresh.clone();
    reseeded.active = true;
    reseeded.label = "Updated label".to_owned();
    txn.upsert_taxonomy_item(&reseeded).unwrap();

    let stored = txn.taxonomy_item(&fresh_code).unwrap().unwrap();
    assert_eq!(stored.label, "Updated label", "metadata refreshes on upsert");
    assert!(!stored.active, "active flag is never overwritten by reseeding");
}

#[test]
fn invoice_decimal_and_date_round_trips_exactly() {
    let mut store = SqliteInvoiceStore::open_in_memory().unwrap();
    let mut txn = store.begin().unwrap();
    let (_, supplier_id, contract_id) = seed_parties(&mut txn);

    let invoice = draft_invoice(supplier_id, contract_id);
    txn.insert_invoice(&invoice).unwrap();
    let loaded = txn.invoice(invoice.id).unwrap().unwrap();
    assert_eq!(loaded, invoice);

    let mut line = clearbill_core::LineItem {
        id: clearbill_core::LineItemId::generate(),
        invoice_id: invoice.id,
        invoice_version: 1,
        line_number: 1,
        status: clearbill_core::LineItemStatus::Pending,
        raw_description: "Mileage - 47 miles".to_owned(),
        raw_code: Some("MILE-001".to_owned()),
        raw_amount: dec("28.20"),
        raw_quantity: dec("47.0000"),
        raw_unit: Some("mile".to_owned()),
        claim_number: Some("CLM-001".to_owned()),
        service_date: Some(date!(2025 - 03 - 15)),
        taxonomy_code: None,
        billing_component: None,
        mapping_confidence: None,
        mapping_rule_id: None,
        mapped_rate: None,
        expected_amount: None,
        ai_assessment: None,
    };
    txn.insert_line_item(&line).unwrap();
    let loaded = txn.line_item(line.id).unwrap().unwrap();
    assert_eq!(loaded.raw_amount.to_string(), "28.20", "decimal text round-trips");
    assert_eq!(loaded.raw_quantity.to_string(), "47.0000");
    assert_eq!(loaded, line);

    line.taxonomy_code = Some(TaxonomyCode::new("IME.PHY_EXAM.MILEAGE"));
    line.status = clearbill_core::LineItemStatus::Classified;
    line.expected_amount = Some(dec("31.49"));
    txn.update_line_item(&line).unwrap();
    let updated = txn.line_item(line.id).unwrap().unwrap();
    assert_eq!(updated, line);
}

#[test]
fn cas_transition_accepts_expected_and_rejects_stale() {
    let mut store = SqliteInvoiceStore::open_in_memory().unwrap();
    let mut txn = store.begin().unwrap();
    let (_, supplier_id, contract_id) = seed_parties(&mut txn);
    let invoice = draft_invoice(supplier_id, contract_id);
    txn.insert_invoice(&invoice).unwrap();

    txn.transition_invoice(invoice.id, InvoiceStatus::Draft, InvoiceStatus::Submitted).unwrap();

    // A second actor still believing DRAFT loses the race.
    let err = txn
        .transition_invoice(invoice.id, InvoiceStatus::Draft, InvoiceStatus::Submitted)
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Transition(TransitionError::StaleStatus { .. })
            | StoreError::Transition(TransitionError::Invoice { .. })
    ));
}

#[test]
fn unlisted_transition_is_rejected_before_touching_the_row() {
    let mut store = SqliteInvoiceStore::open_in_memory().unwrap();
    let mut txn = store.begin().unwrap();
    let (_, supplier_id, contract_id) = seed_parties(&mut txn);
    let invoice = draft_invoice(supplier_id, contract_id);
    txn.insert_invoice(&invoice).unwrap();

    let err = txn
        .transition_invoice(invoice.id, InvoiceStatus::Draft, InvoiceStatus::Approved)
        .unwrap_err();
    assert!(matches!(err, StoreError::Transition(TransitionError::Invoice { .. })));
    let stored = txn.invoice(invoice.id).unwrap().unwrap();
    assert_eq!(stored.status, InvoiceStatus::Draft);
}

#[test]
fn audit_events_are_store_stamped_and_totally_ordered() {
    let mut store = SqliteInvoiceStore::open_in_memory().unwrap();
    let mut txn = store.begin().unwrap();
    let entity_id = Uuid::new_v4();

    for index in 0..10 {
        txn.append_audit_event(&NewAuditEvent::system(
            AuditEntityType::Invoice,
            entity_id,
            "invoice.status_changed",
            json!({ "index": index }),
        ))
        .unwrap();
    }

    let events = txn.audit_events_for_entity(AuditEntityType::Invoice, entity_id).unwrap();
    assert_eq!(events.len(), 10);
    for pair in events.windows(2) {
        let earlier = (&pair[0].created_at, pair[0].seq);
        let later = (&pair[1].created_at, pair[1].seq);
        assert!(earlier < later, "audit stamps must strictly increase");
    }
}

#[test]
fn exception_must_reference_fail_or_warning_result() {
    let mut store = SqliteInvoiceStore::open_in_memory().unwrap();
    let mut txn = store.begin().unwrap();
    let (_, supplier_id, contract_id) = seed_parties(&mut txn);
    let invoice = draft_invoice(supplier_id, contract_id);
    txn.insert_invoice(&invoice).unwrap();

    let line = clearbill_core::LineItem {
        id: clearbill_core::LineItemId::generate(),
        invoice_id: invoice.id,
        invoice_version: 1,
        line_number: 1,
        status: clearbill_core::LineItemStatus::Classified,
        raw_description: "IME Physician Examination".to_owned(),
        raw_code: None,
        raw_amount: dec("600.00"),
        raw_quantity: dec("1"),
        raw_unit: None,
        claim_number: None,
        service_date: None,
        taxonomy_code: None,
        billing_component: None,
        mapping_confidence: None,
        mapping_rule_id: None,
        mapped_rate: None,
        expected_amount: None,
        ai_assessment: None,
    };
    txn.insert_line_item(&line).unwrap();

    let pass_result = clearbill_core::ValidationResult {
        id: clearbill_core::ValidationResultId::generate(),
        line_item_id: line.id,
        finding: clearbill_core::Finding {
            validation_type: clearbill_core::ValidationType::Rate,
            rate_card_id: None,
            guideline_id: None,
            status: clearbill_core::ValidationStatus::Pass,
            severity: clearbill_core::ValidationSeverity::Info,
            message: "Amount validated".to_owned(),
            expected_value: None,
            actual_value: None,
            required_action: clearbill_core::RequiredAction::None,
        },
    };
    txn.insert_validation_result(&pass_result).unwrap();

    let err = txn
        .insert_exception(&clearbill_core::ExceptionRecord {
            id: clearbill_core::ExceptionId::generate(),
            line_item_id: line.id,
            validation_result_id: pass_result.id,
            status: clearbill_core::ExceptionStatus::Open,
            supplier_response: None,
            supporting_doc: None,
            resolution_action: None,
            resolution_notes: None,
            resolved_at: None,
            resolved_by: None,
        })
        .unwrap_err();
    assert!(matches!(err, StoreError::Invalid(_)));
}

#[test]
fn mapping_rule_slot_lookup_and_expiry() {
    let mut store = SqliteInvoiceStore::open_in_memory().unwrap();
    let mut txn = store.begin().unwrap();
    let (_, supplier_id, _) = seed_parties(&mut txn);

    let rule = mapping_rule(Some(supplier_id), "ime,exam");
    txn.insert_mapping_rule(&rule).unwrap();

    let found = txn
        .active_rule_for_slot(Some(supplier_id), MatchType::KeywordSet, "ime,exam")
        .unwrap()
        .unwrap();
    assert_eq!(found.id, rule.id);

    // Global scope is a distinct slot.
    assert!(
        txn.active_rule_for_slot(None, MatchType::KeywordSet, "ime,exam").unwrap().is_none()
    );

    txn.expire_mapping_rule(rule.id, now()).unwrap();
    assert!(
        txn.active_rule_for_slot(Some(supplier_id), MatchType::KeywordSet, "ime,exam")
            .unwrap()
            .is_none()
    );
    // Expiring twice conflicts.
    assert!(matches!(
        txn.expire_mapping_rule(rule.id, now()).unwrap_err(),
        StoreError::Conflict(_)
    ));
}

#[test]
fn effective_rules_filter_by_scope_and_effectivity() {
    let mut store = SqliteInvoiceStore::open_in_memory().unwrap();
    let mut txn = store.begin().unwrap();
    let (_, supplier_id, _) = seed_parties(&mut txn);

    let supplier_rule = mapping_rule(Some(supplier_id), "supplier,rule");
    let global_rule = mapping_rule(None, "global,rule");
    let mut expired_rule = mapping_rule(None, "expired,rule");
    expired_rule.effective_to = Some(Timestamp::new(datetime!(2025-02-01 0:00:00 UTC)));
    txn.insert_mapping_rule(&supplier_rule).unwrap();
    txn.insert_mapping_rule(&global_rule).unwrap();
    txn.insert_mapping_rule(&expired_rule).unwrap();

    let at = Timestamp::new(datetime!(2025-06-01 0:00:00 UTC));
    let supplier_rules = txn.effective_mapping_rules(Some(supplier_id), at).unwrap();
    assert_eq!(supplier_rules.len(), 1);
    assert_eq!(supplier_rules[0].id, supplier_rule.id);

    let global_rules = txn.effective_mapping_rules(None, at).unwrap();
    assert_eq!(global_rules.len(), 1);
    assert_eq!(global_rules[0].id, global_rule.id);
}

#[test]
fn rollback_discards_uncommitted_writes() {
    let mut store = SqliteInvoiceStore::open_in_memory().unwrap();
    {
        let mut txn = store.begin().unwrap();
        seed_parties(&mut txn);
        // Dropped without commit.
    }
    let mut txn = store.begin().unwrap();
    let item = txn.taxonomy_item(&TaxonomyCode::new("IME.PHY_EXAM.PROF_FEE")).unwrap();
    assert!(item.is_none(), "dropped transaction must roll back");
}

#[test]
fn rate_card_with_unknown_taxonomy_code_is_rejected() {
    let mut store = SqliteInvoiceStore::open_in_memory().unwrap();
    let mut txn = store.begin().unwrap();
    let (_, _, contract_id) = seed_parties(&mut txn);

    let err = txn
        .insert_rate_card(&clearbill_core::RateCard {
            id: clearbill_core::RateCardId::generate(),
            contract_id,
            taxonomy_code: TaxonomyCode::new("BOGUS.CODE.HERE"),
            contracted_rate: dec("100.00"),
            max_units: None,
            is_all_inclusive: false,
            effective_from: date!(2025 - 01 - 01),
            effective_to: None,
        })
        .unwrap_err();
    assert!(matches!(err, StoreError::Invalid(_)));
}
