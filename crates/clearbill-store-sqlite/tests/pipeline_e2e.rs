// crates/clearbill-store-sqlite/tests/pipeline_e2e.rs
// ============================================================================
// Module: Pipeline End-to-End Tests
// Description: Full upload-to-export scenarios against SQLite.
// Purpose: Pin observable state for the core submission scenarios.
// ============================================================================

//! End-to-end pipeline scenarios: clean pass, overbill, unrecognized
//! service, unit caps, guideline citations, and the full resolution
//! lifecycle through export.

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

use std::collections::HashMap;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use clearbill_core::Actor;
use clearbill_core::ActorId;
use clearbill_core::AuditEntityType;
use clearbill_core::Carrier;
use clearbill_core::CarrierId;
use clearbill_core::Contract;
use clearbill_core::ContractId;
use clearbill_core::ExceptionStatus;
use clearbill_core::FileStorage;
use clearbill_core::GeographyScope;
use clearbill_core::Guideline;
use clearbill_core::GuidelineId;
use clearbill_core::InvoiceId;
use clearbill_core::InvoiceStatus;
use clearbill_core::LineItemStatus;
use clearbill_core::PipelineError;
use clearbill_core::ProcessSummary;
use clearbill_core::RateCard;
use clearbill_core::RateCardId;
use clearbill_core::RequiredAction;
use clearbill_core::ResolutionAction;
use clearbill_core::StorageError;
use clearbill_core::StoreTxn;
use clearbill_core::Supplier;
use clearbill_core::SupplierId;
use clearbill_core::TaxonomyCode;
use clearbill_core::Timestamp;
use clearbill_core::ValidationSeverity;
use clearbill_core::ValidationStatus;
use clearbill_core::runtime;
use clearbill_store_sqlite::SqliteInvoiceStore;
use serde_json::json;
use time::OffsetDateTime;
use time::macros::date;

// ============================================================================
// SECTION: Harness
// ============================================================================

/// In-memory file storage for tests.
#[derive(Default)]
struct MemoryStorage {
    files: HashMap<String, Vec<u8>>,
}

impl FileStorage for MemoryStorage {
    fn save(&mut self, key: &str, data: &[u8]) -> Result<String, StorageError> {
        self.files.insert(key.to_owned(), data.to_vec());
        Ok(key.to_owned())
    }

    fn load(&self, pointer: &str) -> Result<Vec<u8>, StorageError> {
        self.files.get(pointer).cloned().ok_or_else(|| StorageError::NotFound(pointer.to_owned()))
    }
}

struct TestEnv {
    store: SqliteInvoiceStore,
    storage: MemoryStorage,
    supplier_actor: Actor,
    carrier_actor: Actor,
    contract_id: ContractId,
}

fn dec(text: &str) -> BigDecimal {
    BigDecimal::from_str(text).unwrap()
}

fn now() -> Timestamp {
    Timestamp::new(OffsetDateTime::now_utc())
}

/// Seeds taxonomy, parties, the IME rate cards, and the airfare guideline.
fn setup() -> TestEnv {
    let mut store = SqliteInvoiceStore::open_in_memory().unwrap();
    let carrier_id = CarrierId::generate();
    let supplier_id = SupplierId::generate();
    let contract_id = ContractId::generate();

    runtime::with_txn(&mut store, |txn| {
        runtime::seed_taxonomy(txn)?;
        txn.insert_carrier(&Carrier {
            id: carrier_id,
            name: "Acme Insurance Group".to_owned(),
            short_code: "ACME".to_owned(),
            active: true,
        })?;
        txn.insert_supplier(&Supplier {
            id: supplier_id,
            name: "Meridian IME Services".to_owned(),
            tax_id: None,
            active: true,
        })?;
        txn.insert_contract(&Contract {
            id: contract_id,
            supplier_id,
            carrier_id,
            name: "Acme IME Services Agreement 2025".to_owned(),
            effective_from: date!(2025 - 01 - 01),
            effective_to: None,
            geography_scope: GeographyScope::National,
            state_codes: None,
            active: true,
        })?;

        for (code, rate, max_units) in [
            ("IME.PHY_EXAM.PROF_FEE", "600.00", None),
            ("IME.PHY_EXAM.MILEAGE", "0.67", None),
            ("IME.PHY_EXAM.TRAVEL_LODGING", "200.00", Some("1")),
            ("IME.PHY_EXAM.TRAVEL_TRANSPORT", "500.00", None),
        ] {
            txn.insert_rate_card(&RateCard {
                id: RateCardId::generate(),
                contract_id,
                taxonomy_code: TaxonomyCode::new(code),
                contracted_rate: dec(rate),
                max_units: max_units.map(dec),
                is_all_inclusive: false,
                effective_from: date!(2025 - 01 - 01),
                effective_to: None,
            })?;
        }

        txn.insert_guideline(&Guideline {
            id: GuidelineId::generate(),
            contract_id,
            taxonomy_code: Some(TaxonomyCode::new("IME.PHY_EXAM.TRAVEL_TRANSPORT")),
            domain: None,
            rule_type: "cap_amount".to_owned(),
            rule_params: json!({ "max_amount": "400.00" }),
            severity: ValidationSeverity::Error,
            narrative_source: Some("Airfare reimbursement capped at $400 per exam".to_owned()),
            active: true,
        })?;
        Ok(())
    })
    .unwrap();

    TestEnv {
        store,
        storage: MemoryStorage::default(),
        supplier_actor: Actor::Supplier { actor_id: ActorId::generate(), supplier_id },
        carrier_actor: Actor::Carrier { actor_id: ActorId::generate(), carrier_id },
        contract_id,
    }
}

/// Creates an invoice and uploads CSV bytes through the full pipeline.
fn process_csv(env: &mut TestEnv, invoice_number: &str, csv: &[u8]) -> (ProcessSummary, InvoiceId) {
    let storage = &mut env.storage;
    let actor = env.supplier_actor;
    let contract_id = env.contract_id;
    let csv = csv.to_vec();
    runtime::with_txn(&mut env.store, move |txn| {
        let invoice = runtime::create_invoice(
            txn,
            actor,
            contract_id,
            invoice_number,
            date!(2025 - 03 - 01),
            None,
        )?;
        let invoice_id = invoice.id;
        let (summary, _version) = runtime::upload(
            txn,
            storage,
            actor,
            invoice_id,
            &csv,
            "invoice.csv",
            now(),
            None,
        )?;
        Ok((summary, invoice_id))
    })
    .unwrap()
}

// ============================================================================
// SECTION: Scenarios
// ============================================================================

#[test]
fn scenario_clean_single_line_ime() {
    let mut env = setup();
    let csv = b"description,quantity,amount,service_date\n\
IME Physician Examination,1,600.00,2025-03-15\n";
    let (summary, invoice_id) = process_csv(&mut env, "INV-0001", csv);

    assert_eq!(summary.status, InvoiceStatus::PendingCarrierReview);
    assert_eq!(summary.lines_processed, 1);
    assert_eq!(summary.lines_error, 0);

    runtime::with_txn(&mut env.store, |txn| {
        let lines = txn.line_items_for_version(invoice_id, 1)?;
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line.taxonomy_code.as_ref().map(TaxonomyCode::as_str), Some("IME.PHY_EXAM.PROF_FEE"));
        assert_eq!(line.status, LineItemStatus::Validated);
        assert_eq!(line.expected_amount, Some(dec("600.00")));
        assert!(txn.exceptions_for_invoice(invoice_id)?.is_empty());
        Ok(())
    })
    .unwrap();
}

#[test]
fn scenario_overbilled_exam_opens_exception() {
    let mut env = setup();
    let csv = b"description,quantity,amount,service_date\n\
IME Physician Examination - Neurology,1,725.00,2025-03-15\n";
    let (summary, invoice_id) = process_csv(&mut env, "INV-0002", csv);

    assert_eq!(summary.status, InvoiceStatus::ReviewRequired);
    assert_eq!(summary.lines_error, 1);

    runtime::with_txn(&mut env.store, |txn| {
        let lines = txn.line_items_for_version(invoice_id, 1)?;
        let line = &lines[0];
        assert_eq!(line.status, LineItemStatus::Exception);
        assert_eq!(line.expected_amount, Some(dec("600.00")));

        let exceptions = txn.exceptions_for_invoice(invoice_id)?;
        assert_eq!(exceptions.len(), 1);
        assert_eq!(exceptions[0].status, ExceptionStatus::Open);

        let result = txn.validation_result(exceptions[0].validation_result_id)?.unwrap();
        assert_eq!(result.finding.status, ValidationStatus::Fail);
        assert_eq!(result.finding.required_action, RequiredAction::AcceptReduction);
        assert_eq!(result.finding.expected_value.as_deref(), Some("$600.00"));
        assert_eq!(result.finding.actual_value.as_deref(), Some("$725.00"));
        Ok(())
    })
    .unwrap();
}

#[test]
fn scenario_unrecognized_service_requests_reclassification() {
    let mut env = setup();
    let csv = b"description,amount\nCompletely unrecognizable xyzzy service,999.99\n";
    let (summary, invoice_id) = process_csv(&mut env, "INV-0003", csv);

    assert_eq!(summary.status, InvoiceStatus::ReviewRequired);

    runtime::with_txn(&mut env.store, |txn| {
        let lines = txn.line_items_for_version(invoice_id, 1)?;
        let line = &lines[0];
        assert_eq!(line.status, LineItemStatus::Exception);
        assert!(line.taxonomy_code.is_none());

        let exceptions = txn.exceptions_for_invoice(invoice_id)?;
        assert_eq!(exceptions.len(), 1);
        let result = txn.validation_result(exceptions[0].validation_result_id)?.unwrap();
        assert_eq!(
            result.finding.validation_type,
            clearbill_core::ValidationType::Classification
        );
        assert_eq!(result.finding.required_action, RequiredAction::RequestReclassification);
        Ok(())
    })
    .unwrap();
}

#[test]
fn scenario_max_units_cap_limits_payable() {
    let mut env = setup();
    let csv = b"description,quantity,amount,service_date\n\
Hotel lodging for examining physician,2,400.00,2025-03-15\n";
    let (summary, invoice_id) = process_csv(&mut env, "INV-0004", csv);

    assert_eq!(summary.status, InvoiceStatus::ReviewRequired);

    runtime::with_txn(&mut env.store, |txn| {
        let lines = txn.line_items_for_version(invoice_id, 1)?;
        let line = &lines[0];
        assert_eq!(
            line.taxonomy_code.as_ref().map(TaxonomyCode::as_str),
            Some("IME.PHY_EXAM.TRAVEL_LODGING")
        );
        // Amount passes (2 x 200 = 400); the unit cap fails and caps payable.
        assert_eq!(line.status, LineItemStatus::Exception);
        assert_eq!(line.expected_amount, Some(dec("200.00")));

        let exceptions = txn.exceptions_for_invoice(invoice_id)?;
        assert_eq!(exceptions.len(), 1);
        let result = txn.validation_result(exceptions[0].validation_result_id)?.unwrap();
        assert_eq!(result.finding.required_action, RequiredAction::AcceptReduction);
        assert!(result.finding.message.contains("exceeds contract maximum"));
        Ok(())
    })
    .unwrap();
}

#[test]
fn scenario_guideline_cap_cites_narrative() {
    let mut env = setup();
    let csv = b"description,quantity,amount,service_date\n\
Airfare to examination city,1,500.00,2025-03-15\n";
    let (summary, invoice_id) = process_csv(&mut env, "INV-0005", csv);

    assert_eq!(summary.status, InvoiceStatus::ReviewRequired);

    runtime::with_txn(&mut env.store, |txn| {
        let exceptions = txn.exceptions_for_invoice(invoice_id)?;
        assert_eq!(exceptions.len(), 1);
        assert_eq!(exceptions[0].status, ExceptionStatus::Open);
        let result = txn.validation_result(exceptions[0].validation_result_id)?.unwrap();
        assert_eq!(result.finding.status, ValidationStatus::Fail);
        assert_eq!(result.finding.required_action, RequiredAction::AcceptReduction);
        assert!(result.finding.message.contains("$400"));
        assert!(
            result
                .finding
                .message
                .contains("Airfare reimbursement capped at $400 per exam"),
            "narrative must be cited verbatim"
        );
        Ok(())
    })
    .unwrap();
}

#[test]
fn scenario_full_lifecycle_to_export() {
    let mut env = setup();
    let csv = b"description,quantity,amount,service_date,claim_number\n\
IME Physician Examination,1,725.00,2025-03-15,CLM-881\n";
    let (summary, invoice_id) = process_csv(&mut env, "INV-0006", csv);
    assert_eq!(summary.status, InvoiceStatus::ReviewRequired);

    let supplier = env.supplier_actor;
    let carrier = env.carrier_actor;

    // Supplier responds to the open exception.
    let exception_id = runtime::with_txn(&mut env.store, |txn| {
        let exceptions = txn.exceptions_for_invoice(invoice_id)?;
        let exception_id = exceptions[0].id;
        runtime::respond_to_exception(
            txn,
            supplier,
            exception_id,
            "The neurologist rate was quoted at scheduling time.",
            None,
        )?;
        Ok(exception_id)
    })
    .unwrap();

    runtime::with_txn(&mut env.store, |txn| {
        assert_eq!(txn.exception(exception_id)?.unwrap().status, ExceptionStatus::SupplierResponded);
        assert_eq!(txn.invoice(invoice_id)?.unwrap().status, InvoiceStatus::SupplierResponded);
        Ok(())
    })
    .unwrap();

    // Carrier reviews, holds the contract rate, and approves.
    runtime::with_txn(&mut env.store, |txn| {
        runtime::start_review(txn, carrier, invoice_id)
    })
    .unwrap();
    runtime::with_txn(&mut env.store, |txn| {
        runtime::resolve_exception(
            txn,
            carrier,
            exception_id,
            ResolutionAction::HeldContractRate,
            Some("Contract rate applies."),
            now(),
        )
    })
    .unwrap();
    runtime::with_txn(&mut env.store, |txn| {
        assert_eq!(txn.exception(exception_id)?.unwrap().status, ExceptionStatus::Resolved);
        runtime::approve_invoice(txn, carrier, invoice_id, None, now())
    })
    .unwrap();

    runtime::with_txn(&mut env.store, |txn| {
        let invoice = txn.invoice(invoice_id)?.unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Approved);
        let lines = txn.line_items_for_version(invoice_id, 1)?;
        assert!(lines.iter().all(|line| line.status == LineItemStatus::Approved));
        Ok(())
    })
    .unwrap();

    // Export closes the lifecycle.
    let rendered = runtime::with_txn(&mut env.store, |txn| {
        runtime::export_invoice(txn, carrier, invoice_id)
    })
    .unwrap();
    let mut lines = rendered.lines();
    assert_eq!(
        lines.next(),
        Some(
            "invoice_number,claim_number,service_date,description,taxonomy_code,\
             billing_component,quantity,unit,billed_amount,approved_amount"
        )
    );
    let row = lines.next().unwrap();
    assert!(row.starts_with("INV-0006,CLM-881,2025-03-15,IME Physician Examination"));
    assert!(row.ends_with("725.00,600.00"));

    // The audit chain for the invoice is append-only and strictly ordered.
    runtime::with_txn(&mut env.store, |txn| {
        assert_eq!(txn.invoice(invoice_id)?.unwrap().status, InvoiceStatus::Exported);
        let events =
            txn.audit_events_for_entity(AuditEntityType::Invoice, invoice_id.as_uuid())?;
        assert!(events.len() >= 6, "expected at least 6 audit rows, got {}", events.len());
        for pair in events.windows(2) {
            assert!(
                (&pair[0].created_at, pair[0].seq) < (&pair[1].created_at, pair[1].seq),
                "audit chain must strictly increase"
            );
        }
        Ok(())
    })
    .unwrap();

    // Terminal invoice rejects every further mutation.
    let err = runtime::with_txn(&mut env.store, |txn| {
        runtime::approve_invoice(txn, carrier, invoice_id, None, now())
    })
    .unwrap_err();
    assert!(matches!(err, PipelineError::Conflict(_)));
    let err = runtime::with_txn(&mut env.store, |txn| {
        runtime::withdraw(txn, supplier, invoice_id)
    })
    .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Store(clearbill_core::StoreError::Transition(_)) | PipelineError::Transition(_)
    ));
}

// ============================================================================
// SECTION: Versioning and Idempotence
// ============================================================================

#[test]
fn resubmission_creates_a_new_version_and_preserves_old_lines() {
    let mut env = setup();
    let bad_csv = b"description,quantity,amount\nIME Physician Examination,1,725.00\n";
    let (summary, invoice_id) = process_csv(&mut env, "INV-0007", bad_csv);
    assert_eq!(summary.status, InvoiceStatus::ReviewRequired);

    let supplier = env.supplier_actor;
    let storage = &mut env.storage;
    let good_csv = b"description,quantity,amount\nIME Physician Examination,1,600.00\n".to_vec();
    let (summary, version) = runtime::with_txn(&mut env.store, move |txn| {
        runtime::resubmit(txn, storage, supplier, invoice_id, &good_csv, "invoice.csv", now(), None)
    })
    .unwrap();

    assert_eq!(version, 2);
    assert_eq!(summary.status, InvoiceStatus::PendingCarrierReview);

    runtime::with_txn(&mut env.store, |txn| {
        let invoice = txn.invoice(invoice_id)?.unwrap();
        assert_eq!(invoice.current_version, 2);
        // Prior-version line items remain intact.
        assert_eq!(txn.line_items_for_version(invoice_id, 1)?.len(), 1);
        assert_eq!(txn.line_items_for_version(invoice_id, 2)?.len(), 1);
        assert!(txn.invoice_version(invoice_id, 1)?.is_some());
        assert!(txn.invoice_version(invoice_id, 2)?.is_some());
        Ok(())
    })
    .unwrap();
}

#[test]
fn reprocessing_the_same_version_is_a_typed_conflict() {
    let mut env = setup();
    let csv = b"description,quantity,amount\nIME Physician Examination,1,600.00\n";
    let (_, invoice_id) = process_csv(&mut env, "INV-0008", csv);

    let err = runtime::with_txn(&mut env.store, |txn| {
        runtime::process_uploaded(txn, invoice_id, csv, "invoice.csv", now(), None)
    })
    .unwrap_err();
    assert!(matches!(err, PipelineError::Conflict(_)));
}

#[test]
fn parse_failure_lands_on_review_required_with_no_lines() {
    let mut env = setup();
    let csv = b"description,amount\n";
    let (summary, invoice_id) = process_csv(&mut env, "INV-0009", csv);

    assert_eq!(summary.status, InvoiceStatus::ReviewRequired);
    assert_eq!(summary.lines_processed, 0);
    assert!(summary.error.is_some());

    runtime::with_txn(&mut env.store, |txn| {
        assert!(txn.line_items_for_version(invoice_id, 1)?.is_empty());
        assert_eq!(txn.invoice(invoice_id)?.unwrap().status, InvoiceStatus::ReviewRequired);
        Ok(())
    })
    .unwrap();
}

#[test]
fn carrier_override_creates_a_rule_future_invoices_use() {
    let mut env = setup();
    let csv = b"description,quantity,amount\nSpecialty records bundle QZX,1,450.00\n";
    let (summary, invoice_id) = process_csv(&mut env, "INV-0011", csv);
    assert_eq!(summary.status, InvoiceStatus::ReviewRequired, "description is unrecognized");

    let carrier = env.carrier_actor;
    let supplier_id = match env.supplier_actor {
        Actor::Supplier { supplier_id, .. } => supplier_id,
        _ => unreachable!(),
    };

    // Carrier reclassifies the line and persists a supplier-scoped rule.
    runtime::with_txn(&mut env.store, |txn| {
        let line_id = txn.line_items_for_version(invoice_id, 1)?[0].id;
        runtime::override_mapping(
            txn,
            carrier,
            line_id,
            clearbill_core::classify::OverrideRequest {
                supplier_id: Some(supplier_id),
                match_type: clearbill_core::MatchType::KeywordSet,
                match_pattern: "records bundle qzx".to_owned(),
                taxonomy_code: TaxonomyCode::new("REC.MED_RECORDS.RETRIEVAL_FEE"),
                billing_component: "RETRIEVAL_FEE".to_owned(),
            },
            now(),
        )
    })
    .unwrap();

    runtime::with_txn(&mut env.store, |txn| {
        let line = &txn.line_items_for_version(invoice_id, 1)?[0];
        assert_eq!(line.status, LineItemStatus::Override);
        assert_eq!(
            line.taxonomy_code.as_ref().map(TaxonomyCode::as_str),
            Some("REC.MED_RECORDS.RETRIEVAL_FEE")
        );
        let rule_id = line.mapping_rule_id.unwrap();
        let rule = txn.mapping_rule(rule_id)?.unwrap();
        assert_eq!(rule.version, 1);
        assert!(rule.supersedes_rule_id.is_none());
        Ok(())
    })
    .unwrap();

    // The next invoice with the same description classifies from the rule.
    let (_, second_invoice) = process_csv(&mut env, "INV-0012", csv);
    runtime::with_txn(&mut env.store, |txn| {
        let line = &txn.line_items_for_version(second_invoice, 1)?[0];
        assert_eq!(
            line.taxonomy_code.as_ref().map(TaxonomyCode::as_str),
            Some("REC.MED_RECORDS.RETRIEVAL_FEE")
        );
        assert!(line.mapping_rule_id.is_some(), "persisted rule match carries its id");
        Ok(())
    })
    .unwrap();
}

#[test]
fn cross_tenant_access_is_denied_without_state_change() {
    let mut env = setup();
    let csv = b"description,quantity,amount\nIME Physician Examination,1,600.00\n";
    let (_, invoice_id) = process_csv(&mut env, "INV-0010", csv);

    let foreign_supplier =
        Actor::Supplier { actor_id: ActorId::generate(), supplier_id: SupplierId::generate() };
    let err = runtime::with_txn(&mut env.store, |txn| {
        runtime::withdraw(txn, foreign_supplier, invoice_id)
    })
    .unwrap_err();
    assert!(matches!(err, PipelineError::Access(_)));

    let foreign_carrier =
        Actor::Carrier { actor_id: ActorId::generate(), carrier_id: CarrierId::generate() };
    let err = runtime::with_txn(&mut env.store, |txn| {
        runtime::approve_invoice(txn, foreign_carrier, invoice_id, None, now())
    })
    .unwrap_err();
    assert!(matches!(err, PipelineError::Access(_)));

    runtime::with_txn(&mut env.store, |txn| {
        assert_eq!(
            txn.invoice(invoice_id)?.unwrap().status,
            InvoiceStatus::PendingCarrierReview
        );
        Ok(())
    })
    .unwrap();
}
