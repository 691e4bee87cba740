// crates/clearbill-core/src/runtime/pipeline.rs
// ============================================================================
// Module: Clearbill Invoice Pipeline
// Description: Staged transformation from uploaded file to validated lines.
// Purpose: Parse, classify, validate, persist findings, advance the invoice.
// Dependencies: crate::{classify, core, ingest, interfaces, validate}, serde_json, tracing
// ============================================================================

//! ## Overview
//! The pipeline runs in the caller's store transaction, so an unhandled
//! failure rolls the whole run back, including the PROCESSING marker. Two
//! entry points share identical semantics: [`process_uploaded`] receives
//! bytes already in memory; [`process_stored`] loads them from file storage
//! by the invoice's file pointer, compensating the PROCESSING transition when
//! the load fails.
//!
//! Per line, in parse order: insert PENDING, classify, rate-validate,
//! guideline-validate, persist every finding, open an exception per FAIL,
//! finalize the line. The invoice lands on REVIEW_REQUIRED when any FAIL was
//! observed, otherwise PENDING_CARRIER_REVIEW.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::json;
use tracing::warn;

use crate::classify::Classifier;
use crate::core::AuditEntityType;
use crate::core::ExceptionRecord;
use crate::core::ExceptionStatus;
use crate::core::Finding;
use crate::core::Guideline;
use crate::core::Invoice;
use crate::core::InvoiceId;
use crate::core::InvoiceStatus;
use crate::core::LineItem;
use crate::core::LineItemId;
use crate::core::LineItemStatus;
use crate::core::MappingRule;
use crate::core::NewAuditEvent;
use crate::core::RawExtractionArtifact;
use crate::core::RequiredAction;
use crate::core::Timestamp;
use crate::core::ValidationResult;
use crate::core::ValidationSeverity;
use crate::core::ValidationStatus;
use crate::core::ValidationType;
use crate::core::audit::event;
use crate::core::identifiers::ArtifactId;
use crate::core::identifiers::ExceptionId;
use crate::core::identifiers::ValidationResultId;
use crate::core::party::Contract;
use crate::core::taxonomy::canonical_registry;
use crate::ingest::ParseResult;
use crate::ingest::RawLineItem;
use crate::ingest::detect_format;
use crate::ingest::parser_for;
use crate::interfaces::DescriptionAssessor;
use crate::interfaces::FileStorage;
use crate::interfaces::StoreTxn;
use crate::runtime::PipelineError;
use crate::validate::validate_guidelines;
use crate::validate::validate_rates;

// ============================================================================
// SECTION: Summary
// ============================================================================

/// Observable outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSummary {
    /// Processed invoice.
    pub invoice_id: InvoiceId,
    /// Final invoice status.
    pub status: InvoiceStatus,
    /// Lines parsed and persisted.
    pub lines_processed: usize,
    /// Lines that finished without a FAIL finding.
    pub lines_pass: usize,
    /// FAIL findings observed across all lines.
    pub lines_error: usize,
    /// WARNING findings observed across all lines.
    pub lines_warning: usize,
    /// File-scoped parser warnings.
    pub parse_warnings: Vec<String>,
    /// Parse failure reason, when the run ended in REVIEW_REQUIRED without
    /// line items.
    pub error: Option<String>,
}

// ============================================================================
// SECTION: Entry Points
// ============================================================================

/// Runs the pipeline on bytes already in memory, inside the caller's
/// transaction.
///
/// # Errors
///
/// Returns [`PipelineError::Conflict`] when line items already exist for this
/// invoice version (idempotence guard; no state change), or a store error
/// when persistence fails (the caller's transaction rolls back).
pub fn process_uploaded<T: StoreTxn>(
    txn: &mut T,
    invoice_id: InvoiceId,
    bytes: &[u8],
    filename: &str,
    now: Timestamp,
    assessor: Option<&dyn DescriptionAssessor>,
) -> Result<ProcessSummary, PipelineError> {
    let invoice = load_invoice(txn, invoice_id)?;
    guard_unprocessed(txn, &invoice)?;
    mark_processing(txn, &invoice)?;
    run_from_bytes(txn, invoice, bytes, filename, now, assessor)
}

/// Runs the pipeline loading bytes from file storage by the invoice's file
/// pointer.
///
/// # Errors
///
/// Returns [`PipelineError::Storage`] when the bytes cannot be loaded; the
/// PROCESSING marker is compensated back to SUBMITTED before returning.
/// Otherwise identical to [`process_uploaded`].
pub fn process_stored<T: StoreTxn, F: FileStorage>(
    txn: &mut T,
    storage: &F,
    invoice_id: InvoiceId,
    now: Timestamp,
    assessor: Option<&dyn DescriptionAssessor>,
) -> Result<ProcessSummary, PipelineError> {
    let invoice = load_invoice(txn, invoice_id)?;
    let Some(pointer) = invoice.file_pointer.clone() else {
        return Err(PipelineError::Conflict(format!(
            "invoice {invoice_id} has no stored file to process"
        )));
    };
    guard_unprocessed(txn, &invoice)?;
    mark_processing(txn, &invoice)?;

    let bytes = match storage.load(&pointer) {
        Ok(bytes) => bytes,
        Err(err) => {
            // Pair the PROCESSING marker with its compensating transition so
            // the invoice stays retryable.
            txn.transition_invoice(invoice.id, InvoiceStatus::Processing, InvoiceStatus::Submitted)?;
            audit_status_change(txn, &invoice, InvoiceStatus::Processing, InvoiceStatus::Submitted);
            return Err(err.into());
        }
    };

    let filename = pointer.rsplit('/').next().unwrap_or(pointer.as_str()).to_owned();
    run_from_bytes(txn, invoice, &bytes, &filename, now, assessor)
}

// ============================================================================
// SECTION: Run Stages
// ============================================================================

/// Loads the invoice or reports it missing.
fn load_invoice<T: StoreTxn>(txn: &mut T, id: InvoiceId) -> Result<Invoice, PipelineError> {
    txn.invoice(id)?.ok_or(PipelineError::NotFound {
        entity: "invoice",
        id: id.to_string(),
    })
}

/// Idempotence guard: a version that already has line items is never
/// reprocessed.
fn guard_unprocessed<T: StoreTxn>(txn: &mut T, invoice: &Invoice) -> Result<(), PipelineError> {
    let existing = txn.count_line_items(invoice.id, invoice.current_version)?;
    if existing > 0 {
        return Err(PipelineError::Conflict(format!(
            "invoice {} version {} already has {existing} line items; \
             resubmit with a new version instead of reprocessing",
            invoice.id, invoice.current_version
        )));
    }
    Ok(())
}

/// Transitions the invoice into PROCESSING with an audit event.
fn mark_processing<T: StoreTxn>(txn: &mut T, invoice: &Invoice) -> Result<(), PipelineError> {
    txn.transition_invoice(invoice.id, invoice.status, InvoiceStatus::Processing)?;
    audit_status_change(txn, invoice, invoice.status, InvoiceStatus::Processing);
    Ok(())
}

/// Parses and processes; shared by both entry points, already in PROCESSING.
fn run_from_bytes<T: StoreTxn>(
    txn: &mut T,
    invoice: Invoice,
    bytes: &[u8],
    filename: &str,
    now: Timestamp,
    assessor: Option<&dyn DescriptionAssessor>,
) -> Result<ProcessSummary, PipelineError> {
    let parse_result =
        detect_format(filename).and_then(|format| parser_for(format).parse(bytes, filename));

    let parsed = match parse_result {
        Ok(parsed) => parsed,
        Err(err) => return fail_invoice(txn, &invoice, &err.to_string()),
    };

    run_parsed(txn, invoice, &parsed, now, assessor)
}

/// Post-parse pipeline: artifact, per-line processing, terminal status.
fn run_parsed<T: StoreTxn>(
    txn: &mut T,
    invoice: Invoice,
    parsed: &ParseResult,
    now: Timestamp,
    assessor: Option<&dyn DescriptionAssessor>,
) -> Result<ProcessSummary, PipelineError> {
    persist_artifact(txn, &invoice, parsed)?;

    let Some(contract) = txn.contract(invoice.contract_id)? else {
        return fail_invoice(txn, &invoice, "Contract not found for invoice");
    };
    let guidelines = txn.active_guidelines(contract.id)?;
    // One rule snapshot per run; classification within a run is stable.
    let supplier_rules = txn.effective_mapping_rules(Some(invoice.supplier_id), now)?;
    let global_rules = txn.effective_mapping_rules(None, now)?;

    let mut lines_error = 0_usize;
    let mut lines_warning = 0_usize;
    let mut lines_pass = 0_usize;

    for raw in &parsed.line_items {
        let (fails, warns) = process_line(
            txn,
            &invoice,
            &contract,
            &guidelines,
            &supplier_rules,
            &global_rules,
            raw,
            now,
            assessor,
        )?;
        lines_error += fails;
        lines_warning += warns;
        if fails == 0 {
            lines_pass += 1;
        }
    }

    let final_status = if lines_error > 0 {
        InvoiceStatus::ReviewRequired
    } else {
        InvoiceStatus::PendingCarrierReview
    };
    txn.transition_invoice(invoice.id, InvoiceStatus::Processing, final_status)?;
    audit_status_change(txn, &invoice, InvoiceStatus::Processing, final_status);

    Ok(ProcessSummary {
        invoice_id: invoice.id,
        status: final_status,
        lines_processed: parsed.line_items.len(),
        lines_pass,
        lines_error,
        lines_warning,
        parse_warnings: parsed.warnings.clone(),
        error: None,
    })
}

/// Records a parse failure: REVIEW_REQUIRED with a human-readable reason and
/// no line items.
fn fail_invoice<T: StoreTxn>(
    txn: &mut T,
    invoice: &Invoice,
    reason: &str,
) -> Result<ProcessSummary, PipelineError> {
    txn.transition_invoice(invoice.id, InvoiceStatus::Processing, InvoiceStatus::ReviewRequired)?;
    audit(
        txn,
        &NewAuditEvent::system(
            AuditEntityType::Invoice,
            invoice.id.as_uuid(),
            event::INVOICE_STATUS_CHANGED,
            json!({
                "from_status": InvoiceStatus::Processing.as_str(),
                "to_status": InvoiceStatus::ReviewRequired.as_str(),
                "invoice_number": invoice.invoice_number,
                "error": reason,
            }),
        ),
    );
    Ok(ProcessSummary {
        invoice_id: invoice.id,
        status: InvoiceStatus::ReviewRequired,
        lines_processed: 0,
        lines_pass: 0,
        lines_error: 0,
        lines_warning: 0,
        parse_warnings: Vec::new(),
        error: Some(reason.to_owned()),
    })
}

/// Persists the raw-text extraction artifact for the current version.
fn persist_artifact<T: StoreTxn>(
    txn: &mut T,
    invoice: &Invoice,
    parsed: &ParseResult,
) -> Result<(), PipelineError> {
    let Some(version) = txn.invoice_version(invoice.id, invoice.current_version)? else {
        return Ok(());
    };
    txn.insert_artifact(&RawExtractionArtifact {
        id: ArtifactId::generate(),
        invoice_version_id: version.id,
        page_number: None,
        raw_text: parsed.raw_text.clone(),
        extraction_method: parsed.extraction_method.clone(),
        metadata: json!({
            "warnings": parsed.warnings,
            "line_count": parsed.line_items.len(),
        }),
    })?;
    Ok(())
}

// ============================================================================
// SECTION: Per-Line Processing
// ============================================================================

/// Processes one raw line through classification and both validators.
/// Returns `(fail_findings, warning_findings)` for the line.
#[expect(clippy::too_many_arguments, reason = "Pipeline stage wiring; all context is run-scoped.")]
fn process_line<T: StoreTxn>(
    txn: &mut T,
    invoice: &Invoice,
    contract: &Contract,
    guidelines: &[Guideline],
    supplier_rules: &[MappingRule],
    global_rules: &[MappingRule],
    raw: &RawLineItem,
    now: Timestamp,
    assessor: Option<&dyn DescriptionAssessor>,
) -> Result<(usize, usize), PipelineError> {
    let mut line = LineItem {
        id: LineItemId::generate(),
        invoice_id: invoice.id,
        invoice_version: invoice.current_version,
        line_number: raw.line_number,
        status: LineItemStatus::Pending,
        raw_description: raw.raw_description.clone(),
        raw_code: raw.raw_code.clone(),
        raw_amount: raw.raw_amount.clone(),
        raw_quantity: raw.raw_quantity.clone(),
        raw_unit: raw.raw_unit.clone(),
        claim_number: raw.claim_number.clone(),
        service_date: raw.service_date,
        taxonomy_code: None,
        billing_component: None,
        mapping_confidence: None,
        mapping_rule_id: None,
        mapped_rate: None,
        expected_amount: None,
        ai_assessment: None,
    };
    txn.insert_line_item(&line)?;

    // ── Classify ────────────────────────────────────────────────────────
    let classification = Classifier.classify(
        &raw.raw_description,
        raw.raw_code.as_deref(),
        supplier_rules,
        global_rules,
        now,
    );
    line.taxonomy_code = classification.taxonomy_code.clone();
    line.billing_component = classification.billing_component.clone();
    line.mapping_confidence = Some(classification.confidence.label_or_low());
    line.mapping_rule_id = classification.matched_rule_id;
    line.status = LineItemStatus::Classified;

    audit(
        txn,
        &NewAuditEvent::system(
            AuditEntityType::LineItem,
            line.id.as_uuid(),
            event::LINE_ITEM_CLASSIFIED,
            json!({
                "taxonomy_code": line.taxonomy_code.as_ref().map(ToString::to_string),
                "billing_component": line.billing_component,
                "mapping_confidence": classification.confidence.as_str(),
                "match_type": classification.match_type.map(|mt| mt.as_str()),
                "match_explanation": classification.match_explanation,
            }),
        ),
    );

    if classification.is_unrecognized() {
        let finding = Finding {
            validation_type: ValidationType::Classification,
            rate_card_id: None,
            guideline_id: None,
            status: ValidationStatus::Fail,
            severity: ValidationSeverity::Error,
            message: format!(
                "Service description could not be classified: '{}'. Please provide a \
                 clearer description or request manual reclassification.",
                raw.raw_description
            ),
            expected_value: None,
            actual_value: None,
            required_action: RequiredAction::RequestReclassification,
        };
        persist_finding(txn, &line, &finding)?;
        line.status = LineItemStatus::Exception;
        line.expected_amount = Some(line.raw_amount.clone());
        txn.update_line_item(&line)?;
        return Ok((1, 0));
    }

    // ── Optional description assessment (never blocks the run) ──────────
    if let Some(assessor) = assessor {
        assess_description(assessor, &mut line);
    }

    let mut fails = 0_usize;
    let mut warns = 0_usize;

    // ── Rate validation ─────────────────────────────────────────────────
    let rate_cards = match &line.taxonomy_code {
        Some(code) => txn.rate_cards_for(contract.id, code)?,
        None => Vec::new(),
    };
    let rate_outcome = validate_rates(&line, contract, &rate_cards, now.date());
    line.mapped_rate = rate_outcome.mapped_rate.clone();
    for finding in &rate_outcome.findings {
        persist_finding(txn, &line, finding)?;
        match finding.status {
            ValidationStatus::Fail => fails += 1,
            ValidationStatus::Warning => warns += 1,
            ValidationStatus::Pass => {}
        }
    }

    // ── Guideline validation ────────────────────────────────────────────
    for finding in validate_guidelines(&line, guidelines) {
        persist_finding(txn, &line, &finding)?;
        match finding.status {
            ValidationStatus::Fail => fails += 1,
            ValidationStatus::Warning => warns += 1,
            ValidationStatus::Pass => {}
        }
    }

    // ── Finalize ────────────────────────────────────────────────────────
    line.status = if fails > 0 { LineItemStatus::Exception } else { LineItemStatus::Validated };
    line.expected_amount =
        Some(rate_outcome.expected_amount.unwrap_or_else(|| line.raw_amount.clone()));
    txn.update_line_item(&line)?;

    Ok((fails, warns))
}

/// Persists one finding; FAIL findings additionally open an exception with
/// an audit event.
fn persist_finding<T: StoreTxn>(
    txn: &mut T,
    line: &LineItem,
    finding: &Finding,
) -> Result<(), PipelineError> {
    let result = ValidationResult {
        id: ValidationResultId::generate(),
        line_item_id: line.id,
        finding: finding.clone(),
    };
    txn.insert_validation_result(&result)?;

    if finding.status == ValidationStatus::Fail {
        txn.insert_exception(&ExceptionRecord {
            id: ExceptionId::generate(),
            line_item_id: line.id,
            validation_result_id: result.id,
            status: ExceptionStatus::Open,
            supplier_response: None,
            supporting_doc: None,
            resolution_action: None,
            resolution_notes: None,
            resolved_at: None,
            resolved_by: None,
        })?;
        audit(
            txn,
            &NewAuditEvent::system(
                AuditEntityType::LineItem,
                line.id.as_uuid(),
                event::EXCEPTION_OPENED,
                json!({
                    "validation_type": finding.validation_type.as_str(),
                    "status": finding.status.as_str(),
                    "severity": finding.severity.as_str(),
                    "message": finding.message,
                    "required_action": finding.required_action.as_str(),
                }),
            ),
        );
    }
    Ok(())
}

/// Invokes the optional assessor, degrading every failure to "no result".
fn assess_description(assessor: &dyn DescriptionAssessor, line: &mut LineItem) {
    let Some(code) = &line.taxonomy_code else {
        return;
    };
    let label = canonical_registry().get(code).map_or_else(|| code.to_string(), |item| {
        item.label.clone()
    });
    match assessor.assess(&line.raw_description, &label) {
        Ok(Some(assessment)) => match serde_json::to_value(&assessment) {
            Ok(value) => line.ai_assessment = Some(value),
            Err(err) => warn!(line_id = %line.id, error = %err, "unserializable assessment"),
        },
        Ok(None) => {}
        Err(err) => {
            warn!(line_id = %line.id, error = %err, "description assessment failed; continuing");
        }
    }
}

// ============================================================================
// SECTION: Audit Helpers
// ============================================================================

/// Appends an audit event without letting a failure block the state change it
/// describes.
pub(crate) fn audit<T: StoreTxn>(txn: &mut T, new_event: &NewAuditEvent) {
    if let Err(err) = txn.append_audit_event(new_event) {
        warn!(event_type = %new_event.event_type, error = %err, "audit write failed");
    }
}

/// Appends the standard `invoice.status_changed` system event.
pub(crate) fn audit_status_change<T: StoreTxn>(
    txn: &mut T,
    invoice: &Invoice,
    from: InvoiceStatus,
    to: InvoiceStatus,
) {
    audit(
        txn,
        &NewAuditEvent::system(
            AuditEntityType::Invoice,
            invoice.id.as_uuid(),
            event::INVOICE_STATUS_CHANGED,
            json!({
                "from_status": from.as_str(),
                "to_status": to.as_str(),
                "invoice_number": invoice.invoice_number,
            }),
        ),
    );
}
