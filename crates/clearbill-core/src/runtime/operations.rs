// crates/clearbill-core/src/runtime/operations.rs
// ============================================================================
// Module: Clearbill Lifecycle Operations
// Description: Supplier and carrier operations on invoices and exceptions.
// Purpose: Drive the resolution workflow through narrow, typed operations.
// Dependencies: crate::{classify, core, interfaces, runtime}, serde_json
// ============================================================================

//! ## Overview
//! Every operation runs inside the caller's store transaction, verifies actor
//! scope (a supplier acts only on its own invoices, a carrier only on its
//! contracts' invoices), guards the state machine edge, applies the change,
//! and appends audit events. Precondition and authorization failures are
//! typed errors with no state change.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::json;
use time::Date;

use crate::classify::OverrideRequest;
use crate::classify::plan_override;
use crate::core::AuditEntityType;
use crate::core::ExceptionId;
use crate::core::ExceptionRecord;
use crate::core::ExceptionStatus;
use crate::core::Invoice;
use crate::core::InvoiceId;
use crate::core::InvoiceStatus;
use crate::core::InvoiceVersion;
use crate::core::LineItem;
use crate::core::LineItemId;
use crate::core::LineItemStatus;
use crate::core::NewAuditEvent;
use crate::core::ResolutionAction;
use crate::core::Timestamp;
use crate::core::audit::event;
use crate::core::identifiers::ContractId;
use crate::core::identifiers::InvoiceVersionId;
use crate::core::state::guard_exception_transition;
use crate::core::state::guard_line_transition;
use crate::interfaces::DescriptionAssessor;
use crate::interfaces::FileStorage;
use crate::interfaces::StoreTxn;
use crate::runtime::AccessError;
use crate::runtime::Actor;
use crate::runtime::PipelineError;
use crate::runtime::pipeline::ProcessSummary;
use crate::runtime::pipeline::audit;
use crate::runtime::pipeline::audit_status_change;
use crate::runtime::pipeline::process_uploaded;

// ============================================================================
// SECTION: Scope Checks
// ============================================================================

/// Loads an invoice and verifies the acting supplier owns it.
fn supplier_invoice<T: StoreTxn>(
    txn: &mut T,
    actor: Actor,
    invoice_id: InvoiceId,
) -> Result<Invoice, PipelineError> {
    let Actor::Supplier { supplier_id, .. } = actor else {
        return Err(AccessError::Role { required: "supplier" }.into());
    };
    let invoice = txn.invoice(invoice_id)?.ok_or(PipelineError::NotFound {
        entity: "invoice",
        id: invoice_id.to_string(),
    })?;
    if invoice.supplier_id != supplier_id {
        return Err(AccessError::SupplierScope.into());
    }
    Ok(invoice)
}

/// Loads an invoice and verifies it belongs to the acting carrier's contract.
pub(crate) fn carrier_invoice<T: StoreTxn>(
    txn: &mut T,
    actor: Actor,
    invoice_id: InvoiceId,
) -> Result<Invoice, PipelineError> {
    let Actor::Carrier { carrier_id, .. } = actor else {
        return Err(AccessError::Role { required: "carrier" }.into());
    };
    let invoice = txn.invoice(invoice_id)?.ok_or(PipelineError::NotFound {
        entity: "invoice",
        id: invoice_id.to_string(),
    })?;
    let contract = txn.contract(invoice.contract_id)?.ok_or(PipelineError::NotFound {
        entity: "contract",
        id: invoice.contract_id.to_string(),
    })?;
    if contract.carrier_id != carrier_id {
        return Err(AccessError::CarrierScope.into());
    }
    Ok(invoice)
}

/// Loads an exception together with its owning line and invoice.
fn exception_with_context<T: StoreTxn>(
    txn: &mut T,
    exception_id: ExceptionId,
) -> Result<(ExceptionRecord, LineItem, Invoice), PipelineError> {
    let exception = txn.exception(exception_id)?.ok_or(PipelineError::NotFound {
        entity: "exception",
        id: exception_id.to_string(),
    })?;
    let line = txn.line_item(exception.line_item_id)?.ok_or(PipelineError::NotFound {
        entity: "line item",
        id: exception.line_item_id.to_string(),
    })?;
    let invoice = txn.invoice(line.invoice_id)?.ok_or(PipelineError::NotFound {
        entity: "invoice",
        id: line.invoice_id.to_string(),
    })?;
    Ok((exception, line, invoice))
}

// ============================================================================
// SECTION: Taxonomy Seeding
// ============================================================================

/// Projects the canonical taxonomy list into the store, idempotently.
///
/// Existing rows keep their persisted `active` flag; everything else is
/// refreshed from the canonical definitions. Returns the number of items
/// projected.
///
/// # Errors
///
/// Returns a store error when an upsert fails.
pub fn seed_taxonomy<T: StoreTxn>(txn: &mut T) -> Result<usize, PipelineError> {
    let items = crate::core::taxonomy::canonical_items();
    for item in &items {
        txn.upsert_taxonomy_item(item)?;
    }
    Ok(items.len())
}

// ============================================================================
// SECTION: Supplier Operations
// ============================================================================

/// Creates a new DRAFT invoice under one of the supplier's contracts.
///
/// # Errors
///
/// Returns an access error when the contract does not belong to the acting
/// supplier, or a store error on write failure.
pub fn create_invoice<T: StoreTxn>(
    txn: &mut T,
    actor: Actor,
    contract_id: ContractId,
    invoice_number: &str,
    invoice_date: Date,
    submission_notes: Option<&str>,
) -> Result<Invoice, PipelineError> {
    let Actor::Supplier { supplier_id, .. } = actor else {
        return Err(AccessError::Role { required: "supplier" }.into());
    };
    let contract = txn.contract(contract_id)?.ok_or(PipelineError::NotFound {
        entity: "contract",
        id: contract_id.to_string(),
    })?;
    if contract.supplier_id != supplier_id {
        return Err(AccessError::SupplierScope.into());
    }

    let invoice = Invoice {
        id: InvoiceId::generate(),
        supplier_id,
        contract_id,
        invoice_number: invoice_number.to_owned(),
        invoice_date,
        status: InvoiceStatus::Draft,
        current_version: 1,
        file_pointer: None,
        file_format: None,
        submitted_at: None,
        submission_notes: submission_notes.map(str::to_owned),
    };
    txn.insert_invoice(&invoice)?;

    audit(
        txn,
        &NewAuditEvent::acted(
            AuditEntityType::Invoice,
            invoice.id.as_uuid(),
            event::INVOICE_CREATED,
            actor.actor_type(),
            actor.actor_id(),
            json!({
                "invoice_number": invoice.invoice_number,
                "status": invoice.status.as_str(),
            }),
        ),
    );
    Ok(invoice)
}

/// Uploads a file for a DRAFT or REVIEW_REQUIRED invoice and runs the
/// pipeline in the same transaction.
///
/// Returns the final invoice status and the processed version number.
///
/// # Errors
///
/// Returns a typed conflict when the invoice status does not accept uploads,
/// a parse error for undetectable formats (no state change), or store and
/// storage errors.
pub fn upload<T: StoreTxn, F: FileStorage>(
    txn: &mut T,
    storage: &mut F,
    actor: Actor,
    invoice_id: InvoiceId,
    bytes: &[u8],
    filename: &str,
    now: Timestamp,
    assessor: Option<&dyn DescriptionAssessor>,
) -> Result<(ProcessSummary, i64), PipelineError> {
    let invoice = supplier_invoice(txn, actor, invoice_id)?;
    if !matches!(invoice.status, InvoiceStatus::Draft | InvoiceStatus::ReviewRequired) {
        return Err(PipelineError::Conflict(format!(
            "cannot upload file: invoice is in status '{}'; only DRAFT or REVIEW_REQUIRED \
             invoices accept new uploads",
            invoice.status
        )));
    }
    submit_version(txn, storage, actor, invoice, bytes, filename, now, assessor)
}

/// Submits a new version of a REVIEW_REQUIRED or SUPPLIER_RESPONDED invoice,
/// incrementing `current_version` and reprocessing.
///
/// # Errors
///
/// Returns a typed conflict outside the accepted statuses; otherwise as
/// [`upload`].
pub fn resubmit<T: StoreTxn, F: FileStorage>(
    txn: &mut T,
    storage: &mut F,
    actor: Actor,
    invoice_id: InvoiceId,
    bytes: &[u8],
    filename: &str,
    now: Timestamp,
    assessor: Option<&dyn DescriptionAssessor>,
) -> Result<(ProcessSummary, i64), PipelineError> {
    let mut invoice = supplier_invoice(txn, actor, invoice_id)?;
    if !matches!(
        invoice.status,
        InvoiceStatus::ReviewRequired | InvoiceStatus::SupplierResponded
    ) {
        return Err(PipelineError::Conflict(format!(
            "resubmission not allowed in status '{}'",
            invoice.status
        )));
    }
    invoice.current_version += 1;
    submit_version(txn, storage, actor, invoice, bytes, filename, now, assessor)
}

/// Shared upload/resubmit tail: store the file, create the version row,
/// transition to SUBMITTED, process.
#[expect(clippy::too_many_arguments, reason = "Operation wiring; all context is call-scoped.")]
fn submit_version<T: StoreTxn, F: FileStorage>(
    txn: &mut T,
    storage: &mut F,
    actor: Actor,
    mut invoice: Invoice,
    bytes: &[u8],
    filename: &str,
    now: Timestamp,
    assessor: Option<&dyn DescriptionAssessor>,
) -> Result<(ProcessSummary, i64), PipelineError> {
    let file_format = crate::ingest::detect_format(filename)?;
    if bytes.is_empty() {
        return Err(PipelineError::Parse(crate::ingest::ParseError::Empty {
            filename: filename.to_owned(),
        }));
    }

    // A version row left behind by a failed parse occupies the current
    // number; move to the next one rather than violating uniqueness.
    if txn.invoice_version(invoice.id, invoice.current_version)?.is_some() {
        invoice.current_version += 1;
    }

    let key = format!(
        "invoices/{}/{}_v{}_{filename}",
        invoice.id, invoice.id, invoice.current_version
    );
    let pointer = storage.save(&key, bytes)?;

    let from_status = invoice.status;
    invoice.file_pointer = Some(pointer.clone());
    invoice.file_format = Some(file_format);
    invoice.submitted_at = Some(now);
    txn.update_invoice_header(&invoice)?;
    txn.transition_invoice(invoice.id, from_status, InvoiceStatus::Submitted)?;
    invoice.status = InvoiceStatus::Submitted;

    txn.insert_invoice_version(&InvoiceVersion {
        id: InvoiceVersionId::generate(),
        invoice_id: invoice.id,
        version_number: invoice.current_version,
        file_pointer: pointer,
        file_format,
        submitted_at: now,
        notes: None,
    })?;

    audit(
        txn,
        &NewAuditEvent::acted(
            AuditEntityType::Invoice,
            invoice.id.as_uuid(),
            event::INVOICE_SUBMITTED,
            actor.actor_type(),
            actor.actor_id(),
            json!({
                "invoice_number": invoice.invoice_number,
                "supplier_id": invoice.supplier_id.to_string(),
                "contract_id": invoice.contract_id.to_string(),
                "status": invoice.status.as_str(),
                "version": invoice.current_version,
            }),
        ),
    );

    let version = invoice.current_version;
    let summary = process_uploaded(txn, invoice.id, bytes, filename, now, assessor)?;
    Ok((summary, version))
}

/// Supplier responds to an OPEN exception with text and an optional document
/// pointer.
///
/// Transitions the exception to SUPPLIER_RESPONDED and flips the invoice
/// REVIEW_REQUIRED to SUPPLIER_RESPONDED.
///
/// # Errors
///
/// Returns a typed conflict when the exception is not OPEN, an access error
/// for foreign invoices, or store errors.
pub fn respond_to_exception<T: StoreTxn>(
    txn: &mut T,
    actor: Actor,
    exception_id: ExceptionId,
    response: &str,
    supporting_doc: Option<&str>,
) -> Result<(), PipelineError> {
    let Actor::Supplier { supplier_id, .. } = actor else {
        return Err(AccessError::Role { required: "supplier" }.into());
    };
    let (mut exception, _line, invoice) = exception_with_context(txn, exception_id)?;
    if invoice.supplier_id != supplier_id {
        return Err(AccessError::SupplierScope.into());
    }
    guard_exception_transition(exception.status, ExceptionStatus::SupplierResponded)?;

    exception.status = ExceptionStatus::SupplierResponded;
    exception.supplier_response = Some(response.to_owned());
    exception.supporting_doc = supporting_doc.map(str::to_owned);
    txn.update_exception(&exception)?;

    if invoice.status == InvoiceStatus::ReviewRequired {
        txn.transition_invoice(
            invoice.id,
            InvoiceStatus::ReviewRequired,
            InvoiceStatus::SupplierResponded,
        )?;
        audit_status_change(
            txn,
            &invoice,
            InvoiceStatus::ReviewRequired,
            InvoiceStatus::SupplierResponded,
        );
    }

    audit(
        txn,
        &NewAuditEvent::acted(
            AuditEntityType::Exception,
            exception.id.as_uuid(),
            event::EXCEPTION_SUPPLIER_RESPONDED,
            actor.actor_type(),
            actor.actor_id(),
            json!({ "supplier_response": response }),
        ),
    );
    Ok(())
}

/// Supplier withdraws a non-terminal invoice (terminal state).
///
/// # Errors
///
/// Returns a typed conflict for terminal invoices, an access error for
/// foreign invoices, or store errors.
pub fn withdraw<T: StoreTxn>(
    txn: &mut T,
    actor: Actor,
    invoice_id: InvoiceId,
) -> Result<(), PipelineError> {
    let invoice = supplier_invoice(txn, actor, invoice_id)?;
    txn.transition_invoice(invoice.id, invoice.status, InvoiceStatus::Withdrawn)?;
    audit_status_change(txn, &invoice, invoice.status, InvoiceStatus::Withdrawn);
    Ok(())
}

// ============================================================================
// SECTION: Carrier Operations
// ============================================================================

/// Carrier returns a PENDING_CARRIER_REVIEW invoice to the supplier for
/// correction. Notes live in the immutable audit payload.
///
/// # Errors
///
/// Returns a typed conflict outside PENDING_CARRIER_REVIEW, an access error
/// for foreign invoices, or store errors.
pub fn request_changes<T: StoreTxn>(
    txn: &mut T,
    actor: Actor,
    invoice_id: InvoiceId,
    carrier_notes: &str,
) -> Result<(), PipelineError> {
    let invoice = carrier_invoice(txn, actor, invoice_id)?;
    if invoice.status != InvoiceStatus::PendingCarrierReview {
        return Err(PipelineError::Conflict(format!(
            "request-changes is only valid from PENDING_CARRIER_REVIEW (current status: '{}')",
            invoice.status
        )));
    }

    txn.transition_invoice(
        invoice.id,
        InvoiceStatus::PendingCarrierReview,
        InvoiceStatus::ReviewRequired,
    )?;
    audit(
        txn,
        &NewAuditEvent::acted(
            AuditEntityType::Invoice,
            invoice.id.as_uuid(),
            event::INVOICE_CHANGES_REQUESTED,
            actor.actor_type(),
            actor.actor_id(),
            json!({
                "invoice_number": invoice.invoice_number,
                "to_status": InvoiceStatus::ReviewRequired.as_str(),
                "carrier_notes": carrier_notes,
            }),
        ),
    );
    audit_status_change(
        txn,
        &invoice,
        InvoiceStatus::PendingCarrierReview,
        InvoiceStatus::ReviewRequired,
    );
    Ok(())
}

/// Carrier begins reviewing a SUPPLIER_RESPONDED or DISPUTED invoice.
///
/// SUPPLIER_RESPONDED exceptions on the invoice advance to CARRIER_REVIEWING
/// alongside it.
///
/// # Errors
///
/// Returns a typed conflict for other statuses, an access error for foreign
/// invoices, or store errors.
pub fn start_review<T: StoreTxn>(
    txn: &mut T,
    actor: Actor,
    invoice_id: InvoiceId,
) -> Result<(), PipelineError> {
    let invoice = carrier_invoice(txn, actor, invoice_id)?;
    txn.transition_invoice(invoice.id, invoice.status, InvoiceStatus::CarrierReviewing)?;
    audit_status_change(txn, &invoice, invoice.status, InvoiceStatus::CarrierReviewing);

    for mut exception in txn.exceptions_for_invoice(invoice.id)? {
        if exception.status == ExceptionStatus::SupplierResponded {
            exception.status = ExceptionStatus::CarrierReviewing;
            txn.update_exception(&exception)?;
        }
    }
    Ok(())
}

/// Carrier disputes an invoice under review.
///
/// # Errors
///
/// Returns a typed conflict outside CARRIER_REVIEWING, an access error for
/// foreign invoices, or store errors.
pub fn dispute_invoice<T: StoreTxn>(
    txn: &mut T,
    actor: Actor,
    invoice_id: InvoiceId,
) -> Result<(), PipelineError> {
    let invoice = carrier_invoice(txn, actor, invoice_id)?;
    txn.transition_invoice(invoice.id, invoice.status, InvoiceStatus::Disputed)?;
    audit_status_change(txn, &invoice, invoice.status, InvoiceStatus::Disputed);
    Ok(())
}

/// Carrier resolves a single exception with a typed action.
///
/// `WAIVED` lands on the WAIVED terminal status; every other action lands on
/// RESOLVED. `DENIED` additionally transitions the owning line to DENIED.
///
/// # Errors
///
/// Returns a typed conflict when the exception is terminal, an access error
/// for foreign invoices, or store errors.
pub fn resolve_exception<T: StoreTxn>(
    txn: &mut T,
    actor: Actor,
    exception_id: ExceptionId,
    action: ResolutionAction,
    notes: Option<&str>,
    now: Timestamp,
) -> Result<(), PipelineError> {
    let Actor::Carrier { carrier_id, .. } = actor else {
        return Err(AccessError::Role { required: "carrier" }.into());
    };
    let (mut exception, mut line, invoice) = exception_with_context(txn, exception_id)?;
    let contract = txn.contract(invoice.contract_id)?.ok_or(PipelineError::NotFound {
        entity: "contract",
        id: invoice.contract_id.to_string(),
    })?;
    if contract.carrier_id != carrier_id {
        return Err(AccessError::CarrierScope.into());
    }

    let target = if action == ResolutionAction::Waived {
        ExceptionStatus::Waived
    } else {
        ExceptionStatus::Resolved
    };
    guard_exception_transition(exception.status, target)?;

    exception.status = target;
    exception.resolution_action = Some(action);
    exception.resolution_notes = notes.map(str::to_owned);
    exception.resolved_at = Some(now);
    exception.resolved_by = actor.actor_id();
    txn.update_exception(&exception)?;

    if action == ResolutionAction::Denied {
        guard_line_transition(line.status, LineItemStatus::Denied)?;
        line.status = LineItemStatus::Denied;
        txn.update_line_item(&line)?;
    }

    audit(
        txn,
        &NewAuditEvent::acted(
            AuditEntityType::Exception,
            exception.id.as_uuid(),
            event::EXCEPTION_RESOLVED,
            actor.actor_type(),
            actor.actor_id(),
            json!({
                "line_item_id": exception.line_item_id.to_string(),
                "resolution_action": action.as_str(),
                "resolution_notes": exception.resolution_notes,
            }),
        ),
    );
    Ok(())
}

/// Carrier approves a full invoice.
///
/// All remaining OPEN exceptions are waived, every approvable line
/// (VALIDATED, OVERRIDE, RESOLVED, EXCEPTION) is promoted to APPROVED, DENIED
/// lines are left untouched, and the invoice lands on APPROVED.
///
/// # Errors
///
/// Returns a typed conflict outside PENDING_CARRIER_REVIEW /
/// CARRIER_REVIEWING, an access error for foreign invoices, or store errors.
pub fn approve_invoice<T: StoreTxn>(
    txn: &mut T,
    actor: Actor,
    invoice_id: InvoiceId,
    notes: Option<&str>,
    now: Timestamp,
) -> Result<(), PipelineError> {
    let invoice = carrier_invoice(txn, actor, invoice_id)?;
    if !matches!(
        invoice.status,
        InvoiceStatus::PendingCarrierReview | InvoiceStatus::CarrierReviewing
    ) {
        return Err(PipelineError::Conflict(format!(
            "cannot approve invoice in status '{}'; invoice must be in \
             PENDING_CARRIER_REVIEW or CARRIER_REVIEWING",
            invoice.status
        )));
    }

    // Force-waive every remaining open exception before promoting lines.
    for mut exception in txn.exceptions_for_invoice(invoice.id)? {
        if exception.status != ExceptionStatus::Open {
            continue;
        }
        exception.status = ExceptionStatus::Waived;
        exception.resolution_action = Some(ResolutionAction::Waived);
        exception.resolution_notes =
            Some(notes.map_or_else(|| "Waived on invoice approval".to_owned(), str::to_owned));
        exception.resolved_at = Some(now);
        exception.resolved_by = actor.actor_id();
        txn.update_exception(&exception)?;
        audit(
            txn,
            &NewAuditEvent::acted(
                AuditEntityType::Exception,
                exception.id.as_uuid(),
                event::EXCEPTION_RESOLVED,
                actor.actor_type(),
                actor.actor_id(),
                json!({
                    "line_item_id": exception.line_item_id.to_string(),
                    "resolution_action": ResolutionAction::Waived.as_str(),
                    "resolution_notes": exception.resolution_notes,
                }),
            ),
        );
    }

    for mut line in txn.line_items_for_version(invoice.id, invoice.current_version)? {
        if matches!(
            line.status,
            LineItemStatus::Validated
                | LineItemStatus::Override
                | LineItemStatus::Resolved
                | LineItemStatus::Exception
        ) {
            line.status = LineItemStatus::Approved;
            txn.update_line_item(&line)?;
        }
    }

    txn.transition_invoice(invoice.id, invoice.status, InvoiceStatus::Approved)?;
    audit_status_change(txn, &invoice, invoice.status, InvoiceStatus::Approved);
    Ok(())
}

/// Carrier overrides a line's classification, creating a persistent mapping
/// rule through the expire-and-supersede protocol.
///
/// # Errors
///
/// Returns an access error for foreign invoices, a typed conflict when the
/// supersedes chain is cyclic, or store errors.
pub fn override_mapping<T: StoreTxn>(
    txn: &mut T,
    actor: Actor,
    line_item_id: LineItemId,
    request: OverrideRequest,
    now: Timestamp,
) -> Result<(), PipelineError> {
    let Actor::Carrier { carrier_id, .. } = actor else {
        return Err(AccessError::Role { required: "carrier" }.into());
    };
    let mut line = txn.line_item(line_item_id)?.ok_or(PipelineError::NotFound {
        entity: "line item",
        id: line_item_id.to_string(),
    })?;
    let invoice = txn.invoice(line.invoice_id)?.ok_or(PipelineError::NotFound {
        entity: "invoice",
        id: line.invoice_id.to_string(),
    })?;
    let contract = txn.contract(invoice.contract_id)?.ok_or(PipelineError::NotFound {
        entity: "contract",
        id: invoice.contract_id.to_string(),
    })?;
    if contract.carrier_id != carrier_id {
        return Err(AccessError::CarrierScope.into());
    }

    let prior =
        txn.active_rule_for_slot(request.supplier_id, request.match_type, &request.match_pattern)?;
    let old_taxonomy_code = prior.as_ref().map(|rule| rule.taxonomy_code.to_string());

    // Preload the supersedes chain so the cycle walk stays a pure lookup.
    // Loading stops at a revisit; the planner rejects the cycle itself.
    let mut chain = std::collections::HashMap::new();
    let mut next = prior.as_ref().and_then(|rule| rule.supersedes_rule_id);
    while let Some(id) = next {
        if chain.contains_key(&id) {
            break;
        }
        let rule = txn.mapping_rule(id)?.ok_or_else(|| {
            PipelineError::Conflict("mapping rule chain references a missing rule".to_owned())
        })?;
        next = rule.supersedes_rule_id;
        chain.insert(id, rule);
    }
    let plan = plan_override(request, prior.as_ref(), |id| chain.get(&id).cloned(), now)
        .map_err(|err| PipelineError::Conflict(err.to_string()))?;

    if let Some(expire_id) = plan.expire_rule_id {
        txn.expire_mapping_rule(expire_id, now)?;
    }
    txn.insert_mapping_rule(&plan.new_rule)?;

    guard_line_transition(line.status, LineItemStatus::Override)?;
    line.taxonomy_code = Some(plan.new_rule.taxonomy_code.clone());
    line.billing_component = Some(plan.new_rule.billing_component.clone());
    line.mapping_confidence = Some(plan.new_rule.confidence_label);
    line.mapping_rule_id = Some(plan.new_rule.id);
    line.status = LineItemStatus::Override;
    txn.update_line_item(&line)?;

    audit(
        txn,
        &NewAuditEvent::acted(
            AuditEntityType::MappingRule,
            plan.new_rule.id.as_uuid(),
            event::MAPPING_RULE_OVERRIDDEN,
            actor.actor_type(),
            actor.actor_id(),
            json!({
                "old_taxonomy_code": old_taxonomy_code,
                "new_taxonomy_code": plan.new_rule.taxonomy_code.to_string(),
                "match_pattern": plan.new_rule.match_pattern,
                "match_type": plan.new_rule.match_type.as_str(),
                "scope": (if plan.new_rule.supplier_id.is_some() { "supplier" } else { "global" }),
            }),
        ),
    );
    Ok(())
}
