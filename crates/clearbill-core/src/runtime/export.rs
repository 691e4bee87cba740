// crates/clearbill-core/src/runtime/export.rs
// ============================================================================
// Module: Clearbill Export
// Description: Carrier-driven CSV export of approved lines.
// Purpose: Emit the AP-system import file and close the invoice lifecycle.
// Dependencies: crate::{core, interfaces, runtime}, csv, time
// ============================================================================

//! ## Overview
//! Export is the terminal carrier operation: only APPROVED invoices export,
//! only APPROVED lines are emitted, and the invoice lands on EXPORTED, after
//! which every mutating operation conflicts. Columns are fixed and ordered
//! for the receiving AP system; numeric columns preserve decimal precision.

// ============================================================================
// SECTION: Imports
// ============================================================================

use time::macros::format_description;

use crate::core::InvoiceId;
use crate::core::InvoiceStatus;
use crate::core::LineItemStatus;
use crate::core::money::format_quantity;
use crate::interfaces::StoreTxn;
use crate::runtime::Actor;
use crate::runtime::PipelineError;
use crate::runtime::pipeline::audit_status_change;

// ============================================================================
// SECTION: Export
// ============================================================================

/// Export column order expected by the AP import.
const EXPORT_COLUMNS: [&str; 10] = [
    "invoice_number",
    "claim_number",
    "service_date",
    "description",
    "taxonomy_code",
    "billing_component",
    "quantity",
    "unit",
    "billed_amount",
    "approved_amount",
];

/// Exports an APPROVED invoice's approved lines as UTF-8 CSV and transitions
/// the invoice to EXPORTED (terminal).
///
/// # Errors
///
/// Returns a typed conflict when the invoice is not APPROVED or has no
/// approved lines, an access error for foreign invoices, or store errors.
pub fn export_invoice<T: StoreTxn>(
    txn: &mut T,
    actor: Actor,
    invoice_id: InvoiceId,
) -> Result<String, PipelineError> {
    let invoice = super::operations::carrier_invoice(txn, actor, invoice_id)?;
    if invoice.status != InvoiceStatus::Approved {
        return Err(PipelineError::Conflict(format!(
            "invoice must be APPROVED before export (current: '{}')",
            invoice.status
        )));
    }

    let lines = txn.line_items_for_version(invoice.id, invoice.current_version)?;
    let approved: Vec<_> =
        lines.iter().filter(|line| line.status == LineItemStatus::Approved).collect();
    if approved.is_empty() {
        return Err(PipelineError::Conflict("no approved lines to export".to_owned()));
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(EXPORT_COLUMNS)
        .map_err(|err| PipelineError::Conflict(format!("export encoding failed: {err}")))?;
    for line in approved {
        let date_format = format_description!("[year]-[month]-[day]");
        let service_date = line
            .service_date
            .map(|date| date.format(date_format).unwrap_or_default())
            .unwrap_or_default();
        let approved_amount = line.expected_amount.as_ref().unwrap_or(&line.raw_amount);
        writer
            .write_record([
                invoice.invoice_number.as_str(),
                line.claim_number.as_deref().unwrap_or(""),
                service_date.as_str(),
                line.raw_description.as_str(),
                line.taxonomy_code.as_ref().map_or("", |code| code.as_str()),
                line.billing_component.as_deref().unwrap_or(""),
                format_quantity(&line.raw_quantity).as_str(),
                line.raw_unit.as_deref().unwrap_or(""),
                line.raw_amount.to_string().as_str(),
                approved_amount.to_string().as_str(),
            ])
            .map_err(|err| PipelineError::Conflict(format!("export encoding failed: {err}")))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| PipelineError::Conflict(format!("export encoding failed: {err}")))?;
    let rendered = String::from_utf8(bytes)
        .map_err(|err| PipelineError::Conflict(format!("export encoding failed: {err}")))?;

    txn.transition_invoice(invoice.id, InvoiceStatus::Approved, InvoiceStatus::Exported)?;
    audit_status_change(txn, &invoice, InvoiceStatus::Approved, InvoiceStatus::Exported);

    Ok(rendered)
}
