// crates/clearbill-core/src/runtime/summary.rs
// ============================================================================
// Module: Clearbill Validation Summary
// Description: Per-invoice rollup of line dispositions and totals.
// Purpose: Give callers one computed view of where an invoice stands.
// Dependencies: crate::{core, interfaces, runtime}, bigdecimal
// ============================================================================

//! ## Overview
//! The summary rolls the current version's line items up into counts and
//! decimal totals: billed, payable, in dispute, and denied. DENIED lines are
//! carrier-final and excluded from both payable and in-dispute totals.

// ============================================================================
// SECTION: Imports
// ============================================================================

use bigdecimal::BigDecimal;

use crate::core::InvoiceId;
use crate::core::LineItemStatus;
use crate::interfaces::StoreTxn;
use crate::runtime::PipelineError;

// ============================================================================
// SECTION: Summary
// ============================================================================

/// Computed rollup of one invoice version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationSummary {
    /// Total line count.
    pub total_lines: usize,
    /// Lines that validated cleanly (or were already promoted).
    pub lines_validated: usize,
    /// Lines carrying exceptions.
    pub lines_with_exceptions: usize,
    /// Lines denied by the carrier.
    pub lines_denied: usize,
    /// Sum of billed amounts across all lines.
    pub total_billed: BigDecimal,
    /// Sum of expected payable amounts for clean lines.
    pub total_payable: BigDecimal,
    /// Sum of billed amounts for lines in dispute.
    pub total_in_dispute: BigDecimal,
    /// Sum of billed amounts for denied lines.
    pub total_denied: BigDecimal,
}

/// Computes the validation summary for an invoice's current version.
///
/// # Errors
///
/// Returns [`PipelineError`] when the invoice cannot be loaded.
pub fn validation_summary<T: StoreTxn>(
    txn: &mut T,
    invoice_id: InvoiceId,
) -> Result<ValidationSummary, PipelineError> {
    let invoice = txn.invoice(invoice_id)?.ok_or(PipelineError::NotFound {
        entity: "invoice",
        id: invoice_id.to_string(),
    })?;
    let lines = txn.line_items_for_version(invoice.id, invoice.current_version)?;

    let mut summary = ValidationSummary {
        total_lines: lines.len(),
        lines_validated: 0,
        lines_with_exceptions: 0,
        lines_denied: 0,
        total_billed: BigDecimal::from(0),
        total_payable: BigDecimal::from(0),
        total_in_dispute: BigDecimal::from(0),
        total_denied: BigDecimal::from(0),
    };

    for line in &lines {
        summary.total_billed += &line.raw_amount;
        match line.status {
            LineItemStatus::Denied => {
                summary.lines_denied += 1;
                summary.total_denied += &line.raw_amount;
            }
            LineItemStatus::Exception | LineItemStatus::Disputed => {
                summary.lines_with_exceptions += 1;
                summary.total_in_dispute += &line.raw_amount;
            }
            _ => {
                summary.lines_validated += 1;
                summary.total_payable +=
                    line.expected_amount.as_ref().unwrap_or(&line.raw_amount);
            }
        }
    }

    Ok(summary)
}
