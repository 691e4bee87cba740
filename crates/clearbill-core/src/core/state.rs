// crates/clearbill-core/src/core/state.rs
// ============================================================================
// Module: Clearbill State Machines
// Description: Permitted-transition tables for invoices, lines, exceptions.
// Purpose: Make every lifecycle transition an explicit, guarded edge.
// Dependencies: crate::core::{invoice, validation}, thiserror
// ============================================================================

//! ## Overview
//! Three state machines govern the platform: the invoice lifecycle, the line
//! item lifecycle, and the exception lifecycle. Transitions not listed here
//! are rejected with a typed [`TransitionError`]; terminal states reject all
//! further transitions. Stores enforce these edges with compare-and-set
//! updates so concurrent actors serialize cleanly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::invoice::InvoiceStatus;
use crate::core::invoice::LineItemStatus;
use crate::core::validation::ExceptionStatus;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Rejected state transition.
///
/// # Invariants
/// - Produced for every transition outside the permitted edge sets; the
///   entity is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// Invoice transition not in the permitted set.
    #[error("invoice transition {from} -> {to} is not permitted")]
    Invoice {
        /// Current status.
        from: InvoiceStatus,
        /// Requested status.
        to: InvoiceStatus,
    },
    /// Line item transition not in the permitted set.
    #[error("line item transition {from} -> {to} is not permitted")]
    LineItem {
        /// Current status.
        from: LineItemStatus,
        /// Requested status.
        to: LineItemStatus,
    },
    /// Exception transition not in the permitted set.
    #[error("exception transition {from} -> {to} is not permitted")]
    Exception {
        /// Current status.
        from: ExceptionStatus,
        /// Requested status.
        to: ExceptionStatus,
    },
    /// The entity was not in the status the caller expected (lost a race or
    /// the caller's read was stale).
    #[error("{entity} status is {actual}, expected {expected}")]
    StaleStatus {
        /// Entity family description.
        entity: &'static str,
        /// Status the caller expected.
        expected: String,
        /// Status actually persisted.
        actual: String,
    },
}

// ============================================================================
// SECTION: Invoice Transitions
// ============================================================================

/// Returns true when the invoice edge `from -> to` is permitted.
#[must_use]
pub const fn invoice_transition_allowed(from: InvoiceStatus, to: InvoiceStatus) -> bool {
    use InvoiceStatus as S;
    if from.is_terminal() {
        return false;
    }
    // Supplier withdrawal is permitted from any non-terminal state.
    if matches!(to, S::Withdrawn) {
        return true;
    }
    matches!(
        (from, to),
        (S::Draft, S::Submitted)
            | (S::Submitted, S::Processing)
            // Compensating edge: a failed run reverts PROCESSING for retry.
            | (S::Processing, S::PendingCarrierReview | S::ReviewRequired | S::Submitted)
            | (S::ReviewRequired, S::SupplierResponded | S::Submitted)
            | (S::SupplierResponded, S::CarrierReviewing | S::Submitted)
            | (S::PendingCarrierReview, S::Approved | S::ReviewRequired)
            | (S::CarrierReviewing, S::Approved | S::ReviewRequired | S::Disputed)
            | (S::Disputed, S::CarrierReviewing)
            | (S::Approved, S::Exported)
    )
}

/// Guards an invoice transition, returning a typed conflict when rejected.
///
/// # Errors
///
/// Returns [`TransitionError::Invoice`] when the edge is not permitted.
pub const fn guard_invoice_transition(
    from: InvoiceStatus,
    to: InvoiceStatus,
) -> Result<(), TransitionError> {
    if invoice_transition_allowed(from, to) {
        Ok(())
    } else {
        Err(TransitionError::Invoice { from, to })
    }
}

// ============================================================================
// SECTION: Line Item Transitions
// ============================================================================

/// Returns true when the line item edge `from -> to` is permitted.
#[must_use]
pub const fn line_transition_allowed(from: LineItemStatus, to: LineItemStatus) -> bool {
    use LineItemStatus as S;
    if from.is_terminal() {
        return false;
    }
    matches!(
        (from, to),
        (S::Pending, S::Classified | S::Exception)
            | (S::Classified, S::Validated | S::Exception)
            | (S::Validated, S::Approved)
            | (S::Exception, S::Override | S::Resolved | S::Approved | S::Disputed | S::Denied)
            | (S::Disputed, S::Exception)
            | (S::Override, S::Approved)
            | (S::Resolved, S::Approved)
    )
}

/// Guards a line item transition, returning a typed conflict when rejected.
///
/// # Errors
///
/// Returns [`TransitionError::LineItem`] when the edge is not permitted.
pub const fn guard_line_transition(
    from: LineItemStatus,
    to: LineItemStatus,
) -> Result<(), TransitionError> {
    if line_transition_allowed(from, to) {
        Ok(())
    } else {
        Err(TransitionError::LineItem { from, to })
    }
}

// ============================================================================
// SECTION: Exception Transitions
// ============================================================================

/// Returns true when the exception edge `from -> to` is permitted.
#[must_use]
pub const fn exception_transition_allowed(from: ExceptionStatus, to: ExceptionStatus) -> bool {
    use ExceptionStatus as S;
    if from.is_terminal() {
        return false;
    }
    matches!(
        (from, to),
        (S::Open, S::SupplierResponded | S::Resolved | S::Waived)
            | (S::SupplierResponded, S::CarrierReviewing | S::Resolved | S::Waived)
            | (S::CarrierReviewing, S::Resolved | S::Waived)
    )
}

/// Guards an exception transition, returning a typed conflict when rejected.
///
/// # Errors
///
/// Returns [`TransitionError::Exception`] when the edge is not permitted.
pub const fn guard_exception_transition(
    from: ExceptionStatus,
    to: ExceptionStatus,
) -> Result<(), TransitionError> {
    if exception_transition_allowed(from, to) {
        Ok(())
    } else {
        Err(TransitionError::Exception { from, to })
    }
}
