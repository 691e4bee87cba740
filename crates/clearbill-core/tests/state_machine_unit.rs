// crates/clearbill-core/tests/state_machine_unit.rs
// ============================================================================
// Module: State Machine Unit Tests
// Description: Permitted-edge tables for invoices, lines, and exceptions.
// Purpose: Pin every lifecycle edge and terminal-state rejection.
// ============================================================================

//! Lifecycle transition table tests.

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

use clearbill_core::ExceptionStatus;
use clearbill_core::InvoiceStatus;
use clearbill_core::LineItemStatus;
use clearbill_core::core::state::exception_transition_allowed;
use clearbill_core::core::state::guard_invoice_transition;
use clearbill_core::core::state::invoice_transition_allowed;
use clearbill_core::core::state::line_transition_allowed;

use InvoiceStatus as Inv;

const ALL_INVOICE_STATUSES: [InvoiceStatus; 11] = [
    Inv::Draft,
    Inv::Submitted,
    Inv::Processing,
    Inv::ReviewRequired,
    Inv::SupplierResponded,
    Inv::PendingCarrierReview,
    Inv::CarrierReviewing,
    Inv::Approved,
    Inv::Disputed,
    Inv::Exported,
    Inv::Withdrawn,
];

#[test]
fn invoice_happy_path_edges_are_permitted() {
    let edges = [
        (Inv::Draft, Inv::Submitted),
        (Inv::Submitted, Inv::Processing),
        (Inv::Processing, Inv::PendingCarrierReview),
        (Inv::Processing, Inv::ReviewRequired),
        (Inv::ReviewRequired, Inv::SupplierResponded),
        (Inv::ReviewRequired, Inv::Submitted),
        (Inv::SupplierResponded, Inv::CarrierReviewing),
        (Inv::PendingCarrierReview, Inv::Approved),
        (Inv::PendingCarrierReview, Inv::ReviewRequired),
        (Inv::CarrierReviewing, Inv::Approved),
        (Inv::CarrierReviewing, Inv::ReviewRequired),
        (Inv::CarrierReviewing, Inv::Disputed),
        (Inv::Disputed, Inv::CarrierReviewing),
        (Inv::Approved, Inv::Exported),
    ];
    for (from, to) in edges {
        assert!(invoice_transition_allowed(from, to), "{from} -> {to} must be permitted");
    }
}

#[test]
fn processing_can_compensate_back_to_submitted() {
    assert!(invoice_transition_allowed(Inv::Processing, Inv::Submitted));
}

#[test]
fn any_non_terminal_invoice_can_be_withdrawn() {
    for from in ALL_INVOICE_STATUSES {
        let allowed = invoice_transition_allowed(from, Inv::Withdrawn);
        assert_eq!(allowed, !from.is_terminal(), "withdraw from {from}");
    }
}

#[test]
fn terminal_invoices_reject_every_transition() {
    for terminal in [Inv::Exported, Inv::Withdrawn] {
        for to in ALL_INVOICE_STATUSES {
            assert!(!invoice_transition_allowed(terminal, to), "{terminal} -> {to}");
        }
    }
}

#[test]
fn unlisted_invoice_edges_are_rejected_with_typed_conflict() {
    let rejected = [
        (Inv::Draft, Inv::Approved),
        (Inv::Draft, Inv::Processing),
        (Inv::Submitted, Inv::Approved),
        (Inv::PendingCarrierReview, Inv::Exported),
        (Inv::SupplierResponded, Inv::Approved),
        (Inv::ReviewRequired, Inv::Approved),
        (Inv::Approved, Inv::Submitted),
    ];
    for (from, to) in rejected {
        assert!(!invoice_transition_allowed(from, to), "{from} -> {to} must be rejected");
        assert!(guard_invoice_transition(from, to).is_err());
    }
}

#[test]
fn line_lifecycle_edges() {
    use LineItemStatus as Line;
    assert!(line_transition_allowed(Line::Pending, Line::Classified));
    assert!(line_transition_allowed(Line::Pending, Line::Exception));
    assert!(line_transition_allowed(Line::Classified, Line::Validated));
    assert!(line_transition_allowed(Line::Classified, Line::Exception));
    assert!(line_transition_allowed(Line::Validated, Line::Approved));
    assert!(line_transition_allowed(Line::Exception, Line::Override));
    assert!(line_transition_allowed(Line::Exception, Line::Resolved));
    assert!(line_transition_allowed(Line::Exception, Line::Approved));
    assert!(line_transition_allowed(Line::Exception, Line::Disputed));
    assert!(line_transition_allowed(Line::Exception, Line::Denied));
    assert!(line_transition_allowed(Line::Override, Line::Approved));
    assert!(line_transition_allowed(Line::Resolved, Line::Approved));

    // Approved and denied lines are terminal.
    assert!(!line_transition_allowed(Line::Approved, Line::Exception));
    assert!(!line_transition_allowed(Line::Denied, Line::Approved));
    // A pending line cannot jump straight to approval.
    assert!(!line_transition_allowed(Line::Pending, Line::Approved));
}

#[test]
fn exception_lifecycle_edges() {
    use ExceptionStatus as Exc;
    assert!(exception_transition_allowed(Exc::Open, Exc::SupplierResponded));
    assert!(exception_transition_allowed(Exc::Open, Exc::Resolved));
    assert!(exception_transition_allowed(Exc::Open, Exc::Waived));
    assert!(exception_transition_allowed(Exc::SupplierResponded, Exc::CarrierReviewing));
    assert!(exception_transition_allowed(Exc::SupplierResponded, Exc::Resolved));
    assert!(exception_transition_allowed(Exc::SupplierResponded, Exc::Waived));
    assert!(exception_transition_allowed(Exc::CarrierReviewing, Exc::Resolved));
    assert!(exception_transition_allowed(Exc::CarrierReviewing, Exc::Waived));

    // Resolved and waived exceptions are terminal and immutable.
    for terminal in [Exc::Resolved, Exc::Waived] {
        for to in [
            Exc::Open,
            Exc::SupplierResponded,
            Exc::CarrierReviewing,
            Exc::Resolved,
            Exc::Waived,
        ] {
            assert!(!exception_transition_allowed(terminal, to), "{terminal} -> {to}");
        }
    }
    // An open exception never skips straight to carrier review.
    assert!(!exception_transition_allowed(Exc::Open, Exc::CarrierReviewing));
}
