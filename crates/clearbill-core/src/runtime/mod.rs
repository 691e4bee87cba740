// crates/clearbill-core/src/runtime/mod.rs
// ============================================================================
// Module: Clearbill Runtime
// Description: Pipeline orchestration and lifecycle operations.
// Purpose: Compose parsers, classifier, and validators over the store.
// Dependencies: crate::{core, ingest, interfaces}, thiserror
// ============================================================================

//! ## Overview
//! The runtime threads a parsed invoice through classification and
//! validation, persists findings and exceptions, and advances the invoice
//! state machine. Lifecycle operations (upload, resubmit, respond, resolve,
//! approve, export, withdraw) run inside one store transaction each; the
//! [`with_txn`] helper opens and commits a transaction for callers that do
//! not hold one.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod export;
pub mod operations;
pub mod pipeline;
pub mod summary;

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::ActorId;
use crate::core::ActorType;
use crate::core::CarrierId;
use crate::core::SupplierId;
use crate::core::TransitionError;
use crate::ingest::ParseError;
use crate::interfaces::InvoiceStore;
use crate::interfaces::StorageError;
use crate::interfaces::StoreError;
use crate::interfaces::StoreTxn;

pub use export::export_invoice;
pub use operations::approve_invoice;
pub use operations::create_invoice;
pub use operations::dispute_invoice;
pub use operations::override_mapping;
pub use operations::request_changes;
pub use operations::resolve_exception;
pub use operations::respond_to_exception;
pub use operations::resubmit;
pub use operations::seed_taxonomy;
pub use operations::start_review;
pub use operations::upload;
pub use operations::withdraw;
pub use pipeline::ProcessSummary;
pub use pipeline::process_stored;
pub use pipeline::process_uploaded;
pub use summary::ValidationSummary;
pub use summary::validation_summary;

// ============================================================================
// SECTION: Actors
// ============================================================================

/// Authenticated identity performing an operation.
///
/// Supplied by the hosting authentication layer; the runtime only enforces
/// scope (a supplier acts on its own invoices, a carrier on its contracts'
/// invoices).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// The platform itself.
    System,
    /// A supplier user scoped to one supplier.
    Supplier {
        /// Acting user.
        actor_id: ActorId,
        /// Supplier the user belongs to.
        supplier_id: SupplierId,
    },
    /// A carrier user scoped to one carrier.
    Carrier {
        /// Acting user.
        actor_id: ActorId,
        /// Carrier the user belongs to.
        carrier_id: CarrierId,
    },
}

impl Actor {
    /// Returns the audit actor type for this identity.
    #[must_use]
    pub const fn actor_type(&self) -> ActorType {
        match self {
            Self::System => ActorType::System,
            Self::Supplier { .. } => ActorType::Supplier,
            Self::Carrier { .. } => ActorType::Carrier,
        }
    }

    /// Returns the acting user identifier, when human-triggered.
    #[must_use]
    pub const fn actor_id(&self) -> Option<ActorId> {
        match self {
            Self::System => None,
            Self::Supplier { actor_id, .. } | Self::Carrier { actor_id, .. } => Some(*actor_id),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Cross-tenant access denial. No state change accompanies this error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// Invoice belongs to a different supplier.
    #[error("access denied: invoice belongs to a different supplier")]
    SupplierScope,
    /// Invoice belongs to a different carrier's contract.
    #[error("access denied: invoice belongs to a different carrier")]
    CarrierScope,
    /// Operation requires a different actor role.
    #[error("access denied: operation requires a {required} actor")]
    Role {
        /// Role the operation requires.
        required: &'static str,
    },
}

/// Composite runtime error.
///
/// # Invariants
/// - Per-line validation findings never surface here; they are recorded as
///   data. This error covers input, precondition, authorization, and store
///   failures only.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Typed parse failure (input error).
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Store failure; the enclosing transaction rolls back.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// State machine conflict (precondition error).
    #[error(transparent)]
    Transition(#[from] TransitionError),
    /// Cross-tenant denial (authorization error).
    #[error(transparent)]
    Access(#[from] AccessError),
    /// File storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity family description.
        entity: &'static str,
        /// Identifier that failed to resolve.
        id: String,
    },
    /// Operation conflicts with persisted state (e.g. reprocessing an
    /// already-processed version, exporting with no approved lines).
    #[error("conflict: {0}")]
    Conflict(String),
}

// ============================================================================
// SECTION: Transaction Helper
// ============================================================================

/// Runs `body` inside a fresh store transaction, committing on success.
///
/// Dropping the transaction on the error path rolls every write back,
/// including the PROCESSING marker of an aborted pipeline run.
///
/// # Errors
///
/// Returns the body's error, or [`PipelineError::Store`] when the
/// transaction cannot be opened or committed.
pub fn with_txn<S, T>(
    store: &mut S,
    body: impl FnOnce(&mut S::Txn<'_>) -> Result<T, PipelineError>,
) -> Result<T, PipelineError>
where
    S: InvoiceStore,
{
    let mut txn = store.begin()?;
    let value = body(&mut txn)?;
    txn.commit()?;
    Ok(value)
}
