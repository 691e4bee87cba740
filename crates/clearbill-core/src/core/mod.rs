// crates/clearbill-core/src/core/mod.rs
// ============================================================================
// Module: Clearbill Core Types
// Description: Domain entities, identifiers, and state machines.
// Purpose: Re-export the canonical data model for the rest of the platform.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! The `core` module holds the platform's data model: opaque identifiers,
//! decimal money helpers, the taxonomy registry, the party/contract entities,
//! the invoice aggregate, validation and audit records, mapping rules, and
//! the three lifecycle state machines.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod audit;
pub mod identifiers;
pub mod invoice;
pub mod mapping;
pub mod money;
pub mod party;
pub mod state;
pub mod taxonomy;
pub mod time;
pub mod validation;

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Shared Errors
// ============================================================================

/// Unknown value for a closed enumeration.
///
/// # Invariants
/// - Raised whenever wire or store data names a variant the platform does not
///   know; closed enumerations fail loudly instead of guessing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {field} value: {value:?}")]
pub struct UnknownVariant {
    /// The enumeration field being parsed.
    pub field: &'static str,
    /// The offending value.
    pub value: String,
}

impl UnknownVariant {
    /// Creates an unknown-variant error for the given field and value.
    #[must_use]
    pub fn new(field: &'static str, value: &str) -> Self {
        Self {
            field,
            value: value.to_owned(),
        }
    }
}

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use audit::ActorType;
pub use audit::AuditEntityType;
pub use audit::AuditEvent;
pub use audit::NewAuditEvent;
pub use identifiers::ActorId;
pub use identifiers::ArtifactId;
pub use identifiers::AuditEventId;
pub use identifiers::CarrierId;
pub use identifiers::ContractId;
pub use identifiers::ExceptionId;
pub use identifiers::GuidelineId;
pub use identifiers::InvoiceId;
pub use identifiers::InvoiceVersionId;
pub use identifiers::LineItemId;
pub use identifiers::MappingRuleId;
pub use identifiers::RateCardId;
pub use identifiers::SupplierId;
pub use identifiers::ValidationResultId;
pub use invoice::FileFormat;
pub use invoice::Invoice;
pub use invoice::InvoiceStatus;
pub use invoice::InvoiceVersion;
pub use invoice::LineItem;
pub use invoice::LineItemStatus;
pub use invoice::RawExtractionArtifact;
pub use mapping::ConfidenceLabel;
pub use mapping::ConfirmedBy;
pub use mapping::MappingRule;
pub use mapping::MatchType;
pub use party::Carrier;
pub use party::Contract;
pub use party::GeographyScope;
pub use party::Guideline;
pub use party::RateCard;
pub use party::Supplier;
pub use state::TransitionError;
pub use taxonomy::TaxonomyCode;
pub use taxonomy::TaxonomyItem;
pub use taxonomy::TaxonomyRegistry;
pub use taxonomy::UnitModel;
pub use time::Timestamp;
pub use validation::ExceptionRecord;
pub use validation::ExceptionStatus;
pub use validation::Finding;
pub use validation::RequiredAction;
pub use validation::ResolutionAction;
pub use validation::ValidationResult;
pub use validation::ValidationSeverity;
pub use validation::ValidationStatus;
pub use validation::ValidationType;
