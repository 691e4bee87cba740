// crates/clearbill-core/src/lib.rs
// ============================================================================
// Module: Clearbill Core
// Description: Invoice ingestion, classification, validation, and workflow.
// Purpose: Deterministic core of the Clearbill invoice validation platform.
// Dependencies: bigdecimal, csv, regex, serde, serde_json, thiserror, time, tracing, uuid
// ============================================================================

//! # Clearbill Core
//!
//! Clearbill receives vendor invoices for claims-adjacent services
//! (independent medical exams, engineering assessments, field adjusting,
//! investigation, record retrieval), classifies each billed line to a
//! canonical service taxonomy, validates lines against contracted rates and
//! structured guidelines, and drives the resulting exceptions through a
//! supplier/carrier resolution workflow to approval and export.
//!
//! The crate is deterministic given its inputs and persisted rule set. It
//! performs no I/O of its own: hosts supply file bytes, a transactional
//! store, a storage surface, timestamps, and an authenticated actor
//! identity through the [`interfaces`] seams.
//!
//! Module map:
//! - [`core`] - data model, identifiers, money, taxonomy, state machines.
//! - [`ingest`] - file parsers producing normalized raw line items.
//! - [`classify`] - layered rule classification and the override protocol.
//! - [`validate`] - pure rate and guideline validators.
//! - [`runtime`] - pipeline orchestration and lifecycle operations.
//! - [`interfaces`] - store, storage, and assessor contracts.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod classify;
pub mod core;
pub mod ingest;
pub mod interfaces;
pub mod runtime;
pub mod validate;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use crate::core::ActorId;
pub use crate::core::ActorType;
pub use crate::core::AuditEntityType;
pub use crate::core::AuditEvent;
pub use crate::core::Carrier;
pub use crate::core::CarrierId;
pub use crate::core::ConfidenceLabel;
pub use crate::core::ConfirmedBy;
pub use crate::core::Contract;
pub use crate::core::ContractId;
pub use crate::core::ExceptionId;
pub use crate::core::ExceptionRecord;
pub use crate::core::ExceptionStatus;
pub use crate::core::FileFormat;
pub use crate::core::Finding;
pub use crate::core::GeographyScope;
pub use crate::core::Guideline;
pub use crate::core::GuidelineId;
pub use crate::core::Invoice;
pub use crate::core::InvoiceId;
pub use crate::core::InvoiceStatus;
pub use crate::core::InvoiceVersion;
pub use crate::core::InvoiceVersionId;
pub use crate::core::LineItem;
pub use crate::core::LineItemId;
pub use crate::core::LineItemStatus;
pub use crate::core::MappingRule;
pub use crate::core::MappingRuleId;
pub use crate::core::MatchType;
pub use crate::core::NewAuditEvent;
pub use crate::core::RateCard;
pub use crate::core::RateCardId;
pub use crate::core::RawExtractionArtifact;
pub use crate::core::RequiredAction;
pub use crate::core::ResolutionAction;
pub use crate::core::Supplier;
pub use crate::core::SupplierId;
pub use crate::core::TaxonomyCode;
pub use crate::core::TaxonomyItem;
pub use crate::core::TaxonomyRegistry;
pub use crate::core::Timestamp;
pub use crate::core::TransitionError;
pub use crate::core::UnknownVariant;
pub use crate::core::UnitModel;
pub use crate::core::ValidationResult;
pub use crate::core::ValidationResultId;
pub use crate::core::ValidationSeverity;
pub use crate::core::ValidationStatus;
pub use crate::core::ValidationType;
pub use crate::classify::Classification;
pub use crate::classify::Classifier;
pub use crate::classify::Confidence;
pub use crate::ingest::InvoiceParser;
pub use crate::ingest::ParseError;
pub use crate::ingest::ParseResult;
pub use crate::ingest::RawLineItem;
pub use crate::interfaces::Assessment;
pub use crate::interfaces::AssessmentScore;
pub use crate::interfaces::AssessorError;
pub use crate::interfaces::DescriptionAssessor;
pub use crate::interfaces::FileStorage;
pub use crate::interfaces::InvoiceStore;
pub use crate::interfaces::StorageError;
pub use crate::interfaces::StoreError;
pub use crate::interfaces::StoreTxn;
pub use crate::runtime::AccessError;
pub use crate::runtime::Actor;
pub use crate::runtime::PipelineError;
pub use crate::runtime::ProcessSummary;
pub use crate::runtime::ValidationSummary;
