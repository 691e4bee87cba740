// crates/clearbill-core/src/interfaces/mod.rs
// ============================================================================
// Module: Clearbill Interfaces
// Description: Backend-agnostic interfaces for storage and assessment.
// Purpose: Define the contract surfaces the runtime composes against.
// Dependencies: crate::core, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how the core integrates with external systems without
//! embedding backend detail: a transactional invoice store, a byte-stream
//! file storage surface, and the strictly optional description assessor.
//! Store implementations must provide transactional multi-row writes; the
//! orchestrator commits one transaction per pipeline run.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::core::AuditEntityType;
use crate::core::AuditEvent;
use crate::core::Carrier;
use crate::core::Contract;
use crate::core::ContractId;
use crate::core::ExceptionId;
use crate::core::ExceptionRecord;
use crate::core::Guideline;
use crate::core::Invoice;
use crate::core::InvoiceId;
use crate::core::InvoiceStatus;
use crate::core::InvoiceVersion;
use crate::core::LineItem;
use crate::core::LineItemId;
use crate::core::MappingRule;
use crate::core::MappingRuleId;
use crate::core::MatchType;
use crate::core::NewAuditEvent;
use crate::core::RateCard;
use crate::core::RawExtractionArtifact;
use crate::core::Supplier;
use crate::core::SupplierId;
use crate::core::TaxonomyCode;
use crate::core::TaxonomyItem;
use crate::core::Timestamp;
use crate::core::TransitionError;
use crate::core::ValidationResult;
use crate::core::ValidationResultId;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Invoice store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("invoice store io error: {0}")]
    Io(String),
    /// Store engine error.
    #[error("invoice store error: {0}")]
    Store(String),
    /// Store data is invalid or fails referential checks.
    #[error("invoice store invalid data: {0}")]
    Invalid(String),
    /// Referenced row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity family description.
        entity: &'static str,
        /// Identifier that failed to resolve.
        id: String,
    },
    /// A uniqueness or referential constraint was violated.
    #[error("invoice store conflict: {0}")]
    Conflict(String),
    /// A guarded status transition was rejected.
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

// ============================================================================
// SECTION: Store Transaction
// ============================================================================

/// One transactional session against the invoice store.
///
/// All writes performed through a transaction commit atomically via
/// [`StoreTxn::commit`]; dropping the transaction without committing rolls
/// everything back.
pub trait StoreTxn {
    // ── Parties and contract terms ──────────────────────────────────────

    /// Inserts a carrier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn insert_carrier(&mut self, carrier: &Carrier) -> Result<(), StoreError>;

    /// Inserts a supplier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn insert_supplier(&mut self, supplier: &Supplier) -> Result<(), StoreError>;

    /// Inserts a contract.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn insert_contract(&mut self, contract: &Contract) -> Result<(), StoreError>;

    /// Loads a contract by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn contract(&mut self, id: ContractId) -> Result<Option<Contract>, StoreError>;

    /// Inserts a rate card. The taxonomy code must exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails or the code is unknown.
    fn insert_rate_card(&mut self, card: &RateCard) -> Result<(), StoreError>;

    /// Loads all rate cards for a `(contract, taxonomy_code)` pair.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn rate_cards_for(
        &mut self,
        contract_id: ContractId,
        taxonomy_code: &TaxonomyCode,
    ) -> Result<Vec<RateCard>, StoreError>;

    /// Inserts a guideline. The taxonomy code, when set, must exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails or the code is unknown.
    fn insert_guideline(&mut self, guideline: &Guideline) -> Result<(), StoreError>;

    /// Loads active guidelines for a contract.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn active_guidelines(&mut self, contract_id: ContractId) -> Result<Vec<Guideline>, StoreError>;

    // ── Taxonomy projection ─────────────────────────────────────────────

    /// Upserts a taxonomy item by code. The persisted `active` flag is never
    /// overwritten for existing rows.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn upsert_taxonomy_item(&mut self, item: &TaxonomyItem) -> Result<(), StoreError>;

    /// Loads a taxonomy item by code.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn taxonomy_item(&mut self, code: &TaxonomyCode) -> Result<Option<TaxonomyItem>, StoreError>;

    // ── Invoices and versions ───────────────────────────────────────────

    /// Inserts an invoice.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError>;

    /// Loads an invoice by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn invoice(&mut self, id: InvoiceId) -> Result<Option<Invoice>, StoreError>;

    /// Updates invoice header fields (file pointer, format, version,
    /// submission metadata). Status is NOT written here; use
    /// [`StoreTxn::transition_invoice`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn update_invoice_header(&mut self, invoice: &Invoice) -> Result<(), StoreError>;

    /// Transitions invoice status with compare-and-set semantics: the write
    /// succeeds only when the persisted status still equals `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Transition`] when the edge is not permitted or
    /// the persisted status no longer matches `expected`.
    fn transition_invoice(
        &mut self,
        id: InvoiceId,
        expected: InvoiceStatus,
        to: InvoiceStatus,
    ) -> Result<(), StoreError>;

    /// Inserts an invoice version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails or the `(invoice,
    /// version_number)` pair already exists.
    fn insert_invoice_version(&mut self, version: &InvoiceVersion) -> Result<(), StoreError>;

    /// Loads a specific invoice version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn invoice_version(
        &mut self,
        invoice_id: InvoiceId,
        version_number: i64,
    ) -> Result<Option<InvoiceVersion>, StoreError>;

    // ── Line items ──────────────────────────────────────────────────────

    /// Inserts a line item.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn insert_line_item(&mut self, line: &LineItem) -> Result<(), StoreError>;

    /// Rewrites a line item (classification/validation fields and status).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn update_line_item(&mut self, line: &LineItem) -> Result<(), StoreError>;

    /// Loads a line item by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn line_item(&mut self, id: LineItemId) -> Result<Option<LineItem>, StoreError>;

    /// Loads all line items for an invoice version, in line order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn line_items_for_version(
        &mut self,
        invoice_id: InvoiceId,
        version_number: i64,
    ) -> Result<Vec<LineItem>, StoreError>;

    /// Counts line items for an invoice version (idempotence guard).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn count_line_items(
        &mut self,
        invoice_id: InvoiceId,
        version_number: i64,
    ) -> Result<u64, StoreError>;

    // ── Extraction artifacts ────────────────────────────────────────────

    /// Inserts a raw extraction artifact (write-once).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn insert_artifact(&mut self, artifact: &RawExtractionArtifact) -> Result<(), StoreError>;

    // ── Validation results and exceptions ───────────────────────────────

    /// Inserts a validation result (immutable once written).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn insert_validation_result(&mut self, result: &ValidationResult) -> Result<(), StoreError>;

    /// Loads a validation result by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn validation_result(
        &mut self,
        id: ValidationResultId,
    ) -> Result<Option<ValidationResult>, StoreError>;

    /// Inserts an exception record. The referenced validation result must
    /// carry FAIL or WARNING status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails or the referent is not
    /// FAIL/WARNING.
    fn insert_exception(&mut self, record: &ExceptionRecord) -> Result<(), StoreError>;

    /// Loads an exception by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn exception(&mut self, id: ExceptionId) -> Result<Option<ExceptionRecord>, StoreError>;

    /// Rewrites an exception's lifecycle fields.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn update_exception(&mut self, record: &ExceptionRecord) -> Result<(), StoreError>;

    /// Loads every exception belonging to an invoice's line items.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn exceptions_for_invoice(
        &mut self,
        invoice_id: InvoiceId,
    ) -> Result<Vec<ExceptionRecord>, StoreError>;

    // ── Mapping rules ───────────────────────────────────────────────────

    /// Inserts a mapping rule. The taxonomy code must exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails or the code is unknown.
    fn insert_mapping_rule(&mut self, rule: &MappingRule) -> Result<(), StoreError>;

    /// Loads a mapping rule by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn mapping_rule(&mut self, id: MappingRuleId) -> Result<Option<MappingRule>, StoreError>;

    /// Expires a mapping rule (`effective_to = at`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn expire_mapping_rule(&mut self, id: MappingRuleId, at: Timestamp)
    -> Result<(), StoreError>;

    /// Loads currently-effective rules for one scope: a specific supplier, or
    /// the global scope when `supplier_id` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn effective_mapping_rules(
        &mut self,
        supplier_id: Option<SupplierId>,
        at: Timestamp,
    ) -> Result<Vec<MappingRule>, StoreError>;

    /// Finds the active rule occupying a `(supplier, match_type, pattern)`
    /// slot, for the override protocol.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn active_rule_for_slot(
        &mut self,
        supplier_id: Option<SupplierId>,
        match_type: MatchType,
        match_pattern: &str,
    ) -> Result<Option<MappingRule>, StoreError>;

    // ── Audit ───────────────────────────────────────────────────────────

    /// Appends an audit event. `created_at` and the tie-breaking sequence are
    /// assigned by the store; the append API carries no timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn append_audit_event(&mut self, event: &NewAuditEvent) -> Result<(), StoreError>;

    /// Loads the audit trail for one entity, ordered by `(created_at, seq)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn audit_events_for_entity(
        &mut self,
        entity_type: AuditEntityType,
        entity_id: Uuid,
    ) -> Result<Vec<AuditEvent>, StoreError>;

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Commits every write performed through this transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the commit fails; all writes roll back.
    fn commit(self) -> Result<(), StoreError>
    where
        Self: Sized;
}

/// Transactional invoice store.
pub trait InvoiceStore {
    /// Transaction type bound to this store's connection.
    type Txn<'a>: StoreTxn
    where
        Self: 'a;

    /// Begins a transaction. Dropping the transaction without committing
    /// rolls back.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when a transaction cannot be opened.
    fn begin(&mut self) -> Result<Self::Txn<'_>, StoreError>;
}

// ============================================================================
// SECTION: File Storage
// ============================================================================

/// File storage errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Storage backend reported an error.
    #[error("file storage error: {0}")]
    Backend(String),
    /// The requested pointer does not exist.
    #[error("stored file not found: {0}")]
    NotFound(String),
}

/// Storage surface for retained invoice files.
pub trait FileStorage {
    /// Saves file bytes under a caller-chosen key; returns an opaque pointer.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the write fails.
    fn save(&mut self, key: &str, data: &[u8]) -> Result<String, StorageError>;

    /// Loads file bytes by pointer.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the pointer is unknown or the read
    /// fails.
    fn load(&self, pointer: &str) -> Result<Vec<u8>, StorageError>;
}

// ============================================================================
// SECTION: Description Assessor
// ============================================================================

/// Alignment verdict between a supplier description and its classified
/// service.
///
/// # Invariants
/// - Variants are stable for serialization and store round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssessmentScore {
    /// Description clearly refers to the contracted service type.
    Aligned,
    /// Description is vague or only partially identifies the service.
    Partial,
    /// Description appears to describe a different service.
    Misaligned,
}

/// Semantic assessment of a line description, produced by an external model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    /// Alignment verdict.
    pub score: AssessmentScore,
    /// One-sentence rationale.
    pub rationale: String,
    /// Identifier of the model that produced the assessment.
    pub model: String,
}

/// Assessor errors. Always swallowed by the pipeline with a warning log.
#[derive(Debug, Error)]
pub enum AssessorError {
    /// Assessor backend reported an error or timed out.
    #[error("description assessor error: {0}")]
    Backend(String),
}

/// Strictly optional helper that judges whether a description is consistent
/// with the service it was classified under.
///
/// Implementations must degrade gracefully: configuration or transport
/// problems yield `Ok(None)` or an error the pipeline swallows; they never
/// block or fail processing.
pub trait DescriptionAssessor {
    /// Assesses one description against the classified service label.
    ///
    /// # Errors
    ///
    /// Returns [`AssessorError`] on backend failure; callers treat any error
    /// as "no assessment".
    fn assess(
        &self,
        raw_description: &str,
        taxonomy_label: &str,
    ) -> Result<Option<Assessment>, AssessorError>;
}
