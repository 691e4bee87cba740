// crates/clearbill-core/src/core/invoice.rs
// ============================================================================
// Module: Clearbill Invoice Entities
// Description: Invoices, invoice versions, line items, extraction artifacts.
// Purpose: Model the invoice aggregate and its lifecycle states.
// Dependencies: crate::core::{identifiers, taxonomy, time, mod}, bigdecimal, serde, time
// ============================================================================

//! ## Overview
//! An invoice is the lifecycle owner: each upload or resubmission creates an
//! immutable [`InvoiceVersion`], processing creates [`LineItem`] rows bound to
//! that version, and every parse retains a [`RawExtractionArtifact`] so
//! disputes can always cite the source document. Prior-version line items are
//! never deleted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde::Serialize;
use time::Date;

use crate::core::UnknownVariant;
use crate::core::identifiers::ArtifactId;
use crate::core::identifiers::ContractId;
use crate::core::identifiers::InvoiceId;
use crate::core::identifiers::InvoiceVersionId;
use crate::core::identifiers::LineItemId;
use crate::core::identifiers::MappingRuleId;
use crate::core::identifiers::SupplierId;
use crate::core::mapping::ConfidenceLabel;
use crate::core::taxonomy::TaxonomyCode;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Lifecycle States
// ============================================================================

/// Invoice lifecycle state.
///
/// # Invariants
/// - Variants are stable for serialization and store round-trips.
/// - `Exported` and `Withdrawn` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    /// Created, no file uploaded yet.
    Draft,
    /// File uploaded, awaiting processing.
    Submitted,
    /// Pipeline is running.
    Processing,
    /// Exceptions (or a parse failure) require supplier action.
    ReviewRequired,
    /// Supplier has responded to exceptions.
    SupplierResponded,
    /// Clean processing; awaiting carrier review.
    PendingCarrierReview,
    /// Carrier is actively reviewing supplier responses.
    CarrierReviewing,
    /// Carrier approved the invoice.
    Approved,
    /// Carrier disputed the invoice.
    Disputed,
    /// Approved lines exported to the AP system (terminal).
    Exported,
    /// Supplier withdrew the invoice (terminal).
    Withdrawn,
}

impl InvoiceStatus {
    /// Returns the stable wire form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Submitted => "SUBMITTED",
            Self::Processing => "PROCESSING",
            Self::ReviewRequired => "REVIEW_REQUIRED",
            Self::SupplierResponded => "SUPPLIER_RESPONDED",
            Self::PendingCarrierReview => "PENDING_CARRIER_REVIEW",
            Self::CarrierReviewing => "CARRIER_REVIEWING",
            Self::Approved => "APPROVED",
            Self::Disputed => "DISPUTED",
            Self::Exported => "EXPORTED",
            Self::Withdrawn => "WITHDRAWN",
        }
    }

    /// Returns true when no further transitions are permitted.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Exported | Self::Withdrawn)
    }
}

impl FromStr for InvoiceStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(Self::Draft),
            "SUBMITTED" => Ok(Self::Submitted),
            "PROCESSING" => Ok(Self::Processing),
            "REVIEW_REQUIRED" => Ok(Self::ReviewRequired),
            "SUPPLIER_RESPONDED" => Ok(Self::SupplierResponded),
            "PENDING_CARRIER_REVIEW" => Ok(Self::PendingCarrierReview),
            "CARRIER_REVIEWING" => Ok(Self::CarrierReviewing),
            "APPROVED" => Ok(Self::Approved),
            "DISPUTED" => Ok(Self::Disputed),
            "EXPORTED" => Ok(Self::Exported),
            "WITHDRAWN" => Ok(Self::Withdrawn),
            other => Err(UnknownVariant::new("invoice_status", other)),
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Line item lifecycle state.
///
/// # Invariants
/// - Variants are stable for serialization and store round-trips.
/// - `Approved` and `Denied` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineItemStatus {
    /// Inserted, not yet classified.
    Pending,
    /// Classified to a taxonomy code.
    Classified,
    /// Validated with no FAIL findings.
    Validated,
    /// At least one FAIL finding; exceptions are open.
    Exception,
    /// Carrier overrode the classification.
    Override,
    /// Exceptions resolved.
    Resolved,
    /// Approved for payment (terminal).
    Approved,
    /// Under carrier dispute.
    Disputed,
    /// Denied, non-payable (terminal).
    Denied,
}

impl LineItemStatus {
    /// Returns the stable wire form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Classified => "CLASSIFIED",
            Self::Validated => "VALIDATED",
            Self::Exception => "EXCEPTION",
            Self::Override => "OVERRIDE",
            Self::Resolved => "RESOLVED",
            Self::Approved => "APPROVED",
            Self::Disputed => "DISPUTED",
            Self::Denied => "DENIED",
        }
    }

    /// Returns true when no further transitions are permitted.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Denied)
    }
}

impl FromStr for LineItemStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "CLASSIFIED" => Ok(Self::Classified),
            "VALIDATED" => Ok(Self::Validated),
            "EXCEPTION" => Ok(Self::Exception),
            "OVERRIDE" => Ok(Self::Override),
            "RESOLVED" => Ok(Self::Resolved),
            "APPROVED" => Ok(Self::Approved),
            "DISPUTED" => Ok(Self::Disputed),
            "DENIED" => Ok(Self::Denied),
            other => Err(UnknownVariant::new("line_item_status", other)),
        }
    }
}

impl fmt::Display for LineItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported invoice file formats.
///
/// # Invariants
/// - Variants are stable for serialization and store round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    /// Comma- or tab-separated values.
    Csv,
    /// Portable document format (parser reserved for a future release).
    Pdf,
}

impl FileFormat {
    /// Returns the stable wire form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Pdf => "pdf",
        }
    }
}

impl FromStr for FileFormat {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "csv" => Ok(Self::Csv),
            "pdf" => Ok(Self::Pdf),
            other => Err(UnknownVariant::new("file_format", other)),
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Invoice and Versions
// ============================================================================

/// A single invoice submission from a supplier.
///
/// # Invariants
/// - `current_version` equals the greatest `version_number` among versions.
/// - Resubmissions create new [`InvoiceVersion`] rows, never new invoices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    /// Invoice identifier.
    pub id: InvoiceId,
    /// Submitting supplier.
    pub supplier_id: SupplierId,
    /// Governing contract.
    pub contract_id: ContractId,
    /// Supplier's own invoice number.
    pub invoice_number: String,
    /// Invoice date as stated by the supplier.
    pub invoice_date: Date,
    /// Lifecycle state.
    pub status: InvoiceStatus,
    /// Greatest version number uploaded so far.
    pub current_version: i64,
    /// Storage pointer for the most recent file.
    pub file_pointer: Option<String>,
    /// Format of the most recent file.
    pub file_format: Option<FileFormat>,
    /// When the most recent version was submitted.
    pub submitted_at: Option<Timestamp>,
    /// Supplier memo on initial submission.
    pub submission_notes: Option<String>,
}

/// One upload attempt for an invoice.
///
/// # Invariants
/// - `(invoice_id, version_number)` is unique.
/// - Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceVersion {
    /// Version identifier.
    pub id: InvoiceVersionId,
    /// Owning invoice.
    pub invoice_id: InvoiceId,
    /// Version ordinal, starting at 1.
    pub version_number: i64,
    /// Storage pointer for this version's file.
    pub file_pointer: String,
    /// File format of this version.
    pub file_format: FileFormat,
    /// When this version was submitted.
    pub submitted_at: Timestamp,
    /// Optional notes attached to this version.
    pub notes: Option<String>,
}

// ============================================================================
// SECTION: Line Items
// ============================================================================

/// A single normalized line from a supplier invoice.
///
/// Raw fields (`raw_*`) hold exactly what was extracted from the file; mapped
/// fields are set by the classification engine; validation fields by the rate
/// and guideline engines.
///
/// # Invariants
/// - Belongs to exactly one invoice version; created once per raw row per
///   version and never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Line item identifier.
    pub id: LineItemId,
    /// Owning invoice.
    pub invoice_id: InvoiceId,
    /// Invoice version this line belongs to.
    pub invoice_version: i64,
    /// 1-based position within the source file.
    pub line_number: i64,
    /// Lifecycle state.
    pub status: LineItemStatus,
    /// Raw service description from the file.
    pub raw_description: String,
    /// Supplier's own billing code, if present.
    pub raw_code: Option<String>,
    /// Billed amount.
    pub raw_amount: BigDecimal,
    /// Billed quantity (defaults to 1 when the column is absent).
    pub raw_quantity: BigDecimal,
    /// Billing unit label, if present.
    pub raw_unit: Option<String>,
    /// Claim number context, if present.
    pub claim_number: Option<String>,
    /// Service date, if present.
    pub service_date: Option<Date>,
    /// Classified taxonomy code.
    pub taxonomy_code: Option<TaxonomyCode>,
    /// Classified billing component.
    pub billing_component: Option<String>,
    /// Classification confidence label.
    pub mapping_confidence: Option<ConfidenceLabel>,
    /// Persisted mapping rule that matched, when DB-backed.
    pub mapping_rule_id: Option<MappingRuleId>,
    /// Contracted per-unit rate applied during validation.
    pub mapped_rate: Option<BigDecimal>,
    /// Expected payable amount after validation.
    pub expected_amount: Option<BigDecimal>,
    /// Optional AI description-alignment assessment document.
    pub ai_assessment: Option<serde_json::Value>,
}

// ============================================================================
// SECTION: Extraction Artifacts
// ============================================================================

/// Raw text retained from each parsed file for dispute resolution.
///
/// # Invariants
/// - Write-once; retained for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawExtractionArtifact {
    /// Artifact identifier.
    pub id: ArtifactId,
    /// Owning invoice version.
    pub invoice_version_id: InvoiceVersionId,
    /// Page number for paged formats; `None` for CSV.
    pub page_number: Option<i64>,
    /// Bounded sample of the raw extracted text.
    pub raw_text: String,
    /// Extraction method (e.g. `csv`).
    pub extraction_method: String,
    /// Structured extraction metadata (warnings, line counts).
    pub metadata: serde_json::Value,
}
