// crates/clearbill-core/src/core/validation.rs
// ============================================================================
// Module: Clearbill Validation Records
// Description: Validation findings, persisted results, and exception records.
// Purpose: Model per-line validation outcomes as immutable data, never errors.
// Dependencies: crate::core::{identifiers, mod}, serde
// ============================================================================

//! ## Overview
//! Validators never raise for business findings: every check produces zero or
//! more [`Finding`] values that the orchestrator persists as
//! [`ValidationResult`] rows. Each FAIL finding opens exactly one
//! [`ExceptionRecord`], which then carries its own resolution lifecycle.
//! Results are immutable once written; reprocessing appends new rows.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::core::UnknownVariant;
use crate::core::identifiers::ActorId;
use crate::core::identifiers::ExceptionId;
use crate::core::identifiers::GuidelineId;
use crate::core::identifiers::LineItemId;
use crate::core::identifiers::RateCardId;
use crate::core::identifiers::ValidationResultId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Closed Enumerations
// ============================================================================

/// Which engine produced a validation result.
///
/// # Invariants
/// - Variants are stable for serialization and store round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationType {
    /// Rate card validation.
    Rate,
    /// Guideline validation.
    Guideline,
    /// Classification outcome (e.g. unrecognized service).
    Classification,
}

impl ValidationType {
    /// Returns the stable wire form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rate => "RATE",
            Self::Guideline => "GUIDELINE",
            Self::Classification => "CLASSIFICATION",
        }
    }
}

impl FromStr for ValidationType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RATE" => Ok(Self::Rate),
            "GUIDELINE" => Ok(Self::Guideline),
            "CLASSIFICATION" => Ok(Self::Classification),
            other => Err(UnknownVariant::new("validation_type", other)),
        }
    }
}

impl fmt::Display for ValidationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single validation check.
///
/// # Invariants
/// - Variants are stable for serialization and store round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    /// Check passed.
    Pass,
    /// Check failed; an exception is opened.
    Fail,
    /// Check flagged for review; does not block on its own.
    Warning,
}

impl ValidationStatus {
    /// Returns the stable wire form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Warning => "WARNING",
        }
    }
}

impl FromStr for ValidationStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PASS" => Ok(Self::Pass),
            "FAIL" => Ok(Self::Fail),
            "WARNING" => Ok(Self::Warning),
            other => Err(UnknownVariant::new("validation_status", other)),
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a validation finding.
///
/// # Invariants
/// - Variants are stable for serialization and store round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationSeverity {
    /// Blocks payment; supplier must act.
    Error,
    /// Flagged for carrier review; does not block.
    Warning,
    /// Recorded for audit; no action required.
    Info,
}

impl ValidationSeverity {
    /// Returns the stable wire form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
            Self::Info => "INFO",
        }
    }
}

impl FromStr for ValidationSeverity {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ERROR" => Ok(Self::Error),
            "WARNING" => Ok(Self::Warning),
            "INFO" => Ok(Self::Info),
            other => Err(UnknownVariant::new("validation_severity", other)),
        }
    }
}

impl fmt::Display for ValidationSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable next step for the responsible party.
///
/// # Invariants
/// - Variants are stable for serialization and store round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequiredAction {
    /// No action required.
    None,
    /// Supplier must correct and re-upload the invoice.
    Reupload,
    /// Supplier must attach supporting documentation.
    AttachDoc,
    /// Line needs manual reclassification.
    RequestReclassification,
    /// Supplier must accept a payment reduction.
    AcceptReduction,
}

impl RequiredAction {
    /// Returns the stable wire form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Reupload => "REUPLOAD",
            Self::AttachDoc => "ATTACH_DOC",
            Self::RequestReclassification => "REQUEST_RECLASSIFICATION",
            Self::AcceptReduction => "ACCEPT_REDUCTION",
        }
    }
}

impl FromStr for RequiredAction {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NONE" => Ok(Self::None),
            "REUPLOAD" => Ok(Self::Reupload),
            "ATTACH_DOC" => Ok(Self::AttachDoc),
            "REQUEST_RECLASSIFICATION" => Ok(Self::RequestReclassification),
            "ACCEPT_REDUCTION" => Ok(Self::AcceptReduction),
            other => Err(UnknownVariant::new("required_action", other)),
        }
    }
}

impl fmt::Display for RequiredAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exception lifecycle state.
///
/// # Invariants
/// - Variants are stable for serialization and store round-trips.
/// - `Resolved` and `Waived` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExceptionStatus {
    /// Awaiting supplier action.
    Open,
    /// Supplier has responded; awaiting carrier review.
    SupplierResponded,
    /// Carrier is actively reviewing.
    CarrierReviewing,
    /// Carrier resolved with a typed action (terminal).
    Resolved,
    /// Carrier waived the exception (terminal).
    Waived,
}

impl ExceptionStatus {
    /// Returns the stable wire form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::SupplierResponded => "SUPPLIER_RESPONDED",
            Self::CarrierReviewing => "CARRIER_REVIEWING",
            Self::Resolved => "RESOLVED",
            Self::Waived => "WAIVED",
        }
    }

    /// Returns true when no further transitions are permitted.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Waived)
    }
}

impl FromStr for ExceptionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(Self::Open),
            "SUPPLIER_RESPONDED" => Ok(Self::SupplierResponded),
            "CARRIER_REVIEWING" => Ok(Self::CarrierReviewing),
            "RESOLVED" => Ok(Self::Resolved),
            "WAIVED" => Ok(Self::Waived),
            other => Err(UnknownVariant::new("exception_status", other)),
        }
    }
}

impl fmt::Display for ExceptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Carrier-chosen disposition of an exception.
///
/// # Invariants
/// - Variants are stable for serialization and store round-trips.
/// - `Denied` additionally transitions the owning line to DENIED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionAction {
    /// Supplier must re-upload a corrected invoice.
    Reupload,
    /// Exception waived.
    Waived,
    /// Contract rate held; payment reduced to the contracted amount.
    HeldContractRate,
    /// Line reclassified to a different taxonomy code.
    Reclassified,
    /// Supplier accepted the proposed reduction.
    AcceptedReduction,
    /// Line denied outright (carrier-final).
    Denied,
}

impl ResolutionAction {
    /// Returns the stable wire form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reupload => "REUPLOAD",
            Self::Waived => "WAIVED",
            Self::HeldContractRate => "HELD_CONTRACT_RATE",
            Self::Reclassified => "RECLASSIFIED",
            Self::AcceptedReduction => "ACCEPTED_REDUCTION",
            Self::Denied => "DENIED",
        }
    }
}

impl FromStr for ResolutionAction {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REUPLOAD" => Ok(Self::Reupload),
            "WAIVED" => Ok(Self::Waived),
            "HELD_CONTRACT_RATE" => Ok(Self::HeldContractRate),
            "RECLASSIFIED" => Ok(Self::Reclassified),
            "ACCEPTED_REDUCTION" => Ok(Self::AcceptedReduction),
            "DENIED" => Ok(Self::Denied),
            other => Err(UnknownVariant::new("resolution_action", other)),
        }
    }
}

impl fmt::Display for ResolutionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Findings
// ============================================================================

/// One validation finding, before persistence.
///
/// # Invariants
/// - At most one of `rate_card_id` / `guideline_id` is set, matching
///   `validation_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Which engine produced the finding.
    pub validation_type: ValidationType,
    /// Rate card that produced the finding, when rate-typed.
    pub rate_card_id: Option<RateCardId>,
    /// Guideline that produced the finding, when guideline-typed.
    pub guideline_id: Option<GuidelineId>,
    /// Check outcome.
    pub status: ValidationStatus,
    /// Finding severity.
    pub severity: ValidationSeverity,
    /// Plain-language explanation shown to both parties.
    pub message: String,
    /// Machine-readable expected value for UI rendering.
    pub expected_value: Option<String>,
    /// Machine-readable actual value for UI rendering.
    pub actual_value: Option<String>,
    /// Next step for the responsible party.
    pub required_action: RequiredAction,
}

// ============================================================================
// SECTION: Persisted Records
// ============================================================================

/// The result of one validation check against one line item.
///
/// # Invariants
/// - Immutable once written; reprocessing appends new rows, never rewrites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Result identifier.
    pub id: ValidationResultId,
    /// Owning line item.
    pub line_item_id: LineItemId,
    /// The finding that was recorded.
    pub finding: Finding,
}

/// An open item on a line requiring party action.
///
/// # Invariants
/// - References exactly one validation result whose status is FAIL or WARNING.
/// - Never deleted; only transitioned through [`ExceptionStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionRecord {
    /// Exception identifier.
    pub id: ExceptionId,
    /// Owning line item.
    pub line_item_id: LineItemId,
    /// Originating validation result.
    pub validation_result_id: ValidationResultId,
    /// Lifecycle state.
    pub status: ExceptionStatus,
    /// Supplier's textual response, if any.
    pub supplier_response: Option<String>,
    /// Pointer to an attached supporting document, if any.
    pub supporting_doc: Option<String>,
    /// Carrier's typed disposition, once resolved.
    pub resolution_action: Option<ResolutionAction>,
    /// Carrier's free-text resolution notes.
    pub resolution_notes: Option<String>,
    /// When the exception was resolved.
    pub resolved_at: Option<Timestamp>,
    /// Who resolved the exception.
    pub resolved_by: Option<ActorId>,
}
