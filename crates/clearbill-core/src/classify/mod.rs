// crates/clearbill-core/src/classify/mod.rs
// ============================================================================
// Module: Clearbill Classification
// Description: Layered classification of raw lines to taxonomy codes.
// Purpose: Resolve supplier descriptions and codes to canonical services.
// Dependencies: crate::core::{mapping, taxonomy}, serde
// ============================================================================

//! ## Overview
//! Classification resolves a raw description (and optional supplier billing
//! code) to a taxonomy code by consulting layered rule sources in strict
//! precedence: persisted supplier-specific mapping rules, persisted global
//! rules, built-in compiled rules, then `UNRECOGNIZED`. The first non-empty
//! source wins; within a source, candidates rank by confidence weight with
//! deterministic tie-breaking.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod engine;
pub mod rules;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::MappingRuleId;
use crate::core::mapping::ConfidenceLabel;
use crate::core::mapping::MatchType;
use crate::core::taxonomy::TaxonomyCode;

pub use engine::Classifier;
pub use engine::OverrideError;
pub use engine::OverridePlan;
pub use engine::OverrideRequest;
pub use engine::plan_override;

// ============================================================================
// SECTION: Confidence
// ============================================================================

/// Bucketed classification confidence, including the no-match outcome.
///
/// # Invariants
/// - Variants are stable for serialization and store round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    /// Weight at or above 0.85.
    High,
    /// Weight in [0.65, 0.85).
    Medium,
    /// Weight below 0.65.
    Low,
    /// No rule matched; weight 0.
    Unrecognized,
}

impl Confidence {
    /// Buckets a confidence weight into a label.
    #[must_use]
    pub fn from_weight(weight: f64) -> Self {
        if weight >= 0.85 {
            Self::High
        } else if weight >= 0.65 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Converts to the persisted label, mapping `Unrecognized` to `Low`.
    #[must_use]
    pub const fn label_or_low(self) -> ConfidenceLabel {
        match self {
            Self::High => ConfidenceLabel::High,
            Self::Medium => ConfidenceLabel::Medium,
            Self::Low | Self::Unrecognized => ConfidenceLabel::Low,
        }
    }

    /// Returns the stable wire form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
            Self::Unrecognized => "UNRECOGNIZED",
        }
    }
}

impl From<ConfidenceLabel> for Confidence {
    fn from(label: ConfidenceLabel) -> Self {
        match label {
            ConfidenceLabel::High => Self::High,
            ConfidenceLabel::Medium => Self::Medium,
            ConfidenceLabel::Low => Self::Low,
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Classification Result
// ============================================================================

/// Outcome of classifying a single raw line.
///
/// # Invariants
/// - `taxonomy_code` is `None` exactly when `confidence` is `Unrecognized`.
/// - `matched_rule_id` is set only for persisted-rule matches; built-in rules
///   carry no identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Assigned taxonomy code, when recognized.
    pub taxonomy_code: Option<TaxonomyCode>,
    /// Assigned billing component, when recognized.
    pub billing_component: Option<String>,
    /// Bucketed confidence.
    pub confidence: Confidence,
    /// Raw ranking weight in [0, 1]; 0 for no match.
    pub confidence_weight: f64,
    /// Match family that produced the result.
    pub match_type: Option<MatchType>,
    /// Persisted rule that matched, when DB-backed.
    pub matched_rule_id: Option<MappingRuleId>,
    /// Human-readable explanation for audit.
    pub match_explanation: String,
}

impl Classification {
    /// The no-match outcome for a given description.
    #[must_use]
    pub fn unrecognized(raw_description: &str) -> Self {
        Self {
            taxonomy_code: None,
            billing_component: None,
            confidence: Confidence::Unrecognized,
            confidence_weight: 0.0,
            match_type: None,
            matched_rule_id: None,
            match_explanation: format!("No rule matched description: {raw_description:?}"),
        }
    }

    /// Returns true when no rule matched.
    #[must_use]
    pub const fn is_unrecognized(&self) -> bool {
        matches!(self.confidence, Confidence::Unrecognized)
    }
}
