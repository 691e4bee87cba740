// crates/clearbill-core/src/core/mapping.rs
// ============================================================================
// Module: Clearbill Mapping Rules
// Description: Persisted classification rules with immutable versioning.
// Purpose: Model the pattern-to-taxonomy rules the classifier consults.
// Dependencies: crate::core::{identifiers, taxonomy, time, mod}, serde
// ============================================================================

//! ## Overview
//! A mapping rule translates a supplier's raw description or billing code into
//! a taxonomy code. Rules are never edited in place: a carrier override
//! expires the prior rule (`effective_to = now`) and inserts a successor whose
//! `supersedes_rule_id` points back at it, forming a backward-only chain that
//! preserves the full provenance of every mapping decision.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::core::UnknownVariant;
use crate::core::identifiers::MappingRuleId;
use crate::core::identifiers::SupplierId;
use crate::core::taxonomy::TaxonomyCode;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Closed Enumerations
// ============================================================================

/// How a mapping rule matches an input line.
///
/// # Invariants
/// - Variants are stable for serialization and store round-trips.
/// - Specificity order for tie-breaking: exact code, then regex, then keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Case-insensitive equality of the normalized raw code.
    ExactCode,
    /// Case-insensitive regex search on the lowercased description.
    RegexPattern,
    /// Every comma-separated keyword must occur in the description.
    KeywordSet,
}

impl MatchType {
    /// Returns the stable wire form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ExactCode => "exact_code",
            Self::RegexPattern => "regex_pattern",
            Self::KeywordSet => "keyword_set",
        }
    }

    /// Specificity rank used for deterministic tie-breaking (lower is more
    /// specific).
    #[must_use]
    pub const fn specificity(self) -> u8 {
        match self {
            Self::ExactCode => 0,
            Self::RegexPattern => 1,
            Self::KeywordSet => 2,
        }
    }
}

impl FromStr for MatchType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact_code" => Ok(Self::ExactCode),
            "regex_pattern" => Ok(Self::RegexPattern),
            "keyword_set" => Ok(Self::KeywordSet),
            other => Err(UnknownVariant::new("match_type", other)),
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance of a mapping rule.
///
/// # Invariants
/// - Variants are stable for serialization and store round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfirmedBy {
    /// Auto-generated by the platform.
    System,
    /// Carrier reviewed and accepted a system mapping.
    CarrierConfirmed,
    /// Carrier corrected a wrong system mapping.
    CarrierOverride,
}

impl ConfirmedBy {
    /// Returns the stable wire form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "SYSTEM",
            Self::CarrierConfirmed => "CARRIER_CONFIRMED",
            Self::CarrierOverride => "CARRIER_OVERRIDE",
        }
    }
}

impl FromStr for ConfirmedBy {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SYSTEM" => Ok(Self::System),
            "CARRIER_CONFIRMED" => Ok(Self::CarrierConfirmed),
            "CARRIER_OVERRIDE" => Ok(Self::CarrierOverride),
            other => Err(UnknownVariant::new("confirmed_by", other)),
        }
    }
}

impl fmt::Display for ConfirmedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bucketed classification confidence.
///
/// # Invariants
/// - Variants are stable for serialization and store round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLabel {
    /// Weight at or above 0.85.
    High,
    /// Weight in [0.65, 0.85).
    Medium,
    /// Weight below 0.65.
    Low,
}

impl ConfidenceLabel {
    /// Returns the stable wire form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }

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
}

impl FromStr for ConfidenceLabel {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HIGH" => Ok(Self::High),
            "MEDIUM" => Ok(Self::Medium),
            "LOW" => Ok(Self::Low),
            other => Err(UnknownVariant::new("confidence_label", other)),
        }
    }
}

impl fmt::Display for ConfidenceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Mapping Rule
// ============================================================================

/// A single persisted mapping rule: pattern to taxonomy code.
///
/// # Invariants
/// - `supplier_id = None` means global; set means supplier-specific (higher
///   precedence).
/// - `effective_to = None` means currently active; set when superseded.
/// - `supersedes_rule_id` forms a backward-only chain, never a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRule {
    /// Rule identifier.
    pub id: MappingRuleId,
    /// Supplier scope; `None` for global rules.
    pub supplier_id: Option<SupplierId>,
    /// How the rule matches.
    pub match_type: MatchType,
    /// Pattern text: a code for `exact_code`, a regex for `regex_pattern`, a
    /// comma-separated keyword bag for `keyword_set`.
    pub match_pattern: String,
    /// Taxonomy code assigned on match.
    pub taxonomy_code: TaxonomyCode,
    /// Billing component assigned on match.
    pub billing_component: String,
    /// Ranking weight in [0, 1]. Carrier-confirmed rules carry 1.0.
    pub confidence_weight: f64,
    /// Bucketed confidence label.
    pub confidence_label: ConfidenceLabel,
    /// Rule provenance.
    pub confirmed_by: ConfirmedBy,
    /// Version ordinal within the supersedes chain, starting at 1.
    pub version: i64,
    /// When the rule became effective.
    pub effective_from: Timestamp,
    /// When the rule was superseded; `None` while active.
    pub effective_to: Option<Timestamp>,
    /// Prior rule in the chain, when this rule overrides one.
    pub supersedes_rule_id: Option<MappingRuleId>,
}

impl MappingRule {
    /// Returns true when the rule is effective at the given instant.
    #[must_use]
    pub fn is_effective_at(&self, at: Timestamp) -> bool {
        self.effective_from <= at && self.effective_to.is_none_or(|until| at < until)
    }
}
