// crates/clearbill-core/src/classify/engine.rs
// ============================================================================
// Module: Clearbill Classification Engine
// Description: Layered rule resolution and the carrier override protocol.
// Purpose: Rank persisted rules above built-ins and version overrides safely.
// Dependencies: crate::classify, crate::core::{mapping, time}, regex, tracing
// ============================================================================

//! ## Overview
//! The engine is pure over a snapshot of currently-effective mapping rules:
//! the caller fetches supplier-specific and global rule sets, and the engine
//! resolves them in strict precedence before falling back to built-ins.
//! Carrier overrides never mutate a rule in place; they expire the active
//! rule and insert a successor linked through `supersedes_rule_id`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;
use std::collections::HashSet;

use regex::RegexBuilder;
use thiserror::Error;
use tracing::warn;

use crate::classify::Classification;
use crate::classify::Confidence;
use crate::classify::rules::classify_with_builtin_rules;
use crate::classify::rules::keywords_match;
use crate::core::identifiers::MappingRuleId;
use crate::core::identifiers::SupplierId;
use crate::core::mapping::ConfidenceLabel;
use crate::core::mapping::ConfirmedBy;
use crate::core::mapping::MappingRule;
use crate::core::mapping::MatchType;
use crate::core::taxonomy::TaxonomyCode;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Classifier
// ============================================================================

/// Layered classifier over a rule snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct Classifier;

impl Classifier {
    /// Classifies a raw line.
    ///
    /// Resolution order is strict: supplier-specific persisted rules, then
    /// global persisted rules, then built-in rules, then `UNRECOGNIZED`. The
    /// best match within the earliest non-empty source wins. Never fails; a
    /// total miss returns the unrecognized outcome.
    #[must_use]
    pub fn classify(
        &self,
        raw_description: &str,
        raw_code: Option<&str>,
        supplier_rules: &[MappingRule],
        global_rules: &[MappingRule],
        now: Timestamp,
    ) -> Classification {
        let desc_lower = raw_description.trim().to_lowercase();
        let code_lower = raw_code.map(|code| code.trim().to_lowercase());

        for source in [supplier_rules, global_rules] {
            if let Some(classification) =
                best_match(source, &desc_lower, code_lower.as_deref(), now)
            {
                return classification;
            }
        }

        classify_with_builtin_rules(raw_description)
    }
}

/// Finds the best-ranked matching rule within a single source.
fn best_match(
    rules: &[MappingRule],
    desc_lower: &str,
    code_lower: Option<&str>,
    now: Timestamp,
) -> Option<Classification> {
    let mut best: Option<(&MappingRule, String)> = None;

    for rule in rules {
        if !rule.is_effective_at(now) {
            continue;
        }
        let Some(explanation) = rule_matches(rule, desc_lower, code_lower) else {
            continue;
        };
        let replace = match &best {
            None => true,
            Some((current, _)) => ranks_above(rule, current),
        };
        if replace {
            best = Some((rule, explanation));
        }
    }

    best.map(|(rule, explanation)| Classification {
        taxonomy_code: Some(rule.taxonomy_code.clone()),
        billing_component: Some(rule.billing_component.clone()),
        confidence: Confidence::from(rule.confidence_label),
        confidence_weight: rule.confidence_weight,
        match_type: Some(rule.match_type),
        matched_rule_id: Some(rule.id),
        match_explanation: explanation,
    })
}

/// Deterministic ranking: weight descending, then match-type specificity,
/// then rule identifier ordering.
fn ranks_above(candidate: &MappingRule, current: &MappingRule) -> bool {
    match candidate.confidence_weight.total_cmp(&current.confidence_weight) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => {
            match candidate.match_type.specificity().cmp(&current.match_type.specificity()) {
                Ordering::Less => true,
                Ordering::Greater => false,
                Ordering::Equal => candidate.id < current.id,
            }
        }
    }
}

/// Tests one rule against the normalized description and code.
///
/// Returns a human-readable match explanation on success. Invalid regex
/// patterns are skipped with a warning and never crash classification.
fn rule_matches(rule: &MappingRule, desc_lower: &str, code_lower: Option<&str>) -> Option<String> {
    let pattern = rule.match_pattern.trim().to_lowercase();
    match rule.match_type {
        MatchType::ExactCode => {
            let code = code_lower?;
            if !code.is_empty() && code == pattern {
                Some(format!("Exact code match: {:?}", rule.match_pattern))
            } else {
                None
            }
        }
        MatchType::RegexPattern => {
            match RegexBuilder::new(&pattern).case_insensitive(true).build() {
                Ok(regex) if regex.is_match(desc_lower) => {
                    Some(format!("Regex match: {:?}", rule.match_pattern))
                }
                Ok(_) => None,
                Err(err) => {
                    warn!(rule_id = %rule.id, pattern = %rule.match_pattern, error = %err,
                        "invalid regex in mapping rule; skipping");
                    None
                }
            }
        }
        MatchType::KeywordSet => {
            let keywords: Vec<String> = pattern
                .split(',')
                .map(|kw| kw.trim().to_owned())
                .filter(|kw| !kw.is_empty())
                .collect();
            if !keywords.is_empty() && keywords_match(&keywords, desc_lower) {
                Some(format!("Keyword set match: {:?}", rule.match_pattern))
            } else {
                None
            }
        }
    }
}

// ============================================================================
// SECTION: Override Protocol
// ============================================================================

/// Carrier request to override a mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideRequest {
    /// Supplier scope; `None` for a global rule.
    pub supplier_id: Option<SupplierId>,
    /// Match family for the overriding rule.
    pub match_type: MatchType,
    /// Pattern for the overriding rule.
    pub match_pattern: String,
    /// Corrected taxonomy code.
    pub taxonomy_code: TaxonomyCode,
    /// Corrected billing component.
    pub billing_component: String,
}

/// Planned effect of an override: expire the prior rule, insert the new one.
///
/// # Invariants
/// - `expire_rule_id` is the chain predecessor of `new_rule`, when present.
#[derive(Debug, Clone, PartialEq)]
pub struct OverridePlan {
    /// Active rule to expire (`effective_to = now`), if one matched.
    pub expire_rule_id: Option<MappingRuleId>,
    /// Replacement rule to insert.
    pub new_rule: MappingRule,
}

/// Override planning failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OverrideError {
    /// The supersedes chain of the prior rule revisits a rule.
    #[error("mapping rule chain starting at {0} is cyclic")]
    CyclicChain(MappingRuleId),
}

/// Plans a carrier override of the active rule for a `(supplier, pattern,
/// match_type)` slot.
///
/// The prior rule's supersedes chain is walked defensively; a well-behaved
/// producer never creates a cycle, but a cyclic chain is rejected rather than
/// looped over.
///
/// # Errors
///
/// Returns [`OverrideError::CyclicChain`] when the prior chain is cyclic.
pub fn plan_override(
    request: OverrideRequest,
    prior: Option<&MappingRule>,
    lookup: impl Fn(MappingRuleId) -> Option<MappingRule>,
    now: Timestamp,
) -> Result<OverridePlan, OverrideError> {
    if let Some(prior) = prior {
        verify_acyclic(prior, &lookup)?;
    }

    let new_rule = MappingRule {
        id: MappingRuleId::generate(),
        supplier_id: request.supplier_id,
        match_type: request.match_type,
        match_pattern: request.match_pattern,
        taxonomy_code: request.taxonomy_code,
        billing_component: request.billing_component,
        confidence_weight: 1.0,
        confidence_label: ConfidenceLabel::High,
        confirmed_by: ConfirmedBy::CarrierOverride,
        version: prior.map_or(1, |rule| rule.version + 1),
        effective_from: now,
        effective_to: None,
        supersedes_rule_id: prior.map(|rule| rule.id),
    };

    Ok(OverridePlan {
        expire_rule_id: prior.map(|rule| rule.id),
        new_rule,
    })
}

/// Walks the supersedes chain from `start`, rejecting revisits.
fn verify_acyclic(
    start: &MappingRule,
    lookup: &impl Fn(MappingRuleId) -> Option<MappingRule>,
) -> Result<(), OverrideError> {
    let mut visited: HashSet<MappingRuleId> = HashSet::new();
    visited.insert(start.id);
    let mut next = start.supersedes_rule_id;
    while let Some(id) = next {
        if !visited.insert(id) {
            return Err(OverrideError::CyclicChain(start.id));
        }
        next = lookup(id).and_then(|rule| rule.supersedes_rule_id);
    }
    Ok(())
}
