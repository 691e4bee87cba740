// crates/clearbill-core/src/classify/rules.rs
// ============================================================================
// Module: Clearbill Built-in Classification Rules
// Description: Compiled baseline rule set shipped with the platform.
// Purpose: Supply bootstrap classification coverage across all domains.
// Dependencies: crate::classify, crate::core::mapping, regex, tracing
// ============================================================================

//! ## Overview
//! Built-in rules are the bottom layer of the classification stack: persisted
//! mapping rules always take precedence. Each entry pairs a match pattern with
//! a taxonomy code and a ranking weight. Regex patterns compile once, at first
//! use; an entry whose pattern fails to compile is skipped with a warning and
//! never crashes classification.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::OnceLock;

use regex::Regex;
use regex::RegexBuilder;
use tracing::warn;

use crate::classify::Classification;
use crate::classify::Confidence;
use crate::core::mapping::MatchType;
use crate::core::taxonomy::TaxonomyCode;

// ============================================================================
// SECTION: Rule Table
// ============================================================================

/// One built-in rule: `(match_type, pattern, taxonomy_code, component, weight)`.
type BuiltinRule = (MatchType, &'static str, &'static str, &'static str, f64);

/// Baseline rule set. Deliberately lower-weight generic travel/mileage rules
/// sit at the bottom so domain-specific rules win ties.
const BUILTIN_RULES: &[BuiltinRule] = &[
    // IME
    (MatchType::KeywordSet, "ime,physician,exam", "IME.PHY_EXAM.PROF_FEE", "PROF_FEE", 0.75),
    (
        MatchType::KeywordSet,
        "independent medical examination",
        "IME.PHY_EXAM.PROF_FEE",
        "PROF_FEE",
        0.80,
    ),
    (MatchType::KeywordSet, "ime,examination", "IME.PHY_EXAM.PROF_FEE", "PROF_FEE", 0.72),
    (MatchType::RegexPattern, r"\bime\b.*\bexam", "IME.PHY_EXAM.PROF_FEE", "PROF_FEE", 0.78),
    (
        MatchType::RegexPattern,
        r"\bindependent medical\b",
        "IME.PHY_EXAM.PROF_FEE",
        "PROF_FEE",
        0.80,
    ),
    (
        MatchType::KeywordSet,
        "multi.specialty,panel,ime",
        "IME.MULTI_SPECIALTY.PROF_FEE",
        "PROF_FEE",
        0.80,
    ),
    (
        MatchType::KeywordSet,
        "multi-specialty,ime",
        "IME.MULTI_SPECIALTY.PROF_FEE",
        "PROF_FEE",
        0.80,
    ),
    (
        MatchType::KeywordSet,
        "records review,no exam",
        "IME.RECORDS_REVIEW.PROF_FEE",
        "PROF_FEE",
        0.85,
    ),
    (
        MatchType::KeywordSet,
        "file review,no exam",
        "IME.RECORDS_REVIEW.PROF_FEE",
        "PROF_FEE",
        0.82,
    ),
    (
        MatchType::RegexPattern,
        r"records?\s+review.*no.?exam",
        "IME.RECORDS_REVIEW.PROF_FEE",
        "PROF_FEE",
        0.85,
    ),
    (MatchType::KeywordSet, "addendum,report", "IME.ADDENDUM.PROF_FEE", "PROF_FEE", 0.85),
    (MatchType::RegexPattern, r"\baddendum\b", "IME.ADDENDUM.PROF_FEE", "PROF_FEE", 0.82),
    (MatchType::KeywordSet, "peer review", "IME.PEER_REVIEW.PROF_FEE", "PROF_FEE", 0.88),
    (MatchType::RegexPattern, r"\bpeer.?review\b", "IME.PEER_REVIEW.PROF_FEE", "PROF_FEE", 0.88),
    (
        MatchType::KeywordSet,
        "cancellation,fee",
        "IME.CANCELLATION.CANCEL_FEE",
        "CANCEL_FEE",
        0.90,
    ),
    (MatchType::RegexPattern, r"\bcancel", "IME.CANCELLATION.CANCEL_FEE", "CANCEL_FEE", 0.85),
    (MatchType::KeywordSet, "no.show,fee", "IME.NO_SHOW.NO_SHOW_FEE", "NO_SHOW_FEE", 0.92),
    (MatchType::RegexPattern, r"no.?show", "IME.NO_SHOW.NO_SHOW_FEE", "NO_SHOW_FEE", 0.90),
    (MatchType::KeywordSet, "scheduling,fee", "IME.ADMIN.SCHEDULING_FEE", "SCHEDULING_FEE", 0.80),
    (
        MatchType::KeywordSet,
        "admin,scheduling",
        "IME.ADMIN.SCHEDULING_FEE",
        "SCHEDULING_FEE",
        0.78,
    ),
    // ENG
    (
        MatchType::KeywordSet,
        "property,inspection,engineer",
        "ENG.PROPERTY_INSPECT.PROF_FEE",
        "PROF_FEE",
        0.82,
    ),
    (MatchType::KeywordSet, "cause,origin", "ENG.CAUSE_ORIGIN.PROF_FEE", "PROF_FEE", 0.90),
    (
        MatchType::RegexPattern,
        r"cause\s+(&|and)\s+origin",
        "ENG.CAUSE_ORIGIN.PROF_FEE",
        "PROF_FEE",
        0.92,
    ),
    (
        MatchType::KeywordSet,
        "structural,assessment",
        "ENG.STRUCTURAL_ASSESS.PROF_FEE",
        "PROF_FEE",
        0.88,
    ),
    (
        MatchType::KeywordSet,
        "expert,report,engineer",
        "ENG.EXPERT_REPORT.PROF_FEE",
        "PROF_FEE",
        0.80,
    ),
    (
        MatchType::KeywordSet,
        "testimony,deposition",
        "ENG.TESTIMONY_DEPO.PROF_FEE",
        "PROF_FEE",
        0.88,
    ),
    (
        MatchType::KeywordSet,
        "supplemental,inspection",
        "ENG.SUPPLEMENTAL_INSPECT.PROF_FEE",
        "PROF_FEE",
        0.82,
    ),
    // IA
    (MatchType::KeywordSet, "field,adjust", "IA.FIELD_ASSIGN.PROF_FEE", "PROF_FEE", 0.82),
    (
        MatchType::KeywordSet,
        "field adjusting,daily rate",
        "IA.FIELD_ASSIGN.PROF_FEE",
        "PROF_FEE",
        0.88,
    ),
    (
        MatchType::KeywordSet,
        "desk,assignment,adjust",
        "IA.DESK_ASSIGN.PROF_FEE",
        "PROF_FEE",
        0.82,
    ),
    (MatchType::KeywordSet, "desk assignment", "IA.DESK_ASSIGN.PROF_FEE", "PROF_FEE", 0.82),
    (MatchType::KeywordSet, "desk,adjust", "IA.DESK_ASSIGN.PROF_FEE", "PROF_FEE", 0.80),
    (MatchType::KeywordSet, "catastrophe,assignment", "IA.CAT_ASSIGN.PROF_FEE", "PROF_FEE", 0.88),
    (
        MatchType::RegexPattern,
        r"\bcat\s+(assign|deployment|daily)\b",
        "IA.CAT_ASSIGN.PROF_FEE",
        "PROF_FEE",
        0.85,
    ),
    (MatchType::KeywordSet, "photo,documentation", "IA.PHOTO_DOC.PROF_FEE", "PROF_FEE", 0.88),
    (
        MatchType::KeywordSet,
        "supplement,handling",
        "IA.SUPPLEMENT_HANDLING.PROF_FEE",
        "PROF_FEE",
        0.88,
    ),
    (MatchType::KeywordSet, "file,open,fee", "IA.ADMIN.FILE_OPEN_FEE", "FILE_OPEN_FEE", 0.90),
    // INV
    (MatchType::KeywordSet, "surveillance", "INV.SURVEILLANCE.PROF_FEE", "PROF_FEE", 0.92),
    (MatchType::KeywordSet, "recorded,statement", "INV.STATEMENT.PROF_FEE", "PROF_FEE", 0.90),
    (
        MatchType::KeywordSet,
        "background,asset",
        "INV.BACKGROUND_ASSET.PROF_FEE",
        "PROF_FEE",
        0.85,
    ),
    (MatchType::KeywordSet, "aoe,coe", "INV.AOE_COE.PROF_FEE", "PROF_FEE", 0.92),
    (MatchType::RegexPattern, r"aoe\s*/?\s*coe", "INV.AOE_COE.PROF_FEE", "PROF_FEE", 0.92),
    (MatchType::KeywordSet, "skip,trace", "INV.SKIP_TRACE.PROF_FEE", "PROF_FEE", 0.92),
    // REC
    (
        MatchType::KeywordSet,
        "medical,records,retrieval",
        "REC.MED_RECORDS.RETRIEVAL_FEE",
        "RETRIEVAL_FEE",
        0.88,
    ),
    (
        MatchType::KeywordSet,
        "medical records,request",
        "REC.MED_RECORDS.RETRIEVAL_FEE",
        "RETRIEVAL_FEE",
        0.85,
    ),
    (
        MatchType::KeywordSet,
        "copy,per page,records",
        "REC.MED_RECORDS.COPY_REPRO",
        "COPY_REPRO",
        0.82,
    ),
    (MatchType::KeywordSet, "rush,records", "REC.MED_RECORDS.RUSH_PREMIUM", "RUSH_PREMIUM", 0.85),
    (
        MatchType::KeywordSet,
        "certified,copy",
        "REC.MED_RECORDS.CERT_COPY_FEE",
        "CERT_COPY_FEE",
        0.85,
    ),
    (
        MatchType::KeywordSet,
        "employment,records",
        "REC.EMPLOYMENT_RECORDS.RETRIEVAL_FEE",
        "RETRIEVAL_FEE",
        0.88,
    ),
    (
        MatchType::KeywordSet,
        "court,records",
        "REC.LEGAL_RECORDS.RETRIEVAL_FEE",
        "RETRIEVAL_FEE",
        0.85,
    ),
    (
        MatchType::KeywordSet,
        "police,report",
        "REC.LEGAL_RECORDS.RETRIEVAL_FEE",
        "RETRIEVAL_FEE",
        0.82,
    ),
    // Cross-domain travel/mileage fallbacks; lower weight so domain-specific
    // rules take priority.
    (MatchType::RegexPattern, r"\bmileage\b", "IME.PHY_EXAM.MILEAGE", "MILEAGE", 0.60),
    (MatchType::RegexPattern, r"\bmiles?\b", "IME.PHY_EXAM.MILEAGE", "MILEAGE", 0.55),
    (
        MatchType::KeywordSet,
        "airfare",
        "IME.PHY_EXAM.TRAVEL_TRANSPORT",
        "TRAVEL_TRANSPORT",
        0.65,
    ),
    (MatchType::KeywordSet, "lodging", "IME.PHY_EXAM.TRAVEL_LODGING", "TRAVEL_LODGING", 0.60),
    (MatchType::KeywordSet, "hotel", "IME.PHY_EXAM.TRAVEL_LODGING", "TRAVEL_LODGING", 0.58),
    (MatchType::KeywordSet, "meals,per diem", "IME.PHY_EXAM.TRAVEL_MEALS", "TRAVEL_MEALS", 0.65),
    (
        MatchType::KeywordSet,
        "pass.through",
        "XDOMAIN.PASS_THROUGH.THIRD_PARTY_COST",
        "THIRD_PARTY_COST",
        0.70,
    ),
];

// ============================================================================
// SECTION: Compiled Cache
// ============================================================================

/// A built-in rule with its matcher compiled.
struct CompiledRule {
    /// Match family.
    match_type: MatchType,
    /// Original pattern text, kept for explanations.
    pattern: &'static str,
    /// Compiled matcher.
    matcher: CompiledMatcher,
    /// Taxonomy code assigned on match.
    taxonomy_code: &'static str,
    /// Billing component assigned on match.
    billing_component: &'static str,
    /// Ranking weight.
    weight: f64,
}

/// Compiled matcher variants.
enum CompiledMatcher {
    /// Case-insensitive compiled regex.
    Regex(Regex),
    /// Lowercased keyword bag; every keyword must occur.
    Keywords(Vec<String>),
}

/// Process-global compiled rule cache.
static COMPILED_RULES: OnceLock<Vec<CompiledRule>> = OnceLock::new();

/// Compiles the built-in rule table, skipping invalid regex entries.
fn compile_rules() -> Vec<CompiledRule> {
    let mut compiled = Vec::with_capacity(BUILTIN_RULES.len());
    for &(match_type, pattern, taxonomy_code, billing_component, weight) in BUILTIN_RULES {
        let matcher = match match_type {
            MatchType::RegexPattern => {
                match RegexBuilder::new(pattern).case_insensitive(true).build() {
                    Ok(regex) => CompiledMatcher::Regex(regex),
                    Err(err) => {
                        warn!(pattern, error = %err, "invalid regex in built-in rules; skipping");
                        continue;
                    }
                }
            }
            MatchType::KeywordSet => CompiledMatcher::Keywords(
                pattern
                    .split([',', '|'])
                    .map(|kw| kw.trim().to_lowercase())
                    .filter(|kw| !kw.is_empty())
                    .collect(),
            ),
            // The built-in table carries no exact-code entries; persisted
            // rules cover code-based matching.
            MatchType::ExactCode => continue,
        };
        compiled.push(CompiledRule {
            match_type,
            pattern,
            matcher,
            taxonomy_code,
            billing_component,
            weight,
        });
    }
    compiled
}

/// Returns the compiled rule cache, building it on first use.
fn compiled_rules() -> &'static [CompiledRule] {
    COMPILED_RULES.get_or_init(compile_rules)
}

// ============================================================================
// SECTION: Keyword Semantics
// ============================================================================

/// Returns true when every keyword occurs in the lowercased description.
///
/// A keyword also counts as present when its hyphen/period-stripped form
/// occurs, so tokens like `multi-specialty` and `multi.specialty` match
/// descriptions written either way.
#[must_use]
pub fn keywords_match(keywords: &[String], desc_lower: &str) -> bool {
    keywords.iter().all(|kw| {
        if desc_lower.contains(kw.as_str()) {
            return true;
        }
        let collapsed: String = kw.chars().filter(|c| !matches!(c, '-' | '.')).collect();
        desc_lower.contains(collapsed.as_str())
    })
}

// ============================================================================
// SECTION: Built-in Classification
// ============================================================================

/// Classifies using built-in rules only; the fallback when no persisted rule
/// matches. Returns the unrecognized outcome when nothing matches.
#[must_use]
pub fn classify_with_builtin_rules(raw_description: &str) -> Classification {
    let desc_lower = raw_description.trim().to_lowercase();

    let mut best: Option<&CompiledRule> = None;
    for rule in compiled_rules() {
        let matched = match &rule.matcher {
            CompiledMatcher::Regex(regex) => regex.is_match(&desc_lower),
            CompiledMatcher::Keywords(keywords) => keywords_match(keywords, &desc_lower),
        };
        if matched && best.is_none_or(|current| rule.weight > current.weight) {
            best = Some(rule);
        }
    }

    let Some(rule) = best else {
        return Classification::unrecognized(raw_description);
    };

    let explanation = match rule.match_type {
        MatchType::RegexPattern => format!("Regex match: {:?}", rule.pattern),
        _ => format!("Keyword match: {:?}", rule.pattern),
    };

    Classification {
        taxonomy_code: Some(TaxonomyCode::new(rule.taxonomy_code)),
        billing_component: Some(rule.billing_component.to_owned()),
        confidence: Confidence::from_weight(rule.weight),
        confidence_weight: rule.weight,
        match_type: Some(rule.match_type),
        matched_rule_id: None,
        match_explanation: explanation,
    }
}
