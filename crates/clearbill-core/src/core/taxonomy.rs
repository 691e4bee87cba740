// crates/clearbill-core/src/core/taxonomy.rs
// ============================================================================
// Module: Clearbill Taxonomy Registry
// Description: Canonical service taxonomy codes and O(1) metadata lookup.
// Purpose: Provide the ground-truth service classification vocabulary.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Every billed line is classified to a taxonomy code of the form
//! `DOMAIN.SERVICE_ITEM.COMPONENT` (for example `IME.PHY_EXAM.PROF_FEE`).
//! The canonical code list ships with the platform; persisted taxonomy tables
//! are an idempotent projection of this list. The registry is read-mostly and
//! loaded once per process; hosts that apply administrative updates rebuild a
//! registry from their persisted items and swap it in.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Taxonomy Code
// ============================================================================

/// Stable natural key for a taxonomy entry.
///
/// # Invariants
/// - Format is `DOMAIN.SERVICE_ITEM.COMPONENT` (three dot-separated segments).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxonomyCode(String);

impl TaxonomyCode {
    /// Creates a taxonomy code from its wire form without validation.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the domain segment (text before the first dot).
    #[must_use]
    pub fn domain(&self) -> &str {
        self.0.split('.').next().unwrap_or(&self.0)
    }

    /// Returns true when the code has the canonical three-segment shape.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        let segments: Vec<&str> = self.0.split('.').collect();
        segments.len() == 3 && segments.iter().all(|s| !s.is_empty())
    }
}

impl fmt::Display for TaxonomyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TaxonomyCode {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TaxonomyCode {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Unit Model
// ============================================================================

/// How a taxonomy entry is quantified for billing.
///
/// # Invariants
/// - Variants are stable for serialization and store round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitModel {
    /// One unit per written report.
    PerReport,
    /// Actual pass-through cost (receipts).
    Actual,
    /// One unit per night of lodging.
    PerNight,
    /// Per-diem day rate.
    PerDiem,
    /// One unit per mile driven.
    PerMile,
    /// One unit per claim file.
    PerFile,
    /// Hourly billing.
    PerHour,
    /// One unit per discrete occurrence.
    PerOccurrence,
    /// One unit per records request.
    PerRequest,
    /// One unit per reproduced page.
    PerPage,
    /// Single flat fee regardless of quantity.
    FlatFee,
}

// ============================================================================
// SECTION: Taxonomy Item
// ============================================================================

/// Metadata for a single taxonomy entry.
///
/// # Invariants
/// - `code` is the natural key; `domain`, `service_item`, and
///   `billing_component` are its decomposed segments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyItem {
    /// Natural key, `DOMAIN.SERVICE_ITEM.COMPONENT`.
    pub code: TaxonomyCode,
    /// Service domain segment (e.g. `IME`).
    pub domain: String,
    /// Service item segment (e.g. `PHY_EXAM`).
    pub service_item: String,
    /// Billing component segment (e.g. `PROF_FEE`).
    pub billing_component: String,
    /// Unit model for quantities billed against this code.
    pub unit_model: UnitModel,
    /// Short human-readable label.
    pub label: String,
    /// Longer description shown in review tooling.
    pub description: String,
    /// Whether the entry is active for new classifications.
    pub active: bool,
}

/// One row of the canonical seed table.
struct TaxonomySeed {
    /// Natural key.
    code: &'static str,
    /// Unit model.
    unit_model: UnitModel,
    /// Short label.
    label: &'static str,
    /// Description.
    description: &'static str,
}

/// Canonical taxonomy definitions, the source of truth for seeding.
///
/// Domains: IME (independent medical examination), ENG (engineering and
/// forensic services), IA (independent adjusting), INV (investigation and
/// surveillance), REC (record retrieval), XDOMAIN (cross-domain pass-through
/// and miscellaneous admin).
const CANONICAL_TAXONOMY: &[TaxonomySeed] = &[
    // IME
    TaxonomySeed {
        code: "IME.PHY_EXAM.PROF_FEE",
        unit_model: UnitModel::PerReport,
        label: "IME Physician Examination - Professional Fee",
        description: "Fee for a single-specialty independent medical examination by a physician. Includes examination, medical records review, and written report.",
    },
    TaxonomySeed {
        code: "IME.PHY_EXAM.TRAVEL_TRANSPORT",
        unit_model: UnitModel::Actual,
        label: "IME Physician Examination - Transportation",
        description: "Actual transportation cost (airfare, train, taxi) for physician travel.",
    },
    TaxonomySeed {
        code: "IME.PHY_EXAM.TRAVEL_LODGING",
        unit_model: UnitModel::PerNight,
        label: "IME Physician Examination - Lodging",
        description: "Hotel/lodging for physician overnight travel.",
    },
    TaxonomySeed {
        code: "IME.PHY_EXAM.TRAVEL_MEALS",
        unit_model: UnitModel::PerDiem,
        label: "IME Physician Examination - Meals & Per Diem",
        description: "Meal per diem for physician travel days.",
    },
    TaxonomySeed {
        code: "IME.PHY_EXAM.MILEAGE",
        unit_model: UnitModel::PerMile,
        label: "IME Physician Examination - Mileage",
        description: "Mileage reimbursement for physician driving to examination location.",
    },
    TaxonomySeed {
        code: "IME.MULTI_SPECIALTY.PROF_FEE",
        unit_model: UnitModel::PerReport,
        label: "IME Multi-Specialty Panel - Professional Fee",
        description: "Fee for IME involving two or more specialty physicians in one session.",
    },
    TaxonomySeed {
        code: "IME.RECORDS_REVIEW.PROF_FEE",
        unit_model: UnitModel::PerReport,
        label: "IME Records Review (No Exam) - Professional Fee",
        description: "Physician review of medical records without a physical examination.",
    },
    TaxonomySeed {
        code: "IME.ADDENDUM.PROF_FEE",
        unit_model: UnitModel::PerReport,
        label: "IME Addendum Report - Professional Fee",
        description: "Supplemental report responding to additional records or questions after initial IME.",
    },
    TaxonomySeed {
        code: "IME.PEER_REVIEW.PROF_FEE",
        unit_model: UnitModel::PerReport,
        label: "IME Peer Review - Professional Fee",
        description: "Physician review of another provider's treatment plan or records.",
    },
    TaxonomySeed {
        code: "IME.CANCELLATION.CANCEL_FEE",
        unit_model: UnitModel::FlatFee,
        label: "IME Cancellation Fee",
        description: "Fee charged when an IME is cancelled within the contract-specified notice window.",
    },
    TaxonomySeed {
        code: "IME.NO_SHOW.NO_SHOW_FEE",
        unit_model: UnitModel::FlatFee,
        label: "IME No-Show Fee",
        description: "Fee charged when the claimant fails to appear for a scheduled IME.",
    },
    TaxonomySeed {
        code: "IME.ADMIN.SCHEDULING_FEE",
        unit_model: UnitModel::FlatFee,
        label: "IME Administrative / Scheduling Fee",
        description: "Administrative fee for IME scheduling and coordination services.",
    },
    // ENG
    TaxonomySeed {
        code: "ENG.PROPERTY_INSPECT.PROF_FEE",
        unit_model: UnitModel::PerFile,
        label: "Engineering Property Inspection - Professional Fee",
        description: "On-site property inspection by a licensed engineer or inspector.",
    },
    TaxonomySeed {
        code: "ENG.PROPERTY_INSPECT.TRAVEL_TRANSPORT",
        unit_model: UnitModel::Actual,
        label: "Engineering Property Inspection - Transportation",
        description: "Actual transportation cost for engineer travel to inspection site.",
    },
    TaxonomySeed {
        code: "ENG.PROPERTY_INSPECT.MILEAGE",
        unit_model: UnitModel::PerMile,
        label: "Engineering Property Inspection - Mileage",
        description: "Mileage reimbursement for engineer driving to inspection site.",
    },
    TaxonomySeed {
        code: "ENG.CAUSE_ORIGIN.PROF_FEE",
        unit_model: UnitModel::PerFile,
        label: "Engineering Cause & Origin Investigation - Professional Fee",
        description: "Investigation to determine the cause and origin of loss (fire, water, mechanical failure, etc.).",
    },
    TaxonomySeed {
        code: "ENG.STRUCTURAL_ASSESS.PROF_FEE",
        unit_model: UnitModel::PerFile,
        label: "Engineering Structural Assessment - Professional Fee",
        description: "Assessment of structural integrity, damage, or construction defect.",
    },
    TaxonomySeed {
        code: "ENG.EXPERT_REPORT.PROF_FEE",
        unit_model: UnitModel::PerReport,
        label: "Engineering Expert Report - Professional Fee",
        description: "Formal written expert report for litigation or claim resolution.",
    },
    TaxonomySeed {
        code: "ENG.FILE_REVIEW.PROF_FEE",
        unit_model: UnitModel::PerHour,
        label: "Engineering File Review - Professional Fee",
        description: "Hourly fee for engineer review of documents, photos, or records without site visit.",
    },
    TaxonomySeed {
        code: "ENG.SUPPLEMENTAL_INSPECT.PROF_FEE",
        unit_model: UnitModel::PerFile,
        label: "Engineering Supplemental Inspection - Professional Fee",
        description: "Follow-up inspection after initial report (re-inspection, supplement, or reinspection).",
    },
    TaxonomySeed {
        code: "ENG.TESTIMONY_DEPO.PROF_FEE",
        unit_model: UnitModel::PerHour,
        label: "Engineering Expert Testimony / Deposition - Professional Fee",
        description: "Hourly fee for deposition or trial testimony by engineering expert.",
    },
    // IA
    TaxonomySeed {
        code: "IA.FIELD_ASSIGN.PROF_FEE",
        unit_model: UnitModel::PerDiem,
        label: "Independent Adjusting Field Assignment - Professional Fee",
        description: "Per-diem or hourly fee for field adjusting services (on-site claim handling).",
    },
    TaxonomySeed {
        code: "IA.FIELD_ASSIGN.TRAVEL_TRANSPORT",
        unit_model: UnitModel::Actual,
        label: "Independent Adjusting Field Assignment - Transportation",
        description: "Actual transportation costs for field adjuster travel.",
    },
    TaxonomySeed {
        code: "IA.FIELD_ASSIGN.MILEAGE",
        unit_model: UnitModel::PerMile,
        label: "Independent Adjusting Field Assignment - Mileage",
        description: "Mileage reimbursement for field adjuster.",
    },
    TaxonomySeed {
        code: "IA.FIELD_ASSIGN.TRAVEL_LODGING",
        unit_model: UnitModel::PerNight,
        label: "Independent Adjusting Field Assignment - Lodging",
        description: "Hotel/lodging for field adjuster overnight assignments.",
    },
    TaxonomySeed {
        code: "IA.FIELD_ASSIGN.TRAVEL_MEALS",
        unit_model: UnitModel::PerDiem,
        label: "Independent Adjusting Field Assignment - Meals & Per Diem",
        description: "Meal per diem for field adjuster travel days.",
    },
    TaxonomySeed {
        code: "IA.DESK_ASSIGN.PROF_FEE",
        unit_model: UnitModel::PerFile,
        label: "Independent Adjusting Desk Assignment - Professional Fee",
        description: "Per-file or hourly fee for desk/virtual claim handling without site visit.",
    },
    TaxonomySeed {
        code: "IA.CAT_ASSIGN.PROF_FEE",
        unit_model: UnitModel::PerDiem,
        label: "Independent Adjusting Catastrophe Assignment - Professional Fee",
        description: "Per-diem fee for catastrophe (CAT) deployment adjusting services.",
    },
    TaxonomySeed {
        code: "IA.PHOTO_DOC.PROF_FEE",
        unit_model: UnitModel::PerFile,
        label: "Independent Adjusting Photo & Documentation Services - Professional Fee",
        description: "Fee for photographic documentation and scene documentation services.",
    },
    TaxonomySeed {
        code: "IA.SUPPLEMENT_HANDLING.PROF_FEE",
        unit_model: UnitModel::PerOccurrence,
        label: "Independent Adjusting Supplement Handling - Professional Fee",
        description: "Fee for handling repair estimate supplements.",
    },
    TaxonomySeed {
        code: "IA.ADMIN.FILE_OPEN_FEE",
        unit_model: UnitModel::FlatFee,
        label: "Independent Adjusting Administrative / File Open Fee",
        description: "One-time administrative fee for opening and setting up a new claim file.",
    },
    // INV
    TaxonomySeed {
        code: "INV.SURVEILLANCE.PROF_FEE",
        unit_model: UnitModel::PerHour,
        label: "Investigation Surveillance - Professional Fee",
        description: "Hourly fee for claimant surveillance services.",
    },
    TaxonomySeed {
        code: "INV.SURVEILLANCE.TRAVEL_TRANSPORT",
        unit_model: UnitModel::Actual,
        label: "Investigation Surveillance - Transportation",
        description: "Actual transportation costs for surveillance investigators.",
    },
    TaxonomySeed {
        code: "INV.SURVEILLANCE.MILEAGE",
        unit_model: UnitModel::PerMile,
        label: "Investigation Surveillance - Mileage",
        description: "Mileage for surveillance investigators.",
    },
    TaxonomySeed {
        code: "INV.STATEMENT.PROF_FEE",
        unit_model: UnitModel::PerOccurrence,
        label: "Investigation Recorded Statement - Professional Fee",
        description: "Fee for obtaining a recorded statement from claimant, witness, or involved party.",
    },
    TaxonomySeed {
        code: "INV.BACKGROUND_ASSET.PROF_FEE",
        unit_model: UnitModel::PerReport,
        label: "Investigation Background / Asset Search - Professional Fee",
        description: "Fee for background check, asset search, or public records investigation.",
    },
    TaxonomySeed {
        code: "INV.AOE_COE.PROF_FEE",
        unit_model: UnitModel::PerFile,
        label: "Investigation AOE/COE Investigation - Professional Fee",
        description: "Arising Out of Employment / Course of Employment investigation.",
    },
    TaxonomySeed {
        code: "INV.SKIP_TRACE.PROF_FEE",
        unit_model: UnitModel::PerOccurrence,
        label: "Investigation Skip Trace - Professional Fee",
        description: "Fee for locating a claimant or witness whose address is unknown.",
    },
    // REC
    TaxonomySeed {
        code: "REC.MED_RECORDS.RETRIEVAL_FEE",
        unit_model: UnitModel::PerRequest,
        label: "Record Retrieval Medical Records - Retrieval Fee",
        description: "Fee for requesting and obtaining medical records from a provider.",
    },
    TaxonomySeed {
        code: "REC.MED_RECORDS.COPY_REPRO",
        unit_model: UnitModel::PerPage,
        label: "Record Retrieval Medical Records - Copy / Reproduction Fee",
        description: "Per-page copying/reproduction fee for medical records.",
    },
    TaxonomySeed {
        code: "REC.MED_RECORDS.POSTAGE_COURIER",
        unit_model: UnitModel::Actual,
        label: "Record Retrieval Medical Records - Postage / Courier",
        description: "Actual postage or courier cost for delivering medical records.",
    },
    TaxonomySeed {
        code: "REC.MED_RECORDS.RUSH_PREMIUM",
        unit_model: UnitModel::FlatFee,
        label: "Record Retrieval Medical Records - Rush / Expedite Premium",
        description: "Additional fee for expedited record retrieval.",
    },
    TaxonomySeed {
        code: "REC.MED_RECORDS.CERT_COPY_FEE",
        unit_model: UnitModel::PerRequest,
        label: "Record Retrieval Medical Records - Certified Copy Fee",
        description: "Fee for obtaining certified/notarized copies of medical records.",
    },
    TaxonomySeed {
        code: "REC.EMPLOYMENT_RECORDS.RETRIEVAL_FEE",
        unit_model: UnitModel::PerRequest,
        label: "Record Retrieval Employment Records - Retrieval Fee",
        description: "Fee for requesting and obtaining employment or wage records.",
    },
    TaxonomySeed {
        code: "REC.LEGAL_RECORDS.RETRIEVAL_FEE",
        unit_model: UnitModel::PerRequest,
        label: "Record Retrieval Legal / Court Records - Retrieval Fee",
        description: "Fee for requesting court documents, police reports, or legal filings.",
    },
    TaxonomySeed {
        code: "REC.ADMIN.PROCESSING_FEE",
        unit_model: UnitModel::FlatFee,
        label: "Record Retrieval Administrative / Processing Fee",
        description: "Administrative processing fee for record retrieval management.",
    },
    // XDOMAIN
    TaxonomySeed {
        code: "XDOMAIN.PASS_THROUGH.THIRD_PARTY_COST",
        unit_model: UnitModel::Actual,
        label: "Pass-Through Third-Party Cost",
        description: "Actual third-party cost paid by vendor on behalf of carrier (e.g., court filing fees, expert witness subpoena fees). Requires supporting receipt.",
    },
    TaxonomySeed {
        code: "XDOMAIN.ADMIN_MISC.ADMIN_FEE",
        unit_model: UnitModel::FlatFee,
        label: "Miscellaneous Administrative Fee",
        description: "Administrative fee not classifiable under a specific service domain. Requires carrier pre-approval.",
    },
];

// ============================================================================
// SECTION: Registry
// ============================================================================

/// In-memory taxonomy lookup.
///
/// # Invariants
/// - `by_code` holds every item exactly once, keyed by its natural key.
#[derive(Debug, Clone)]
pub struct TaxonomyRegistry {
    /// Items keyed by taxonomy code.
    by_code: HashMap<TaxonomyCode, TaxonomyItem>,
}

impl TaxonomyRegistry {
    /// Builds a registry from an arbitrary item list (later duplicates win).
    #[must_use]
    pub fn from_items(items: Vec<TaxonomyItem>) -> Self {
        let by_code = items.into_iter().map(|item| (item.code.clone(), item)).collect();
        Self { by_code }
    }

    /// Builds a registry from the canonical seed table.
    #[must_use]
    pub fn from_canonical() -> Self {
        Self::from_items(canonical_items())
    }

    /// Looks up an item by code.
    #[must_use]
    pub fn get(&self, code: &TaxonomyCode) -> Option<&TaxonomyItem> {
        self.by_code.get(code)
    }

    /// Returns true when the code exists in the registry.
    #[must_use]
    pub fn contains(&self, code: &TaxonomyCode) -> bool {
        self.by_code.contains_key(code)
    }

    /// Enumerates items belonging to the given domain, in code order.
    #[must_use]
    pub fn by_domain(&self, domain: &str) -> Vec<&TaxonomyItem> {
        let mut items: Vec<&TaxonomyItem> =
            self.by_code.values().filter(|item| item.domain == domain).collect();
        items.sort_by(|a, b| a.code.cmp(&b.code));
        items
    }

    /// Returns the number of items in the registry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    /// Returns true when the registry holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }

    /// Iterates all items in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &TaxonomyItem> {
        self.by_code.values()
    }
}

/// Materializes the canonical seed table into owned items.
#[must_use]
pub fn canonical_items() -> Vec<TaxonomyItem> {
    CANONICAL_TAXONOMY
        .iter()
        .filter_map(|seed| {
            let code = TaxonomyCode::new(seed.code);
            let mut segments = seed.code.split('.');
            let domain = segments.next()?.to_owned();
            let service_item = segments.next()?.to_owned();
            let billing_component = segments.next()?.to_owned();
            Some(TaxonomyItem {
                code,
                domain,
                service_item,
                billing_component,
                unit_model: seed.unit_model,
                label: seed.label.to_owned(),
                description: seed.description.to_owned(),
                active: true,
            })
        })
        .collect()
}

/// Process-global canonical registry, built on first access.
static CANONICAL_REGISTRY: OnceLock<TaxonomyRegistry> = OnceLock::new();

/// Returns the process-global registry built from the canonical list.
///
/// Hosts that apply administrative taxonomy updates should build a fresh
/// [`TaxonomyRegistry::from_items`] from their persisted rows instead of
/// relying on this cache.
#[must_use]
pub fn canonical_registry() -> &'static TaxonomyRegistry {
    CANONICAL_REGISTRY.get_or_init(TaxonomyRegistry::from_canonical)
}
