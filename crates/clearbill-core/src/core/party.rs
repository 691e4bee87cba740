// crates/clearbill-core/src/core/party.rs
// ============================================================================
// Module: Clearbill Parties and Contract Terms
// Description: Carriers, suppliers, contracts, rate cards, and guidelines.
// Purpose: Model the administrative entities that scope invoice validation.
// Dependencies: crate::core::{identifiers, taxonomy, validation}, bigdecimal, serde, time
// ============================================================================

//! ## Overview
//! A supplier bills a carrier under a contract. Contracts own the rate cards
//! (contracted prices per taxonomy code) and the guidelines (structured rules
//! derived from contract narrative language) that the validators evaluate.
//! These entities are administrative: the core reads them, never invents them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde::Serialize;
use time::Date;

use crate::core::identifiers::CarrierId;
use crate::core::identifiers::ContractId;
use crate::core::identifiers::GuidelineId;
use crate::core::identifiers::RateCardId;
use crate::core::identifiers::SupplierId;
use crate::core::taxonomy::TaxonomyCode;
use crate::core::validation::ValidationSeverity;

// ============================================================================
// SECTION: Carrier and Supplier
// ============================================================================

/// An insurance carrier (client of the platform).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Carrier {
    /// Carrier identifier.
    pub id: CarrierId,
    /// Display name.
    pub name: String,
    /// Short code used in UI and exports (e.g. `ACME`).
    pub short_code: String,
    /// Whether the carrier is active.
    pub active: bool,
}

/// A vendor/supplier who submits invoices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supplier {
    /// Supplier identifier.
    pub id: SupplierId,
    /// Display name.
    pub name: String,
    /// Tax identifier (EIN), masked in user interfaces.
    pub tax_id: Option<String>,
    /// Whether the supplier is active.
    pub active: bool,
}

// ============================================================================
// SECTION: Contract
// ============================================================================

/// Geographic applicability of a contract.
///
/// # Invariants
/// - Variants are stable for serialization and store round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeographyScope {
    /// Applies nationwide.
    National,
    /// Applies to an explicit list of states.
    State,
    /// Applies to a named region.
    Regional,
}

/// A contract between a carrier and a supplier.
///
/// # Invariants
/// - `(supplier_id, carrier_id, effective_from)` is unique.
/// - `state_codes` is populated only for [`GeographyScope::State`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    /// Contract identifier.
    pub id: ContractId,
    /// Owning supplier.
    pub supplier_id: SupplierId,
    /// Owning carrier.
    pub carrier_id: CarrierId,
    /// Display name (e.g. "ACME IME Services Agreement 2025").
    pub name: String,
    /// First day the contract is effective.
    pub effective_from: Date,
    /// Last day the contract is effective; `None` while active.
    pub effective_to: Option<Date>,
    /// Geographic applicability.
    pub geography_scope: GeographyScope,
    /// State codes for state-scoped contracts.
    pub state_codes: Option<Vec<String>>,
    /// Whether the contract is active.
    pub active: bool,
}

// ============================================================================
// SECTION: Rate Card
// ============================================================================

/// Contracted price per unit for a taxonomy code within a contract.
///
/// # Invariants
/// - Among cards sharing `(contract_id, taxonomy_code)`, the card with the
///   greatest `effective_from` that covers the service date wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateCard {
    /// Rate card identifier.
    pub id: RateCardId,
    /// Owning contract.
    pub contract_id: ContractId,
    /// Taxonomy code the rate applies to.
    pub taxonomy_code: TaxonomyCode,
    /// Contracted per-unit rate (decimal 12.4).
    pub contracted_rate: BigDecimal,
    /// Optional maximum billable units (decimal 10.4).
    pub max_units: Option<BigDecimal>,
    /// When true, travel and expense components must not be billed separately.
    pub is_all_inclusive: bool,
    /// First day the card is effective.
    pub effective_from: Date,
    /// Last day the card is effective; `None` while open-ended.
    pub effective_to: Option<Date>,
}

impl RateCard {
    /// Returns true when the card covers the given service date.
    #[must_use]
    pub fn covers(&self, service_date: Date) -> bool {
        self.effective_from <= service_date
            && self.effective_to.is_none_or(|until| service_date <= until)
    }
}

// ============================================================================
// SECTION: Guideline
// ============================================================================

/// A structured rule derived from contract narrative language.
///
/// Applicability (most specific wins): a guideline with `taxonomy_code` set
/// applies only to that code; else with `domain` set it applies to every code
/// in that domain; else it applies to every line under the contract.
///
/// # Invariants
/// - `rule_type` names a closed rule family; `rule_params` is its structured
///   parameter document. Unknown rule types are skipped at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guideline {
    /// Guideline identifier.
    pub id: GuidelineId,
    /// Owning contract.
    pub contract_id: ContractId,
    /// Optional taxonomy code scope (most specific).
    pub taxonomy_code: Option<TaxonomyCode>,
    /// Optional domain scope.
    pub domain: Option<String>,
    /// Rule family name (e.g. `max_units`, `cap_amount`).
    pub rule_type: String,
    /// Structured rule parameters.
    pub rule_params: serde_json::Value,
    /// Severity applied to findings this guideline produces.
    pub severity: ValidationSeverity,
    /// Verbatim contract narrative the rule was derived from.
    pub narrative_source: Option<String>,
    /// Whether the guideline is evaluated.
    pub active: bool,
}
