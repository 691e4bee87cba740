// crates/clearbill-core/src/core/audit.rs
// ============================================================================
// Module: Clearbill Audit Log
// Description: Immutable, store-timestamped audit event records.
// Purpose: Record every meaningful state change for tamper-resistant replay.
// Dependencies: crate::core::{identifiers, time, mod}, serde, serde_json
// ============================================================================

//! ## Overview
//! Every state-changing operation appends an [`AuditEvent`] within the same
//! transaction as the change. The log is append-only: no update, no delete.
//! `created_at` is assigned by the store, never by the caller; the append API
//! ([`NewAuditEvent`]) has no timestamp field at all, which is the platform's
//! tamper-resistance guarantee.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::core::UnknownVariant;
use crate::core::identifiers::ActorId;
use crate::core::identifiers::AuditEventId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Event Names
// ============================================================================

/// Dot-namespaced, past-tense audit event names.
pub mod event {
    /// Invoice record created.
    pub const INVOICE_CREATED: &str = "invoice.created";
    /// Invoice file uploaded and submitted.
    pub const INVOICE_SUBMITTED: &str = "invoice.submitted";
    /// Invoice lifecycle status changed.
    pub const INVOICE_STATUS_CHANGED: &str = "invoice.status_changed";
    /// Carrier returned the invoice with requested changes.
    pub const INVOICE_CHANGES_REQUESTED: &str = "invoice.changes_requested";
    /// Line item classified to a taxonomy code.
    pub const LINE_ITEM_CLASSIFIED: &str = "line_item.classified";
    /// Exception opened from a FAIL finding.
    pub const EXCEPTION_OPENED: &str = "exception.opened";
    /// Supplier responded to an exception.
    pub const EXCEPTION_SUPPLIER_RESPONDED: &str = "exception.supplier_responded";
    /// Exception resolved by carrier action.
    pub const EXCEPTION_RESOLVED: &str = "exception.resolved";
    /// Mapping rule overridden by the carrier.
    pub const MAPPING_RULE_OVERRIDDEN: &str = "mapping_rule.overridden";
}

// ============================================================================
// SECTION: Actors and Entities
// ============================================================================

/// Who caused a state change.
///
/// # Invariants
/// - Variants are stable for serialization and store round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorType {
    /// The platform itself (pipeline, scheduler).
    System,
    /// An authenticated supplier user.
    Supplier,
    /// An authenticated carrier user.
    Carrier,
}

impl ActorType {
    /// Returns the stable wire form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "SYSTEM",
            Self::Supplier => "SUPPLIER",
            Self::Carrier => "CARRIER",
        }
    }
}

impl FromStr for ActorType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SYSTEM" => Ok(Self::System),
            "SUPPLIER" => Ok(Self::Supplier),
            "CARRIER" => Ok(Self::Carrier),
            other => Err(UnknownVariant::new("actor_type", other)),
        }
    }
}

impl fmt::Display for ActorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which entity family an audit event describes.
///
/// # Invariants
/// - Variants are stable for serialization and store round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEntityType {
    /// Invoice aggregate.
    Invoice,
    /// Line item.
    LineItem,
    /// Exception record.
    Exception,
    /// Mapping rule.
    MappingRule,
}

impl AuditEntityType {
    /// Returns the stable wire form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::LineItem => "line_item",
            Self::Exception => "exception",
            Self::MappingRule => "mapping_rule",
        }
    }
}

impl FromStr for AuditEntityType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invoice" => Ok(Self::Invoice),
            "line_item" => Ok(Self::LineItem),
            "exception" => Ok(Self::Exception),
            "mapping_rule" => Ok(Self::MappingRule),
            other => Err(UnknownVariant::new("audit_entity_type", other)),
        }
    }
}

impl fmt::Display for AuditEntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Audit Records
// ============================================================================

/// An audit event awaiting append.
///
/// # Invariants
/// - Carries no timestamp: `created_at` is assigned by the store at append
///   time. Callers cannot supply one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAuditEvent {
    /// Entity family.
    pub entity_type: AuditEntityType,
    /// Entity identifier.
    pub entity_id: Uuid,
    /// Dot-namespaced, past-tense event name from [`event`].
    pub event_type: String,
    /// Who caused the change.
    pub actor_type: ActorType,
    /// Acting user, when human-triggered.
    pub actor_id: Option<ActorId>,
    /// Structured JSON snapshot of the relevant state.
    pub payload: Value,
}

impl NewAuditEvent {
    /// Creates a system-attributed event.
    #[must_use]
    pub fn system(
        entity_type: AuditEntityType,
        entity_id: Uuid,
        event_type: &str,
        payload: Value,
    ) -> Self {
        Self {
            entity_type,
            entity_id,
            event_type: event_type.to_owned(),
            actor_type: ActorType::System,
            actor_id: None,
            payload,
        }
    }

    /// Creates an actor-attributed event.
    #[must_use]
    pub fn acted(
        entity_type: AuditEntityType,
        entity_id: Uuid,
        event_type: &str,
        actor_type: ActorType,
        actor_id: Option<ActorId>,
        payload: Value,
    ) -> Self {
        Self {
            entity_type,
            entity_id,
            event_type: event_type.to_owned(),
            actor_type,
            actor_id,
            payload,
        }
    }
}

/// A persisted audit event.
///
/// # Invariants
/// - Append-only; no row is ever updated or deleted.
/// - Events for a single entity are totally ordered by `(created_at, seq)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event identifier.
    pub id: AuditEventId,
    /// Entity family.
    pub entity_type: AuditEntityType,
    /// Entity identifier.
    pub entity_id: Uuid,
    /// Dot-namespaced, past-tense event name.
    pub event_type: String,
    /// Who caused the change.
    pub actor_type: ActorType,
    /// Acting user, when human-triggered.
    pub actor_id: Option<ActorId>,
    /// Structured JSON snapshot of the relevant state.
    pub payload: Value,
    /// Store-assigned creation instant.
    pub created_at: Timestamp,
    /// Store-assigned tie-breaking sequence within `created_at`.
    pub seq: i64,
}
