// crates/clearbill-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Invoice Store
// Description: Durable InvoiceStore backed by SQLite WAL.
// Purpose: Persist invoices, lines, findings, exceptions, rules, and audit.
// Dependencies: clearbill-core, rusqlite, serde, serde_json, time, uuid
// ============================================================================

//! ## Overview
//! This module implements the transactional [`InvoiceStore`] on SQLite. All
//! monetary values are stored as decimal text (never floats), dates as ISO
//! text, and timestamps as unix microseconds. Status transitions are
//! compare-and-set: the UPDATE only lands when the persisted status still
//! matches what the caller observed, so concurrent actors serialize cleanly.
//! Audit rows are append-only with store-assigned monotonic stamps; callers
//! cannot supply timestamps.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use bigdecimal::BigDecimal;
use clearbill_core::ActorId;
use clearbill_core::AuditEntityType;
use clearbill_core::AuditEvent;
use clearbill_core::Carrier;
use clearbill_core::CarrierId;
use clearbill_core::ConfidenceLabel;
use clearbill_core::ConfirmedBy;
use clearbill_core::Contract;
use clearbill_core::ContractId;
use clearbill_core::ExceptionId;
use clearbill_core::ExceptionRecord;
use clearbill_core::ExceptionStatus;
use clearbill_core::FileFormat;
use clearbill_core::Finding;
use clearbill_core::GeographyScope;
use clearbill_core::Guideline;
use clearbill_core::GuidelineId;
use clearbill_core::Invoice;
use clearbill_core::InvoiceId;
use clearbill_core::InvoiceStatus;
use clearbill_core::InvoiceStore;
use clearbill_core::InvoiceVersion;
use clearbill_core::InvoiceVersionId;
use clearbill_core::LineItem;
use clearbill_core::LineItemId;
use clearbill_core::LineItemStatus;
use clearbill_core::MappingRule;
use clearbill_core::MappingRuleId;
use clearbill_core::MatchType;
use clearbill_core::NewAuditEvent;
use clearbill_core::RateCard;
use clearbill_core::RateCardId;
use clearbill_core::RawExtractionArtifact;
use clearbill_core::RequiredAction;
use clearbill_core::ResolutionAction;
use clearbill_core::StoreError;
use clearbill_core::StoreTxn;
use clearbill_core::Supplier;
use clearbill_core::SupplierId;
use clearbill_core::TaxonomyCode;
use clearbill_core::TaxonomyItem;
use clearbill_core::Timestamp;
use clearbill_core::TransitionError;
use clearbill_core::UnitModel;
use clearbill_core::ValidationResult;
use clearbill_core::ValidationResultId;
use clearbill_core::ValidationSeverity;
use clearbill_core::ValidationStatus;
use clearbill_core::ValidationType;
use clearbill_core::core::identifiers::AuditEventId;
use clearbill_core::core::state::guard_invoice_transition;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::Transaction;
use rusqlite::params;
use serde::Deserialize;
use time::Date;
use time::macros::format_description;
use uuid::Uuid;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` invoice store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed invoice store.
///
/// # Invariants
/// - One connection per store; transactions serialize through it.
/// - Schema version mismatches fail closed at open time.
pub struct SqliteInvoiceStore {
    /// Owned writer connection.
    connection: Connection,
}

impl SqliteInvoiceStore {
    /// Opens (or creates) a store at the configured path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the database cannot be opened, the pragmas
    /// cannot be applied, or the schema version mismatches.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, StoreError> {
        let connection = Connection::open(&config.path)
            .map_err(|err| StoreError::Io(format!("{}: {err}", config.path.display())))?;
        configure_connection(&connection, config)?;
        let mut store = Self { connection };
        store.bootstrap_schema()?;
        Ok(store)
    }

    /// Opens a store at a path with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] as for [`SqliteInvoiceStore::open`].
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open(&SqliteStoreConfig {
            path: path.as_ref().to_path_buf(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        })
    }

    /// Opens an ephemeral in-memory store (tests, demos).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let connection = Connection::open_in_memory().map_err(db_err)?;
        connection.execute_batch("PRAGMA foreign_keys = ON;").map_err(db_err)?;
        let mut store = Self { connection };
        store.bootstrap_schema()?;
        Ok(store)
    }

    /// Creates tables and records the schema version, failing closed on a
    /// version mismatch.
    fn bootstrap_schema(&mut self) -> Result<(), StoreError> {
        let tx = self.connection.transaction().map_err(db_err)?;
        tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
            .map_err(db_err)?;
        let version: Option<i64> =
            tx.query_row("SELECT version FROM store_meta", [], |row| row.get(0))
                .optional()
                .map_err(db_err)?;
        match version {
            None => {
                tx.execute("INSERT INTO store_meta (version) VALUES (?1)", [SCHEMA_VERSION])
                    .map_err(db_err)?;
                tx.execute_batch(SCHEMA_SQL).map_err(db_err)?;
            }
            Some(found) if found == SCHEMA_VERSION => {}
            Some(found) => {
                return Err(StoreError::Invalid(format!(
                    "schema version mismatch: found {found}, expected {SCHEMA_VERSION}"
                )));
            }
        }
        tx.commit().map_err(db_err)
    }
}

impl InvoiceStore for SqliteInvoiceStore {
    type Txn<'a> = SqliteTxn<'a>;

    fn begin(&mut self) -> Result<Self::Txn<'_>, StoreError> {
        let tx = self.connection.transaction().map_err(db_err)?;
        Ok(SqliteTxn { tx })
    }
}

/// Applies pragmas to a fresh connection.
fn configure_connection(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), StoreError> {
    connection.execute_batch("PRAGMA foreign_keys = ON;").map_err(db_err)?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(db_err)?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(db_err)?;
    connection
        .execute_batch(&format!("PRAGMA busy_timeout = {};", config.busy_timeout_ms))
        .map_err(db_err)?;
    Ok(())
}

/// Full table and index definitions.
const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS carriers (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    short_code TEXT NOT NULL UNIQUE,
    active INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS suppliers (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    tax_id TEXT,
    active INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS taxonomy_items (
    code TEXT PRIMARY KEY,
    domain TEXT NOT NULL,
    service_item TEXT NOT NULL,
    billing_component TEXT NOT NULL,
    unit_model TEXT NOT NULL,
    label TEXT NOT NULL,
    description TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS contracts (
    id TEXT PRIMARY KEY,
    supplier_id TEXT NOT NULL REFERENCES suppliers(id),
    carrier_id TEXT NOT NULL REFERENCES carriers(id),
    name TEXT NOT NULL,
    effective_from TEXT NOT NULL,
    effective_to TEXT,
    geography_scope TEXT NOT NULL,
    state_codes TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    UNIQUE (supplier_id, carrier_id, effective_from)
);
CREATE TABLE IF NOT EXISTS rate_cards (
    id TEXT PRIMARY KEY,
    contract_id TEXT NOT NULL REFERENCES contracts(id),
    taxonomy_code TEXT NOT NULL REFERENCES taxonomy_items(code),
    contracted_rate TEXT NOT NULL,
    max_units TEXT,
    is_all_inclusive INTEGER NOT NULL DEFAULT 0,
    effective_from TEXT NOT NULL,
    effective_to TEXT
);
CREATE INDEX IF NOT EXISTS idx_rate_cards_lookup
    ON rate_cards (contract_id, taxonomy_code);
CREATE TABLE IF NOT EXISTS guidelines (
    id TEXT PRIMARY KEY,
    contract_id TEXT NOT NULL REFERENCES contracts(id),
    taxonomy_code TEXT REFERENCES taxonomy_items(code),
    domain TEXT,
    rule_type TEXT NOT NULL,
    rule_params TEXT NOT NULL,
    severity TEXT NOT NULL,
    narrative_source TEXT,
    active INTEGER NOT NULL DEFAULT 1
);
CREATE INDEX IF NOT EXISTS idx_guidelines_contract ON guidelines (contract_id);
CREATE TABLE IF NOT EXISTS mapping_rules (
    id TEXT PRIMARY KEY,
    supplier_id TEXT REFERENCES suppliers(id),
    match_type TEXT NOT NULL,
    match_pattern TEXT NOT NULL,
    taxonomy_code TEXT NOT NULL REFERENCES taxonomy_items(code),
    billing_component TEXT NOT NULL,
    confidence_weight REAL NOT NULL,
    confidence_label TEXT NOT NULL,
    confirmed_by TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 1,
    effective_from_us INTEGER NOT NULL,
    effective_to_us INTEGER,
    supersedes_rule_id TEXT REFERENCES mapping_rules(id)
);
CREATE INDEX IF NOT EXISTS idx_mapping_rules_scope
    ON mapping_rules (supplier_id, effective_to_us);
CREATE TABLE IF NOT EXISTS invoices (
    id TEXT PRIMARY KEY,
    supplier_id TEXT NOT NULL REFERENCES suppliers(id),
    contract_id TEXT NOT NULL REFERENCES contracts(id),
    invoice_number TEXT NOT NULL,
    invoice_date TEXT NOT NULL,
    status TEXT NOT NULL,
    current_version INTEGER NOT NULL DEFAULT 1,
    file_pointer TEXT,
    file_format TEXT,
    submitted_at_us INTEGER,
    submission_notes TEXT
);
CREATE INDEX IF NOT EXISTS idx_invoices_supplier ON invoices (supplier_id, status);
CREATE TABLE IF NOT EXISTS invoice_versions (
    id TEXT PRIMARY KEY,
    invoice_id TEXT NOT NULL REFERENCES invoices(id),
    version_number INTEGER NOT NULL,
    file_pointer TEXT NOT NULL,
    file_format TEXT NOT NULL,
    submitted_at_us INTEGER NOT NULL,
    notes TEXT,
    UNIQUE (invoice_id, version_number)
);
CREATE TABLE IF NOT EXISTS line_items (
    id TEXT PRIMARY KEY,
    invoice_id TEXT NOT NULL REFERENCES invoices(id),
    invoice_version INTEGER NOT NULL,
    line_number INTEGER NOT NULL,
    status TEXT NOT NULL,
    raw_description TEXT NOT NULL,
    raw_code TEXT,
    raw_amount TEXT NOT NULL,
    raw_quantity TEXT NOT NULL,
    raw_unit TEXT,
    claim_number TEXT,
    service_date TEXT,
    taxonomy_code TEXT REFERENCES taxonomy_items(code),
    billing_component TEXT,
    mapping_confidence TEXT,
    mapping_rule_id TEXT REFERENCES mapping_rules(id),
    mapped_rate TEXT,
    expected_amount TEXT,
    ai_assessment TEXT
);
CREATE INDEX IF NOT EXISTS idx_line_items_version
    ON line_items (invoice_id, invoice_version, line_number);
CREATE TABLE IF NOT EXISTS raw_extraction_artifacts (
    id TEXT PRIMARY KEY,
    invoice_version_id TEXT NOT NULL REFERENCES invoice_versions(id),
    page_number INTEGER,
    raw_text TEXT NOT NULL,
    extraction_method TEXT NOT NULL,
    metadata TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS validation_results (
    id TEXT PRIMARY KEY,
    line_item_id TEXT NOT NULL REFERENCES line_items(id),
    validation_type TEXT NOT NULL,
    rate_card_id TEXT REFERENCES rate_cards(id),
    guideline_id TEXT REFERENCES guidelines(id),
    status TEXT NOT NULL,
    severity TEXT NOT NULL,
    message TEXT NOT NULL,
    expected_value TEXT,
    actual_value TEXT,
    required_action TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_validation_results_line
    ON validation_results (line_item_id);
CREATE TABLE IF NOT EXISTS exception_records (
    id TEXT PRIMARY KEY,
    line_item_id TEXT NOT NULL REFERENCES line_items(id),
    validation_result_id TEXT NOT NULL REFERENCES validation_results(id),
    status TEXT NOT NULL,
    supplier_response TEXT,
    supporting_doc TEXT,
    resolution_action TEXT,
    resolution_notes TEXT,
    resolved_at_us INTEGER,
    resolved_by TEXT
);
CREATE INDEX IF NOT EXISTS idx_exception_records_line
    ON exception_records (line_item_id, status);
CREATE TABLE IF NOT EXISTS audit_events (
    id TEXT PRIMARY KEY,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    actor_type TEXT NOT NULL,
    actor_id TEXT,
    payload TEXT NOT NULL,
    created_at_us INTEGER NOT NULL,
    seq INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_audit_events_entity
    ON audit_events (entity_type, entity_id, created_at_us, seq);
";

// ============================================================================
// SECTION: Transaction
// ============================================================================

/// One transactional session over the store connection.
///
/// # Invariants
/// - Dropping without [`StoreTxn::commit`] rolls every write back.
pub struct SqliteTxn<'a> {
    /// Underlying rusqlite transaction.
    tx: Transaction<'a>,
}

impl StoreTxn for SqliteTxn<'_> {
    fn insert_carrier(&mut self, carrier: &Carrier) -> Result<(), StoreError> {
        self.tx
            .execute(
                "INSERT INTO carriers (id, name, short_code, active) VALUES (?1, ?2, ?3, ?4)",
                params![
                    carrier.id.to_string(),
                    carrier.name,
                    carrier.short_code,
                    i64::from(carrier.active)
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn insert_supplier(&mut self, supplier: &Supplier) -> Result<(), StoreError> {
        self.tx
            .execute(
                "INSERT INTO suppliers (id, name, tax_id, active) VALUES (?1, ?2, ?3, ?4)",
                params![
                    supplier.id.to_string(),
                    supplier.name,
                    supplier.tax_id,
                    i64::from(supplier.active)
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn insert_contract(&mut self, contract: &Contract) -> Result<(), StoreError> {
        let state_codes = contract
            .state_codes
            .as_ref()
            .map(|codes| serde_json::to_string(codes).unwrap_or_default());
        self.tx
            .execute(
                "INSERT INTO contracts (id, supplier_id, carrier_id, name, effective_from, \
                 effective_to, geography_scope, state_codes, active) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    contract.id.to_string(),
                    contract.supplier_id.to_string(),
                    contract.carrier_id.to_string(),
                    contract.name,
                    date_text(contract.effective_from),
                    contract.effective_to.map(date_text),
                    geography_text(contract.geography_scope),
                    state_codes,
                    i64::from(contract.active)
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn contract(&mut self, id: ContractId) -> Result<Option<Contract>, StoreError> {
        self.tx
            .query_row(
                "SELECT id, supplier_id, carrier_id, name, effective_from, effective_to, \
                 geography_scope, state_codes, active FROM contracts WHERE id = ?1",
                [id.to_string()],
                row_to_contract,
            )
            .optional()
            .map_err(db_err)?
            .transpose()
    }

    fn insert_rate_card(&mut self, card: &RateCard) -> Result<(), StoreError> {
        self.require_taxonomy(&card.taxonomy_code)?;
        self.tx
            .execute(
                "INSERT INTO rate_cards (id, contract_id, taxonomy_code, contracted_rate, \
                 max_units, is_all_inclusive, effective_from, effective_to) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    card.id.to_string(),
                    card.contract_id.to_string(),
                    card.taxonomy_code.as_str(),
                    card.contracted_rate.to_string(),
                    card.max_units.as_ref().map(ToString::to_string),
                    i64::from(card.is_all_inclusive),
                    date_text(card.effective_from),
                    card.effective_to.map(date_text)
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn rate_cards_for(
        &mut self,
        contract_id: ContractId,
        taxonomy_code: &TaxonomyCode,
    ) -> Result<Vec<RateCard>, StoreError> {
        let mut statement = self
            .tx
            .prepare(
                "SELECT id, contract_id, taxonomy_code, contracted_rate, max_units, \
                 is_all_inclusive, effective_from, effective_to FROM rate_cards \
                 WHERE contract_id = ?1 AND taxonomy_code = ?2 ORDER BY effective_from DESC",
            )
            .map_err(db_err)?;
        let rows = statement
            .query_map(params![contract_id.to_string(), taxonomy_code.as_str()], row_to_rate_card)
            .map_err(db_err)?;
        collect_rows(rows)
    }

    fn insert_guideline(&mut self, guideline: &Guideline) -> Result<(), StoreError> {
        if let Some(code) = &guideline.taxonomy_code {
            self.require_taxonomy(code)?;
        }
        self.tx
            .execute(
                "INSERT INTO guidelines (id, contract_id, taxonomy_code, domain, rule_type, \
                 rule_params, severity, narrative_source, active) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    guideline.id.to_string(),
                    guideline.contract_id.to_string(),
                    guideline.taxonomy_code.as_ref().map(|code| code.as_str().to_owned()),
                    guideline.domain,
                    guideline.rule_type,
                    guideline.rule_params.to_string(),
                    guideline.severity.as_str(),
                    guideline.narrative_source,
                    i64::from(guideline.active)
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn active_guidelines(&mut self, contract_id: ContractId) -> Result<Vec<Guideline>, StoreError> {
        let mut statement = self
            .tx
            .prepare(
                "SELECT id, contract_id, taxonomy_code, domain, rule_type, rule_params, \
                 severity, narrative_source, active FROM guidelines \
                 WHERE contract_id = ?1 AND active = 1 ORDER BY id",
            )
            .map_err(db_err)?;
        let rows =
            statement.query_map([contract_id.to_string()], row_to_guideline).map_err(db_err)?;
        collect_rows(rows)
    }

    fn upsert_taxonomy_item(&mut self, item: &TaxonomyItem) -> Result<(), StoreError> {
        // The persisted active flag is administrative state; the canonical
        // projection never overwrites it.
        self.tx
            .execute(
                "INSERT INTO taxonomy_items (code, domain, service_item, billing_component, \
                 unit_model, label, description, active) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                 ON CONFLICT(code) DO UPDATE SET domain = excluded.domain, \
                 service_item = excluded.service_item, \
                 billing_component = excluded.billing_component, \
                 unit_model = excluded.unit_model, label = excluded.label, \
                 description = excluded.description",
                params![
                    item.code.as_str(),
                    item.domain,
                    item.service_item,
                    item.billing_component,
                    unit_model_text(item.unit_model),
                    item.label,
                    item.description,
                    i64::from(item.active)
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn taxonomy_item(&mut self, code: &TaxonomyCode) -> Result<Option<TaxonomyItem>, StoreError> {
        self.tx
            .query_row(
                "SELECT code, domain, service_item, billing_component, unit_model, label, \
                 description, active FROM taxonomy_items WHERE code = ?1",
                [code.as_str()],
                row_to_taxonomy_item,
            )
            .optional()
            .map_err(db_err)?
            .transpose()
    }

    fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError> {
        self.tx
            .execute(
                "INSERT INTO invoices (id, supplier_id, contract_id, invoice_number, \
                 invoice_date, status, current_version, file_pointer, file_format, \
                 submitted_at_us, submission_notes) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    invoice.id.to_string(),
                    invoice.supplier_id.to_string(),
                    invoice.contract_id.to_string(),
                    invoice.invoice_number,
                    date_text(invoice.invoice_date),
                    invoice.status.as_str(),
                    invoice.current_version,
                    invoice.file_pointer,
                    invoice.file_format.map(FileFormat::as_str),
                    invoice.submitted_at.map(|ts| ts.unix_micros()),
                    invoice.submission_notes
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn invoice(&mut self, id: InvoiceId) -> Result<Option<Invoice>, StoreError> {
        self.tx
            .query_row(
                "SELECT id, supplier_id, contract_id, invoice_number, invoice_date, status, \
                 current_version, file_pointer, file_format, submitted_at_us, \
                 submission_notes FROM invoices WHERE id = ?1",
                [id.to_string()],
                row_to_invoice,
            )
            .optional()
            .map_err(db_err)?
            .transpose()
    }

    fn update_invoice_header(&mut self, invoice: &Invoice) -> Result<(), StoreError> {
        let changed = self
            .tx
            .execute(
                "UPDATE invoices SET invoice_number = ?2, invoice_date = ?3, \
                 current_version = ?4, file_pointer = ?5, file_format = ?6, \
                 submitted_at_us = ?7, submission_notes = ?8 WHERE id = ?1",
                params![
                    invoice.id.to_string(),
                    invoice.invoice_number,
                    date_text(invoice.invoice_date),
                    invoice.current_version,
                    invoice.file_pointer,
                    invoice.file_format.map(FileFormat::as_str),
                    invoice.submitted_at.map(|ts| ts.unix_micros()),
                    invoice.submission_notes
                ],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(StoreError::NotFound { entity: "invoice", id: invoice.id.to_string() });
        }
        Ok(())
    }

    fn transition_invoice(
        &mut self,
        id: InvoiceId,
        expected: InvoiceStatus,
        to: InvoiceStatus,
    ) -> Result<(), StoreError> {
        guard_invoice_transition(expected, to)?;
        let changed = self
            .tx
            .execute(
                "UPDATE invoices SET status = ?3 WHERE id = ?1 AND status = ?2",
                params![id.to_string(), expected.as_str(), to.as_str()],
            )
            .map_err(db_err)?;
        if changed == 1 {
            return Ok(());
        }
        // The compare-and-set missed: report what is actually persisted.
        let actual: Option<String> = self
            .tx
            .query_row("SELECT status FROM invoices WHERE id = ?1", [id.to_string()], |row| {
                row.get(0)
            })
            .optional()
            .map_err(db_err)?;
        match actual {
            None => Err(StoreError::NotFound { entity: "invoice", id: id.to_string() }),
            Some(actual) => Err(StoreError::Transition(TransitionError::StaleStatus {
                entity: "invoice",
                expected: expected.as_str().to_owned(),
                actual,
            })),
        }
    }

    fn insert_invoice_version(&mut self, version: &InvoiceVersion) -> Result<(), StoreError> {
        self.tx
            .execute(
                "INSERT INTO invoice_versions (id, invoice_id, version_number, file_pointer, \
                 file_format, submitted_at_us, notes) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    version.id.to_string(),
                    version.invoice_id.to_string(),
                    version.version_number,
                    version.file_pointer,
                    version.file_format.as_str(),
                    version.submitted_at.unix_micros(),
                    version.notes
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn invoice_version(
        &mut self,
        invoice_id: InvoiceId,
        version_number: i64,
    ) -> Result<Option<InvoiceVersion>, StoreError> {
        self.tx
            .query_row(
                "SELECT id, invoice_id, version_number, file_pointer, file_format, \
                 submitted_at_us, notes FROM invoice_versions \
                 WHERE invoice_id = ?1 AND version_number = ?2",
                params![invoice_id.to_string(), version_number],
                row_to_invoice_version,
            )
            .optional()
            .map_err(db_err)?
            .transpose()
    }

    fn insert_line_item(&mut self, line: &LineItem) -> Result<(), StoreError> {
        self.tx
            .execute(
                "INSERT INTO line_items (id, invoice_id, invoice_version, line_number, status, \
                 raw_description, raw_code, raw_amount, raw_quantity, raw_unit, claim_number, \
                 service_date, taxonomy_code, billing_component, mapping_confidence, \
                 mapping_rule_id, mapped_rate, expected_amount, ai_assessment) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, \
                 ?16, ?17, ?18, ?19)",
                line_params(line),
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn update_line_item(&mut self, line: &LineItem) -> Result<(), StoreError> {
        let changed = self
            .tx
            .execute(
                "UPDATE line_items SET invoice_id = ?2, invoice_version = ?3, line_number = ?4, \
                 status = ?5, raw_description = ?6, raw_code = ?7, raw_amount = ?8, \
                 raw_quantity = ?9, raw_unit = ?10, claim_number = ?11, service_date = ?12, \
                 taxonomy_code = ?13, billing_component = ?14, mapping_confidence = ?15, \
                 mapping_rule_id = ?16, mapped_rate = ?17, expected_amount = ?18, \
                 ai_assessment = ?19 WHERE id = ?1",
                line_params(line),
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(StoreError::NotFound { entity: "line item", id: line.id.to_string() });
        }
        Ok(())
    }

    fn line_item(&mut self, id: LineItemId) -> Result<Option<LineItem>, StoreError> {
        self.tx
            .query_row(
                &format!("{LINE_ITEM_SELECT} WHERE id = ?1"),
                [id.to_string()],
                row_to_line_item,
            )
            .optional()
            .map_err(db_err)?
            .transpose()
    }

    fn line_items_for_version(
        &mut self,
        invoice_id: InvoiceId,
        version_number: i64,
    ) -> Result<Vec<LineItem>, StoreError> {
        let mut statement = self
            .tx
            .prepare(&format!(
                "{LINE_ITEM_SELECT} WHERE invoice_id = ?1 AND invoice_version = ?2 \
                 ORDER BY line_number"
            ))
            .map_err(db_err)?;
        let rows = statement
            .query_map(params![invoice_id.to_string(), version_number], row_to_line_item)
            .map_err(db_err)?;
        collect_rows(rows)
    }

    fn count_line_items(
        &mut self,
        invoice_id: InvoiceId,
        version_number: i64,
    ) -> Result<u64, StoreError> {
        let count: i64 = self
            .tx
            .query_row(
                "SELECT COUNT(*) FROM line_items WHERE invoice_id = ?1 AND invoice_version = ?2",
                params![invoice_id.to_string(), version_number],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn insert_artifact(&mut self, artifact: &RawExtractionArtifact) -> Result<(), StoreError> {
        self.tx
            .execute(
                "INSERT INTO raw_extraction_artifacts (id, invoice_version_id, page_number, \
                 raw_text, extraction_method, metadata) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    artifact.id.to_string(),
                    artifact.invoice_version_id.to_string(),
                    artifact.page_number,
                    artifact.raw_text,
                    artifact.extraction_method,
                    artifact.metadata.to_string()
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn insert_validation_result(&mut self, result: &ValidationResult) -> Result<(), StoreError> {
        let finding = &result.finding;
        self.tx
            .execute(
                "INSERT INTO validation_results (id, line_item_id, validation_type, \
                 rate_card_id, guideline_id, status, severity, message, expected_value, \
                 actual_value, required_action) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    result.id.to_string(),
                    result.line_item_id.to_string(),
                    finding.validation_type.as_str(),
                    finding.rate_card_id.map(|id| id.to_string()),
                    finding.guideline_id.map(|id| id.to_string()),
                    finding.status.as_str(),
                    finding.severity.as_str(),
                    finding.message,
                    finding.expected_value,
                    finding.actual_value,
                    finding.required_action.as_str()
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn validation_result(
        &mut self,
        id: ValidationResultId,
    ) -> Result<Option<ValidationResult>, StoreError> {
        self.tx
            .query_row(
                "SELECT id, line_item_id, validation_type, rate_card_id, guideline_id, status, \
                 severity, message, expected_value, actual_value, required_action \
                 FROM validation_results WHERE id = ?1",
                [id.to_string()],
                row_to_validation_result,
            )
            .optional()
            .map_err(db_err)?
            .transpose()
    }

    fn insert_exception(&mut self, record: &ExceptionRecord) -> Result<(), StoreError> {
        // Every exception references a FAIL or WARNING finding.
        let referent_status: Option<String> = self
            .tx
            .query_row(
                "SELECT status FROM validation_results WHERE id = ?1",
                [record.validation_result_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        match referent_status.as_deref() {
            Some("FAIL" | "WARNING") => {}
            Some(other) => {
                return Err(StoreError::Invalid(format!(
                    "exception must reference a FAIL or WARNING result, found {other}"
                )));
            }
            None => {
                return Err(StoreError::NotFound {
                    entity: "validation result",
                    id: record.validation_result_id.to_string(),
                });
            }
        }
        self.tx
            .execute(
                "INSERT INTO exception_records (id, line_item_id, validation_result_id, status, \
                 supplier_response, supporting_doc, resolution_action, resolution_notes, \
                 resolved_at_us, resolved_by) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                exception_params(record),
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn exception(&mut self, id: ExceptionId) -> Result<Option<ExceptionRecord>, StoreError> {
        self.tx
            .query_row(
                &format!("{EXCEPTION_SELECT} WHERE id = ?1"),
                [id.to_string()],
                row_to_exception,
            )
            .optional()
            .map_err(db_err)?
            .transpose()
    }

    fn update_exception(&mut self, record: &ExceptionRecord) -> Result<(), StoreError> {
        let changed = self
            .tx
            .execute(
                "UPDATE exception_records SET line_item_id = ?2, validation_result_id = ?3, \
                 status = ?4, supplier_response = ?5, supporting_doc = ?6, \
                 resolution_action = ?7, resolution_notes = ?8, resolved_at_us = ?9, \
                 resolved_by = ?10 WHERE id = ?1",
                exception_params(record),
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(StoreError::NotFound { entity: "exception", id: record.id.to_string() });
        }
        Ok(())
    }

    fn exceptions_for_invoice(
        &mut self,
        invoice_id: InvoiceId,
    ) -> Result<Vec<ExceptionRecord>, StoreError> {
        let mut statement = self
            .tx
            .prepare(
                "SELECT e.id, e.line_item_id, e.validation_result_id, e.status, \
                 e.supplier_response, e.supporting_doc, e.resolution_action, \
                 e.resolution_notes, e.resolved_at_us, e.resolved_by \
                 FROM exception_records e \
                 JOIN line_items li ON li.id = e.line_item_id \
                 WHERE li.invoice_id = ?1 ORDER BY li.line_number, e.id",
            )
            .map_err(db_err)?;
        let rows = statement.query_map([invoice_id.to_string()], row_to_exception).map_err(db_err)?;
        collect_rows(rows)
    }

    fn insert_mapping_rule(&mut self, rule: &MappingRule) -> Result<(), StoreError> {
        self.require_taxonomy(&rule.taxonomy_code)?;
        self.tx
            .execute(
                "INSERT INTO mapping_rules (id, supplier_id, match_type, match_pattern, \
                 taxonomy_code, billing_component, confidence_weight, confidence_label, \
                 confirmed_by, version, effective_from_us, effective_to_us, \
                 supersedes_rule_id) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    rule.id.to_string(),
                    rule.supplier_id.map(|id| id.to_string()),
                    rule.match_type.as_str(),
                    rule.match_pattern,
                    rule.taxonomy_code.as_str(),
                    rule.billing_component,
                    rule.confidence_weight,
                    rule.confidence_label.as_str(),
                    rule.confirmed_by.as_str(),
                    rule.version,
                    rule.effective_from.unix_micros(),
                    rule.effective_to.map(|ts| ts.unix_micros()),
                    rule.supersedes_rule_id.map(|id| id.to_string())
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn mapping_rule(&mut self, id: MappingRuleId) -> Result<Option<MappingRule>, StoreError> {
        self.tx
            .query_row(
                &format!("{MAPPING_RULE_SELECT} WHERE id = ?1"),
                [id.to_string()],
                row_to_mapping_rule,
            )
            .optional()
            .map_err(db_err)?
            .transpose()
    }

    fn expire_mapping_rule(
        &mut self,
        id: MappingRuleId,
        at: Timestamp,
    ) -> Result<(), StoreError> {
        let changed = self
            .tx
            .execute(
                "UPDATE mapping_rules SET effective_to_us = ?2 \
                 WHERE id = ?1 AND effective_to_us IS NULL",
                params![id.to_string(), at.unix_micros()],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(StoreError::Conflict(format!(
                "mapping rule {id} is not active and cannot be expired"
            )));
        }
        Ok(())
    }

    fn effective_mapping_rules(
        &mut self,
        supplier_id: Option<SupplierId>,
        at: Timestamp,
    ) -> Result<Vec<MappingRule>, StoreError> {
        let mut statement = self
            .tx
            .prepare(&format!(
                "{MAPPING_RULE_SELECT} WHERE supplier_id IS ?1 AND effective_from_us <= ?2 \
                 AND (effective_to_us IS NULL OR effective_to_us > ?2) \
                 ORDER BY confidence_weight DESC, id"
            ))
            .map_err(db_err)?;
        let rows = statement
            .query_map(
                params![supplier_id.map(|id| id.to_string()), at.unix_micros()],
                row_to_mapping_rule,
            )
            .map_err(db_err)?;
        collect_rows(rows)
    }

    fn active_rule_for_slot(
        &mut self,
        supplier_id: Option<SupplierId>,
        match_type: MatchType,
        match_pattern: &str,
    ) -> Result<Option<MappingRule>, StoreError> {
        self.tx
            .query_row(
                &format!(
                    "{MAPPING_RULE_SELECT} WHERE supplier_id IS ?1 AND match_type = ?2 \
                     AND match_pattern = ?3 AND effective_to_us IS NULL"
                ),
                params![supplier_id.map(|id| id.to_string()), match_type.as_str(), match_pattern],
                row_to_mapping_rule,
            )
            .optional()
            .map_err(db_err)?
            .transpose()
    }

    fn append_audit_event(&mut self, event: &NewAuditEvent) -> Result<(), StoreError> {
        let (created_at_us, seq) = self.next_audit_stamp()?;
        self.tx
            .execute(
                "INSERT INTO audit_events (id, entity_type, entity_id, event_type, actor_type, \
                 actor_id, payload, created_at_us, seq) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    AuditEventId::generate().to_string(),
                    event.entity_type.as_str(),
                    event.entity_id.to_string(),
                    event.event_type,
                    event.actor_type.as_str(),
                    event.actor_id.map(|id| id.to_string()),
                    event.payload.to_string(),
                    created_at_us,
                    seq
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn audit_events_for_entity(
        &mut self,
        entity_type: AuditEntityType,
        entity_id: Uuid,
    ) -> Result<Vec<AuditEvent>, StoreError> {
        let mut statement = self
            .tx
            .prepare(
                "SELECT id, entity_type, entity_id, event_type, actor_type, actor_id, payload, \
                 created_at_us, seq FROM audit_events \
                 WHERE entity_type = ?1 AND entity_id = ?2 ORDER BY created_at_us, seq",
            )
            .map_err(db_err)?;
        let rows = statement
            .query_map(params![entity_type.as_str(), entity_id.to_string()], row_to_audit_event)
            .map_err(db_err)?;
        collect_rows(rows)
    }

    fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().map_err(db_err)
    }
}

impl SqliteTxn<'_> {
    /// Verifies a taxonomy code exists before a referencing write.
    fn require_taxonomy(&self, code: &TaxonomyCode) -> Result<(), StoreError> {
        let exists: Option<i64> = self
            .tx
            .query_row("SELECT 1 FROM taxonomy_items WHERE code = ?1", [code.as_str()], |row| {
                row.get(0)
            })
            .optional()
            .map_err(db_err)?;
        if exists.is_none() {
            return Err(StoreError::Invalid(format!("unknown taxonomy code: {code}")));
        }
        Ok(())
    }

    /// Assigns the next `(created_at_us, seq)` audit stamp.
    ///
    /// The stamp never regresses: when the wall clock reads earlier than the
    /// latest persisted stamp (including rows written earlier in this
    /// transaction), the latest stamp is reused and the sequence advances.
    fn next_audit_stamp(&self) -> Result<(i64, i64), StoreError> {
        let wall_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| i64::try_from(elapsed.as_micros()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        let latest: Option<i64> = self
            .tx
            .query_row("SELECT MAX(created_at_us) FROM audit_events", [], |row| row.get(0))
            .map_err(db_err)?;
        let created_at_us = latest.map_or(wall_us, |latest| wall_us.max(latest));
        let seq: i64 = self
            .tx
            .query_row(
                "SELECT COALESCE(MAX(seq) + 1, 0) FROM audit_events WHERE created_at_us = ?1",
                [created_at_us],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok((created_at_us, seq))
    }
}

// ============================================================================
// SECTION: Value Mapping
// ============================================================================

/// Maps a rusqlite error into a store error.
fn db_err(err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::Conflict(err.to_string())
        }
        _ => StoreError::Store(err.to_string()),
    }
}

/// Collects mapped rows, flattening the nested results.
fn collect_rows<T>(
    rows: impl Iterator<Item = Result<Result<T, StoreError>, rusqlite::Error>>,
) -> Result<Vec<T>, StoreError> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(db_err)??);
    }
    Ok(out)
}

/// Renders a calendar date as ISO text.
fn date_text(date: Date) -> String {
    let format = format_description!("[year]-[month]-[day]");
    date.format(format).unwrap_or_default()
}

/// Parses ISO date text.
fn parse_date(text: &str) -> Result<Date, StoreError> {
    let format = format_description!("[year]-[month]-[day]");
    Date::parse(text, format)
        .map_err(|err| StoreError::Invalid(format!("invalid stored date {text:?}: {err}")))
}

/// Parses stored decimal text.
fn parse_decimal(text: &str) -> Result<BigDecimal, StoreError> {
    BigDecimal::from_str(text)
        .map_err(|err| StoreError::Invalid(format!("invalid stored decimal {text:?}: {err}")))
}

/// Parses a stored UUID.
fn parse_uuid(text: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(text)
        .map_err(|err| StoreError::Invalid(format!("invalid stored id {text:?}: {err}")))
}

/// Parses a stored closed-enumeration value.
fn parse_variant<T>(text: &str) -> Result<T, StoreError>
where
    T: FromStr<Err = clearbill_core::UnknownVariant>,
{
    text.parse().map_err(|err: clearbill_core::UnknownVariant| StoreError::Invalid(err.to_string()))
}

/// Converts stored unix microseconds into a timestamp.
fn parse_micros(micros: i64) -> Result<Timestamp, StoreError> {
    Timestamp::from_unix_micros(micros)
        .ok_or_else(|| StoreError::Invalid(format!("invalid stored timestamp: {micros}")))
}

/// Renders a geography scope as stored text.
const fn geography_text(scope: GeographyScope) -> &'static str {
    match scope {
        GeographyScope::National => "national",
        GeographyScope::State => "state",
        GeographyScope::Regional => "regional",
    }
}

/// Parses a stored geography scope.
fn parse_geography(text: &str) -> Result<GeographyScope, StoreError> {
    match text {
        "national" => Ok(GeographyScope::National),
        "state" => Ok(GeographyScope::State),
        "regional" => Ok(GeographyScope::Regional),
        other => Err(StoreError::Invalid(format!("unknown geography_scope value: {other:?}"))),
    }
}

/// Renders a unit model as stored text.
const fn unit_model_text(model: UnitModel) -> &'static str {
    match model {
        UnitModel::PerReport => "per_report",
        UnitModel::Actual => "actual",
        UnitModel::PerNight => "per_night",
        UnitModel::PerDiem => "per_diem",
        UnitModel::PerMile => "per_mile",
        UnitModel::PerFile => "per_file",
        UnitModel::PerHour => "per_hour",
        UnitModel::PerOccurrence => "per_occurrence",
        UnitModel::PerRequest => "per_request",
        UnitModel::PerPage => "per_page",
        UnitModel::FlatFee => "flat_fee",
    }
}

/// Parses a stored unit model.
fn parse_unit_model(text: &str) -> Result<UnitModel, StoreError> {
    match text {
        "per_report" => Ok(UnitModel::PerReport),
        "actual" => Ok(UnitModel::Actual),
        "per_night" => Ok(UnitModel::PerNight),
        "per_diem" => Ok(UnitModel::PerDiem),
        "per_mile" => Ok(UnitModel::PerMile),
        "per_file" => Ok(UnitModel::PerFile),
        "per_hour" => Ok(UnitModel::PerHour),
        "per_occurrence" => Ok(UnitModel::PerOccurrence),
        "per_request" => Ok(UnitModel::PerRequest),
        "per_page" => Ok(UnitModel::PerPage),
        "flat_fee" => Ok(UnitModel::FlatFee),
        other => Err(StoreError::Invalid(format!("unknown unit_model value: {other:?}"))),
    }
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Shared line item column list.
const LINE_ITEM_SELECT: &str = "SELECT id, invoice_id, invoice_version, line_number, status, \
     raw_description, raw_code, raw_amount, raw_quantity, raw_unit, claim_number, \
     service_date, taxonomy_code, billing_component, mapping_confidence, mapping_rule_id, \
     mapped_rate, expected_amount, ai_assessment FROM line_items";

/// Shared exception column list.
const EXCEPTION_SELECT: &str = "SELECT id, line_item_id, validation_result_id, status, \
     supplier_response, supporting_doc, resolution_action, resolution_notes, resolved_at_us, \
     resolved_by FROM exception_records";

/// Shared mapping rule column list.
const MAPPING_RULE_SELECT: &str = "SELECT id, supplier_id, match_type, match_pattern, \
     taxonomy_code, billing_component, confidence_weight, confidence_label, confirmed_by, \
     version, effective_from_us, effective_to_us, supersedes_rule_id FROM mapping_rules";

/// Maps a contract row.
fn row_to_contract(row: &Row<'_>) -> rusqlite::Result<Result<Contract, StoreError>> {
    let id: String = row.get(0)?;
    let supplier_id: String = row.get(1)?;
    let carrier_id: String = row.get(2)?;
    let name: String = row.get(3)?;
    let effective_from: String = row.get(4)?;
    let effective_to: Option<String> = row.get(5)?;
    let geography_scope: String = row.get(6)?;
    let state_codes: Option<String> = row.get(7)?;
    let active: i64 = row.get(8)?;
    Ok((|| {
        Ok(Contract {
            id: ContractId::new(parse_uuid(&id)?),
            supplier_id: SupplierId::new(parse_uuid(&supplier_id)?),
            carrier_id: CarrierId::new(parse_uuid(&carrier_id)?),
            name,
            effective_from: parse_date(&effective_from)?,
            effective_to: effective_to.as_deref().map(parse_date).transpose()?,
            geography_scope: parse_geography(&geography_scope)?,
            state_codes: state_codes
                .as_deref()
                .map(|codes| {
                    serde_json::from_str(codes).map_err(|err| {
                        StoreError::Invalid(format!("invalid stored state_codes: {err}"))
                    })
                })
                .transpose()?,
            active: active != 0,
        })
    })())
}

/// Maps a rate card row.
fn row_to_rate_card(row: &Row<'_>) -> rusqlite::Result<Result<RateCard, StoreError>> {
    let id: String = row.get(0)?;
    let contract_id: String = row.get(1)?;
    let taxonomy_code: String = row.get(2)?;
    let contracted_rate: String = row.get(3)?;
    let max_units: Option<String> = row.get(4)?;
    let is_all_inclusive: i64 = row.get(5)?;
    let effective_from: String = row.get(6)?;
    let effective_to: Option<String> = row.get(7)?;
    Ok((|| {
        Ok(RateCard {
            id: RateCardId::new(parse_uuid(&id)?),
            contract_id: ContractId::new(parse_uuid(&contract_id)?),
            taxonomy_code: TaxonomyCode::new(taxonomy_code),
            contracted_rate: parse_decimal(&contracted_rate)?,
            max_units: max_units.as_deref().map(parse_decimal).transpose()?,
            is_all_inclusive: is_all_inclusive != 0,
            effective_from: parse_date(&effective_from)?,
            effective_to: effective_to.as_deref().map(parse_date).transpose()?,
        })
    })())
}

/// Maps a guideline row.
fn row_to_guideline(row: &Row<'_>) -> rusqlite::Result<Result<Guideline, StoreError>> {
    let id: String = row.get(0)?;
    let contract_id: String = row.get(1)?;
    let taxonomy_code: Option<String> = row.get(2)?;
    let domain: Option<String> = row.get(3)?;
    let rule_type: String = row.get(4)?;
    let rule_params: String = row.get(5)?;
    let severity: String = row.get(6)?;
    let narrative_source: Option<String> = row.get(7)?;
    let active: i64 = row.get(8)?;
    Ok((|| {
        Ok(Guideline {
            id: GuidelineId::new(parse_uuid(&id)?),
            contract_id: ContractId::new(parse_uuid(&contract_id)?),
            taxonomy_code: taxonomy_code.map(TaxonomyCode::new),
            domain,
            rule_type,
            rule_params: serde_json::from_str(&rule_params).map_err(|err| {
                StoreError::Invalid(format!("invalid stored rule_params: {err}"))
            })?,
            severity: parse_variant::<ValidationSeverity>(&severity)?,
            narrative_source,
            active: active != 0,
        })
    })())
}

/// Maps a taxonomy item row.
fn row_to_taxonomy_item(row: &Row<'_>) -> rusqlite::Result<Result<TaxonomyItem, StoreError>> {
    let code: String = row.get(0)?;
    let domain: String = row.get(1)?;
    let service_item: String = row.get(2)?;
    let billing_component: String = row.get(3)?;
    let unit_model: String = row.get(4)?;
    let label: String = row.get(5)?;
    let description: String = row.get(6)?;
    let active: i64 = row.get(7)?;
    Ok((|| {
        Ok(TaxonomyItem {
            code: TaxonomyCode::new(code),
            domain,
            service_item,
            billing_component,
            unit_model: parse_unit_model(&unit_model)?,
            label,
            description,
            active: active != 0,
        })
    })())
}

/// Maps an invoice row.
fn row_to_invoice(row: &Row<'_>) -> rusqlite::Result<Result<Invoice, StoreError>> {
    let id: String = row.get(0)?;
    let supplier_id: String = row.get(1)?;
    let contract_id: String = row.get(2)?;
    let invoice_number: String = row.get(3)?;
    let invoice_date: String = row.get(4)?;
    let status: String = row.get(5)?;
    let current_version: i64 = row.get(6)?;
    let file_pointer: Option<String> = row.get(7)?;
    let file_format: Option<String> = row.get(8)?;
    let submitted_at_us: Option<i64> = row.get(9)?;
    let submission_notes: Option<String> = row.get(10)?;
    Ok((|| {
        Ok(Invoice {
            id: InvoiceId::new(parse_uuid(&id)?),
            supplier_id: SupplierId::new(parse_uuid(&supplier_id)?),
            contract_id: ContractId::new(parse_uuid(&contract_id)?),
            invoice_number,
            invoice_date: parse_date(&invoice_date)?,
            status: parse_variant::<InvoiceStatus>(&status)?,
            current_version,
            file_pointer,
            file_format: file_format.as_deref().map(parse_variant::<FileFormat>).transpose()?,
            submitted_at: submitted_at_us.map(parse_micros).transpose()?,
            submission_notes,
        })
    })())
}

/// Maps an invoice version row.
fn row_to_invoice_version(row: &Row<'_>) -> rusqlite::Result<Result<InvoiceVersion, StoreError>> {
    let id: String = row.get(0)?;
    let invoice_id: String = row.get(1)?;
    let version_number: i64 = row.get(2)?;
    let file_pointer: String = row.get(3)?;
    let file_format: String = row.get(4)?;
    let submitted_at_us: i64 = row.get(5)?;
    let notes: Option<String> = row.get(6)?;
    Ok((|| {
        Ok(InvoiceVersion {
            id: InvoiceVersionId::new(parse_uuid(&id)?),
            invoice_id: InvoiceId::new(parse_uuid(&invoice_id)?),
            version_number,
            file_pointer,
            file_format: parse_variant::<FileFormat>(&file_format)?,
            submitted_at: parse_micros(submitted_at_us)?,
            notes,
        })
    })())
}

/// Builds the 19-value parameter list shared by line item insert and update.
fn line_params(line: &LineItem) -> [Box<dyn rusqlite::ToSql>; 19] {
    [
        Box::new(line.id.to_string()),
        Box::new(line.invoice_id.to_string()),
        Box::new(line.invoice_version),
        Box::new(line.line_number),
        Box::new(line.status.as_str()),
        Box::new(line.raw_description.clone()),
        Box::new(line.raw_code.clone()),
        Box::new(line.raw_amount.to_string()),
        Box::new(line.raw_quantity.to_string()),
        Box::new(line.raw_unit.clone()),
        Box::new(line.claim_number.clone()),
        Box::new(line.service_date.map(date_text)),
        Box::new(line.taxonomy_code.as_ref().map(|code| code.as_str().to_owned())),
        Box::new(line.billing_component.clone()),
        Box::new(line.mapping_confidence.map(|label| label.as_str())),
        Box::new(line.mapping_rule_id.map(|id| id.to_string())),
        Box::new(line.mapped_rate.as_ref().map(ToString::to_string)),
        Box::new(line.expected_amount.as_ref().map(ToString::to_string)),
        Box::new(line.ai_assessment.as_ref().map(ToString::to_string)),
    ]
}

/// Maps a line item row.
fn row_to_line_item(row: &Row<'_>) -> rusqlite::Result<Result<LineItem, StoreError>> {
    let id: String = row.get(0)?;
    let invoice_id: String = row.get(1)?;
    let invoice_version: i64 = row.get(2)?;
    let line_number: i64 = row.get(3)?;
    let status: String = row.get(4)?;
    let raw_description: String = row.get(5)?;
    let raw_code: Option<String> = row.get(6)?;
    let raw_amount: String = row.get(7)?;
    let raw_quantity: String = row.get(8)?;
    let raw_unit: Option<String> = row.get(9)?;
    let claim_number: Option<String> = row.get(10)?;
    let service_date: Option<String> = row.get(11)?;
    let taxonomy_code: Option<String> = row.get(12)?;
    let billing_component: Option<String> = row.get(13)?;
    let mapping_confidence: Option<String> = row.get(14)?;
    let mapping_rule_id: Option<String> = row.get(15)?;
    let mapped_rate: Option<String> = row.get(16)?;
    let expected_amount: Option<String> = row.get(17)?;
    let ai_assessment: Option<String> = row.get(18)?;
    Ok((|| {
        Ok(LineItem {
            id: LineItemId::new(parse_uuid(&id)?),
            invoice_id: InvoiceId::new(parse_uuid(&invoice_id)?),
            invoice_version,
            line_number,
            status: parse_variant::<LineItemStatus>(&status)?,
            raw_description,
            raw_code,
            raw_amount: parse_decimal(&raw_amount)?,
            raw_quantity: parse_decimal(&raw_quantity)?,
            raw_unit,
            claim_number,
            service_date: service_date.as_deref().map(parse_date).transpose()?,
            taxonomy_code: taxonomy_code.map(TaxonomyCode::new),
            billing_component,
            mapping_confidence: mapping_confidence
                .as_deref()
                .map(parse_variant::<ConfidenceLabel>)
                .transpose()?,
            mapping_rule_id: mapping_rule_id
                .as_deref()
                .map(|text| Ok::<_, StoreError>(MappingRuleId::new(parse_uuid(text)?)))
                .transpose()?,
            mapped_rate: mapped_rate.as_deref().map(parse_decimal).transpose()?,
            expected_amount: expected_amount.as_deref().map(parse_decimal).transpose()?,
            ai_assessment: ai_assessment
                .as_deref()
                .map(|text| {
                    serde_json::from_str(text).map_err(|err| {
                        StoreError::Invalid(format!("invalid stored ai_assessment: {err}"))
                    })
                })
                .transpose()?,
        })
    })())
}

/// Maps a validation result row.
fn row_to_validation_result(
    row: &Row<'_>,
) -> rusqlite::Result<Result<ValidationResult, StoreError>> {
    let id: String = row.get(0)?;
    let line_item_id: String = row.get(1)?;
    let validation_type: String = row.get(2)?;
    let rate_card_id: Option<String> = row.get(3)?;
    let guideline_id: Option<String> = row.get(4)?;
    let status: String = row.get(5)?;
    let severity: String = row.get(6)?;
    let message: String = row.get(7)?;
    let expected_value: Option<String> = row.get(8)?;
    let actual_value: Option<String> = row.get(9)?;
    let required_action: String = row.get(10)?;
    Ok((|| {
        Ok(ValidationResult {
            id: ValidationResultId::new(parse_uuid(&id)?),
            line_item_id: LineItemId::new(parse_uuid(&line_item_id)?),
            finding: Finding {
                validation_type: parse_variant::<ValidationType>(&validation_type)?,
                rate_card_id: rate_card_id
                    .as_deref()
                    .map(|text| Ok::<_, StoreError>(RateCardId::new(parse_uuid(text)?)))
                    .transpose()?,
                guideline_id: guideline_id
                    .as_deref()
                    .map(|text| Ok::<_, StoreError>(GuidelineId::new(parse_uuid(text)?)))
                    .transpose()?,
                status: parse_variant::<ValidationStatus>(&status)?,
                severity: parse_variant::<ValidationSeverity>(&severity)?,
                message,
                expected_value,
                actual_value,
                required_action: parse_variant::<RequiredAction>(&required_action)?,
            },
        })
    })())
}

/// Builds the 10-value parameter list shared by exception insert and update.
fn exception_params(record: &ExceptionRecord) -> [Box<dyn rusqlite::ToSql>; 10] {
    [
        Box::new(record.id.to_string()),
        Box::new(record.line_item_id.to_string()),
        Box::new(record.validation_result_id.to_string()),
        Box::new(record.status.as_str()),
        Box::new(record.supplier_response.clone()),
        Box::new(record.supporting_doc.clone()),
        Box::new(record.resolution_action.map(|action| action.as_str())),
        Box::new(record.resolution_notes.clone()),
        Box::new(record.resolved_at.map(|ts| ts.unix_micros())),
        Box::new(record.resolved_by.map(|id| id.to_string())),
    ]
}

/// Maps an exception row.
fn row_to_exception(row: &Row<'_>) -> rusqlite::Result<Result<ExceptionRecord, StoreError>> {
    let id: String = row.get(0)?;
    let line_item_id: String = row.get(1)?;
    let validation_result_id: String = row.get(2)?;
    let status: String = row.get(3)?;
    let supplier_response: Option<String> = row.get(4)?;
    let supporting_doc: Option<String> = row.get(5)?;
    let resolution_action: Option<String> = row.get(6)?;
    let resolution_notes: Option<String> = row.get(7)?;
    let resolved_at_us: Option<i64> = row.get(8)?;
    let resolved_by: Option<String> = row.get(9)?;
    Ok((|| {
        Ok(ExceptionRecord {
            id: ExceptionId::new(parse_uuid(&id)?),
            line_item_id: LineItemId::new(parse_uuid(&line_item_id)?),
            validation_result_id: ValidationResultId::new(parse_uuid(&validation_result_id)?),
            status: parse_variant::<ExceptionStatus>(&status)?,
            supplier_response,
            supporting_doc,
            resolution_action: resolution_action
                .as_deref()
                .map(parse_variant::<ResolutionAction>)
                .transpose()?,
            resolution_notes,
            resolved_at: resolved_at_us.map(parse_micros).transpose()?,
            resolved_by: resolved_by
                .as_deref()
                .map(|text| Ok::<_, StoreError>(ActorId::new(parse_uuid(text)?)))
                .transpose()?,
        })
    })())
}

/// Maps a mapping rule row.
fn row_to_mapping_rule(row: &Row<'_>) -> rusqlite::Result<Result<MappingRule, StoreError>> {
    let id: String = row.get(0)?;
    let supplier_id: Option<String> = row.get(1)?;
    let match_type: String = row.get(2)?;
    let match_pattern: String = row.get(3)?;
    let taxonomy_code: String = row.get(4)?;
    let billing_component: String = row.get(5)?;
    let confidence_weight: f64 = row.get(6)?;
    let confidence_label: String = row.get(7)?;
    let confirmed_by: String = row.get(8)?;
    let version: i64 = row.get(9)?;
    let effective_from_us: i64 = row.get(10)?;
    let effective_to_us: Option<i64> = row.get(11)?;
    let supersedes_rule_id: Option<String> = row.get(12)?;
    Ok((|| {
        Ok(MappingRule {
            id: MappingRuleId::new(parse_uuid(&id)?),
            supplier_id: supplier_id
                .as_deref()
                .map(|text| Ok::<_, StoreError>(SupplierId::new(parse_uuid(text)?)))
                .transpose()?,
            match_type: parse_variant::<MatchType>(&match_type)?,
            match_pattern,
            taxonomy_code: TaxonomyCode::new(taxonomy_code),
            billing_component,
            confidence_weight,
            confidence_label: parse_variant::<ConfidenceLabel>(&confidence_label)?,
            confirmed_by: parse_variant::<ConfirmedBy>(&confirmed_by)?,
            version,
            effective_from: parse_micros(effective_from_us)?,
            effective_to: effective_to_us.map(parse_micros).transpose()?,
            supersedes_rule_id: supersedes_rule_id
                .as_deref()
                .map(|text| Ok::<_, StoreError>(MappingRuleId::new(parse_uuid(text)?)))
                .transpose()?,
        })
    })())
}

/// Maps an audit event row.
fn row_to_audit_event(row: &Row<'_>) -> rusqlite::Result<Result<AuditEvent, StoreError>> {
    let id: String = row.get(0)?;
    let entity_type: String = row.get(1)?;
    let entity_id: String = row.get(2)?;
    let event_type: String = row.get(3)?;
    let actor_type: String = row.get(4)?;
    let actor_id: Option<String> = row.get(5)?;
    let payload: String = row.get(6)?;
    let created_at_us: i64 = row.get(7)?;
    let seq: i64 = row.get(8)?;
    Ok((|| {
        Ok(AuditEvent {
            id: AuditEventId::new(parse_uuid(&id)?),
            entity_type: parse_variant::<AuditEntityType>(&entity_type)?,
            entity_id: parse_uuid(&entity_id)?,
            event_type,
            actor_type: parse_variant::<clearbill_core::ActorType>(&actor_type)?,
            actor_id: actor_id
                .as_deref()
                .map(|text| Ok::<_, StoreError>(ActorId::new(parse_uuid(text)?)))
                .transpose()?,
            payload: serde_json::from_str(&payload)
                .map_err(|err| StoreError::Invalid(format!("invalid stored payload: {err}")))?,
            created_at: parse_micros(created_at_us)?,
            seq,
        })
    })())
}
