// crates/clearbill-cli/src/main.rs
// ============================================================================
// Module: Clearbill CLI Entry Point
// Description: Operator commands for seeding, processing, and export.
// Purpose: Drive the invoice pipeline and resolution workflow locally.
// Dependencies: clap, clearbill-core, clearbill-store-sqlite, toml, tracing-subscriber
// ============================================================================

//! ## Overview
//! The Clearbill CLI exercises the platform end to end against a local
//! SQLite store: seed the taxonomy and a demo contract, process a supplier
//! CSV through the pipeline, approve the invoice as the carrier, and export
//! approved lines for the AP system. The CLI fabricates actor identities;
//! production hosts supply authenticated ones.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use clap::Parser;
use clap::Subcommand;
use clearbill_core::Actor;
use clearbill_core::ActorId;
use clearbill_core::Carrier;
use clearbill_core::CarrierId;
use clearbill_core::Contract;
use clearbill_core::ContractId;
use clearbill_core::FileStorage;
use clearbill_core::GeographyScope;
use clearbill_core::Guideline;
use clearbill_core::GuidelineId;
use clearbill_core::InvoiceId;
use clearbill_core::RateCard;
use clearbill_core::RateCardId;
use clearbill_core::StorageError;
use clearbill_core::StoreTxn;
use clearbill_core::Supplier;
use clearbill_core::SupplierId;
use clearbill_core::TaxonomyCode;
use clearbill_core::Timestamp;
use clearbill_core::ValidationSeverity;
use clearbill_core::runtime;
use clearbill_store_sqlite::SqliteInvoiceStore;
use clearbill_store_sqlite::SqliteStoreConfig;
use clearbill_store_sqlite::SqliteStoreMode;
use clearbill_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use time::Date;
use time::OffsetDateTime;
use time::macros::format_description;
use uuid::Uuid;

// ============================================================================
// SECTION: CLI Definition
// ============================================================================

/// Clearbill operator CLI.
#[derive(Debug, Parser)]
#[command(name = "clearbill", version, about = "Clearbill invoice validation platform")]
struct Cli {
    /// Optional TOML configuration file.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// SQLite database path (overrides the config file).
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,
    /// Directory for retained invoice files (overrides the config file).
    #[arg(long, global = true, value_name = "DIR")]
    files: Option<PathBuf>,
    /// Command to execute.
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Seed the canonical taxonomy plus a demo carrier, supplier, and
    /// contract with rate cards and guidelines.
    Seed,
    /// Create an invoice, upload a file, and run the pipeline.
    Process {
        /// Contract to bill under.
        #[arg(long, value_name = "UUID")]
        contract: Uuid,
        /// Supplier's invoice number.
        #[arg(long, value_name = "NUMBER")]
        invoice_number: String,
        /// Invoice date (YYYY-MM-DD); defaults to today.
        #[arg(long, value_name = "DATE")]
        invoice_date: Option<String>,
        /// Invoice file to upload (.csv/.tsv).
        #[arg(long, value_name = "PATH")]
        file: PathBuf,
    },
    /// Approve an invoice as the carrier, waiving open exceptions.
    Approve {
        /// Invoice to approve.
        #[arg(long, value_name = "UUID")]
        invoice: Uuid,
        /// Optional approval notes.
        #[arg(long, value_name = "TEXT")]
        notes: Option<String>,
    },
    /// Export an approved invoice's lines as CSV.
    Export {
        /// Invoice to export.
        #[arg(long, value_name = "UUID")]
        invoice: Uuid,
        /// Output path; stdout when omitted.
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
    },
    /// Show the validation summary and audit trail length for an invoice.
    Status {
        /// Invoice to inspect.
        #[arg(long, value_name = "UUID")]
        invoice: Uuid,
    },
}

// ============================================================================
// SECTION: Config
// ============================================================================

/// TOML configuration file shape.
#[derive(Debug, Clone, Deserialize)]
struct CliConfig {
    /// Directory for retained invoice files.
    #[serde(default = "default_files_dir")]
    files_dir: PathBuf,
    /// Store configuration.
    store: SqliteStoreConfig,
}

/// Returns the default retained-files directory.
fn default_files_dir() -> PathBuf {
    PathBuf::from("clearbill-files")
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            files_dir: default_files_dir(),
            store: SqliteStoreConfig {
                path: PathBuf::from("clearbill.db"),
                busy_timeout_ms: 5_000,
                journal_mode: SqliteStoreMode::default(),
                sync_mode: SqliteSyncMode::default(),
            },
        }
    }
}

/// Resolves configuration from file and flag overrides.
fn resolve_config(cli: &Cli) -> Result<CliConfig, CliError> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .map_err(|err| CliError(format!("cannot read config {}: {err}", path.display())))?;
            toml::from_str(&text)
                .map_err(|err| CliError(format!("invalid config {}: {err}", path.display())))?
        }
        None => CliConfig::default(),
    };
    if let Some(db) = &cli.db {
        config.store.path.clone_from(db);
    }
    if let Some(files) = &cli.files {
        config.files_dir.clone_from(files);
    }
    Ok(config)
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI failure with a user-facing message.
#[derive(Debug, Error)]
#[error("{0}")]
struct CliError(String);

impl From<clearbill_core::PipelineError> for CliError {
    fn from(err: clearbill_core::PipelineError) -> Self {
        Self(err.to_string())
    }
}

impl From<clearbill_core::StoreError> for CliError {
    fn from(err: clearbill_core::StoreError) -> Self {
        Self(err.to_string())
    }
}

// ============================================================================
// SECTION: File Storage
// ============================================================================

/// Filesystem-backed storage for retained invoice files.
struct FsStorage {
    /// Root directory for stored files.
    root: PathBuf,
}

impl FileStorage for FsStorage {
    fn save(&mut self, key: &str, data: &[u8]) -> Result<String, StorageError> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| StorageError::Backend(err.to_string()))?;
        }
        fs::write(&path, data).map_err(|err| StorageError::Backend(err.to_string()))?;
        Ok(path.to_string_lossy().into_owned())
    }

    fn load(&self, pointer: &str) -> Result<Vec<u8>, StorageError> {
        fs::read(pointer).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(pointer.to_owned()),
            _ => StorageError::Backend(err.to_string()),
        })
    }
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Binary entry point: install tracing, dispatch, report failures on stderr.
fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(code) => code,
        Err(err) => {
            let _ = write_stderr_line(&format!("error: {err}"));
            ExitCode::FAILURE
        }
    }
}

/// Executes the CLI command dispatcher.
fn run() -> Result<ExitCode, CliError> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    let mut store = SqliteInvoiceStore::open(&config.store)?;
    let mut storage = FsStorage { root: config.files_dir.clone() };
    let now = Timestamp::new(OffsetDateTime::now_utc());

    match &cli.command {
        Command::Seed => run_seed(&mut store),
        Command::Process { contract, invoice_number, invoice_date, file } => run_process(
            &mut store,
            &mut storage,
            ContractId::new(*contract),
            invoice_number,
            invoice_date.as_deref(),
            file,
            now,
        ),
        Command::Approve { invoice, notes } => {
            run_approve(&mut store, InvoiceId::new(*invoice), notes.as_deref(), now)
        }
        Command::Export { invoice, out } => {
            run_export(&mut store, InvoiceId::new(*invoice), out.as_deref())
        }
        Command::Status { invoice } => run_status(&mut store, InvoiceId::new(*invoice)),
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Seeds the taxonomy and a demo contract.
fn run_seed(store: &mut SqliteInvoiceStore) -> Result<ExitCode, CliError> {
    let outcome = runtime::with_txn(store, |txn| {
        let seeded = runtime::seed_taxonomy(txn)?;

        let carrier = Carrier {
            id: CarrierId::generate(),
            name: "Acme Insurance Group".to_owned(),
            short_code: "ACME".to_owned(),
            active: true,
        };
        txn.insert_carrier(&carrier)?;

        let supplier = Supplier {
            id: SupplierId::generate(),
            name: "Meridian IME Services".to_owned(),
            tax_id: Some("84-1234567".to_owned()),
            active: true,
        };
        txn.insert_supplier(&supplier)?;

        let contract = Contract {
            id: ContractId::generate(),
            supplier_id: supplier.id,
            carrier_id: carrier.id,
            name: "Acme IME Services Agreement 2025".to_owned(),
            effective_from: time::macros::date!(2025 - 01 - 01),
            effective_to: None,
            geography_scope: GeographyScope::National,
            state_codes: None,
            active: true,
        };
        txn.insert_contract(&contract)?;

        for (code, rate, max_units, all_inclusive) in [
            ("IME.PHY_EXAM.PROF_FEE", "600.00", None, false),
            ("IME.PHY_EXAM.MILEAGE", "0.67", None, false),
            ("IME.PHY_EXAM.TRAVEL_LODGING", "200.00", Some("1"), false),
            ("IME.ADDENDUM.PROF_FEE", "150.00", None, false),
            ("IME.NO_SHOW.NO_SHOW_FEE", "300.00", None, false),
            ("IME.RECORDS_REVIEW.PROF_FEE", "450.00", None, false),
        ] {
            txn.insert_rate_card(&RateCard {
                id: RateCardId::generate(),
                contract_id: contract.id,
                taxonomy_code: TaxonomyCode::new(code),
                contracted_rate: parse_decimal_literal(rate)?,
                max_units: max_units.map(parse_decimal_literal).transpose()?,
                is_all_inclusive: all_inclusive,
                effective_from: contract.effective_from,
                effective_to: None,
            })?;
        }

        txn.insert_guideline(&Guideline {
            id: GuidelineId::generate(),
            contract_id: contract.id,
            taxonomy_code: Some(TaxonomyCode::new("IME.PHY_EXAM.TRAVEL_TRANSPORT")),
            domain: None,
            rule_type: "cap_amount".to_owned(),
            rule_params: json!({ "max_amount": "400.00" }),
            severity: ValidationSeverity::Error,
            narrative_source: Some("Airfare reimbursement capped at $400 per exam".to_owned()),
            active: true,
        })?;
        txn.insert_guideline(&Guideline {
            id: GuidelineId::generate(),
            contract_id: contract.id,
            taxonomy_code: None,
            domain: Some("IME".to_owned()),
            rule_type: "billing_increment".to_owned(),
            rule_params: json!({ "min_increment": "0.25", "unit": "hour" }),
            severity: ValidationSeverity::Error,
            narrative_source: Some(
                "Hourly services are billed in quarter-hour increments".to_owned(),
            ),
            active: true,
        })?;

        Ok((seeded, carrier.id, supplier.id, contract.id))
    })?;

    let (seeded, carrier_id, supplier_id, contract_id) = outcome;
    write_stdout_line(&format!("seeded {seeded} taxonomy items"))?;
    write_stdout_line(&format!("carrier:  {carrier_id}"))?;
    write_stdout_line(&format!("supplier: {supplier_id}"))?;
    write_stdout_line(&format!("contract: {contract_id}"))?;
    Ok(ExitCode::SUCCESS)
}

/// Creates an invoice, uploads the file, and runs the pipeline.
fn run_process(
    store: &mut SqliteInvoiceStore,
    storage: &mut FsStorage,
    contract_id: ContractId,
    invoice_number: &str,
    invoice_date: Option<&str>,
    file: &Path,
    now: Timestamp,
) -> Result<ExitCode, CliError> {
    let bytes =
        fs::read(file).map_err(|err| CliError(format!("cannot read {}: {err}", file.display())))?;
    let filename = file
        .file_name()
        .map_or_else(|| "invoice.csv".to_owned(), |name| name.to_string_lossy().into_owned());
    let invoice_date = match invoice_date {
        Some(text) => parse_cli_date(text)?,
        None => now.date(),
    };

    let (summary, version) = runtime::with_txn(store, |txn| {
        let contract = txn.contract(contract_id)?.ok_or_else(|| {
            clearbill_core::PipelineError::NotFound {
                entity: "contract",
                id: contract_id.to_string(),
            }
        })?;
        let actor = Actor::Supplier {
            actor_id: ActorId::generate(),
            supplier_id: contract.supplier_id,
        };
        let invoice = runtime::create_invoice(
            txn,
            actor,
            contract_id,
            invoice_number,
            invoice_date,
            None,
        )?;
        runtime::upload(txn, storage, actor, invoice.id, &bytes, &filename, now, None)
    })?;

    write_stdout_line(&format!("invoice:  {}", summary.invoice_id))?;
    write_stdout_line(&format!("version:  {version}"))?;
    write_stdout_line(&format!("status:   {}", summary.status))?;
    write_stdout_line(&format!(
        "lines:    {} processed, {} clean, {} exceptions, {} warnings",
        summary.lines_processed, summary.lines_pass, summary.lines_error, summary.lines_warning
    ))?;
    for warning in &summary.parse_warnings {
        write_stdout_line(&format!("warning:  {warning}"))?;
    }
    if let Some(error) = &summary.error {
        write_stdout_line(&format!("error:    {error}"))?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Approves an invoice as its carrier.
fn run_approve(
    store: &mut SqliteInvoiceStore,
    invoice_id: InvoiceId,
    notes: Option<&str>,
    now: Timestamp,
) -> Result<ExitCode, CliError> {
    runtime::with_txn(store, |txn| {
        let actor = carrier_actor(txn, invoice_id)?;
        runtime::approve_invoice(txn, actor, invoice_id, notes, now)
    })?;
    write_stdout_line(&format!("invoice {invoice_id} approved"))?;
    Ok(ExitCode::SUCCESS)
}

/// Exports an approved invoice's lines as CSV.
fn run_export(
    store: &mut SqliteInvoiceStore,
    invoice_id: InvoiceId,
    out: Option<&Path>,
) -> Result<ExitCode, CliError> {
    let rendered = runtime::with_txn(store, |txn| {
        let actor = carrier_actor(txn, invoice_id)?;
        runtime::export_invoice(txn, actor, invoice_id)
    })?;
    match out {
        Some(path) => {
            fs::write(path, rendered.as_bytes())
                .map_err(|err| CliError(format!("cannot write {}: {err}", path.display())))?;
            write_stdout_line(&format!("exported to {}", path.display()))?;
        }
        None => write_stdout_bytes(rendered.as_bytes())?,
    }
    Ok(ExitCode::SUCCESS)
}

/// Prints the validation summary and audit trail length.
fn run_status(store: &mut SqliteInvoiceStore, invoice_id: InvoiceId) -> Result<ExitCode, CliError> {
    let (invoice, summary, audit_rows) = runtime::with_txn(store, |txn| {
        let invoice = txn.invoice(invoice_id)?.ok_or(clearbill_core::PipelineError::NotFound {
            entity: "invoice",
            id: invoice_id.to_string(),
        })?;
        let summary = runtime::validation_summary(txn, invoice_id)?;
        let audit_rows = txn
            .audit_events_for_entity(clearbill_core::AuditEntityType::Invoice, invoice_id.as_uuid())?
            .len();
        Ok((invoice, summary, audit_rows))
    })?;

    write_stdout_line(&format!("invoice:      {} ({})", invoice.invoice_number, invoice.id))?;
    write_stdout_line(&format!("status:       {}", invoice.status))?;
    write_stdout_line(&format!("version:      {}", invoice.current_version))?;
    write_stdout_line(&format!(
        "lines:        {} total, {} validated, {} with exceptions, {} denied",
        summary.total_lines,
        summary.lines_validated,
        summary.lines_with_exceptions,
        summary.lines_denied
    ))?;
    write_stdout_line(&format!("billed:       {}", summary.total_billed))?;
    write_stdout_line(&format!("payable:      {}", summary.total_payable))?;
    write_stdout_line(&format!("in dispute:   {}", summary.total_in_dispute))?;
    write_stdout_line(&format!("denied:       {}", summary.total_denied))?;
    write_stdout_line(&format!("audit events: {audit_rows}"))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds a carrier actor scoped to the invoice's contract.
fn carrier_actor<T: StoreTxn>(
    txn: &mut T,
    invoice_id: InvoiceId,
) -> Result<Actor, clearbill_core::PipelineError> {
    let invoice = txn.invoice(invoice_id)?.ok_or(clearbill_core::PipelineError::NotFound {
        entity: "invoice",
        id: invoice_id.to_string(),
    })?;
    let contract = txn.contract(invoice.contract_id)?.ok_or(
        clearbill_core::PipelineError::NotFound {
            entity: "contract",
            id: invoice.contract_id.to_string(),
        },
    )?;
    Ok(Actor::Carrier { actor_id: ActorId::generate(), carrier_id: contract.carrier_id })
}

/// Parses a YYYY-MM-DD argument.
fn parse_cli_date(text: &str) -> Result<Date, CliError> {
    let format = format_description!("[year]-[month]-[day]");
    Date::parse(text, format)
        .map_err(|err| CliError(format!("invalid date {text:?} (expected YYYY-MM-DD): {err}")))
}

/// Parses a compile-time decimal literal used by the seed data.
fn parse_decimal_literal(text: &str) -> Result<BigDecimal, clearbill_core::PipelineError> {
    BigDecimal::from_str(text).map_err(|err| {
        clearbill_core::PipelineError::Conflict(format!("invalid seed decimal {text:?}: {err}"))
    })
}

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> Result<(), CliError> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}").map_err(|err| CliError(format!("stdout: {err}")))
}

/// Writes raw bytes to stdout.
fn write_stdout_bytes(bytes: &[u8]) -> Result<(), CliError> {
    let mut stdout = std::io::stdout();
    stdout.write_all(bytes).map_err(|err| CliError(format!("stdout: {err}")))
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> Result<(), CliError> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}").map_err(|err| CliError(format!("stderr: {err}")))
}
