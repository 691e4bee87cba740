// crates/clearbill-core/src/ingest/mod.rs
// ============================================================================
// Module: Clearbill Ingestion
// Description: Parser contract and normalized raw line items.
// Purpose: Turn uploaded file bytes into RawLineItems; nothing more.
// Dependencies: bigdecimal, thiserror, time
// ============================================================================

//! ## Overview
//! Parsers are the only layer that knows about file formats. A parser accepts
//! `(bytes, filename)` and returns a [`ParseResult`] of normalized
//! [`RawLineItem`] values plus a bounded raw-text sample for the extraction
//! artifact, or fails with a typed [`ParseError`]. Parsers never write state.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod csv;
pub mod dispatch;
pub mod pdf;

// ============================================================================
// SECTION: Imports
// ============================================================================

use bigdecimal::BigDecimal;
use thiserror::Error;
use time::Date;

pub use dispatch::detect_format;
pub use dispatch::parser_for;

// ============================================================================
// SECTION: Raw Line Items
// ============================================================================

/// A single normalized line extracted from a supplier invoice file.
///
/// "Raw" means: amounts and quantities are normalized to decimals, dates to
/// calendar dates, strings trimmed, but no classification or validation has
/// occurred yet.
///
/// # Invariants
/// - `line_number` is 1-based within the file (header excluded).
/// - `raw_description` is non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLineItem {
    /// 1-based position within the file.
    pub line_number: i64,
    /// Service description as written by the supplier.
    pub raw_description: String,
    /// Billed amount.
    pub raw_amount: BigDecimal,
    /// Billed quantity; defaults to 1 when the column is absent.
    pub raw_quantity: BigDecimal,
    /// Billing unit label, if present.
    pub raw_unit: Option<String>,
    /// Supplier's own billing code, if present.
    pub raw_code: Option<String>,
    /// Claim number context, if present.
    pub claim_number: Option<String>,
    /// Service date, if present and parseable.
    pub service_date: Option<Date>,
    /// Row-scoped parser warnings.
    pub extraction_notes: Vec<String>,
}

/// Result of parsing a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseResult {
    /// Normalized line items in source order.
    pub line_items: Vec<RawLineItem>,
    /// Bounded sample of the raw extracted text, retained for audit.
    pub raw_text: String,
    /// Extraction method label (e.g. `csv`).
    pub extraction_method: String,
    /// File-scoped parser warnings.
    pub warnings: Vec<String>,
    /// Page count for paged formats.
    pub page_count: Option<i64>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Typed parse failure.
///
/// # Invariants
/// - Every variant carries a human-readable reason suitable for showing to
///   the submitting supplier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// File format cannot be determined or is not supported.
    #[error("{0}")]
    UnsupportedFormat(String),
    /// File bytes could not be decoded as text.
    #[error("cannot decode file {filename:?}: unsupported encoding")]
    Encoding {
        /// Offending filename.
        filename: String,
    },
    /// Required columns were not found in the header row.
    #[error("required column {missing:?} not found in {filename:?} (available: {available:?})")]
    MissingColumn {
        /// Offending filename.
        filename: String,
        /// The canonical column that could not be located.
        missing: &'static str,
        /// Headers actually present in the file.
        available: Vec<String>,
    },
    /// File contains no data rows.
    #[error("file {filename:?} contains no data rows")]
    Empty {
        /// Offending filename.
        filename: String,
    },
    /// Every data row was skipped; nothing usable remained.
    #[error("no valid line items found in {filename:?}")]
    NoValidRows {
        /// Offending filename.
        filename: String,
    },
    /// File is structurally malformed.
    #[error("failed to parse {filename:?}: {reason}")]
    Malformed {
        /// Offending filename.
        filename: String,
        /// Underlying reason.
        reason: String,
    },
    /// Parser for this format is reserved but not yet implemented.
    #[error("{0}")]
    NotImplemented(String),
}

// ============================================================================
// SECTION: Parser Contract
// ============================================================================

/// One concrete parser per file format.
pub trait InvoiceParser {
    /// Parses file bytes into normalized raw line items.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] when the file cannot be parsed. Parsers must
    /// never write state.
    fn parse(&self, data: &[u8], filename: &str) -> Result<ParseResult, ParseError>;
}

// ============================================================================
// SECTION: Shared Normalization
// ============================================================================

/// Strips and normalizes a string cell; returns `None` for empty or
/// placeholder values.
#[must_use]
pub fn clean_str(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lowered = trimmed.to_lowercase();
    if matches!(lowered.as_str(), "nan" | "none" | "n/a") {
        return None;
    }
    Some(trimmed.to_owned())
}
