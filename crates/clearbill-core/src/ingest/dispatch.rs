// crates/clearbill-core/src/ingest/dispatch.rs
// ============================================================================
// Module: Clearbill Parser Dispatch
// Description: Extension-driven routing from filename to parser.
// Purpose: Keep format enumeration in exactly one place.
// Dependencies: crate::core::invoice, crate::ingest::{csv, pdf}
// ============================================================================

//! ## Overview
//! The dispatch table is the only place file formats are enumerated. Adding a
//! format means adding one arm here and one parser module; nothing downstream
//! changes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::invoice::FileFormat;
use crate::ingest::InvoiceParser;
use crate::ingest::ParseError;
use crate::ingest::csv::CsvParser;
use crate::ingest::pdf::PdfParser;

// ============================================================================
// SECTION: Dispatch
// ============================================================================

/// Detects the file format from the filename extension.
///
/// # Errors
///
/// Returns [`ParseError::UnsupportedFormat`] for unknown extensions, with a
/// dedicated message for spreadsheet formats suggesting CSV export.
pub fn detect_format(filename: &str) -> Result<FileFormat, ParseError> {
    let extension = filename.rsplit_once('.').map(|(_, ext)| ext.to_lowercase());
    match extension.as_deref() {
        Some("csv" | "tsv") => Ok(FileFormat::Csv),
        Some("pdf") => Ok(FileFormat::Pdf),
        Some("xlsx" | "xls") => Err(ParseError::UnsupportedFormat(
            "Excel files (.xlsx/.xls) are not supported. Please export your invoice as CSV."
                .to_owned(),
        )),
        _ => Err(ParseError::UnsupportedFormat(format!(
            "Cannot determine file format from filename {filename:?}. \
             Supported extensions: .csv, .tsv, .pdf"
        ))),
    }
}

/// Returns the parser for a detected format.
#[must_use]
pub fn parser_for(format: FileFormat) -> Box<dyn InvoiceParser> {
    match format {
        FileFormat::Csv => Box::new(CsvParser),
        FileFormat::Pdf => Box::new(PdfParser),
    }
}
