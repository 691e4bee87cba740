// crates/clearbill-core/src/ingest/pdf.rs
// ============================================================================
// Module: Clearbill PDF Parser
// Description: Reserved PDF ingestion surface.
// Purpose: Route PDF uploads to a clean typed error until extraction ships.
// Dependencies: crate::ingest
// ============================================================================

//! ## Overview
//! PDF ingestion is reserved for a future release. The parser is fully wired
//! into the format dispatch so the routing cannot be forgotten, and it fails
//! cleanly with a typed error that tells the supplier to convert to CSV.
//! Downstream code (classification, validation, audit) is format-agnostic and
//! needs no changes when extraction is implemented.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::ingest::InvoiceParser;
use crate::ingest::ParseError;
use crate::ingest::ParseResult;

// ============================================================================
// SECTION: Parser
// ============================================================================

/// PDF invoice parser placeholder.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfParser;

impl InvoiceParser for PdfParser {
    fn parse(&self, _data: &[u8], filename: &str) -> Result<ParseResult, ParseError> {
        Err(ParseError::NotImplemented(format!(
            "PDF parsing is not yet implemented. File: {filename:?}. \
             Please convert your invoice to CSV format. \
             PDF support is planned for a future release."
        )))
    }
}
