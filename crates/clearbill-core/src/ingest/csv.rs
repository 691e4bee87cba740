// crates/clearbill-core/src/ingest/csv.rs
// ============================================================================
// Module: Clearbill CSV Parser
// Description: CSV/TSV invoice parsing with header alias mapping.
// Purpose: Normalize supplier spreadsheets into RawLineItems.
// Dependencies: crate::core::{money, time}, crate::ingest, csv, tracing
// ============================================================================

//! ## Overview
//! Every supplier names their columns differently. The parser lowercases and
//! trims headers, then maps them through a fixed alias table to canonical
//! fields. `description` and `amount` are required; everything else is
//! optional. Rows with an empty or unparseable amount are skipped with a
//! row-scoped warning rather than failing the file.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;

use bigdecimal::BigDecimal;
use tracing::warn;

use crate::core::money::parse_money;
use crate::core::time::parse_service_date;
use crate::ingest::InvoiceParser;
use crate::ingest::ParseError;
use crate::ingest::ParseResult;
use crate::ingest::RawLineItem;
use crate::ingest::clean_str;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// How much leading text is inspected for delimiter sniffing.
const SNIFF_WINDOW_BYTES: usize = 2048;

/// Bound on the raw-text sample retained for the extraction artifact.
const RAW_TEXT_SAMPLE_BYTES: usize = 5120;

/// UTF-8 byte order mark.
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Header alias table: canonical field name to accepted header variants.
/// Headers are compared after trimming and lowercasing; the canonical name
/// itself always matches.
const COLUMN_ALIASES: &[(&str, &[&str])] = &[
    (
        "description",
        &[
            "description",
            "service description",
            "line description",
            "desc",
            "service",
            "item",
            "charge description",
            "billing description",
        ],
    ),
    (
        "amount",
        &[
            "amount",
            "total",
            "total amount",
            "billed amount",
            "charge",
            "fee",
            "invoice amount",
            "gross amount",
            "line total",
            "extended amount",
        ],
    ),
    (
        "quantity",
        &["quantity", "qty", "units", "unit quantity", "hours", "count", "num", "number", "volume"],
    ),
    (
        "unit",
        &["unit", "unit type", "uom", "unit of measure", "billing unit", "rate unit"],
    ),
    (
        "code",
        &[
            "code",
            "service code",
            "billing code",
            "procedure code",
            "item code",
            "charge code",
            "cpt",
            "cpt code",
        ],
    ),
    (
        "claim_number",
        &[
            "claim number",
            "claim",
            "claim no",
            "claim#",
            "claimant number",
            "file number",
            "file no",
            "ref",
            "reference",
            "reference number",
        ],
    ),
    (
        "service_date",
        &[
            "service date",
            "date of service",
            "dos",
            "date",
            "exam date",
            "inspection date",
            "visit date",
            "transaction date",
            "invoice date",
        ],
    ),
];

// ============================================================================
// SECTION: Parser
// ============================================================================

/// CSV/TSV invoice parser, resilient to column naming variations.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvParser;

impl InvoiceParser for CsvParser {
    fn parse(&self, data: &[u8], filename: &str) -> Result<ParseResult, ParseError> {
        let mut warnings: Vec<String> = Vec::new();

        let text = decode_text(data, filename, &mut warnings)?;
        let delimiter = sniff_delimiter(&text);

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|err| ParseError::Malformed {
                filename: filename.to_owned(),
                reason: err.to_string(),
            })?
            .iter()
            .map(|h| h.trim().to_lowercase())
            .collect();

        let column_map = build_column_map(&headers, filename)?;

        let mut line_items: Vec<RawLineItem> = Vec::new();
        let mut saw_row = false;

        for (index, record) in reader.records().enumerate() {
            // Header occupies file line 1; data rows start at line 2.
            let row_number = index + 2;
            let record = match record {
                Ok(record) => record,
                Err(err) => {
                    warnings.push(format!("Row {row_number} skipped: {err}"));
                    warn!(row = row_number, file = filename, error = %err, "skipping malformed row");
                    continue;
                }
            };
            saw_row = true;

            let mut notes: Vec<String> = Vec::new();

            let Some(description) =
                cell(&record, &column_map, "description").and_then(|v| clean_str(&v))
            else {
                warnings.push(format!("Row {row_number} skipped: description is empty"));
                continue;
            };

            let Some(amount) =
                cell(&record, &column_map, "amount").and_then(|v| parse_money(&v))
            else {
                warnings.push(format!("Row {row_number} skipped: amount is empty or invalid"));
                continue;
            };

            let quantity = cell(&record, &column_map, "quantity")
                .and_then(|v| parse_money(&v))
                .unwrap_or_else(|| BigDecimal::from(1));

            let service_date = cell(&record, &column_map, "service_date")
                .and_then(|v| parse_service_date(&v));
            if service_date.is_none()
                && let Some(raw_date) = cell(&record, &column_map, "service_date")
                && clean_str(&raw_date).is_some()
            {
                notes.push(format!("Unparseable service date: {raw_date:?}"));
            }

            line_items.push(RawLineItem {
                line_number: i64::try_from(index + 1).unwrap_or(i64::MAX),
                raw_description: description,
                raw_amount: amount,
                raw_quantity: quantity,
                raw_unit: cell(&record, &column_map, "unit").and_then(|v| clean_str(&v)),
                raw_code: cell(&record, &column_map, "code").and_then(|v| clean_str(&v)),
                claim_number: cell(&record, &column_map, "claim_number")
                    .and_then(|v| clean_str(&v)),
                service_date,
                extraction_notes: notes,
            });
        }

        if !saw_row {
            return Err(ParseError::Empty { filename: filename.to_owned() });
        }
        if line_items.is_empty() {
            return Err(ParseError::NoValidRows { filename: filename.to_owned() });
        }

        Ok(ParseResult {
            line_items,
            raw_text: sample_text(&text),
            extraction_method: "csv".to_owned(),
            warnings,
            page_count: None,
        })
    }
}

// ============================================================================
// SECTION: Decoding and Sniffing
// ============================================================================

/// Decodes bytes as UTF-8 (BOM stripped), falling back to Latin-1 with a
/// warning.
fn decode_text(
    data: &[u8],
    filename: &str,
    warnings: &mut Vec<String>,
) -> Result<String, ParseError> {
    let stripped = data.strip_prefix(UTF8_BOM).unwrap_or(data);
    match std::str::from_utf8(stripped) {
        Ok(text) => Ok(text.to_owned()),
        Err(_) => {
            // Latin-1 maps every byte to its identical Unicode scalar, so the
            // fallback cannot fail; it can only mojibake, which the warning
            // surfaces.
            warnings.push("File decoded as latin-1 (not UTF-8)".to_owned());
            warn!(file = filename, "decoding as latin-1 after UTF-8 failure");
            Ok(stripped.iter().map(|&b| char::from(b)).collect())
        }
    }
}

/// Picks tab when one occurs in the sniff window, comma otherwise.
fn sniff_delimiter(text: &str) -> u8 {
    let has_tab = text.bytes().take(SNIFF_WINDOW_BYTES).any(|b| b == b'\t');
    if has_tab { b'\t' } else { b',' }
}

/// Returns a bounded prefix of the text on a character boundary.
fn sample_text(text: &str) -> String {
    if text.len() <= RAW_TEXT_SAMPLE_BYTES {
        return text.to_owned();
    }
    let mut end = RAW_TEXT_SAMPLE_BYTES;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_owned()
}

// ============================================================================
// SECTION: Column Mapping
// ============================================================================

/// Maps canonical field names to header indices found in the file.
///
/// # Errors
///
/// Returns [`ParseError::MissingColumn`] when `description` or `amount`
/// cannot be located.
fn build_column_map(
    headers: &[String],
    filename: &str,
) -> Result<HashMap<&'static str, usize>, ParseError> {
    let mut map: HashMap<&'static str, usize> = HashMap::new();
    for &(canonical, aliases) in COLUMN_ALIASES {
        let found = headers.iter().position(|actual| {
            let actual = actual.as_str();
            actual == canonical || aliases.iter().any(|&alias| actual == alias)
        });
        if let Some(index) = found {
            map.insert(canonical, index);
        } else if matches!(canonical, "description" | "amount") {
            return Err(ParseError::MissingColumn {
                filename: filename.to_owned(),
                missing: canonical,
                available: headers.to_vec(),
            });
        }
    }
    Ok(map)
}

/// Reads the cell for a canonical field from a record, if mapped.
/// Ragged rows shorter than the header yield `None`.
fn cell(
    record: &csv::StringRecord,
    column_map: &HashMap<&'static str, usize>,
    canonical: &'static str,
) -> Option<String> {
    let index = *column_map.get(canonical)?;
    record.get(index).map(str::to_owned)
}
