use std::path::Path;

use encoding_rs::Encoding;
use tracing::{info, warn};

use crate::error::{Result, SortError};
use crate::models::RawRow;

/// Code page of the bank's CSV export.
pub const DEFAULT_ENCODING: &str = "windows-1250";

// IPKO export columns.
const COL_DATE: usize = 0;
const COL_TYPE: usize = 2;
const COL_AMOUNT: usize = 3;
const COL_DESCRIPTION: usize = 5;
const COL_DETAILS: usize = 7;
// Free-text columns folded into the description, in this order.
const TEXT_COLUMNS: &[usize] = &[COL_TYPE, COL_DESCRIPTION, 6, COL_DETAILS, 8];

/// Read the export and decode it to text. Valid UTF-8 (with or without BOM)
/// is taken as is; anything else is decoded with `encoding_label`.
pub fn read_to_utf8(file_path: &Path, encoding_label: &str) -> Result<String> {
    let encoding = Encoding::for_label(encoding_label.trim().as_bytes())
        .ok_or_else(|| SortError::Encoding(encoding_label.to_string()))?;
    let bytes = std::fs::read(file_path)?;
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&bytes);

    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(text.to_string()),
        Err(_) => {
            let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
            if had_errors {
                warn!(
                    file = %file_path.display(),
                    encoding = encoding.name(),
                    "input had bytes invalid in this encoding; they were replaced"
                );
            }
            Ok(text.into_owned())
        }
    }
}

/// Split decoded export text into raw rows. Short or blank-field rows are
/// kept with empty fields so the normalizer can reject them with a reason;
/// only lines with no content at all are skipped by the reader.
pub fn parse_export(content: &str) -> Result<Vec<RawRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let field = |i: usize| record.get(i).unwrap_or("").trim();

        let description = TEXT_COLUMNS
            .iter()
            .map(|&i| field(i))
            .filter(|f| !f.is_empty())
            .collect::<Vec<_>>()
            .join(" // ");
        let details = field(COL_DETAILS);

        rows.push(RawRow {
            line: record.position().map(|p| p.line() as usize).unwrap_or(0),
            date: field(COL_DATE).to_string(),
            description,
            amount: field(COL_AMOUNT).to_string(),
            location: (!details.is_empty()).then(|| details.to_string()),
        });
    }
    Ok(rows)
}

pub fn import_file(file_path: &Path, encoding_label: &str) -> Result<Vec<RawRow>> {
    let content = read_to_utf8(file_path, encoding_label)?;
    let rows = parse_export(&content)?;
    info!(file = %file_path.display(), rows = rows.len(), "read bank export");
    Ok(rows)
}
