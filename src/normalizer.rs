use std::str::FromStr;

use chrono::NaiveDate;
use regex::{NoExpand, Regex, RegexBuilder};
use rust_decimal::Decimal;

use crate::error::{Result, RowError, SortError};
use crate::location::extract_location;
use crate::models::{RawRow, Transaction};
use crate::rules::Rewrite;

/// Date layout of the bank's export.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

// Bookmark glyphs the bank prefixes to some descriptions, seen both intact
// and as UTF-8 read back through Windows-1252.
const MARKERS: &[&str] = &["\u{1F516}", "ðŸ”–"];

/// Turns raw bank rows into canonical transactions.
#[derive(Debug)]
pub struct Normalizer {
    date_format: String,
    rewrites: Vec<(Regex, String)>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            rewrites: Vec::new(),
        }
    }
}

impl Normalizer {
    pub fn new(date_format: &str) -> Self {
        Self {
            date_format: date_format.to_string(),
            rewrites: Vec::new(),
        }
    }

    /// Description substitutions, applied case-insensitively in order.
    pub fn with_rewrites(mut self, rewrites: &[Rewrite]) -> Result<Self> {
        self.rewrites = rewrites
            .iter()
            .map(|r| {
                let re = RegexBuilder::new(&regex::escape(&r.from))
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| SortError::RuleTable(format!("rewrite '{}': {e}", r.from)))?;
                Ok((re, r.to.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(self)
    }

    pub fn normalize(&self, raw: RawRow) -> std::result::Result<Transaction, RowError> {
        let description = self.normalize_description(&raw.description);
        if description.is_empty() {
            return Err(RowError::EmptyDescription);
        }

        let amount = parse_amount(&raw.amount)?;
        let date = parse_date(&raw.date, &self.date_format)?;
        let location = raw.location.as_deref().and_then(normalize_location);

        Ok(Transaction {
            line: raw.line,
            date,
            description,
            amount,
            location,
        })
    }

    /// Cleaned, rewritten and whitespace-collapsed description. May be empty.
    pub fn normalize_description(&self, raw: &str) -> String {
        let mut description = clean_text(raw);
        for (re, to) in &self.rewrites {
            if re.is_match(&description) {
                description = re.replace_all(&description, NoExpand(to)).into_owned();
            }
        }
        collapse_whitespace(&description)
    }
}

pub fn normalize_location(raw: &str) -> Option<String> {
    extract_location(&clean_text(raw))
}

/// Repair mis-decoded text and drop invisible noise, keeping every visible
/// character (diacritics included).
pub fn clean_text(raw: &str) -> String {
    let mut text = repair_mojibake(raw);
    for marker in MARKERS {
        if text.contains(marker) {
            text = text.replace(marker, "");
        }
    }
    text.chars()
        .filter_map(|c| match c {
            '\u{00A0}' | '\u{2007}' | '\u{202F}' => Some(' '),
            '\u{FEFF}' | '\u{FFFD}' | '\u{200B}' => None,
            c if c.is_control() && !c.is_whitespace() => None,
            c => Some(c),
        })
        .collect()
}

/// UTF-8 that was decoded as Windows-1252 somewhere upstream ("Å‚" for "ł")
/// is turned back into the intended text. Anything that does not round-trip
/// cleanly is left alone.
fn repair_mojibake(text: &str) -> String {
    if text.is_ascii() || !text.chars().any(|c| matches!(c, 'Ã' | 'Å' | 'Ä' | 'Ð' | 'ð' | 'â')) {
        return text.to_string();
    }
    let (bytes, _, unmappable) = encoding_rs::WINDOWS_1252.encode(text);
    if unmappable {
        return text.to_string();
    }
    match std::str::from_utf8(&bytes) {
        Ok(repaired) => repaired.to_string(),
        Err(_) => text.to_string(),
    }
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a signed amount into a two-decimal `Decimal`.
///
/// Spaces and apostrophes are thousands separators. A comma is a thousands
/// separator when a dot is also present or when every comma is followed by a
/// group of exactly three digits; a single comma followed by one or two
/// digits is the decimal mark. Amounts with non-zero digits past the cents
/// are rejected rather than rounded.
pub fn parse_amount(raw: &str) -> std::result::Result<Decimal, RowError> {
    let invalid = || RowError::InvalidAmount(raw.trim().to_string());

    let s: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '\'' | '\u{00A0}' | '\u{202F}'))
        .collect();
    let s = s.strip_prefix('+').unwrap_or(&s);
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-')) {
        return Err(invalid());
    }

    let s = if s.contains('.') {
        s.replace(',', "")
    } else if s.contains(',') {
        let groups: Vec<&str> = s.split(',').collect();
        let grouped = groups[1..].iter().all(|g| g.len() == 3);
        if grouped {
            groups.concat()
        } else if groups.len() == 2 && (1..=2).contains(&groups[1].len()) {
            groups.join(".")
        } else {
            return Err(invalid());
        }
    } else {
        s.to_string()
    };

    let mut amount = Decimal::from_str(&s).map_err(|_| invalid())?;
    if amount.round_dp(2) != amount {
        return Err(invalid());
    }
    amount.rescale(2);
    Ok(amount)
}

pub fn parse_date(raw: &str, format: &str) -> std::result::Result<NaiveDate, RowError> {
    NaiveDate::parse_from_str(raw.trim(), format)
        .map_err(|_| RowError::InvalidDate(raw.trim().to_string(), format.to_string()))
}
