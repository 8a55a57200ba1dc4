use std::io::Write;
use std::path::Path;

use tempfile::{NamedTempFile, TempPath};
use tracing::{info, warn};

use crate::error::{Result, SortError};
use crate::location::{maps_link, DEFAULT_MAPS_TEMPLATE};
use crate::models::{ClassifiedTransaction, Transaction};
use crate::pipeline::Classification;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub location_links: bool,
    pub maps_template: String,
    /// Prefix files with a UTF-8 BOM so spreadsheet apps detect the encoding.
    pub excel_bom: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            location_links: true,
            maps_template: DEFAULT_MAPS_TEMPLATE.to_string(),
            excel_bom: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRow {
    pub category: String,
    pub date: String,
    pub description: String,
    pub amount: String,
    pub maps_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnassignedRow {
    pub date: String,
    pub description: String,
    pub amount: String,
    pub maps_link: Option<String>,
}

pub struct Exporter {
    options: ExportOptions,
}

impl Exporter {
    pub fn new(options: ExportOptions) -> Self {
        Self { options }
    }

    fn link_for(&self, txn: &Transaction) -> Option<String> {
        if !self.options.location_links {
            return None;
        }
        txn.location
            .as_deref()
            .and_then(|loc| maps_link(loc, &self.options.maps_template))
    }

    pub fn sheet_rows(&self, categorized: &[ClassifiedTransaction]) -> Vec<SheetRow> {
        categorized
            .iter()
            .map(|c| {
                let t = &c.transaction;
                SheetRow {
                    category: c.category.label().unwrap_or_default().to_string(),
                    date: t.date.format(DATE_FORMAT).to_string(),
                    description: t.description.clone(),
                    amount: format!("{:.2}", t.amount),
                    maps_link: self.link_for(t),
                }
            })
            .collect()
    }

    pub fn unassigned_rows(&self, unassigned: &[ClassifiedTransaction]) -> Vec<UnassignedRow> {
        unassigned
            .iter()
            .map(|c| {
                let t = &c.transaction;
                UnassignedRow {
                    date: t.date.format(DATE_FORMAT).to_string(),
                    description: t.description.clone(),
                    amount: format!("{:.2}", t.amount),
                    maps_link: self.link_for(t),
                }
            })
            .collect()
    }

    /// Write both output files. Nothing appears at either path unless both
    /// were fully written, and a sheet left by an earlier run survives a
    /// failed one. The two paths must name different files.
    pub fn write_outputs(
        &self,
        classification: &Classification,
        sheet_path: &Path,
        unassigned_path: &Path,
    ) -> Result<()> {
        if same_destination(sheet_path, unassigned_path) {
            return Err(SortError::OutputPath(format!(
                "categorized and unassigned outputs both point at {}",
                sheet_path.display()
            )));
        }
        let links = self.options.location_links;

        let mut header = vec!["category", "date", "description", "amount"];
        if links {
            header.push("maps_link");
        }
        let sheet = self.sheet_rows(&classification.categorized);
        let sheet_records = sheet.iter().map(|r| {
            let mut rec = vec![
                r.category.as_str(),
                r.date.as_str(),
                r.description.as_str(),
                r.amount.as_str(),
            ];
            if links {
                rec.push(r.maps_link.as_deref().unwrap_or(""));
            }
            rec
        });
        let staged_sheet = self.stage(sheet_path, &header, sheet_records)?;

        let mut header = vec!["date", "description", "amount"];
        if links {
            header.push("maps_link");
        }
        let unassigned = self.unassigned_rows(&classification.unassigned);
        let unassigned_records = unassigned.iter().map(|r| {
            let mut rec = vec![r.date.as_str(), r.description.as_str(), r.amount.as_str()];
            if links {
                rec.push(r.maps_link.as_deref().unwrap_or(""));
            }
            rec
        });
        let staged_unassigned = self.stage(unassigned_path, &header, unassigned_records)?;

        // An existing sheet is moved aside until both renames succeed, so a
        // failed run leaves the previous export in place.
        let backup = if sheet_path.exists() {
            let backup = tempfile::Builder::new()
                .prefix(".spendsort-backup")
                .tempfile_in(parent_dir(sheet_path))?
                .into_temp_path();
            std::fs::rename(sheet_path, &backup)?;
            Some(backup)
        } else {
            None
        };
        let restore = |backup: Option<TempPath>| {
            if let Some(backup) = backup {
                if let Err(e) = backup.persist(sheet_path) {
                    warn!(path = %sheet_path.display(), error = %e.error, "could not restore previous export");
                }
            }
        };

        if let Err(e) = staged_sheet.persist(sheet_path) {
            restore(backup);
            return Err(SortError::Io(e.error));
        }
        if let Err(e) = staged_unassigned.persist(unassigned_path) {
            let _ = std::fs::remove_file(sheet_path);
            restore(backup);
            return Err(SortError::Io(e.error));
        }
        drop(backup);

        info!(
            rows = sheet.len(),
            path = %sheet_path.display(),
            "wrote spreadsheet export"
        );
        info!(
            rows = unassigned.len(),
            path = %unassigned_path.display(),
            "wrote unassigned transactions"
        );
        Ok(())
    }

    // Serialize into a temp file next to `path`, to be renamed into place.
    fn stage<'a>(
        &self,
        path: &Path,
        header: &[&str],
        records: impl Iterator<Item = Vec<&'a str>>,
    ) -> Result<NamedTempFile> {
        let mut file = NamedTempFile::new_in(parent_dir(path))?;
        if self.options.excel_bom {
            file.write_all(UTF8_BOM)?;
        }
        {
            let mut wtr = csv::WriterBuilder::new()
                .terminator(csv::Terminator::Any(b'\n'))
                .from_writer(file.as_file_mut());
            wtr.write_record(header)?;
            for record in records {
                wtr.write_record(&record)?;
            }
            wtr.flush()?;
        }
        Ok(file)
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

// Compares the resolved directory plus file name, so `out.csv` and
// `./out.csv` are the same file even before either exists.
fn same_destination(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    let resolve = |p: &Path| {
        let dir = parent_dir(p);
        let dir = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        (dir, p.file_name().map(|n| n.to_os_string()))
    };
    resolve(a) == resolve(b)
}
