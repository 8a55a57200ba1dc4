use std::path::PathBuf;

use colored::Colorize;
use comfy_table::{Cell, Table};
use tracing::info;

use crate::error::Result;
use crate::exporter::{ExportOptions, Exporter};
use crate::fmt::money;
use crate::importer::import_file;
use crate::normalizer::Normalizer;
use crate::pipeline::{classify, Classification, GroupTotal};
use crate::rules::RuleTable;
use crate::settings::{shellexpand_path, Settings};

/// Everything one run needs, resolved from settings and flags up front.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub input: PathBuf,
    pub rules_path: PathBuf,
    pub output_path: PathBuf,
    pub unassigned_path: PathBuf,
    pub encoding: String,
    pub date_format: String,
    pub export: ExportOptions,
}

/// Flag values for `spendsort run`; `None` falls back to settings.
#[derive(Debug, Default)]
pub struct RunArgs {
    pub input: String,
    pub rules: Option<String>,
    pub output: Option<String>,
    pub unassigned: Option<String>,
    pub links: Option<bool>,
    pub encoding: Option<String>,
}

impl RunConfig {
    pub fn resolve(settings: &Settings, args: RunArgs) -> Self {
        let path = |flag: Option<String>, fallback: &str| {
            PathBuf::from(shellexpand_path(flag.as_deref().unwrap_or(fallback)))
        };
        Self {
            input: PathBuf::from(shellexpand_path(&args.input)),
            rules_path: path(args.rules, &settings.rules_path),
            output_path: path(args.output, &settings.output_path),
            unassigned_path: path(args.unassigned, &settings.unassigned_path),
            encoding: args.encoding.unwrap_or_else(|| settings.encoding.clone()),
            date_format: settings.date_format.clone(),
            export: ExportOptions {
                location_links: args.links.unwrap_or(settings.location_links),
                maps_template: settings.maps_url_template.clone(),
                excel_bom: settings.excel_bom,
            },
        }
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    pub classification: Classification,
    pub groups: Vec<GroupTotal>,
}

/// Load rules, read the export, classify and write both outputs.
///
/// The rule table is loaded before the input is touched, so a bad table
/// fails the run without producing any file.
pub fn execute(config: &RunConfig) -> Result<RunOutcome> {
    let rules = RuleTable::load(&config.rules_path)?;
    let normalizer = Normalizer::new(&config.date_format).with_rewrites(rules.rewrites())?;

    let rows = import_file(&config.input, &config.encoding)?;
    let classification = classify(rows, &normalizer, &rules);

    Exporter::new(config.export.clone()).write_outputs(
        &classification,
        &config.output_path,
        &config.unassigned_path,
    )?;

    info!(
        categorized = classification.categorized.len(),
        unassigned = classification.unassigned.len(),
        rejected = classification.rejected.len(),
        "run complete"
    );
    let groups = classification.group_summary(&rules);
    Ok(RunOutcome {
        classification,
        groups,
    })
}

pub fn run(settings: &Settings, args: RunArgs) -> Result<()> {
    let config = RunConfig::resolve(settings, args);
    let outcome = execute(&config)?;
    print_summary(&outcome, &config);
    Ok(())
}

fn print_summary(outcome: &RunOutcome, config: &RunConfig) {
    let classification = &outcome.classification;
    let mut table = Table::new();
    table.set_header(vec!["Category", "Count", "Total"]);
    for total in classification.summary() {
        let name = match total.category.label() {
            Some(label) => label.to_string(),
            None => "(unassigned)".yellow().to_string(),
        };
        let amount = if total.total.is_sign_negative() {
            money(total.total).red().to_string()
        } else {
            money(total.total).green().to_string()
        };
        table.add_row(vec![Cell::new(name), Cell::new(total.count), Cell::new(amount)]);
    }
    println!("{table}");

    if !outcome.groups.is_empty() {
        let mut groups = Table::new();
        groups.set_header(vec!["Group", "Importance", "Count", "Total"]);
        for g in &outcome.groups {
            groups.add_row(vec![
                Cell::new(&g.group),
                Cell::new(g.importance.map(|i| i.label()).unwrap_or("")),
                Cell::new(g.count),
                Cell::new(money(g.total)),
            ]);
        }
        println!("{groups}");
    }

    println!(
        "{} rows: {} categorized, {} unassigned, {} rejected",
        classification.total_rows(),
        classification.categorized.len().to_string().green(),
        classification.unassigned.len().to_string().yellow(),
        classification.rejected.len().to_string().red(),
    );
    println!("Wrote {}", config.output_path.display());
    println!("Wrote {}", config.unassigned_path.display());

    if !classification.rejected.is_empty() {
        let mut rejected = Table::new();
        rejected.set_header(vec!["Line", "Description", "Reason"]);
        for row in &classification.rejected {
            rejected.add_row(vec![
                Cell::new(row.line),
                Cell::new(&row.description),
                Cell::new(row.error.to_string()),
            ]);
        }
        println!("\n{}\n{rejected}", "Rejected rows".red().bold());
    }
}
