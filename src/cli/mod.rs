pub mod init;
pub mod rules;
pub mod run;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "spendsort",
    version,
    about = "Categorize bank exports into spreadsheet-ready CSV."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write default settings and a starter rule table.
    Init {
        /// Overwrite an existing rule table
        #[arg(long)]
        force: bool,
    },
    /// Categorize a bank export and write the two output files.
    Run {
        /// Path to the bank's CSV export
        input: String,
        /// Rule table to use (default: from settings)
        #[arg(long)]
        rules: Option<String>,
        /// Where to write the categorized sheet
        #[arg(long, short)]
        output: Option<String>,
        /// Where to write unassigned transactions
        #[arg(long)]
        unassigned: Option<String>,
        /// Add a map-search link column
        #[arg(long, overrides_with = "no_links")]
        links: bool,
        /// Leave out the map-search link column
        #[arg(long = "no-links")]
        no_links: bool,
        /// Input encoding used when the file is not UTF-8 (e.g. windows-1250)
        #[arg(long)]
        encoding: Option<String>,
    },
    /// Inspect the rule table.
    Rules {
        #[command(subcommand)]
        command: RulesCommands,
    },
}

#[derive(Subcommand)]
pub enum RulesCommands {
    /// List rules in match order.
    List {
        #[arg(long)]
        rules: Option<String>,
    },
    /// Validate the rule table and report shadowed patterns.
    Check {
        #[arg(long)]
        rules: Option<String>,
    },
    /// Show which category a description would land in.
    Test {
        description: String,
        /// Location text, for rules that also match on location
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        rules: Option<String>,
    },
}

/// `--links` / `--no-links` as an override; `None` keeps the configured value.
pub(crate) fn links_flag(links: bool, no_links: bool) -> Option<bool> {
    if no_links {
        Some(false)
    } else if links {
        Some(true)
    } else {
        None
    }
}
