use std::path::PathBuf;

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::error::Result;
use crate::normalizer::{normalize_location, Normalizer};
use crate::rules::RuleTable;
use crate::settings::{shellexpand_path, Settings};

fn rules_path(settings: &Settings, flag: Option<&str>) -> PathBuf {
    PathBuf::from(shellexpand_path(flag.unwrap_or(&settings.rules_path)))
}

pub fn list(settings: &Settings, rules: Option<&str>) -> Result<()> {
    let path = rules_path(settings, rules);
    let table = RuleTable::load(&path)?;

    let mut out = Table::new();
    out.set_header(vec!["#", "Category", "Group", "Importance", "Type", "Location", "Patterns"]);
    for (i, rule) in table.rules().enumerate() {
        out.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&rule.category),
            Cell::new(rule.group.as_deref().unwrap_or("")),
            Cell::new(rule.importance.map(|imp| imp.label()).unwrap_or("")),
            Cell::new(rule.match_type.key()),
            Cell::new(if rule.match_location { "yes" } else { "" }),
            Cell::new(rule.patterns.join(", ")),
        ]);
    }
    println!("Rules ({})\n{out}", path.display());

    if !table.rewrites().is_empty() {
        let mut rewrites = Table::new();
        rewrites.set_header(vec!["From", "To"]);
        for rw in table.rewrites() {
            rewrites.add_row(vec![Cell::new(&rw.from), Cell::new(&rw.to)]);
        }
        println!("Rewrites\n{rewrites}");
    }
    Ok(())
}

pub fn check(settings: &Settings, rules: Option<&str>) -> Result<()> {
    let path = rules_path(settings, rules);
    let table = RuleTable::load(&path)?;
    let conflicts = table.conflicts();

    println!(
        "{} {} rules, {} rewrites in {}",
        "OK".green().bold(),
        table.len(),
        table.rewrites().len(),
        path.display()
    );
    if conflicts.is_empty() {
        return Ok(());
    }

    let mut out = Table::new();
    out.set_header(vec!["Pattern", "Matches as", "Never reaches"]);
    for c in &conflicts {
        out.add_row(vec![
            Cell::new(&c.pattern),
            Cell::new(&c.winner),
            Cell::new(c.shadowed.as_str().yellow()),
        ]);
    }
    println!(
        "{}\n{out}",
        format!("{} shadowed pattern(s)", conflicts.len()).yellow()
    );
    Ok(())
}

pub fn test(
    settings: &Settings,
    description: &str,
    location: Option<&str>,
    rules: Option<&str>,
) -> Result<()> {
    let table = RuleTable::load(&rules_path(settings, rules))?;
    let normalizer = Normalizer::new(&settings.date_format).with_rewrites(table.rewrites())?;

    let description = normalizer.normalize_description(description);
    let location = location.and_then(normalize_location);

    println!("Description: {description}");
    if let Some(loc) = &location {
        println!("Location:    {loc}");
    }
    match table.find_rule(&description, location.as_deref()) {
        Some(rule) => println!(
            "Category:    {} ({} {})",
            rule.category.green().bold(),
            rule.match_type.key(),
            rule.patterns.join(", ")
        ),
        None => println!("Category:    {}", "(unassigned)".yellow()),
    }
    Ok(())
}
