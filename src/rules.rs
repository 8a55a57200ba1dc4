use std::collections::HashMap;
use std::path::Path;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, SortError};
use crate::models::{Category, Transaction};

/// Starter rule table written by `spendsort init`.
pub const DEFAULT_RULES: &str = include_str!("../assets/rules.toml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    #[default]
    Contains,
    StartsWith,
    Regex,
}

impl MatchType {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::Regex => "regex",
        }
    }
}

/// How necessary a group of spending is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    Essential,
    HaveToHave,
    NiceToHave,
    ShouldntHave,
}

impl Importance {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Essential => "Essential",
            Self::HaveToHave => "Have to Have",
            Self::NiceToHave => "Nice to Have",
            Self::ShouldntHave => "Shouldn't Have",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub category: String,
    pub patterns: Vec<String>,
    #[serde(default)]
    pub match_type: MatchType,
    /// Also test the normalized location, not just the description.
    #[serde(default)]
    pub match_location: bool,
    /// Broader bucket the category rolls up into for summaries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<Importance>,
}

/// Where a category rolls up to. Ungrouped categories stand as their own group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grouping {
    pub group: String,
    pub importance: Option<Importance>,
}

/// A description substitution applied during normalization, before matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rewrite {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Default, Deserialize)]
struct RuleFile {
    #[serde(default, rename = "rule")]
    rules: Vec<CategoryRule>,
    #[serde(default, rename = "rewrite")]
    rewrites: Vec<Rewrite>,
}

struct CompiledRule {
    rule: CategoryRule,
    needles: Vec<String>,
    regexes: Vec<Regex>,
}

impl CompiledRule {
    fn compile(rule: CategoryRule, position: usize) -> Result<Self> {
        if rule.category.trim().is_empty() {
            return Err(SortError::RuleTable(format!(
                "rule #{position} has an empty category"
            )));
        }
        if rule.patterns.is_empty() {
            return Err(SortError::RuleTable(format!(
                "rule #{position} ({}) has no patterns",
                rule.category
            )));
        }
        if rule.group.as_ref().is_some_and(|g| g.trim().is_empty()) {
            return Err(SortError::RuleTable(format!(
                "rule #{position} ({}) has an empty group",
                rule.category
            )));
        }
        if rule.patterns.iter().any(|p| p.trim().is_empty()) {
            return Err(SortError::RuleTable(format!(
                "rule #{position} ({}) has a blank pattern",
                rule.category
            )));
        }

        let regexes = if rule.match_type == MatchType::Regex {
            rule.patterns
                .iter()
                .map(|p| {
                    RegexBuilder::new(p).case_insensitive(true).build().map_err(|e| {
                        SortError::RuleTable(format!(
                            "rule #{position} ({}): invalid regex '{p}': {e}",
                            rule.category
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };
        let needles = rule.patterns.iter().map(|p| p.to_lowercase()).collect();

        Ok(Self {
            rule,
            needles,
            regexes,
        })
    }

    fn matches(&self, text: &str, folded: &str) -> bool {
        match self.rule.match_type {
            MatchType::Contains => self.needles.iter().any(|n| folded.contains(n.as_str())),
            MatchType::StartsWith => self.needles.iter().any(|n| folded.starts_with(n.as_str())),
            MatchType::Regex => self.regexes.iter().any(|re| re.is_match(text)),
        }
    }
}

/// A pattern listed under more than one category. Only the first listing
/// can ever win.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternConflict {
    pub pattern: String,
    pub winner: String,
    pub shadowed: String,
}

/// Ordered categorization rules. The first rule that matches wins.
pub struct RuleTable {
    rules: Vec<CompiledRule>,
    rewrites: Vec<Rewrite>,
}

impl std::fmt::Debug for RuleTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleTable")
            .field("rules", &self.rules.len())
            .field("rewrites", &self.rewrites.len())
            .finish()
    }
}

impl RuleTable {
    pub fn new(rules: Vec<CategoryRule>, rewrites: Vec<Rewrite>) -> Result<Self> {
        if rules.is_empty() {
            return Err(SortError::RuleTable(
                "rule table is empty; nothing could ever be categorized".to_string(),
            ));
        }
        if let Some(r) = rewrites.iter().find(|r| r.from.trim().is_empty()) {
            return Err(SortError::RuleTable(format!(
                "rewrite to '{}' has an empty 'from'",
                r.to
            )));
        }
        let rules = rules
            .into_iter()
            .enumerate()
            .map(|(i, rule)| CompiledRule::compile(rule, i + 1))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules, rewrites })
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let file: RuleFile = toml::from_str(content)
            .map_err(|e| SortError::RuleTable(format!("failed to parse rule table: {e}")))?;
        Self::new(file.rules, file.rewrites)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SortError::RuleTable(format!("cannot read {}: {e}", path.display()))
        })?;
        let table = Self::from_toml(&content)?;
        for conflict in table.conflicts() {
            warn!(
                pattern = %conflict.pattern,
                winner = %conflict.winner,
                shadowed = %conflict.shadowed,
                "pattern listed under two categories; the later one never wins"
            );
        }
        debug!(rules = table.len(), path = %path.display(), "loaded rule table");
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn rules(&self) -> impl Iterator<Item = &CategoryRule> {
        self.rules.iter().map(|cr| &cr.rule)
    }

    pub fn rewrites(&self) -> &[Rewrite] {
        &self.rewrites
    }

    /// First rule matching `description` (or `location`, for rules that
    /// opt in), in table order.
    pub fn find_rule(&self, description: &str, location: Option<&str>) -> Option<&CategoryRule> {
        if description.is_empty() {
            return None;
        }
        let folded = description.to_lowercase();
        let location = location.filter(|l| !l.is_empty());
        let folded_location = location.map(str::to_lowercase);

        self.rules
            .iter()
            .find(|cr| {
                cr.matches(description, &folded)
                    || (cr.rule.match_location
                        && location
                            .zip(folded_location.as_deref())
                            .is_some_and(|(loc, loc_folded)| cr.matches(loc, loc_folded)))
            })
            .map(|cr| &cr.rule)
    }

    pub fn classify(&self, txn: &Transaction) -> Category {
        match self.find_rule(&txn.description, txn.location.as_deref()) {
            Some(rule) => Category::Assigned(rule.category.clone()),
            None => Category::Unassigned,
        }
    }

    /// Group and importance for `category`, taken from the first rule for it
    /// that names a group.
    pub fn grouping(&self, category: &str) -> Grouping {
        let rules: Vec<&CategoryRule> = self.rules().filter(|r| r.category == category).collect();
        let grouped = rules.iter().find(|r| r.group.is_some());
        Grouping {
            group: grouped
                .and_then(|r| r.group.clone())
                .unwrap_or_else(|| category.to_string()),
            importance: grouped
                .or(rules.first())
                .and_then(|r| r.importance),
        }
    }

    /// Plain patterns that appear under more than one category.
    pub fn conflicts(&self) -> Vec<PatternConflict> {
        let mut first_seen: HashMap<&str, &str> = HashMap::new();
        let mut conflicts = Vec::new();
        for cr in &self.rules {
            if cr.rule.match_type == MatchType::Regex {
                continue;
            }
            for needle in &cr.needles {
                match first_seen.get(needle.as_str()) {
                    Some(winner) if *winner != cr.rule.category => {
                        conflicts.push(PatternConflict {
                            pattern: needle.clone(),
                            winner: winner.to_string(),
                            shadowed: cr.rule.category.clone(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        first_seen.insert(needle, &cr.rule.category);
                    }
                }
            }
        }
        conflicts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn rule(category: &str, patterns: &[&str], match_type: MatchType) -> CategoryRule {
        CategoryRule {
            category: category.to_string(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            match_type,
            match_location: false,
            group: None,
            importance: None,
        }
    }

    fn txn(description: &str, location: Option<&str>) -> Transaction {
        Transaction {
            line: 2,
            date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            description: description.to_string(),
            amount: Decimal::new(-999, 2),
            location: location.map(str::to_string),
        }
    }

    fn table(rules: Vec<CategoryRule>) -> RuleTable {
        RuleTable::new(rules, Vec::new()).unwrap()
    }

    #[test]
    fn test_contains_rule_is_case_insensitive() {
        let t = table(vec![rule("Entertainment", &["spotify"], MatchType::Contains)]);
        assert_eq!(
            t.classify(&txn("SPOTIFY AB", None)),
            Category::Assigned("Entertainment".to_string())
        );
    }

    #[test]
    fn test_starts_with_rule() {
        let t = table(vec![rule("Fees", &["STRIPE"], MatchType::StartsWith)]);
        assert!(t.find_rule("STRIPE PAYMENT", None).is_some());
        assert!(t.find_rule("PAY STRIPE FEE", None).is_none());
    }

    #[test]
    fn test_regex_rule() {
        let t = table(vec![rule("Hosting", &[r"^aws.*\d+$"], MatchType::Regex)]);
        assert!(t.find_rule("AWS Services 12345", None).is_some());
        assert!(t.find_rule("AWS Services", None).is_none());
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let t = table(vec![
            rule("Coffee", &["starbucks"], MatchType::Contains),
            rule("Eating Out", &["starbucks", "restaurant"], MatchType::Contains),
        ]);
        assert_eq!(t.find_rule("STARBUCKS 123", None).unwrap().category, "Coffee");

        let reversed = table(vec![
            rule("Eating Out", &["starbucks", "restaurant"], MatchType::Contains),
            rule("Coffee", &["starbucks"], MatchType::Contains),
        ]);
        assert_eq!(
            reversed.find_rule("STARBUCKS 123", None).unwrap().category,
            "Eating Out"
        );
    }

    #[test]
    fn test_any_pattern_in_set_matches() {
        let t = table(vec![rule("Food", &["lidl", "biedronka"], MatchType::Contains)]);
        assert!(t.find_rule("zakup biedronka 1234", None).is_some());
        assert!(t.find_rule("LIDL SP. Z O.O.", None).is_some());
    }

    #[test]
    fn test_unmatched_is_unassigned() {
        let t = table(vec![rule("Entertainment", &["spotify"], MatchType::Contains)]);
        assert_eq!(t.classify(&txn("UNKNOWN MERCHANT XYZ", None)), Category::Unassigned);
    }

    #[test]
    fn test_empty_description_matches_nothing() {
        let t = table(vec![rule("Anything", &[".*"], MatchType::Regex)]);
        assert_eq!(t.classify(&txn("", None)), Category::Unassigned);
    }

    #[test]
    fn test_location_only_checked_when_enabled() {
        let mut by_place = rule("Mall", &["manufaktura"], MatchType::Contains);
        let t = table(vec![by_place.clone()]);
        assert!(t.find_rule("card payment", Some("Manufaktura, łódź")).is_none());

        by_place.match_location = true;
        let t = table(vec![by_place]);
        assert!(t.find_rule("card payment", Some("Manufaktura, łódź")).is_some());
        assert!(t.find_rule("card payment", None).is_none());
    }

    #[test]
    fn test_unicode_folding() {
        let t = table(vec![rule("Food", &["intermarché"], MatchType::Contains)]);
        assert!(t.find_rule("INTERMARCHÉ 22", None).is_some());
    }

    #[test]
    fn test_empty_table_is_rejected() {
        let err = RuleTable::new(Vec::new(), Vec::new()).unwrap_err();
        assert!(matches!(err, SortError::RuleTable(_)));
        assert!(matches!(RuleTable::from_toml(""), Err(SortError::RuleTable(_))));
    }

    #[test]
    fn test_blank_pattern_and_bad_regex_are_rejected() {
        assert!(matches!(
            RuleTable::new(vec![rule("Food", &["lidl", " "], MatchType::Contains)], Vec::new()),
            Err(SortError::RuleTable(_))
        ));
        assert!(matches!(
            RuleTable::new(vec![rule("Food", &[], MatchType::Contains)], Vec::new()),
            Err(SortError::RuleTable(_))
        ));
        assert!(matches!(
            RuleTable::new(vec![rule("Food", &["(unclosed"], MatchType::Regex)], Vec::new()),
            Err(SortError::RuleTable(_))
        ));
    }

    #[test]
    fn test_from_toml_keeps_file_order() {
        let t = RuleTable::from_toml(
            r#"
[[rule]]
category = "Coffee"
patterns = ["starbucks"]

[[rule]]
category = "Hosting"
patterns = ['^aws']
match_type = "regex"

[[rewrite]]
from = "mcd"
to = "McDonalds restaurant"
"#,
        )
        .unwrap();
        let categories: Vec<&str> = t.rules().map(|r| r.category.as_str()).collect();
        assert_eq!(categories, vec!["Coffee", "Hosting"]);
        assert_eq!(t.rules().nth(1).unwrap().match_type, MatchType::Regex);
        assert_eq!(t.rewrites().len(), 1);
    }

    #[test]
    fn test_load_unreadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = RuleTable::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, SortError::RuleTable(_)));
    }

    #[test]
    fn test_conflicts_report_shadowed_patterns() {
        let t = table(vec![
            rule("Coffee", &["starbucks", "cafe"], MatchType::Contains),
            rule("Eating Out", &["Starbucks", "pizza"], MatchType::Contains),
            rule("Coffee", &["cafe"], MatchType::Contains),
        ]);
        assert_eq!(
            t.conflicts(),
            vec![PatternConflict {
                pattern: "starbucks".to_string(),
                winner: "Coffee".to_string(),
                shadowed: "Eating Out".to_string(),
            }]
        );
    }

    #[test]
    fn test_grouping_from_toml() {
        let t = RuleTable::from_toml(
            r#"
[[rule]]
category = "Fuel"
group = "Car"
importance = "have_to_have"
patterns = ["orlen"]

[[rule]]
category = "Alcohol"
importance = "shouldnt_have"
patterns = ["wine"]

[[rule]]
category = "Misc"
patterns = ["kiosk"]
"#,
        )
        .unwrap();
        assert_eq!(
            t.grouping("Fuel"),
            Grouping {
                group: "Car".to_string(),
                importance: Some(Importance::HaveToHave),
            }
        );
        assert_eq!(t.grouping("Alcohol").group, "Alcohol");
        assert_eq!(t.grouping("Alcohol").importance, Some(Importance::ShouldntHave));
        assert_eq!(t.grouping("Misc").importance, None);
        assert_eq!(Importance::ShouldntHave.label(), "Shouldn't Have");
    }

    #[test]
    fn test_empty_group_and_unknown_importance_are_rejected() {
        let err = RuleTable::from_toml(
            "[[rule]]\ncategory = \"Fuel\"\ngroup = \" \"\npatterns = [\"orlen\"]\n",
        )
        .unwrap_err();
        assert!(matches!(err, SortError::RuleTable(_)));

        let err = RuleTable::from_toml(
            "[[rule]]\ncategory = \"Fuel\"\nimportance = \"vital\"\npatterns = [\"orlen\"]\n",
        )
        .unwrap_err();
        assert!(matches!(err, SortError::RuleTable(_)));
    }

    #[test]
    fn test_default_rules_parse() {
        let t = RuleTable::from_toml(DEFAULT_RULES).unwrap();
        assert!(t.len() > 10);
        assert!(t.conflicts().is_empty());
        assert_eq!(
            t.find_rule("card payment // spotify ab", None).unwrap().category,
            "Subscriptions"
        );
        assert!(t.rules().all(|r| r.group.is_some() && r.importance.is_some()));
        assert_eq!(t.grouping("Subscriptions").group, "Entertainment");
        assert_eq!(t.grouping("Green Food").importance, Some(Importance::Essential));
    }
}
