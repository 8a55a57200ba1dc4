use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::models::{Category, ClassifiedTransaction, RawRow, RejectedRow};
use crate::normalizer::Normalizer;
use crate::rules::{Importance, RuleTable};

/// Outcome of one run. Every input row lands in exactly one of the three
/// sequences, each kept in input order.
#[derive(Debug, Default)]
pub struct Classification {
    pub categorized: Vec<ClassifiedTransaction>,
    pub unassigned: Vec<ClassifiedTransaction>,
    pub rejected: Vec<RejectedRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryTotal {
    pub category: Category,
    pub count: usize,
    pub total: Decimal,
}

/// Categorized spending rolled up by rule group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupTotal {
    pub group: String,
    pub importance: Option<Importance>,
    pub count: usize,
    pub total: Decimal,
}

impl Classification {
    pub fn total_rows(&self) -> usize {
        self.categorized.len() + self.unassigned.len() + self.rejected.len()
    }

    /// Per-category counts and sums in order of first appearance, with the
    /// unassigned bucket last.
    pub fn summary(&self) -> Vec<CategoryTotal> {
        let mut totals: Vec<CategoryTotal> = Vec::new();
        for c in &self.categorized {
            match totals.iter_mut().find(|t| t.category == c.category) {
                Some(t) => {
                    t.count += 1;
                    t.total += c.transaction.amount;
                }
                None => totals.push(CategoryTotal {
                    category: c.category.clone(),
                    count: 1,
                    total: c.transaction.amount,
                }),
            }
        }
        if !self.unassigned.is_empty() {
            totals.push(CategoryTotal {
                category: Category::Unassigned,
                count: self.unassigned.len(),
                total: self.unassigned.iter().map(|c| c.transaction.amount).sum(),
            });
        }
        totals
    }

    /// Categorized rows summed per group in order of first appearance.
    /// Unassigned rows have no group and are left out.
    pub fn group_summary(&self, rules: &RuleTable) -> Vec<GroupTotal> {
        let mut totals: Vec<GroupTotal> = Vec::new();
        for c in &self.categorized {
            let Some(label) = c.category.label() else {
                continue;
            };
            let grouping = rules.grouping(label);
            let amount = c.transaction.amount;
            match totals.iter_mut().find(|t| t.group == grouping.group) {
                Some(t) => {
                    t.count += 1;
                    t.total += amount;
                    t.importance = t.importance.or(grouping.importance);
                }
                None => totals.push(GroupTotal {
                    group: grouping.group,
                    importance: grouping.importance,
                    count: 1,
                    total: amount,
                }),
            }
        }
        totals
    }
}

/// Normalize and categorize every row. Malformed rows are collected into
/// `rejected` and never stop the rest of the batch.
pub fn classify(rows: Vec<RawRow>, normalizer: &Normalizer, rules: &RuleTable) -> Classification {
    rows.into_iter()
        .fold(Classification::default(), |mut out, raw| {
            let line = raw.line;
            let description = raw.description.clone();
            match normalizer.normalize(raw) {
                Ok(transaction) => {
                    let category = rules.classify(&transaction);
                    debug!(line, ?category, description = %transaction.description, "classified");
                    let classified = ClassifiedTransaction {
                        transaction,
                        category,
                    };
                    match classified.category {
                        Category::Assigned(_) => out.categorized.push(classified),
                        Category::Unassigned => out.unassigned.push(classified),
                    }
                }
                Err(error) => {
                    warn!(line, %error, "rejected row");
                    out.rejected.push(RejectedRow {
                        line,
                        description,
                        error,
                    });
                }
            }
            out
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RowError;
    use crate::rules::{CategoryRule, MatchType};

    fn raw(line: usize, description: &str, amount: &str, date: &str) -> RawRow {
        RawRow {
            line,
            date: date.to_string(),
            description: description.to_string(),
            amount: amount.to_string(),
            location: None,
        }
    }

    fn rules(entries: &[(&str, &[&str])]) -> RuleTable {
        let rules = entries
            .iter()
            .map(|(category, patterns)| CategoryRule {
                category: category.to_string(),
                patterns: patterns.iter().map(|p| p.to_string()).collect(),
                match_type: MatchType::Contains,
                match_location: false,
                group: None,
                importance: None,
            })
            .collect();
        RuleTable::new(rules, Vec::new()).unwrap()
    }

    fn sample_rows() -> Vec<RawRow> {
        vec![
            raw(2, "SPOTIFY AB", "-9.99", "2024-01-05"),
            raw(3, "UNKNOWN MERCHANT XYZ", "-50.00", "2024-01-06"),
            raw(4, "BIEDRONKA 123", "oops", "2024-01-06"),
            raw(5, "LIDL LODZ", "-123.40", "2024-01-07"),
            raw(6, "NETFLIX.COM", "-43.00", "2024-01-08"),
            raw(7, "ATM WITHDRAWAL", "-200.00", "2024-01-09"),
            raw(8, "BIEDRONKA 77", "-12.10", "bad-date"),
        ]
    }

    fn sample_rules() -> RuleTable {
        rules(&[
            ("Entertainment", &["spotify", "netflix"]),
            ("Food", &["lidl", "biedronka"]),
        ])
    }

    #[test]
    fn test_end_to_end_example() {
        let out = classify(
            vec![
                raw(2, "SPOTIFY AB", "-9.99", "2024-01-05"),
                raw(3, "UNKNOWN MERCHANT XYZ", "-50.00", "2024-01-06"),
            ],
            &Normalizer::default(),
            &rules(&[("Entertainment", &["spotify"])]),
        );
        assert_eq!(out.categorized.len(), 1);
        let c = &out.categorized[0];
        assert_eq!(c.category, Category::Assigned("Entertainment".to_string()));
        assert_eq!(c.transaction.description, "SPOTIFY AB");
        assert_eq!(c.transaction.amount.to_string(), "-9.99");
        assert_eq!(c.transaction.date.to_string(), "2024-01-05");

        assert_eq!(out.unassigned.len(), 1);
        let u = &out.unassigned[0];
        assert_eq!(u.category, Category::Unassigned);
        assert_eq!(u.transaction.description, "UNKNOWN MERCHANT XYZ");
        assert_eq!(u.transaction.amount.to_string(), "-50.00");
        assert!(out.rejected.is_empty());
    }

    #[test]
    fn test_every_row_lands_exactly_once() {
        let rows = sample_rows();
        let n = rows.len();
        let out = classify(rows, &Normalizer::default(), &sample_rules());
        assert_eq!(out.total_rows(), n);

        let mut lines: Vec<usize> = out
            .categorized
            .iter()
            .chain(&out.unassigned)
            .map(|c| c.transaction.line)
            .chain(out.rejected.iter().map(|r| r.line))
            .collect();
        lines.sort();
        assert_eq!(lines, vec![2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_partition_preserves_input_order() {
        let out = classify(sample_rows(), &Normalizer::default(), &sample_rules());
        let categorized: Vec<usize> = out.categorized.iter().map(|c| c.transaction.line).collect();
        let unassigned: Vec<usize> = out.unassigned.iter().map(|c| c.transaction.line).collect();
        assert_eq!(categorized, vec![2, 5, 6]);
        assert_eq!(unassigned, vec![3, 7]);
    }

    #[test]
    fn test_malformed_rows_are_reported_not_fatal() {
        let out = classify(sample_rows(), &Normalizer::default(), &sample_rules());
        assert_eq!(out.rejected.len(), 2);
        assert_eq!(out.rejected[0].line, 4);
        assert_eq!(out.rejected[0].description, "BIEDRONKA 123");
        assert!(matches!(out.rejected[0].error, RowError::InvalidAmount(_)));
        assert_eq!(out.rejected[1].line, 8);
        assert!(matches!(out.rejected[1].error, RowError::InvalidDate(_, _)));
        // the rows after the bad amount still went through
        assert!(out.categorized.iter().any(|c| c.transaction.line == 5));
    }

    #[test]
    fn test_overlapping_rules_first_wins() {
        let out = classify(
            vec![raw(2, "STARBUCKS RESTAURANT", "-15.00", "2024-01-05")],
            &Normalizer::default(),
            &rules(&[("Coffee", &["starbucks"]), ("Eating Out", &["restaurant"])]),
        );
        assert_eq!(
            out.categorized[0].category,
            Category::Assigned("Coffee".to_string())
        );
    }

    #[test]
    fn test_amount_fidelity() {
        let out = classify(
            vec![raw(2, "LIDL", "-123.40", "2024-01-05")],
            &Normalizer::default(),
            &sample_rules(),
        );
        assert_eq!(out.categorized[0].transaction.amount.to_string(), "-123.40");
    }

    #[test]
    fn test_deterministic() {
        let a = classify(sample_rows(), &Normalizer::default(), &sample_rules());
        let b = classify(sample_rows(), &Normalizer::default(), &sample_rules());
        assert_eq!(a.categorized, b.categorized);
        assert_eq!(a.unassigned, b.unassigned);
        assert_eq!(a.rejected, b.rejected);
    }

    #[test]
    fn test_summary_totals() {
        let out = classify(sample_rows(), &Normalizer::default(), &sample_rules());
        let summary = out.summary();
        assert_eq!(
            summary,
            vec![
                CategoryTotal {
                    category: Category::Assigned("Entertainment".to_string()),
                    count: 2,
                    total: Decimal::new(-5299, 2),
                },
                CategoryTotal {
                    category: Category::Assigned("Food".to_string()),
                    count: 1,
                    total: Decimal::new(-12340, 2),
                },
                CategoryTotal {
                    category: Category::Unassigned,
                    count: 2,
                    total: Decimal::new(-25000, 2),
                },
            ]
        );
    }

    #[test]
    fn test_group_summary() {
        let table = RuleTable::from_toml(
            r#"
[[rule]]
category = "Subscriptions"
group = "Entertainment"
importance = "nice_to_have"
patterns = ["spotify", "netflix"]

[[rule]]
category = "Food"
group = "Food"
importance = "essential"
patterns = ["lidl", "biedronka"]

[[rule]]
category = "Cash"
patterns = ["atm"]
"#,
        )
        .unwrap();
        let out = classify(sample_rows(), &Normalizer::default(), &table);
        assert_eq!(
            out.group_summary(&table),
            vec![
                GroupTotal {
                    group: "Entertainment".to_string(),
                    importance: Some(Importance::NiceToHave),
                    count: 2,
                    total: Decimal::new(-5299, 2),
                },
                GroupTotal {
                    group: "Food".to_string(),
                    importance: Some(Importance::Essential),
                    count: 1,
                    total: Decimal::new(-12340, 2),
                },
                GroupTotal {
                    group: "Cash".to_string(),
                    importance: None,
                    count: 1,
                    total: Decimal::new(-20000, 2),
                },
            ]
        );
    }

    #[test]
    fn test_blank_field_row_is_rejected_not_dropped() {
        let content = "Data operacji,Data waluty,Typ transakcji,Kwota,Waluta,Opis transakcji,,,\n\
2024-01-05,2024-01-05,Card payment,-9.99,PLN,SPOTIFY AB,,,\n\
,,,,,,,,\n\
2024-01-06,2024-01-06,Card payment,-1.00,PLN,KIOSK,,,\n";
        let rows = crate::importer::parse_export(content).unwrap();
        let out = classify(rows, &Normalizer::default(), &sample_rules());
        assert_eq!(out.total_rows(), 3);
        assert_eq!(out.rejected.len(), 1);
        assert_eq!(out.rejected[0].line, 3);
        assert_eq!(out.rejected[0].error, RowError::EmptyDescription);
    }

    #[test]
    fn test_empty_input() {
        let out = classify(Vec::new(), &Normalizer::default(), &sample_rules());
        assert_eq!(out.total_rows(), 0);
        assert!(out.summary().is_empty());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone, Copy, PartialEq)]
        enum Kind {
            Matched,
            Unmatched,
            BadAmount,
            BadDate,
            Blank,
        }

        fn arb_kind() -> impl Strategy<Value = Kind> {
            prop_oneof![
                3 => Just(Kind::Matched),
                3 => Just(Kind::Unmatched),
                1 => Just(Kind::BadAmount),
                1 => Just(Kind::BadDate),
                1 => Just(Kind::Blank),
            ]
        }

        fn build(specs: &[(Kind, i64)]) -> Vec<RawRow> {
            specs
                .iter()
                .enumerate()
                .map(|(i, &(kind, cents))| {
                    let amount = Decimal::new(cents, 2).to_string();
                    match kind {
                        Kind::Matched => raw(i + 2, &format!("SPOTIFY {i}"), &amount, "2024-01-05"),
                        Kind::Unmatched => raw(i + 2, &format!("MERCHANT {i}"), &amount, "2024-01-05"),
                        Kind::BadAmount => raw(i + 2, &format!("LIDL {i}"), "12,34,5", "2024-01-05"),
                        Kind::BadDate => raw(i + 2, &format!("LIDL {i}"), &amount, "2024-13-01"),
                        Kind::Blank => raw(i + 2, "   ", &amount, "2024-01-05"),
                    }
                })
                .collect()
        }

        fn lines_of(specs: &[(Kind, i64)], wanted: &[Kind]) -> Vec<usize> {
            specs
                .iter()
                .enumerate()
                .filter(|(_, (kind, _))| wanted.contains(kind))
                .map(|(i, _)| i + 2)
                .collect()
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                failure_persistence: None,
                ..ProptestConfig::default()
            })]

            #[test]
            fn every_row_is_accounted_for_in_order(
                specs in prop::collection::vec((arb_kind(), -10_000_000i64..10_000_000), 0..60)
            ) {
                let rows = build(&specs);
                let out = classify(rows, &Normalizer::default(), &sample_rules());

                prop_assert_eq!(out.total_rows(), specs.len());

                let categorized: Vec<usize> = out.categorized.iter().map(|c| c.transaction.line).collect();
                let unassigned: Vec<usize> = out.unassigned.iter().map(|c| c.transaction.line).collect();
                let rejected: Vec<usize> = out.rejected.iter().map(|r| r.line).collect();
                prop_assert_eq!(categorized, lines_of(&specs, &[Kind::Matched]));
                prop_assert_eq!(unassigned, lines_of(&specs, &[Kind::Unmatched]));
                prop_assert_eq!(
                    rejected,
                    lines_of(&specs, &[Kind::BadAmount, Kind::BadDate, Kind::Blank])
                );
            }

            #[test]
            fn amounts_survive_unchanged(
                specs in prop::collection::vec((Just(Kind::Matched), -10_000_000i64..10_000_000), 1..30)
            ) {
                let out = classify(build(&specs), &Normalizer::default(), &sample_rules());
                prop_assert_eq!(out.categorized.len(), specs.len());
                for (c, (_, cents)) in out.categorized.iter().zip(&specs) {
                    prop_assert_eq!(c.transaction.amount, Decimal::new(*cents, 2));
                    prop_assert_eq!(c.transaction.amount.to_string(), Decimal::new(*cents, 2).to_string());
                }
            }
        }
    }
}
