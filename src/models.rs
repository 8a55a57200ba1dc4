use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::error::RowError;

/// One row as read from the bank export, before any cleaning.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// 1-based line in the source file, used when reporting rejections.
    pub line: usize,
    pub date: String,
    pub description: String,
    pub amount: String,
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub line: usize,
    pub date: NaiveDate,
    pub description: String,
    /// Always scale 2.
    pub amount: Decimal,
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Category {
    Assigned(String),
    Unassigned,
}

impl Category {
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Assigned(label) => Some(label),
            Self::Unassigned => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedTransaction {
    pub transaction: Transaction,
    pub category: Category,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRow {
    pub line: usize,
    pub description: String,
    pub error: RowError,
}
