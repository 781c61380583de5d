//! Lending policies
//!
//! A policy fixes, per category of member, how long a loan runs, how many
//! loans may be open at once, and what each overdue day costs.

use chrono::{Datelike, Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PolicyError {
    #[error("Loan duration must be at least one day")]
    ZeroDuration,

    #[error("Maximum simultaneous loans must be at least one")]
    ZeroLimit,

    #[error("Fine per day cannot be negative: {0}")]
    NegativeFine(Decimal),

    #[error("Loan duration of {0} days exceeds the maximum of {max} days", max = Policy::MAX_LOAN_DAYS)]
    DurationTooLong(u32),

    #[error("Fine per day of {0} exceeds the maximum of {max}", max = Policy::MAX_FINE_PER_DAY)]
    FineTooHigh(Decimal),

    #[error("A {loan_days}-day loan starting {loan_date} ends past year 9999")]
    DueDateOutOfRange { loan_date: NaiveDate, loan_days: u32 },

    #[error("Fine of {rate} per day over {days_late} late days overflows")]
    FineOverflow { rate: Decimal, days_late: u32 },

    #[error("Unknown policy category: {0}")]
    UnknownCategory(String),
}

/// Known policy categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PolicyCategory {
    #[default]
    General,
    Student,
    Faculty,
}

impl PolicyCategory {
    pub const ALL: [PolicyCategory; 3] = [
        PolicyCategory::General,
        PolicyCategory::Student,
        PolicyCategory::Faculty,
    ];

    /// Storage key for the category
    pub fn key(&self) -> &'static str {
        match self {
            PolicyCategory::General => "GENERAL",
            PolicyCategory::Student => "STUDENT",
            PolicyCategory::Faculty => "FACULTY",
        }
    }

    /// Maps a free-form member category to a policy category.
    ///
    /// Matching ignores case, surrounding whitespace and Latin accents, so
    /// "Estándar", "estandar" and "STANDARD" all land on `General`.
    /// Returns `None` for blank or unrecognised input.
    pub fn from_member_category(raw: &str) -> Option<Self> {
        let folded = fold(raw);
        match folded.as_str() {
            "standard" | "estandar" | "general" => Some(PolicyCategory::General),
            "student" | "estudiante" => Some(PolicyCategory::Student),
            "faculty" | "docente" | "teacher" => Some(PolicyCategory::Faculty),
            _ => None,
        }
    }
}

impl fmt::Display for PolicyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for PolicyCategory {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PolicyCategory::ALL
            .into_iter()
            .find(|c| c.key().eq_ignore_ascii_case(s.trim()))
            .or_else(|| PolicyCategory::from_member_category(s))
            .ok_or_else(|| PolicyError::UnknownCategory(s.to_string()))
    }
}

/// Lowercases, trims and strips common Latin diacritics
fn fold(raw: &str) -> String {
    raw.trim()
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' | 'ã' | 'å' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

/// Lending rules for one category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub category: PolicyCategory,

    /// Days from loan date to due date
    pub loan_days: u32,

    /// Maximum loans a member may hold open at once
    pub max_open_loans: u32,

    /// Fine charged per overdue day
    pub fine_per_day: Decimal,
}

impl Policy {
    /// Ten years
    pub const MAX_LOAN_DAYS: u32 = 3650;

    pub const MAX_FINE_PER_DAY: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

    /// Creates a validated policy
    pub fn new(
        category: PolicyCategory,
        loan_days: u32,
        max_open_loans: u32,
        fine_per_day: Decimal,
    ) -> Result<Self, PolicyError> {
        let policy = Self {
            category,
            loan_days,
            max_open_loans,
            fine_per_day,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Checks the numeric invariants
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.loan_days == 0 {
            return Err(PolicyError::ZeroDuration);
        }
        if self.max_open_loans == 0 {
            return Err(PolicyError::ZeroLimit);
        }
        if self.loan_days > Self::MAX_LOAN_DAYS {
            return Err(PolicyError::DurationTooLong(self.loan_days));
        }
        if self.fine_per_day < Decimal::ZERO {
            return Err(PolicyError::NegativeFine(self.fine_per_day));
        }
        if self.fine_per_day > Self::MAX_FINE_PER_DAY {
            return Err(PolicyError::FineTooHigh(self.fine_per_day));
        }
        Ok(())
    }

    /// Due date for a loan starting on `loan_date`.
    ///
    /// Dates are stored as ISO text, so anything past year 9999 is refused.
    pub fn due_date(&self, loan_date: NaiveDate) -> Result<NaiveDate, PolicyError> {
        loan_date
            .checked_add_days(Days::new(u64::from(self.loan_days)))
            .filter(|due| due.year() <= 9999)
            .ok_or(PolicyError::DueDateOutOfRange {
                loan_date,
                loan_days: self.loan_days,
            })
    }

    /// Returns true if a member holding `open_loans` may take one more
    pub fn allows_another(&self, open_loans: usize) -> bool {
        open_loans < self.max_open_loans as usize
    }

    /// Policies a fresh desk starts with
    pub fn defaults() -> Vec<Policy> {
        vec![
            Policy {
                category: PolicyCategory::General,
                loan_days: 14,
                max_open_loans: 3,
                fine_per_day: Decimal::from(50),
            },
            Policy {
                category: PolicyCategory::Student,
                loan_days: 15,
                max_open_loans: 3,
                fine_per_day: Decimal::from(30),
            },
            Policy {
                category: PolicyCategory::Faculty,
                loan_days: 30,
                max_open_loans: 5,
                fine_per_day: Decimal::from(20),
            },
        ]
    }
}
