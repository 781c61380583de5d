//! Loan domain model
//!
//! A loan ties one item to one member for a period fixed by the policy
//! in force when the loan was created. The policy is copied into the loan
//! and never re-read, so later policy edits do not move due dates or fines.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::id::{ItemCode, LoanId, PersonId};
use super::policy::{Policy, PolicyError};

/// State of a loan.
///
/// Transitions only move forward: `Active -> Overdue -> Returned` or
/// `Active -> Returned`. `Returned` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoanState {
    #[default]
    Active,
    Overdue,
    Returned,
}

impl LoanState {
    /// States in which the item is still out
    pub const OPEN: [LoanState; 2] = [LoanState::Active, LoanState::Overdue];

    pub fn as_str(&self) -> &'static str {
        match self {
            LoanState::Active => "active",
            LoanState::Overdue => "overdue",
            LoanState::Returned => "returned",
        }
    }

    /// Returns true while the item has not come back
    pub fn is_open(&self) -> bool {
        !matches!(self, LoanState::Returned)
    }

    fn rank(&self) -> u8 {
        match self {
            LoanState::Active => 0,
            LoanState::Overdue => 1,
            LoanState::Returned => 2,
        }
    }

    /// Returns true if moving from `self` to `next` goes forward
    pub fn can_become(&self, next: LoanState) -> bool {
        self.rank() < next.rank()
    }
}

impl fmt::Display for LoanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoanState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(LoanState::Active),
            "overdue" => Ok(LoanState::Overdue),
            "returned" => Ok(LoanState::Returned),
            other => Err(format!("Unknown loan state: {}", other)),
        }
    }
}

/// A loan of one item to one member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,

    pub member: PersonId,

    pub item: ItemCode,

    /// Librarian who authorized the loan
    pub agent: PersonId,

    pub loan_date: NaiveDate,

    pub due_date: NaiveDate,

    /// Persisted state. May lag behind [`Loan::derive_state`] for overdue loans.
    pub state: LoanState,

    /// Policy in force when the loan was created
    pub policy: Policy,

    pub created_at: DateTime<Utc>,
}

impl Loan {
    /// Creates an active loan, computing the due date from the policy.
    ///
    /// Fails when the due date cannot be represented.
    pub fn open(
        member: PersonId,
        item: ItemCode,
        agent: PersonId,
        policy: Policy,
        loan_date: NaiveDate,
        created_at: DateTime<Utc>,
    ) -> Result<Self, PolicyError> {
        let due_date = policy.due_date(loan_date)?;
        let id = LoanId::new(&member, &item, created_at);
        Ok(Self {
            id,
            member,
            item,
            agent,
            loan_date,
            due_date,
            state: LoanState::Active,
            policy,
            created_at,
        })
    }

    /// Logical state of the loan on `today`.
    ///
    /// Returned stays Returned; otherwise a loan past its due date is
    /// Overdue, else Active. Nothing is written.
    pub fn derive_state(&self, today: NaiveDate) -> LoanState {
        if self.state == LoanState::Returned {
            LoanState::Returned
        } else if today > self.due_date {
            LoanState::Overdue
        } else {
            LoanState::Active
        }
    }

    /// Days from `today` until the due date (negative once past due)
    pub fn days_until_due(&self, today: NaiveDate) -> i64 {
        (self.due_date - today).num_days()
    }

    /// Whole days past the due date on `returned_on`, never negative
    pub fn days_late(&self, returned_on: NaiveDate) -> u32 {
        let late = (returned_on - self.due_date).num_days().max(0);
        u32::try_from(late).unwrap_or(u32::MAX)
    }
}
