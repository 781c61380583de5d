//! Return records
//!
//! One record per loan, written once when the item comes back.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{LoanId, ReturnId};
use super::item::ItemCondition;
use super::loan::Loan;
use super::policy::PolicyError;

/// Fine owed for returning `loan` on `returned_on`, using the loan's own
/// policy snapshot. Zero on or before the due date.
pub fn fine_for(loan: &Loan, returned_on: NaiveDate) -> Result<Decimal, PolicyError> {
    let days_late = loan.days_late(returned_on);
    let rate = loan.policy.fine_per_day;
    Decimal::from(days_late)
        .checked_mul(rate)
        .ok_or(PolicyError::FineOverflow { rate, days_late })
}

/// Immutable record of a return
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRecord {
    pub id: ReturnId,

    pub loan: LoanId,

    pub returned_on: NaiveDate,

    pub condition: ItemCondition,

    #[serde(default)]
    pub notes: String,

    pub days_late: u32,

    /// Always >= 0
    pub fine: Decimal,

    pub recorded_at: DateTime<Utc>,
}

impl ReturnRecord {
    /// Builds the record for returning `loan` on `returned_on`
    pub fn for_loan(
        loan: &Loan,
        returned_on: NaiveDate,
        condition: ItemCondition,
        notes: Option<&str>,
        recorded_at: DateTime<Utc>,
    ) -> Result<Self, PolicyError> {
        Ok(Self {
            id: ReturnId::new(&loan.id, recorded_at),
            loan: loan.id.clone(),
            returned_on,
            condition,
            notes: notes.map(str::trim).unwrap_or_default().to_string(),
            days_late: loan.days_late(returned_on),
            fine: fine_for(loan, returned_on)?,
            recorded_at,
        })
    }
}
