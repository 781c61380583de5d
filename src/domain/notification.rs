//! Notices about loans (due-soon reminders and overdue notices)

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::id::{LoanId, NotificationId};
use super::loan::{Loan, LoanState};

/// Message text of an overdue notice
pub const OVERDUE_MESSAGE: &str = "overdue notice";

/// Message text of a reminder sent `lead_days` before the due date
pub fn reminder_message(lead_days: u32) -> String {
    match lead_days {
        0 => "reminder: due today".to_string(),
        1 => "reminder: due in 1 day".to_string(),
        n => format!("reminder: due in {} days", n),
    }
}

/// Kind of notice a loan calls for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Reminder,
    Overdue,
}

impl NoticeKind {
    /// Decides which notice, if any, `loan` calls for on `today`.
    ///
    /// A reminder goes out when the loan is logically active and exactly
    /// `lead_days` from its due date; an overdue notice whenever it is
    /// logically overdue.
    pub fn for_loan(loan: &Loan, today: NaiveDate, lead_days: u32) -> Option<Self> {
        match loan.derive_state(today) {
            LoanState::Active if loan.days_until_due(today) == i64::from(lead_days) => {
                Some(NoticeKind::Reminder)
            }
            LoanState::Overdue => Some(NoticeKind::Overdue),
            _ => None,
        }
    }

    /// Message text for this kind
    pub fn message(&self, lead_days: u32) -> String {
        match self {
            NoticeKind::Reminder => reminder_message(lead_days),
            NoticeKind::Overdue => OVERDUE_MESSAGE.to_string(),
        }
    }
}

/// A notice attached to a loan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,

    pub loan: LoanId,

    pub message: String,

    pub created_at: DateTime<Utc>,

    /// Set once the delivery step has handled the notice
    #[serde(default)]
    pub delivered: bool,
}

impl Notification {
    pub fn new(loan: LoanId, message: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        let message = message.into();
        Self {
            id: NotificationId::new(&loan, &message, created_at),
            loan,
            message,
            created_at,
            delivered: false,
        }
    }
}
