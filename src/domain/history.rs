//! Audit trail entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{ItemCode, LoanId, PersonId};
use super::loan::Loan;
use super::return_record::ReturnRecord;

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    LoanCreated,
    ReturnRegistered,
}

impl HistoryKind {
    pub fn label(&self) -> &'static str {
        match self {
            HistoryKind::LoanCreated => "loan",
            HistoryKind::ReturnRegistered => "return",
        }
    }
}

/// One line of the audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    pub kind: HistoryKind,
    pub member: PersonId,
    pub item: ItemCode,
    pub loan: LoanId,
    pub details: String,
}

impl HistoryEntry {
    pub fn loan_created(loan: &Loan, at: DateTime<Utc>) -> Self {
        Self {
            at,
            kind: HistoryKind::LoanCreated,
            member: loan.member.clone(),
            item: loan.item.clone(),
            loan: loan.id.clone(),
            details: format!(
                "loan created by {}, due {} ({} policy)",
                loan.agent, loan.due_date, loan.policy.category
            ),
        }
    }

    pub fn return_registered(loan: &Loan, record: &ReturnRecord) -> Self {
        Self {
            at: record.recorded_at,
            kind: HistoryKind::ReturnRegistered,
            member: loan.member.clone(),
            item: loan.item.clone(),
            loan: loan.id.clone(),
            details: format!(
                "return registered, condition {}, {} days late, fine {}",
                record.condition, record.days_late, record.fine
            ),
        }
    }
}
