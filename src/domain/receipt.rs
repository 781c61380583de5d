//! Printable loan and return slips

use serde::Serialize;
use std::fmt::Write as _;

use super::item::Item;
use super::loan::Loan;
use super::person::Person;
use super::return_record::ReturnRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptKind {
    Loan,
    Return,
}

impl ReceiptKind {
    fn heading(&self) -> &'static str {
        match self {
            ReceiptKind::Loan => "LOAN",
            ReceiptKind::Return => "RETURN",
        }
    }
}

/// A rendered slip for a loan, optionally including its return
#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    pub kind: ReceiptKind,
    pub body: String,
}

impl Receipt {
    /// Renders the slip for `loan`. When `record` is given the slip
    /// describes the return instead.
    pub fn render(loan: &Loan, member: &Person, item: &Item, record: Option<&ReturnRecord>) -> Self {
        let kind = if record.is_some() {
            ReceiptKind::Return
        } else {
            ReceiptKind::Loan
        };

        let mut body = String::new();
        let _ = writeln!(body, "===== {} RECEIPT =====", kind.heading());
        let _ = writeln!(body, "Loan:     {}", loan.id);
        let _ = writeln!(body, "Member:   {} ({})", member.name, member.id);
        if let Some(email) = member.contact_address() {
            let _ = writeln!(body, "Email:    {}", email);
        }
        match &item.title {
            Some(title) => {
                let _ = writeln!(body, "Item:     {} - {}", item.code, title);
            }
            None => {
                let _ = writeln!(body, "Item:     {}", item.code);
            }
        }
        let _ = writeln!(body, "Lent on:  {}", loan.loan_date);
        let _ = writeln!(body, "Due:      {}", loan.due_date);
        let _ = writeln!(body, "Policy:   {}", loan.policy.category);

        if let Some(record) = record {
            let _ = writeln!(body, "Returned: {}", record.returned_on);
            let _ = writeln!(body, "Condition: {}", record.condition);
            if !record.notes.is_empty() {
                let _ = writeln!(body, "Notes:    {}", record.notes);
            }
            let _ = writeln!(body, "Days late: {}", record.days_late);
            let _ = writeln!(body, "Fine:     {}", record.fine);
        } else {
            let _ = writeln!(body, "State:    {}", loan.state);
        }

        body.push_str("\nThank you for using the library.\n");

        Self { kind, body }
    }
}
