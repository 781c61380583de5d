//! Loan and return CLI commands

use anyhow::{Context, Result};
use chrono::NaiveDate;

use super::output::Output;
use super::session::Session;
use crate::circulation::LoanView;
use crate::domain::{ItemCode, LoanId, PersonId, Receipt};
use crate::storage::{ItemRepository, MemberRepository};

pub fn lend(
    output: &Output,
    member: &PersonId,
    item: &ItemCode,
    agent: Option<PersonId>,
    date: Option<NaiveDate>,
) -> Result<()> {
    let session = Session::open()?;
    let agent = session.agent(agent)?;

    let loan = session.lifecycle().lend(member, item, &agent, date)?;

    if output.is_json() {
        output.data(&loan);
    } else {
        output.success(&format!(
            "Lent {} to {}: loan {}, due {}",
            loan.item, loan.member, loan.id, loan.due_date
        ));
    }

    Ok(())
}

pub fn register_return(
    output: &Output,
    loan: &LoanId,
    condition: Option<&str>,
    notes: Option<&str>,
    date: Option<NaiveDate>,
) -> Result<()> {
    let session = Session::open()?;
    let record = session
        .returns()
        .register_return(loan, condition, notes, date)?;

    if output.is_json() {
        output.data(&record);
    } else if record.days_late > 0 {
        output.success(&format!(
            "Returned {} ({}), {} days late, fine {}",
            record.loan, record.condition, record.days_late, record.fine
        ));
    } else {
        output.success(&format!("Returned {} ({}), on time", record.loan, record.condition));
    }

    Ok(())
}

pub fn list(
    output: &Output,
    member: Option<&PersonId>,
    item: Option<&ItemCode>,
    open_only: bool,
) -> Result<()> {
    let session = Session::open()?;
    let lifecycle = session.lifecycle();

    let mut loans: Vec<LoanView> = match (member, item) {
        (Some(member), _) => lifecycle.loans_for_member(member)?,
        (None, Some(item)) => lifecycle.loans_for_item(item)?,
        (None, None) if open_only => lifecycle.open_loans()?,
        (None, None) => lifecycle.views(session.desk.store().list_loans()?),
    };

    if let (Some(_), Some(item)) = (member, item) {
        loans.retain(|v| &v.loan.item == item);
    }
    if open_only {
        loans.retain(|v| v.current_state.is_open());
    }

    if output.is_json() {
        output.data(&loans);
        return Ok(());
    }

    if loans.is_empty() {
        println!("No loans found");
        return Ok(());
    }

    println!(
        "{:<12} {:<10} {:<10} {:<12} {:<12} STATE",
        "LOAN", "MEMBER", "ITEM", "LENT", "DUE"
    );
    for view in &loans {
        println!(
            "{:<12} {:<10} {:<10} {:<12} {:<12} {}",
            view.loan.id.to_string(),
            view.loan.member.as_str(),
            view.loan.item.as_str(),
            view.loan.loan_date.to_string(),
            view.loan.due_date.to_string(),
            view.current_state
        );
    }

    Ok(())
}

pub fn refresh(output: &Output) -> Result<()> {
    let session = Session::open()?;
    let moved = session.lifecycle().refresh_states()?;

    if output.is_json() {
        output.data(&serde_json::json!({ "overdue": moved }));
    } else if moved.is_empty() {
        output.success("No loans became overdue");
    } else {
        output.success(&format!("Marked {} loan(s) overdue", moved.len()));
        for id in &moved {
            println!("  {}", id);
        }
    }

    Ok(())
}

pub fn receipt(output: &Output, loan_id: &LoanId) -> Result<()> {
    let session = Session::open()?;
    let store = session.desk.store();

    let loan = session.lifecycle().find_loan(loan_id)?;
    let member = MemberRepository::find(store, &loan.member)?
        .with_context(|| format!("Member not found: {}", loan.member))?;
    let item = ItemRepository::find(store, &loan.item)?
        .with_context(|| format!("Item not found: {}", loan.item))?;
    let record = session.returns().find_return(loan_id)?;

    let receipt = Receipt::render(&loan, &member, &item, record.as_ref());

    if output.is_json() {
        output.data(&receipt);
    } else {
        print!("{}", receipt.body);
    }

    Ok(())
}
