//! Policy CLI commands

use anyhow::{Context, Result};
use clap::Subcommand;
use rust_decimal::Decimal;

use super::output::Output;
use super::session::Session;
use crate::domain::{Policy, PolicyCategory};

#[derive(Subcommand)]
pub enum PolicyCommands {
    /// List lending policies
    List,

    /// Create or replace the policy of a category
    ///
    /// Loans keep the rules they were created under.
    Set {
        /// Category: general, student or faculty (aliases accepted)
        category: PolicyCategory,

        /// Loan duration in days
        #[arg(long)]
        days: u32,

        /// Maximum simultaneous open loans
        #[arg(long)]
        max_loans: u32,

        /// Fine per overdue day
        #[arg(long)]
        fine: Decimal,
    },

    /// Show the policy a member category resolves to
    Resolve {
        /// Member category as recorded (e.g. "Estudiante")
        category: String,
    },
}

pub fn run(cmd: PolicyCommands, output: &Output) -> Result<()> {
    match cmd {
        PolicyCommands::List => list_policies(output),
        PolicyCommands::Set {
            category,
            days,
            max_loans,
            fine,
        } => set_policy(output, category, days, max_loans, fine),
        PolicyCommands::Resolve { category } => resolve_policy(output, &category),
    }
}

fn print_policy(policy: &Policy) {
    println!(
        "{:<10} {:>5} {:>9} {:>10}",
        policy.category.key(),
        policy.loan_days,
        policy.max_open_loans,
        policy.fine_per_day
    );
}

fn list_policies(output: &Output) -> Result<()> {
    let session = Session::open()?;
    let policies = session.desk.store().list_policies()?;

    if output.is_json() {
        output.data(&policies);
        return Ok(());
    }

    if policies.is_empty() {
        println!("No policies configured");
        return Ok(());
    }

    println!("{:<10} {:>5} {:>9} {:>10}", "CATEGORY", "DAYS", "MAX LOANS", "FINE/DAY");
    for policy in &policies {
        print_policy(policy);
    }

    Ok(())
}

fn set_policy(
    output: &Output,
    category: PolicyCategory,
    days: u32,
    max_loans: u32,
    fine: Decimal,
) -> Result<()> {
    let policy = Policy::new(category, days, max_loans, fine)?;

    let session = Session::open()?;
    session
        .desk
        .store()
        .upsert_policy(&policy)
        .with_context(|| format!("Failed to save {} policy", category))?;

    if output.is_json() {
        output.data(&policy);
    } else {
        output.success(&format!(
            "{} policy: {} days, {} loans, {} per late day",
            policy.category, policy.loan_days, policy.max_open_loans, policy.fine_per_day
        ));
    }

    Ok(())
}

fn resolve_policy(output: &Output, raw: &str) -> Result<()> {
    let session = Session::open()?;
    let lifecycle = session.lifecycle();
    let resolver = lifecycle.resolver();

    let category =
        PolicyCategory::from_member_category(raw).unwrap_or_else(|| resolver.default_category());
    let policy = resolver.resolve_category(category)?;

    if output.is_json() {
        output.data(&policy);
    } else {
        println!("'{}' resolves to:", raw);
        print_policy(&policy);
    }

    Ok(())
}
