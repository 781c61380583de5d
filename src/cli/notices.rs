//! Notice CLI commands

use anyhow::Result;
use clap::Subcommand;

use super::output::Output;
use super::session::Session;
use crate::storage::NotificationRepository;

#[derive(Subcommand)]
pub enum NoticeCommands {
    /// Create today's reminders and overdue notices
    Scan,

    /// Send pending notices through the outbox
    Deliver,

    /// List notices
    List {
        /// Only notices not yet delivered
        #[arg(long)]
        pending: bool,
    },
}

pub fn run(cmd: NoticeCommands, output: &Output) -> Result<()> {
    match cmd {
        NoticeCommands::Scan => scan(output),
        NoticeCommands::Deliver => deliver(output),
        NoticeCommands::List { pending } => list(output, pending),
    }
}

fn scan(output: &Output) -> Result<()> {
    let session = Session::open()?;
    let report = session.scheduler().scan_and_generate()?;

    if output.is_json() {
        output.data(&report);
    } else {
        output.success(&format!(
            "Created {} reminder(s) and {} overdue notice(s), {} already sent",
            report.reminders.len(),
            report.overdue.len(),
            report.skipped
        ));
    }

    Ok(())
}

fn deliver(output: &Output) -> Result<()> {
    let session = Session::open()?;
    let report = session.scheduler().deliver_pending()?;

    if output.is_json() {
        output.data(&report);
        return Ok(());
    }

    output.success(&format!(
        "Delivered {} notice(s), {} failed",
        report.delivered.len(),
        report.failed.len()
    ));
    for failure in &report.failed {
        let retry = if failure.will_retry { "will retry" } else { "dropped" };
        println!("  {}: {} ({})", failure.notification, failure.reason, retry);
    }

    Ok(())
}

fn list(output: &Output, pending_only: bool) -> Result<()> {
    let session = Session::open()?;
    let store = session.desk.store();

    let notices = if pending_only {
        store.list_undelivered()?
    } else {
        store.list_notifications()?
    };

    if output.is_json() {
        output.data(&notices);
        return Ok(());
    }

    if notices.is_empty() {
        println!("No notices");
        return Ok(());
    }

    println!("{:<12} {:<12} {:<10} MESSAGE", "NOTICE", "LOAN", "STATUS");
    for notice in &notices {
        println!(
            "{:<12} {:<12} {:<10} {}",
            notice.id.to_string(),
            notice.loan.to_string(),
            if notice.delivered { "sent" } else { "pending" },
            notice.message
        );
    }

    Ok(())
}
