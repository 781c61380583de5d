//! Main CLI application structure

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use super::output::{Output, OutputFormat};
use super::{history, items, lending, members, notices, policies};
use crate::domain::{ItemCode, LoanId, PersonId};
use crate::storage::{Config, Desk};

#[derive(Parser)]
#[command(name = "circ")]
#[command(author, version, about = "Circulation desk for a lending library")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to the global config, then text)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Enable debug logging on stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new circulation desk
    Init {
        /// Path to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,
    },

    /// Manage patrons and librarians
    #[command(subcommand)]
    Member(members::MemberCommands),

    /// Manage items
    #[command(subcommand)]
    Item(items::ItemCommands),

    /// Manage lending policies
    #[command(subcommand)]
    Policy(policies::PolicyCommands),

    /// Lend an item to a member
    Lend {
        /// Member id
        member: PersonId,

        /// Item code
        item: ItemCode,

        /// Authorizing librarian (defaults to config, then $CIRC_AGENT)
        #[arg(long)]
        agent: Option<PersonId>,

        /// Loan date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Register the return of a loan
    Return {
        /// Loan id
        loan: LoanId,

        /// Condition of the item: available, damaged or lost
        #[arg(long)]
        condition: Option<String>,

        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,

        /// Return date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// List loans
    Loans {
        /// Only loans of this member
        #[arg(long)]
        member: Option<PersonId>,

        /// Only loans of this item
        #[arg(long)]
        item: Option<ItemCode>,

        /// Only open loans
        #[arg(long)]
        open: bool,
    },

    /// Persist the overdue state of loans past their due date
    Refresh,

    /// Reminder and overdue notices
    #[command(subcommand)]
    Notices(notices::NoticeCommands),

    /// Show the audit trail
    History {
        #[arg(long)]
        member: Option<PersonId>,

        #[arg(long)]
        item: Option<ItemCode>,
    },

    /// Print the loan or return slip of a loan
    Receipt {
        /// Loan id
        loan: LoanId,
    },
}

/// Installs the stderr log subscriber
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    // A second install (tests driving `run` twice) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let format = match cli.format {
        Some(format) => format,
        None => Config::load()?.global.default_format,
    };
    let output = Output::new(format);

    match cli.command {
        Commands::Init { path } => {
            debug!(%path, "initializing desk");
            let desk = Desk::init(&path)?;
            output.success(&format!(
                "Initialized circulation desk at {}",
                desk.root().display()
            ));
        }

        Commands::Member(cmd) => members::run(cmd, &output)?,
        Commands::Item(cmd) => items::run(cmd, &output)?,
        Commands::Policy(cmd) => policies::run(cmd, &output)?,

        Commands::Lend {
            member,
            item,
            agent,
            date,
        } => lending::lend(&output, &member, &item, agent, date)?,

        Commands::Return {
            loan,
            condition,
            notes,
            date,
        } => lending::register_return(&output, &loan, condition.as_deref(), notes.as_deref(), date)?,

        Commands::Loans { member, item, open } => {
            lending::list(&output, member.as_ref(), item.as_ref(), open)?
        }

        Commands::Refresh => lending::refresh(&output)?,

        Commands::Notices(cmd) => notices::run(cmd, &output)?,

        Commands::History { member, item } => {
            history::show(&output, member.as_ref(), item.as_ref())?
        }

        Commands::Receipt { loan } => lending::receipt(&output, &loan)?,
    }

    debug!("command completed");
    Ok(())
}
