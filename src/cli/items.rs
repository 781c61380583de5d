//! Item CLI commands

use anyhow::{bail, Context, Result};
use clap::Subcommand;

use super::output::Output;
use super::session::Session;
use crate::domain::{Item, ItemCode, ItemState};
use crate::storage::ItemRepository;

#[derive(Subcommand)]
pub enum ItemCommands {
    /// Add or update an item
    Add {
        /// Item code
        code: ItemCode,

        /// Title of the work
        #[arg(long)]
        title: Option<String>,

        /// Shelf or branch location
        #[arg(long, default_value = "")]
        location: String,
    },

    /// Show an item and its loan history
    Show {
        /// Item code
        code: ItemCode,
    },

    /// Put a damaged or lost item back into circulation
    Restock {
        /// Item code
        code: ItemCode,
    },
}

pub fn run(cmd: ItemCommands, output: &Output) -> Result<()> {
    match cmd {
        ItemCommands::Add {
            code,
            title,
            location,
        } => add_item(output, code, title, location),
        ItemCommands::Show { code } => show_item(output, &code),
        ItemCommands::Restock { code } => restock_item(output, &code),
    }
}

fn add_item(output: &Output, code: ItemCode, title: Option<String>, location: String) -> Result<()> {
    let session = Session::open()?;
    let store = session.desk.store();

    // Updating a catalogued item must not reset its circulation state
    let item = match store.find(&code)? {
        Some(existing) => Item {
            location,
            title: title.or(existing.title),
            ..existing
        },
        None => Item {
            title,
            ..Item::new(code, location)
        },
    };

    store
        .upsert_item(&item)
        .with_context(|| format!("Failed to save item {}", item.code))?;

    if output.is_json() {
        output.data(&item);
    } else {
        output.success(&format!("Saved item {} ({})", item.code, item.state));
    }

    Ok(())
}

fn show_item(output: &Output, code: &ItemCode) -> Result<()> {
    let session = Session::open()?;
    let item = session
        .desk
        .store()
        .find(code)?
        .with_context(|| format!("Item not found: {}", code))?;
    let loans = session.lifecycle().loans_for_item(code)?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "item": item,
            "loans": loans,
        }));
        return Ok(());
    }

    println!("{} - {}", item.code, item.title.as_deref().unwrap_or("(untitled)"));
    println!("State:    {}", item.state);
    if !item.location.is_empty() {
        println!("Location: {}", item.location);
    }

    if !loans.is_empty() {
        println!();
        println!("{:<12} {:<10} {:<12} {:<12} STATE", "LOAN", "MEMBER", "LENT", "DUE");
        for view in &loans {
            println!(
                "{:<12} {:<10} {:<12} {:<12} {}",
                view.loan.id.to_string(),
                view.loan.member.as_str(),
                view.loan.loan_date.to_string(),
                view.loan.due_date.to_string(),
                view.current_state
            );
        }
    }

    Ok(())
}

fn restock_item(output: &Output, code: &ItemCode) -> Result<()> {
    let session = Session::open()?;
    let store = session.desk.store();

    let restocked = store
        .transition(code, &[ItemState::Damaged, ItemState::Lost], ItemState::Available)
        .with_context(|| format!("Failed to update item {}", code))?;

    if !restocked {
        match store.find(code)? {
            Some(item) => bail!("Item {} is {}; only damaged or lost items can be restocked", code, item.state),
            None => bail!("Item not found: {}", code),
        }
    }

    output.success(&format!("Item {} is available again", code));
    Ok(())
}
