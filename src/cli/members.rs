//! Member CLI commands

use anyhow::{Context, Result};
use clap::Subcommand;

use super::output::Output;
use super::session::Session;
use crate::domain::{MemberStatus, Membership, Person, PersonId, Role};
use crate::storage::MemberRepository;

#[derive(Subcommand)]
pub enum MemberCommands {
    /// Add or update a person
    ///
    /// Examples:
    ///   circ member add m-1 "Ada Lovelace" 30111222 --category Estudiante
    ///   circ member add b-1 "Lin" 20999888 --librarian
    Add {
        /// Member id
        id: PersonId,

        /// Full name
        name: String,

        /// National identifier
        national_id: String,

        /// Member category (e.g. Estudiante, Docente, Estándar)
        #[arg(long, default_value = "")]
        category: String,

        /// Contact email for notices
        #[arg(long)]
        email: Option<String>,

        /// Register a librarian instead of a patron
        #[arg(long, conflicts_with_all = ["category", "status", "sanctioned", "overdue"])]
        librarian: bool,

        /// Membership status: active or suspended
        #[arg(long, default_value = "active")]
        status: MemberStatus,

        /// Member has an open sanction
        #[arg(long)]
        sanctioned: bool,

        /// Member is flagged for overdue items
        #[arg(long)]
        overdue: bool,
    },

    /// Show a person, by id or national identifier
    Show {
        /// Member id or national identifier
        id: String,
    },
}

pub fn run(cmd: MemberCommands, output: &Output) -> Result<()> {
    match cmd {
        MemberCommands::Add {
            id,
            name,
            national_id,
            category,
            email,
            librarian,
            status,
            sanctioned,
            overdue,
        } => {
            let person = if librarian {
                Person::librarian(id, name, national_id)
            } else {
                Person::patron(
                    id,
                    name,
                    national_id,
                    Membership {
                        category,
                        status,
                        sanctioned,
                        overdue,
                    },
                )
            };
            let person = match email {
                Some(email) => person.with_email(email),
                None => person,
            };
            add_member(output, &person)
        }
        MemberCommands::Show { id } => show_member(output, &id),
    }
}

fn add_member(output: &Output, person: &Person) -> Result<()> {
    let session = Session::open()?;
    session
        .desk
        .store()
        .upsert_person(person)
        .with_context(|| format!("Failed to save {}", person.id))?;

    if output.is_json() {
        output.data(person);
    } else {
        let role = if person.is_librarian() { "librarian" } else { "member" };
        output.success(&format!("Saved {}: {} - {}", role, person.id, person.name));
    }

    Ok(())
}

fn show_member(output: &Output, key: &str) -> Result<()> {
    let session = Session::open()?;
    let store = session.desk.store();

    let by_id = match key.parse::<PersonId>() {
        Ok(id) => store.find(&id)?,
        Err(_) => None,
    };
    let person = match by_id {
        Some(person) => person,
        None => store
            .find_by_national_id(key)?
            .with_context(|| format!("Member not found: {}", key))?,
    };

    let lifecycle = session.lifecycle();
    let loans = lifecycle.loans_for_member(&person.id)?;
    let open: Vec<_> = loans.iter().filter(|v| v.current_state.is_open()).collect();

    if output.is_json() {
        output.data(&serde_json::json!({
            "person": person,
            "policy": lifecycle.resolver().category_for(&person),
            "open_loans": open,
        }));
        return Ok(());
    }

    println!("{} - {}", person.id, person.name);
    println!("National ID: {}", person.national_id);
    if let Some(email) = person.contact_address() {
        println!("Email:       {}", email);
    }
    match &person.role {
        Role::Librarian => println!("Role:        librarian"),
        Role::Patron(m) => {
            println!("Role:        patron");
            println!(
                "Category:    {} ({} policy)",
                if m.category.is_empty() { "-" } else { m.category.as_str() },
                lifecycle.resolver().category_for(&person)
            );
            println!("Status:      {}", m.status);
            if let Some(reason) = m.ineligibility() {
                println!("Borrowing:   blocked ({})", reason);
            }
        }
    }

    if !open.is_empty() {
        println!();
        println!("Open loans:");
        for view in open {
            output.row(&[
                &view.loan.id.to_string(),
                view.loan.item.as_str(),
                &format!("due {}", view.loan.due_date),
                view.current_state.as_str(),
            ]);
        }
    }

    Ok(())
}
