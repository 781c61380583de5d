//! History CLI command

use anyhow::Result;

use super::output::Output;
use super::session::Session;
use crate::domain::{ItemCode, PersonId};

pub fn show(output: &Output, member: Option<&PersonId>, item: Option<&ItemCode>) -> Result<()> {
    let session = Session::open()?;
    let history = session.desk.history();

    let mut entries = match (member, item) {
        (Some(member), _) => history.for_member(member)?,
        (None, Some(item)) => history.for_item(item)?,
        (None, None) => history.read_all()?,
    };
    if let (Some(_), Some(item)) = (member, item) {
        entries.retain(|e| &e.item == item);
    }

    if output.is_json() {
        output.data(&entries);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No history");
        return Ok(());
    }

    for entry in &entries {
        println!(
            "{}  {:<7} {:<12} {:<10} {:<10} {}",
            entry.at.format("%Y-%m-%d %H:%M"),
            entry.kind.label(),
            entry.loan.to_string(),
            entry.member.as_str(),
            entry.item.as_str(),
            entry.details
        );
    }

    Ok(())
}
