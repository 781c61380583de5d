//! People known to the desk
//!
//! Patrons and librarians share one record; what differs lives in [`Role`].
//! Membership data is owned by the membership subsystem, the desk only reads it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::id::PersonId;

/// Standing of a patron's membership
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    #[default]
    Active,
    Suspended,
}

impl MemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberStatus::Active => "active",
            MemberStatus::Suspended => "suspended",
        }
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(MemberStatus::Active),
            "suspended" => Ok(MemberStatus::Suspended),
            other => Err(format!("Unknown member status: {}", other)),
        }
    }
}

/// Patron-specific data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    /// Free-form category as entered by the membership subsystem
    /// (e.g. "Standard", "Estudiante", "Faculty")
    pub category: String,

    pub status: MemberStatus,

    /// Member has an open sanction
    #[serde(default)]
    pub sanctioned: bool,

    /// Member is flagged for overdue items
    #[serde(default)]
    pub overdue: bool,
}

impl Membership {
    /// A fresh, active membership in the given category
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            status: MemberStatus::Active,
            sanctioned: false,
            overdue: false,
        }
    }

    /// Returns the reason this membership may not borrow, if any
    pub fn ineligibility(&self) -> Option<&'static str> {
        if self.status != MemberStatus::Active {
            Some("membership is not active")
        } else if self.sanctioned {
            Some("member has an open sanction")
        } else if self.overdue {
            Some("member is flagged for overdue items")
        } else {
            None
        }
    }
}

/// What a person is to the library
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Role {
    Patron(Membership),
    Librarian,
}

/// A patron or librarian
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,

    pub name: String,

    /// National identifier (DNI or similar), used for lookups at the desk
    pub national_id: String,

    /// Contact address for notices
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    pub role: Role,
}

impl Person {
    pub fn patron(
        id: PersonId,
        name: impl Into<String>,
        national_id: impl Into<String>,
        membership: Membership,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            national_id: national_id.into(),
            email: None,
            role: Role::Patron(membership),
        }
    }

    pub fn librarian(id: PersonId, name: impl Into<String>, national_id: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            national_id: national_id.into(),
            email: None,
            role: Role::Librarian,
        }
    }

    /// Sets the contact address
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Returns the membership if this person is a patron
    pub fn membership(&self) -> Option<&Membership> {
        match &self.role {
            Role::Patron(m) => Some(m),
            Role::Librarian => None,
        }
    }

    pub fn is_librarian(&self) -> bool {
        matches!(self.role, Role::Librarian)
    }

    /// Returns the contact address if it is present and non-blank
    pub fn contact_address(&self) -> Option<&str> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }
}
