//! Error kinds surfaced by the circulation core
//!
//! Each domain outcome has its own variant so callers can tell a member
//! who may not borrow from an item that is already out. Repository
//! failures arrive wrapped in [`CirculationError::Persistence`].

use thiserror::Error;

use crate::domain::{ItemCode, ItemState, LoanId, LoanState, PersonId, PolicyCategory, PolicyError};
use crate::storage::StoreError;

/// What kind of record a lookup failed to find
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Member,
    Agent,
    Item,
    Loan,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecordKind::Member => "Member",
            RecordKind::Agent => "Agent",
            RecordKind::Item => "Item",
            RecordKind::Loan => "Loan",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum CirculationError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: RecordKind, id: String },

    #[error("Member {member} is not eligible to borrow: {reason}")]
    MemberNotEligible { member: PersonId, reason: String },

    #[error("{agent} is not a librarian and cannot authorize loans")]
    AgentNotAuthorized { agent: PersonId },

    #[error("Item {item} is not available (currently {state})")]
    ItemNotAvailable { item: ItemCode, state: ItemState },

    #[error("Member {member} already holds {open} open loans (limit {limit})")]
    LoanLimitExceeded {
        member: PersonId,
        open: usize,
        limit: u32,
    },

    #[error("No lending policy for {requested} and no default {default} policy configured")]
    PolicyNotFound {
        requested: PolicyCategory,
        default: PolicyCategory,
    },

    #[error("Invalid policy: {0}")]
    InvalidPolicy(#[from] PolicyError),

    #[error("Loan {loan} cannot be returned (state {state})")]
    LoanAlreadyReturned { loan: LoanId, state: LoanState },

    #[error("Invalid item condition '{0}': expected available, damaged or lost")]
    InvalidItemCondition(String),

    #[error("{context}: {source}")]
    Persistence {
        context: String,
        #[source]
        source: StoreError,
    },
}

impl CirculationError {
    pub(crate) fn not_found(kind: RecordKind, id: impl ToString) -> Self {
        CirculationError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Returns true for errors that signal a misconfigured desk rather
    /// than a rejected request
    pub fn is_fatal(&self) -> bool {
        matches!(self, CirculationError::PolicyNotFound { .. })
    }
}

pub type Result<T, E = CirculationError> = std::result::Result<T, E>;

/// Adds context to repository results, mirroring `anyhow::Context`
pub(crate) trait StoreContext<T> {
    fn store_context(self, context: &str) -> Result<T>;

    fn with_store_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T> StoreContext<T> for std::result::Result<T, StoreError> {
    fn store_context(self, context: &str) -> Result<T> {
        self.map_err(|source| CirculationError::Persistence {
            context: context.to_string(),
            source,
        })
    }

    fn with_store_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|source| CirculationError::Persistence {
            context: f(),
            source,
        })
    }
}
