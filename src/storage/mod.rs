//! # Storage Layer
//!
//! Collaborator contracts consumed by the circulation core, and the
//! implementations a desk ships with.
//!
//! ## Storage Formats
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | People, items, policies, loans, returns, notices | SQLite | `.circulation/desk.db` |
//! | Audit trail | JSONL (append-only) | `.circulation/history.jsonl` |
//! | Sent notices | JSONL (append-only) | `.circulation/outbox.jsonl` |
//! | Config | TOML | `.circulation/config.toml` |
//!
//! ## Concurrency Safety
//!
//! - [`SqliteStore`] serializes access through one connection and commits
//!   checkouts and returns inside `BEGIN IMMEDIATE` transactions, so the
//!   "item available?" and "loan still open?" checks cannot race their writes
//! - Notice uniqueness on `(loan, lower(message))` is a table constraint
//! - JSONL files are appended under an exclusive `fs2` lock
//!
//! ## Key Types
//!
//! - [`Desk`] - Entry point: opens a desk directory and hands out stores
//! - [`SqliteStore`] - Implements every repository trait below
//! - [`JsonlHistory`] - [`HistoryRecorder`] backed by a JSONL file
//! - [`OutboxNotifier`] - [`NotifierGateway`] that spools mail to a JSONL file
//! - [`Config`] - Desk and global configuration

mod config;
mod desk;
mod history;
mod jsonl;
mod outbox;
mod sqlite;

pub use config::{
    AgentConfig, Config, ConfigError, DeskConfig, GlobalConfig, NotifierConfig, OutputFormat,
};
pub use desk::{Desk, DeskError};
pub use history::JsonlHistory;
pub use jsonl::JsonlLog;
pub use outbox::{OutboxNotifier, SentMessage};
pub use sqlite::SqliteStore;

use thiserror::Error;

use crate::domain::{
    HistoryEntry, Item, ItemCode, ItemState, Loan, LoanId, LoanState, Notification,
    NotificationId, Person, PersonId, Policy, PolicyCategory, ReturnRecord,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Store connection lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Read access to people (patrons and librarians)
pub trait MemberRepository: Send + Sync {
    fn find(&self, id: &PersonId) -> StoreResult<Option<Person>>;

    fn find_by_national_id(&self, national_id: &str) -> StoreResult<Option<Person>>;
}

/// Items and their state
pub trait ItemRepository: Send + Sync {
    fn find(&self, code: &ItemCode) -> StoreResult<Option<Item>>;

    /// Moves the item to `to` only if its current state is one of `from`.
    /// Returns false when the guard did not match.
    fn transition(&self, code: &ItemCode, from: &[ItemState], to: ItemState) -> StoreResult<bool>;
}

/// Loans
pub trait LoanRepository: Send + Sync {
    fn find(&self, id: &LoanId) -> StoreResult<Option<Loan>>;

    /// Loans whose stored state is Active or Overdue
    fn list_open(&self) -> StoreResult<Vec<Loan>>;

    fn list_for_member(&self, member: &PersonId) -> StoreResult<Vec<Loan>>;

    fn list_for_item(&self, item: &ItemCode) -> StoreResult<Vec<Loan>>;

    fn count_open_for_member(&self, member: &PersonId) -> StoreResult<usize>;

    /// Moves the loan to `to` only if its stored state is one of `from`.
    /// Returns false when the guard did not match.
    fn transition(&self, id: &LoanId, from: &[LoanState], to: LoanState) -> StoreResult<bool>;
}

pub trait PolicyRepository: Send + Sync {
    fn find_by_category(&self, category: PolicyCategory) -> StoreResult<Option<Policy>>;
}

pub trait ReturnRepository: Send + Sync {
    fn find_for_loan(&self, loan: &LoanId) -> StoreResult<Option<ReturnRecord>>;
}

pub trait NotificationRepository: Send + Sync {
    /// Inserts the notice unless one with the same loan and message
    /// (ignoring case) exists. Returns false on such a conflict.
    fn insert(&self, notification: &Notification) -> StoreResult<bool>;

    fn exists(&self, loan: &LoanId, message: &str) -> StoreResult<bool>;

    fn list_for_loan(&self, loan: &LoanId) -> StoreResult<Vec<Notification>>;

    fn list_undelivered(&self) -> StoreResult<Vec<Notification>>;

    fn mark_delivered(&self, id: &NotificationId) -> StoreResult<()>;
}

/// Result of an atomic checkout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutOutcome {
    Committed,
    /// The item was no longer available; nothing was written
    ItemUnavailable(ItemState),
    /// The member reached the policy limit meanwhile; nothing was written
    LimitReached(usize),
}

/// Result of an atomic return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnOutcome {
    Committed,
    /// The loan was no longer open; nothing was written
    AlreadyReturned(LoanState),
}

/// Multi-record writes that must be all-or-nothing
pub trait CirculationLedger: Send + Sync {
    /// Inserts `loan` and moves its item from Available to Loaned as one
    /// unit, rechecking the member's open-loan count against the loan's
    /// policy inside the same unit.
    fn commit_checkout(&self, loan: &Loan) -> StoreResult<CheckoutOutcome>;

    /// Moves the loan to Returned, stores `record` and releases the item to
    /// `release_to` as one unit. Only an open loan can be returned.
    fn commit_return(&self, record: &ReturnRecord, item: &ItemCode, release_to: ItemState)
        -> StoreResult<ReturnOutcome>;
}

/// Append-only audit sink. Callers treat failures as best-effort.
pub trait HistoryRecorder: Send + Sync {
    fn record(&self, entry: &HistoryEntry) -> StoreResult<()>;
}

/// One message handed to the notifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub address: String,
    pub subject: String,
    pub body: String,
}

/// Outbound channel for notices
pub trait NotifierGateway: Send + Sync {
    /// Sends a batch, returning one result per envelope in order
    fn send_batch(&self, batch: &[Envelope]) -> Vec<Result<(), String>>;
}
