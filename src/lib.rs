//! Circulation Desk - the lending core of a small library
//!
//! Members borrow catalogued items under the policy of their category.
//! The desk tracks loans from checkout to return, computes late fines
//! and sends due-date reminders and overdue notices.
//!
//! State lives in a `.circulation/` directory: a SQLite database for
//! people, items, policies, loans, returns and notices, plus append-only
//! JSONL files for the audit trail and the outbox.

pub mod circulation;
pub mod cli;
pub mod domain;
pub mod error;
pub mod storage;

pub use circulation::{
    Clock, LoanLifecycleManager, NotificationScheduler, PolicyResolver, Repositories,
    ReturnProcessor,
};
pub use domain::{Item, ItemCode, Loan, LoanId, LoanState, Person, PersonId, Policy};
pub use error::CirculationError;
