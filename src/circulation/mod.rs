//! # Circulation Core
//!
//! The lending lifecycle: which rules apply to a member, creating loans,
//! registering returns and issuing notices.
//!
//! Services borrow their collaborators through [`Repositories`] and take
//! time from a [`Clock`], so the same code runs against a desk database or
//! an in-memory store in tests.
//!
//! ## Loan state
//!
//! Decisions always use the state derived from the due date
//! ([`crate::domain::Loan::derive_state`]). The stored state only moves
//! forward: to Overdue through [`LoanLifecycleManager::refresh_states`] and
//! to Returned through [`ReturnProcessor::register_return`].

mod clock;
mod lending;
mod notices;
mod policy;
mod returns;

pub use clock::{Clock, FixedClock, SystemClock};
pub use lending::{LoanLifecycleManager, LoanView};
pub use notices::{DeliveryFailure, DeliveryReport, NotificationScheduler, ScanReport};
pub use policy::PolicyResolver;
pub use returns::ReturnProcessor;

use crate::storage::{
    CirculationLedger, HistoryRecorder, ItemRepository, LoanRepository, MemberRepository,
    NotificationRepository, PolicyRepository, ReturnRepository,
};

/// Collaborators shared by the circulation services
#[derive(Clone, Copy)]
pub struct Repositories<'a> {
    pub members: &'a dyn MemberRepository,
    pub items: &'a dyn ItemRepository,
    pub loans: &'a dyn LoanRepository,
    pub policies: &'a dyn PolicyRepository,
    pub returns: &'a dyn ReturnRepository,
    pub notifications: &'a dyn NotificationRepository,
    pub ledger: &'a dyn CirculationLedger,
    pub history: &'a dyn HistoryRecorder,
}

impl<'a> Repositories<'a> {
    /// Uses `store` for every record kind and `history` for the audit trail
    pub fn new<S>(store: &'a S, history: &'a dyn HistoryRecorder) -> Self
    where
        S: MemberRepository
            + ItemRepository
            + LoanRepository
            + PolicyRepository
            + ReturnRepository
            + NotificationRepository
            + CirculationLedger,
    {
        Self {
            members: store,
            items: store,
            loans: store,
            policies: store,
            returns: store,
            notifications: store,
            ledger: store,
            history,
        }
    }
}
