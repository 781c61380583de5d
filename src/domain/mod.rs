//! Domain models for the circulation desk
//!
//! Contains the lending rules without any I/O concerns.

mod history;
mod id;
mod item;
mod loan;
mod notification;
mod person;
mod policy;
mod receipt;
mod return_record;

pub use history::{HistoryEntry, HistoryKind};
pub use id::{IdError, ItemCode, LoanId, NotificationId, PersonId, ReturnId};
pub use item::{Item, ItemCondition, ItemState};
pub use loan::{Loan, LoanState};
pub use notification::{reminder_message, NoticeKind, Notification, OVERDUE_MESSAGE};
pub use person::{MemberStatus, Membership, Person, Role};
pub use policy::{Policy, PolicyCategory, PolicyError};
pub use receipt::{Receipt, ReceiptKind};
pub use return_record::{fine_for, ReturnRecord};
