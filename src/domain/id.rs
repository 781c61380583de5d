//! Identifier types for the circulation desk
//!
//! ID Format:
//! - Loan IDs: `l-{7-char-hash}` (e.g., `l-7f2b4c1`)
//! - Return IDs: `r-{7-char-hash}`
//! - Notification IDs: `n-{7-char-hash}`
//!
//! Hashes are derived from the owning references plus a creation timestamp,
//! so the same member borrowing the same item twice gets two different loans.
//!
//! People and items are identified by externally assigned keys
//! ([`PersonId`], [`ItemCode`]); the desk never mints those.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum IdError {
    #[error("Invalid {kind} ID format: expected '{prefix}-{{7-char-hash}}', got '{value}'")]
    InvalidHashed {
        kind: &'static str,
        prefix: &'static str,
        value: String,
    },

    #[error("{0} must not be blank")]
    Blank(&'static str),
}

/// Generates a 7-character hash from the given parts and timestamp
fn generate_hash(parts: &[&str], timestamp: DateTime<Utc>) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"\x1f");
    }
    hasher.update(&timestamp.timestamp_nanos_opt().unwrap_or(0).to_le_bytes());
    let hex = hasher.finalize().to_hex();
    hex[..7].to_string()
}

fn parse_hash(s: &str, prefix: &'static str, kind: &'static str) -> Result<String, IdError> {
    let invalid = || IdError::InvalidHashed {
        kind,
        prefix,
        value: s.to_string(),
    };

    let hash = s
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('-'))
        .ok_or_else(invalid)?;

    if hash.len() != 7 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    Ok(hash.to_ascii_lowercase())
}

macro_rules! hashed_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name {
            hash: String,
        }

        impl $name {
            /// Returns the hash portion of the ID
            pub fn hash(&self) -> &str {
                &self.hash
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.hash)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let hash = parse_hash(s.trim(), $prefix, $kind)?;
                Ok(Self { hash })
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.to_string()
            }
        }
    };
}

hashed_id!(
    /// Loan ID in the format `l-{7-char-hash}`
    LoanId,
    "l",
    "loan"
);

hashed_id!(
    /// Return record ID in the format `r-{7-char-hash}`
    ReturnId,
    "r",
    "return"
);

hashed_id!(
    /// Notification ID in the format `n-{7-char-hash}`
    NotificationId,
    "n",
    "notification"
);

impl LoanId {
    /// Mints a loan ID for a member borrowing an item at the given instant
    pub fn new(member: &PersonId, item: &ItemCode, timestamp: DateTime<Utc>) -> Self {
        Self {
            hash: generate_hash(&[member.as_str(), item.as_str()], timestamp),
        }
    }
}

impl ReturnId {
    /// Mints the return ID for a loan
    pub fn new(loan: &LoanId, timestamp: DateTime<Utc>) -> Self {
        Self {
            hash: generate_hash(&[&loan.to_string()], timestamp),
        }
    }
}

impl NotificationId {
    /// Mints a notification ID for a loan and message
    pub fn new(loan: &LoanId, message: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            hash: generate_hash(&[&loan.to_string(), message], timestamp),
        }
    }
}

/// Externally assigned identifier of a person (patron or librarian)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PersonId(String);

impl PersonId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PersonId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(IdError::Blank("person id"));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for PersonId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PersonId> for String {
    fn from(id: PersonId) -> Self {
        id.0
    }
}

/// Inventory code of a physical item
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemCode(String);

impl ItemCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ItemCode {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(IdError::Blank("item code"));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for ItemCode {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ItemCode> for String {
    fn from(code: ItemCode) -> Self {
        code.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn member() -> PersonId {
        "m-100".parse().unwrap()
    }

    fn item() -> ItemCode {
        "EJ-0001".parse().unwrap()
    }

    #[test]
    fn loan_id_format_is_correct() {
        let id = LoanId::new(&member(), &item(), Utc::now());
        let s = id.to_string();

        assert!(s.starts_with("l-"));
        assert_eq!(s.len(), 9);
    }

    #[test]
    fn loan_id_unique_for_different_timestamps() {
        let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 1).unwrap();

        assert_ne!(LoanId::new(&member(), &item(), t1), LoanId::new(&member(), &item(), t2));
    }

    #[test]
    fn loan_id_parses_correctly() {
        let id: LoanId = "l-7f2b4c1".parse().unwrap();
        assert_eq!(id.hash(), "7f2b4c1");
        assert_eq!(id.to_string(), "l-7f2b4c1");
    }

    #[test]
    fn hashed_ids_reject_wrong_prefix() {
        assert!("r-7f2b4c1".parse::<LoanId>().is_err());
        assert!("l-7f2b4c1".parse::<ReturnId>().is_err());
        assert!("l-zzzzzzz".parse::<LoanId>().is_err());
        assert!("l-7f2b".parse::<LoanId>().is_err());
        assert!("l7f2b4c1".parse::<LoanId>().is_err());
    }

    #[test]
    fn notification_id_depends_on_message() {
        let loan = LoanId::new(&member(), &item(), Utc::now());
        let at = Utc::now();

        assert_ne!(
            NotificationId::new(&loan, "overdue notice", at),
            NotificationId::new(&loan, "reminder: due in 2 days", at)
        );
    }

    #[test]
    fn external_ids_reject_blank() {
        assert_eq!("  ".parse::<PersonId>(), Err(IdError::Blank("person id")));
        assert_eq!("".parse::<ItemCode>(), Err(IdError::Blank("item code")));
        assert_eq!(" EJ-1 ".parse::<ItemCode>().unwrap().as_str(), "EJ-1");
    }

    #[test]
    fn serde_roundtrip_loan_id() {
        let id: LoanId = "l-abc1234".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"l-abc1234\"");

        let back: LoanId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
