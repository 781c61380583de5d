//! Audit trail stored in `.circulation/history.jsonl`

use std::path::{Path, PathBuf};

use super::jsonl::JsonlLog;
use super::{HistoryRecorder, StoreResult};
use crate::domain::{HistoryEntry, ItemCode, PersonId};

/// [`HistoryRecorder`] that appends entries to a JSONL file
pub struct JsonlHistory {
    log: JsonlLog<HistoryEntry>,
}

impl JsonlHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            log: JsonlLog::new(path),
        }
    }

    /// Creates the default history for a desk
    pub fn for_desk(desk_root: &Path) -> Self {
        Self::new(desk_root.join(".circulation").join("history.jsonl"))
    }

    pub fn path(&self) -> &Path {
        self.log.path()
    }

    /// Every entry, oldest first
    pub fn read_all(&self) -> StoreResult<Vec<HistoryEntry>> {
        self.log.read_all()
    }

    pub fn for_member(&self, member: &PersonId) -> StoreResult<Vec<HistoryEntry>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|e| &e.member == member)
            .collect())
    }

    pub fn for_item(&self, item: &ItemCode) -> StoreResult<Vec<HistoryEntry>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|e| &e.item == item)
            .collect())
    }
}

impl HistoryRecorder for JsonlHistory {
    fn record(&self, entry: &HistoryEntry) -> StoreResult<()> {
        self.log.append(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{HistoryKind, ItemCondition, Loan, Policy, ReturnRecord};
    use chrono::{NaiveDate, Utc};
    use tempfile::TempDir;

    fn loan(member: &str, item: &str) -> Loan {
        Loan::open(
            member.parse().unwrap(),
            item.parse().unwrap(),
            "b-1".parse().unwrap(),
            Policy::defaults().remove(0),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            Utc::now(),
        ).unwrap()
    }

    #[test]
    fn records_and_filters_entries() {
        let dir = TempDir::new().unwrap();
        let history = JsonlHistory::for_desk(dir.path());

        let first = loan("m-1", "EJ-1");
        let second = loan("m-2", "EJ-1");
        history.record(&HistoryEntry::loan_created(&first, Utc::now())).unwrap();

        let record = ReturnRecord::for_loan(
            &first,
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            ItemCondition::Available,
            None,
            Utc::now(),
        ).unwrap();
        history.record(&HistoryEntry::return_registered(&first, &record)).unwrap();
        history.record(&HistoryEntry::loan_created(&second, Utc::now())).unwrap();

        assert_eq!(history.read_all().unwrap().len(), 3);

        let for_member = history.for_member(&"m-1".parse().unwrap()).unwrap();
        assert_eq!(for_member.len(), 2);
        assert_eq!(for_member[1].kind, HistoryKind::ReturnRegistered);

        assert_eq!(history.for_item(&"EJ-1".parse().unwrap()).unwrap().len(), 3);
        assert!(history.path().ends_with("history.jsonl"));
    }
}
