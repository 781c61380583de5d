//! Return registration

use chrono::NaiveDate;
use tracing::{info, warn};

use super::{Clock, Repositories};
use crate::domain::{HistoryEntry, ItemCondition, LoanId, ReturnRecord};
use crate::error::{CirculationError, RecordKind, Result, StoreContext};
use crate::storage::ReturnOutcome;

/// Closes loans, prices lateness and releases items
pub struct ReturnProcessor<'a> {
    repos: Repositories<'a>,
    clock: &'a dyn Clock,
}

impl<'a> ReturnProcessor<'a> {
    pub fn new(repos: Repositories<'a>, clock: &'a dyn Clock) -> Self {
        Self { repos, clock }
    }

    /// Registers the return of `loan_id`.
    ///
    /// `condition` may be blank (the item came back fine) or one of
    /// available, damaged, lost. The fine uses the daily rate frozen in the
    /// loan. The record, the loan's move to Returned and the item's new
    /// state are committed together; a second return of the same loan
    /// fails with [`CirculationError::LoanAlreadyReturned`].
    pub fn register_return(
        &self,
        loan_id: &LoanId,
        condition: Option<&str>,
        notes: Option<&str>,
        return_date: Option<NaiveDate>,
    ) -> Result<ReturnRecord> {
        let loan = self
            .repos
            .loans
            .find(loan_id)
            .with_store_context(|| format!("Failed to load loan {}", loan_id))?
            .ok_or_else(|| CirculationError::not_found(RecordKind::Loan, loan_id))?;

        let state = loan.derive_state(self.clock.today());
        if !state.is_open() {
            return Err(CirculationError::LoanAlreadyReturned {
                loan: loan.id,
                state,
            });
        }

        let condition = ItemCondition::parse_reported(condition).ok_or_else(|| {
            CirculationError::InvalidItemCondition(condition.unwrap_or_default().trim().to_string())
        })?;

        let returned_on = return_date.unwrap_or_else(|| self.clock.today());
        let record = ReturnRecord::for_loan(&loan, returned_on, condition, notes, self.clock.now())?;

        let outcome = self
            .repos
            .ledger
            .commit_return(&record, &loan.item, condition.item_state())
            .with_store_context(|| format!("Failed to save return of {}", loan.id))?;
        if let ReturnOutcome::AlreadyReturned(state) = outcome {
            return Err(CirculationError::LoanAlreadyReturned {
                loan: loan.id,
                state,
            });
        }

        info!(
            loan = %loan.id,
            item = %loan.item,
            condition = %record.condition,
            days_late = record.days_late,
            fine = %record.fine,
            "return registered"
        );

        let entry = HistoryEntry::return_registered(&loan, &record);
        if let Err(e) = self.repos.history.record(&entry) {
            warn!(loan = %loan.id, error = %e, "failed to record return in history");
        }

        Ok(record)
    }

    /// The return record of `loan_id`, if it has been returned
    pub fn find_return(&self, loan_id: &LoanId) -> Result<Option<ReturnRecord>> {
        self.repos
            .returns
            .find_for_loan(loan_id)
            .with_store_context(|| format!("Failed to load return of {}", loan_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circulation::fixtures::{date, desk, BrokenHistory, MemoryHistory};
    use crate::circulation::{FixedClock, LoanLifecycleManager};
    use crate::domain::{HistoryKind, ItemState, Loan, LoanState, PolicyCategory, PolicyError};
    use crate::storage::{
        CirculationLedger, HistoryRecorder, ItemRepository, LoanRepository, SqliteStore,
    };
    use rust_decimal::Decimal;

    /// Lends EJ-1 to the student m-1 on 2024-01-01 (due 2024-01-16)
    fn lent(store: &SqliteStore) -> Loan {
        let history = MemoryHistory::default();
        let clock = FixedClock::on(date(2024, 1, 1));
        LoanLifecycleManager::new(Repositories::new(store, &history), &clock, PolicyCategory::General)
            .lend(&"m-1".parse().unwrap(), &"EJ-1".parse().unwrap(), &"b-1".parse().unwrap(), None)
            .unwrap()
    }

    fn processor<'a>(
        store: &'a SqliteStore,
        history: &'a dyn HistoryRecorder,
        clock: &'a FixedClock,
    ) -> ReturnProcessor<'a> {
        ReturnProcessor::new(Repositories::new(store, history), clock)
    }

    #[test]
    fn late_return_is_fined_per_day() {
        let store = desk();
        let loan = lent(&store);
        let history = MemoryHistory::default();
        let clock = FixedClock::on(date(2024, 1, 20));

        let record = processor(&store, &history, &clock)
            .register_return(&loan.id, None, Some("  cover worn  "), None)
            .unwrap();

        assert_eq!(record.returned_on, date(2024, 1, 20));
        assert_eq!(record.days_late, 4);
        assert_eq!(record.fine, Decimal::from(120));
        assert_eq!(record.condition, ItemCondition::Available);
        assert_eq!(record.notes, "cover worn");

        let stored = LoanRepository::find(&store, &loan.id).unwrap().unwrap();
        assert_eq!(stored.state, LoanState::Returned);
        let item = ItemRepository::find(&store, &loan.item).unwrap().unwrap();
        assert_eq!(item.state, ItemState::Available);

        let entries = history.entries.lock().unwrap();
        assert_eq!(entries[0].kind, HistoryKind::ReturnRegistered);
    }

    #[test]
    fn early_return_is_free() {
        let store = desk();
        let loan = lent(&store);
        let history = MemoryHistory::default();
        let clock = FixedClock::on(date(2024, 3, 1));

        let record = processor(&store, &history, &clock)
            .register_return(&loan.id, Some(""), None, Some(date(2024, 1, 10)))
            .unwrap();

        assert_eq!(record.days_late, 0);
        assert_eq!(record.fine, Decimal::ZERO);
    }

    #[test]
    fn fine_uses_rate_frozen_in_loan() {
        let store = desk();
        let loan = lent(&store);

        let mut student = crate::domain::Policy::defaults().remove(1);
        student.fine_per_day = Decimal::from(99);
        store.upsert_policy(&student).unwrap();

        let history = MemoryHistory::default();
        let clock = FixedClock::on(date(2024, 1, 18));
        let record = processor(&store, &history, &clock)
            .register_return(&loan.id, None, None, None)
            .unwrap();

        assert_eq!(record.fine, Decimal::from(60));
    }

    #[test]
    fn overflowing_fine_fails_without_writing() {
        let store = desk();
        let student = crate::domain::Policy::defaults().remove(1);
        let mut loan = Loan::open(
            "m-1".parse().unwrap(),
            "EJ-1".parse().unwrap(),
            "b-1".parse().unwrap(),
            student,
            date(2024, 1, 1),
            FixedClock::on(date(2024, 1, 1)).now(),
        )
        .unwrap();
        // A snapshot written before rates were capped
        loan.policy.fine_per_day = "1000000000000000000000000000".parse().unwrap();
        store.commit_checkout(&loan).unwrap();

        let history = MemoryHistory::default();
        let clock = FixedClock::on(date(2024, 6, 1));
        let returns = processor(&store, &history, &clock);

        let err = returns.register_return(&loan.id, None, None, None).unwrap_err();
        assert!(matches!(
            err,
            CirculationError::InvalidPolicy(PolicyError::FineOverflow { days_late: 137, .. })
        ));

        let stored = LoanRepository::find(&store, &loan.id).unwrap().unwrap();
        assert!(stored.state.is_open());
        assert!(returns.find_return(&loan.id).unwrap().is_none());
    }

    #[test]
    fn second_return_fails() {
        let store = desk();
        let loan = lent(&store);
        let history = MemoryHistory::default();
        let clock = FixedClock::on(date(2024, 1, 20));
        let returns = processor(&store, &history, &clock);

        returns.register_return(&loan.id, None, None, None).unwrap();
        let err = returns.register_return(&loan.id, None, None, None).unwrap_err();

        assert!(matches!(
            err,
            CirculationError::LoanAlreadyReturned {
                state: LoanState::Returned,
                ..
            }
        ));
        assert!(returns.find_return(&loan.id).unwrap().is_some());
    }

    #[test]
    fn reported_condition_releases_item() {
        let store = desk();
        let loan = lent(&store);
        let history = MemoryHistory::default();
        let clock = FixedClock::on(date(2024, 1, 5));

        processor(&store, &history, &clock)
            .register_return(&loan.id, Some(" DAMAGED "), None, None)
            .unwrap();

        let item = ItemRepository::find(&store, &loan.item).unwrap().unwrap();
        assert_eq!(item.state, ItemState::Damaged);
    }

    #[test]
    fn unknown_condition_writes_nothing() {
        let store = desk();
        let loan = lent(&store);
        let history = MemoryHistory::default();
        let clock = FixedClock::on(date(2024, 1, 5));
        let returns = processor(&store, &history, &clock);

        let err = returns
            .register_return(&loan.id, Some("loaned"), None, None)
            .unwrap_err();
        assert!(matches!(err, CirculationError::InvalidItemCondition(ref c) if c == "loaned"));

        let stored = LoanRepository::find(&store, &loan.id).unwrap().unwrap();
        assert_eq!(stored.state, LoanState::Active);
        assert!(returns.find_return(&loan.id).unwrap().is_none());
    }

    #[test]
    fn unknown_loan_is_not_found() {
        let store = desk();
        let history = MemoryHistory::default();
        let clock = FixedClock::on(date(2024, 1, 5));
        let missing = LoanId::new(&"m-1".parse().unwrap(), &"EJ-1".parse().unwrap(), clock.now());

        assert!(matches!(
            processor(&store, &history, &clock).register_return(&missing, None, None, None),
            Err(CirculationError::NotFound {
                kind: RecordKind::Loan,
                ..
            })
        ));
    }

    #[test]
    fn overdue_loan_can_be_returned() {
        let store = desk();
        let loan = lent(&store);
        LoanRepository::transition(&store, &loan.id, &[LoanState::Active], LoanState::Overdue)
            .unwrap();

        let clock = FixedClock::on(date(2024, 1, 30));
        let record = processor(&store, &BrokenHistory, &clock)
            .register_return(&loan.id, None, None, None)
            .unwrap();

        // History failures do not undo the return
        assert_eq!(record.days_late, 14);
        let stored = LoanRepository::find(&store, &loan.id).unwrap().unwrap();
        assert_eq!(stored.state, LoanState::Returned);
    }

    #[test]
    fn concurrent_returns_yield_one_success() {
        let store = desk();
        let loan = lent(&store);
        let history = MemoryHistory::default();
        let clock = FixedClock::on(date(2024, 1, 20));
        let returns = processor(&store, &history, &clock);

        let results: Vec<Result<ReturnRecord>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let (returns, id) = (&returns, &loan.id);
                    s.spawn(move || returns.register_return(id, None, None, None))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, CirculationError::LoanAlreadyReturned { .. })));
        assert_eq!(history.entries.lock().unwrap().len(), 1);
    }
}
