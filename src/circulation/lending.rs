//! Loan creation and state tracking

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{Clock, PolicyResolver, Repositories};
use crate::domain::{HistoryEntry, Item, ItemCode, Loan, LoanId, LoanState, Person, PersonId, PolicyCategory};
use crate::error::{CirculationError, RecordKind, Result, StoreContext};
use crate::storage::CheckoutOutcome;

/// A loan together with its state as of today
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoanView {
    #[serde(flatten)]
    pub loan: Loan,

    /// State derived from the due date; may run ahead of `loan.state`
    pub current_state: LoanState,

    pub days_until_due: i64,
}

/// Creates loans and derives their current state
pub struct LoanLifecycleManager<'a> {
    repos: Repositories<'a>,
    resolver: PolicyResolver<'a>,
    clock: &'a dyn Clock,
}

impl<'a> LoanLifecycleManager<'a> {
    pub fn new(repos: Repositories<'a>, clock: &'a dyn Clock, default_category: PolicyCategory) -> Self {
        Self {
            resolver: PolicyResolver::new(repos.policies, default_category),
            repos,
            clock,
        }
    }

    pub fn resolver(&self) -> &PolicyResolver<'a> {
        &self.resolver
    }

    /// Lends `item` to `member`, authorized by `agent`.
    ///
    /// The loan date defaults to today. The loan and the item's move to
    /// Loaned are committed together; the history entry afterwards is
    /// best-effort and never undoes the loan.
    pub fn create_loan(
        &self,
        member: &Person,
        item: &Item,
        agent: &Person,
        loan_date: Option<NaiveDate>,
    ) -> Result<Loan> {
        let membership = member
            .membership()
            .ok_or_else(|| CirculationError::MemberNotEligible {
                member: member.id.clone(),
                reason: "only patrons can borrow".to_string(),
            })?;
        if let Some(reason) = membership.ineligibility() {
            return Err(CirculationError::MemberNotEligible {
                member: member.id.clone(),
                reason: reason.to_string(),
            });
        }

        if !agent.is_librarian() {
            return Err(CirculationError::AgentNotAuthorized {
                agent: agent.id.clone(),
            });
        }

        if !item.state.is_lendable() {
            return Err(CirculationError::ItemNotAvailable {
                item: item.code.clone(),
                state: item.state,
            });
        }

        let open = self
            .repos
            .loans
            .count_open_for_member(&member.id)
            .with_store_context(|| format!("Failed to count open loans of {}", member.id))?;
        let policy = self.resolver.resolve(member)?;
        if !policy.allows_another(open) {
            return Err(CirculationError::LoanLimitExceeded {
                member: member.id.clone(),
                open,
                limit: policy.max_open_loans,
            });
        }

        let loan_date = loan_date.unwrap_or_else(|| self.clock.today());
        let loan = Loan::open(
            member.id.clone(),
            item.code.clone(),
            agent.id.clone(),
            policy,
            loan_date,
            self.clock.now(),
        )?;
        debug!(loan = %loan.id, due = %loan.due_date, "committing loan");

        let outcome = self
            .repos
            .ledger
            .commit_checkout(&loan)
            .with_store_context(|| format!("Failed to save loan {}", loan.id))?;
        match outcome {
            CheckoutOutcome::Committed => {}
            CheckoutOutcome::ItemUnavailable(state) => {
                return Err(CirculationError::ItemNotAvailable {
                    item: loan.item,
                    state,
                })
            }
            CheckoutOutcome::LimitReached(open) => {
                return Err(CirculationError::LoanLimitExceeded {
                    member: loan.member,
                    open,
                    limit: loan.policy.max_open_loans,
                })
            }
        }

        info!(
            loan = %loan.id,
            member = %loan.member,
            item = %loan.item,
            due = %loan.due_date,
            "loan created"
        );

        let entry = HistoryEntry::loan_created(&loan, self.clock.now());
        if let Err(e) = self.repos.history.record(&entry) {
            warn!(loan = %loan.id, error = %e, "failed to record loan in history");
        }

        Ok(loan)
    }

    /// Looks up the three parties by id, then runs [`Self::create_loan`]
    pub fn lend(
        &self,
        member_id: &PersonId,
        item_code: &ItemCode,
        agent_id: &PersonId,
        loan_date: Option<NaiveDate>,
    ) -> Result<Loan> {
        let member = self
            .repos
            .members
            .find(member_id)
            .with_store_context(|| format!("Failed to load member {}", member_id))?
            .ok_or_else(|| CirculationError::not_found(RecordKind::Member, member_id))?;

        let agent = self
            .repos
            .members
            .find(agent_id)
            .with_store_context(|| format!("Failed to load agent {}", agent_id))?
            .ok_or_else(|| CirculationError::not_found(RecordKind::Agent, agent_id))?;

        let item = self
            .repos
            .items
            .find(item_code)
            .with_store_context(|| format!("Failed to load item {}", item_code))?
            .ok_or_else(|| CirculationError::not_found(RecordKind::Item, item_code))?;

        self.create_loan(&member, &item, &agent, loan_date)
    }

    /// State of `loan` as of today. Nothing is written.
    pub fn derive_state(&self, loan: &Loan) -> LoanState {
        loan.derive_state(self.clock.today())
    }

    /// Persists Active -> Overdue for every open loan past its due date.
    ///
    /// Returns the loans that moved. A loan returned meanwhile is left
    /// alone by the conditional update.
    pub fn refresh_states(&self) -> Result<Vec<LoanId>> {
        let open = self
            .repos
            .loans
            .list_open()
            .store_context("Failed to list open loans")?;

        let mut moved = Vec::new();
        for loan in open {
            if loan.state != LoanState::Active || self.derive_state(&loan) != LoanState::Overdue {
                continue;
            }

            let changed = self
                .repos
                .loans
                .transition(&loan.id, &[LoanState::Active], LoanState::Overdue)
                .with_store_context(|| format!("Failed to update loan {}", loan.id))?;
            if changed {
                debug!(loan = %loan.id, "loan marked overdue");
                moved.push(loan.id);
            }
        }

        if !moved.is_empty() {
            info!(count = moved.len(), "refreshed overdue loans");
        }
        Ok(moved)
    }

    pub fn find_loan(&self, id: &LoanId) -> Result<Loan> {
        self.repos
            .loans
            .find(id)
            .with_store_context(|| format!("Failed to load loan {}", id))?
            .ok_or_else(|| CirculationError::not_found(RecordKind::Loan, id))
    }

    /// Every open loan
    pub fn open_loans(&self) -> Result<Vec<LoanView>> {
        let loans = self
            .repos
            .loans
            .list_open()
            .store_context("Failed to list open loans")?;
        Ok(self.views(loans))
    }

    /// Loan history of a member, newest first
    pub fn loans_for_member(&self, member: &PersonId) -> Result<Vec<LoanView>> {
        let loans = self
            .repos
            .loans
            .list_for_member(member)
            .with_store_context(|| format!("Failed to list loans of {}", member))?;
        Ok(self.views(loans))
    }

    /// Loan history of an item, newest first
    pub fn loans_for_item(&self, item: &ItemCode) -> Result<Vec<LoanView>> {
        let loans = self
            .repos
            .loans
            .list_for_item(item)
            .with_store_context(|| format!("Failed to list loans of {}", item))?;
        Ok(self.views(loans))
    }

    /// Pairs each loan with its state as of today
    pub fn views(&self, loans: Vec<Loan>) -> Vec<LoanView> {
        let today = self.clock.today();
        loans
            .into_iter()
            .map(|loan| LoanView {
                current_state: loan.derive_state(today),
                days_until_due: loan.days_until_due(today),
                loan,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circulation::fixtures::{date, desk, BrokenHistory, MemoryHistory};
    use crate::circulation::FixedClock;
    use crate::domain::{HistoryKind, ItemState, MemberStatus, Membership};
    use crate::storage::{HistoryRecorder, ItemRepository, LoanRepository, MemberRepository, SqliteStore};

    fn manager<'a>(
        store: &'a SqliteStore,
        history: &'a dyn HistoryRecorder,
        clock: &'a FixedClock,
    ) -> LoanLifecycleManager<'a> {
        LoanLifecycleManager::new(Repositories::new(store, history), clock, PolicyCategory::General)
    }

    fn ids(member: &str, item: &str) -> (PersonId, ItemCode, PersonId) {
        (member.parse().unwrap(), item.parse().unwrap(), "b-1".parse().unwrap())
    }

    #[test]
    fn student_loan_is_due_after_fifteen_days() {
        let store = desk();
        let history = MemoryHistory::default();
        let clock = FixedClock::on(date(2024, 1, 1));
        let loans = manager(&store, &history, &clock);

        let (member, item, agent) = ids("m-1", "EJ-1");
        let loan = loans.lend(&member, &item, &agent, None).unwrap();

        assert_eq!(loan.loan_date, date(2024, 1, 1));
        assert_eq!(loan.due_date, date(2024, 1, 16));
        assert_eq!(loan.state, LoanState::Active);
        assert_eq!(loan.policy.category, PolicyCategory::Student);

        let item = ItemRepository::find(&store, &item).unwrap().unwrap();
        assert_eq!(item.state, ItemState::Loaned);

        let entries = history.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, HistoryKind::LoanCreated);
    }

    #[test]
    fn explicit_loan_date_is_used() {
        let store = desk();
        let history = MemoryHistory::default();
        let clock = FixedClock::on(date(2024, 6, 1));
        let loans = manager(&store, &history, &clock);

        let (member, item, agent) = ids("m-1", "EJ-1");
        let loan = loans
            .lend(&member, &item, &agent, Some(date(2024, 1, 1)))
            .unwrap();
        assert_eq!(loan.due_date, date(2024, 1, 16));
    }

    #[test]
    fn fourth_loan_exceeds_limit() {
        let store = desk();
        let history = MemoryHistory::default();
        let clock = FixedClock::on(date(2024, 1, 1));
        let loans = manager(&store, &history, &clock);

        for n in 1..=3 {
            let (member, item, agent) = ids("m-1", &format!("EJ-{}", n));
            loans.lend(&member, &item, &agent, None).unwrap();
        }

        let (member, item, agent) = ids("m-1", "EJ-4");
        let err = loans.lend(&member, &item, &agent, None).unwrap_err();
        assert!(matches!(
            err,
            CirculationError::LoanLimitExceeded { open: 3, limit: 3, .. }
        ));

        let untouched = ItemRepository::find(&store, &item).unwrap().unwrap();
        assert_eq!(untouched.state, ItemState::Available);
    }

    #[test]
    fn loaned_item_is_not_available() {
        let store = desk();
        store
            .upsert_person(&Person::patron(
                "m-2".parse().unwrap(),
                "Grace",
                "302",
                Membership::new("Docente"),
            ))
            .unwrap();
        let history = MemoryHistory::default();
        let clock = FixedClock::on(date(2024, 1, 1));
        let loans = manager(&store, &history, &clock);

        let (member, item, agent) = ids("m-1", "EJ-1");
        loans.lend(&member, &item, &agent, None).unwrap();

        let (other, item, agent) = ids("m-2", "EJ-1");
        let err = loans.lend(&other, &item, &agent, None).unwrap_err();
        assert!(matches!(
            err,
            CirculationError::ItemNotAvailable {
                state: ItemState::Loaned,
                ..
            }
        ));
    }

    #[test]
    fn oversized_stored_policy_is_rejected() {
        let store = desk();
        let history = MemoryHistory::default();
        let clock = FixedClock::on(date(2024, 1, 1));
        let loans = manager(&store, &history, &clock);

        let mut student = crate::domain::Policy::defaults().remove(1);
        student.fine_per_day = "1000000000000000000000000000".parse().unwrap();
        store.upsert_policy(&student).unwrap();

        let (member, item, agent) = ids("m-1", "EJ-1");
        let err = loans.lend(&member, &item, &agent, None).unwrap_err();
        assert!(matches!(
            err,
            CirculationError::InvalidPolicy(crate::domain::PolicyError::FineTooHigh(_))
        ));
    }

    #[test]
    fn unrepresentable_due_date_is_rejected() {
        let store = desk();
        let history = MemoryHistory::default();
        let clock = FixedClock::on(date(2024, 1, 1));
        let loans = manager(&store, &history, &clock);

        let (member, item, agent) = ids("m-1", "EJ-1");
        let err = loans
            .lend(&member, &item, &agent, Some(date(9999, 12, 25)))
            .unwrap_err();

        assert!(matches!(
            err,
            CirculationError::InvalidPolicy(crate::domain::PolicyError::DueDateOutOfRange { .. })
        ));
        let item = ItemRepository::find(&store, &item).unwrap().unwrap();
        assert_eq!(item.state, ItemState::Available);
    }

    #[test]
    fn stale_item_snapshot_is_caught_at_commit() {
        let store = desk();
        let history = MemoryHistory::default();
        let clock = FixedClock::on(date(2024, 1, 1));
        let loans = manager(&store, &history, &clock);

        let ada = MemberRepository::find(&store, &"m-1".parse().unwrap())
            .unwrap()
            .unwrap();
        let lin = MemberRepository::find(&store, &"b-1".parse().unwrap())
            .unwrap()
            .unwrap();
        let stale = ItemRepository::find(&store, &"EJ-1".parse().unwrap())
            .unwrap()
            .unwrap();

        ItemRepository::transition(&store, &stale.code, &[ItemState::Available], ItemState::Lost)
            .unwrap();

        let err = loans.create_loan(&ada, &stale, &lin, None).unwrap_err();
        assert!(matches!(
            err,
            CirculationError::ItemNotAvailable {
                state: ItemState::Lost,
                ..
            }
        ));
        assert!(store.list_for_item(&stale.code).unwrap().is_empty());
    }

    #[test]
    fn ineligible_members_are_rejected() {
        let store = desk();
        let history = MemoryHistory::default();
        let clock = FixedClock::on(date(2024, 1, 1));
        let loans = manager(&store, &history, &clock);

        let mut suspended = Membership::new("Estudiante");
        suspended.status = MemberStatus::Suspended;
        let mut sanctioned = Membership::new("Estudiante");
        sanctioned.sanctioned = true;
        let mut flagged = Membership::new("Estudiante");
        flagged.overdue = true;

        for (n, membership) in [suspended, sanctioned, flagged].into_iter().enumerate() {
            let id = format!("m-x{}", n);
            store
                .upsert_person(&Person::patron(
                    id.parse().unwrap(),
                    "X",
                    format!("40{}", n),
                    membership,
                ))
                .unwrap();

            let (member, item, agent) = ids(&id, "EJ-1");
            let err = loans.lend(&member, &item, &agent, None).unwrap_err();
            assert!(matches!(err, CirculationError::MemberNotEligible { .. }));
        }

        // A librarian is not a borrower
        let (_, item, agent) = ids("m-1", "EJ-1");
        let err = loans.lend(&agent, &item, &agent, None).unwrap_err();
        assert!(matches!(err, CirculationError::MemberNotEligible { .. }));
    }

    #[test]
    fn agent_must_be_librarian() {
        let store = desk();
        let history = MemoryHistory::default();
        let clock = FixedClock::on(date(2024, 1, 1));
        let loans = manager(&store, &history, &clock);

        let member: PersonId = "m-1".parse().unwrap();
        let item: ItemCode = "EJ-1".parse().unwrap();
        let err = loans.lend(&member, &item, &member, None).unwrap_err();
        assert!(matches!(err, CirculationError::AgentNotAuthorized { .. }));
    }

    #[test]
    fn unknown_references_are_not_found() {
        let store = desk();
        let history = MemoryHistory::default();
        let clock = FixedClock::on(date(2024, 1, 1));
        let loans = manager(&store, &history, &clock);

        let (member, item, agent) = ids("m-404", "EJ-1");
        assert!(matches!(
            loans.lend(&member, &item, &agent, None),
            Err(CirculationError::NotFound { kind: RecordKind::Member, .. })
        ));

        let (member, item, agent) = ids("m-1", "EJ-404");
        assert!(matches!(
            loans.lend(&member, &item, &agent, None),
            Err(CirculationError::NotFound { kind: RecordKind::Item, .. })
        ));

        let (member, item, _) = ids("m-1", "EJ-1");
        assert!(matches!(
            loans.lend(&member, &item, &"b-404".parse().unwrap(), None),
            Err(CirculationError::NotFound { kind: RecordKind::Agent, .. })
        ));
    }

    #[test]
    fn history_failure_keeps_the_loan() {
        let store = desk();
        let clock = FixedClock::on(date(2024, 1, 1));
        let loans = manager(&store, &BrokenHistory, &clock);

        let (member, item, agent) = ids("m-1", "EJ-1");
        let loan = loans.lend(&member, &item, &agent, None).unwrap();

        assert!(LoanRepository::find(&store, &loan.id).unwrap().is_some());
    }

    #[test]
    fn derived_state_follows_the_calendar() {
        let store = desk();
        let history = MemoryHistory::default();
        let clock = FixedClock::on(date(2024, 1, 1));
        let loan = manager(&store, &history, &clock)
            .lend(&"m-1".parse().unwrap(), &"EJ-1".parse().unwrap(), &"b-1".parse().unwrap(), None)
            .unwrap();

        let on_due = FixedClock::on(date(2024, 1, 16));
        assert_eq!(manager(&store, &history, &on_due).derive_state(&loan), LoanState::Active);

        let after = FixedClock::on(date(2024, 1, 17));
        let later = manager(&store, &history, &after);
        assert_eq!(later.derive_state(&loan), LoanState::Overdue);

        // Derivation alone writes nothing
        let stored = later.find_loan(&loan.id).unwrap();
        assert_eq!(stored.state, LoanState::Active);

        let open = later.open_loans().unwrap();
        assert_eq!(open[0].current_state, LoanState::Overdue);
        assert_eq!(open[0].days_until_due, -1);
    }

    #[test]
    fn refresh_persists_overdue_once() {
        let store = desk();
        let history = MemoryHistory::default();
        let clock = FixedClock::on(date(2024, 1, 1));
        let first = manager(&store, &history, &clock);
        let late = first
            .lend(&"m-1".parse().unwrap(), &"EJ-1".parse().unwrap(), &"b-1".parse().unwrap(), None)
            .unwrap();
        let fresh = first
            .lend(
                &"m-1".parse().unwrap(),
                &"EJ-2".parse().unwrap(),
                &"b-1".parse().unwrap(),
                Some(date(2024, 1, 10)),
            )
            .unwrap();

        let after = FixedClock::on(date(2024, 1, 20));
        let later = manager(&store, &history, &after);

        assert_eq!(later.refresh_states().unwrap(), vec![late.id.clone()]);
        assert!(later.refresh_states().unwrap().is_empty());

        assert_eq!(later.find_loan(&late.id).unwrap().state, LoanState::Overdue);
        assert_eq!(later.find_loan(&fresh.id).unwrap().state, LoanState::Active);
        assert_eq!(later.loans_for_member(&"m-1".parse().unwrap()).unwrap().len(), 2);
        assert_eq!(later.loans_for_item(&"EJ-2".parse().unwrap()).unwrap().len(), 1);
    }

    #[test]
    fn concurrent_loans_of_one_item_yield_one_winner() {
        let store = desk();
        for n in 2..=9 {
            store
                .upsert_person(&Person::patron(
                    format!("m-{}", n).parse().unwrap(),
                    "P",
                    format!("30{}", n),
                    Membership::new("Docente"),
                ))
                .unwrap();
        }
        let history = MemoryHistory::default();
        let clock = FixedClock::on(date(2024, 1, 1));
        let loans = manager(&store, &history, &clock);
        let item: ItemCode = "EJ-1".parse().unwrap();
        let agent: PersonId = "b-1".parse().unwrap();

        let results: Vec<Result<Loan>> = std::thread::scope(|s| {
            let handles: Vec<_> = (1..=9)
                .map(|n| {
                    let (loans, item, agent) = (&loans, &item, &agent);
                    s.spawn(move || {
                        let member: PersonId = format!("m-{}", n).parse().unwrap();
                        loans.lend(&member, item, agent, None)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, CirculationError::ItemNotAvailable { .. })));
        assert_eq!(store.list_for_item(&item).unwrap().len(), 1);
    }

    #[test]
    fn concurrent_loans_never_exceed_limit() {
        let store = desk();
        let history = MemoryHistory::default();
        let clock = FixedClock::on(date(2024, 1, 1));
        let loans = manager(&store, &history, &clock);
        let member: PersonId = "m-1".parse().unwrap();
        let agent: PersonId = "b-1".parse().unwrap();

        std::thread::scope(|s| {
            for n in 1..=5 {
                let (loans, member, agent) = (&loans, &member, &agent);
                s.spawn(move || {
                    let item: ItemCode = format!("EJ-{}", n).parse().unwrap();
                    let _ = loans.lend(member, &item, agent, None);
                });
            }
        });

        assert_eq!(store.count_open_for_member(&member).unwrap(), 3);
    }
}
