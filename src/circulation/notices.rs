//! Reminder and overdue notices

use serde::Serialize;
use tracing::{debug, info, warn};

use super::{Clock, Repositories};
use crate::domain::{Loan, NoticeKind, Notification, NotificationId};
use crate::error::{Result, StoreContext};
use crate::storage::{Envelope, NotifierGateway};

/// What one scan produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub reminders: Vec<NotificationId>,
    pub overdue: Vec<NotificationId>,
    /// Loans that already carried the notice they called for
    pub skipped: usize,
}

impl ScanReport {
    pub fn created(&self) -> usize {
        self.reminders.len() + self.overdue.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryFailure {
    pub notification: NotificationId,
    pub reason: String,
    /// False when the notice was dropped rather than left for the next run
    pub will_retry: bool,
}

/// What one delivery run did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub delivered: Vec<NotificationId>,
    pub failed: Vec<DeliveryFailure>,
}

/// Generates notices for open loans and hands them to the notifier
pub struct NotificationScheduler<'a> {
    repos: Repositories<'a>,
    gateway: &'a dyn NotifierGateway,
    clock: &'a dyn Clock,
    lead_days: u32,
    subject: String,
}

impl<'a> NotificationScheduler<'a> {
    pub fn new(
        repos: Repositories<'a>,
        gateway: &'a dyn NotifierGateway,
        clock: &'a dyn Clock,
        lead_days: u32,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            repos,
            gateway,
            clock,
            lead_days,
            subject: subject.into(),
        }
    }

    /// Creates the reminder or overdue notice each open loan calls for today.
    ///
    /// A loan never gets two notices with the same message (ignoring case),
    /// however often this runs; a reminder and a later overdue notice for
    /// the same loan both stay.
    pub fn scan_and_generate(&self) -> Result<ScanReport> {
        let today = self.clock.today();
        let loans = self
            .repos
            .loans
            .list_open()
            .store_context("Failed to list open loans")?;

        let mut report = ScanReport::default();
        for loan in &loans {
            let Some(kind) = NoticeKind::for_loan(loan, today, self.lead_days) else {
                continue;
            };
            let message = kind.message(self.lead_days);

            let exists = self
                .repos
                .notifications
                .exists(&loan.id, &message)
                .with_store_context(|| format!("Failed to check notices of {}", loan.id))?;
            if exists {
                report.skipped += 1;
                continue;
            }

            let notice = Notification::new(loan.id.clone(), message, self.clock.now());
            let inserted = self
                .repos
                .notifications
                .insert(&notice)
                .with_store_context(|| format!("Failed to save notice for {}", loan.id))?;

            // Losing the insert race to another scan counts as a duplicate
            if !inserted {
                report.skipped += 1;
                continue;
            }

            debug!(loan = %loan.id, notice = %notice.id, message = %notice.message, "notice created");
            match kind {
                NoticeKind::Reminder => report.reminders.push(notice.id),
                NoticeKind::Overdue => report.overdue.push(notice.id),
            }
        }

        info!(
            reminders = report.reminders.len(),
            overdue = report.overdue.len(),
            skipped = report.skipped,
            "notice scan finished"
        );
        Ok(report)
    }

    /// Sends every undelivered notice as one batch.
    ///
    /// Notices whose member has no usable address are dropped (marked
    /// delivered) and reported. Notices the gateway rejects stay pending.
    pub fn deliver_pending(&self) -> Result<DeliveryReport> {
        let pending = self
            .repos
            .notifications
            .list_undelivered()
            .store_context("Failed to list pending notices")?;

        let mut report = DeliveryReport::default();
        let mut batch = Vec::new();
        let mut sendable = Vec::new();

        for notice in pending {
            match self.envelope_for(&notice)? {
                Ok(envelope) => {
                    batch.push(envelope);
                    sendable.push(notice);
                }
                Err(reason) => {
                    warn!(notice = %notice.id, %reason, "dropping undeliverable notice");
                    self.mark_delivered(&notice.id)?;
                    report.failed.push(DeliveryFailure {
                        notification: notice.id,
                        reason,
                        will_retry: false,
                    });
                }
            }
        }

        if !batch.is_empty() {
            let mut results = self.gateway.send_batch(&batch).into_iter();

            for notice in sendable {
                let result = results
                    .next()
                    .unwrap_or_else(|| Err("no result from notifier".to_string()));
                match result {
                    Ok(()) => {
                        self.mark_delivered(&notice.id)?;
                        report.delivered.push(notice.id);
                    }
                    Err(reason) => {
                        warn!(notice = %notice.id, %reason, "notifier rejected notice");
                        report.failed.push(DeliveryFailure {
                            notification: notice.id,
                            reason,
                            will_retry: true,
                        });
                    }
                }
            }
        }

        info!(
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "notice delivery finished"
        );
        Ok(report)
    }

    /// Builds the envelope for `notice`, or the reason it cannot be sent
    fn envelope_for(&self, notice: &Notification) -> Result<std::result::Result<Envelope, String>> {
        let Some(loan) = self
            .repos
            .loans
            .find(&notice.loan)
            .with_store_context(|| format!("Failed to load loan {}", notice.loan))?
        else {
            return Ok(Err(format!("loan {} no longer exists", notice.loan)));
        };

        let member = self
            .repos
            .members
            .find(&loan.member)
            .with_store_context(|| format!("Failed to load member {}", loan.member))?;

        let Some(address) = member.as_ref().and_then(|m| m.contact_address()) else {
            return Ok(Err(format!("member {} has no contact address", loan.member)));
        };

        Ok(Ok(Envelope {
            address: address.to_string(),
            subject: self.subject.clone(),
            body: notice_body(notice, &loan),
        }))
    }

    fn mark_delivered(&self, id: &NotificationId) -> Result<()> {
        self.repos
            .notifications
            .mark_delivered(id)
            .with_store_context(|| format!("Failed to mark notice {} delivered", id))
    }
}

fn notice_body(notice: &Notification, loan: &Loan) -> String {
    format!(
        "{}\n\nItem {} (loan {}) was lent on {} and is due on {}.\n",
        notice.message, loan.item, loan.id, loan.loan_date, loan.due_date
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::circulation::fixtures::{date, desk, MemoryHistory};
    use crate::circulation::{FixedClock, LoanLifecycleManager, ReturnProcessor};
    use crate::domain::{Membership, Person, PolicyCategory, OVERDUE_MESSAGE};
    use crate::storage::{NotificationRepository, SqliteStore};

    /// Accepts everything except addresses listed in `reject`
    #[derive(Default)]
    struct RecordingGateway {
        reject: Vec<String>,
        sent: Mutex<Vec<Envelope>>,
    }

    impl NotifierGateway for RecordingGateway {
        fn send_batch(&self, batch: &[Envelope]) -> Vec<std::result::Result<(), String>> {
            batch
                .iter()
                .map(|e| {
                    if self.reject.contains(&e.address) {
                        Err("mailbox full".to_string())
                    } else {
                        self.sent.lock().unwrap().push(e.clone());
                        Ok(())
                    }
                })
                .collect()
        }
    }

    /// Lends `item` to `member` on 2024-01-01; students are due 2024-01-16
    fn lend(store: &SqliteStore, member: &str, item: &str) -> Loan {
        let history = MemoryHistory::default();
        let clock = FixedClock::on(date(2024, 1, 1));
        LoanLifecycleManager::new(Repositories::new(store, &history), &clock, PolicyCategory::General)
            .lend(&member.parse().unwrap(), &item.parse().unwrap(), &"b-1".parse().unwrap(), None)
            .unwrap()
    }

    fn scan_on(store: &SqliteStore, day: chrono::NaiveDate) -> ScanReport {
        let history = MemoryHistory::default();
        let gateway = RecordingGateway::default();
        let clock = FixedClock::on(day);
        NotificationScheduler::new(Repositories::new(store, &history), &gateway, &clock, 2, "Notice")
            .scan_and_generate()
            .unwrap()
    }

    #[test]
    fn reminder_then_overdue_without_duplicates() {
        let store = desk();
        let loan = lend(&store, "m-1", "EJ-1");

        // Two days before 2024-01-16
        let first = scan_on(&store, date(2024, 1, 14));
        assert_eq!(first.reminders.len(), 1);
        assert!(first.overdue.is_empty());

        let again = scan_on(&store, date(2024, 1, 14));
        assert_eq!(again.created(), 0);
        assert_eq!(again.skipped, 1);

        let late = scan_on(&store, date(2024, 1, 17));
        assert_eq!(late.overdue.len(), 1);
        let late_again = scan_on(&store, date(2024, 1, 18));
        assert_eq!(late_again.created(), 0);

        let notices = store.list_for_loan(&loan.id).unwrap();
        let messages: Vec<_> = notices.iter().map(|n| n.message.as_str()).collect();
        assert_eq!(messages, vec!["reminder: due in 2 days", OVERDUE_MESSAGE]);
    }

    #[test]
    fn one_day_lead_reminder_reads_singular() {
        let store = desk();
        let loan = lend(&store, "m-1", "EJ-1");

        let history = MemoryHistory::default();
        let gateway = RecordingGateway::default();
        let clock = FixedClock::on(date(2024, 1, 15));
        let report =
            NotificationScheduler::new(Repositories::new(&store, &history), &gateway, &clock, 1, "Notice")
                .scan_and_generate()
                .unwrap();

        assert_eq!(report.reminders.len(), 1);
        let notices = store.list_for_loan(&loan.id).unwrap();
        assert_eq!(notices[0].message, "reminder: due in 1 day");
    }

    #[test]
    fn quiet_days_produce_nothing() {
        let store = desk();
        lend(&store, "m-1", "EJ-1");

        assert_eq!(scan_on(&store, date(2024, 1, 10)), ScanReport::default());
        assert_eq!(scan_on(&store, date(2024, 1, 16)), ScanReport::default());
    }

    #[test]
    fn returned_loans_are_ignored() {
        let store = desk();
        let loan = lend(&store, "m-1", "EJ-1");

        let history = MemoryHistory::default();
        let clock = FixedClock::on(date(2024, 1, 10));
        ReturnProcessor::new(Repositories::new(&store, &history), &clock)
            .register_return(&loan.id, None, None, None)
            .unwrap();

        assert_eq!(scan_on(&store, date(2024, 1, 20)).created(), 0);
    }

    #[test]
    fn existing_notice_in_other_case_counts_as_duplicate() {
        let store = desk();
        let loan = lend(&store, "m-1", "EJ-1");
        store
            .insert(&Notification::new(
                loan.id.clone(),
                "OVERDUE NOTICE",
                FixedClock::on(date(2024, 1, 17)).now(),
            ))
            .unwrap();

        let report = scan_on(&store, date(2024, 1, 18));
        assert_eq!(report.created(), 0);
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn delivery_marks_sent_and_keeps_rejected() {
        let store = desk();
        store
            .upsert_person(
                &Person::patron("m-2".parse().unwrap(), "Grace", "302", Membership::new("Estudiante"))
                    .with_email("grace@example.org"),
            )
            .unwrap();
        store
            .upsert_person(&Person::patron(
                "m-3".parse().unwrap(),
                "Hopper",
                "303",
                Membership::new("Estudiante"),
            ))
            .unwrap();

        let ada = lend(&store, "m-1", "EJ-1");
        let grace = lend(&store, "m-2", "EJ-2");
        let silent = lend(&store, "m-3", "EJ-3");
        assert_eq!(scan_on(&store, date(2024, 1, 20)).overdue.len(), 3);

        let history = MemoryHistory::default();
        let gateway = RecordingGateway {
            reject: vec!["grace@example.org".to_string()],
            ..Default::default()
        };
        let clock = FixedClock::on(date(2024, 1, 20));
        let scheduler = NotificationScheduler::new(
            Repositories::new(&store, &history),
            &gateway,
            &clock,
            2,
            "Library notice",
        );

        let report = scheduler.deliver_pending().unwrap();
        assert_eq!(report.delivered.len(), 1);
        assert_eq!(report.failed.len(), 2);

        let sent = gateway.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].address, "ada@example.org");
        assert_eq!(sent[0].subject, "Library notice");
        assert!(sent[0].body.starts_with(OVERDUE_MESSAGE));
        assert!(sent[0].body.contains(ada.id.to_string().as_str()));

        let no_address = report
            .failed
            .iter()
            .find(|f| !f.will_retry)
            .unwrap();
        assert!(no_address.reason.contains("m-3"));

        // Only the rejected notice is left for the next run
        let pending = store.list_undelivered().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].loan, grace.id);
        assert!(store
            .list_for_loan(&silent.id)
            .unwrap()
            .iter()
            .all(|n| n.delivered));

        let rerun = scheduler.deliver_pending().unwrap();
        assert!(rerun.delivered.is_empty());
        assert_eq!(rerun.failed.len(), 1);
        assert!(rerun.failed[0].will_retry);
    }

    #[test]
    fn nothing_pending_sends_nothing() {
        let store = desk();
        let history = MemoryHistory::default();
        let gateway = RecordingGateway::default();
        let clock = FixedClock::on(date(2024, 1, 20));

        let report = NotificationScheduler::new(
            Repositories::new(&store, &history),
            &gateway,
            &clock,
            2,
            "Notice",
        )
        .deliver_pending()
        .unwrap();

        assert_eq!(report, DeliveryReport::default());
        assert!(gateway.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn concurrent_scans_create_each_notice_once() {
        let store = desk();
        let loan = lend(&store, "m-1", "EJ-1");

        std::thread::scope(|s| {
            for _ in 0..6 {
                let store = &store;
                s.spawn(move || scan_on(store, date(2024, 1, 20)));
            }
        });

        assert_eq!(store.list_for_loan(&loan.id).unwrap().len(), 1);
    }
}
