//! Per-invocation wiring: one open desk, the wall clock and the services

use anyhow::{Context, Result};

use crate::circulation::{
    LoanLifecycleManager, NotificationScheduler, Repositories, ReturnProcessor, SystemClock,
};
use crate::domain::PersonId;
use crate::storage::Desk;

pub struct Session {
    pub desk: Desk,
    clock: SystemClock,
}

impl Session {
    /// Opens the desk at the current directory or a parent
    pub fn open() -> Result<Self> {
        Ok(Self {
            desk: Desk::open_current()?,
            clock: SystemClock,
        })
    }

    pub fn repos(&self) -> Repositories<'_> {
        Repositories::new(self.desk.store(), self.desk.history())
    }

    pub fn lifecycle(&self) -> LoanLifecycleManager<'_> {
        LoanLifecycleManager::new(
            self.repos(),
            &self.clock,
            self.desk.config().desk.default_category,
        )
    }

    pub fn returns(&self) -> ReturnProcessor<'_> {
        ReturnProcessor::new(self.repos(), &self.clock)
    }

    pub fn scheduler(&self) -> NotificationScheduler<'_> {
        let config = &self.desk.config().desk;
        NotificationScheduler::new(
            self.repos(),
            self.desk.notifier(),
            &self.clock,
            config.reminder_lead_days,
            config.notifier.subject.clone(),
        )
    }

    /// The librarian acting at the desk: `--agent`, then config, then $CIRC_AGENT
    pub fn agent(&self, explicit: Option<PersonId>) -> Result<PersonId> {
        explicit
            .or_else(|| self.desk.config().desk.agent.effective_id())
            .context("No agent given. Pass --agent, set [agent] id in .circulation/config.toml or export CIRC_AGENT")
    }
}
