//! Time source for the circulation services

use chrono::{DateTime, Local, NaiveDate, NaiveTime, Utc};

pub trait Clock: Send + Sync {
    /// Current instant, used for record timestamps
    fn now(&self) -> DateTime<Utc>;

    /// Current calendar day at the desk, used for every date rule
    fn today(&self) -> NaiveDate;
}

/// Wall clock; days follow the desk's local time zone
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// A clock stopped on one day
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    now: DateTime<Utc>,
}

impl FixedClock {
    /// Stops the clock at noon UTC on `day`
    pub fn on(day: NaiveDate) -> Self {
        Self {
            now: day.and_time(NaiveTime::MIN).and_utc() + chrono::Duration::hours(12),
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }
}
