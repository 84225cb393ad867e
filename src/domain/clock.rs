//! Reference clock: an explicit "now" paired with the timezone that defines
//! the trader's day.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceClock {
    now: DateTime<Utc>,
    tz: Tz,
}

impl ReferenceClock {
    pub fn new(now: DateTime<Utc>, tz: Tz) -> Self {
        Self { now, tz }
    }

    pub fn system(tz: Tz) -> Self {
        Self::new(Utc::now(), tz)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Same instant, viewed from another timezone.
    pub fn in_timezone(&self, tz: Tz) -> Self {
        Self::new(self.now, tz)
    }

    pub fn local_time(&self) -> NaiveTime {
        self.now.with_timezone(&self.tz).time()
    }

    /// Calendar day that daily aggregates and locks are keyed on.
    pub fn reference_day(&self) -> NaiveDate {
        self.now.with_timezone(&self.tz).date_naive()
    }

    /// First instant of the reference day, in UTC.
    pub fn day_start(&self) -> DateTime<Utc> {
        let local = self.now.with_timezone(&self.tz).naive_local();
        let midnight = local.date().and_time(NaiveTime::MIN);
        match self.tz.from_local_datetime(&midnight).earliest() {
            Some(start) => start.with_timezone(&Utc),
            // Midnight skipped by a DST transition.
            None => self.now - (local - midnight),
        }
    }
}
