use chrono::{DateTime, FixedOffset, Local, TimeZone};
use std::sync::Mutex;

/// Source of "now" for the event logs and the statistics views.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;

    fn now_ms(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Clock pinned to a given instant; used by tests.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<FixedOffset>>,
}

impl FixedClock {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Instant `ms` after the epoch, in UTC.
    pub fn at_ms(ms: i64) -> Self {
        Self::new(
            DateTime::from_timestamp_millis(ms)
                .unwrap_or_default()
                .fixed_offset(),
        )
    }

    pub fn set_ms(&self, ms: i64) {
        let mut guard = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let offset = *guard.offset();
        if let Some(next) = offset.timestamp_millis_opt(ms).single() {
            *guard = next;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
