use chrono::{DateTime, Utc};

/// Wall-clock source for the runtime loop.
///
/// The scheduler core itself takes explicit timestamps, so only the loop that
/// drives it needs a clock; swapping this out keeps the loop testable without
/// sleeping through real intervals.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
