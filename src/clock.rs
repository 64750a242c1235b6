use std::time::Duration;
use time::OffsetDateTime;

/// Wall clock plus blocking sleep, swappable in tests.
pub trait Clock {
    fn now(&self) -> OffsetDateTime;
    fn sleep(&self, d: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    fn sleep(&self, d: Duration) {
        std::thread::sleep(d);
    }
}
