//! Background loop that asks for menu refreshes.
//!
//! The loop never touches tray objects itself. Each tick calls a callback,
//! which in the tray posts an event to the UI thread, so all menu mutation
//! stays on one thread.

use crate::otp::{unix_seconds_f64, DEFAULT_PERIOD};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

/// Shortest wait in window-aligned mode.
const MIN_ALIGNED_DELAY: Duration = Duration::from_secs(1);

/// Delay before the next tick.
///
/// `interval_secs >= 1` is a fixed cadence. Anything else waits until the next
/// 30 second boundary, but never less than one second so a code that is about
/// to expire is not drawn.
pub fn next_delay(interval_secs: i64, now: OffsetDateTime) -> Duration {
    if interval_secs >= 1 {
        return Duration::from_secs(interval_secs.unsigned_abs());
    }

    let period = DEFAULT_PERIOD as f64;
    let remaining = period - unix_seconds_f64(now).rem_euclid(period);
    Duration::from_secs_f64(remaining.clamp(1.0, period)).max(MIN_ALIGNED_DELAY)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
    Stopping,
}

pub type Tick = Box<dyn FnMut() -> anyhow::Result<()> + Send>;

/// Owns the refresh thread.
pub struct RefreshScheduler {
    state: SchedulerState,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Default for RefreshScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshScheduler {
    pub fn new() -> Self {
        Self {
            state: SchedulerState::Stopped,
            stop_tx: None,
            handle: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Starts ticking. A running scheduler is stopped first.
    pub fn start(&mut self, interval_secs: i64, tick: Tick) -> anyhow::Result<()> {
        if self.state != SchedulerState::Stopped {
            self.stop(Duration::from_secs(1));
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = std::thread::Builder::new()
            .name("menu-refresh".to_string())
            .spawn(move || run_loop(interval_secs, tick, stop_rx))?;

        self.stop_tx = Some(stop_tx);
        self.handle = Some(handle);
        self.state = SchedulerState::Running;
        info!("refresh scheduler started (interval {interval_secs})");
        Ok(())
    }

    /// Signals the loop and waits up to `timeout` for it to exit.
    /// Returns `false` if the thread was still alive when the wait ran out;
    /// it is then left detached.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        if self.state == SchedulerState::Stopped {
            return true;
        }
        self.state = SchedulerState::Stopping;

        // Dropping the sender disconnects the channel, which also wakes the loop.
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.try_send(());
        }

        let joined = match self.handle.take() {
            Some(handle) => join_with_timeout(handle, timeout),
            None => true,
        };
        if joined {
            info!("refresh scheduler stopped");
        } else {
            warn!("refresh thread did not exit within {timeout:?}");
        }
        self.state = SchedulerState::Stopped;
        joined
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.stop(Duration::from_secs(1));
    }
}

fn run_loop(interval_secs: i64, mut tick: Tick, stop_rx: Receiver<()>) {
    loop {
        let delay = next_delay(interval_secs, OffsetDateTime::now_utc());
        match stop_rx.recv_timeout(delay) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        match catch_unwind(AssertUnwindSafe(&mut tick)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("menu refresh failed: {e:#}"),
            Err(_) => error!("menu refresh panicked"),
        }
    }
    debug!("refresh loop exiting");
}

fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    if handle.join().is_err() {
        error!("refresh thread panicked");
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn at_millis(ms: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000).unwrap()
    }

    #[rstest]
    #[case(1, 0, Duration::from_secs(1))]
    #[case(5, 12_345, Duration::from_secs(5))]
    #[case(60, 29_000, Duration::from_secs(60))]
    fn fixed_interval_ignores_clock(#[case] interval: i64, #[case] ms: i64, #[case] expected: Duration) {
        assert_eq!(next_delay(interval, at_millis(ms)), expected);
    }

    #[rstest]
    #[case(0, 0, Duration::from_secs(30))]
    #[case(0, 10_000, Duration::from_secs(20))]
    #[case(-3, 40_000, Duration::from_secs(20))]
    #[case(0, 29_000, Duration::from_secs(1))]
    #[case(0, 29_999, Duration::from_secs(1))]
    #[case(0, 1_700_000_038_500, Duration::from_millis(1_500))]
    fn aligned_interval_targets_window_boundary(#[case] interval: i64, #[case] ms: i64, #[case] expected: Duration) {
        assert_eq!(next_delay(interval, at_millis(ms)), expected);
    }

    #[test]
    fn aligned_delay_always_in_range() {
        for ms in (0..60_000).step_by(250) {
            let d = next_delay(0, at_millis(ms));
            assert!(d > Duration::ZERO && d <= Duration::from_secs(30), "{ms}: {d:?}");
        }
    }

    #[test]
    fn stop_interrupts_a_long_wait() {
        let mut scheduler = RefreshScheduler::new();
        scheduler.start(3600, Box::new(|| Ok(()))).unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Running);

        let started = Instant::now();
        assert!(scheduler.stop(Duration::from_secs(5)));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }

    #[test]
    fn failing_ticks_do_not_end_the_loop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut scheduler = RefreshScheduler::new();
        scheduler
            .start(
                1,
                Box::new(move || {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n == 0 {
                        anyhow::bail!("rebuild failed");
                    }
                    if n == 1 {
                        panic!("rebuild panicked");
                    }
                    Ok(())
                }),
            )
            .unwrap();

        std::thread::sleep(Duration::from_millis(3_500));
        assert!(scheduler.stop(Duration::from_secs(5)));
        assert!(calls.load(Ordering::SeqCst) >= 3);
    }

    #[test]
    fn no_ticks_after_stop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut scheduler = RefreshScheduler::new();
        scheduler
            .start(
                1,
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            )
            .unwrap();

        assert!(scheduler.stop(Duration::from_secs(5)));
        let seen = calls.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(1_500));
        assert_eq!(calls.load(Ordering::SeqCst), seen);
    }
}
