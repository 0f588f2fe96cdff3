//! Clock and pacing utilities for the real-time render loop.
//!
//! The streaming encoder samples the drawing surface on its own wall-clock
//! cadence, so the render loop has to be paced against time as well. Both
//! sides take their notion of time from a [`Clock`]:
//! - [`TokioClock`] sleeps on the tokio timer (production, and deterministic
//!   under a paused tokio runtime)
//! - [`VirtualClock`] records requested delays and returns immediately

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::time::Instant;

/// Source of delays, monotonic time and calendar dates.
#[async_trait]
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Suspend the caller for `duration`.
    async fn sleep(&self, duration: Duration);

    /// Current monotonic instant.
    fn now(&self) -> Instant;

    /// Suspend the caller until `deadline`. Returns promptly if it has
    /// already passed.
    async fn sleep_until(&self, deadline: Instant);

    /// Today's date, used for artifact file names.
    fn today(&self) -> NaiveDate;
}

/// Clock backed by the tokio timer and the local calendar.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&self, deadline: Instant) {
        tokio::time::sleep_until(deadline).await;
    }

    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}

/// Deterministic clock for tests.
///
/// Every `sleep` is recorded and advances a virtual elapsed counter, then
/// yields to the scheduler so concurrently running tasks still interleave.
/// `sleep_until` moves the counter forward to the deadline (never back).
#[derive(Debug)]
pub struct VirtualClock {
    origin: Instant,
    elapsed_ns: AtomicU64,
    sleeps: Mutex<Vec<Duration>>,
    today: NaiveDate,
}

impl VirtualClock {
    /// Create a virtual clock pinned to the given calendar date.
    pub fn new(today: NaiveDate) -> Self {
        Self {
            origin: Instant::now(),
            elapsed_ns: AtomicU64::new(0),
            sleeps: Mutex::new(Vec::new()),
            today,
        }
    }

    /// Total virtual time slept so far.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_ns.load(Ordering::SeqCst))
    }

    /// All delays requested so far, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default())
    }
}

#[async_trait]
impl Clock for VirtualClock {
    async fn sleep(&self, duration: Duration) {
        self.elapsed_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
        tokio::task::yield_now().await;
    }

    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    async fn sleep_until(&self, deadline: Instant) {
        let target = deadline.saturating_duration_since(self.origin).as_nanos() as u64;
        self.elapsed_ns.fetch_max(target, Ordering::SeqCst);
        tokio::task::yield_now().await;
    }

    fn today(&self) -> NaiveDate {
        self.today
    }
}

/// Interval between frames at the given rate.
pub fn frame_interval(fps: u32) -> Duration {
    Duration::from_nanos(1_000_000_000 / fps.max(1) as u64)
}

/// Paces a producer loop at a fixed frame rate.
///
/// The pacer does not compensate for time spent drawing: it always waits a
/// full frame interval after each frame.
#[derive(Debug, Clone)]
pub struct FramePacer {
    clock: Arc<dyn Clock>,
    interval: Duration,
    ticks: u64,
}

impl FramePacer {
    /// Create a pacer targeting `fps` frames per second.
    pub fn new(clock: Arc<dyn Clock>, fps: u32) -> Self {
        Self {
            clock,
            interval: frame_interval(fps),
            ticks: 0,
        }
    }

    /// Wait one frame interval.
    pub async fn wait_next(&mut self) {
        self.clock.sleep(self.interval).await;
        self.ticks += 1;
    }

    /// Number of completed waits.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_interval() {
        assert_eq!(frame_interval(30), Duration::from_nanos(33_333_333));
        assert_eq!(frame_interval(0), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_virtual_clock_records_sleeps() {
        let clock = VirtualClock::default();
        clock.sleep(Duration::from_millis(10)).await;
        clock.sleep(Duration::from_millis(5)).await;
        assert_eq!(clock.elapsed(), Duration::from_millis(15));
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_millis(10), Duration::from_millis(5)]
        );
    }

    #[tokio::test]
    async fn test_pacer_waits_full_interval_per_frame() {
        let clock = Arc::new(VirtualClock::default());
        let mut pacer = FramePacer::new(clock.clone(), 30);
        for _ in 0..3 {
            pacer.wait_next().await;
        }
        assert_eq!(pacer.ticks(), 3);
        assert_eq!(clock.sleeps(), vec![frame_interval(30); 3]);
    }

    #[tokio::test]
    async fn test_virtual_clock_sleep_until_only_moves_forward() {
        let clock = VirtualClock::default();
        let start = clock.now();
        clock.sleep_until(start + Duration::from_millis(40)).await;
        assert_eq!(clock.elapsed(), Duration::from_millis(40));

        // A deadline already behind the clock leaves it where it is.
        clock.sleep_until(start + Duration::from_millis(10)).await;
        assert_eq!(clock.now() - start, Duration::from_millis(40));

        clock.sleep(Duration::from_millis(5)).await;
        assert_eq!(clock.now() - start, Duration::from_millis(45));
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(5)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_sleep_until_deadline() {
        let start = TokioClock.now();
        TokioClock.sleep_until(start + Duration::from_millis(100)).await;
        assert!(TokioClock.now() >= start + Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_sleeps_on_paused_timer() {
        let start = tokio::time::Instant::now();
        TokioClock.sleep(Duration::from_millis(250)).await;
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[test]
    fn test_virtual_clock_date_is_pinned() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        assert_eq!(VirtualClock::new(date).today(), date);
    }
}
