//! Injected time source and trailing-debounce timers.
//!
//! Sessions never read the wall clock directly: every timer decision goes
//! through a [`Clock`], so tests drive time with [`ManualClock`] instead of
//! sleeping. A [`Debouncer`] is a passive deadline: it only fires when
//! polled.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Millisecond time source.
pub trait Clock: Send + Sync {
    /// Milliseconds elapsed since a fixed, clock-specific origin.
    fn now_ms(&self) -> u64;
}

/// Monotonic wall clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Hand-driven clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self { now: AtomicU64::new(start_ms) }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Trailing debounce: every `touch` pushes the deadline to `now + window`.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window_ms: u64,
    deadline: Option<u64>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window_ms: window.as_millis() as u64,
            deadline: None,
        }
    }

    /// Arm or re-arm the timer.
    pub fn touch(&mut self, now: u64) {
        self.deadline = Some(now.saturating_add(self.window_ms));
    }

    /// Returns `true` exactly once when the deadline has passed, disarming the timer.
    pub fn poll(&mut self, now: u64) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Disarm without firing. Returns whether work was pending.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    /// Take the pending deadline so the caller can do the work now instead
    /// of waiting for it (teardown path). `None` when nothing was armed.
    pub fn flush(&mut self) -> Option<u64> {
        self.deadline.take()
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<u64> {
        self.deadline
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(100);
        assert_eq!(clock.now_ms(), 100);
        clock.advance(50);
        assert_eq!(clock.now_ms(), 150);
        clock.set(10);
        assert_eq!(clock.now_ms(), 10);
    }

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }

    #[test]
    fn test_debouncer_trailing_edge() {
        let mut d = Debouncer::new(Duration::from_millis(50));
        d.touch(0);
        d.touch(10);
        d.touch(20);
        assert_eq!(d.deadline(), Some(70));
        assert!(!d.poll(69));
        assert!(d.poll(70));
        // fires once
        assert!(!d.poll(71));
        assert!(!d.is_pending());
    }

    #[test]
    fn test_debouncer_cancel_and_flush() {
        let mut d = Debouncer::new(Duration::from_millis(5000));
        assert_eq!(d.flush(), None);
        assert!(!d.cancel());

        d.touch(0);
        assert!(d.cancel());
        assert!(!d.poll(10_000));

        // flush hands back the deadline it pre-empted
        d.touch(1000);
        d.touch(1200);
        assert_eq!(d.flush(), Some(6200));
        assert!(!d.is_pending());
        assert_eq!(d.flush(), None);
    }
}
