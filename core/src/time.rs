//! Monotonic frame timing.
//!
//! [`Timer`] reports per-call delta time and total elapsed time in seconds.
//! The time source is pluggable through the [`Clock`] trait so frame loops can
//! be driven deterministically in tests and simulations:
//!
//! | Clock | Source |
//! |-------|--------|
//! | [`SystemClock`] | `std::time::Instant` |
//! | [`ManualClock`] | Advanced explicitly by the caller |
//!
//! # Example
//!
//! ```ignore
//! use tempograph_core::time::{ManualClock, Timer};
//!
//! let clock = ManualClock::new();
//! let mut timer = Timer::with_clock(clock.clone());
//! clock.advance_secs(0.016);
//! assert!((timer.delta_time() - 0.016).abs() < 1e-9);
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A monotonic time source.
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary, fixed origin.
    fn now(&self) -> Duration;
}

/// Wall clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same underlying time, so one handle can be given to a
/// [`Timer`] while another drives it.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    /// Move the clock forward by `seconds`. Negative values are ignored.
    pub fn advance_secs(&self, seconds: f64) {
        if seconds > 0.0 {
            self.advance(Duration::from_secs_f64(seconds));
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Relaxed))
    }
}

/// Frame timer producing delta and elapsed time in seconds.
pub struct Timer {
    clock: Box<dyn Clock>,
    start: Duration,
    last: Duration,
}

impl Timer {
    /// Create a timer on the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock::new())
    }

    /// Create a timer on a custom clock.
    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        let now = clock.now();
        Self {
            clock: Box::new(clock),
            start: now,
            last: now,
        }
    }

    /// Seconds since the previous call (or since creation/reset on the first call).
    pub fn delta_time(&mut self) -> f64 {
        let now = self.clock.now();
        let delta = now.saturating_sub(self.last);
        self.last = now;
        delta.as_secs_f64()
    }

    /// Seconds since creation or the last [`reset`](Self::reset).
    pub fn elapsed_time(&self) -> f64 {
        self.clock.now().saturating_sub(self.start).as_secs_f64()
    }

    /// Restart both delta and elapsed measurement from now.
    pub fn reset(&mut self) {
        let now = self.clock.now();
        self.start = now;
        self.last = now;
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("elapsed", &self.elapsed_time())
            .finish_non_exhaustive()
    }
}
