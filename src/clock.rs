//! Time source for the framers' polling loops.
//!
//! Every wait in the library goes through a [`Clock`], so timeout behaviour is
//! deterministic under test:
//!
//! - [`TokioClock`] - real time via `tokio::time` (the default)
//! - [`ManualClock`] - virtual time; `sleep` advances the clock instantly
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use notecard_link::clock::{Clock, ManualClock};
//!
//! # tokio_test_block_on(async {
//! let clock = ManualClock::new();
//! clock.sleep(Duration::from_millis(250)).await;
//! assert_eq!(clock.now(), Duration::from_millis(250));
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Boxed future returned by [`Clock::sleep`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Injected time source.
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary, fixed origin.
    fn now(&self) -> Duration;

    /// Suspend the caller for `duration`.
    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()>;
}

/// Real time, backed by `tokio::time`.
///
/// Under `#[tokio::test(start_paused = true)]` this clock auto-advances too.
#[derive(Debug, Clone)]
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl TokioClock {
    /// Create a clock whose origin is now.
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Virtual time for tests and simulations.
///
/// `sleep` returns immediately after moving the clock forward, so a polling
/// loop against a silent device runs to its deadline without real delay.
/// Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward.
    pub fn advance(&self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_add(nanos, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Acquire))
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()> {
        self.advance(duration);
        Box::pin(std::future::ready(()))
    }
}

/// A deadline measured against a [`Clock`].
pub(crate) struct Deadline<'a> {
    clock: &'a dyn Clock,
    start: Duration,
    timeout: Duration,
}

impl<'a> Deadline<'a> {
    pub(crate) fn new(clock: &'a dyn Clock, timeout: Duration) -> Self {
        Self {
            clock,
            start: clock.now(),
            timeout,
        }
    }

    /// True once `timeout` has elapsed since the start (or last restart).
    pub(crate) fn expired(&self) -> bool {
        self.clock.now().saturating_sub(self.start) >= self.timeout
    }

    /// Start counting again from now.
    pub(crate) fn restart(&mut self) {
        self.start = self.clock.now();
    }
}
