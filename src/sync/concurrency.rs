//! Adaptive concurrency control for image enrichment.
//!
//! One controller instance is owned by a run and shared by reference across
//! that run's enrichment tasks: a bounded integer limit that drifts up on
//! success and down on overload, plus a sliding-window circuit breaker that
//! suspends image fetching entirely for a cooldown once the dependency looks
//! saturated. Reopening is purely time-based; there is no half-open probe.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::infrastructure::config::ImageConfig;

/// Time source, injectable so breaker behavior is deterministic in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock time.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Shared mutable concurrency/breaker state for one run.
///
/// The limit uses an atomic with bounded `fetch_update`; the error window and
/// breaker state sit behind short-lived std mutexes (mutations happen only at
/// I/O completion points, contention is negligible).
pub struct AdaptiveConcurrencyController {
    limit: AtomicUsize,
    floor: usize,
    ceiling: usize,
    nudge_probability: f64,

    window: Mutex<VecDeque<Instant>>,
    window_duration: Duration,
    window_cap: usize,
    sample_size: usize,
    trip_threshold: usize,
    cooldown: Duration,
    open_until: Mutex<Option<Instant>>,

    clock: Box<dyn Clock>,
}

impl AdaptiveConcurrencyController {
    pub fn new(config: &ImageConfig) -> Self {
        Self::with_clock(config, Box::new(SystemClock))
    }

    pub fn with_clock(config: &ImageConfig, clock: Box<dyn Clock>) -> Self {
        let floor = config.concurrency_min.max(1);
        let ceiling = config.concurrency_max.max(floor);
        let initial = config.concurrency_initial.clamp(floor, ceiling);
        Self {
            limit: AtomicUsize::new(initial),
            floor,
            ceiling,
            nudge_probability: config.nudge_probability,
            window: Mutex::new(VecDeque::new()),
            window_duration: Duration::from_millis(config.breaker_window_ms),
            window_cap: WINDOW_CAP,
            sample_size: config.breaker_sample_size,
            trip_threshold: config.breaker_trip_threshold,
            cooldown: Duration::from_millis(config.breaker_cooldown_ms),
            open_until: Mutex::new(None),
            clock,
        }
    }

    /// Current dispatch limit, re-read before every task dispatch.
    pub fn current_limit(&self) -> usize {
        self.limit.load(Ordering::SeqCst)
    }

    /// Successful fetch: with small fixed probability nudge the limit up by
    /// one, bounded by the ceiling. Suppressed while the breaker is open.
    pub fn record_success(&self) {
        if self.is_open() {
            return;
        }
        if fastrand::f64() < self.nudge_probability {
            let previous = self
                .limit
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |limit| {
                    (limit < self.ceiling).then_some(limit + 1)
                });
            if let Ok(previous) = previous {
                debug!(limit = previous + 1, "Raising image concurrency");
            }
        }
    }

    /// Overload signal (timeout or overload status): record it in the
    /// sliding window and nudge the limit down by one, bounded by the floor.
    pub fn record_overload(&self) {
        let now = self.clock.now();
        {
            let mut window = lock_recovering(&self.window);
            window.push_back(now);
            while window
                .front()
                .is_some_and(|t| now.duration_since(*t) > self.window_duration)
            {
                window.pop_front();
            }
            while window.len() > self.window_cap {
                window.pop_front();
            }
        }
        let previous = self
            .limit
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |limit| {
                (limit > self.floor).then_some(limit - 1)
            });
        if let Ok(previous) = previous {
            warn!(limit = previous - 1, "Reducing image concurrency after overload signal");
        }
    }

    /// Whether the most recent sample of the window crosses the trip
    /// threshold. Evaluated after a record exhausts its retries on overload.
    pub fn should_trip(&self) -> bool {
        let window = lock_recovering(&self.window);
        let sampled = window.len().min(self.sample_size);
        sampled >= self.trip_threshold
    }

    /// Open the breaker for the configured cooldown.
    pub fn trip(&self) {
        let until = self.clock.now() + self.cooldown;
        *lock_recovering(&self.open_until) = Some(until);
        warn!(cooldown_ms = self.cooldown.as_millis() as u64, "Image circuit breaker opened");
    }

    /// True while the cooldown has not elapsed. After it elapses the breaker
    /// is implicitly closed again.
    pub fn is_open(&self) -> bool {
        let open_until = lock_recovering(&self.open_until);
        open_until.is_some_and(|until| self.clock.now() < until)
    }

    /// Overload signals currently retained in the window (diagnostics).
    pub fn window_len(&self) -> usize {
        lock_recovering(&self.window).len()
    }
}

/// Absolute cap on retained overload timestamps, independent of the window
/// duration.
pub const WINDOW_CAP: usize = 200;

/// Lock, recovering from poisoning; the guarded state is plain counters.
fn lock_recovering<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
