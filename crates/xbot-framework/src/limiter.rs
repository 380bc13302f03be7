//! Sliding-window rate limiters.
//!
//! Matchers consult a [`Limiter`] after their rule and filters passed. The
//! limiter key is derived from the sender: `limiter:group:{g}:user:{u}` inside
//! a group, `limiter:user:{u}` elsewhere (see [`limiter_key`]).
//!
//! Two implementations ship with the framework:
//!
//! - [`MemoryLimiter`] keeps timestamps in process and sweeps idle keys on a
//!   background task.
//! - [`SlidingWindowLimiter`] delegates to a [`WindowStore`], typically an
//!   external key-value store shared between processes. Store failures admit
//!   the request.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, trace, warn};

use crate::error::LimiterError;

/// Default interval between sweeps of idle [`MemoryLimiter`] keys.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Builds the limiter key for a sender.
pub fn limiter_key(user_id: Option<i64>, group_id: Option<i64>) -> String {
    let user_id = user_id.unwrap_or_default();
    match group_id {
        Some(group_id) if group_id != 0 => format!("limiter:group:{group_id}:user:{user_id}"),
        _ => format!("limiter:user:{user_id}"),
    }
}

/// Admission control for matchers.
pub trait Limiter: Send + Sync {
    /// Records a request under `key` and returns whether it is admitted.
    fn allow(&self, key: &str) -> bool;

    /// Forgets all requests recorded under `key`.
    fn reset(&self, key: &str) -> Result<(), LimiterError>;

    /// Requests still admissible under `key` in the current window.
    fn remaining(&self, key: &str) -> usize;
}

// ============================================================================
// MemoryLimiter
// ============================================================================

#[derive(Debug)]
struct WindowLog {
    window: Duration,
    max: usize,
    records: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl WindowLog {
    fn window_start(&self, now: Instant) -> Option<Instant> {
        now.checked_sub(self.window)
    }

    fn prune(records: &mut VecDeque<Instant>, start: Option<Instant>) {
        if let Some(start) = start {
            while records.front().is_some_and(|t| *t <= start) {
                records.pop_front();
            }
        }
    }

    fn sweep(&self) {
        let start = self.window_start(Instant::now());
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, log| {
            Self::prune(log, start);
            !log.is_empty()
        });
        trace!(removed = before - records.len(), "limiter sweep");
    }
}

/// In-process sliding-window limiter.
///
/// Admits at most `max` requests per key within any `window`. A background
/// task drops keys with no requests in the current window every
/// [`DEFAULT_SWEEP_INTERVAL`]; the task ends when the limiter is dropped.
/// Limiters built outside a Tokio runtime start that task on their first
/// [`allow`](Limiter::allow) inside one.
pub struct MemoryLimiter {
    log: Arc<WindowLog>,
    sweep_interval: Duration,
    sweeper: OnceLock<DropGuard>,
}

impl MemoryLimiter {
    pub fn new(window: Duration, max: usize) -> Self {
        Self::with_sweep_interval(window, max, DEFAULT_SWEEP_INTERVAL)
    }

    pub fn with_sweep_interval(window: Duration, max: usize, sweep_interval: Duration) -> Self {
        let limiter = Self {
            log: Arc::new(WindowLog {
                window,
                max,
                records: Mutex::new(HashMap::new()),
            }),
            sweep_interval,
            sweeper: OnceLock::new(),
        };
        limiter.ensure_sweeper();
        if limiter.sweeper.get().is_none() && !sweep_interval.is_zero() {
            debug!("no tokio runtime yet, limiter sweeper starts on first use");
        }
        limiter
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.log.records.lock().len()
    }

    /// Drops keys without requests in the current window.
    pub fn sweep(&self) {
        self.log.sweep();
    }

    fn ensure_sweeper(&self) {
        if self.sweeper.get().is_some() || self.sweep_interval.is_zero() {
            return;
        }
        if let Some(guard) = spawn_sweeper(Arc::downgrade(&self.log), self.sweep_interval) {
            // a racing caller won; dropping our guard stops the duplicate task
            let _ = self.sweeper.set(guard);
        }
    }
}

fn spawn_sweeper(log: Weak<WindowLog>, every: Duration) -> Option<DropGuard> {
    let handle = tokio::runtime::Handle::try_current().ok()?;

    let token = CancellationToken::new();
    let cancelled = token.clone();
    handle.spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancelled.cancelled() => break,
                _ = ticker.tick() => match log.upgrade() {
                    Some(log) => log.sweep(),
                    None => break,
                },
            }
        }
    });

    Some(token.drop_guard())
}

impl Limiter for MemoryLimiter {
    fn allow(&self, key: &str) -> bool {
        self.ensure_sweeper();
        let now = Instant::now();
        let start = self.log.window_start(now);
        let mut records = self.log.records.lock();
        let log = records.entry(key.to_string()).or_default();

        WindowLog::prune(log, start);
        if log.len() >= self.log.max {
            return false;
        }
        log.push_back(now);
        true
    }

    fn reset(&self, key: &str) -> Result<(), LimiterError> {
        self.log.records.lock().remove(key);
        Ok(())
    }

    fn remaining(&self, key: &str) -> usize {
        let start = self.log.window_start(Instant::now());
        let mut records = self.log.records.lock();
        let used = match records.get_mut(key) {
            Some(log) => {
                WindowLog::prune(log, start);
                log.len()
            }
            None => 0,
        };
        self.log.max.saturating_sub(used)
    }
}

impl fmt::Debug for MemoryLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryLimiter")
            .field("window", &self.log.window)
            .field("max", &self.log.max)
            .field("sweeping", &self.sweeper.get().is_some())
            .finish()
    }
}

// ============================================================================
// SlidingWindowLimiter
// ============================================================================

/// Storage backend for [`SlidingWindowLimiter`].
///
/// Implementations must make [`admit`](Self::admit) atomic per key: expire
/// entries older than `window`, compare the count with `max`, and record the
/// new request only when admitted. Calls happen on the dispatch path and
/// should return quickly.
pub trait WindowStore: Send + Sync {
    fn admit(&self, key: &str, window: Duration, max: usize) -> Result<bool, LimiterError>;

    /// Entries recorded under `key` within the last `window`.
    fn count(&self, key: &str, window: Duration) -> Result<usize, LimiterError>;

    fn clear(&self, key: &str) -> Result<(), LimiterError>;
}

/// Sliding-window limiter over a pluggable [`WindowStore`].
///
/// Store errors never block traffic: [`allow`](Limiter::allow) admits and
/// [`remaining`](Limiter::remaining) reports the full budget, both logging a
/// warning.
pub struct SlidingWindowLimiter<S> {
    store: S,
    window: Duration,
    max: usize,
}

impl<S: WindowStore> SlidingWindowLimiter<S> {
    pub fn new(store: S, window: Duration, max: usize) -> Self {
        Self { store, window, max }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: WindowStore> Limiter for SlidingWindowLimiter<S> {
    fn allow(&self, key: &str) -> bool {
        match self.store.admit(key, self.window, self.max) {
            Ok(admitted) => admitted,
            Err(err) => {
                warn!(key, error = %err, "limiter store failed, admitting request");
                true
            }
        }
    }

    fn reset(&self, key: &str) -> Result<(), LimiterError> {
        self.store.clear(key)
    }

    fn remaining(&self, key: &str) -> usize {
        match self.store.count(key, self.window) {
            Ok(used) => self.max.saturating_sub(used),
            Err(err) => {
                warn!(key, error = %err, "limiter store failed, reporting full budget");
                self.max
            }
        }
    }
}

impl<S> fmt::Debug for SlidingWindowLimiter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlidingWindowLimiter")
            .field("window", &self.window)
            .field("max", &self.max)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;

    #[test]
    fn test_limiter_key() {
        assert_eq!(limiter_key(Some(1), Some(2)), "limiter:group:2:user:1");
        assert_eq!(limiter_key(Some(1), None), "limiter:user:1");
        assert_eq!(limiter_key(Some(1), Some(0)), "limiter:user:1");
        assert_eq!(limiter_key(None, None), "limiter:user:0");
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_limiter_window_slides() {
        let limiter = MemoryLimiter::new(Duration::from_secs(10), 2);

        assert!(limiter.allow("k"));
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));
        assert_eq!(limiter.remaining("k"), 0);

        // first request leaves the window
        tokio::time::advance(Duration::from_secs(7)).await;
        assert_eq!(limiter.remaining("k"), 1);
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));

        // other keys are independent
        assert!(limiter.allow("other"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_limiter_reset() {
        let limiter = MemoryLimiter::new(Duration::from_secs(60), 1);
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));
        limiter.reset("k").unwrap();
        assert!(limiter.allow("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_drops_idle_keys() {
        let limiter =
            MemoryLimiter::with_sweep_interval(Duration::from_secs(5), 3, Duration::from_secs(30));
        limiter.allow("a");
        limiter.allow("b");
        assert_eq!(limiter.tracked_keys(), 2);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn test_memory_limiter_without_runtime() {
        let limiter = MemoryLimiter::new(Duration::from_secs(60), 1);
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));
        limiter.sweep();
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn test_sweeper_starts_on_first_use_inside_runtime() {
        let limiter =
            MemoryLimiter::with_sweep_interval(Duration::from_secs(5), 3, Duration::from_secs(30));
        assert!(limiter.sweeper.get().is_none());

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();
        rt.block_on(async {
            assert!(limiter.allow("a"));
            assert!(limiter.sweeper.get().is_some());
            assert_eq!(limiter.tracked_keys(), 1);

            tokio::time::sleep(Duration::from_secs(31)).await;
            assert_eq!(limiter.tracked_keys(), 0);
        });
    }

    struct BrokenStore;

    impl WindowStore for BrokenStore {
        fn admit(&self, _: &str, _: Duration, _: usize) -> Result<bool, LimiterError> {
            Err(LimiterError::store("connection refused"))
        }

        fn count(&self, _: &str, _: Duration) -> Result<usize, LimiterError> {
            Err(LimiterError::store("connection refused"))
        }

        fn clear(&self, _: &str) -> Result<(), LimiterError> {
            Err(LimiterError::store("connection refused"))
        }
    }

    #[derive(Default)]
    struct VecStore {
        entries: Mutex<HashMap<String, Vec<SystemTime>>>,
    }

    impl WindowStore for VecStore {
        fn admit(&self, key: &str, window: Duration, max: usize) -> Result<bool, LimiterError> {
            let now = SystemTime::now();
            let mut entries = self.entries.lock();
            let log = entries.entry(key.to_string()).or_default();
            log.retain(|t| now.duration_since(*t).map_or(true, |age| age < window));
            if log.len() >= max {
                return Ok(false);
            }
            log.push(now);
            Ok(true)
        }

        fn count(&self, key: &str, _: Duration) -> Result<usize, LimiterError> {
            Ok(self.entries.lock().get(key).map_or(0, Vec::len))
        }

        fn clear(&self, key: &str) -> Result<(), LimiterError> {
            self.entries.lock().remove(key);
            Ok(())
        }
    }

    #[test]
    fn test_sliding_window_fails_open() {
        let limiter = SlidingWindowLimiter::new(BrokenStore, Duration::from_secs(1), 1);
        assert!(limiter.allow("k"));
        assert!(limiter.allow("k"));
        assert_eq!(limiter.remaining("k"), 1);
        assert!(limiter.reset("k").is_err());
    }

    #[test]
    fn test_sliding_window_uses_store() {
        let limiter = SlidingWindowLimiter::new(VecStore::default(), Duration::from_secs(3600), 2);
        assert!(limiter.allow("k"));
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));
        assert_eq!(limiter.remaining("k"), 0);

        limiter.reset("k").unwrap();
        assert_eq!(limiter.remaining("k"), 2);
    }
}
