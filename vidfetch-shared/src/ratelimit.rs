/// Fixed-window rate limiting
///
/// Transport-agnostic core of the per-client rate limiter. The HTTP layer
/// resolves the client address and calls [`RateLimiter::check`]; this module
/// owns the window map and the counting rules.
///
/// # Algorithm
///
/// Fixed-window counter keyed by client IP:
/// - No entry, or `now - window_start >= window`: reset to `{count: 1, window_start: now}`, allow
/// - Otherwise increment the count; reject once it exceeds `max_requests`
///
/// Rejected requests are still counted, so a client hammering the endpoint
/// does not get a fresh allowance until the window itself expires.
///
/// # Concurrency
///
/// Windows live in a [`DashMap`]. The read-compare-increment sequence runs
/// while holding the entry's shard lock, so two concurrent requests from the
/// same client can never both observe a count below the threshold.
///
/// # Example
///
/// ```
/// use std::net::IpAddr;
/// use std::time::Duration;
/// use vidfetch_shared::ratelimit::RateLimiter;
///
/// let limiter = RateLimiter::new(2, Duration::from_secs(60));
/// let client: IpAddr = "203.0.113.7".parse().unwrap();
///
/// assert!(limiter.check(client).allowed);
/// assert!(limiter.check(client).allowed);
/// assert!(!limiter.check(client).allowed);
/// ```

use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Source of monotonic time for the limiter
///
/// Injected so tests can drive window expiry deterministically.
pub trait Clock: Send + Sync + 'static {
    /// Returns the current instant
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock
///
/// Starts at the instant it was created and only moves when
/// [`ManualClock::advance`] is called.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Creates a clock frozen at the current instant
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Moves the clock forward
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        self.origin + offset
    }
}

/// Counter state for one client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    /// Requests seen in the current window (including rejected ones)
    pub count: u32,

    /// When the current window opened
    pub window_start: Instant,
}

/// Outcome of a single rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    /// Whether the request may proceed
    pub allowed: bool,

    /// Configured threshold per window
    pub limit: u32,

    /// Requests left in the current window
    pub remaining: u32,

    /// Time until the current window closes
    pub reset_after: Duration,
}

impl RateDecision {
    /// Seconds a rejected client should wait, rounded up
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.reset_after.as_secs();
        if self.reset_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }
}

/// In-memory per-IP fixed-window rate limiter
///
/// Cheap to clone; all clones share the same window map.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<RateLimiterInner>,
}

struct RateLimiterInner {
    max_requests: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
    windows: DashMap<IpAddr, RateWindow>,
}

impl RateLimiter {
    /// Creates a limiter using the system clock
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self::with_clock(max_requests, window, Arc::new(SystemClock))
    }

    /// Creates a limiter with an explicit clock
    pub fn with_clock(max_requests: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(RateLimiterInner {
                max_requests,
                window,
                clock,
                windows: DashMap::new(),
            }),
        }
    }

    /// Configured threshold per window
    pub fn max_requests(&self) -> u32 {
        self.inner.max_requests
    }

    /// Configured window length
    pub fn window(&self) -> Duration {
        self.inner.window
    }

    /// Records a request from `client` and decides whether it may proceed
    pub fn check(&self, client: IpAddr) -> RateDecision {
        let now = self.inner.clock.now();
        let window = self.inner.window;

        let mut entry = self.inner.windows.entry(client).or_insert(RateWindow {
            count: 0,
            window_start: now,
        });
        let state = entry.value_mut();

        if state.count == 0 || now.saturating_duration_since(state.window_start) >= window {
            state.count = 1;
            state.window_start = now;
        } else {
            state.count = state.count.saturating_add(1);
        }

        let elapsed = now.saturating_duration_since(state.window_start);
        RateDecision {
            allowed: state.count <= self.inner.max_requests,
            limit: self.inner.max_requests,
            remaining: self.inner.max_requests.saturating_sub(state.count),
            reset_after: window.saturating_sub(elapsed),
        }
    }

    /// Current window for `client`, if one is tracked
    pub fn window_for(&self, client: IpAddr) -> Option<RateWindow> {
        self.inner.windows.get(&client).map(|entry| *entry.value())
    }

    /// Number of clients currently tracked
    pub fn tracked_clients(&self) -> usize {
        self.inner.windows.len()
    }

    /// Drops windows that have expired
    ///
    /// Returns the number of entries removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.inner.clock.now();
        let window = self.inner.window;
        let before = self.inner.windows.len();

        self.inner
            .windows
            .retain(|_, state| now.saturating_duration_since(state.window_start) < window);

        before.saturating_sub(self.inner.windows.len())
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max_requests", &self.inner.max_requests)
            .field("window", &self.inner.window)
            .field("tracked_clients", &self.inner.windows.len())
            .finish()
    }
}
