//! Admission control for outbound scraper calls
//!
//! One `RateLimiter` is constructed per run and shared by every worker. The
//! required delay for a call is the maximum of the independent checks (global
//! and per-source sliding windows, minimum spacing, failure backoff, token
//! refill); a blocked `acquire` sleeps without the lock and re-evaluates in a
//! bounded loop.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::config::{RateLimitConfig, SourceLimits};
use super::stats::{RateLimiterSnapshot, SourceUsage, WindowUsage};

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

const BACKOFF_BASE: Duration = Duration::from_secs(5);
const BACKOFF_CAP: Duration = Duration::from_secs(300);
const BACKOFF_JITTER: f64 = 0.25;
const BACKOFF_MAX_DOUBLINGS: u32 = 6;

#[derive(Debug, Default)]
struct SourceState {
    /// Completed-call timestamps, oldest first, pruned to the trailing hour
    window: VecDeque<Instant>,

    /// Token bucket level; meaningful only for sources with configured limits
    tokens: f64,
    last_refill: Option<Instant>,

    last_request: Option<Instant>,

    consecutive_failures: u32,
    backoff_until: Option<Instant>,
}

impl SourceState {
    fn refill(&mut self, now: Instant, limits: &SourceLimits) {
        // A zero burst would deadlock the bucket, so floor the capacity at one.
        let burst = f64::from(limits.burst_size).max(1.0);
        match self.last_refill {
            None => self.tokens = burst,
            Some(previous) => {
                let rate = f64::from(limits.requests_per_minute) / 60.0;
                let elapsed = now.duration_since(previous).as_secs_f64();
                self.tokens = (self.tokens + elapsed * rate).min(burst);
            }
        }
        self.last_refill = Some(now);
    }

    fn in_backoff(&self, now: Instant) -> bool {
        self.backoff_until.is_some_and(|until| until > now)
    }
}

struct LimiterInner {
    /// Completed calls across all sources, oldest first
    global_window: VecDeque<(Instant, String)>,
    sources: HashMap<String, SourceState>,
}

impl LimiterInner {
    fn prune(&mut self, now: Instant) {
        while self
            .global_window
            .front()
            .is_some_and(|(t, _)| now.duration_since(*t) >= HOUR)
        {
            self.global_window.pop_front();
        }
        for state in self.sources.values_mut() {
            while state.window.front().is_some_and(|t| now.duration_since(*t) >= HOUR) {
                state.window.pop_front();
            }
        }
    }
}

/// Gates outbound calls per source and globally.
///
/// `acquire`/`try_acquire` admit a call; `release` must follow exactly once
/// per admitted call regardless of its outcome and records the call into the
/// sliding windows. Task outcomes feed the backoff tracker through
/// `record_success`/`record_failure`.
pub struct RateLimiter {
    config: RateLimitConfig,
    inner: Mutex<LimiterInner>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(LimiterInner {
                global_window: VecDeque::new(),
                sources: HashMap::new(),
            }),
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Block until a call to `source` is admitted.
    ///
    /// Sleeps are taken with the lock released, and the admission conditions
    /// are re-evaluated after every sleep in an explicit loop so call-stack
    /// depth stays bounded under sustained contention.
    pub async fn acquire(&self, source: &str) {
        if !self.config.enabled {
            return;
        }
        loop {
            match self.admission(source).await {
                None => {
                    debug!(source, "rate-limit permit acquired");
                    return;
                }
                Some(delay) => {
                    debug!(source, delay_ms = delay.as_millis() as u64, "throttled, waiting");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Admit a call only if no delay is required; no side effects otherwise.
    pub async fn try_acquire(&self, source: &str) -> bool {
        if !self.config.enabled {
            return true;
        }
        self.admission(source).await.is_none()
    }

    /// Record a completed call. Must be called exactly once per admitted
    /// acquire, whatever the call's outcome.
    pub async fn release(&self, source: &str) {
        if !self.config.enabled {
            return;
        }
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        inner.global_window.push_back((now, source.to_string()));
        let tracked = self.config.source_limits.contains_key(source);
        let state = inner.sources.entry(source.to_string()).or_default();
        if tracked {
            state.window.push_back(now);
        }
        state.last_request = Some(now);
    }

    /// Start (or extend) the source's exponential backoff window.
    pub async fn record_failure(&self, source: &str) {
        if !self.config.enabled {
            return;
        }
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let state = inner.sources.entry(source.to_string()).or_default();
        state.consecutive_failures += 1;

        let doublings = state.consecutive_failures.saturating_sub(1).min(BACKOFF_MAX_DOUBLINGS);
        let base = BACKOFF_BASE.as_secs_f64() * f64::from(2u32.pow(doublings));
        let jitter = 1.0 + rand::rng().random_range(0.0..BACKOFF_JITTER);
        let secs = (base * jitter).min(BACKOFF_CAP.as_secs_f64());
        state.backoff_until = Some(now + Duration::from_secs_f64(secs));

        warn!(
            source,
            failures = state.consecutive_failures,
            backoff_secs = secs,
            "source backing off after failure"
        );
    }

    /// Clear the source's failure streak and any active backoff.
    pub async fn record_success(&self, source: &str) {
        if !self.config.enabled {
            return;
        }
        let mut inner = self.inner.lock().await;
        if let Some(state) = inner.sources.get_mut(source) {
            state.consecutive_failures = 0;
            state.backoff_until = None;
        }
    }

    /// Compute the required delay; on zero delay, consume a token and admit.
    async fn admission(&self, source: &str) -> Option<Duration> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        inner.prune(now);

        let global = &self.config.global_limits;
        let mut delay = sliding_delay(&inner.global_window, |(t, _)| *t, now, MINUTE, global.requests_per_minute);
        delay = delay.max(sliding_delay(
            &inner.global_window,
            |(t, _)| *t,
            now,
            HOUR,
            global.requests_per_hour,
        ));

        let limits = self.config.source_limits.get(source);
        let state = inner.sources.entry(source.to_string()).or_default();

        if let Some(limits) = limits {
            delay = delay.max(sliding_delay(&state.window, |t| *t, now, MINUTE, limits.requests_per_minute));
            delay = delay.max(sliding_delay(&state.window, |t| *t, now, HOUR, limits.requests_per_hour));

            if let Some(last) = state.last_request {
                let spacing = Duration::from_secs_f64(limits.min_delay_seconds.max(0.0));
                let since = now.duration_since(last);
                if since < spacing {
                    delay = delay.max(spacing - since);
                }
            }

            state.refill(now, limits);
            if state.tokens < 1.0 {
                let rate = f64::from(limits.requests_per_minute) / 60.0;
                if rate > 0.0 {
                    delay = delay.max(Duration::from_secs_f64((1.0 - state.tokens) / rate));
                }
            }
        }

        if let Some(until) = state.backoff_until {
            if until > now {
                delay = delay.max(until.duration_since(now));
            } else {
                state.backoff_until = None;
            }
        }

        if delay == Duration::ZERO {
            if limits.is_some() {
                state.tokens = (state.tokens - 1.0).max(0.0);
            }
            None
        } else {
            Some(delay)
        }
    }

    /// Current usage vs configured limits, globally and per configured source.
    pub async fn snapshot(&self) -> RateLimiterSnapshot {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        inner.prune(now);

        let global = &self.config.global_limits;
        let global_usage = WindowUsage {
            last_minute: count_within(&inner.global_window, |(t, _)| *t, now, MINUTE),
            per_minute_limit: global.requests_per_minute,
            last_hour: inner.global_window.len(),
            per_hour_limit: global.requests_per_hour,
        };

        let sources = self
            .config
            .source_limits
            .iter()
            .map(|(name, limits)| {
                let state = inner.sources.get(name);
                let usage = SourceUsage {
                    window: WindowUsage {
                        last_minute: state
                            .map(|s| count_within(&s.window, |t| *t, now, MINUTE))
                            .unwrap_or(0),
                        per_minute_limit: limits.requests_per_minute,
                        last_hour: state.map(|s| s.window.len()).unwrap_or(0),
                        per_hour_limit: limits.requests_per_hour,
                    },
                    tokens: state
                        .and_then(|s| s.last_refill.map(|_| s.tokens))
                        .unwrap_or_else(|| f64::from(limits.burst_size)),
                    burst_size: limits.burst_size,
                    in_backoff: state.is_some_and(|s| s.in_backoff(now)),
                };
                (name.clone(), usage)
            })
            .collect();

        RateLimiterSnapshot {
            enabled: self.config.enabled,
            global: global_usage,
            sources,
        }
    }
}

/// Delay until the trailing `window` holds fewer than `limit` entries.
/// `limit` of zero means unlimited.
fn sliding_delay<T>(
    entries: &VecDeque<T>,
    at: impl Fn(&T) -> Instant,
    now: Instant,
    window: Duration,
    limit: u32,
) -> Duration {
    if limit == 0 {
        return Duration::ZERO;
    }
    let start = entries
        .iter()
        .position(|e| now.duration_since(at(e)) < window)
        .unwrap_or(entries.len());
    let in_window = entries.len() - start;
    if in_window < limit as usize {
        return Duration::ZERO;
    }
    // Wait until enough old entries age out to bring the count back under
    // the limit.
    let blocking = at(&entries[start + (in_window - limit as usize)]);
    window.saturating_sub(now.duration_since(blocking))
}

fn count_within<T>(entries: &VecDeque<T>, at: impl Fn(&T) -> Instant, now: Instant, window: Duration) -> usize {
    entries.iter().filter(|e| now.duration_since(at(*e)) < window).count()
}
