//! Server-driven rate limiting.
//!
//! Two independent brakes share one reader/writer lock:
//!
//! - a *soft* limit, a requests-per-second token bucket (burst 1) installed
//!   from the `X-RateLimit-Limit` response header, and
//! - a *hard* deadline, set when the platform answers `429 Too Many Requests`
//!   and cleared by the next response with any other status.
//!
//! [`RateLimiter::wait`] honours the hard deadline first and then takes one
//! token from the soft bucket.

use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use http::{HeaderMap, StatusCode};
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::context::CallContext;
use crate::error::Error;
use crate::util::{lock_unpoisoned, read_unpoisoned, write_unpoisoned};

pub const RATE_LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";
/// Blackout applied on a 429 whose reset header is missing or unparseable.
pub const DEFAULT_HARD_LIMIT_TIMEOUT: Duration = Duration::from_millis(100);

const SOFT_LIMIT_BURST: f64 = 1.0;

#[derive(Debug)]
struct TokenBucket {
    requests_per_second: f64,
    tokens: f64,
    last_refill_at: SystemTime,
}

impl TokenBucket {
    fn new(requests_per_second: f64, now: SystemTime) -> Self {
        Self {
            requests_per_second,
            tokens: SOFT_LIMIT_BURST,
            last_refill_at: now,
        }
    }

    fn refill(&mut self, now: SystemTime) {
        let Ok(elapsed) = now.duration_since(self.last_refill_at) else {
            return;
        };
        if elapsed.is_zero() {
            return;
        }
        self.last_refill_at = now;
        let replenished = elapsed.as_secs_f64() * self.requests_per_second;
        self.tokens = (self.tokens + replenished).min(SOFT_LIMIT_BURST);
    }

    /// Takes one token, possibly on credit, and returns how long the caller
    /// must wait before the token is really available.
    fn reserve(&mut self, now: SystemTime) -> Duration {
        self.refill(now);
        self.tokens -= 1.0;
        if self.tokens >= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(-self.tokens / self.requests_per_second)
    }

    fn cancel_reservation(&mut self) {
        self.tokens = (self.tokens + 1.0).min(SOFT_LIMIT_BURST);
    }
}

#[derive(Debug)]
struct SoftLimiter {
    limit: u32,
    bucket: Mutex<TokenBucket>,
}

#[derive(Clone, Copy, Debug)]
struct HardLimit {
    reset_at: SystemTime,
    timeout: Duration,
}

#[derive(Debug, Default)]
struct RateLimiterState {
    soft: Option<Arc<SoftLimiter>>,
    hard: Option<HardLimit>,
}

#[derive(Debug)]
pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    state: RwLock<RateLimiterState>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: RwLock::new(RateLimiterState::default()),
        }
    }

    pub fn with_system_clock() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    /// Current soft limit in requests per second, if the server announced one.
    pub fn soft_limit(&self) -> Option<u32> {
        read_unpoisoned(&self.state)
            .soft
            .as_ref()
            .map(|soft| soft.limit)
    }

    /// Resume time of the active hard limit, if any.
    pub fn hard_deadline(&self) -> Option<SystemTime> {
        read_unpoisoned(&self.state).hard.map(|hard| hard.reset_at)
    }

    /// Feeds one response into the limiter.
    pub fn update(&self, status: StatusCode, headers: &HeaderMap) {
        let now = self.clock.now();
        let mut state = write_unpoisoned(&self.state);

        if let Some(limit) = parse_limit_header(headers)
            && state.soft.as_ref().is_none_or(|soft| soft.limit != limit)
        {
            debug!(limit, "installing soft rate limit from response header");
            state.soft = Some(Arc::new(SoftLimiter {
                limit,
                bucket: Mutex::new(TokenBucket::new(f64::from(limit), now)),
            }));
        }

        if status != StatusCode::TOO_MANY_REQUESTS {
            state.hard = None;
            return;
        }

        let hard = match parse_reset_header(headers) {
            Some(reset_at) => HardLimit {
                reset_at,
                timeout: reset_at.duration_since(now).unwrap_or(Duration::ZERO),
            },
            None => {
                warn!(
                    timeout_ms = DEFAULT_HARD_LIMIT_TIMEOUT.as_millis() as u64,
                    "rate limit reset header missing or unparseable; using default timeout"
                );
                HardLimit {
                    reset_at: now + DEFAULT_HARD_LIMIT_TIMEOUT,
                    timeout: DEFAULT_HARD_LIMIT_TIMEOUT,
                }
            }
        };
        debug!(
            timeout_ms = hard.timeout.as_millis() as u64,
            "hard rate limit active"
        );
        state.hard = Some(hard);
    }

    /// Blocks until a request may be sent.
    pub async fn wait(&self, context: &CallContext) -> Result<(), Error> {
        let (hard, soft) = {
            let state = read_unpoisoned(&self.state);
            (state.hard, state.soft.clone())
        };

        if let Some(hard) = hard
            && hard.reset_at > self.clock.now()
        {
            debug!(
                timeout_ms = hard.timeout.as_millis() as u64,
                "waiting for hard rate limit to reset"
            );
            context.run(self.clock.sleep(hard.timeout)).await?;
        }

        let Some(soft) = soft else {
            return Ok(());
        };
        let delay = lock_unpoisoned(&soft.bucket).reserve(self.clock.now());
        if delay.is_zero() {
            return Ok(());
        }
        if let Err(error) = context.run(self.clock.sleep(delay)).await {
            warn!(error = %error, "soft rate limit wait interrupted");
            lock_unpoisoned(&soft.bucket).cancel_reservation();
            return Err(error);
        }
        Ok(())
    }
}

fn parse_limit_header(headers: &HeaderMap) -> Option<u32> {
    let value = headers.get(RATE_LIMIT_HEADER)?.to_str().ok()?.trim();
    match value.parse::<u32>() {
        Ok(limit) if limit > 0 => Some(limit),
        _ => None,
    }
}

/// Parses the reset header as Unix seconds; fractional seconds are accepted.
fn parse_reset_header(headers: &HeaderMap) -> Option<SystemTime> {
    let value = headers.get(RATE_LIMIT_RESET_HEADER)?.to_str().ok()?.trim();
    let seconds = value.parse::<f64>().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    UNIX_EPOCH.checked_add(Duration::try_from_secs_f64(seconds).ok()?)
}
