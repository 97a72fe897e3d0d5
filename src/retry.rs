use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;

use crate::response::Response;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Decides whether a received response should be requested again.
///
/// Only complete HTTP responses reach a predicate; transport failures are
/// returned to the caller without consulting it.
pub trait RetryPredicate: Send + Sync {
    fn should_retry(&self, response: &Response) -> bool;
}

impl<F> RetryPredicate for F
where
    F: Fn(&Response) -> bool + Send + Sync,
{
    fn should_retry(&self, response: &Response) -> bool {
        self(response)
    }
}

/// Retries every response outside 200-299.
#[derive(Clone, Copy, Debug, Default)]
pub struct RetryIfNotSuccess;

impl RetryPredicate for RetryIfNotSuccess {
    fn should_retry(&self, response: &Response) -> bool {
        !response.is_success()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RetryIfTooManyRequests;

impl RetryPredicate for RetryIfTooManyRequests {
    fn should_retry(&self, response: &Response) -> bool {
        response.status() == StatusCode::TOO_MANY_REQUESTS
    }
}

/// Retries every unsuccessful response except `404 Not Found`.
#[derive(Clone, Copy, Debug, Default)]
pub struct RetryOnFailureExcept404;

impl RetryPredicate for RetryOnFailureExcept404 {
    fn should_retry(&self, response: &Response) -> bool {
        !response.is_success() && response.status() != StatusCode::NOT_FOUND
    }
}

#[derive(Clone)]
pub struct RetryOptions {
    max_retries: u32,
    delay_after_retry: Duration,
    should_retry: Arc<dyn RetryPredicate>,
}

impl fmt::Debug for RetryOptions {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RetryOptions")
            .field("max_retries", &self.max_retries)
            .field("delay_after_retry", &self.delay_after_retry)
            .finish_non_exhaustive()
    }
}

impl RetryOptions {
    /// No retries; the first response is final.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            delay_after_retry: DEFAULT_RETRY_DELAY,
            should_retry: Arc::new(RetryIfNotSuccess),
        }
    }

    pub fn standard() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay_after_retry: DEFAULT_RETRY_DELAY,
            should_retry: Arc::new(RetryIfNotSuccess),
        }
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn delay_after_retry(mut self, delay_after_retry: Duration) -> Self {
        self.delay_after_retry = delay_after_retry;
        self
    }

    pub fn should_retry(mut self, predicate: impl RetryPredicate + 'static) -> Self {
        self.should_retry = Arc::new(predicate);
        self
    }

    pub fn should_retry_arc(mut self, predicate: Arc<dyn RetryPredicate>) -> Self {
        self.should_retry = predicate;
        self
    }

    pub fn configured_max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn configured_delay(&self) -> Duration {
        self.delay_after_retry
    }
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self::disabled()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RetryStep {
    Retry { delay: Duration },
    Done,
}

/// Per-call retry bookkeeping; the policy is fixed for the whole call.
#[derive(Debug)]
pub(crate) struct RetryState {
    options: RetryOptions,
    retries: u32,
}

impl RetryState {
    pub(crate) fn new(options: RetryOptions) -> Self {
        Self {
            options,
            retries: 0,
        }
    }

    /// Zero-based index of the attempt currently being made.
    pub(crate) fn attempt(&self) -> u32 {
        self.retries
    }

    pub(crate) fn evaluate(&mut self, response: &Response) -> RetryStep {
        let wants_retry = self.options.should_retry.should_retry(response);
        if !wants_retry || self.retries >= self.options.max_retries {
            return RetryStep::Done;
        }
        self.retries += 1;
        RetryStep::Retry {
            delay: self.options.delay_after_retry,
        }
    }
}
