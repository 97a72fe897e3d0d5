use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::Error;

/// Cancellation scope of one logical call.
///
/// Every suspension point of a call (rate limiter wait, concurrency slot,
/// retry delay, the network exchange itself) runs through [`CallContext::run`],
/// so cancelling the token or passing the deadline aborts whichever of them is
/// currently pending.
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    cancellation: Option<CancellationToken>,
    deadline: Option<(Instant, Duration)>,
}

impl CallContext {
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().timeout(timeout)
    }

    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self::background().cancellation(token)
    }

    /// A timeout too large to represent as an instant leaves the call unbounded.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Instant::now()
            .checked_add(timeout)
            .map(|deadline| (deadline, timeout));
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn is_canceled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|(deadline, _)| deadline.saturating_duration_since(Instant::now()))
    }

    /// Drives `future` to completion unless the context ends first.
    pub async fn run<F>(&self, future: F) -> Result<F::Output, Error>
    where
        F: Future,
    {
        if self.is_canceled() {
            return Err(Error::Canceled);
        }

        let cancelled = async {
            match &self.cancellation {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some((deadline, _)) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            () = cancelled => Err(Error::Canceled),
            () = expired => Err(self.deadline_error()),
            output = future => Ok(output),
        }
    }

    fn deadline_error(&self) -> Error {
        Error::DeadlineExceeded {
            timeout_ms: self
                .deadline
                .map(|(_, timeout)| timeout.as_millis())
                .unwrap_or(0),
        }
    }
}
