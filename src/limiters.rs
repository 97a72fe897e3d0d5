use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;

use crate::context::CallContext;
use crate::error::Error;

/// Bounds the number of in-flight requests of one client.
///
/// Slots are tracked separately from the semaphore so that [`release`]
/// without a matching [`acquire`] is a no-op instead of inflating capacity.
///
/// [`acquire`]: ConcurrencyLimiter::acquire
/// [`release`]: ConcurrencyLimiter::release
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    semaphore: Option<Arc<Semaphore>>,
    limit: usize,
    in_flight: AtomicUsize,
}

impl ConcurrencyLimiter {
    /// `max_in_flight <= 0` disables the limit.
    pub fn new(max_in_flight: i64) -> Self {
        let limit = usize::try_from(max_in_flight).unwrap_or(0);
        Self {
            semaphore: (limit > 0).then(|| Arc::new(Semaphore::new(limit))),
            limit,
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.semaphore.is_none()
    }

    pub fn limit(&self) -> Option<usize> {
        self.semaphore.as_ref().map(|_| self.limit)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn acquire(&self, context: &CallContext) -> Result<(), Error> {
        let Some(semaphore) = &self.semaphore else {
            return Ok(());
        };
        let permit = context
            .run(semaphore.acquire())
            .await?
            .map_err(|_| Error::ConcurrencyLimitClosed)?;
        permit.forget();
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    pub fn try_acquire(&self) -> bool {
        let Some(semaphore) = &self.semaphore else {
            return true;
        };
        match semaphore.try_acquire() {
            Ok(permit) => {
                permit.forget();
                self.in_flight.fetch_add(1, Ordering::AcqRel);
                true
            }
            Err(_) => false,
        }
    }

    pub fn release(&self) {
        let Some(semaphore) = &self.semaphore else {
            return;
        };
        let released = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(1)
            })
            .is_ok();
        if released {
            semaphore.add_permits(1);
        }
    }

    /// Acquires a slot that is released when the returned guard drops.
    pub async fn acquire_permit(
        &self,
        context: &CallContext,
    ) -> Result<ConcurrencyPermit<'_>, Error> {
        self.acquire(context).await?;
        Ok(ConcurrencyPermit {
            limiter: self,
            released: false,
        })
    }
}

#[derive(Debug)]
pub struct ConcurrencyPermit<'a> {
    limiter: &'a ConcurrencyLimiter,
    released: bool,
}

impl ConcurrencyPermit<'_> {
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.limiter.release();
        }
    }
}

impl Drop for ConcurrencyPermit<'_> {
    fn drop(&mut self) {
        self.release_once();
    }
}
