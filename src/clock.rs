//! Time source used by the rate limiter and the retry loop.
//!
//! [`SystemClock`] reads the wall clock and sleeps on the tokio timer.
//! [`TestClock`] never sleeps: every requested sleep is recorded and the
//! clock jumps forward by that amount, which makes timing assertions exact.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use futures_util::future::BoxFuture;

use crate::util::lock_unpoisoned;

pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> SystemTime;

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

#[derive(Debug)]
struct TestClockState {
    now: SystemTime,
    sleeps: Vec<Duration>,
}

#[derive(Clone, Debug)]
pub struct TestClock {
    state: Arc<Mutex<TestClockState>>,
}

impl TestClock {
    pub fn new(now: SystemTime) -> Self {
        Self {
            state: Arc::new(Mutex::new(TestClockState {
                now,
                sleeps: Vec::new(),
            })),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut state = lock_unpoisoned(&self.state);
        state.now += duration;
    }

    pub fn set(&self, now: SystemTime) {
        lock_unpoisoned(&self.state).now = now;
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        lock_unpoisoned(&self.state).sleeps.clone()
    }

    pub fn total_slept(&self) -> Duration {
        lock_unpoisoned(&self.state).sleeps.iter().sum()
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000))
    }
}

impl Clock for TestClock {
    fn now(&self) -> SystemTime {
        lock_unpoisoned(&self.state).now
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        {
            let mut state = lock_unpoisoned(&self.state);
            state.sleeps.push(duration);
            state.now += duration;
        }
        Box::pin(std::future::ready(()))
    }
}
