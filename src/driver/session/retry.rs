// Copyright Rouven Bauer
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::result::Result as StdResult;
use std::time::Duration;

use log::warn;
use mockall_double::double;
use rand::Rng;
use thiserror::Error;

use crate::error_::{DriverError, Result};
use crate::time::Instant;

// imports for docs
#[allow(unused)]
use crate::driver::session::Session;

/// Specifies how to retry a unit of work.
///
/// The driver uses this trait in [`Session::read_transaction()`] and
/// [`Session::write_transaction()`].
///
/// A default implementation is provided through [`ExponentialBackoff`].
pub trait RetryPolicy {
    type Error;

    fn execute<R>(&self, work: impl FnMut() -> Result<R>) -> StdResult<R, Self::Error>;
}

/// [`RetryPolicy`] that retries work with exponential backoff.
///
/// Only failures classified retryable ([`DriverError::is_retryable()`]) are
/// retried. Between attempts, the policy sleeps for the current delay plus a
/// random jitter; each retry multiplies the delay by a constant factor up to
/// a cap. Once the time since the end of the first attempt exceeds the
/// maximum retry time, the policy gives up and returns
/// [`RetryError::Timeout`] carrying every error seen along the way.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_retry_time: Duration,
    max_delay: Duration,
    factor: f64,
    jitter: f64,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff policy with default settings.
    ///
    /// Same as [`ExponentialBackoff::default()`].
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Change for how long the policy will retry for, before giving up.
    #[inline]
    pub fn with_max_retry_time(self, max_retry_time: Duration) -> Self {
        Self {
            max_retry_time,
            ..self
        }
    }
}

impl Default for ExponentialBackoff {
    #[inline]
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_retry_time: Duration::from_secs(30),
            max_delay: Duration::from_secs(60),
            factor: 2.0,
            jitter: 0.2,
        }
    }
}

/// Error type returned by [`RetryPolicy::execute()`] to distinguish a
/// non-retryable failure from an exhausted retry budget.
#[derive(Error, Debug)]
pub enum RetryError {
    /// The work failed with a non-retryable driver error.
    #[error("non-retryable error occurred: {0}")]
    DriverError(#[from] DriverError),
    /// The retry budget was exhausted.
    #[error("{0}")]
    Timeout(#[from] RetryTimeoutError),
}

/// Used to indicate that a retry loop gave up after its time budget.
///
/// All errors encountered during the retry loop are collected and can be
/// accessed through [`RetryTimeoutError::errors`].
#[derive(Error, Debug)]
#[error("timeout occurred while retrying; last error: {}", .errors.last().expect("timeout implies at least one error"))]
pub struct RetryTimeoutError {
    /// Errors encountered during the retry loop.
    pub errors: Vec<DriverError>,
}

impl From<RetryTimeoutError> for Vec<DriverError> {
    fn from(value: RetryTimeoutError) -> Self {
        value.errors
    }
}

impl RetryPolicy for &ExponentialBackoff {
    type Error = RetryError;

    fn execute<R>(&self, mut work: impl FnMut() -> Result<R>) -> StdResult<R, Self::Error> {
        assert!(self.jitter >= 0.0);
        assert!(self.jitter < 1.0);
        assert!(self.factor >= 1.0);
        let mut time_start = None;
        let mut errors = Vec::new();
        let mut current_delay = self.initial_delay.as_secs_f64();
        let max_delay = self.max_delay.as_secs_f64();
        let mut rng = rand::thread_rng();
        loop {
            let res = work();
            if time_start.is_none() {
                time_start = Some(Instant::now());
            }
            let err = match res {
                Err(e) if e.is_retryable() => e,
                _ => return res.map_err(Into::into),
            };
            errors.push(err);
            let time_elapsed = time_start.expect("set above").elapsed();
            if time_elapsed > self.max_retry_time {
                return Err(RetryTimeoutError { errors }.into());
            }
            let jitter_factor = 1.0 + rng.gen_range(-self.jitter..=self.jitter);
            let jittered_delay = current_delay * jitter_factor;
            warn!(
                "transaction failed and will be retried in {:.4} seconds: {}",
                jittered_delay,
                errors.last().expect("pushed above")
            );
            clock::sleep(Duration::try_from_secs_f64(jittered_delay).unwrap_or(Duration::MAX));
            current_delay = (current_delay * self.factor).min(max_delay);
        }
    }
}

impl RetryPolicy for ExponentialBackoff {
    type Error = <&'static ExponentialBackoff as RetryPolicy>::Error;

    fn execute<R>(&self, work: impl FnMut() -> Result<R>) -> StdResult<R, Self::Error> {
        (&self).execute(work)
    }
}

#[double]
use mockable::clock;

mod mockable {
    #[cfg(test)]
    use mockall::automock;

    #[cfg_attr(test, automock)]
    pub(super) mod clock {
        use std::time::Duration;

        pub fn sleep(duration: Duration) {
            std::thread::sleep(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, MutexGuard, OnceLock};

    use rstest::*;

    use super::*;
    use crate::error_::ErrorKind;

    static CLOCK_MTX: OnceLock<Mutex<()>> = OnceLock::new();

    // When a test panics, it will poison the Mutex. Since we don't actually
    // care about the state of the data we ignore that it is poisoned and grab
    // the lock regardless.
    fn get_clock_lock() -> MutexGuard<'static, ()> {
        let mutex = CLOCK_MTX.get_or_init(Default::default);
        match mutex.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[rstest]
    fn work_that_succeeds_is_invoked_exactly_once() {
        let _m = get_clock_lock();
        let ctx = clock::sleep_context();
        ctx.expect().times(0).return_const(());

        let mut count = 0;
        let result: StdResult<i64, _> = ExponentialBackoff::new().execute(|| {
            count += 1;
            Ok(42)
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(count, 1);
    }

    #[rstest]
    fn retries_until_success() {
        let _m = get_clock_lock();
        let ctx = clock::sleep_context();
        ctx.expect().times(12).return_const(());

        let mut count = 0;
        let result: StdResult<i64, _> = ExponentialBackoff::new()
            .with_max_retry_time(Duration::from_secs(3600))
            .execute(|| {
                count += 1;
                if count <= 12 {
                    Err(DriverError::session_expired("leader switch"))
                } else {
                    Ok(42)
                }
            });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(count, 13);
    }

    #[rstest]
    fn non_retryable_errors_pass_through() {
        let _m = get_clock_lock();
        let ctx = clock::sleep_context();
        ctx.expect().times(0).return_const(());

        let mut count = 0;
        let result: StdResult<(), _> = ExponentialBackoff::new().execute(|| {
            count += 1;
            Err(DriverError::client("bad input"))
        });
        let RetryError::DriverError(error) = result.unwrap_err() else {
            panic!("expected pass-through error");
        };
        assert_eq!(error.kind(), ErrorKind::Client);
        assert_eq!(count, 1);
    }

    #[rstest]
    fn timeout_collects_all_attempt_errors() {
        let _m = get_clock_lock();
        let ctx = clock::sleep_context();
        ctx.expect().return_const(());

        let policy = ExponentialBackoff::new().with_max_retry_time(Duration::ZERO);
        let mut count = 0;
        let result: StdResult<(), _> = policy.execute(|| {
            count += 1;
            Err(DriverError::transient("still broken"))
        });
        let RetryError::Timeout(timeout) = result.unwrap_err() else {
            panic!("expected timeout");
        };
        // with a zero budget, the loop stops after the attempt that first
        // exceeds the deadline
        assert!(!timeout.errors.is_empty());
        assert_eq!(count, timeout.errors.len());
    }
}
