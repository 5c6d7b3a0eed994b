// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};

use kres_common::telemetry::trace;

/// Intervals below this are raised to it so a zero interval cannot spin
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Outcome of a single check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll<T> {
    Pending,
    Done(T),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PollError<E> {
    #[error("condition not met after {attempts} attempts in {waited:?}")]
    Timeout {
        attempts: u32,
        waited: Duration,
    },
    #[error("check failed: {0}")]
    Check(E),
}

/// Call `check` until it reports `Done` or `timeout` elapses.
///
/// The first call happens immediately. Later calls follow every `interval`,
/// one at a time, with the last sleep clipped to the deadline so one final
/// check runs when it is reached. A zero `timeout` means exactly one call.
/// An `Err` from `check` stops polling at once.
///
/// # Arguments
/// * `check`: Produces one check per call
/// * `interval`: The pause between checks, raised to `MIN_POLL_INTERVAL`
/// * `timeout`: The total time allowed, any `Duration` is accepted
///
/// # Returns
/// A Result containing the value of the first `Done` or the reason polling stopped
pub async fn poll_until<T, E, F, Fut>(mut check: F, interval: Duration, timeout: Duration) -> Result<T, PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Poll<T>, E>>,
{
    let interval = interval.max(MIN_POLL_INTERVAL);
    let started = Instant::now();
    // `None` when the deadline lies beyond what the clock can represent
    let deadline = started.checked_add(timeout);
    let mut attempts: u32 = 0;

    loop {
        attempts = attempts.saturating_add(1);
        match check().await.map_err(PollError::Check)? {
            Poll::Done(value) => return Ok(value),
            Poll::Pending => {},
        }

        let now = Instant::now();
        let pause = match deadline {
            Some(deadline) if now >= deadline => {
                return Err(PollError::Timeout { attempts, waited: now - started });
            },
            Some(deadline) => interval.min(deadline - now),
            None => interval,
        };

        trace!(event = "PollPending", attempt = attempts);
        sleep(pause).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_checks_exactly_once() {
        let calls = &AtomicU32::new(0);
        let result = poll_until(
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(Poll::<()>::Pending)
            },
            Duration::from_millis(100),
            Duration::ZERO,
        ).await;

        assert_eq!(result, Err(PollError::Timeout { attempts: 1, waited: Duration::ZERO }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_still_reports_done() {
        let result = poll_until(
            || async { Ok::<_, Infallible>(Poll::Done(7)) },
            Duration::from_millis(100),
            Duration::ZERO,
        ).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn done_on_first_call_does_not_sleep() {
        let started = Instant::now();
        let result = poll_until(
            || async { Ok::<_, Infallible>(Poll::Done("ready")) },
            Duration::from_secs(60),
            Duration::from_secs(600),
        ).await;

        assert_eq!(result, Ok("ready"));
        assert_eq!(Instant::now() - started, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn polls_on_a_fixed_cadence_until_done() {
        let calls = &AtomicU32::new(0);
        let started = Instant::now();
        let result = poll_until(
            move || async move {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Ok::<_, Infallible>(if call == 4 { Poll::Done(call) } else { Poll::Pending })
            },
            Duration::from_millis(100),
            Duration::from_secs(2),
        ).await;

        assert_eq!(result, Ok(4));
        assert_eq!(Instant::now() - started, Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_with_a_final_check_at_the_deadline() {
        let calls = &AtomicU32::new(0);
        let started = Instant::now();
        let result = poll_until(
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(Poll::<()>::Pending)
            },
            Duration::from_millis(400),
            Duration::from_secs(1),
        ).await;

        // checks at 0ms, 400ms, 800ms and 1000ms
        assert_eq!(result, Err(PollError::Timeout { attempts: 4, waited: Duration::from_secs(1) }));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(Instant::now() - started, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_timeouts_keep_polling() {
        let calls = &AtomicU32::new(0);
        let started = Instant::now();
        let result = poll_until(
            move || async move {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Ok::<_, Infallible>(if call == 3 { Poll::Done(call) } else { Poll::Pending })
            },
            Duration::from_millis(100),
            Duration::MAX,
        ).await;

        assert_eq!(result, Ok(3));
        assert_eq!(Instant::now() - started, Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn check_errors_abort_immediately() {
        let calls = &AtomicU32::new(0);
        let result = poll_until(
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<Poll<()>, _>("boom")
            },
            Duration::from_millis(100),
            Duration::from_secs(10),
        ).await;

        assert_eq!(result, Err(PollError::Check("boom")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
