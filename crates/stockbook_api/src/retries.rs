//! Retry policy for transient dispatch failures.
//!
//! A completed response with status 429 or >= 502 is re-issued with jittered
//! exponential backoff, bounded by an attempt ceiling; every other status is
//! surfaced to the caller as-is. Transport-level failures (no response) are
//! governed by the transport's own settings and are not re-issued here.
//!
//! Because admission control already throttles to the published limit, a 429
//! indicates drift (clock skew, bursts from other processes on the same
//! account) rather than normal operation; this policy is the second line of
//! defense, not the primary throttle.

use std::{
    borrow::Cow,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use futures::FutureExt;
use http::StatusCode;
use tokio::time::{Sleep, sleep};
use tower::retry::Policy;

use crate::internal_event;
use crate::transport::{TransportError, TransportResponse};

pub enum RetryAction {
    /// Indicate that this request should be retried with a reason
    Retry(Cow<'static, str>),
    /// Indicate that this request should not be retried with a reason
    DontRetry(Cow<'static, str>),
    /// Indicate that this request was successful and needs no retry
    Successful,
}

impl RetryAction {
    pub const fn is_retryable(&self) -> bool {
        matches!(self, RetryAction::Retry(_))
    }

    pub const fn is_not_retryable(&self) -> bool {
        matches!(self, RetryAction::DontRetry(_))
    }

    pub const fn is_successful(&self) -> bool {
        matches!(self, RetryAction::Successful)
    }
}

/// Defines the contract for determining which requests should be retried.
pub trait RetryLogic: Clone + Send + Sync + 'static {
    /// The type of errors produced by the service
    type Error: std::error::Error + Send + Sync + 'static;

    /// The type of successful responses from the service
    type Response;

    /// Determines if a service error should trigger a retry.
    fn is_retriable_error(&self, error: &Self::Error) -> bool;

    /// Determines if a completed response should trigger a retry.
    fn should_retry_response(&self, _response: &Self::Response) -> RetryAction {
        RetryAction::Successful
    }
}

/// The jitter mode to use for retry backoff behavior.
#[derive(Clone, Copy, Debug, Default)]
pub enum JitterMode {
    /// No jitter.
    None,

    /// Full jitter.
    ///
    /// The random delay is anywhere from 0 up to the maximum current delay
    /// calculated by the backoff strategy. Full jitter greatly reduces the
    /// likelihood of synchronized retry storms when many clients recover
    /// from the same failure.
    #[default]
    Full,
}

// `tokio-retry` crate
// MIT License
// Copyright (c) 2017 Sam Rijs
//
/// A retry delay schedule driven by exponential back-off.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    current: u64,
    base: u64,
    factor: u64,
    max_delay: Option<Duration>,
}

impl ExponentialBackoff {
    /// Schedule starting at `initial_ms`, multiplying by `base` each step,
    /// with individual delays capped at `max_delay`.
    pub const fn new(initial_ms: u64, base: u64, max_delay: Option<Duration>) -> Self {
        ExponentialBackoff {
            current: initial_ms,
            base,
            factor: 1,
            max_delay,
        }
    }

    /// A multiplicative factor applied to every delay.
    ///
    /// For example, a factor of `1000` turns the schedule into units of
    /// seconds. Default factor is `1`.
    pub const fn factor(mut self, factor: u64) -> Self {
        self.factor = factor;
        self
    }
}

impl Iterator for ExponentialBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let duration = match self.current.checked_mul(self.factor) {
            Some(millis) => Duration::from_millis(millis),
            None => Duration::from_millis(u64::MAX),
        };

        if let Some(ref max_delay) = self.max_delay {
            if duration > *max_delay {
                return Some(*max_delay);
            }
        }

        match self.current.checked_mul(self.base) {
            Some(next) => self.current = next,
            None => self.current = u64::MAX,
        }

        Some(duration)
    }
}

/// `tower::retry` policy with a bounded attempt count and an exponential
/// backoff schedule.
#[derive(Clone, Debug)]
pub struct ExponentialBackoffPolicy<L: RetryLogic> {
    attempts_remaining: usize,
    backoff: ExponentialBackoff,
    logic: L,
    jitter_mode: JitterMode,
}

/// Future returned by the policy: sleeps the backoff delay, then yields the
/// advanced policy state.
pub struct ExponentialPolicyFuture<L: RetryLogic> {
    delay: Pin<Box<Sleep>>,
    next_state: ExponentialBackoffPolicy<L>,
}

impl<L: RetryLogic> ExponentialBackoffPolicy<L> {
    /// `max_retries` bounds the *additional* attempts after the first; a
    /// request is issued at most `max_retries + 1` times.
    pub fn new(
        max_retries: usize,
        backoff: ExponentialBackoff,
        logic: L,
        jitter_mode: JitterMode,
    ) -> Self {
        Self {
            attempts_remaining: max_retries,
            backoff,
            logic,
            jitter_mode,
        }
    }

    fn apply_jitter(&self, base: Duration) -> Duration {
        match self.jitter_mode {
            JitterMode::None => base,
            JitterMode::Full => {
                if base.as_millis() == 0 {
                    return Duration::ZERO;
                }
                let random_millis = (rand::random::<f64>() * base.as_millis() as f64) as u64;
                Duration::from_millis(random_millis)
            }
        }
    }
}

impl<Req, Res, L> Policy<Req, Res, L::Error> for ExponentialBackoffPolicy<L>
where
    Req: Clone,
    L: RetryLogic<Response = Res>,
{
    type Future = ExponentialPolicyFuture<L>;

    fn retry(&self, _request: &Req, result: Result<&Res, &L::Error>) -> Option<Self::Future> {
        let action = match result {
            Ok(response) => self.logic.should_retry_response(response),
            Err(error) => {
                if self.logic.is_retriable_error(error) {
                    RetryAction::Retry(Cow::Borrowed("service error deemed retriable"))
                } else {
                    RetryAction::DontRetry(Cow::Borrowed("service error deemed not retriable"))
                }
            }
        };

        match action {
            RetryAction::Retry(reason) => {
                if self.attempts_remaining == 0 {
                    error!(message = "Retries exhausted; surfacing the last result.", %reason);
                    return None;
                }

                let mut backoff = self.backoff.clone();
                let Some(base_delay) = backoff.next() else {
                    warn!(message = "Backoff schedule exhausted; surfacing the last result.", %reason);
                    return None;
                };
                let delay = self.apply_jitter(base_delay);

                warn!(
                    message = "Retrying request.",
                    %reason,
                    delay_ms = %delay.as_millis(),
                    attempts_remaining = self.attempts_remaining - 1
                );
                internal_event::request_retried(delay);

                let mut next_state = self.clone();
                next_state.attempts_remaining -= 1;
                next_state.backoff = backoff;

                Some(ExponentialPolicyFuture {
                    delay: Box::pin(sleep(delay)),
                    next_state,
                })
            }
            RetryAction::DontRetry(reason) => {
                debug!(message = "Not retriable; surfacing the result.", %reason);
                None
            }
            RetryAction::Successful => None,
        }
    }

    fn clone_request(&self, request: &Req) -> Option<Req> {
        Some(request.clone())
    }
}

// Safety: `L` is never pinned and we use no unsafe pin projections,
// therefore this is safe.
impl<L: RetryLogic> Unpin for ExponentialPolicyFuture<L> {}

impl<L: RetryLogic> Future for ExponentialPolicyFuture<L> {
    type Output = ExponentialBackoffPolicy<L>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        std::task::ready!(self.delay.poll_unpin(cx));
        Poll::Ready(self.next_state.clone())
    }
}

/// Retry classification for completed Stockbook responses.
#[derive(Clone, Copy, Debug, Default)]
pub struct DispatchRetryLogic;

impl RetryLogic for DispatchRetryLogic {
    type Error = TransportError;
    type Response = TransportResponse;

    // Transport-level failures are governed by the transport's own
    // retry/timeout settings, never re-issued here.
    fn is_retriable_error(&self, _error: &Self::Error) -> bool {
        false
    }

    fn should_retry_response(&self, response: &Self::Response) -> RetryAction {
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 502 {
            RetryAction::Retry(Cow::Owned(format!("service responded with status {status}")))
        } else if status.is_success() {
            RetryAction::Successful
        } else {
            RetryAction::DontRetry(Cow::Owned(format!("status {status} is not transient")))
        }
    }
}
