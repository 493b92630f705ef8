use std::{fmt, future::Future, ops::ControlFlow, time::Duration};

use futures_util::future::BoxFuture;
use reqwest::StatusCode;

use crate::RequestOptions;

/// Suspends the calling task between attempts.
///
/// The default [`TokioSleeper`] yields to the runtime, so unrelated requests
/// keep running during a backoff. Tests substitute a recording implementation.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, delay: Duration) -> BoxFuture<'static, ()>;
}

/// [`Sleeper`] backed by `tokio::time::sleep`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, delay: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(delay))
    }
}

/// Result of a single attempt. Exactly one variant per attempt.
#[derive(Debug)]
pub(crate) enum AttemptOutcome<T, E> {
    Success(T),
    TransportFailure(E),
    StatusFailure { status: StatusCode, cause: String },
}

/// Terminal state of a logical request.
#[derive(Debug)]
pub(crate) enum Terminal<T, E> {
    Success(T),
    Failed { status: StatusCode, cause: String },
    Exhausted { attempts: usize, last: E },
}

enum Failure<E> {
    Transport(E),
    Status { status: StatusCode, cause: String },
}

impl<E> Failure<E> {
    fn into_terminal<T>(self, attempts: usize) -> Terminal<T, E> {
        match self {
            Self::Transport(last) => Terminal::Exhausted { attempts, last },
            Self::Status { status, cause } => Terminal::Failed { status, cause },
        }
    }
}

impl<E: fmt::Display> fmt::Display for Failure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(cause) => write!(f, "{cause}"),
            Self::Status { status, .. } => write!(f, "status {status}"),
        }
    }
}

/// Per-request retry bookkeeping. Exists inside one [`RetryController::run`]
/// from the first failed attempt on.
struct RetryState<E> {
    attempt: usize,
    last_failure: Failure<E>,
    backoff: Duration,
}

/// Drives attempts until success, a non-retryable failure, or exhaustion.
pub(crate) struct RetryController<'a> {
    options: &'a RequestOptions,
    sleeper: &'a dyn Sleeper,
}

impl<'a> RetryController<'a> {
    pub(crate) fn new(options: &'a RequestOptions, sleeper: &'a dyn Sleeper) -> Self {
        Self { options, sleeper }
    }

    /// Runs `attempt` with zero-based indices in `[0, attempt_budget)`.
    ///
    /// Attempts are strictly sequential. Status failures end the loop
    /// immediately unless status retries are enabled and the status is one
    /// of the transient ones.
    pub(crate) async fn run<T, E, F, Fut>(&self, mut attempt: F) -> Terminal<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = AttemptOutcome<T, E>>,
        E: fmt::Display,
    {
        let budget = self.options.attempt_budget();
        let mut state = match self.classify(attempt(0).await) {
            ControlFlow::Continue(failure) => RetryState {
                attempt: 0,
                last_failure: failure,
                backoff: Duration::ZERO,
            },
            ControlFlow::Break(terminal) => return terminal,
        };

        loop {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                attempt = state.attempt + 1,
                budget,
                error = %state.last_failure,
                "request attempt failed"
            );

            if state.attempt + 1 >= budget {
                return state.last_failure.into_terminal(state.attempt + 1);
            }

            state.backoff = self.options.backoff_delay(state.attempt);

            #[cfg(feature = "tracing")]
            tracing::debug!(
                "retrying request after {} ms",
                state.backoff.as_millis()
            );

            self.sleeper.sleep(state.backoff).await;
            state.attempt += 1;
            state.last_failure = match self.classify(attempt(state.attempt).await) {
                ControlFlow::Continue(failure) => failure,
                ControlFlow::Break(terminal) => return terminal,
            };
        }
    }

    /// Splits an outcome into a retry candidate or a terminal state.
    fn classify<T, E>(
        &self,
        outcome: AttemptOutcome<T, E>,
    ) -> ControlFlow<Terminal<T, E>, Failure<E>> {
        match outcome {
            AttemptOutcome::Success(value) => ControlFlow::Break(Terminal::Success(value)),
            AttemptOutcome::StatusFailure { status, cause } => {
                if self.options.retry_on_status && is_retryable_status(status) {
                    ControlFlow::Continue(Failure::Status { status, cause })
                } else {
                    ControlFlow::Break(Terminal::Failed { status, cause })
                }
            }
            AttemptOutcome::TransportFailure(cause) => {
                ControlFlow::Continue(Failure::Transport(cause))
            }
        }
    }
}

pub(crate) fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}
