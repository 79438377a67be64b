use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum RetryError {
    #[error("gave up after {attempts} failed attempt(s)")]
    Exhausted { attempts: u32 },
    #[error("interrupted after {attempts} attempt(s)")]
    Interrupted { attempts: u32 },
}

impl RetryError {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts } | Self::Interrupted { attempts } => *attempts,
        }
    }
}

/// Runs `op` until it reports success or `policy.max_attempts` is reached,
/// sleeping `policy.backoff` between attempts.
///
/// Cancellation is observed before every attempt and during the backoff, never
/// while `op` is running. Returns the number of attempts used on success.
pub async fn attempt_with_retry<F, Fut>(
    mut op: F,
    policy: RetryPolicy,
    cancel: &CancellationToken,
) -> Result<u32, RetryError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = bool>,
{
    let mut attempt = 0_u32;
    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Interrupted { attempts: attempt });
        }

        attempt += 1;
        if op(attempt).await {
            return Ok(attempt);
        }

        warn!(
            attempt,
            max_attempts = policy.max_attempts,
            "attempt {attempt}/{} failed",
            policy.max_attempts
        );
        if attempt >= policy.max_attempts {
            return Err(RetryError::Exhausted { attempts: attempt });
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(RetryError::Interrupted { attempts: attempt }),
            _ = tokio::time::sleep(policy.backoff) => {}
        }
    }
}
