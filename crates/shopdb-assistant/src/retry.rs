//! Retry with exponential back-off and a request-rate floor for hosted providers.
//!
//! [`retry_with_backoff`] retries transient failures (network errors, 429, 5xx).
//! [`RequestPacer`] spaces successive requests by a minimum interval so bursts
//! of chat traffic do not trip provider throttling in the first place.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::AssistantError;

/// Upper bound for a single back-off sleep.
const MAX_DELAY_MS: u64 = 60_000;

/// Returns `true` for errors that are worth retrying after a back-off delay.
///
/// **Retriable:** timeouts, connection failures, HTTP 429, HTTP 5xx.
///
/// **Not retriable:** other 4xx statuses, malformed bodies, empty completions.
/// Retrying those returns the same result.
pub(crate) fn is_retriable(err: &AssistantError) -> bool {
    match err {
        AssistantError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        AssistantError::RateLimited { .. } => true,
        AssistantError::UnexpectedStatus { status, .. } => *status >= 500,
        AssistantError::Tei(_)
        | AssistantError::Qdrant(_)
        | AssistantError::Deserialize { .. }
        | AssistantError::EmptyCompletion
        | AssistantError::Db(_) => false,
    }
}

/// Un-jittered delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`,
/// capped at 60 s.
pub(crate) fn backoff_delay_ms(attempt: u32, backoff_base_ms: u64) -> u64 {
    let exp = attempt.saturating_sub(1).min(20);
    backoff_base_ms
        .saturating_mul(1u64 << exp)
        .min(MAX_DELAY_MS)
}

/// Runs `operation` with up to `max_retries` additional attempts on transient errors.
///
/// Back-off schedule with `backoff_base_ms = 1_000`:
///
/// | Retry | Sleep before it               |
/// |-------|-------------------------------|
/// | 1     | 1 000 ms × 2⁰ ± 25 % jitter   |
/// | 2     | 1 000 ms × 2¹ ± 25 % jitter   |
/// | 3     | 1 000 ms × 2² ± 25 % jitter   |
///
/// A `Retry-After` hint on [`AssistantError::RateLimited`] raises the sleep to at
/// least that many seconds. Every sleep is capped at 60 s.
///
/// # Errors
///
/// Returns the first non-retriable error, or the last error once retries run out.
pub async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, AssistantError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AssistantError>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let capped = backoff_delay_ms(attempt, backoff_base_ms);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let mut delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                if let AssistantError::RateLimited {
                    retry_after_secs, ..
                } = &err
                {
                    delay_ms = delay_ms
                        .max(retry_after_secs.saturating_mul(1_000))
                        .min(MAX_DELAY_MS);
                }
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "transient provider error, retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

/// Enforces a minimum interval between successive requests.
///
/// Callers queue on an async mutex, so the floor holds across concurrent tasks.
#[derive(Debug)]
pub struct RequestPacer {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RequestPacer {
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits until at least `min_interval` has passed since the previous call
    /// returned, then claims the slot.
    pub async fn wait(&self) {
        if self.min_interval.is_zero() {
            return;
        }

        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.min_interval;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}
