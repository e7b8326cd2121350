use std::{fmt::Display, future::Future};

use tokio::time::{Duration, sleep};
use tracing::{debug, info, warn};

use crate::models::retry::RetryConfig;

/// Runs `operation` until it succeeds or `max_attempts` tries are spent.
/// Returns the error of the final attempt.
pub async fn retry_with_backoff<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let error = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(attempt, "Succeeded after retrying");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if attempt == attempts {
            warn!(attempts, error = %error, "Giving up");
            return Err(error);
        }

        let delay = backoff_delay(config, attempt);
        warn!(
            attempt,
            attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Attempt failed, retrying"
        );
        sleep(delay).await;
        attempt += 1;
    }
}

/// Delay after the `attempt`-th failure: grows by the multiplier, capped at
/// `max_delay_ms`, then jittered by up to 10% either way.
fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let growth = config.backoff_multiplier.saturating_pow(attempt - 1);
    let base = config
        .initial_delay_ms
        .saturating_mul(growth)
        .min(config.max_delay_ms);
    let factor: f64 = rand::random_range(0.9..=1.1);

    Duration::from_millis((base as f64 * factor) as u64)
}

/// Random anti-burst pause of 1..=`max_seconds` seconds; `None` when disabled.
pub fn pacing_delay(max_seconds: u64) -> Option<Duration> {
    if max_seconds == 0 {
        return None;
    }

    let seconds = rand::random_range(1..=max_seconds);
    debug!(seconds, "Pacing delay chosen");
    Some(Duration::from_secs(seconds))
}
