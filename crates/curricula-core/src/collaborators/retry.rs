//! Timeout and bounded retry with jittered exponential backoff.

use std::future::Future;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::ProviderResult;
use crate::domain::error::{CurriculaError, Result};
use crate::obs;

/// Retry policy applied to every collaborator call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum wall-clock time for a single attempt (milliseconds).
    pub timeout_ms: u64,
    /// Maximum number of retries (0 = run once).
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries (milliseconds).
    pub backoff_base_ms: u64,
    /// Upper bound on a single backoff delay (milliseconds).
    pub backoff_max_ms: u64,
    /// Fractional jitter in `[0, 1]`; a delay `d` becomes `d * (1 ± jitter)`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_retries: 1,
            backoff_base_ms: 250,
            backoff_max_ms: 5_000,
            jitter: 0.5,
        }
    }
}

impl RetryPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff_delay(&self, attempt: u32, rng: &mut StdRng) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        let raw = self
            .backoff_base_ms
            .saturating_mul(1u64 << exp)
            .min(self.backoff_max_ms);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 || raw == 0 {
            return Duration::from_millis(raw);
        }
        let factor = 1.0 + rng.gen_range(-jitter..=jitter);
        Duration::from_millis((raw as f64 * factor).round() as u64)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.timeout_ms == 0 {
            return Err("retry.timeout_ms must be > 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err("retry.jitter must be in [0, 1]".to_string());
        }
        Ok(())
    }
}

/// A decoded response and how many attempts it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

/// Call a collaborator with a per-attempt timeout, decoding each response.
///
/// Provider failures, timeouts and schema violations are retried up to
/// `policy.max_retries` times; any other error is returned immediately.
pub async fn call_with_retry<T, F, Fut, D>(
    stage: &str,
    policy: &RetryPolicy,
    rng: &mut StdRng,
    mut call: F,
    decode: D,
) -> Result<Attempted<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult>,
    D: Fn(serde_json::Value) -> Result<T>,
{
    let max_attempts = policy.max_retries.saturating_add(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let err = match tokio::time::timeout(policy.timeout(), call()).await {
            Ok(Ok(raw)) => match decode(raw) {
                Ok(value) => {
                    return Ok(Attempted {
                        value,
                        attempts: attempt,
                    })
                }
                Err(e) => e,
            },
            Ok(Err(provider)) => CurriculaError::ProviderUnavailable {
                stage: stage.to_string(),
                detail: provider.to_string(),
            },
            Err(_elapsed) => CurriculaError::ProviderTimeout {
                stage: stage.to_string(),
                timeout_ms: policy.timeout_ms,
            },
        };

        if !err.is_retryable() || attempt >= max_attempts {
            return Err(err);
        }
        let delay = policy.backoff_delay(attempt, rng);
        obs::emit_provider_retry(stage, attempt, delay, &err);
        tokio::time::sleep(delay).await;
    }
}
