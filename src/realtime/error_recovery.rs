use log::warn;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

/// Exponential back-off settings for reconnect attempts
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Delay to wait after failed attempt number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial_delay_ms as f64 * self.multiplier.max(1.0).powi(attempt as i32);
        let mut delay = Duration::from_secs_f64(base.min(self.max_delay_ms as f64) / 1000.0);
        if self.jitter {
            use std::collections::hash_map::DefaultHasher;
            use std::hash::{Hash, Hasher};
            let mut hasher = DefaultHasher::new();
            attempt.hash(&mut hasher);
            std::time::SystemTime::now().hash(&mut hasher);
            delay += Duration::from_millis(hasher.finish() % 100);
        }
        delay.min(self.max_delay())
    }
}

/// Run `operation` until it succeeds or `max_attempts` is used up.
///
/// Returns the last error when every attempt fails. A `max_attempts` of zero is
/// treated as one attempt.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    what: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt + 1 >= attempts => return Err(e),
            Err(e) => {
                let delay = config.delay_for(attempt);
                warn!(
                    "{} failed (attempt {}/{}): {}, retrying in {:?}",
                    what,
                    attempt + 1,
                    attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            multiplier: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let config = RetryConfig {
            jitter: false,
            ..RetryConfig::default()
        };
        assert_eq!(config.delay_for(0), Duration::from_millis(500));
        assert_eq!(config.delay_for(1), Duration::from_millis(1000));
        assert_eq!(config.delay_for(20), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = retry_with_backoff(&fast(), "op", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(format!("fail {}", n))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = retry_with_backoff(&fast(), "op", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Err(format!("fail {}", n))
        })
        .await;

        assert_eq!(result, Err("fail 2".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
