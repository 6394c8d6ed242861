//! Exponential backoff for relay operations.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::Error;

/// Fraction of the computed delay added or removed at random.
const JITTER_RATIO: f64 = 0.25;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
    /// Randomise each delay by up to 25% either way.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::network()
    }
}

impl RetryPolicy {
    /// Relay probes and event publishing.
    pub fn network() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            backoff_multiplier: 1.5,
            max_delay: Duration::from_secs(15),
            jitter: true,
        }
    }

    /// Reading published events back for validation.
    pub fn validation() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(5),
            jitter: false,
        }
    }

    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            jitter: false,
            ..Self::network()
        }
    }

    /// Delay before retry number `attempt` (0-based), capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms =
            self.base_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let delay = Duration::from_millis(delay_ms as u64).min(self.max_delay);
        if self.jitter {
            jittered(delay)
        } else {
            delay
        }
    }

    /// Whether another attempt is allowed after `attempts` have failed.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts <= self.max_retries
    }
}

fn jittered(delay: Duration) -> Duration {
    let factor = 1.0 + rand::thread_rng().gen_range(-JITTER_RATIO..=JITTER_RATIO);
    Duration::from_millis((delay.as_millis() as f64 * factor) as u64)
}

/// Run `op` until it succeeds, fails with a non-retryable error or the
/// policy runs out of attempts. The last error is returned.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut attempts = 0;
    loop {
        match op().await {
            Ok(value) => {
                if attempts > 0 {
                    debug!(operation, attempts = attempts + 1, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                attempts += 1;
                if !err.is_retryable() || !policy.should_retry(attempts) {
                    return Err(err);
                }
                let delay = policy.delay_for_attempt(attempts - 1);
                debug!(
                    operation,
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying after error: {}",
                    err
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy {
            jitter: false,
            ..RetryPolicy::network()
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(3));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(4500));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(15));

        let validation = RetryPolicy::validation();
        assert_eq!(validation.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(validation.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(validation.delay_for_attempt(5), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_stays_within_a_quarter() {
        let policy = RetryPolicy::network();
        for _ in 0..200 {
            let delay = policy.delay_for_attempt(0).as_millis();
            assert!((1500..=2500).contains(&delay), "{delay}");
        }
    }

    #[test]
    fn test_should_retry_counts_total_attempts() {
        let policy = RetryPolicy::network();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(3));
        assert!(!policy.should_retry(4));
        assert!(!RetryPolicy::none().should_retry(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = with_retry(&RetryPolicy::network(), "publish", move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::Timeout)
            } else {
                Ok("done")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), Error> = with_retry(&RetryPolicy::validation(), "fetch", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(Error::EventNotFound("abc".to_string()))
        })
        .await;
        assert!(matches!(result, Err(Error::EventNotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), Error> = with_retry(&RetryPolicy::network(), "plan", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(Error::InvalidOptions("bad".to_string()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_between_attempts() {
        let start = tokio::time::Instant::now();
        let policy = RetryPolicy {
            jitter: false,
            ..RetryPolicy::network()
        };
        let _: Result<(), Error> = with_retry(&policy, "probe", || async { Err(Error::Timeout) }).await;
        // 2s + 3s + 4.5s
        assert_eq!(start.elapsed(), Duration::from_millis(9500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_scheduling_logs_at_debug() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = with_retry(&RetryPolicy::network(), "publish", move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Error::Timeout)
            } else {
                Ok(())
            }
        })
        .await;
        assert!(result.is_ok());

        let text = logs.text();
        let line = text
            .lines()
            .find(|line| line.contains("Retrying after error"))
            .unwrap();
        assert!(line.contains("DEBUG"), "{line}");
        assert!(!text.contains("WARN"), "{text}");
    }
}
