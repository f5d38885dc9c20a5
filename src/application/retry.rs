// Fetch with exponential backoff and jitter
use crate::application::record_source::{FetchError, RecordSource};
use crate::domain::record::RawRecord;
use rand::Rng;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_jitter_ms: u64,
}

pub trait BackoffPolicy {
    fn delay_for_attempt(&self, attempt: usize) -> Duration;
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
            max_jitter_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// Delay after 0-indexed `attempt` for a given jitter sample.
    pub fn delay_with_jitter(&self, attempt: usize, jitter_ms: u64) -> Duration {
        let factor = 1u64.checked_shl(attempt as u32).unwrap_or(u64::MAX);
        Duration::from_millis(
            self.base_delay_ms
                .saturating_mul(factor)
                .saturating_add(jitter_ms),
        )
    }
}

impl BackoffPolicy for RetryPolicy {
    fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let jitter = if self.max_jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..self.max_jitter_ms)
        };
        self.delay_with_jitter(attempt, jitter)
    }
}

/// Read all records, retrying any failure until the policy is exhausted.
pub async fn fetch_with_retry(
    source: &dyn RecordSource,
    policy: &RetryPolicy,
) -> Result<Vec<RawRecord>, FetchError> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        tracing::debug!("Fetching records (attempt {}/{})", attempt + 1, attempts);
        match source.fetch_records().await {
            Ok(records) => return Ok(records),
            Err(e) if attempt + 1 >= attempts => {
                tracing::error!("Fetch failed on final attempt {}: {}", attempt + 1, e);
                return Err(FetchError::Exhausted {
                    attempts,
                    last: Box::new(e),
                });
            }
            Err(e) => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    "Fetch attempt {} failed: {}; retrying in {:?}",
                    attempt + 1,
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
pub(crate) mod tests {
    use super::*;
    use crate::domain::image::ImageBlob;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays scripted responses; repeats the last one when the script runs out.
    pub(crate) struct ScriptedSource {
        script: Mutex<VecDeque<Result<Vec<RawRecord>, String>>>,
        pub(crate) calls: AtomicUsize,
    }

    impl ScriptedSource {
        pub(crate) fn new(script: Vec<Result<Vec<RawRecord>, String>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RecordSource for ScriptedSource {
        async fn fetch_records(&self) -> Result<Vec<RawRecord>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            let next = if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().unwrap_or_else(|| Ok(Vec::new()))
            };
            next.map_err(FetchError::Payload)
        }

        /// Echoes the id back as the payload; ids starting with `missing` fail.
        async fn fetch_image(&self, file_id: &str) -> Result<ImageBlob, FetchError> {
            if file_id.starts_with("missing") {
                return Err(FetchError::Status {
                    status: 404,
                    body: "file not found".to_string(),
                });
            }
            Ok(ImageBlob {
                mime_type: "image/png".to_string(),
                base64: file_id.to_string(),
            })
        }
    }

    #[test]
    fn test_backoff_bounds() {
        let policy = RetryPolicy::default();
        for attempt in 0..5 {
            let low = Duration::from_millis((1u64 << attempt) * 1000);
            let high = low + Duration::from_millis(1000);
            for _ in 0..50 {
                let delay = policy.delay_for_attempt(attempt);
                assert!(delay >= low && delay < high, "attempt {attempt}: {delay:?}");
            }
        }
    }

    #[test]
    fn test_delay_with_jitter_is_exact() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_with_jitter(0, 0), Duration::from_millis(1000));
        assert_eq!(policy.delay_with_jitter(3, 999), Duration::from_millis(8999));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let source = ScriptedSource::new(vec![Err("down".to_string())]);
        let started = tokio::time::Instant::now();

        let err = fetch_with_retry(&source, &RetryPolicy::default())
            .await
            .unwrap_err();

        assert_eq!(source.calls(), 5);
        assert!(matches!(err, FetchError::Exhausted { attempts: 5, .. }));
        // Four waits: 1s + 2s + 4s + 8s plus under 1s jitter each
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(15) && waited < Duration::from_secs(19));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let source = ScriptedSource::new(vec![
            Err("503".to_string()),
            Err("timeout".to_string()),
            Ok(vec![RawRecord::default()]),
        ]);

        let records = fetch_with_retry(&source, &RetryPolicy::default())
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(source.calls(), 3);
    }
}
