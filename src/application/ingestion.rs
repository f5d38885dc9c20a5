// Ingestion service - fetch cycles, working set replacement and polling
use crate::application::normalizer::normalize;
use crate::application::record_source::{FetchError, RecordSource};
use crate::application::retry::{RetryPolicy, fetch_with_retry};
use crate::domain::image::{ImageBlob, extract_file_id};
use crate::domain::session::SessionState;
use crate::domain::working_set::{DashboardState, FetchStatus, WorkingSet};
use chrono::Local;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Refreshed { records: usize, rejected: usize },
    Failed,
    /// Another cycle was still in flight
    Skipped,
}

#[derive(Clone)]
pub struct IngestionService {
    source: Arc<dyn RecordSource>,
    retry_policy: RetryPolicy,
    state: Arc<RwLock<DashboardState>>,
    in_flight: Arc<AtomicBool>,
    polling_started: Arc<AtomicBool>,
}

/// Clears the in-flight flag when the cycle ends, however it ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl IngestionService {
    pub fn new(source: Arc<dyn RecordSource>, retry_policy: RetryPolicy) -> Self {
        Self {
            source,
            retry_policy,
            state: Arc::new(RwLock::new(DashboardState::default())),
            in_flight: Arc::new(AtomicBool::new(false)),
            polling_started: Arc::new(AtomicBool::new(false)),
        }
    }

    /// One fetch cycle. The working set is swapped whole on success and left
    /// untouched on failure.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            tracing::debug!("Fetch cycle already in flight, skipping");
            return CycleOutcome::Skipped;
        };

        self.write_state().mark_loading();

        match fetch_with_retry(self.source.as_ref(), &self.retry_policy).await {
            Ok(raw) => {
                let normalized = normalize(&raw);
                let records = normalized.records.len();
                if normalized.rejected > 0 {
                    tracing::info!("Dropped {} malformed rows", normalized.rejected);
                }
                let working_set = WorkingSet::new(normalized.records, Local::now());
                if working_set.is_empty() {
                    tracing::warn!("Source returned no usable records");
                }
                self.write_state().replace(working_set);
                tracing::info!("Working set refreshed with {} records", records);
                CycleOutcome::Refreshed {
                    records,
                    rejected: normalized.rejected,
                }
            }
            Err(e) => {
                tracing::warn!("Fetch cycle failed, keeping previous data: {}", e);
                self.write_state().mark_failed(e.to_string());
                CycleOutcome::Failed
            }
        }
    }

    pub fn snapshot(&self) -> Arc<WorkingSet> {
        self.read_state().snapshot()
    }

    pub fn status(&self) -> FetchStatus {
        self.read_state().status().clone()
    }

    /// Start the fixed-interval poller. Only the first call spawns it; ticks
    /// are skipped while nobody is signed in.
    pub fn spawn_polling(
        &self,
        period: Duration,
        session: watch::Receiver<SessionState>,
    ) -> Option<JoinHandle<()>> {
        if self.polling_started.swap(true, Ordering::AcqRel) {
            tracing::debug!("Polling already started");
            return None;
        }

        let service = self.clone();
        tracing::info!("Polling source every {:?}", period);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if *session.borrow() != SessionState::Active {
                    continue;
                }
                // Cycles run detached so a slow one can overlap the next tick;
                // the in-flight guard turns the overlap into a skip.
                let cycle = service.clone();
                tokio::spawn(async move {
                    cycle.run_cycle().await;
                });
            }
        }))
    }

    /// React to sessions becoming active: the first activation starts the
    /// poller (whose first tick loads immediately), later ones refresh at once.
    pub fn follow_session(
        &self,
        period: Duration,
        mut session: watch::Receiver<SessionState>,
    ) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            while session.changed().await.is_ok() {
                if *session.borrow_and_update() != SessionState::Active {
                    continue;
                }
                if service.spawn_polling(period, session.clone()).is_none() {
                    let cycle = service.clone();
                    tokio::spawn(async move {
                        cycle.run_cycle().await;
                    });
                }
            }
        })
    }

    /// Accepts either a drive URL or a bare file id.
    pub async fn fetch_image(&self, reference: &str) -> Result<ImageBlob, FetchError> {
        let file_id = extract_file_id(reference).unwrap_or(reference.trim());
        self.source.fetch_image(file_id).await
    }

    fn read_state(&self) -> RwLockReadGuard<'_, DashboardState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, DashboardState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::retry::tests::ScriptedSource;
    use crate::domain::record::RawRecord;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn oxygen(date: &str, remain: &str) -> RawRecord {
        serde_json::from_value(json!({
            "GasName": "Oxygen",
            "Date": date,
            "Time": "",
            "Remain": remain
        }))
        .unwrap()
    }

    struct SlowSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RecordSource for SlowSource {
        async fn fetch_records(&self) -> Result<Vec<RawRecord>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![oxygen("11/05/2024", "1")])
        }

        async fn fetch_image(&self, _file_id: &str) -> Result<ImageBlob, FetchError> {
            Err(FetchError::Payload("no images".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cycle_keeps_previous_working_set() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(vec![oxygen("11/05/2024", "10"), oxygen("bad", "1")]),
            Err("down".to_string()),
        ]));
        let service = IngestionService::new(source.clone(), RetryPolicy::default());

        let first = service.run_cycle().await;
        assert_eq!(first, CycleOutcome::Refreshed { records: 1, rejected: 1 });
        let before = service.snapshot();

        let second = service.run_cycle().await;
        assert_eq!(second, CycleOutcome::Failed);
        assert_eq!(source.calls(), 6);

        let after = service.snapshot();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(after.records()[0].quantity, 10.0);
        assert!(matches!(service.status(), FetchStatus::Failed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_cycle_is_skipped() {
        let source = Arc::new(SlowSource {
            calls: AtomicUsize::new(0),
        });
        let service = IngestionService::new(source.clone(), RetryPolicy::default());

        let background = service.clone();
        let running = tokio::spawn(async move { background.run_cycle().await });
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }

        assert_eq!(service.run_cycle().await, CycleOutcome::Skipped);
        assert_eq!(
            running.await.unwrap(),
            CycleOutcome::Refreshed { records: 1, rejected: 0 }
        );
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        // Guard released once the first cycle finished
        assert!(matches!(service.run_cycle().await, CycleOutcome::Refreshed { .. }));
    }

    #[tokio::test]
    async fn test_fetch_image_accepts_url_or_id() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(Vec::new())]));
        let service = IngestionService::new(source, RetryPolicy::default());

        let blob = service
            .fetch_image("https://drive.google.com/file/d/1AbC_d-9/view?usp=sharing")
            .await
            .unwrap();
        assert_eq!(blob.base64, "1AbC_d-9");

        let blob = service.fetch_image(" img42 ").await.unwrap();
        assert_eq!(blob.base64, "img42");

        assert!(service.fetch_image("missing-file").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_waits_for_active_session() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(vec![oxygen("11/05/2024", "5")])]));
        let service = IngestionService::new(source.clone(), RetryPolicy::default());
        let (session_tx, session_rx) = watch::channel(SessionState::LoggedOut);

        let handle = service
            .spawn_polling(Duration::from_secs(30), session_rx.clone())
            .unwrap();
        assert!(service.spawn_polling(Duration::from_secs(30), session_rx).is_none());

        tokio::time::sleep(Duration::from_secs(65)).await;
        assert_eq!(source.calls(), 0);

        session_tx.send(SessionState::Active).unwrap();
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(source.calls(), 2);
        assert_eq!(service.snapshot().len(), 1);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_sign_in_triggers_a_load() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(vec![oxygen("11/05/2024", "5")])]));
        let service = IngestionService::new(source.clone(), RetryPolicy::default());
        let (session_tx, session_rx) = watch::channel(SessionState::LoggedOut);
        let follower = service.follow_session(Duration::from_secs(30), session_rx);

        session_tx.send(SessionState::Active).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.calls(), 1);

        session_tx.send(SessionState::LoggedOut).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        session_tx.send(SessionState::Active).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.calls(), 2);

        follower.abort();
    }
}
