// Working set - the records of one fetch cycle and the state views read from
use super::record::CanonicalRecord;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::sync::Arc;

/// All canonical records of a single fetch cycle, latest first.
#[derive(Debug, Clone, Default)]
pub struct WorkingSet {
    records: Vec<CanonicalRecord>,
    built_at: Option<DateTime<Local>>,
}

impl WorkingSet {
    pub fn new(mut records: Vec<CanonicalRecord>, built_at: DateTime<Local>) -> Self {
        // Stable, so equal timestamps keep their source order
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Self {
            records,
            built_at: Some(built_at),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[CanonicalRecord] {
        &self.records
    }

    pub fn latest_record(&self) -> Option<&CanonicalRecord> {
        self.records.first()
    }

    pub fn built_at(&self) -> Option<DateTime<Local>> {
        self.built_at
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FetchStatus {
    Idle,
    Loading,
    Updated { at: DateTime<Local> },
    Failed { at: DateTime<Local>, message: String },
}

/// Application state owned by the ingestion pipeline. Views only ever get an
/// `Arc` snapshot of the working set, never a half-replaced one.
#[derive(Debug, Clone)]
pub struct DashboardState {
    working_set: Arc<WorkingSet>,
    status: FetchStatus,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self {
            working_set: Arc::new(WorkingSet::empty()),
            status: FetchStatus::Idle,
        }
    }
}

impl DashboardState {
    pub fn snapshot(&self) -> Arc<WorkingSet> {
        self.working_set.clone()
    }

    pub fn status(&self) -> &FetchStatus {
        &self.status
    }

    pub fn mark_loading(&mut self) {
        self.status = FetchStatus::Loading;
    }

    pub fn replace(&mut self, working_set: WorkingSet) {
        let at = working_set.built_at().unwrap_or_else(Local::now);
        self.working_set = Arc::new(working_set);
        self.status = FetchStatus::Updated { at };
    }

    pub fn mark_failed(&mut self, message: String) {
        self.status = FetchStatus::Failed {
            at: Local::now(),
            message,
        };
    }
}
