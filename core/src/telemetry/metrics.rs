use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Task outcome counters, grouped by action name.
pub struct MetricsRecorder {
    inner: Mutex<BTreeMap<String, ActionCounts>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActionCounts {
    pub completed: usize,
    pub failed: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn record_completed(&self, action: &str) {
        if let Ok(mut counts) = self.inner.lock() {
            counts.entry(action.to_string()).or_default().completed += 1;
        }
    }

    pub fn record_failed(&self, action: &str) {
        if let Ok(mut counts) = self.inner.lock() {
            counts.entry(action.to_string()).or_default().failed += 1;
        }
    }

    pub fn snapshot(&self) -> BTreeMap<String, ActionCounts> {
        self.inner
            .lock()
            .map(|counts| counts.clone())
            .unwrap_or_default()
    }

    /// Totals across every action.
    pub fn totals(&self) -> ActionCounts {
        self.snapshot()
            .values()
            .fold(ActionCounts::default(), |acc, counts| ActionCounts {
                completed: acc.completed + counts.completed,
                failed: acc.failed + counts.failed,
            })
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
