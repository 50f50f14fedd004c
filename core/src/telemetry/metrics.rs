use crate::model::TrialResult;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Counters describing scoring activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub scored: usize,
    pub hits: usize,
    pub misses: usize,
    pub unscorable: usize,
    pub strategy_failures: usize,
}

pub struct MetricsRecorder {
    inner: Mutex<MetricsSnapshot>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    pub fn record_result(&self, result: TrialResult) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.scored += 1;
            match result {
                TrialResult::Hit => metrics.hits += 1,
                TrialResult::Miss => metrics.misses += 1,
                TrialResult::Unscorable => metrics.unscorable += 1,
                TrialResult::Unscored | TrialResult::ManualFeed => {}
            }
        }
    }

    pub fn record_strategy_failure(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.strategy_failures += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner
            .lock()
            .map(|metrics| *metrics)
            .unwrap_or_default()
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorder_counts_results_by_kind() {
        let recorder = MetricsRecorder::new();
        recorder.record_result(TrialResult::Hit);
        recorder.record_result(TrialResult::Miss);
        recorder.record_result(TrialResult::Unscorable);
        recorder.record_strategy_failure();

        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.scored, 3);
        assert_eq!(snapshot.hits, 1);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.unscorable, 1);
        assert_eq!(snapshot.strategy_failures, 1);
    }
}
