//! Performance metrics for database isolation operations (spec §4.6 /
//! SPEC_FULL §2): a bounded ring buffer of the last 1000 timed operations,
//! with average-duration accessors per operation name and per strategy.
use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::strategy::IsolationStrategy;

const MAX_ENTRIES: usize = 1000;

#[derive(Debug, Clone)]
pub struct OperationMetric {
    pub operation: String,
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
    pub worker_id: String,
    pub strategy: IsolationStrategy,
}

#[derive(Debug, Default)]
pub struct MetricsRecorder {
    entries: VecDeque<OperationMetric>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, metric: OperationMetric) {
        if self.entries.len() >= MAX_ENTRIES {
            self.entries.pop_front();
        }
        self.entries.push_back(metric);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn average_duration(&self, operation: &str) -> Option<Duration> {
        average(self.entries.iter().filter(|m| m.operation == operation))
    }

    pub fn average_duration_for_strategy(&self, strategy: IsolationStrategy) -> Option<Duration> {
        average(self.entries.iter().filter(|m| m.strategy == strategy))
    }
}

fn average<'a>(metrics: impl Iterator<Item = &'a OperationMetric>) -> Option<Duration> {
    let (count, total) = metrics.fold((0u32, Duration::ZERO), |(count, total), m| {
        (count + 1, total + m.duration)
    });
    if count == 0 {
        None
    } else {
        Some(total / count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(operation: &str, millis: u64, strategy: IsolationStrategy) -> OperationMetric {
        OperationMetric {
            operation: operation.to_string(),
            duration: Duration::from_millis(millis),
            timestamp: Utc::now(),
            worker_id: "w1".to_string(),
            strategy,
        }
    }

    #[test]
    fn averages_by_operation_name() {
        let mut recorder = MetricsRecorder::new();
        recorder.record(metric("create_savepoint", 10, IsolationStrategy::Savepoint));
        recorder.record(metric("create_savepoint", 20, IsolationStrategy::Savepoint));
        recorder.record(metric("create_schema", 100, IsolationStrategy::Schema));

        assert_eq!(
            recorder.average_duration("create_savepoint"),
            Some(Duration::from_millis(15))
        );
        assert_eq!(
            recorder.average_duration_for_strategy(IsolationStrategy::Schema),
            Some(Duration::from_millis(100))
        );
        assert_eq!(recorder.average_duration("unknown_operation"), None);
    }

    #[test]
    fn evicts_oldest_entry_past_capacity() {
        let mut recorder = MetricsRecorder::new();
        for i in 0..MAX_ENTRIES + 10 {
            recorder.record(metric("op", i as u64, IsolationStrategy::Savepoint));
        }
        assert_eq!(recorder.len(), MAX_ENTRIES);
    }
}
