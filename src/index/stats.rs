//! Per-index bookkeeping: priority, write-error quarantine, the bounded
//! performance-stats queue and the bounded error log. Everything here is
//! read concurrently by monitoring surfaces, so state lives in atomics and
//! short critical sections.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Scheduling priority of one index. `Error` is terminal for the process
/// lifetime unless reset externally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexingPriority {
    Normal,
    Idle,
    Disabled,
    Abandoned,
    Forced,
    Error,
}

impl IndexingPriority {
    fn from_u8(value: u8) -> IndexingPriority {
        match value {
            0 => IndexingPriority::Normal,
            1 => IndexingPriority::Idle,
            2 => IndexingPriority::Disabled,
            3 => IndexingPriority::Abandoned,
            4 => IndexingPriority::Forced,
            _ => IndexingPriority::Error,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            IndexingPriority::Normal => 0,
            IndexingPriority::Idle => 1,
            IndexingPriority::Disabled => 2,
            IndexingPriority::Abandoned => 3,
            IndexingPriority::Forced => 4,
            IndexingPriority::Error => 5,
        }
    }
}

/// Lock-free priority cell enforcing the one-way `Error` transition.
pub struct AtomicPriority(AtomicU8);

impl AtomicPriority {
    pub fn new(priority: IndexingPriority) -> Self {
        Self(AtomicU8::new(priority.as_u8()))
    }

    pub fn get(&self) -> IndexingPriority {
        IndexingPriority::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Set the priority. Leaving `Error` is refused; use
    /// [`AtomicPriority::reset_error`] for the explicit external reset.
    pub fn set(&self, priority: IndexingPriority) {
        let _ = self.0.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
            if IndexingPriority::from_u8(current) == IndexingPriority::Error {
                None
            } else {
                Some(priority.as_u8())
            }
        });
    }

    /// External administrative reset out of the `Error` state.
    pub fn reset_error(&self, priority: IndexingPriority) {
        self.0.store(priority.as_u8(), Ordering::SeqCst);
    }
}

/// Counts consecutive write failures. Crossing the threshold quarantines
/// the index; the counter resets on the next successful commit.
pub struct WriteErrorCounter {
    errors: AtomicU32,
}

pub const WRITE_ERROR_THRESHOLD: u32 = 10;

impl Default for WriteErrorCounter {
    fn default() -> Self {
        Self {
            errors: AtomicU32::new(0),
        }
    }
}

impl WriteErrorCounter {
    /// Record one failure; returns true exactly when the threshold is
    /// crossed so the caller raises the alert once.
    pub fn record_failure(&self) -> bool {
        self.errors.fetch_add(1, Ordering::SeqCst) + 1 == WRITE_ERROR_THRESHOLD
    }

    pub fn record_success(&self) {
        self.errors.store(0, Ordering::SeqCst);
    }

    pub fn current(&self) -> u32 {
        self.errors.load(Ordering::SeqCst)
    }
}

/// What one batch did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchOperation {
    Map,
    Reduce,
    Ignore,
}

/// One entry of the rolling performance queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingPerformanceStats {
    pub input_count: usize,
    pub output_count: usize,
    pub operation: BatchOperation,
    pub started: DateTime<Utc>,
    pub duration: Duration,
}

pub const PERFORMANCE_QUEUE_CAPACITY: usize = 25;

/// Multi-producer rolling queue of the last 25 batch statistics.
#[derive(Default)]
pub struct PerformanceStatsQueue {
    entries: Mutex<VecDeque<IndexingPerformanceStats>>,
}

impl PerformanceStatsQueue {
    pub fn push(&self, stats: IndexingPerformanceStats) {
        let mut entries = self.entries.lock();
        if entries.len() == PERFORMANCE_QUEUE_CAPACITY {
            entries.pop_front();
        }
        entries.push_back(stats);
    }

    pub fn snapshot(&self) -> Vec<IndexingPerformanceStats> {
        self.entries.lock().iter().cloned().collect()
    }
}

/// One structured per-index error record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingError {
    pub index_id: u32,
    pub document_key: Option<String>,
    pub message: String,
    /// Which stage produced the error ("map", "write", "reduce", ...).
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

const ERROR_LOG_CAPACITY: usize = 500;

/// Bounded per-index error log. Per-document failures land here and never
/// abort the batch that produced them.
#[derive(Default)]
pub struct ErrorLog {
    entries: Mutex<VecDeque<IndexingError>>,
}

impl ErrorLog {
    pub fn record(&self, error: IndexingError) {
        let mut entries = self.entries.lock();
        if entries.len() == ERROR_LOG_CAPACITY {
            entries.pop_front();
        }
        entries.push_back(error);
    }

    pub fn snapshot(&self) -> Vec<IndexingError> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_priority_is_one_way() {
        let priority = AtomicPriority::new(IndexingPriority::Normal);
        priority.set(IndexingPriority::Idle);
        assert_eq!(priority.get(), IndexingPriority::Idle);

        priority.set(IndexingPriority::Error);
        priority.set(IndexingPriority::Normal);
        assert_eq!(priority.get(), IndexingPriority::Error);

        priority.reset_error(IndexingPriority::Normal);
        assert_eq!(priority.get(), IndexingPriority::Normal);
    }

    #[test]
    fn write_error_counter_fires_once_at_threshold() {
        let counter = WriteErrorCounter::default();
        let mut fired = 0;
        for _ in 0..WRITE_ERROR_THRESHOLD + 5 {
            if counter.record_failure() {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);
        counter.record_success();
        assert_eq!(counter.current(), 0);
    }

    #[test]
    fn performance_queue_is_bounded() {
        let queue = PerformanceStatsQueue::default();
        for i in 0..40 {
            queue.push(IndexingPerformanceStats {
                input_count: i,
                output_count: i,
                operation: BatchOperation::Map,
                started: Utc::now(),
                duration: Duration::from_millis(1),
            });
        }
        let snapshot = queue.snapshot();
        assert_eq!(snapshot.len(), PERFORMANCE_QUEUE_CAPACITY);
        assert_eq!(snapshot.first().unwrap().input_count, 15);
    }
}
