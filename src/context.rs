//! Construction context for an index: the hookable clock, the alert sink
//! used by the error quarantine, the external stats store, and the
//! cancellation token threaded through indexing and query iteration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::{Error, Result};

/// Hookable clock. Production uses [`SystemClock`]; tests may freeze time.
pub trait Clock: Send + Sync {
    fn utc_now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Receives user-facing alerts, e.g. when an index is quarantined.
pub trait AlertSink: Send + Sync {
    fn alert(&self, title: &str, message: &str);
}

/// Default sink: alerts go to the log.
#[derive(Debug, Default)]
pub struct TracingAlerts;

impl AlertSink for TracingAlerts {
    fn alert(&self, title: &str, message: &str) {
        warn!("ALERT: {title}: {message}");
    }
}

/// Per-batch stats persisted to the external transactional store.
#[derive(Debug, Clone)]
pub struct StatsUpdate {
    pub index_id: u32,
    pub indexing_attempts: u64,
    pub indexing_errors: u64,
    pub reduce_attempts: u64,
    pub reduce_errors: u64,
}

/// Contract of the external document store's stats table. Updates may fail
/// with [`Error::ConcurrencyConflict`], which the engine retries.
pub trait StatsStore: Send + Sync {
    fn update(&self, update: &StatsUpdate) -> Result<()>;
}

const STATS_RETRY_ATTEMPTS: usize = 10;
const STATS_RETRY_BACKOFF: Duration = Duration::from_millis(11);

/// Retry a stats update through concurrency conflicts; other errors
/// propagate immediately.
pub(crate) fn update_stats_with_retry(
    store: &dyn StatsStore,
    update: &StatsUpdate,
) -> Result<()> {
    let mut attempt = 0;
    loop {
        match store.update(update) {
            Err(Error::ConcurrencyConflict) if attempt + 1 < STATS_RETRY_ATTEMPTS => {
                attempt += 1;
                std::thread::sleep(STATS_RETRY_BACKOFF);
            }
            other => return other,
        }
    }
}

/// Cooperative cancellation for batch application and query iteration.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Everything an [`crate::index::Index`] needs injected at construction.
pub struct IndexContext {
    pub clock: Arc<dyn Clock>,
    pub alerts: Arc<dyn AlertSink>,
    pub stats_store: Option<Arc<dyn StatsStore>>,
}

impl Default for IndexContext {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            alerts: Arc::new(TracingAlerts),
            stats_store: None,
        }
    }
}
