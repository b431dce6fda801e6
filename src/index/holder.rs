//! Searcher lifecycle.
//!
//! The holder publishes at most one "current" read-only view of the index
//! while older views stay valid for readers that already acquired them. A
//! view bundles the library searcher with a materialized array of stored
//! fields per document so projections never reopen the document store.
//!
//! Publication is a lock-free pointer swap; release of the previous view is
//! refcount-driven and can be awaited with a bounded timeout at shutdown.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::{Condvar, Mutex};
use tantivy::schema::OwnedValue;
use tantivy::{DocAddress, Searcher, TantivyDocument};
use tracing::debug;

use crate::error::Result;

/// Stored fields of one document, in schema-field order, preserving
/// multiplicity for array reconstruction.
pub type StoredDoc = Vec<(String, serde_json::Value)>;

fn value_to_json(value: &OwnedValue) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

/// One published read-only view: searcher, stored-fields array, generation
/// and a strong-reference count. Destroyed when the count drops to zero
/// and the view is no longer current.
pub struct SearcherState {
    searcher: Searcher,
    generation: u64,
    stored: Vec<Vec<Option<StoredDoc>>>,
    refs: AtomicUsize,
    drained: Mutex<bool>,
    released: Condvar,
}

impl SearcherState {
    /// Materialize the stored fields of every live document and wrap the
    /// searcher into a publishable state. The state starts with one strong
    /// reference, owned by the holder once published.
    pub fn new(searcher: Searcher, generation: u64) -> Result<Arc<SearcherState>> {
        let schema = searcher.schema().clone();
        let mut stored = Vec::with_capacity(searcher.segment_readers().len());
        for (segment_ord, segment_reader) in searcher.segment_readers().iter().enumerate() {
            let alive = segment_reader.alive_bitset();
            let max_doc = segment_reader.max_doc();
            let mut docs: Vec<Option<StoredDoc>> = Vec::with_capacity(max_doc as usize);
            for doc_id in 0..max_doc {
                if alive.map(|bitset| !bitset.is_alive(doc_id)).unwrap_or(false) {
                    docs.push(None);
                    continue;
                }
                let doc: TantivyDocument =
                    searcher.doc(DocAddress::new(segment_ord as u32, doc_id))?;
                let mut fields: StoredDoc = Vec::new();
                for (field, field_entry) in schema.fields() {
                    for value in doc.get_all(field) {
                        fields.push((field_entry.name().to_string(), value_to_json(value)));
                    }
                }
                docs.push(Some(fields));
            }
            stored.push(docs);
        }

        Ok(Arc::new(SearcherState {
            searcher,
            generation,
            stored,
            refs: AtomicUsize::new(1),
            drained: Mutex::new(false),
            released: Condvar::new(),
        }))
    }

    pub fn searcher(&self) -> &Searcher {
        &self.searcher
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn stored_for(&self, address: DocAddress) -> Option<&StoredDoc> {
        self.stored
            .get(address.segment_ord as usize)
            .and_then(|segment| segment.get(address.doc_id as usize))
            .and_then(|doc| doc.as_ref())
    }

    pub fn strong_count(&self) -> usize {
        self.refs.load(Ordering::SeqCst)
    }

    fn release(self: &Arc<SearcherState>) {
        if self.refs.fetch_sub(1, Ordering::SeqCst) == 1 {
            *self.drained.lock() = true;
            self.released.notify_all();
            debug!(generation = self.generation, "searcher state released");
        }
    }
}

/// Guard over one acquired view; releases its reference on drop, on every
/// exit path.
pub struct SearcherGuard {
    state: Arc<SearcherState>,
}

impl SearcherGuard {
    pub fn state(&self) -> &SearcherState {
        &self.state
    }
}

impl std::ops::Deref for SearcherGuard {
    type Target = SearcherState;

    fn deref(&self) -> &SearcherState {
        &self.state
    }
}

impl Drop for SearcherGuard {
    fn drop(&mut self) {
        self.state.release();
    }
}

/// Completion handle returned by a publication that asked to wait for the
/// previous view's readers.
pub struct ReleaseHandle {
    state: Arc<SearcherState>,
}

impl ReleaseHandle {
    /// Wait until the previous state has been released by its last reader.
    /// Returns false on timeout; callers log and continue.
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut drained = self.state.drained.lock();
        if *drained {
            return true;
        }
        !self
            .state
            .released
            .wait_for(&mut drained, timeout)
            .timed_out()
            || *drained
    }
}

/// Publishes searcher states. See the module docs for the lifecycle rules.
pub struct SearcherHolder {
    current: ArcSwap<SearcherState>,
    generation: AtomicU64,
}

impl SearcherHolder {
    pub fn new(searcher: Searcher) -> Result<SearcherHolder> {
        let state = SearcherState::new(searcher, 0)?;
        Ok(SearcherHolder {
            current: ArcSwap::from(state),
            generation: AtomicU64::new(0),
        })
    }

    /// Atomically publish a fresh view over `searcher`. The previous view
    /// is released, not destroyed; with `wait` the caller gets a handle
    /// that signals once the previous view's last reader is gone.
    pub fn publish(&self, searcher: Searcher, wait: bool) -> Result<Option<ReleaseHandle>> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let state = SearcherState::new(searcher, generation)?;
        let previous = self.current.swap(state);
        let handle = wait.then(|| ReleaseHandle {
            state: Arc::clone(&previous),
        });
        previous.release();
        Ok(handle)
    }

    /// Acquire the current view and a release guard. Also exposes the
    /// materialized stored-fields array through the state.
    pub fn acquire(&self) -> SearcherGuard {
        let state = self.current.load_full();
        state.refs.fetch_add(1, Ordering::SeqCst);
        SearcherGuard { state }
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tantivy::schema::{Schema, STORED, TEXT};
    use tantivy::{doc, Index};

    fn searcher_with_docs(texts: &[&str]) -> Searcher {
        let mut builder = Schema::builder();
        let body = builder.add_text_field("body", TEXT | STORED);
        let index = Index::create_in_ram(builder.build());
        let mut writer = index.writer(15_000_000).unwrap();
        for text in texts {
            writer.add_document(doc!(body => *text)).unwrap();
        }
        writer.commit().unwrap();
        let reader = index.reader().unwrap();
        reader.searcher()
    }

    #[test]
    fn acquire_sees_materialized_stored_fields() {
        let holder = SearcherHolder::new(searcher_with_docs(&["hello"])).unwrap();
        let guard = holder.acquire();
        let stored = guard.stored_for(DocAddress::new(0, 0)).unwrap();
        assert_eq!(stored[0].0, "body");
        assert_eq!(stored[0].1, serde_json::json!("hello"));
    }

    #[test]
    fn publication_releases_previous_state_after_last_reader() {
        let holder = SearcherHolder::new(searcher_with_docs(&["one"])).unwrap();
        let old_guard = holder.acquire();
        let old_generation = old_guard.generation();

        let handle = holder
            .publish(searcher_with_docs(&["one", "two"]), true)
            .unwrap()
            .unwrap();
        // Reader still out: the wait must time out.
        assert!(!handle.wait(Duration::from_millis(20)));

        let new_guard = holder.acquire();
        assert_eq!(new_guard.generation(), old_generation + 1);

        drop(old_guard);
        assert!(handle.wait(Duration::from_millis(500)));
    }

    #[test]
    fn old_view_stays_usable_across_publications() {
        let holder = SearcherHolder::new(searcher_with_docs(&["first"])).unwrap();
        let guard = holder.acquire();
        holder
            .publish(searcher_with_docs(&["first", "second"]), false)
            .unwrap();
        // The pre-publication view still answers with its own snapshot.
        assert_eq!(guard.searcher().num_docs(), 1);
        assert_eq!(holder.acquire().searcher().num_docs(), 2);
    }
}
