//! In-flight request registry.
//!
//! At most one operation runs per [`QueryKey`]. Callers that arrive while an
//! operation is pending attach to it and receive the same settled result. The
//! entry is removed when the operation settles, whether it succeeded or not,
//! so a failure never poisons later calls with the same key.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{FutureExt, Shared};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{QueryError, QueryResult};
use crate::fetch::BoxFuture;

use super::key::QueryKey;

type SharedResult<T> = Shared<BoxFuture<'static, QueryResult<T>>>;

struct InFlight<T: Clone> {
    id: u64,
    result: SharedResult<T>,
    cancel: CancellationToken,
}

/// Registry of pending operations keyed by [`QueryKey`].
pub struct InFlightRegistry<T: Clone> {
    entries: Arc<DashMap<QueryKey, InFlight<T>>>,
    next_id: AtomicU64,
}

impl<T> Default for InFlightRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> InFlightRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Join the pending operation for `key`, or start one with `factory`.
    ///
    /// The operation runs on its own task, so it settles (and leaves the
    /// registry) even if every caller stops waiting. `factory` is called
    /// without holding any registry lock, so it may use the registry itself.
    /// If another caller registers the key while `factory` runs, that
    /// operation is joined and the freshly built one is dropped unpolled.
    pub async fn get_or_create<F, Fut>(&self, key: QueryKey, factory: F) -> QueryResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = QueryResult<T>> + Send + 'static,
    {
        let joined = self.entries.get(&key).map(|entry| entry.result.clone());
        if let Some(result) = joined {
            debug!(key = %key, "Joining in-flight request");
            return result.await;
        }

        let operation = factory();

        let result = match self.entries.entry(key.clone()) {
            Entry::Occupied(entry) => {
                debug!(key = %key, "Joining in-flight request");
                entry.get().result.clone()
            }
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let cancel = CancellationToken::new();

                let entries = Arc::clone(&self.entries);
                let token = cancel.clone();
                let task_key = key.clone();
                let handle = tokio::spawn(async move {
                    let result = tokio::select! {
                        biased;
                        _ = token.cancelled() => Err(QueryError::Cancelled),
                        result = operation => result,
                    };
                    entries.remove_if(&task_key, |_, entry| entry.id == id);
                    debug!(key = %task_key, ok = result.is_ok(), "In-flight request settled");
                    result
                });

                let result: BoxFuture<'static, QueryResult<T>> = Box::pin(async move {
                    match handle.await {
                        Ok(result) => result,
                        Err(e) if e.is_cancelled() => Err(QueryError::Cancelled),
                        Err(e) => Err(QueryError::Network(format!("request task failed: {}", e))),
                    }
                });
                let result = result.shared();

                slot.insert(InFlight {
                    id,
                    result: result.clone(),
                    cancel,
                });
                debug!(key = %key, "Started request");
                result
            }
        };

        result.await
    }

    /// Cancel the pending operation for `key`.
    ///
    /// Every attached caller settles with [`QueryError::Cancelled`]. Returns
    /// whether an operation was pending.
    pub fn cancel(&self, key: &QueryKey) -> bool {
        match self.entries.remove(key) {
            Some((_, entry)) => {
                entry.cancel.cancel();
                debug!(key = %key, "Cancelled in-flight request");
                true
            }
            None => false,
        }
    }

    /// Cancel every pending operation.
    pub fn cancel_all(&self) {
        let keys: Vec<QueryKey> = self.entries.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            self.cancel(&key);
        }
    }

    /// Whether an operation is pending for `key`.
    pub fn is_in_flight(&self, key: &QueryKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of pending operations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no operation is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
