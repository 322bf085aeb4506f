//! Event loading guarded against out-of-order responses.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::error::QueryResult;
use crate::stale::StaleGuard;

use super::client::QueryClient;
use super::models::EventFeed;
use super::requests::EventsQuery;

/// Stream name for event loading in the [`StaleGuard`].
pub const EVENTS_STREAM: &str = "events";

/// Loads event feeds where only the newest request may update state.
///
/// When filters change faster than responses return, responses to older
/// requests are discarded, and only the newest request clears the loading
/// indicator.
pub struct EventLoader {
    client: Arc<QueryClient>,
    guard: Arc<StaleGuard>,
    loading: AtomicBool,
}

impl EventLoader {
    /// Create a loader sharing the session's client and guard.
    pub fn new(client: Arc<QueryClient>, guard: Arc<StaleGuard>) -> Self {
        Self {
            client,
            guard,
            loading: AtomicBool::new(false),
        }
    }

    /// Load a page of events.
    ///
    /// Returns `None` when a newer load was issued while this one was in
    /// flight; the caller must not apply anything in that case.
    pub async fn load(&self, query: &EventsQuery) -> Option<QueryResult<EventFeed>> {
        let token = self.guard.begin(EVENTS_STREAM);
        self.loading.store(true, Ordering::SeqCst);

        let result = self.client.events(query).await;

        if !self.guard.is_current(&token) {
            debug!(token = token.value(), "Dropping superseded event response");
            return None;
        }
        self.loading.store(false, Ordering::SeqCst);
        Some(result)
    }

    /// Whether a load is in progress.
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }
}
