//! Per-session orchestration context.
//!
//! A [`Session`] owns every piece of shared mutable state: the query client
//! with its in-flight registry, the stale-response guard, the map-move slot
//! and the pin stores. Sessions are independent; two sessions in one process
//! never share registries or counters.
//!
//! # Example
//!
//! ```ignore
//! use agrowatch::config::ConfigFile;
//! use agrowatch::session::{Session, SessionConfig};
//!
//! let config = SessionConfig::from_config_file(&ConfigFile::load()?);
//! let session = Session::new(config)?;
//!
//! let health = session.client().health().await?;
//! let pins = session.pins("ndvi");
//! ```

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::info;

use crate::animation::{AnimationController, DEFAULT_INTERVAL_MS};
use crate::config::ConfigFile;
use crate::dedup::SupersedingSlot;
use crate::error::QueryResult;
use crate::fetch::{FetchConfig, HttpTransport, ReqwestTransport, ResilientFetcher};
use crate::pins::{FileStorage, MemoryStorage, PinStorage, PinStore};
use crate::query::{EventLoader, QueryClient, ResourceQuery, DEFAULT_BASE_URL};
use crate::schedule::{Debouncer, Throttle, DEFAULT_DEBOUNCE_MS, DEFAULT_THROTTLE_MS};
use crate::stale::StaleGuard;

/// Where pins are persisted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PinStoreConfig {
    /// Directory for [`FileStorage`]; in-memory storage when `None`.
    pub directory: Option<PathBuf>,
    /// Byte quota; unbounded when `None`.
    pub quota_bytes: Option<u64>,
}

impl PinStoreConfig {
    /// In-memory pins that last for the session.
    pub fn memory() -> Self {
        Self::default()
    }

    /// File-backed pins in `directory`.
    pub fn directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: Some(directory.into()),
            quota_bytes: None,
        }
    }

    pub fn with_quota(mut self, quota_bytes: u64) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }

    fn build(&self) -> Arc<dyn PinStorage> {
        match &self.directory {
            Some(dir) => Arc::new(FileStorage::new(dir.clone()).with_quota(self.quota_bytes)),
            None => match self.quota_bytes {
                Some(quota) => Arc::new(MemoryStorage::with_quota(quota)),
                None => Arc::new(MemoryStorage::new()),
            },
        }
    }
}

/// Runtime configuration for a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub base_url: String,
    pub fetch: FetchConfig,
    pub pins: PinStoreConfig,
    pub debounce: Duration,
    pub throttle: Duration,
    pub animation_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            fetch: FetchConfig::default(),
            pins: PinStoreConfig::memory(),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            throttle: Duration::from_millis(DEFAULT_THROTTLE_MS),
            animation_interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
        }
    }
}

impl SessionConfig {
    /// Defaults pointed at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Build from the configuration file, with file-backed pins.
    pub fn from_config_file(file: &ConfigFile) -> Self {
        Self {
            base_url: file.api.base_url.clone(),
            fetch: file.fetch_config(),
            pins: PinStoreConfig::directory(file.pins_dir()).with_quota(file.pins.quota_bytes),
            debounce: Duration::from_millis(file.ui.debounce_ms),
            throttle: Duration::from_millis(file.ui.throttle_ms),
            animation_interval: Duration::from_millis(file.animation.interval_ms),
        }
    }

    pub fn with_fetch(mut self, fetch: FetchConfig) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn with_pins(mut self, pins: PinStoreConfig) -> Self {
        self.pins = pins;
        self
    }

    pub fn with_debounce(mut self, delay: Duration) -> Self {
        self.debounce = delay;
        self
    }

    pub fn with_throttle(mut self, interval: Duration) -> Self {
        self.throttle = interval;
        self
    }

    pub fn with_animation_interval(mut self, interval: Duration) -> Self {
        self.animation_interval = interval;
        self
    }

    /// Hard per-request ceiling for the reqwest transport: the longest
    /// configured attempt timeout.
    pub fn transport_ceiling(&self) -> Duration {
        self.fetch.max_timeout()
    }
}

/// Owns the shared state of one application session.
pub struct Session {
    client: Arc<QueryClient>,
    stale: Arc<StaleGuard>,
    map_move: SupersedingSlot,
    events: EventLoader,
    pin_storage: Arc<dyn PinStorage>,
    pin_stores: DashMap<String, Arc<PinStore>>,
    config: SessionConfig,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("client", &self.client)
            .field("pin_streams", &self.pin_stores.len())
            .finish()
    }
}

impl Session {
    /// Create a session talking HTTP through reqwest.
    pub fn new(config: SessionConfig) -> QueryResult<Self> {
        let transport = ReqwestTransport::with_timeout(config.transport_ceiling())?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a session over a custom transport.
    pub fn with_transport(
        config: SessionConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> QueryResult<Self> {
        let fetcher = ResilientFetcher::new(transport, config.fetch.clone());
        let client = Arc::new(QueryClient::new(&config.base_url, fetcher)?);
        let stale = Arc::new(StaleGuard::new());
        let events = EventLoader::new(Arc::clone(&client), Arc::clone(&stale));

        info!(base_url = client.base_url(), "Session started");

        Ok(Self {
            client,
            stale,
            map_move: SupersedingSlot::new("map-move"),
            events,
            pin_storage: config.pins.build(),
            pin_stores: DashMap::new(),
            config,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Shared query client.
    pub fn client(&self) -> &Arc<QueryClient> {
        &self.client
    }

    /// Stale-response guard for UI streams.
    pub fn stale_guard(&self) -> &Arc<StaleGuard> {
        &self.stale
    }

    /// Event loader for the `events` stream.
    pub fn events(&self) -> &EventLoader {
        &self.events
    }

    /// Slot for queries triggered by map movement.
    pub fn map_move(&self) -> &SupersedingSlot {
        &self.map_move
    }

    /// Run a map-move query. Starting one cancels the previous one, which
    /// then resolves to [`QueryError::Cancelled`](crate::QueryError::Cancelled).
    pub async fn on_map_move<Q: ResourceQuery>(&self, query: &Q) -> QueryResult<Q::Output> {
        let client = Arc::clone(&self.client);
        self.map_move
            .run(|token| async move { client.query_with(query, token).await })
            .await
    }

    /// Pin store for `stream`, opened on first use.
    pub fn pins(&self, stream: &str) -> Arc<PinStore> {
        self.pin_stores
            .entry(stream.to_string())
            .or_insert_with(|| Arc::new(PinStore::open(stream, Arc::clone(&self.pin_storage))))
            .clone()
    }

    /// New stopped animation controller. Play it at
    /// [`SessionConfig::animation_interval`].
    pub fn animation<T>(&self) -> AnimationController<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        AnimationController::new()
    }

    /// Debouncer with the session's quiet period.
    pub fn debouncer<A, F, Fut>(&self, action: F) -> Debouncer<A>
    where
        A: Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Debouncer::new(self.config.debounce, action)
    }

    /// Throttle with the session's minimum interval.
    pub fn throttle<A, F>(&self, action: F) -> Throttle<A>
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        Throttle::new(self.config.throttle, action)
    }

    /// Cancel everything in flight.
    pub fn shutdown(&self) {
        self.map_move.abort();
        self.client.registry().cancel_all();
        info!("Session shut down");
    }
}
