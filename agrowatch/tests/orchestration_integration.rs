//! Integration tests for the request orchestration core.
//!
//! These tests drive a full [`Session`] over a scripted transport:
//! - Retry, terminal errors and no-data classification
//! - Deduplication of concurrent identical queries
//! - Debounce, throttle and animation timing on a paused clock
//! - Pin validation and persistence
//!
//! Run with: `cargo test --test orchestration_integration`

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;

use agrowatch::animation::PlaybackState;
use agrowatch::fetch::{
    BoxFuture, FetchConfig, HttpTransport, RawResponse, RetryPolicy, TransportFailure,
};
use agrowatch::pins::{MemoryStorage, NewPin, PinError, PinStorage, PinStore};
use agrowatch::query::{
    BoundingBox, DateRange, HistogramQuery, Product, TimeseriesQuery,
};
use agrowatch::{QueryError, Session, SessionConfig, UserMessage};

// ============================================================================
// Helper Functions
// ============================================================================

/// Transport replaying a fixed list of replies; the last one repeats.
struct ReplayTransport {
    replies: Mutex<VecDeque<RawResponse>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ReplayTransport {
    fn new(replies: Vec<RawResponse>) -> Arc<Self> {
        Self::with_delay(replies, Duration::ZERO)
    }

    fn with_delay(replies: Vec<RawResponse>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HttpTransport for ReplayTransport {
    fn get<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, Result<RawResponse, TransportFailure>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = {
            let mut replies = self.replies.lock();
            if replies.len() > 1 {
                replies.pop_front()
            } else {
                replies.front().cloned()
            }
        };
        let delay = self.delay;
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            reply.ok_or_else(|| TransportFailure::Other("no reply scripted".into()))
        })
    }
}

fn session(transport: Arc<ReplayTransport>, retry: RetryPolicy) -> Session {
    let config = SessionConfig::new("http://127.0.0.1:8000/api/v1")
        .with_fetch(FetchConfig::default().with_retry(retry));
    Session::with_transport(config, transport).unwrap()
}

fn june_2024() -> DateRange {
    DateRange::parse("2024-06-01", "2024-06-30").unwrap()
}

fn astana_bbox() -> BoundingBox {
    BoundingBox::new(71.0, 51.0, 72.0, 52.0).unwrap()
}

fn series_body() -> RawResponse {
    RawResponse::json(&json!({
        "status": "success",
        "series": [
            {"date": "2024-06-05", "mean_ndvi": 0.42},
            {"date": "2024-06-15", "mean_ndvi": 0.55},
            {"date": "2024-06-25", "mean_ndvi": 0.61}
        ]
    }))
}

// ============================================================================
// Fetch and classification
// ============================================================================

/// A 400 carrying a no-data marker becomes a soft empty state.
#[tokio::test(start_paused = true)]
async fn test_histogram_no_data() {
    let transport = ReplayTransport::new(vec![RawResponse::new(400, "No satellite data found")]);
    let session = session(transport.clone(), RetryPolicy::default());

    let err = session
        .client()
        .histogram(&HistogramQuery::new(astana_bbox(), june_2024()))
        .await
        .unwrap_err();

    assert!(matches!(err, QueryError::NoData { .. }));
    match err.user_message() {
        Some(UserMessage::Empty(text)) => assert!(text.contains("No satellite data available")),
        other => panic!("expected empty state, got {:?}", other),
    }
    assert_eq!(transport.calls(), 1);
}

/// Three 503s then a 200 succeed on the fourth attempt with three retries.
#[tokio::test(start_paused = true)]
async fn test_timeseries_recovers_after_server_errors() {
    let transport = ReplayTransport::new(vec![
        RawResponse::new(503, "Service Unavailable"),
        RawResponse::new(503, "Service Unavailable"),
        RawResponse::new(503, "Service Unavailable"),
        series_body(),
    ]);
    let session = session(
        transport.clone(),
        RetryPolicy::exponential(3, Duration::from_secs(3)),
    );

    let series = session
        .client()
        .timeseries(&TimeseriesQuery::new(Product::Ndvi, 51.5, 71.5, june_2024()))
        .await
        .unwrap();

    assert_eq!(series.len(), 3);
    assert_eq!(series.points[2].mean, 0.61);
    assert_eq!(transport.calls(), 4);
}

/// Retry-eligible failures stop after `max_retries + 1` attempts.
#[tokio::test(start_paused = true)]
async fn test_retries_are_bounded() {
    let transport = ReplayTransport::new(vec![RawResponse::new(502, "Bad Gateway")]);
    let session = session(
        transport.clone(),
        RetryPolicy::exponential(2, Duration::from_millis(500)),
    );

    let err = session
        .client()
        .timeseries(&TimeseriesQuery::new(Product::Ndvi, 51.5, 71.5, june_2024()))
        .await
        .unwrap_err();

    assert_eq!(err, QueryError::api(502, "Bad Gateway"));
    assert!(err.user_message().is_some_and(|m| !m.is_empty_state()));
    assert_eq!(transport.calls(), 3);
}

/// A plain 400 is terminal regardless of the retry budget.
#[tokio::test(start_paused = true)]
async fn test_bad_request_is_not_retried() {
    let transport = ReplayTransport::new(vec![RawResponse::new(400, "Invalid bbox format")]);
    let session = session(
        transport.clone(),
        RetryPolicy::exponential(5, Duration::from_secs(1)),
    );

    let err = session
        .client()
        .histogram(&HistogramQuery::new(astana_bbox(), june_2024()))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(400));
    assert_eq!(transport.calls(), 1);
}

// ============================================================================
// Deduplication
// ============================================================================

/// Concurrent identical queries share one network request.
#[tokio::test(start_paused = true)]
async fn test_concurrent_identical_queries_share_request() {
    let transport = ReplayTransport::with_delay(vec![series_body()], Duration::from_millis(200));
    let session = Arc::new(session(transport.clone(), RetryPolicy::none()));
    let query = TimeseriesQuery::new(Product::Ndvi, 51.5, 71.5, june_2024());

    let mut handles = Vec::new();
    for _ in 0..5 {
        let session = Arc::clone(&session);
        let query = query.clone();
        handles.push(tokio::spawn(async move {
            session.client().timeseries(&query).await
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(transport.calls(), 1);
    assert!(results.windows(2).all(|w| w[0] == w[1]));
    assert!(session.client().registry().is_empty());

    // Settled entries are gone, so the next call goes to the network.
    session.client().timeseries(&query).await.unwrap();
    assert_eq!(transport.calls(), 2);
}

// ============================================================================
// Timers
// ============================================================================

/// Ten rapid calls collapse into one invocation with the last arguments.
#[tokio::test(start_paused = true)]
async fn test_debounce_burst() {
    let session = session(ReplayTransport::new(vec![]), RetryPolicy::none());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let debouncer = session.debouncer(move |value: u32| {
        let sink = Arc::clone(&sink);
        async move { sink.lock().push(value) }
    });

    for value in 0..10 {
        debouncer.call(value);
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(*seen.lock(), vec![9]);
}

/// Calls every 10ms for one second pass through at most ceil(1000/300)+1 times.
#[tokio::test(start_paused = true)]
async fn test_throttle_rate() {
    let session = session(ReplayTransport::new(vec![]), RetryPolicy::none());
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);

    let throttle = session.throttle(move |_: ()| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    for _ in 0..100 {
        throttle.call(());
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let invocations = count.load(Ordering::SeqCst);
    assert!(invocations >= 1);
    assert!(invocations <= 5, "throttle let {} calls through", invocations);
}

/// Playback over three dates loops 0,1,2,0,1,2,0 and queries each frame.
#[tokio::test(start_paused = true)]
async fn test_animation_loops_over_timeline() {
    let transport = ReplayTransport::new(vec![series_body()]);
    let session = Arc::new(session(transport.clone(), RetryPolicy::none()));
    let frames = Arc::new(Mutex::new(Vec::new()));

    let controller = session.animation::<DateRange>();
    let timeline = vec![
        DateRange::parse("2024-06-01", "2024-06-10").unwrap(),
        DateRange::parse("2024-06-11", "2024-06-20").unwrap(),
        DateRange::parse("2024-06-21", "2024-06-30").unwrap(),
    ];

    let tick_session = Arc::clone(&session);
    let sink = Arc::clone(&frames);
    let state = controller.start(
        timeline,
        move |index, range| {
            let session = Arc::clone(&tick_session);
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().push(index);
                let query = TimeseriesQuery::new(Product::Ndvi, 51.5, 71.5, range);
                session.client().timeseries(&query).await.map(|_| ())
            }
        },
        Duration::from_millis(100),
    );
    assert_eq!(state, PlaybackState::Playing);

    tokio::time::sleep(Duration::from_millis(750)).await;
    controller.stop();

    assert_eq!(*frames.lock(), vec![0, 1, 2, 0, 1, 2, 0]);
    assert_eq!(controller.state(), PlaybackState::Stopped);
    assert_eq!(transport.calls(), 7);
}

// ============================================================================
// Pins
// ============================================================================

/// An out-of-range latitude is rejected before anything is written.
#[test]
fn test_pin_validation_precedes_persistence() {
    let storage = Arc::new(MemoryStorage::new());
    let store = PinStore::open("ndvi", storage.clone());

    let err = store.add(NewPin::new(95.0, 10.0, "x")).unwrap_err();
    assert!(matches!(err, PinError::Validation(_)));
    assert!(store.is_empty());
    assert_eq!(storage.load("agrowatch:pins:ndvi").unwrap(), None);

    store.add(NewPin::new(51.2, 71.4, "field 7")).unwrap();
    let reopened = PinStore::open("ndvi", storage);
    assert_eq!(reopened.list()[0].name, "field 7");
}
