//! End-to-end tests for the tracker pipeline
//!
//! These run on tokio's paused clock, so batch timeouts elapse instantly and
//! deterministically. Deliveries go to an in-memory transport.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pagebeacon_core::signals::ScrollSample;
use pagebeacon_core::{Error, EventPayload, Result, Tracker, TrackerConfig, Transport};
use serde_json::{json, Value};
use tokio::time::{sleep, timeout, Instant};

/// Records each payload and fails the ones matching `fail_on`
#[derive(Default)]
struct MemoryTransport {
    sent: Mutex<Vec<Value>>,
    fail_on: Option<(String, Value)>,
}

impl MemoryTransport {
    fn failing_on(key: &str, value: Value) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_on: Some((key.to_string(), value)),
        }
    }

    fn sent(&self) -> Vec<Value> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, payload: &EventPayload) -> Result<Value> {
        self.sent.lock().unwrap().push(payload.to_json());
        if let Some((key, value)) = &self.fail_on {
            if payload.field(key) == Some(value) {
                return Err(Error::Delivery("connection reset".to_string()));
            }
        }
        Ok(json!({"status": "ok"}))
    }
}

/// Notes the virtual time at which each payload arrived
struct TimedTransport {
    start: Instant,
    arrivals: Mutex<Vec<(Duration, Value)>>,
}

impl TimedTransport {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            arrivals: Mutex::new(Vec::new()),
        }
    }

    fn arrivals(&self) -> Vec<(Duration, Value)> {
        self.arrivals.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for TimedTransport {
    async fn send(&self, payload: &EventPayload) -> Result<Value> {
        self.arrivals
            .lock()
            .unwrap()
            .push((self.start.elapsed(), payload.to_json()));
        Ok(json!({"status": "ok"}))
    }
}

/// Takes 100ms per payload and counts starts and completions
#[derive(Default)]
struct SlowTransport {
    started: AtomicUsize,
    completed: AtomicUsize,
}

#[async_trait]
impl Transport for SlowTransport {
    async fn send(&self, _payload: &EventPayload) -> Result<Value> {
        self.started.fetch_add(1, Ordering::SeqCst);
        sleep(Duration::from_millis(100)).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"status": "ok"}))
    }
}

fn config_with(batch_size: usize, batch_timeout_ms: u64) -> TrackerConfig {
    TrackerConfig {
        batch_size,
        batch_timeout_ms,
        ..TrackerConfig::new("https://x/ingest", "s1")
    }
}

fn tracker_with(
    batch_size: usize,
    batch_timeout_ms: u64,
    transport: Arc<MemoryTransport>,
) -> Tracker {
    pagebeacon_core::logging::init_test();
    Tracker::with_transport(config_with(batch_size, batch_timeout_ms), transport)
        .expect("tracker should initialize")
}

// ============================================
// Size-triggered flushing
// ============================================

#[tokio::test(start_paused = true)]
async fn test_second_click_flushes_batch_of_two() {
    let transport = Arc::new(MemoryTransport::default());
    let tracker = tracker_with(2, 1000, transport.clone());

    tracker.track_event("click", json!({"x": 1}));
    assert_eq!(tracker.pending_count(), 1);
    assert!(tracker.has_timer());

    sleep(Duration::from_millis(500)).await;
    tracker.track_event("click", json!({"x": 2}));
    assert_eq!(tracker.pending_count(), 0);
    assert!(!tracker.has_timer());

    tracker.drain().await;
    let sent = transport.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0]["type"], "custom");
    assert_eq!(sent[0]["x"], 1);
    assert_eq!(sent[1]["type"], "custom");
    assert_eq!(sent[1]["x"], 2);
    assert!(sent.iter().all(|p| p["event_name"] == "click"));
}

#[tokio::test(start_paused = true)]
async fn test_flush_happens_exactly_at_nth_payload() {
    let transport = Arc::new(MemoryTransport::default());
    let tracker = tracker_with(4, 60_000, transport.clone());

    for round in 0..3 {
        for i in 1..=4 {
            tracker.track_event("tick", json!({"round": round, "i": i}));
            let expected_pending = if i == 4 { 0 } else { i };
            assert_eq!(tracker.pending_count(), expected_pending);
        }
    }

    tracker.drain().await;
    assert_eq!(transport.sent().len(), 12);
    assert_eq!(tracker.stats().attempted, 12);
}

// ============================================
// Time-triggered flushing
// ============================================

#[tokio::test(start_paused = true)]
async fn test_single_conversion_flushes_after_timeout() {
    let transport = Arc::new(MemoryTransport::default());
    let tracker = tracker_with(10, 5000, transport.clone());

    tracker.track_conversion("signup");

    sleep(Duration::from_millis(4999)).await;
    tracker.drain().await;
    assert!(transport.sent().is_empty());
    assert_eq!(tracker.pending_count(), 1);

    sleep(Duration::from_millis(2)).await;
    tracker.drain().await;

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["type"], "marketing");
    assert_eq!(sent[0]["conversion_goal"], true);
    assert_eq!(sent[0]["goal_name"], "signup");
    assert_eq!(tracker.pending_count(), 0);
    assert!(!tracker.has_timer());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_flush_preserves_insertion_order() {
    let transport = Arc::new(MemoryTransport::default());
    let tracker = tracker_with(10, 1000, transport.clone());

    for i in 0..5 {
        tracker.track_event("step", json!({"i": i}));
    }
    sleep(Duration::from_millis(1500)).await;
    tracker.drain().await;

    let order: Vec<_> = transport.sent().iter().map(|p| p["i"].clone()).collect();
    assert_eq!(order, vec![json!(0), json!(1), json!(2), json!(3), json!(4)]);
    assert_eq!(tracker.stats().attempted, 5);
}

#[tokio::test(start_paused = true)]
async fn test_max_wait_forces_flush_during_trickle() {
    let transport = Arc::new(MemoryTransport::default());
    let config = TrackerConfig {
        batch_size: 100,
        batch_timeout_ms: 1000,
        max_wait_ms: Some(1500),
        ..TrackerConfig::new("https://x/ingest", "s1")
    };
    let tracker = Tracker::with_transport(config, transport.clone()).unwrap();

    // Every 400ms, so the idle timeout alone would never fire.
    // The first four are flushed when the oldest turns 1500ms old.
    for i in 0..5 {
        tracker.track_event("heartbeat", json!({"i": i}));
        sleep(Duration::from_millis(400)).await;
    }
    tracker.drain().await;

    assert_eq!(transport.sent().len(), 4);
    assert_eq!(tracker.pending_count(), 1);
    assert!(tracker.has_timer());
}

// ============================================
// Flush and failure semantics
// ============================================

#[tokio::test(start_paused = true)]
async fn test_flush_on_empty_tracker_is_noop() {
    let transport = Arc::new(MemoryTransport::default());
    let tracker = tracker_with(5, 1000, transport.clone());

    assert_eq!(tracker.flush(), 0);
    assert!(!tracker.has_timer());

    let stats = tracker.shutdown().await;
    assert_eq!(stats.attempted, 0);
    assert!(transport.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_delivery_is_isolated() {
    let transport = Arc::new(MemoryTransport::failing_on("x", json!(1)));
    let tracker = tracker_with(2, 1000, transport.clone());

    tracker.track_event("click", json!({"x": 1}));
    tracker.track_event("click", json!({"x": 2}));
    tracker.drain().await;

    assert_eq!(transport.sent().len(), 2);
    let stats = tracker.stats();
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.failed, 1);

    // Nothing was re-queued and the tracker keeps working
    assert_eq!(tracker.pending_count(), 0);
    tracker.track_event("click", json!({"x": 3}));
    tracker.track_event("click", json!({"x": 4}));
    tracker.drain().await;
    assert_eq!(tracker.stats().delivered, 3);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_delivers_pending_payloads() {
    let transport = Arc::new(MemoryTransport::default());
    let tracker = tracker_with(10, 5000, transport.clone());

    tracker.track_event("a", Value::Null);
    tracker.track_event("b", Value::Null);
    let stats = tracker.shutdown().await;

    assert_eq!(stats.delivered, 2);
    assert!(!tracker.has_timer());

    // The cancelled timer never produces a second delivery
    sleep(Duration::from_millis(10_000)).await;
    tracker.drain().await;
    assert_eq!(transport.sent().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_independent_trackers_do_not_share_state() {
    let first = Arc::new(MemoryTransport::default());
    let second = Arc::new(MemoryTransport::default());
    let a = tracker_with(2, 1000, first.clone());
    let b = tracker_with(2, 1000, second.clone());

    a.track_event("only-a", Value::Null);
    assert_eq!(a.pending_count(), 1);
    assert_eq!(b.pending_count(), 0);

    a.shutdown().await;
    b.shutdown().await;
    assert_eq!(first.sent().len(), 1);
    assert!(second.sent().is_empty());
}

// ============================================
// Throttled signals
// ============================================

#[tokio::test(start_paused = true)]
async fn test_scroll_burst_runs_at_most_once_per_window() {
    pagebeacon_core::logging::init_test();
    let transport = Arc::new(TimedTransport::new());
    let tracker = Tracker::with_transport(config_with(1, 1000), transport.clone()).unwrap();
    let window = Duration::from_millis(100);
    let scroll = tracker.scroll_tracker(window);

    // A 294ms burst, one sample every 7ms, steadily from 10% to 100% depth
    for i in 0..=42u32 {
        scroll.record(ScrollSample {
            scroll_top: f64::from(i) * 900.0 / 42.0,
            viewport_height: 100.0,
            document_height: 1000.0,
        });
        sleep(Duration::from_millis(7)).await;
    }
    sleep(Duration::from_millis(500)).await;
    tracker.drain().await;

    let arrivals = transport.arrivals();
    let depths: Vec<_> = arrivals.iter().map(|(_, p)| p["scroll_depth"].clone()).collect();
    assert_eq!(depths, vec![json!(25), json!(50), json!(75), json!(100)]);
    assert!(arrivals.iter().all(|(_, p)| p["type"] == "page"));
    assert_eq!(scroll.max_depth(), 100);

    // Payloads from one run share an instant; separate runs are a full window apart
    let mut runs: Vec<Duration> = arrivals.iter().map(|(at, _)| *at).collect();
    runs.dedup();
    for pair in runs.windows(2) {
        assert!(pair[1] - pair[0] >= window, "runs too close: {:?}", runs);
    }
    // 43 samples over roughly three windows
    assert!(runs.len() <= 4, "too many runs: {:?}", runs);
}

// ============================================
// Delivery lifetime
// ============================================

#[tokio::test(start_paused = true)]
async fn test_dropping_tracker_does_not_cancel_deliveries() {
    let transport = Arc::new(SlowTransport::default());
    let tracker = Tracker::with_transport(config_with(1, 1000), transport.clone()).unwrap();

    tracker.track_event("click", json!({"x": 1}));
    drop(tracker);

    sleep(Duration::from_millis(500)).await;
    assert_eq!(transport.started.load(Ordering::SeqCst), 1);
    assert_eq!(transport.completed.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_drain_does_not_cancel_deliveries() {
    let transport = Arc::new(SlowTransport::default());
    let tracker = Tracker::with_transport(config_with(1, 1000), transport.clone()).unwrap();

    tracker.track_event("click", json!({"x": 1}));
    assert!(timeout(Duration::from_millis(10), tracker.drain()).await.is_err());

    sleep(Duration::from_millis(500)).await;
    assert_eq!(transport.completed.load(Ordering::SeqCst), 1);

    tracker.drain().await;
    assert_eq!(tracker.stats().delivered, 1);
}
