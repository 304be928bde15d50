//! The tracker context object
//!
//! A [`Tracker`] is created once per host page by [`Tracker::init`]. It owns
//! the payload builder, the batch scheduler and the dispatcher, and is the
//! only way host code feeds events into them. Trackers are cheap to clone and
//! fully independent of one another.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::runtime::Handle;

use crate::config::TrackerConfig;
use crate::dispatch::{DispatchStats, Dispatcher};
use crate::error::{Error, Result};
use crate::payload::{Category, PayloadBuilder};
use crate::scheduler::{BatchPolicy, BatchScheduler};
use crate::signals::{
    DeviceSignals, IdentitySignals, LocationSignals, MarketingSignals, PageSignals,
    PerformanceSignals, ScrollSample, Signal,
};
use crate::throttle::Throttle;
use crate::timer::{Timer, TokioTimer};
use crate::transport::{HttpTransport, Transport};

/// Scroll depths reported once each per page
const SCROLL_MILESTONES: [u8; 4] = [25, 50, 75, 100];

/// Handle to a running collector
#[derive(Clone)]
pub struct Tracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    config: TrackerConfig,
    builder: PayloadBuilder,
    scheduler: Arc<BatchScheduler>,
    dispatcher: Arc<Dispatcher>,
    timer: Arc<dyn Timer>,
}

impl Tracker {
    /// Initialize a tracker that delivers over HTTP
    ///
    /// Must be called from within a tokio runtime. A configuration error
    /// aborts initialization; no payloads are ever built in that case.
    pub fn init(config: TrackerConfig) -> Result<Self> {
        Self::build(config, |config| {
            let endpoint_url = config.endpoint_url.clone().unwrap_or_default();
            let transport: Arc<dyn Transport> =
                Arc::new(HttpTransport::new(endpoint_url, config.request_timeout())?);
            Ok(transport)
        })
    }

    /// Initialize a tracker with a custom transport
    pub fn with_transport(config: TrackerConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        Self::build(config, |_| Ok(transport))
    }

    /// Initialize a tracker with every collaborator injected
    pub fn with_components(
        config: TrackerConfig,
        transport: Arc<dyn Transport>,
        timer: Arc<dyn Timer>,
        runtime: Handle,
    ) -> Result<Self> {
        validate(&config)?;
        Ok(Self::assemble(config, transport, timer, runtime))
    }

    /// Validate, capture the current runtime, then create the transport
    fn build<F>(config: TrackerConfig, make_transport: F) -> Result<Self>
    where
        F: FnOnce(&TrackerConfig) -> Result<Arc<dyn Transport>>,
    {
        validate(&config)?;
        let runtime = Handle::try_current().map_err(|e| {
            abort(Error::Config(format!(
                "tracker requires a tokio runtime: {}",
                e
            )))
        })?;
        let transport = make_transport(&config).map_err(abort)?;
        let timer = Arc::new(TokioTimer::new(runtime.clone()));
        Ok(Self::assemble(config, transport, timer, runtime))
    }

    fn assemble(
        config: TrackerConfig,
        transport: Arc<dyn Transport>,
        timer: Arc<dyn Timer>,
        runtime: Handle,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(transport, runtime, config.debug));
        let scheduler = BatchScheduler::new(
            BatchPolicy {
                batch_size: config.batch_size,
                batch_timeout: config.batch_timeout(),
                max_wait: config.max_wait(),
            },
            timer.clone(),
            dispatcher.clone(),
            config.debug,
        );

        tracing::info!(
            site_id = %config.site_id,
            enabled = config.enabled,
            batch_size = config.batch_size,
            batch_timeout_ms = config.batch_timeout_ms,
            "Tracker initialized"
        );

        Self {
            inner: Arc::new(TrackerInner {
                builder: PayloadBuilder::new(config.site_id.clone()),
                config,
                scheduler,
                dispatcher,
                timer,
            }),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.inner.config
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.config.enabled
    }

    /// Build and enqueue a payload; does nothing when tracking is disabled
    pub fn record(&self, category: Category, fields: Map<String, Value>) {
        if !self.is_enabled() {
            return;
        }
        let payload = self.inner.builder.build(category, fields);
        self.inner.scheduler.enqueue(payload);
    }

    /// Enqueue a custom event; object `data` is merged after `event_name`
    pub fn track_event(&self, name: &str, data: Value) {
        let mut fields = Map::new();
        fields.insert("event_name".to_string(), Value::String(name.to_string()));
        match data {
            Value::Object(map) => fields.extend(map),
            Value::Null => {}
            other => {
                fields.insert("data".to_string(), other);
            }
        }
        self.record(Category::Custom, fields);
    }

    /// Enqueue a marketing payload flagged as a conversion
    pub fn track_conversion(&self, goal_name: &str) {
        let mut fields = Map::new();
        fields.insert("conversion_goal".to_string(), Value::Bool(true));
        fields.insert(
            "goal_name".to_string(),
            Value::String(goal_name.to_string()),
        );
        self.record(Category::Marketing, fields);
    }

    /// Enqueue any typed signal under its own category
    pub fn track<S: Signal>(&self, signal: &S) {
        if !self.is_enabled() {
            return;
        }
        if let Some(fields) = signal.to_fields() {
            self.record(S::CATEGORY, fields);
        }
    }

    pub fn track_identity(&self, identity: &IdentitySignals) {
        self.track(identity);
    }

    pub fn track_page_view(&self, page: &PageSignals) {
        self.track(page);
    }

    pub fn track_device(&self, device: &DeviceSignals) {
        self.track(device);
    }

    pub fn track_location(&self, location: &LocationSignals) {
        self.track(location);
    }

    pub fn track_marketing(&self, marketing: &MarketingSignals) {
        self.track(marketing);
    }

    pub fn track_performance(&self, performance: &PerformanceSignals) {
        self.track(performance);
    }

    /// Scroll depth reporting throttled to one sample per `delay`
    pub fn scroll_tracker(&self, delay: Duration) -> ScrollTracker {
        ScrollTracker::new(self.clone(), delay)
    }

    /// Flush whatever is queued right now; returns the number of payloads handed off
    pub fn flush(&self) -> usize {
        self.inner.scheduler.flush()
    }

    /// Wait for every outstanding delivery to finish
    pub async fn drain(&self) {
        self.inner.dispatcher.drain().await
    }

    /// Flush the queue and wait for all deliveries
    pub async fn shutdown(&self) -> DispatchStats {
        let flushed = self.flush();
        self.drain().await;
        let stats = self.stats();
        tracing::info!(
            flushed,
            delivered = stats.delivered,
            failed = stats.failed,
            "Tracker shut down"
        );
        stats
    }

    pub fn stats(&self) -> DispatchStats {
        self.inner.dispatcher.stats()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.scheduler.pending_count()
    }

    pub fn has_timer(&self) -> bool {
        self.inner.scheduler.has_timer()
    }
}

fn validate(config: &TrackerConfig) -> Result<()> {
    config.validate().map_err(abort)
}

fn abort(e: Error) -> Error {
    tracing::error!(error = %e, "Tracker initialization aborted");
    e
}

/// Reports scroll depth milestones from a stream of raw scroll samples
///
/// Samples go through a [`Throttle`], so a burst of scroll events costs at
/// most one depth computation per window. Each milestone is reported once.
pub struct ScrollTracker {
    throttle: Throttle<ScrollSample>,
    reached: Arc<AtomicU8>,
}

impl ScrollTracker {
    fn new(tracker: Tracker, delay: Duration) -> Self {
        let reached = Arc::new(AtomicU8::new(0));
        let timer = tracker.inner.timer.clone();

        let max_seen = reached.clone();
        let throttle = Throttle::new(delay, timer, move |sample: ScrollSample| {
            let depth = sample.depth_percent();
            let previous = max_seen.fetch_max(depth, Ordering::SeqCst);
            for milestone in SCROLL_MILESTONES {
                if milestone > previous && milestone <= depth {
                    let mut fields = Map::new();
                    fields.insert("scroll_depth".to_string(), Value::from(milestone));
                    tracker.record(Category::Page, fields);
                }
            }
        });

        Self { throttle, reached }
    }

    pub fn record(&self, sample: ScrollSample) {
        self.throttle.call(sample);
    }

    /// Deepest scroll percentage processed so far
    pub fn max_depth(&self) -> u8 {
        self.reached.load(Ordering::SeqCst)
    }
}
