//! # pagebeacon-core
//!
//! Core library for pagebeacon - a client-side telemetry collector.
//!
//! This library provides:
//! - Typed event payloads and the builder that stamps them
//! - A batch scheduler that flushes on size or on an idle timeout
//! - A dispatcher that delivers each payload independently, best-effort
//! - A throttle for high-frequency signal producers
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! Data flows through one pipeline:
//!
//! ```text
//! signals → PayloadBuilder → BatchScheduler (queue + timer) → Dispatcher → Transport
//! ```
//!
//! Delivery is fire-and-forget: a failed payload is logged and dropped,
//! never retried, and never affects the rest of its batch.
//!
//! ## Example
//!
//! ```rust,no_run
//! use pagebeacon_core::{Tracker, TrackerConfig};
//!
//! # async fn run() -> pagebeacon_core::Result<()> {
//! let tracker = Tracker::init(TrackerConfig::new("https://ingest.example.com", "site-1"))?;
//! tracker.track_event("click", serde_json::json!({"button": "signup"}));
//! tracker.track_conversion("signup");
//! tracker.shutdown().await;
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use config::{Config, TrackerConfig};
pub use dispatch::{DispatchStats, Dispatcher};
pub use error::{Error, Result};
pub use payload::{Category, EventPayload, PayloadBuilder};
pub use scheduler::{BatchPolicy, BatchScheduler};
pub use throttle::Throttle;
pub use timer::{Timer, TimerCallback, TimerHandle, TokioTimer};
pub use tracker::{ScrollTracker, Tracker};
pub use transport::{HttpTransport, Transport};

// Public modules
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod payload;
pub mod scheduler;
pub mod signals;
pub mod throttle;
pub mod timer;
pub mod tracker;
pub mod transport;
