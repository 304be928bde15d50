//! Detached, independent delivery of flushed payloads
//!
//! Each payload in a flushed batch becomes its own task. Deliveries start in
//! batch order but complete in any order, and a failure is logged and
//! swallowed without touching its siblings. Nothing is retried or re-queued.
//!
//! Deliveries are owned by the runtime, not by the dispatcher: dropping the
//! dispatcher or abandoning a [`Dispatcher::drain`] never cancels one.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;

use crate::payload::EventPayload;
use crate::transport::Transport;

/// Delivery statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchStats {
    /// Deliveries handed to the transport
    pub attempted: usize,
    /// Deliveries acknowledged by the endpoint
    pub delivered: usize,
    /// Deliveries that failed and were discarded
    pub failed: usize,
}

/// Hands flushed payloads to the transport as detached tasks
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    runtime: Handle,
    debug: bool,
    tasks: TaskTracker,
    stats: Arc<Mutex<DispatchStats>>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, runtime: Handle, debug: bool) -> Self {
        // A closed tracker still accepts tasks; closing lets `wait` resolve
        // whenever the tracked set is empty.
        let tasks = TaskTracker::new();
        tasks.close();

        Self {
            transport,
            runtime,
            debug,
            tasks,
            stats: Arc::new(Mutex::new(DispatchStats::default())),
        }
    }

    /// Start one delivery per payload, in batch order, without waiting on any
    pub fn dispatch(&self, batch: Vec<EventPayload>) {
        if batch.is_empty() {
            return;
        }

        lock_stats(&self.stats).attempted += batch.len();
        for payload in batch {
            let transport = self.transport.clone();
            let stats = self.stats.clone();
            // The join handle is dropped, which detaches the delivery.
            self.tasks
                .spawn_on(deliver(transport, payload, stats, self.debug), &self.runtime);
        }
    }

    /// Wait until every outstanding delivery has finished
    ///
    /// Deliveries started while draining are waited on as well. Dropping the
    /// returned future stops the wait, not the deliveries.
    pub async fn drain(&self) {
        self.tasks.wait().await;
    }

    /// Number of deliveries still running
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    pub fn stats(&self) -> DispatchStats {
        lock_stats(&self.stats).clone()
    }
}

fn lock_stats(stats: &Mutex<DispatchStats>) -> std::sync::MutexGuard<'_, DispatchStats> {
    stats.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Send one payload; failures are reported and dropped
async fn deliver(
    transport: Arc<dyn Transport>,
    payload: EventPayload,
    stats: Arc<Mutex<DispatchStats>>,
    debug: bool,
) {
    match transport.send(&payload).await {
        Ok(ack) => {
            lock_stats(&stats).delivered += 1;
            if debug {
                tracing::info!(
                    payload = %payload.to_json(),
                    response = %ack,
                    "Delivered payload"
                );
            } else {
                tracing::trace!(category = %payload.category(), "Delivered payload");
            }
        }
        Err(e) => {
            lock_stats(&stats).failed += 1;
            tracing::warn!(
                category = %payload.category(),
                error = %e,
                "Failed to deliver payload"
            );
        }
    }
}
