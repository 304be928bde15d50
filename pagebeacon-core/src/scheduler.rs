//! Queue and batch scheduler
//!
//! The scheduler owns the pending queue and the single deferred-flush timer.
//! After each enqueue it either flushes immediately (the queue reached
//! `batch_size`) or re-arms the timer for `batch_timeout`. Re-arming on every
//! enqueue means a steady trickle below `batch_size` keeps pushing the flush
//! back; `max_wait` caps how long the oldest payload can be held.
//!
//! Every armed timer carries a generation number, so a callback that fires
//! after being replaced or cancelled finds a stale generation and does
//! nothing.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::time::Instant;

use crate::dispatch::Dispatcher;
use crate::payload::EventPayload;
use crate::timer::{Timer, TimerHandle};

/// Size and time thresholds for flushing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPolicy {
    pub batch_size: usize,
    pub batch_timeout: Duration,
    pub max_wait: Option<Duration>,
}

pub struct BatchScheduler {
    policy: BatchPolicy,
    debug: bool,
    timer: Arc<dyn Timer>,
    dispatcher: Arc<Dispatcher>,
    state: Mutex<BatchState>,
    this: Weak<BatchScheduler>,
}

#[derive(Default)]
struct BatchState {
    queue: Vec<EventPayload>,
    armed: Option<ArmedTimer>,
    generation: u64,
    /// When the oldest queued payload was enqueued
    oldest_at: Option<Instant>,
}

struct ArmedTimer {
    generation: u64,
    handle: TimerHandle,
}

impl BatchScheduler {
    pub fn new(
        policy: BatchPolicy,
        timer: Arc<dyn Timer>,
        dispatcher: Arc<Dispatcher>,
        debug: bool,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            policy,
            debug,
            timer,
            dispatcher,
            state: Mutex::new(BatchState::default()),
            this: this.clone(),
        })
    }

    /// Append a payload and decide between an immediate flush and a re-armed timer
    pub fn enqueue(&self, payload: EventPayload) {
        if self.debug {
            tracing::info!(payload = %payload.to_json(), "Enqueued payload");
        }

        let batch = {
            let mut state = self.lock();
            if state.queue.is_empty() {
                state.oldest_at = Some(Instant::now());
            }
            state.queue.push(payload);

            if state.queue.len() >= self.policy.batch_size {
                Some(Self::take_batch(&mut state))
            } else {
                self.rearm(&mut state);
                None
            }
        };

        if let Some(batch) = batch {
            tracing::debug!(size = batch.len(), "Batch size reached, flushing");
            self.dispatcher.dispatch(batch);
        }
    }

    /// Detach the queue and hand it to the dispatcher
    ///
    /// A no-op on an empty queue: no delivery, and the timer is left alone.
    /// Returns the number of payloads handed off.
    pub fn flush(&self) -> usize {
        let batch = {
            let mut state = self.lock();
            if state.queue.is_empty() {
                return 0;
            }
            Self::take_batch(&mut state)
        };

        let size = batch.len();
        self.dispatcher.dispatch(batch);
        size
    }

    pub fn pending_count(&self) -> usize {
        self.lock().queue.len()
    }

    /// Whether a deferred flush is armed
    pub fn has_timer(&self) -> bool {
        self.lock().armed.is_some()
    }

    pub fn policy(&self) -> BatchPolicy {
        self.policy
    }

    fn lock(&self) -> MutexGuard<'_, BatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot and clear the queue, cancelling the timer
    fn take_batch(state: &mut BatchState) -> Vec<EventPayload> {
        if let Some(armed) = state.armed.take() {
            armed.handle.cancel();
        }
        state.oldest_at = None;
        std::mem::take(&mut state.queue)
    }

    fn rearm(&self, state: &mut BatchState) {
        if let Some(armed) = state.armed.take() {
            armed.handle.cancel();
        }

        state.generation += 1;
        let generation = state.generation;
        let delay = self.next_delay(state);

        let this = self.this.clone();
        let handle = self.timer.schedule(
            delay,
            Box::new(move || {
                if let Some(scheduler) = this.upgrade() {
                    scheduler.timer_fired(generation);
                }
            }),
        );
        state.armed = Some(ArmedTimer { generation, handle });
    }

    fn next_delay(&self, state: &BatchState) -> Duration {
        match (self.policy.max_wait, state.oldest_at) {
            (Some(max_wait), Some(oldest_at)) => {
                let remaining = max_wait.saturating_sub(oldest_at.elapsed());
                remaining.min(self.policy.batch_timeout)
            }
            _ => self.policy.batch_timeout,
        }
    }

    fn timer_fired(&self, generation: u64) {
        let batch = {
            let mut state = self.lock();
            match &state.armed {
                Some(armed) if armed.generation == generation => {}
                _ => return,
            }
            // The firing timer is finished; drop its handle without aborting it.
            state.armed = None;
            state.oldest_at = None;
            std::mem::take(&mut state.queue)
        };

        if batch.is_empty() {
            return;
        }
        tracing::debug!(size = batch.len(), "Batch timeout elapsed, flushing");
        self.dispatcher.dispatch(batch);
    }
}
