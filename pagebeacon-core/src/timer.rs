//! Cancellable deferred execution
//!
//! The batch scheduler and the throttle never sleep themselves; they ask a
//! [`Timer`] to run a callback later and keep the returned [`TimerHandle`]
//! around to cancel it. [`TokioTimer`] is the production implementation.
//! Under `tokio::time::pause` it runs on the virtual clock, which is what
//! the tests rely on.

use std::fmt;
use std::time::Duration;

use tokio::runtime::Handle;

/// Deferred work handed to a [`Timer`]
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Schedules callbacks after a delay
///
/// Implementations must never invoke the callback synchronously from
/// `schedule`; callers may hold locks while scheduling.
pub trait Timer: Send + Sync {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;
}

/// Handle to a scheduled callback
///
/// Dropping the handle does not cancel the callback; call [`TimerHandle::cancel`].
pub struct TimerHandle {
    cancel: Box<dyn FnOnce() + Send + 'static>,
}

impl TimerHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Box::new(cancel),
        }
    }

    /// Cancel the scheduled callback if it has not run yet
    pub fn cancel(self) {
        (self.cancel)()
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle").finish_non_exhaustive()
    }
}

/// Timer backed by `tokio::time::sleep` on a runtime handle
#[derive(Debug, Clone)]
pub struct TokioTimer {
    runtime: Handle,
}

impl TokioTimer {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }
}

impl Timer for TokioTimer {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
        TimerHandle::new(move || task.abort())
    }
}
