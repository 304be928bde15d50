//! Rate limiting for high-frequency signal producers
//!
//! A [`Throttle`] wraps a callback so it runs at most once per window.
//! A call while the throttle is idle runs immediately and opens a window.
//! Calls inside an open window only replace the pending argument. When the
//! window closes, the most recent pending argument runs and opens the next
//! window. Intermediate calls are coalesced away; the latest one is never lost.
//!
//! ```text
//! IDLE --call--> run, COOLING --call--> PENDING --window closes--> run, COOLING
//!                   COOLING --window closes, nothing pending--> IDLE
//! ```

use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use crate::timer::Timer;

type ThrottledFn<T> = Box<dyn Fn(T) + Send + Sync + 'static>;

/// Coalescing wrapper around a callback
pub struct Throttle<T: Send + 'static> {
    inner: Arc<ThrottleInner<T>>,
}

struct ThrottleInner<T> {
    delay: Duration,
    timer: Arc<dyn Timer>,
    func: ThrottledFn<T>,
    state: Mutex<ThrottleState<T>>,
}

struct ThrottleState<T> {
    /// A window is open; direct calls must wait for it to close
    cooling: bool,
    pending: Option<T>,
}

impl<T: Send + 'static> Throttle<T> {
    pub fn new(
        delay: Duration,
        timer: Arc<dyn Timer>,
        func: impl Fn(T) + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(ThrottleInner {
                delay,
                timer,
                func: Box::new(func),
                state: Mutex::new(ThrottleState {
                    cooling: false,
                    pending: None,
                }),
            }),
        }
    }

    /// Invoke now, or remember `arg` for the trailing edge of the open window
    pub fn call(&self, arg: T) {
        {
            let mut state = self.inner.lock();
            if state.cooling {
                state.pending = Some(arg);
                return;
            }
            state.cooling = true;
        }

        (self.inner.func)(arg);
        ThrottleInner::open_window(&self.inner);
    }

    /// Whether a trailing call is waiting for the window to close
    pub fn has_pending(&self) -> bool {
        self.inner.lock().pending.is_some()
    }

    pub fn delay(&self) -> Duration {
        self.inner.delay
    }
}

impl<T: Send + 'static> ThrottleInner<T> {
    fn lock(&self) -> std::sync::MutexGuard<'_, ThrottleState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_window(this: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(this);
        // The window is never cancelled; a dropped throttle just ignores it.
        let _ = this.timer.schedule(
            this.delay,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.window_closed();
                }
            }),
        );
    }

    fn window_closed(self: Arc<Self>) {
        let trailing = {
            let mut state = self.lock();
            match state.pending.take() {
                Some(arg) => arg,
                None => {
                    state.cooling = false;
                    return;
                }
            }
        };

        (self.func)(trailing);
        Self::open_window(&self);
    }
}
