//! Debounce with an explicit in-flight gate.
//!
//! Every call to [`Throttle::debounce`] takes a ticket from a monotonically
//! increasing sequence at call time (not when the returned future is first
//! polled). After the quiet window only the newest ticket proceeds; it then
//! waits for any in-flight call to settle before running, so two calls never
//! overlap.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Outcome of a debounced call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Debounced<T> {
    /// This call was the newest after the quiet window and ran.
    Fired { seq: u64, output: T },
    /// A newer call (or an explicit supersede) replaced this one.
    Superseded,
}

impl<T> Debounced<T> {
    pub fn into_output(self) -> Option<T> {
        match self {
            Debounced::Fired { output, .. } => Some(output),
            Debounced::Superseded => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Throttle {
    window: Duration,
    latest: Arc<AtomicU64>,
    in_flight: Arc<Mutex<()>>,
}

impl Throttle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            latest: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(Mutex::new(())),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Invalidate every pending call. Returns the new latest ticket.
    pub fn supersede(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_latest(&self, seq: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == seq
    }

    /// Run `f` once the quiet window has passed with no newer call.
    pub fn debounce<F, Fut>(&self, f: F) -> impl Future<Output = Debounced<Fut::Output>> + Send + 'static
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        let seq = self.supersede();
        let this = self.clone();
        async move {
            tokio::time::sleep(this.window).await;
            if !this.is_latest(seq) {
                return Debounced::Superseded;
            }
            let _gate = this.in_flight.lock().await;
            if !this.is_latest(seq) {
                return Debounced::Superseded;
            }
            let output = f().await;
            Debounced::Fired { seq, output }
        }
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(Duration::from_millis(250))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
