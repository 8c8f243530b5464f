//! Deadline token for cooperative cancellation of a pipeline run.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

const ACTIVE: u8 = 0;
const MANUAL: u8 = 1;
const TIMEOUT: u8 = 2;

/// A callback type for cancellation notifications.
pub type CancelCallback = Box<dyn FnOnce(CancelReason) + Send>;

/// Why a deadline token fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The deadline elapsed.
    Timeout,
    /// Someone called [`CancelHandle::cancel`].
    Manual,
}

impl CancelReason {
    const fn code(self) -> u8 {
        match self {
            Self::Manual => MANUAL,
            Self::Timeout => TIMEOUT,
        }
    }

    const fn from_code(code: u8) -> Option<Self> {
        match code {
            MANUAL => Some(Self::Manual),
            TIMEOUT => Some(Self::Timeout),
            _ => None,
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

struct Inner {
    state: AtomicU8,
    expires_at: Option<Instant>,
    notify: Notify,
    callbacks: Mutex<Vec<CancelCallback>>,
}

impl Inner {
    /// Moves the token to its terminal state. Returns false if it already fired.
    fn fire(&self, reason: CancelReason) -> bool {
        if self
            .state
            .compare_exchange(ACTIVE, reason.code(), Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        debug!(reason = %reason, "Deadline token fired");
        self.notify.notify_waiters();

        let callbacks: Vec<_> = std::mem::take(&mut *self.callbacks.lock());
        for callback in callbacks {
            invoke_callback(callback, reason);
        }
        true
    }

    fn current(&self) -> Option<CancelReason> {
        CancelReason::from_code(self.state.load(Ordering::Acquire))
    }

    /// Observes the expiry instant, firing the token if it has passed.
    fn observe(&self) -> Option<CancelReason> {
        if let Some(reason) = self.current() {
            return Some(reason);
        }
        if self.expires_at.is_some_and(|at| Instant::now() >= at) {
            self.fire(CancelReason::Timeout);
        }
        self.current()
    }
}

fn invoke_callback(callback: CancelCallback, reason: CancelReason) {
    if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        callback(reason);
    })) {
        warn!("Cancellation callback panicked: {:?}", e);
    }
}

/// Read side of a run's cancellation signal.
///
/// Every clone observes the same state. Once the token reports a
/// [`CancelReason`] it never changes and never resets. Expiry is detected by
/// whichever observer reaches the deadline first, whether through
/// [`is_cancelled`](Self::is_cancelled) or [`cancelled`](Self::cancelled).
#[derive(Clone)]
pub struct DeadlineToken {
    inner: Arc<Inner>,
}

impl DeadlineToken {
    /// Creates a token that expires `timeout` from now, plus the handle that
    /// cancels it early.
    #[must_use]
    pub fn new(timeout: Duration) -> (Self, CancelHandle) {
        Self::with_expiry(Some(Instant::now() + timeout))
    }

    /// Creates a token that only fires on manual cancellation.
    #[must_use]
    pub fn never() -> (Self, CancelHandle) {
        Self::with_expiry(None)
    }

    fn with_expiry(expires_at: Option<Instant>) -> (Self, CancelHandle) {
        let inner = Arc::new(Inner {
            state: AtomicU8::new(ACTIVE),
            expires_at,
            notify: Notify::new(),
            callbacks: Mutex::new(Vec::new()),
        });
        (
            Self {
                inner: inner.clone(),
            },
            CancelHandle { inner },
        )
    }

    /// Returns whether the token has been cancelled or has expired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.observe().is_some()
    }

    /// Returns the reason the token fired, if it has.
    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        self.inner.observe()
    }

    /// Returns the instant at which the token expires, if it has a deadline.
    #[must_use]
    pub fn expires_at(&self) -> Option<Instant> {
        self.inner.expires_at
    }

    /// Returns the time left before expiry, or `None` for tokens without a deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Waits until the token is cancelled or expires.
    pub async fn cancelled(&self) -> CancelReason {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent cancel cannot slip between.
            notified.as_mut().enable();

            if let Some(reason) = self.inner.observe() {
                return reason;
            }

            match self.inner.expires_at {
                Some(deadline) => {
                    tokio::select! {
                        () = &mut notified => {}
                        () = tokio::time::sleep_until(deadline) => {
                            self.inner.fire(CancelReason::Timeout);
                        }
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Registers a callback to run when the token fires.
    ///
    /// If already cancelled, the callback is invoked immediately.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: FnOnce(CancelReason) + Send + 'static,
    {
        self.inner.observe();

        let mut callbacks = self.inner.callbacks.lock();
        match self.inner.current() {
            Some(reason) => {
                drop(callbacks);
                invoke_callback(Box::new(callback), reason);
            }
            None => callbacks.push(Box::new(callback)),
        }
    }
}

impl fmt::Debug for DeadlineToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeadlineToken")
            .field("reason", &self.inner.current())
            .field("remaining", &self.remaining())
            .finish()
    }
}

/// Write side of a run's cancellation signal.
#[derive(Clone)]
pub struct CancelHandle {
    inner: Arc<Inner>,
}

impl CancelHandle {
    /// Cancels the token manually.
    ///
    /// Idempotent: only the first cancellation (or an earlier expiry) counts.
    pub fn cancel(&self) {
        self.cancel_with(CancelReason::Manual);
    }

    /// Cancels the token with an explicit reason. Returns false if it had already fired.
    pub fn cancel_with(&self, reason: CancelReason) -> bool {
        if self.inner.observe().is_some() {
            return false;
        }
        self.inner.fire(reason)
    }

    /// Returns whether the token has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.observe().is_some()
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("reason", &self.inner.current())
            .finish()
    }
}
