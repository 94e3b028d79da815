use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use std::sync::Arc;

use tokio::sync::{Notify, watch};

use super::Shared;
use crate::error::{Error, Result};
use crate::parameter::CanonicalKey;
use crate::statistics::Statistics;

/// How a run ended.
#[derive(Clone, Debug)]
pub(super) enum Outcome {
    Completed(Statistics),
    Failed(Error),
    Cancelled,
}

impl Outcome {
    fn into_result(self) -> (HandleStatus, Result<Statistics>) {
        match self {
            Self::Completed(stats) => (HandleStatus::Completed, Ok(stats)),
            Self::Failed(e) => (HandleStatus::Failed, Err(e)),
            Self::Cancelled => (HandleStatus::Cancelled, Err(Error::Cancelled)),
        }
    }
}

#[derive(Clone, Debug)]
pub(super) enum FlightState {
    Pending,
    Done(Outcome),
}

impl FlightState {
    fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }
}

/// Shared state of one in-flight run. Every handle for the key subscribes to
/// the same flight; the first party to [`claim`](Flight::claim) it decides
/// the outcome.
pub(super) struct Flight {
    state: watch::Sender<FlightState>,
    settled: AtomicBool,
    cancel: Notify,
}

impl Flight {
    pub(super) fn new() -> Self {
        let (state, _) = watch::channel(FlightState::Pending);
        Self {
            state,
            settled: AtomicBool::new(false),
            cancel: Notify::new(),
        }
    }

    pub(super) fn subscribe(&self) -> watch::Receiver<FlightState> {
        self.state.subscribe()
    }

    /// Claims the right to resolve this flight. Only the first call succeeds.
    pub(super) fn claim(&self) -> bool {
        !self.settled.swap(true, Ordering::AcqRel)
    }

    pub(super) fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }

    /// Publishes the outcome to every subscribed handle. Callers must hold a
    /// successful [`claim`](Self::claim).
    pub(super) fn publish(&self, outcome: Outcome) {
        self.state.send_replace(FlightState::Done(outcome));
    }

    pub(super) async fn cancelled(&self) {
        self.cancel.notified().await;
    }

    fn waiters(&self) -> usize {
        self.state.receiver_count()
    }

    fn request_cancel(&self) {
        self.cancel.notify_one();
    }
}

/// Lifecycle of a [`Handle`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleStatus {
    /// The run is queued or executing.
    Pending,
    /// Statistics are available.
    Completed,
    /// The engine failed or the run missed its deadline.
    Failed,
    /// The caller stopped waiting or the run was cancelled.
    Cancelled,
}

struct Waiting {
    rx: watch::Receiver<FlightState>,
    flight: Arc<Flight>,
    shared: Arc<Shared>,
}

/// A caller's view of one submitted evaluation.
///
/// Several handles may observe the same run when the same configuration is
/// submitted while it is already executing.
pub struct Handle {
    key: CanonicalKey,
    from_ledger: bool,
    status: HandleStatus,
    waiting: Option<Waiting>,
    outcome: Option<Result<Statistics>>,
}

impl Handle {
    pub(super) fn ready(key: CanonicalKey, stats: Statistics) -> Self {
        Self {
            key,
            from_ledger: true,
            status: HandleStatus::Completed,
            waiting: None,
            outcome: Some(Ok(stats)),
        }
    }

    pub(super) fn waiting(
        key: CanonicalKey,
        rx: watch::Receiver<FlightState>,
        flight: Arc<Flight>,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            key,
            from_ledger: false,
            status: HandleStatus::Pending,
            waiting: Some(Waiting { rx, flight, shared }),
            outcome: None,
        }
    }

    /// Canonical key of the submitted configuration.
    #[must_use]
    pub fn key(&self) -> &CanonicalKey {
        &self.key
    }

    /// Returns `true` if the result came from the ledger without running the
    /// engine.
    #[must_use]
    pub fn from_ledger(&self) -> bool {
        self.from_ledger
    }

    /// Current status without waiting.
    #[must_use]
    pub fn status(&self) -> HandleStatus {
        if self.status != HandleStatus::Pending {
            return self.status;
        }
        match self.waiting.as_ref().map(|w| w.rx.borrow().clone()) {
            Some(FlightState::Done(outcome)) => outcome.into_result().0,
            _ => HandleStatus::Pending,
        }
    }

    /// Waits up to `timeout` for the run to finish.
    ///
    /// Once a terminal result has been observed, later calls return it again
    /// immediately.
    ///
    /// # Errors
    ///
    /// * [`Error::Timeout`] if `timeout` elapses first. The handle becomes
    ///   [`HandleStatus::Cancelled`], and the run itself is cancelled when no
    ///   other handle is still waiting on it.
    /// * [`Error::Simulation`], [`Error::Timeout`] or [`Error::Storage`] when
    ///   the run fails.
    /// * [`Error::Cancelled`] if the run was cancelled by another party.
    pub async fn wait(&mut self, timeout: Duration) -> Result<Statistics> {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        let Some(waiting) = self.waiting.as_mut() else {
            return Err(Error::Internal("handle has neither an outcome nor a run"));
        };

        let rx = &mut waiting.rx;
        let waited = tokio::time::timeout(timeout, async {
            rx.wait_for(FlightState::is_done).await.map(|state| state.clone())
        })
        .await;

        let (status, result) = match waited {
            Ok(Ok(FlightState::Done(outcome))) => outcome.into_result(),
            Ok(Ok(FlightState::Pending)) | Ok(Err(_)) => {
                (HandleStatus::Cancelled, Err(Error::Cancelled))
            }
            Err(_elapsed) => {
                self.abandon();
                (HandleStatus::Cancelled, Err(Error::Timeout(timeout)))
            }
        };

        self.waiting = None;
        self.status = status;
        self.outcome = Some(result.clone());
        result
    }

    /// Stops waiting. Cancels the run if no other handle still observes it.
    fn abandon(&mut self) {
        let Some(Waiting { rx, flight, shared }) = self.waiting.take() else {
            return;
        };

        let mut flights = shared.flights.lock();
        drop(rx);
        if flight.waiters() > 0 || !flight.claim() {
            return;
        }
        if flights
            .get(&self.key)
            .is_some_and(|f| Arc::ptr_eq(f, &flight))
        {
            flights.remove(&self.key);
        }
        drop(flights);

        flight.publish(Outcome::Cancelled);
        flight.request_cancel();
        trace_debug!(key = %self.key, "run cancelled, no remaining waiters");
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("key", &self.key)
            .field("status", &self.status())
            .field("from_ledger", &self.from_ledger)
            .finish_non_exhaustive()
    }
}
