//! Cancellation token and the cancellable retry wait.

use crossbeam_channel::{bounded, select, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

use super::error::RebalancerError;

/// Cloneable cancellation handle.
///
/// Cancelling drops the shared sender, which disconnects every receiver, so a
/// thread blocked in [`CancelToken::wait`] wakes up immediately.
#[derive(Clone)]
pub struct CancelToken {
    sender: Arc<Mutex<Option<Sender<()>>>>,
    receiver: Receiver<()>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, receiver) = bounded(0);
        CancelToken {
            sender: Arc::new(Mutex::new(Some(sender))),
            receiver,
        }
    }

    pub fn cancel(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self.receiver.try_recv(),
            Err(crossbeam_channel::TryRecvError::Disconnected)
        )
    }

    /// Sleeps for `duration` unless cancelled first.
    pub fn wait(&self, duration: Duration) -> Result<(), RebalancerError> {
        match self.receiver.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => Ok(()),
            Err(RecvTimeoutError::Disconnected) => Err(RebalancerError::Cancelled),
            // nothing is ever sent on the channel
            Ok(()) => Ok(()),
        }
    }

    /// Runs blocking `work` on a helper thread and returns its result, or
    /// [`RebalancerError::Cancelled`] as soon as the token is cancelled.
    ///
    /// A cancelled call leaves the helper thread to finish on its own; its
    /// result is discarded.
    pub fn run_until_cancelled<T, F>(&self, work: F) -> Result<T, RebalancerError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, RebalancerError> + Send + 'static,
    {
        if self.is_cancelled() {
            return Err(RebalancerError::Cancelled);
        }
        let (done_tx, done_rx) = bounded(1);
        thread::Builder::new()
            .name("rebalancer-blocking".into())
            .spawn(move || {
                // the receiver is gone when the caller was cancelled
                let _ = done_tx.send(work());
            })?;

        select! {
            recv(done_rx) -> outcome => outcome.unwrap_or_else(|_| {
                Err(RebalancerError::Io(std::io::Error::other(
                    "blocking worker exited without a result",
                )))
            }),
            recv(self.receiver) -> _ => {
                debug!("blocking call abandoned on cancellation");
                Err(RebalancerError::Cancelled)
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one attempt in [`retry_after`].
pub enum Attempt<T> {
    Done(T),
    RetryAfter(Duration),
}

/// Calls `attempt` until it is done, waiting out every requested delay.
///
/// There is no attempt limit. Cancellation before an attempt, during a wait,
/// or while an attempt was running returns [`RebalancerError::Cancelled`].
pub fn retry_after<T, F>(cancel: &CancelToken, mut attempt: F) -> Result<T, RebalancerError>
where
    F: FnMut() -> Result<Attempt<T>, RebalancerError>,
{
    loop {
        if cancel.is_cancelled() {
            return Err(RebalancerError::Cancelled);
        }
        let outcome = attempt()?;
        if cancel.is_cancelled() {
            return Err(RebalancerError::Cancelled);
        }
        match outcome {
            Attempt::Done(value) => return Ok(value),
            Attempt::RetryAfter(delay) => {
                info!(delay_ms = delay.as_millis() as u64, "service not ready, waiting");
                cancel.wait(delay)?;
            }
        }
    }
}
