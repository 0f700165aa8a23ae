//! Sequential action queue.
//!
//! One worker task owns the state `S` and applies queued actions to it in
//! FIFO order, awaiting each to completion before starting the next. Callers
//! never touch `S` directly; they only enqueue further actions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};

use crate::errors::{AccumulateError, Result};

/// A unit of work applied to the worker's state.
pub type Action<S> = Box<dyn FnOnce(S) -> BoxFuture<'static, S> + Send>;

/// Whether the worker has queued work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// Nothing queued or running
    Idle,
    /// At least one action queued or running
    Draining,
    /// The worker has stopped; queued actions will never run
    Closed,
}

/// FIFO of actions serviced by a single worker task.
pub struct ActionQueue<S> {
    tx: mpsc::UnboundedSender<Action<S>>,
    pending: Arc<AtomicUsize>,
}

impl<S: Send + 'static> ActionQueue<S> {
    /// Start a worker task owning `state`.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn spawn(state: S) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        tokio::spawn(run_worker(state, rx, Arc::clone(&pending)));
        Self { tx, pending }
    }

    /// Queue an action behind everything already queued.
    pub fn enqueue<F>(&self, action: F) -> Result<()>
    where
        F: FnOnce(S) -> BoxFuture<'static, S> + Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::SeqCst);
        log_event!(trace, pending = self.pending(), "action enqueued");
        self.tx.send(Box::new(action)).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            AccumulateError::queue_closed()
        })
    }

    /// Queue an action and wait for the value it produces.
    ///
    /// Everything enqueued earlier has run by the time the action starts.
    pub async fn call<R, F>(&self, action: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(S) -> BoxFuture<'static, (S, R)> + Send + 'static,
    {
        let (response_tx, response_rx) = oneshot::channel();
        self.enqueue(move |state| {
            async move {
                let (state, response) = action(state).await;
                let _ = response_tx.send(response);
                state
            }
            .boxed()
        })?;
        response_rx
            .await
            .map_err(|_| AccumulateError::queue_closed())
    }

    /// Wait until every action enqueued so far has run.
    pub async fn drain(&self) -> Result<()> {
        self.call(|state| async move { (state, ()) }.boxed()).await
    }

    /// Number of actions queued or running. Zero once the worker has stopped.
    pub fn pending(&self) -> usize {
        if self.is_closed() {
            return 0;
        }
        self.pending.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> QueueState {
        if self.is_closed() {
            QueueState::Closed
        } else if self.pending() == 0 {
            QueueState::Idle
        } else {
            QueueState::Draining
        }
    }

    /// Check if the worker has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<S: Send + 'static> std::fmt::Debug for ActionQueue<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionQueue")
            .field("pending", &self.pending())
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

async fn run_worker<S>(
    mut state: S,
    mut rx: mpsc::UnboundedReceiver<Action<S>>,
    pending: Arc<AtomicUsize>,
) {
    while let Some(action) = rx.recv().await {
        state = action(state).await;
        if pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            log_event!(trace, "queue idle");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_actions_run_in_order_despite_suspension() {
        let queue = ActionQueue::spawn(Vec::<u32>::new());
        for (i, delay) in [30u64, 0, 10].into_iter().enumerate() {
            queue
                .enqueue(move |mut log| {
                    async move {
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        log.push(i as u32);
                        log
                    }
                    .boxed()
                })
                .unwrap();
        }
        assert_eq!(queue.state(), QueueState::Draining);

        let seen = queue
            .call(|log| {
                async move {
                    let snapshot = log.clone();
                    (log, snapshot)
                }
                .boxed()
            })
            .await
            .unwrap();
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_drain_returns_to_idle() {
        let queue = ActionQueue::spawn(0u32);
        queue
            .enqueue(|n| async move { n + 1 }.boxed())
            .unwrap();
        queue.drain().await.unwrap();
        // The drain action's counter is released right after it responds.
        tokio::task::yield_now().await;
        assert_eq!(queue.state(), QueueState::Idle);
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn test_call_after_worker_panic_is_queue_closed() {
        let queue = ActionQueue::spawn(0u32);
        queue
            .enqueue(|n: u32| {
                async move {
                    assert!(n > 100, "worker dies");
                    n
                }
                .boxed()
            })
            .unwrap();
        let err = queue
            .call(|n| async move { (n, n) }.boxed())
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::errors::ErrorCode::QueueClosed);
        assert_eq!(queue.state(), QueueState::Closed);
        assert_eq!(queue.pending(), 0);
    }
}
