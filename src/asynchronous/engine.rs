//! Typed pipeline core owned by the queue worker.
//!
//! [`AsyncPipe`] is the asynchronous counterpart of the synchronous engine's
//! state: one slot, the captured error, and the label. The front-end never
//! holds one directly; the worker keeps it erased in a [`PipeState`] and
//! narrows it back for each action. Pivot partitions use `AsyncPipe` without
//! a queue, since their parent's worker already serializes them.

use std::any::Any;
use std::sync::Arc;

use super::stages::{AsyncSlot, AsyncSourceStage};
use crate::errors::{AccumulateError, Result, StageKind};

pub(crate) struct AsyncPipe<In, Out> {
    slot: AsyncSlot<In, Out>,
    error: Option<AccumulateError>,
    label: Option<Arc<str>>,
}

impl<T: Clone + Send + 'static> AsyncPipe<T, T> {
    pub(crate) fn source(data: Vec<T>, label: Option<Arc<str>>) -> Self {
        Self::with_slot(AsyncSlot::active(AsyncSourceStage::new(data)), label)
    }
}

impl<In, Out> AsyncPipe<In, Out> {
    pub(crate) fn with_slot(slot: AsyncSlot<In, Out>, label: Option<Arc<str>>) -> Self {
        Self {
            slot,
            error: None,
            label,
        }
    }

    pub(crate) fn error(&self) -> Option<&AccumulateError> {
        self.error.as_ref()
    }

    fn capture(&mut self, err: AccumulateError) {
        if self.error.is_some() {
            return;
        }
        log_event!(
            warn,
            label = self.label.as_deref().unwrap_or("-"),
            code = err.code.as_str(),
            stage = err.stage.as_str(),
            "captured failure: {}",
            err.message
        );
        self.error = Some(err);
    }
}

impl<In, Out> AsyncPipe<In, Out>
where
    In: Send + 'static,
    Out: Clone + Send + 'static,
{
    /// Route data into the slot one datum at a time, capturing the first
    /// failure. A no-op once an error is captured.
    pub(crate) async fn feed(&mut self, data: Vec<In>) {
        if self.error.is_some() {
            return;
        }
        for datum in data {
            if let Err(err) = self.slot.append(datum).await {
                self.capture(err);
                break;
            }
        }
    }

    /// The captured error, or the current output set.
    pub(crate) async fn resolve(&mut self) -> Result<Vec<Out>> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        match self.slot.resolve().await {
            Ok(data) => Ok(data),
            Err(err) => {
                self.capture(err.clone());
                Err(err)
            }
        }
    }

    /// Install `next`, replaying the current output into it.
    pub(crate) async fn pipe<Next>(self, next: AsyncSlot<Out, Next>) -> AsyncPipe<Out, Next>
    where
        Next: Clone + Send + 'static,
    {
        let AsyncPipe {
            mut slot,
            error,
            label,
        } = self;

        if error.is_some() {
            return AsyncPipe {
                slot: next,
                error,
                label,
            };
        }

        #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
        let previous = slot.kind();
        let mut pipe = AsyncPipe::with_slot(next, label);
        match slot.resolve().await {
            Ok(data) => {
                log_event!(
                    debug,
                    label = pipe.label.as_deref().unwrap_or("-"),
                    from = previous.as_str(),
                    to = pipe.slot.kind().as_str(),
                    replayed = data.len(),
                    "installed stage"
                );
                pipe.feed(data).await;
            }
            Err(err) => pipe.capture(err),
        }
        pipe
    }
}

// ============================================================================
// PipeState — the worker's erased view
// ============================================================================

/// State owned by an asynchronous accumulator's queue worker.
pub(crate) struct PipeState {
    pipe: Option<Box<dyn Any + Send>>,
    fault: Option<AccumulateError>,
}

impl PipeState {
    pub(crate) fn new<In, Out>(pipe: AsyncPipe<In, Out>) -> Self
    where
        In: Send + 'static,
        Out: Send + 'static,
    {
        Self {
            pipe: Some(Box::new(pipe)),
            fault: None,
        }
    }

    /// Narrow the stored pipe to `AsyncPipe<In, Out>`.
    ///
    /// A missing pipe or a type mismatch is an internal fault; it is recorded
    /// and reported by every later `take`.
    pub(crate) fn take<In, Out>(&mut self) -> Result<AsyncPipe<In, Out>>
    where
        In: Send + 'static,
        Out: Send + 'static,
    {
        if let Some(fault) = &self.fault {
            return Err(fault.clone());
        }
        let Some(boxed) = self.pipe.take() else {
            return Err(self.fail(AccumulateError::internal(
                StageKind::Source,
                "pipeline state is missing",
            )));
        };
        match boxed.downcast::<AsyncPipe<In, Out>>() {
            Ok(pipe) => Ok(*pipe),
            Err(boxed) => {
                self.pipe = Some(boxed);
                Err(self.fail(AccumulateError::internal(
                    StageKind::Source,
                    format!(
                        "pipeline state is not a {}",
                        std::any::type_name::<AsyncPipe<In, Out>>()
                    ),
                )))
            }
        }
    }

    pub(crate) fn put<In, Out>(&mut self, pipe: AsyncPipe<In, Out>)
    where
        In: Send + 'static,
        Out: Send + 'static,
    {
        self.pipe = Some(Box::new(pipe));
    }

    fn fail(&mut self, err: AccumulateError) -> AccumulateError {
        log_event!(error, "internal fault: {}", err.message);
        self.fault.get_or_insert(err).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asynchronous::stages::{reduce_with_initial, AsyncMapStage};
    use crate::errors::{CallbackError, ErrorCode};

    #[tokio::test]
    async fn test_pipe_replays_and_feeds() {
        let mut pipe = AsyncPipe::source(vec![1i64, 2, 3], None);
        pipe.feed(vec![4]).await;
        let mut pipe = pipe
            .pipe(AsyncSlot::active(AsyncMapStage::new(|d: i64, _| async move { d * 2 })))
            .await;
        pipe.feed(vec![5]).await;
        assert_eq!(pipe.resolve().await.unwrap(), vec![2, 4, 6, 8, 10]);
    }

    #[tokio::test]
    async fn test_failure_skips_replay_into_later_stages() {
        let pipe = AsyncPipe::source(vec![1i64, 2], Some(Arc::from("t")));
        let failing = reduce_with_initial(
            |_acc: i64, _d: i64, _| async move { Err::<i64, CallbackError>("No way!".into()) },
            0,
        );
        let pipe = pipe.pipe(failing).await;
        assert_eq!(pipe.error().map(|e| e.code), Some(ErrorCode::ReducerFailed));

        let mut pipe = pipe
            .pipe(AsyncSlot::active(AsyncMapStage::new(|d: i64, _| async move { d })))
            .await;
        pipe.feed(vec![7]).await;
        assert_eq!(
            pipe.resolve().await.unwrap_err().code,
            ErrorCode::ReducerFailed
        );
    }

    #[test]
    fn test_state_downcast_mismatch_is_internal() {
        let mut state = PipeState::new(AsyncPipe::<u8, u8>::with_slot(
            AsyncSlot::active(AsyncSourceStage::new(vec![1u8])),
            None,
        ));
        let err = state.take::<u8, String>().err().map(|e| e.code);
        assert_eq!(err, Some(ErrorCode::Internal));
        // The fault sticks even for the right type.
        assert!(state.take::<u8, u8>().is_err());
    }
}
