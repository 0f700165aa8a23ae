//! The asynchronous pipeline front-end.
//!
//! Every mutating call is enqueued as one action and returns immediately; the
//! worker applies actions in call order however long each one suspends.
//! Result-producing calls enqueue a read behind everything issued before them
//! and await it.

use std::cmp::Ordering;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{self, Stream};
use futures::FutureExt;
use serde::Serialize;

use super::engine::{AsyncPipe, PipeState};
use super::pivot::AsyncPivotSpec;
use super::queue::{ActionQueue, QueueState};
use super::stages::{
    reduce_with_initial, reduce_without_initial, AsyncFilterStage, AsyncMapStage, AsyncSlot,
    AsyncSortStage,
};
use crate::errors::{AccumulateError, CallbackResult, Result};
use crate::pipeline::policy::{Capture, ErrorPolicy, Raise};
use crate::types::{AccumulateOptions, ErrorHandling, Record, Resolved};

/// A composable pipeline whose callbacks may suspend.
///
/// Construction spawns the pipeline's worker task, so it must happen inside a
/// Tokio runtime.
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use rapid_accumulate::accumulate_async;
///
/// let acc = accumulate_async(vec![3, 1, 2])
///     .sort(|a, b| async move { a.cmp(&b) })
///     .append(vec![0]);
/// assert_eq!(acc.to_vec().await.unwrap(), vec![0, 1, 2, 3]);
/// # }
/// ```
pub struct AsyncAccumulator<In, Out, P = Capture> {
    queue: ActionQueue<PipeState>,
    label: Option<Arc<str>>,
    _types: PhantomData<fn(In) -> (Out, P)>,
}

impl<T: Clone + Send + 'static> AsyncAccumulator<T, T, Capture> {
    /// Create a capture-mode pipeline over `data`.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new(data: Vec<T>) -> Self {
        Self::with_options(data, AccumulateOptions::default())
    }
}

impl<T: Clone + Send + 'static, P: ErrorPolicy> AsyncAccumulator<T, T, P> {
    /// Create a pipeline over `data` with the given options.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn with_options(data: Vec<T>, options: AccumulateOptions) -> Self {
        let label: Option<Arc<str>> = options.label.map(Arc::from);
        let pipe = AsyncPipe::source(data, label.clone());
        Self {
            queue: ActionQueue::spawn(PipeState::new(pipe)),
            label,
            _types: PhantomData,
        }
    }
}

impl<In, Out, P: ErrorPolicy> AsyncAccumulator<In, Out, P> {
    pub fn error_handling(&self) -> ErrorHandling {
        P::HANDLING
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Number of actions not yet applied.
    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    pub fn queue_state(&self) -> QueueState {
        self.queue.state()
    }

    /// Wait until every call issued so far has taken effect.
    pub async fn drain(&self) -> Result<()> {
        self.queue.drain().await
    }

    fn retype<Next>(self) -> AsyncAccumulator<Out, Next, P> {
        AsyncAccumulator {
            queue: self.queue,
            label: self.label,
            _types: PhantomData,
        }
    }
}

impl<In, Out, P> AsyncAccumulator<In, Out, P>
where
    In: Send + 'static,
    Out: Clone + Send + 'static,
    P: ErrorPolicy,
{
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    fn submit<F>(&self, action: F)
    where
        F: FnOnce(PipeState) -> BoxFuture<'static, PipeState> + Send + 'static,
    {
        // A closed queue is reported by the next result-producing call.
        if let Err(err) = self.queue.enqueue(action) {
            log_event!(error, "dropped action: {}", err.message);
        }
    }

    // ------------------------------------------------------------------------
    // Data
    // ------------------------------------------------------------------------

    /// Queue data for the stage current at this point in the call order.
    pub fn append(self, data: impl IntoIterator<Item = In>) -> Self {
        let data: Vec<In> = data.into_iter().collect();
        self.submit(move |mut state| {
            async move {
                if let Ok(mut pipe) = state.take::<In, Out>() {
                    pipe.feed(data).await;
                    state.put(pipe);
                }
                state
            }
            .boxed()
        });
        self
    }

    pub fn append_one(self, datum: In) -> Self {
        self.append(std::iter::once(datum))
    }

    // ------------------------------------------------------------------------
    // Transforms
    // ------------------------------------------------------------------------

    fn pipe<Next>(self, next: AsyncSlot<Out, Next>) -> AsyncAccumulator<Out, Next, P>
    where
        Next: Clone + Send + 'static,
    {
        self.submit(move |mut state| {
            async move {
                if let Ok(pipe) = state.take::<In, Out>() {
                    let pipe = pipe.pipe(next).await;
                    state.put(pipe);
                }
                state
            }
            .boxed()
        });
        self.retype()
    }

    /// Fold everything into one value; the first datum seeds the fold.
    pub fn reduce<F, Fut>(self, reducer: F) -> AsyncAccumulator<Out, Out, P>
    where
        F: FnMut(Out, Out, usize) -> Fut + Send + 'static,
        Fut: Future<Output = CallbackResult<Out>> + Send + 'static,
    {
        self.pipe(reduce_without_initial(reducer))
    }

    /// Fold everything into one value starting from `initial`.
    pub fn reduce_with<R, F, Fut>(self, initial: R, reducer: F) -> AsyncAccumulator<Out, R, P>
    where
        R: Clone + Send + 'static,
        F: FnMut(R, Out, usize) -> Fut + Send + 'static,
        Fut: Future<Output = CallbackResult<R>> + Send + 'static,
    {
        self.pipe(reduce_with_initial(reducer, initial))
    }

    pub fn map<U, F, Fut>(self, mapper: F) -> AsyncAccumulator<Out, U, P>
    where
        U: Clone + Send + 'static,
        F: FnMut(Out, usize) -> Fut + Send + 'static,
        Fut: Future<Output = U> + Send + 'static,
    {
        self.pipe(AsyncSlot::active(AsyncMapStage::new(mapper)))
    }

    pub fn filter<F, Fut>(self, predicate: F) -> AsyncAccumulator<Out, Out, P>
    where
        F: FnMut(Out, usize) -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.pipe(AsyncSlot::active(AsyncFilterStage::new(predicate)))
    }

    /// Order the output online: every datum is inserted into place as it
    /// arrives.
    pub fn sort<F, Fut>(self, compare: F) -> AsyncAccumulator<Out, Out, P>
    where
        F: FnMut(Out, Out) -> Fut + Send + 'static,
        Fut: Future<Output = Ordering> + Send + 'static,
    {
        self.pipe(AsyncSlot::active(AsyncSortStage::new(compare)))
    }

    pub fn pivot<R>(self, spec: AsyncPivotSpec<Out, R>) -> AsyncAccumulator<Out, Record, P>
    where
        R: Clone + Serialize + Send + 'static,
    {
        self.pipe(AsyncSlot::active(spec.into_stage()))
    }

    // ------------------------------------------------------------------------
    // Results
    // ------------------------------------------------------------------------

    /// Resolve the output set once every earlier call has taken effect.
    pub async fn result(&self) -> Result<Resolved<Out>> {
        self.to_vec().await.map(Resolved::from)
    }

    pub async fn to_vec(&self) -> Result<Vec<Out>> {
        let outcome = self
            .queue
            .call(|mut state| {
                async move {
                    let outcome = match state.take::<In, Out>() {
                        Ok(mut pipe) => {
                            let outcome = pipe.resolve().await;
                            state.put(pipe);
                            outcome
                        }
                        Err(err) => Err(err),
                    };
                    (state, outcome)
                }
                .boxed()
            })
            .await?;

        #[cfg(feature = "tracing")]
        if let Err(err) = &outcome {
            if P::HANDLING.raises() {
                log_event!(
                    error,
                    label = self.label.as_deref().unwrap_or("-"),
                    code = err.code.as_str(),
                    "pipeline failed: {}",
                    err.message
                );
            }
        }
        outcome
    }

    /// The captured error, once every earlier call has taken effect.
    pub async fn error(&self) -> Result<Option<AccumulateError>> {
        self.queue
            .call(|mut state| {
                async move {
                    let error = match state.take::<In, Out>() {
                        Ok(pipe) => {
                            let error = pipe.error().cloned();
                            state.put(pipe);
                            error
                        }
                        Err(err) => Some(err),
                    };
                    (state, error)
                }
                .boxed()
            })
            .await
    }
}

impl<In, Out> AsyncAccumulator<In, Out, Capture> {
    /// Switch to raise mode. A captured error is kept.
    pub fn enable_exceptions(self) -> AsyncAccumulator<In, Out, Raise> {
        AsyncAccumulator {
            queue: self.queue,
            label: self.label,
            _types: PhantomData,
        }
    }
}

impl<In, Out> AsyncAccumulator<In, Out, Raise>
where
    In: Send + 'static,
    Out: Clone + Send + 'static,
{
    /// Resolve and stream the output set; a failure is the only item.
    pub async fn into_stream(self) -> impl Stream<Item = Result<Out>> + Send {
        let items: Vec<Result<Out>> = match self.to_vec().await {
            Ok(items) => items.into_iter().map(Ok).collect(),
            Err(err) => vec![Err(err)],
        };
        stream::iter(items)
    }
}

impl<In, Out, P: ErrorPolicy> fmt::Debug for AsyncAccumulator<In, Out, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncAccumulator")
            .field("error_handling", &P::HANDLING)
            .field("label", &self.label)
            .field("queue", &self.queue)
            .finish()
    }
}
