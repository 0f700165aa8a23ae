//! Asynchronous stages: callbacks may suspend.
//!
//! Every stage is `Send` so the queue worker can own it across awaits.
//! Callbacks receive owned clones of the data they inspect, which keeps their
//! futures `'static`.

use std::cmp::Ordering;
use std::future::Future;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::errors::{AccumulateError, CallbackResult, Result, StageKind};

// ============================================================================
// AsyncStage
// ============================================================================

/// Runtime behavior of one asynchronous transform.
///
/// Same contract as [`Stage`](crate::pipeline::Stage) without `drain`: the
/// engine resolves a stage before replacing it.
#[async_trait]
pub trait AsyncStage<In, Out>: Send {
    fn kind(&self) -> StageKind;

    /// Accept one datum.
    async fn append(&mut self, datum: In) -> Result<()>;

    /// Produce the current output set.
    async fn resolve(&mut self) -> Result<Vec<Out>>;
}

/// Builds the real stage from the first datum it receives.
pub type AsyncInstaller<In, Out> = Box<dyn FnOnce(In) -> Box<dyn AsyncStage<In, Out>> + Send>;

/// The stage currently handling data for an asynchronous pipeline.
pub enum AsyncSlot<In, Out> {
    Active(Box<dyn AsyncStage<In, Out>>),
    Deferred {
        kind: StageKind,
        install: Option<AsyncInstaller<In, Out>>,
        unresolved: fn() -> AccumulateError,
    },
}

impl<In: Send + 'static, Out: Send + 'static> AsyncSlot<In, Out> {
    pub fn active(stage: impl AsyncStage<In, Out> + 'static) -> Self {
        Self::Active(Box::new(stage))
    }

    /// Defer stage construction until the first datum arrives; resolving
    /// before that fails with `unresolved()`.
    pub fn deferred(
        kind: StageKind,
        install: impl FnOnce(In) -> Box<dyn AsyncStage<In, Out>> + Send + 'static,
        unresolved: fn() -> AccumulateError,
    ) -> Self {
        Self::Deferred {
            kind,
            install: Some(Box::new(install)),
            unresolved,
        }
    }

    pub fn kind(&self) -> StageKind {
        match self {
            Self::Active(stage) => stage.kind(),
            Self::Deferred { kind, .. } => *kind,
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred { .. })
    }

    pub async fn append(&mut self, datum: In) -> Result<()> {
        match self {
            Self::Active(stage) => stage.append(datum).await,
            Self::Deferred { kind, install, .. } => {
                let kind = *kind;
                let install = install.take().ok_or_else(|| {
                    AccumulateError::internal(kind, "deferred stage was already installed")
                })?;
                *self = Self::Active(install(datum));
                Ok(())
            }
        }
    }

    pub async fn resolve(&mut self) -> Result<Vec<Out>> {
        match self {
            Self::Active(stage) => stage.resolve().await,
            Self::Deferred { unresolved, .. } => Err(unresolved()),
        }
    }
}

// ============================================================================
// Erased callbacks
// ============================================================================

type Mapper<In, Out> = Box<dyn FnMut(In, usize) -> BoxFuture<'static, Out> + Send>;
type Predicate<T> = Box<dyn FnMut(T, usize) -> BoxFuture<'static, bool> + Send>;
type Comparator<T> = Box<dyn FnMut(T, T) -> BoxFuture<'static, Ordering> + Send>;
type Reducer<R, T> = Box<dyn FnMut(R, T, usize) -> BoxFuture<'static, CallbackResult<R>> + Send>;

// ============================================================================
// Stages
// ============================================================================

/// Initial input followed by everything appended since.
pub struct AsyncSourceStage<T> {
    items: Vec<T>,
}

impl<T> AsyncSourceStage<T> {
    pub fn new(initial: Vec<T>) -> Self {
        Self { items: initial }
    }
}

#[async_trait]
impl<T: Clone + Send + 'static> AsyncStage<T, T> for AsyncSourceStage<T> {
    fn kind(&self) -> StageKind {
        StageKind::Source
    }

    async fn append(&mut self, datum: T) -> Result<()> {
        self.items.push(datum);
        Ok(())
    }

    async fn resolve(&mut self) -> Result<Vec<T>> {
        Ok(self.items.clone())
    }
}

pub struct AsyncMapStage<In, Out> {
    mapper: Mapper<In, Out>,
    index: usize,
    buffer: Vec<Out>,
}

impl<In, Out> AsyncMapStage<In, Out> {
    pub fn new<F, Fut>(mut mapper: F) -> Self
    where
        F: FnMut(In, usize) -> Fut + Send + 'static,
        Fut: Future<Output = Out> + Send + 'static,
    {
        Self {
            mapper: Box::new(move |datum, index| mapper(datum, index).boxed()),
            index: 0,
            buffer: Vec::new(),
        }
    }
}

#[async_trait]
impl<In, Out> AsyncStage<In, Out> for AsyncMapStage<In, Out>
where
    In: Send + 'static,
    Out: Clone + Send + 'static,
{
    fn kind(&self) -> StageKind {
        StageKind::Map
    }

    async fn append(&mut self, datum: In) -> Result<()> {
        let index = self.index;
        self.index += 1;
        let mapped = (self.mapper)(datum, index).await;
        self.buffer.push(mapped);
        Ok(())
    }

    async fn resolve(&mut self) -> Result<Vec<Out>> {
        Ok(self.buffer.clone())
    }
}

pub struct AsyncFilterStage<T> {
    predicate: Predicate<T>,
    index: usize,
    buffer: Vec<T>,
}

impl<T> AsyncFilterStage<T> {
    pub fn new<F, Fut>(mut predicate: F) -> Self
    where
        F: FnMut(T, usize) -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        Self {
            predicate: Box::new(move |datum, index| predicate(datum, index).boxed()),
            index: 0,
            buffer: Vec::new(),
        }
    }
}

#[async_trait]
impl<T: Clone + Send + 'static> AsyncStage<T, T> for AsyncFilterStage<T> {
    fn kind(&self) -> StageKind {
        StageKind::Filter
    }

    async fn append(&mut self, datum: T) -> Result<()> {
        let index = self.index;
        self.index += 1;
        if (self.predicate)(datum.clone(), index).await {
            self.buffer.push(datum);
        }
        Ok(())
    }

    async fn resolve(&mut self) -> Result<Vec<T>> {
        Ok(self.buffer.clone())
    }
}

/// Online insertion sort.
///
/// Each datum is compared against the buffer from the left and inserted
/// before the first element it does not sort after. The buffer is sorted
/// after every append, so resolution never calls the comparator.
pub struct AsyncSortStage<T> {
    compare: Comparator<T>,
    buffer: Vec<T>,
}

impl<T> AsyncSortStage<T> {
    pub fn new<F, Fut>(mut compare: F) -> Self
    where
        F: FnMut(T, T) -> Fut + Send + 'static,
        Fut: Future<Output = Ordering> + Send + 'static,
    {
        Self {
            compare: Box::new(move |a, b| compare(a, b).boxed()),
            buffer: Vec::new(),
        }
    }
}

#[async_trait]
impl<T: Clone + Send + 'static> AsyncStage<T, T> for AsyncSortStage<T> {
    fn kind(&self) -> StageKind {
        StageKind::Sort
    }

    async fn append(&mut self, datum: T) -> Result<()> {
        let mut position = self.buffer.len();
        for i in 0..self.buffer.len() {
            let existing = self.buffer[i].clone();
            if (self.compare)(datum.clone(), existing).await != Ordering::Greater {
                position = i;
                break;
            }
        }
        self.buffer.insert(position, datum);
        Ok(())
    }

    async fn resolve(&mut self) -> Result<Vec<T>> {
        Ok(self.buffer.clone())
    }
}

/// Running fold; poisoned by a reducer failure like its synchronous
/// counterpart.
pub struct AsyncReduceStage<R, T> {
    reducer: Reducer<R, T>,
    value: Option<R>,
    index: usize,
    failure: Option<AccumulateError>,
}

impl<R, T> AsyncReduceStage<R, T> {
    fn starting_at(reducer: Reducer<R, T>, value: R, index: usize) -> Self {
        Self {
            reducer,
            value: Some(value),
            index,
            failure: None,
        }
    }

    fn poisoned(&self) -> AccumulateError {
        self.failure.clone().unwrap_or_else(|| {
            AccumulateError::internal(StageKind::Reduce, "running value missing without a failure")
        })
    }
}

#[async_trait]
impl<R, T> AsyncStage<T, R> for AsyncReduceStage<R, T>
where
    R: Clone + Send + 'static,
    T: Send + 'static,
{
    fn kind(&self) -> StageKind {
        StageKind::Reduce
    }

    async fn append(&mut self, datum: T) -> Result<()> {
        let Some(accumulated) = self.value.take() else {
            return Err(self.poisoned());
        };
        let index = self.index;
        self.index += 1;
        match (self.reducer)(accumulated, datum, index).await {
            Ok(next) => {
                self.value = Some(next);
                Ok(())
            }
            Err(err) => {
                let err = AccumulateError::reducer(err, index);
                self.failure = Some(err.clone());
                Err(err)
            }
        }
    }

    async fn resolve(&mut self) -> Result<Vec<R>> {
        match &self.value {
            Some(value) => Ok(vec![value.clone()]),
            None => Err(self.poisoned()),
        }
    }
}

fn erase_reducer<R, T, F, Fut>(mut reducer: F) -> Reducer<R, T>
where
    F: FnMut(R, T, usize) -> Fut + Send + 'static,
    Fut: Future<Output = CallbackResult<R>> + Send + 'static,
{
    Box::new(move |acc, datum, index| reducer(acc, datum, index).boxed())
}

/// Reduction with an explicit initial value; the first datum gets index 0.
pub fn reduce_with_initial<T, R, F, Fut>(reducer: F, initial: R) -> AsyncSlot<T, R>
where
    T: Send + 'static,
    R: Clone + Send + 'static,
    F: FnMut(R, T, usize) -> Fut + Send + 'static,
    Fut: Future<Output = CallbackResult<R>> + Send + 'static,
{
    AsyncSlot::active(AsyncReduceStage::starting_at(
        erase_reducer(reducer),
        initial,
        0,
    ))
}

/// Reduction seeded by the first datum; the fold starts at index 1.
pub fn reduce_without_initial<T, F, Fut>(reducer: F) -> AsyncSlot<T, T>
where
    T: Clone + Send + 'static,
    F: FnMut(T, T, usize) -> Fut + Send + 'static,
    Fut: Future<Output = CallbackResult<T>> + Send + 'static,
{
    let reducer = erase_reducer(reducer);
    AsyncSlot::deferred(
        StageKind::Reduce,
        move |first: T| -> Box<dyn AsyncStage<T, T>> {
            Box::new(AsyncReduceStage::starting_at(reducer, first, 1))
        },
        AccumulateError::no_data,
    )
}
