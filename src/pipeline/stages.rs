//! Built-in synchronous stages: source, map, filter, sort, and reduce.
//!
//! Each stage owns its buffer (or running value) and a per-stage index that
//! starts at 0 when the stage is installed.

use std::cmp::Ordering;

use super::traits::{Stage, StageSlot};
use crate::errors::{AccumulateError, CallbackResult, Result, StageKind};

// ============================================================================
// SourceStage — the construction-time stage
// ============================================================================

/// Default stage: the initial input followed by everything appended since,
/// in arrival order.
#[derive(Debug, Clone, Default)]
pub struct SourceStage<T> {
    initial: Vec<T>,
    appended: Vec<T>,
}

impl<T> SourceStage<T> {
    /// Create a source stage over the initial input set.
    pub fn new(initial: Vec<T>) -> Self {
        Self {
            initial,
            appended: Vec::new(),
        }
    }
}

impl<T: Clone> Stage<T, T> for SourceStage<T> {
    fn kind(&self) -> StageKind {
        StageKind::Source
    }

    fn append(&mut self, datum: T) -> Result<()> {
        self.appended.push(datum);
        Ok(())
    }

    fn resolve(&mut self) -> Result<Vec<T>> {
        let mut out = Vec::with_capacity(self.initial.len() + self.appended.len());
        out.extend(self.initial.iter().cloned());
        out.extend(self.appended.iter().cloned());
        Ok(out)
    }

    fn drain(self: Box<Self>) -> Result<Vec<T>> {
        let SourceStage {
            mut initial,
            appended,
        } = *self;
        initial.extend(appended);
        Ok(initial)
    }
}

// ============================================================================
// MapStage
// ============================================================================

/// Applies `mapper(datum, index)` to every datum.
pub struct MapStage<Out, F> {
    mapper: F,
    index: usize,
    buffer: Vec<Out>,
}

impl<Out, F> MapStage<Out, F> {
    pub fn new(mapper: F) -> Self {
        Self {
            mapper,
            index: 0,
            buffer: Vec::new(),
        }
    }
}

impl<In, Out, F> Stage<In, Out> for MapStage<Out, F>
where
    Out: Clone,
    F: FnMut(In, usize) -> Out,
{
    fn kind(&self) -> StageKind {
        StageKind::Map
    }

    fn append(&mut self, datum: In) -> Result<()> {
        let mapped = (self.mapper)(datum, self.index);
        self.index += 1;
        self.buffer.push(mapped);
        Ok(())
    }

    fn resolve(&mut self) -> Result<Vec<Out>> {
        Ok(self.buffer.clone())
    }

    fn drain(self: Box<Self>) -> Result<Vec<Out>> {
        Ok(self.buffer)
    }
}

// ============================================================================
// FilterStage
// ============================================================================

/// Keeps the data for which `predicate(datum, index)` holds.
pub struct FilterStage<T, F> {
    predicate: F,
    index: usize,
    buffer: Vec<T>,
}

impl<T, F> FilterStage<T, F> {
    pub fn new(predicate: F) -> Self {
        Self {
            predicate,
            index: 0,
            buffer: Vec::new(),
        }
    }
}

impl<T, F> Stage<T, T> for FilterStage<T, F>
where
    T: Clone,
    F: FnMut(&T, usize) -> bool,
{
    fn kind(&self) -> StageKind {
        StageKind::Filter
    }

    fn append(&mut self, datum: T) -> Result<()> {
        let keep = (self.predicate)(&datum, self.index);
        self.index += 1;
        if keep {
            self.buffer.push(datum);
        }
        Ok(())
    }

    fn resolve(&mut self) -> Result<Vec<T>> {
        Ok(self.buffer.clone())
    }

    fn drain(self: Box<Self>) -> Result<Vec<T>> {
        Ok(self.buffer)
    }
}

// ============================================================================
// SortStage
// ============================================================================

/// Buffers everything and sorts the complete buffer once per resolution.
///
/// The sort is a stable merge sort. A comparator that is not a total order
/// leaves the order unspecified but never panics.
pub struct SortStage<T, F> {
    compare: F,
    buffer: Vec<T>,
}

impl<T, F> SortStage<T, F>
where
    F: FnMut(&T, &T) -> Ordering,
{
    pub fn new(compare: F) -> Self {
        Self {
            compare,
            buffer: Vec::new(),
        }
    }

    fn sort_buffer(&mut self) {
        let buffer = std::mem::take(&mut self.buffer);
        self.buffer = merge_sort(buffer, &mut self.compare);
    }
}

fn merge_sort<T, F>(mut items: Vec<T>, compare: &mut F) -> Vec<T>
where
    F: FnMut(&T, &T) -> Ordering,
{
    if items.len() <= 1 {
        return items;
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort(items, compare);
    let right = merge_sort(right, compare);

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        // Ties take from the left run.
        let take_right = match (left.peek(), right.peek()) {
            (Some(a), Some(b)) => compare(b, a) == Ordering::Less,
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (None, None) => break,
        };
        let next = if take_right { right.next() } else { left.next() };
        merged.extend(next);
    }
    merged
}

impl<T, F> Stage<T, T> for SortStage<T, F>
where
    T: Clone,
    F: FnMut(&T, &T) -> Ordering,
{
    fn kind(&self) -> StageKind {
        StageKind::Sort
    }

    fn append(&mut self, datum: T) -> Result<()> {
        self.buffer.push(datum);
        Ok(())
    }

    fn resolve(&mut self) -> Result<Vec<T>> {
        self.sort_buffer();
        Ok(self.buffer.clone())
    }

    fn drain(mut self: Box<Self>) -> Result<Vec<T>> {
        self.sort_buffer();
        Ok(self.buffer)
    }
}

// ============================================================================
// ReduceStage
// ============================================================================

/// Running fold of `reducer(accumulated, datum, index)`.
///
/// The reducer takes the accumulated value by value. If it fails, the value
/// is gone: the stage is poisoned and every later append or resolution reports
/// the recorded failure.
pub struct ReduceStage<R, F> {
    reducer: F,
    value: Option<R>,
    index: usize,
    failure: Option<AccumulateError>,
}

impl<R, F> ReduceStage<R, F> {
    /// Start folding from `value`; the next datum is folded with `index`.
    pub fn starting_at(reducer: F, value: R, index: usize) -> Self {
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

impl<T, R, F> Stage<T, R> for ReduceStage<R, F>
where
    R: Clone,
    F: FnMut(R, T, usize) -> CallbackResult<R>,
{
    fn kind(&self) -> StageKind {
        StageKind::Reduce
    }

    fn append(&mut self, datum: T) -> Result<()> {
        let Some(accumulated) = self.value.take() else {
            return Err(self.poisoned());
        };
        let index = self.index;
        self.index += 1;
        match (self.reducer)(accumulated, datum, index) {
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

    fn resolve(&mut self) -> Result<Vec<R>> {
        match &self.value {
            Some(value) => Ok(vec![value.clone()]),
            None => Err(self.poisoned()),
        }
    }

    fn drain(mut self: Box<Self>) -> Result<Vec<R>> {
        match self.value.take() {
            Some(value) => Ok(vec![value]),
            None => Err(self.poisoned()),
        }
    }
}

/// Reduction with an explicit initial value; the first datum gets index 0.
pub fn reduce_with_initial<T, R, F>(reducer: F, initial: R) -> StageSlot<T, R>
where
    T: 'static,
    R: Clone + 'static,
    F: FnMut(R, T, usize) -> CallbackResult<R> + 'static,
{
    StageSlot::active(ReduceStage::starting_at(reducer, initial, 0))
}

/// Reduction without an initial value.
///
/// The first datum becomes the accumulated value and the fold starts at index
/// 1 with the second datum. Resolving before any datum arrived is a
/// `no_data` failure.
pub fn reduce_without_initial<T, F>(reducer: F) -> StageSlot<T, T>
where
    T: Clone + 'static,
    F: FnMut(T, T, usize) -> CallbackResult<T> + 'static,
{
    StageSlot::deferred(
        StageKind::Reduce,
        move |first: T| -> Box<dyn Stage<T, T>> {
            Box::new(ReduceStage::starting_at(reducer, first, 1))
        },
        || Err(AccumulateError::no_data()),
    )
}
