//! The synchronous pipeline engine.
//!
//! An [`Accumulator`] owns exactly one [`StageSlot`] at a time. Every transform
//! drains the current slot, installs the next stage, and replays the drained
//! output into it. Every `append` routes data into whatever stage is current.

use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;

use super::pivot::PivotSpec;
use super::policy::{Capture, ErrorPolicy, Raise};
use super::stages::{
    reduce_with_initial, reduce_without_initial, FilterStage, MapStage, SortStage, SourceStage,
};
use super::traits::StageSlot;
use crate::errors::{AccumulateError, CallbackResult, Result, StageKind};
use crate::types::{AccumulateOptions, ErrorHandling, Record, Resolved};

/// A composable pipeline accepting `In` and producing `Out`.
///
/// `P` selects the error policy ([`Capture`] by default, or [`Raise`]).
///
/// ```
/// use rapid_accumulate::accumulate;
///
/// let mut acc = accumulate(vec![1, 2, 3])
///     .map(|d, _| d * 10)
///     .append(vec![4])
///     .filter(|d, _| *d != 10)
///     .append(vec![5]);
/// // 4 went through the map; 5 arrived after the filter was installed.
/// assert_eq!(acc.to_vec().unwrap(), vec![20, 30, 40, 5]);
/// ```
pub struct Accumulator<In, Out, P = Capture> {
    slot: StageSlot<In, Out>,
    error: Option<AccumulateError>,
    label: Option<Arc<str>>,
    _policy: PhantomData<P>,
}

impl<T: Clone + 'static> Accumulator<T, T, Capture> {
    /// Create a capture-mode pipeline over `data`.
    pub fn new(data: Vec<T>) -> Self {
        Self::with_options(data, AccumulateOptions::default())
    }
}

impl<T: Clone + 'static, P: ErrorPolicy> Accumulator<T, T, P> {
    /// Create a pipeline over `data` with the given options.
    pub fn with_options(data: Vec<T>, options: AccumulateOptions) -> Self {
        Self {
            slot: StageSlot::active(SourceStage::new(data)),
            error: None,
            label: options.label.map(Arc::from),
            _policy: PhantomData,
        }
    }
}

impl<In, Out, P> Accumulator<In, Out, P> {
    /// The captured error, if any.
    pub fn error(&self) -> Option<&AccumulateError> {
        self.error.as_ref()
    }

    /// Name given to this pipeline in [`AccumulateOptions`].
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Which transform currently handles appended data.
    pub fn stage(&self) -> StageKind {
        self.slot.kind()
    }

    /// Record a failure. Only the first one is kept.
    pub(crate) fn capture(&mut self, err: AccumulateError) {
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

impl<In, Out, P: ErrorPolicy> Accumulator<In, Out, P> {
    /// The error-handling selection this pipeline was built with.
    pub fn error_handling(&self) -> ErrorHandling {
        P::HANDLING
    }
}

impl<In, Out, P> Accumulator<In, Out, P>
where
    In: 'static,
    Out: Clone + 'static,
    P: ErrorPolicy,
{
    // ------------------------------------------------------------------------
    // Data
    // ------------------------------------------------------------------------

    /// Append data to the current stage.
    ///
    /// A no-op once an error has been captured.
    pub fn append(mut self, data: impl IntoIterator<Item = In>) -> P::Outcome<Self> {
        let outcome = self.feed(data);
        P::settle(self, outcome)
    }

    /// Append a single datum.
    pub fn append_one(self, datum: In) -> P::Outcome<Self> {
        self.append(std::iter::once(datum))
    }

    /// Route data into the slot, stopping at the first failure.
    pub(crate) fn feed(&mut self, data: impl IntoIterator<Item = In>) -> Result<()> {
        if self.error.is_some() {
            return Ok(());
        }
        data.into_iter().try_for_each(|datum| self.slot.append(datum))
    }

    // ------------------------------------------------------------------------
    // Transforms
    // ------------------------------------------------------------------------

    /// Fold everything into one value; the first datum seeds the fold.
    ///
    /// The reducer sees indices starting at 1. Resolving without any data is
    /// a `no_data` failure.
    pub fn reduce<F>(self, reducer: F) -> P::Outcome<Accumulator<Out, Out, P>>
    where
        F: FnMut(Out, Out, usize) -> CallbackResult<Out> + 'static,
    {
        self.pipe(reduce_without_initial(reducer))
    }

    /// Fold everything into one value starting from `initial`.
    pub fn reduce_with<R, F>(self, initial: R, reducer: F) -> P::Outcome<Accumulator<Out, R, P>>
    where
        R: Clone + 'static,
        F: FnMut(R, Out, usize) -> CallbackResult<R> + 'static,
    {
        self.pipe(reduce_with_initial(reducer, initial))
    }

    /// Transform every datum.
    pub fn map<U, F>(self, mapper: F) -> P::Outcome<Accumulator<Out, U, P>>
    where
        U: Clone + 'static,
        F: FnMut(Out, usize) -> U + 'static,
    {
        self.pipe(StageSlot::active(MapStage::new(mapper)))
    }

    /// Keep the data matching `predicate`.
    pub fn filter<F>(self, predicate: F) -> P::Outcome<Accumulator<Out, Out, P>>
    where
        F: FnMut(&Out, usize) -> bool + 'static,
    {
        self.pipe(StageSlot::active(FilterStage::new(predicate)))
    }

    /// Order the output by `compare`.
    pub fn sort<F>(self, compare: F) -> P::Outcome<Accumulator<Out, Out, P>>
    where
        F: FnMut(&Out, &Out) -> Ordering + 'static,
    {
        self.pipe(StageSlot::active(SortStage::new(compare)))
    }

    /// Group by classification and reduce each group into a [`Record`].
    pub fn pivot<R>(self, spec: PivotSpec<Out, R>) -> P::Outcome<Accumulator<Out, Record, P>>
    where
        R: Clone + Serialize + 'static,
    {
        self.pipe(StageSlot::active(spec.into_stage()))
    }

    /// Replace the current stage with `next`, replaying the current output
    /// into it.
    fn pipe<Next>(self, mut next: StageSlot<Out, Next>) -> P::Outcome<Accumulator<Out, Next, P>>
    where
        Next: Clone + 'static,
    {
        let Accumulator {
            slot, error, label, ..
        } = self;
        trace_stage!(label, next.kind());

        if error.is_some() {
            let accumulator = Accumulator {
                slot: next,
                error,
                label,
                _policy: PhantomData,
            };
            return P::settle(accumulator, Ok(()));
        }

        #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
        let previous = slot.kind();
        let outcome = slot.drain().and_then(|data| {
            log_event!(
                debug,
                from = previous.as_str(),
                to = next.kind().as_str(),
                replayed = data.len(),
                "installed stage"
            );
            data.into_iter().try_for_each(|datum| next.append(datum))
        });

        let accumulator = Accumulator {
            slot: next,
            error: None,
            label,
            _policy: PhantomData,
        };
        P::settle(accumulator, outcome)
    }

    // ------------------------------------------------------------------------
    // Results
    // ------------------------------------------------------------------------

    /// Resolve the current output set.
    ///
    /// Returns the captured error instead, if there is one. A failure during
    /// resolution is captured and returned.
    pub fn result(&mut self) -> Result<Resolved<Out>> {
        self.to_vec().map(Resolved::from)
    }

    /// Resolve the current output set into a `Vec`.
    pub fn to_vec(&mut self) -> Result<Vec<Out>> {
        if let Some(err) = &self.error {
            if P::HANDLING.raises() {
                log_event!(error, code = err.code.as_str(), "failure pending in raise mode");
            }
            return Err(err.clone());
        }
        self.slot.resolve().map_err(|err| {
            self.capture(err.clone());
            err
        })
    }
}

impl<In, Out> Accumulator<In, Out, Capture> {
    /// Switch to raise mode. A captured error is kept.
    pub fn enable_exceptions(self) -> Accumulator<In, Out, Raise> {
        Accumulator {
            slot: self.slot,
            error: self.error,
            label: self.label,
            _policy: PhantomData,
        }
    }
}

impl<In, Out, P: ErrorPolicy> fmt::Debug for Accumulator<In, Out, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accumulator")
            .field("stage", &self.slot.kind())
            .field("deferred", &self.slot.is_deferred())
            .field("error_handling", &P::HANDLING)
            .field("error", &self.error)
            .field("label", &self.label)
            .finish()
    }
}

// ============================================================================
// Raise-mode iteration
// ============================================================================

/// Iterator over a raise-mode pipeline's output.
///
/// Yields every resolved datum, or a single `Err` if resolution failed.
#[derive(Debug)]
pub struct ResolvedIter<T> {
    inner: IterState<T>,
}

#[derive(Debug)]
enum IterState<T> {
    Items(std::vec::IntoIter<T>),
    Failed(Option<AccumulateError>),
}

impl<T> Iterator for ResolvedIter<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            IterState::Items(items) => items.next().map(Ok),
            IterState::Failed(err) => err.take().map(Err),
        }
    }
}

impl<In, Out> IntoIterator for Accumulator<In, Out, Raise>
where
    In: 'static,
    Out: Clone + 'static,
{
    type Item = Result<Out>;
    type IntoIter = ResolvedIter<Out>;

    fn into_iter(mut self) -> Self::IntoIter {
        let inner = match self.to_vec() {
            Ok(items) => IterState::Items(items.into_iter()),
            Err(err) => IterState::Failed(Some(err)),
        };
        ResolvedIter { inner }
    }
}
