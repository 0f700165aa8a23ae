//! Error-handling policies as marker types.
//!
//! The policy is part of the pipeline's type, so the shape of every mutating
//! call follows from it:
//!
//! | Policy | Selection | Transform / `append` returns |
//! |--------|-----------|------------------------------|
//! | [`Capture`] | `"error"` | the pipeline itself |
//! | [`Raise`] | `"exception"` | `Result<pipeline, AccumulateError>` |
//!
//! Under `Capture` the first failure is stored and handed back by the next
//! result-producing call. Under `Raise` the call that detects the failure
//! returns it.

use super::accumulator::Accumulator;
use crate::errors::Result;
use crate::types::ErrorHandling;

mod sealed {
    pub trait Sealed {}

    impl Sealed for super::Capture {}
    impl Sealed for super::Raise {}
}

/// Implemented by [`Capture`] and [`Raise`] only.
pub trait ErrorPolicy: sealed::Sealed + Sized + 'static {
    /// The selection this policy corresponds to.
    const HANDLING: ErrorHandling;

    /// What a mutating call hands back.
    type Outcome<A>;

    /// Apply the policy to the outcome of a mutating call.
    fn settle<In, Out>(
        accumulator: Accumulator<In, Out, Self>,
        outcome: Result<()>,
    ) -> Self::Outcome<Accumulator<In, Out, Self>>;
}

/// Capture failures and return them from `result()` / `to_vec()` (default).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capture;

/// Return failures from the call that detected them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Raise;

impl ErrorPolicy for Capture {
    const HANDLING: ErrorHandling = ErrorHandling::Error;

    type Outcome<A> = A;

    fn settle<In, Out>(
        mut accumulator: Accumulator<In, Out, Self>,
        outcome: Result<()>,
    ) -> Accumulator<In, Out, Self> {
        if let Err(err) = outcome {
            accumulator.capture(err);
        }
        accumulator
    }
}

impl ErrorPolicy for Raise {
    const HANDLING: ErrorHandling = ErrorHandling::Exception;

    type Outcome<A> = Result<A>;

    fn settle<In, Out>(
        accumulator: Accumulator<In, Out, Self>,
        outcome: Result<()>,
    ) -> Result<Accumulator<In, Out, Self>> {
        outcome.map(|()| accumulator)
    }
}
