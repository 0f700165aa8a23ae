//! # rapid_accumulate
//!
//! Composable, incrementally-fed data pipelines.
//!
//! A pipeline starts from an initial sequence and chains any number of
//! transforms: reduce, map, filter, sort, and pivot (group-by with per-key
//! reduction). Data can be appended at any point, even after transforms were
//! installed, and flows through whatever stage is current.
//!
//! ## Features
//!
//! - **Typed stages**: every transform retypes the pipeline to its new output
//! - **Two error policies**: capture failures and return them from `result()`,
//!   or raise them from the call that detected them
//! - **Async mode**: callbacks may suspend; calls still apply in issue order
//! - **Optional tracing**: stage spans and failure events behind the
//!   `tracing` feature
//!
//! ```
//! use rapid_accumulate::{accumulate, PivotSpec};
//!
//! let mut totals = accumulate(vec![1i64, 2, 3, 4, 5, 6, 7])
//!     .pivot(
//!         PivotSpec::new(
//!             |d: &i64| Ok((d % 3).to_string().into()),
//!             |a: i64, b: i64, _| Ok(a + b),
//!         )
//!         .classification_name("key"),
//!     );
//! let rows = totals.to_vec().unwrap();
//! assert_eq!(rows[0]["key"], "1");
//! assert_eq!(rows[0]["value"], 12);
//! ```

#[macro_use]
mod macros;

pub mod asynchronous;
pub mod errors;
pub mod pipeline;
pub mod types;

// Re-export commonly used types
pub use errors::{AccumulateError, CallbackError, CallbackResult, ErrorCode, Result, StageKind};
pub use types::{
    AccumulateOptions, Classification, ClassificationRegistry, ClassifierResult, ErrorHandling,
    Record, Resolved, UnknownErrorHandling,
};

// Re-export main functionality
pub use asynchronous::{ActionQueue, AsyncAccumulator, AsyncPivotSpec, QueueState};
pub use pipeline::{
    Accumulator, Capture, ErrorPolicy, PivotLayout, PivotSpec, Raise, ResolvedIter,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Start a capture-mode pipeline over `data`.
pub fn accumulate<T: Clone + 'static>(data: Vec<T>) -> Accumulator<T, T, Capture> {
    Accumulator::new(data)
}

/// Start a pipeline with an explicit error policy and options.
///
/// ```
/// use rapid_accumulate::{accumulate_with, AccumulateOptions, Raise};
///
/// let failed = accumulate_with::<i64, Raise>(vec![], AccumulateOptions::new())
///     .reduce(|a, b, _| Ok(a + b))
///     .and_then(|mut acc| acc.to_vec());
/// assert!(failed.unwrap_err().is_no_data());
/// ```
pub fn accumulate_with<T: Clone + 'static, P: ErrorPolicy>(
    data: Vec<T>,
    options: AccumulateOptions,
) -> Accumulator<T, T, P> {
    Accumulator::with_options(data, options)
}

/// Start a capture-mode asynchronous pipeline over `data`.
///
/// # Panics
///
/// Panics when called outside a Tokio runtime.
pub fn accumulate_async<T: Clone + Send + 'static>(data: Vec<T>) -> AsyncAccumulator<T, T, Capture> {
    AsyncAccumulator::new(data)
}

/// Start an asynchronous pipeline with an explicit error policy and options.
///
/// # Panics
///
/// Panics when called outside a Tokio runtime.
pub fn accumulate_async_with<T: Clone + Send + 'static, P: ErrorPolicy>(
    data: Vec<T>,
    options: AccumulateOptions,
) -> AsyncAccumulator<T, T, P> {
    AsyncAccumulator::with_options(data, options)
}
