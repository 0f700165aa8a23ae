//! Asynchronous pipeline: callbacks may suspend.
//!
//! Each [`AsyncAccumulator`] owns an [`ActionQueue`] whose single worker task
//! holds the pipeline state. Calls are applied in the order they are issued,
//! so the output matches what the synchronous engine produces for the same
//! calls (except sort, which inserts online).
//!
//! ## Submodules
//!
//! - [`queue`] — FIFO of actions serviced by one worker task
//! - [`stages`] — Async stage trait, slot, and built-in stages
//! - [`pivot`] — Async classification and per-key reduction
//! - [`accumulator`] — The queue-backed front-end

pub mod accumulator;
pub(crate) mod engine;
pub mod pivot;
pub mod queue;
pub mod stages;

pub use accumulator::AsyncAccumulator;
pub use pivot::{AsyncPivotSpec, AsyncPivotStage};
pub use queue::{ActionQueue, QueueState};
pub use stages::{AsyncSlot, AsyncStage};
