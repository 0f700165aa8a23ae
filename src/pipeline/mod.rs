//! Synchronous pipeline: stages, error policies, and the engine.
//!
//! ## Submodules
//!
//! - [`traits`] — Stage trait and the active/deferred stage slot
//! - [`stages`] — Source, map, filter, sort, and reduce stages
//! - [`pivot`] — Classification and per-key reduction into records
//! - [`policy`] — Capture and raise error policies
//! - [`accumulator`] — The engine that chains stages together

pub mod accumulator;
pub mod pivot;
pub mod policy;
pub mod stages;
pub mod traits;

pub use accumulator::{Accumulator, ResolvedIter};
pub use pivot::{PivotLayout, PivotSpec, PivotStage, METADATA_FIELD, VALUE_FIELD};
pub use policy::{Capture, ErrorPolicy, Raise};
pub use stages::{FilterStage, MapStage, ReduceStage, SortStage, SourceStage};
pub use traits::{Stage, StageSlot};
