//! Stage trait definitions for the synchronous pipeline.
//!
//! A stage is the runtime behavior of one transform: it accepts data one datum
//! at a time and produces its current output set on demand. The engine owns
//! exactly one [`StageSlot`] at a time and swaps it on every transform call.

use crate::errors::{AccumulateError, Result, StageKind};

// ============================================================================
// Stage — accept-datum / produce-output pair
// ============================================================================

/// Runtime behavior of one pipeline transform.
///
/// # Contract
///
/// - **append**: fold one datum into the stage's state. A failure is returned
///   to the engine, which applies the pipeline's error policy.
/// - **resolve**: produce the current output set without consuming it. May be
///   called any number of times; later appends are reflected in later calls.
/// - **drain**: produce the output set when the stage is being replaced by the
///   next transform. Buffered stages override it to move their output out
///   instead of cloning it.
pub trait Stage<In, Out> {
    /// Which transform this stage implements.
    fn kind(&self) -> StageKind;

    /// Accept one datum.
    fn append(&mut self, datum: In) -> Result<()>;

    /// Produce the current output set.
    fn resolve(&mut self) -> Result<Vec<Out>>;

    /// Produce the output set, consuming the stage.
    fn drain(mut self: Box<Self>) -> Result<Vec<Out>> {
        self.resolve()
    }
}

// ============================================================================
// StageSlot — active stage or deferred installation
// ============================================================================

/// Builds the real stage from the first datum it receives.
pub type Installer<In, Out> = Box<dyn FnOnce(In) -> Box<dyn Stage<In, Out>>>;

/// Output produced when a deferred stage is resolved before any datum arrived.
pub type Unresolved<Out> = Box<dyn FnMut() -> Result<Vec<Out>>>;

/// A stage that cannot be built until it has seen one datum.
pub struct DeferredStage<In, Out> {
    kind: StageKind,
    install: Option<Installer<In, Out>>,
    unresolved: Unresolved<Out>,
}

/// The stage currently handling data for a pipeline.
///
/// Exactly one of the two states is pending at any time: either the stage is
/// active, or it is waiting for its first datum to be installed.
pub enum StageSlot<In, Out> {
    Active(Box<dyn Stage<In, Out>>),
    Deferred(DeferredStage<In, Out>),
}

impl<In, Out> StageSlot<In, Out> {
    /// Wrap an already-built stage.
    pub fn active(stage: impl Stage<In, Out> + 'static) -> Self {
        Self::Active(Box::new(stage))
    }

    /// Defer stage construction until the first datum arrives.
    ///
    /// `install` consumes that first datum; `unresolved` supplies the output
    /// if the slot is resolved while still empty.
    pub fn deferred(
        kind: StageKind,
        install: impl FnOnce(In) -> Box<dyn Stage<In, Out>> + 'static,
        unresolved: impl FnMut() -> Result<Vec<Out>> + 'static,
    ) -> Self {
        Self::Deferred(DeferredStage {
            kind,
            install: Some(Box::new(install)),
            unresolved: Box::new(unresolved),
        })
    }

    /// Which transform occupies the slot.
    pub fn kind(&self) -> StageKind {
        match self {
            Self::Active(stage) => stage.kind(),
            Self::Deferred(deferred) => deferred.kind,
        }
    }

    /// Check if the slot is still waiting for its first datum.
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }

    /// Route one datum: through the installer if one is pending, otherwise
    /// through the active stage.
    pub fn append(&mut self, datum: In) -> Result<()> {
        match self {
            Self::Active(stage) => stage.append(datum),
            Self::Deferred(deferred) => {
                let kind = deferred.kind;
                let install = deferred.install.take().ok_or_else(|| {
                    AccumulateError::internal(kind, "deferred stage was already installed")
                })?;
                *self = Self::Active(install(datum));
                Ok(())
            }
        }
    }

    /// Produce the current output set.
    pub fn resolve(&mut self) -> Result<Vec<Out>> {
        match self {
            Self::Active(stage) => stage.resolve(),
            Self::Deferred(deferred) => (deferred.unresolved)(),
        }
    }

    /// Produce the output set, consuming the slot.
    pub fn drain(self) -> Result<Vec<Out>> {
        match self {
            Self::Active(stage) => stage.drain(),
            Self::Deferred(mut deferred) => (deferred.unresolved)(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Collect(Vec<i32>);

    impl Stage<i32, i32> for Collect {
        fn kind(&self) -> StageKind {
            StageKind::Map
        }

        fn append(&mut self, datum: i32) -> Result<()> {
            self.0.push(datum);
            Ok(())
        }

        fn resolve(&mut self) -> Result<Vec<i32>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_deferred_installs_on_first_datum() {
        let mut slot: StageSlot<i32, i32> = StageSlot::deferred(
            StageKind::Reduce,
            |first| Box::new(Collect(vec![first * 10])),
            || Err(AccumulateError::no_data()),
        );
        assert!(slot.is_deferred());
        assert!(slot.resolve().unwrap_err().is_no_data());

        slot.append(1).unwrap();
        assert!(!slot.is_deferred());
        slot.append(2).unwrap();

        // The first datum went to the installer, the second to the stage.
        assert_eq!(slot.resolve().unwrap(), vec![10, 2]);
        assert_eq!(slot.kind(), StageKind::Map);
    }

    #[test]
    fn test_active_slot_drains() {
        let mut slot = StageSlot::active(Collect(Vec::new()));
        slot.append(7).unwrap();
        assert_eq!(slot.drain().unwrap(), vec![7]);
    }
}
