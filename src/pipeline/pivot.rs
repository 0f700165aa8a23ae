//! Pivot: classify, reduce each partition independently, merge into records.
//!
//! A [`PivotStage`] fans every datum out to the partitions named by its
//! classifier. Each partition is a child [`Accumulator`] running the pivot's
//! reducer, created lazily the first time its key is observed. Resolution
//! turns every partition into one [`Record`], in order of first observation.
//!
//! # Record layout
//!
//! Fields are merged in this order, later fields overriding earlier ones on a
//! name collision:
//!
//! 1. the classification name (if configured) set to the partition key;
//! 2. the key's registered metadata (object fields are spread; `null` adds
//!    nothing; any other value is stored under [`METADATA_FIELD`]);
//! 3. the reduced value, either wrapped under the configured value name, or
//!    spread when it serializes to an object, or stored under
//!    [`VALUE_FIELD`] otherwise.

use std::rc::Rc;

use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use serde::Serialize;
use serde_json::Value;

use super::accumulator::Accumulator;
use super::policy::Capture;
use super::traits::Stage;
use crate::errors::{AccumulateError, CallbackResult, Result, StageKind};
use crate::types::{ClassificationRegistry, ClassifierResult, Record};

/// Field that receives non-object classification metadata.
pub const METADATA_FIELD: &str = "metadata";

/// Field that receives a non-object reduced value when no value name is set.
pub const VALUE_FIELD: &str = "value";

/// Partitions in order of first observation.
pub(crate) type PartitionMap<P> = IndexMap<String, P, FxBuildHasher>;

// ============================================================================
// PivotLayout
// ============================================================================

/// Output field naming for pivot records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct PivotLayout {
    /// Field that receives the partition key
    #[serde(default)]
    pub classification_name: Option<String>,
    /// Field that receives the reduced value (spread into the record if absent)
    #[serde(default)]
    pub value_name: Option<String>,
}

impl PivotLayout {
    /// Build one output record for a partition.
    pub fn compose<R: Serialize>(
        &self,
        key: &str,
        metadata: Option<&Value>,
        value: &R,
    ) -> Result<Record> {
        let mut record = Record::new();

        if let Some(name) = &self.classification_name {
            record.insert(name.clone(), Value::String(key.to_string()));
        }

        match metadata {
            Some(Value::Object(fields)) => {
                for (field, v) in fields {
                    record.insert(field.clone(), v.clone());
                }
            }
            Some(Value::Null) | None => {}
            Some(other) => {
                record.insert(METADATA_FIELD.to_string(), other.clone());
            }
        }

        let value = serde_json::to_value(value)?;
        match (&self.value_name, value) {
            (Some(name), value) => {
                record.insert(name.clone(), value);
            }
            (None, Value::Object(fields)) => record.extend(fields),
            (None, other) => {
                record.insert(VALUE_FIELD.to_string(), other);
            }
        }

        Ok(record)
    }
}

// ============================================================================
// PivotSpec — what the `pivot` transform is asked to do
// ============================================================================

type Classifier<T> = Box<dyn FnMut(&T) -> CallbackResult<ClassifierResult>>;
type PartitionFactory<T, R> = Box<dyn Fn() -> Accumulator<T, R, Capture>>;

/// Configuration of a synchronous pivot.
///
/// ```
/// use rapid_accumulate::{accumulate, PivotSpec};
///
/// let mut acc = accumulate(vec![1i64, 2, 3, 4, 5, 6, 7]).pivot(
///     PivotSpec::new(
///         |d: &i64| Ok((d % 3).to_string().into()),
///         |a: i64, b: i64, _| Ok(a + b),
///     )
///     .classification_name("key")
///     .value_name("sum"),
/// );
/// let rows = acc.to_vec().unwrap();
/// assert_eq!(rows.len(), 3);
/// ```
pub struct PivotSpec<T, R> {
    classifier: Classifier<T>,
    make_partition: PartitionFactory<T, R>,
    layout: PivotLayout,
}

impl<T: Clone + 'static> PivotSpec<T, T> {
    /// Pivot whose partitions reduce without an initial value: each
    /// partition's first datum seeds its accumulated value.
    pub fn new<C, F>(classifier: C, reducer: F) -> Self
    where
        C: FnMut(&T) -> CallbackResult<ClassifierResult> + 'static,
        F: Fn(T, T, usize) -> CallbackResult<T> + 'static,
    {
        let reducer = Rc::new(reducer);
        let make_partition = move || {
            let reducer = Rc::clone(&reducer);
            Accumulator::new(Vec::new())
                .reduce(move |acc, datum, index| (*reducer)(acc, datum, index))
        };
        Self {
            classifier: Box::new(classifier),
            make_partition: Box::new(make_partition),
            layout: PivotLayout::default(),
        }
    }
}

impl<T: Clone + 'static, R: Clone + 'static> PivotSpec<T, R> {
    /// Pivot whose partitions each fold from a clone of `initial_value`.
    pub fn with_initial_value<C, F>(classifier: C, initial_value: R, reducer: F) -> Self
    where
        C: FnMut(&T) -> CallbackResult<ClassifierResult> + 'static,
        F: Fn(R, T, usize) -> CallbackResult<R> + 'static,
    {
        let reducer = Rc::new(reducer);
        let make_partition = move || {
            let reducer = Rc::clone(&reducer);
            Accumulator::new(Vec::new()).reduce_with(
                initial_value.clone(),
                move |acc, datum, index| (*reducer)(acc, datum, index),
            )
        };
        Self {
            classifier: Box::new(classifier),
            make_partition: Box::new(make_partition),
            layout: PivotLayout::default(),
        }
    }
}

impl<T, R> PivotSpec<T, R> {
    /// Emit the partition key under `name` in every record.
    pub fn classification_name(mut self, name: impl Into<String>) -> Self {
        self.layout.classification_name = Some(name.into());
        self
    }

    /// Wrap the reduced value under `name` instead of spreading it.
    pub fn value_name(mut self, name: impl Into<String>) -> Self {
        self.layout.value_name = Some(name.into());
        self
    }

    /// Replace the whole output layout.
    pub fn layout(mut self, layout: PivotLayout) -> Self {
        self.layout = layout;
        self
    }

    pub(crate) fn into_stage(self) -> PivotStage<T, R> {
        PivotStage {
            classifier: self.classifier,
            make_partition: self.make_partition,
            layout: self.layout,
            registry: ClassificationRegistry::new(),
            partitions: PartitionMap::default(),
        }
    }
}

// ============================================================================
// PivotStage
// ============================================================================

/// Runtime behavior of the `pivot` transform.
pub struct PivotStage<T, R> {
    classifier: Classifier<T>,
    make_partition: PartitionFactory<T, R>,
    layout: PivotLayout,
    registry: ClassificationRegistry,
    partitions: PartitionMap<Accumulator<T, R, Capture>>,
}

impl<T, R> PivotStage<T, R> {
    /// Number of partitions observed so far.
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }
}

impl<T, R> Stage<T, Record> for PivotStage<T, R>
where
    T: Clone + 'static,
    R: Clone + Serialize + 'static,
{
    fn kind(&self) -> StageKind {
        StageKind::Pivot
    }

    fn append(&mut self, datum: T) -> Result<()> {
        let classified = (self.classifier)(&datum).map_err(AccumulateError::classifier)?;

        for entry in classified.into_entries() {
            self.registry.observe(&entry);
            let key = entry.key;
            let make_partition = &self.make_partition;
            let partition = self
                .partitions
                .entry(key.clone())
                .or_insert_with(|| make_partition());
            partition
                .feed(std::iter::once(datum.clone()))
                .map_err(|err| err.in_partition(key))?;
        }
        Ok(())
    }

    fn resolve(&mut self) -> Result<Vec<Record>> {
        let mut records = Vec::with_capacity(self.partitions.len());

        for (key, partition) in self.partitions.iter_mut() {
            let value = partition
                .to_vec()
                .map_err(|err| err.in_partition(key.as_str()))?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    AccumulateError::internal(StageKind::Pivot, "partition resolved to no value")
                        .in_partition(key.as_str())
                })?;

            let record = self
                .layout
                .compose(key, self.registry.get(key), &value)
                .map_err(|err| err.in_partition(key.as_str()))?;
            records.push(record);
        }

        Ok(records)
    }
}
