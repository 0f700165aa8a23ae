//! Asynchronous pivot.
//!
//! Same record layout and partition semantics as
//! [`pipeline::pivot`](crate::pipeline::pivot); the classifier and reducer may
//! suspend. Partitions are [`AsyncPipe`]s driven directly by the parent's
//! queue worker.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;

use super::engine::AsyncPipe;
use super::stages::{reduce_with_initial, reduce_without_initial, AsyncStage};
use crate::errors::{AccumulateError, CallbackResult, Result, StageKind};
use crate::pipeline::pivot::{PartitionMap, PivotLayout};
use crate::types::{ClassificationRegistry, ClassifierResult, Record};

type Classifier<T> = Box<dyn FnMut(T) -> BoxFuture<'static, CallbackResult<ClassifierResult>> + Send>;
type PartitionFactory<T, R> = Box<dyn Fn() -> AsyncPipe<T, R> + Send>;

/// Configuration of an asynchronous pivot.
///
/// The classifier receives an owned clone of each datum. The reducer is
/// shared by every partition, hence `Fn + Sync`.
pub struct AsyncPivotSpec<T, R> {
    classifier: Classifier<T>,
    make_partition: PartitionFactory<T, R>,
    layout: PivotLayout,
}

fn erase_classifier<T, C, CFut>(mut classifier: C) -> Classifier<T>
where
    C: FnMut(T) -> CFut + Send + 'static,
    CFut: Future<Output = CallbackResult<ClassifierResult>> + Send + 'static,
{
    Box::new(move |datum| classifier(datum).boxed())
}

impl<T: Clone + Send + 'static> AsyncPivotSpec<T, T> {
    /// Partitions reduce without an initial value.
    pub fn new<C, CFut, F, FFut>(classifier: C, reducer: F) -> Self
    where
        C: FnMut(T) -> CFut + Send + 'static,
        CFut: Future<Output = CallbackResult<ClassifierResult>> + Send + 'static,
        F: Fn(T, T, usize) -> FFut + Send + Sync + 'static,
        FFut: Future<Output = CallbackResult<T>> + Send + 'static,
    {
        let reducer = Arc::new(reducer);
        let make_partition = move || {
            let reducer = Arc::clone(&reducer);
            AsyncPipe::with_slot(
                reduce_without_initial(move |acc, datum, index| (*reducer)(acc, datum, index)),
                None,
            )
        };
        Self {
            classifier: erase_classifier(classifier),
            make_partition: Box::new(make_partition),
            layout: PivotLayout::default(),
        }
    }
}

impl<T: Clone + Send + 'static, R: Clone + Send + 'static> AsyncPivotSpec<T, R> {
    /// Partitions each fold from a clone of `initial_value`.
    pub fn with_initial_value<C, CFut, F, FFut>(classifier: C, initial_value: R, reducer: F) -> Self
    where
        C: FnMut(T) -> CFut + Send + 'static,
        CFut: Future<Output = CallbackResult<ClassifierResult>> + Send + 'static,
        F: Fn(R, T, usize) -> FFut + Send + Sync + 'static,
        FFut: Future<Output = CallbackResult<R>> + Send + 'static,
    {
        let reducer = Arc::new(reducer);
        let make_partition = move || {
            let reducer = Arc::clone(&reducer);
            AsyncPipe::with_slot(
                reduce_with_initial(
                    move |acc, datum, index| (*reducer)(acc, datum, index),
                    initial_value.clone(),
                ),
                None,
            )
        };
        Self {
            classifier: erase_classifier(classifier),
            make_partition: Box::new(make_partition),
            layout: PivotLayout::default(),
        }
    }
}

impl<T, R> AsyncPivotSpec<T, R> {
    pub fn classification_name(mut self, name: impl Into<String>) -> Self {
        self.layout.classification_name = Some(name.into());
        self
    }

    pub fn value_name(mut self, name: impl Into<String>) -> Self {
        self.layout.value_name = Some(name.into());
        self
    }

    pub fn layout(mut self, layout: PivotLayout) -> Self {
        self.layout = layout;
        self
    }

    pub(crate) fn into_stage(self) -> AsyncPivotStage<T, R> {
        AsyncPivotStage {
            classifier: self.classifier,
            make_partition: self.make_partition,
            layout: self.layout,
            registry: ClassificationRegistry::new(),
            partitions: PartitionMap::default(),
        }
    }
}

/// Runtime behavior of the asynchronous `pivot` transform.
pub struct AsyncPivotStage<T, R> {
    classifier: Classifier<T>,
    make_partition: PartitionFactory<T, R>,
    layout: PivotLayout,
    registry: ClassificationRegistry,
    partitions: PartitionMap<AsyncPipe<T, R>>,
}

#[async_trait]
impl<T, R> AsyncStage<T, Record> for AsyncPivotStage<T, R>
where
    T: Clone + Send + 'static,
    R: Clone + Serialize + Send + 'static,
{
    fn kind(&self) -> StageKind {
        StageKind::Pivot
    }

    async fn append(&mut self, datum: T) -> Result<()> {
        let classified = (self.classifier)(datum.clone())
            .await
            .map_err(AccumulateError::classifier)?;

        for entry in classified.into_entries() {
            self.registry.observe(&entry);
            if !self.partitions.contains_key(&entry.key) {
                let partition = (self.make_partition)();
                self.partitions.insert(entry.key.clone(), partition);
            }
            if let Some(partition) = self.partitions.get_mut(&entry.key) {
                partition.feed(vec![datum.clone()]).await;
                if let Some(err) = partition.error() {
                    return Err(err.clone().in_partition(entry.key));
                }
            }
        }
        Ok(())
    }

    async fn resolve(&mut self) -> Result<Vec<Record>> {
        let mut values = Vec::with_capacity(self.partitions.len());
        for (key, partition) in self.partitions.iter_mut() {
            let value = partition
                .resolve()
                .await
                .map_err(|err| err.in_partition(key.as_str()))?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    AccumulateError::internal(StageKind::Pivot, "partition resolved to no value")
                        .in_partition(key.as_str())
                })?;
            values.push((key.clone(), value));
        }

        values
            .iter()
            .map(|(key, value)| {
                self.layout
                    .compose(key, self.registry.get(key), value)
                    .map_err(|err| err.in_partition(key.as_str()))
            })
            .collect()
    }
}
