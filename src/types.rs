//! Core types for rapid_accumulate
//!
//! This module defines the data structures shared by the synchronous and the
//! asynchronous engines: classification entries and their registry, pivot
//! output records, the error-handling selection, pipeline options, and the
//! restartable result sequence.

use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A pivot output row: field name → JSON value.
pub type Record = serde_json::Map<String, Value>;

// ============================================================================
// Classification
// ============================================================================

/// One classification entry produced by a classifier for a datum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Partition key
    pub key: String,
    /// Optional metadata merged into the partition's output record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Classification {
    /// Create a classification entry without metadata
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            metadata: None,
        }
    }

    /// Create a classification entry carrying metadata
    pub fn with_metadata(key: impl Into<String>, metadata: Value) -> Self {
        Self {
            key: key.into(),
            metadata: Some(metadata),
        }
    }
}

/// Everything a classifier may return for a single datum.
///
/// All four shapes normalize to a list of [`Classification`] entries via
/// [`ClassifierResult::into_entries`]. The `From` impls let classifiers write
/// `Ok("key".into())`, `Ok(vec!["a", "b"].into())`, and so on.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierResult {
    /// A single key
    Key(String),
    /// Several keys, none carrying metadata (fan-out)
    Keys(Vec<String>),
    /// A single key with optional metadata
    Entry(Classification),
    /// Several keys with optional metadata (fan-out)
    Entries(Vec<Classification>),
}

impl ClassifierResult {
    /// Normalize into a uniform list of classification entries.
    ///
    /// An empty key list yields no entries: the datum joins no partition.
    pub fn into_entries(self) -> Vec<Classification> {
        match self {
            Self::Key(key) => vec![Classification::new(key)],
            Self::Keys(keys) => keys.into_iter().map(Classification::new).collect(),
            Self::Entry(entry) => vec![entry],
            Self::Entries(entries) => entries,
        }
    }
}

impl From<String> for ClassifierResult {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl From<&str> for ClassifierResult {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<Vec<String>> for ClassifierResult {
    fn from(keys: Vec<String>) -> Self {
        Self::Keys(keys)
    }
}

impl From<Vec<&str>> for ClassifierResult {
    fn from(keys: Vec<&str>) -> Self {
        Self::Keys(keys.into_iter().map(str::to_string).collect())
    }
}

impl From<Classification> for ClassifierResult {
    fn from(entry: Classification) -> Self {
        Self::Entry(entry)
    }
}

impl From<Vec<Classification>> for ClassifierResult {
    fn from(entries: Vec<Classification>) -> Self {
        Self::Entries(entries)
    }
}

/// Key → metadata registry for one pivot stage.
///
/// The first *defined* metadata observed for a key is kept for the lifetime
/// of the stage; later metadata for the same key is ignored.
#[derive(Debug, Default)]
pub struct ClassificationRegistry {
    metadata: FxHashMap<String, Value>,
}

impl ClassificationRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an entry's metadata unless the key already has some.
    pub fn observe(&mut self, entry: &Classification) {
        let Some(metadata) = &entry.metadata else {
            return;
        };
        if !self.metadata.contains_key(&entry.key) {
            self.metadata.insert(entry.key.clone(), metadata.clone());
        }
    }

    /// Metadata registered for `key`, if any
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Number of keys with registered metadata
    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    /// Check if no metadata has been registered
    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }
}

// ============================================================================
// Error handling selection
// ============================================================================

/// The two recognized error-handling selections.
///
/// `Error` captures failures and returns them from result-producing calls;
/// `Exception` surfaces them at the point of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorHandling {
    /// Capture failures as values (default)
    #[default]
    Error,
    /// Raise failures where they occur
    Exception,
}

impl ErrorHandling {
    /// Returns the selection name (`"error"` or `"exception"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Exception => "exception",
        }
    }

    /// Returns `true` when failures raise at the point of occurrence.
    pub fn raises(self) -> bool {
        matches!(self, Self::Exception)
    }
}

impl fmt::Display for ErrorHandling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an unrecognized error-handling selection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown error handling '{0}' (expected 'error' or 'exception')")]
pub struct UnknownErrorHandling(pub String);

impl FromStr for ErrorHandling {
    type Err = UnknownErrorHandling;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "exception" => Ok(Self::Exception),
            _ => Err(UnknownErrorHandling(value.to_string())),
        }
    }
}

// ============================================================================
// Options
// ============================================================================

/// Construction-time options shared by both engines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulateOptions {
    /// Name reported in tracing spans for every stage of the pipeline
    #[serde(default)]
    pub label: Option<String>,
}

impl AccumulateOptions {
    /// Create default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: name the pipeline in tracing output
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

// ============================================================================
// Resolved output
// ============================================================================

/// The output set of a pipeline: finite, ordered, and restartable.
///
/// Cloning is cheap (shared storage); iterating twice yields the same items.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resolved<T> {
    items: Arc<[T]>,
}

impl<T> Resolved<T> {
    /// Iterate over the resolved items (may be called any number of times)
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Number of resolved items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if nothing was resolved
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Clone> Resolved<T> {
    /// Copy the items out into a vector
    pub fn into_vec(self) -> Vec<T> {
        self.items.to_vec()
    }
}

impl<T> From<Vec<T>> for Resolved<T> {
    fn from(items: Vec<T>) -> Self {
        Self {
            items: items.into(),
        }
    }
}

impl<T> Deref for Resolved<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

impl<'a, T> IntoIterator for &'a Resolved<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: Clone> IntoIterator for Resolved<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.into_vec().into_iter()
    }
}
