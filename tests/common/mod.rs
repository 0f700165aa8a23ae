//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::time::Duration;

const COLORS: [&str; 7] = ["red", "green", "blue", "yellow", "brown", "orange", "purple"];

const FIRST_NAMES: [&str; 10] = [
    "Maria", "Nushi", "Mohammed", "Jose", "Wei", "Ahmed", "Yan", "Ali", "John", "David",
];

const LAST_NAMES: [&str; 9] = [
    "Wang", "Li", "Zhang", "Chen", "Liu", "Devi", "Yang", "Huang", "Singh",
];

/// One generated person record.
#[derive(Debug, Clone, PartialEq)]
pub struct ExampleRecord {
    pub color: &'static str,
    pub first_name: &'static str,
    pub last_name: &'static str,
    pub index: usize,
}

impl ExampleRecord {
    /// `index % k`
    pub fn modulo(&self, k: usize) -> usize {
        self.index % k
    }
}

/// Deterministic example data: names and colors cycle with the record index.
pub fn make_example_data(records: usize) -> Vec<ExampleRecord> {
    (0..records)
        .map(|i| ExampleRecord {
            color: COLORS[i % COLORS.len()],
            first_name: FIRST_NAMES[i % FIRST_NAMES.len()],
            last_name: LAST_NAMES[i % LAST_NAMES.len()],
            index: i,
        })
        .collect()
}

/// Suspend for `ms` milliseconds.
pub async fn sleep(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
