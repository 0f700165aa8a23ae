//! Integration tests for the asynchronous pipeline

mod common;

use std::collections::BTreeMap;

use common::{make_example_data, sleep, ExampleRecord};
use futures::StreamExt;
use rapid_accumulate::*;
use serde_json::{json, Value};

async fn add(acc: i64, cur: i64, _: usize) -> CallbackResult<i64> {
    sleep(1).await;
    Ok(acc + cur)
}

async fn refuse(_: i64, _: i64, _: usize) -> CallbackResult<i64> {
    Err("No way!".into())
}

async fn modulo_three(d: i64) -> CallbackResult<ClassifierResult> {
    sleep((d % 3) as u64).await;
    Ok((d % 3).to_string().into())
}

fn rows(records: Vec<Record>) -> Vec<Value> {
    records.into_iter().map(Value::Object).collect()
}

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test]
async fn test_round_trip() {
    let acc = accumulate_async(vec!["a", "b"]).append(vec!["c"]).append_one("d");
    assert_eq!(acc.to_vec().await.unwrap(), vec!["a", "b", "c", "d"]);
}

#[tokio::test]
async fn test_calls_apply_in_issue_order() {
    // The map suspends far longer than the append that follows it, yet the
    // appended datum must only reach the stage installed after the map.
    let acc = accumulate_async(vec![1i64, 2])
        .map(|d, _| async move {
            sleep(5).await;
            d * 10
        })
        .append(vec![3])
        .filter(|d, _| async move { d != 20 })
        .append(vec![20, 4]);
    assert_eq!(acc.to_vec().await.unwrap(), vec![10, 30, 4]);
}

#[tokio::test]
async fn test_result_is_repeatable() {
    let acc = accumulate_async(vec![1i64, 2, 3]).reduce(add);
    let first = acc.result().await.unwrap();
    let second = acc.result().await.unwrap();
    assert_eq!(first.iter().collect::<Vec<_>>(), second.iter().collect::<Vec<_>>());
    assert_eq!(first.into_vec(), vec![6]);
}

#[tokio::test]
async fn test_drain_leaves_queue_idle() {
    let acc = accumulate_async(vec![1i64, 2, 3])
        .map(|d, _| async move {
            sleep(1).await;
            d + 1
        })
        .append(vec![4]);
    acc.drain().await.unwrap();
    assert_eq!(acc.pending(), 0);
    assert_eq!(acc.queue_state(), QueueState::Idle);
}

// ============================================================================
// Reduce
// ============================================================================

#[tokio::test]
async fn test_reduce_matches_sync_results() {
    let reduced = accumulate_async(vec![1i64, 2, 3, 4, 5]).reduce_with(100, add);
    assert_eq!(reduced.to_vec().await.unwrap(), vec![115]);

    let appended = accumulate_async(Vec::<i64>::new())
        .reduce(add)
        .append(vec![1, 2, 3, 4, 5]);
    assert_eq!(appended.to_vec().await.unwrap(), vec![15]);

    let single = accumulate_async(vec![77i64]).reduce(refuse);
    assert_eq!(single.to_vec().await.unwrap(), vec![77]);
}

#[tokio::test]
async fn test_reduce_index_matches_left_fold() {
    let no_initial = accumulate_async(vec![5i64, 10])
        .reduce(|_, _, index| async move { Ok::<_, CallbackError>(index as i64) });
    assert_eq!(no_initial.to_vec().await.unwrap(), vec![1]);

    let with_initial = accumulate_async(vec![75i64, 11])
        .reduce_with(13usize, |_, _, index| async move { Ok::<_, CallbackError>(index) });
    assert_eq!(with_initial.to_vec().await.unwrap(), vec![1]);
}

#[tokio::test]
async fn test_reduce_without_data() {
    let acc = accumulate_async(Vec::<i64>::new()).reduce(add);
    let err = acc.result().await.unwrap_err();
    assert!(err.is_no_data());
    // The failure is captured; later data does not clear it.
    let acc = acc.append(vec![4]);
    assert!(acc.to_vec().await.unwrap_err().is_no_data());
    assert_eq!(acc.error().await.unwrap(), Some(err));
}

#[tokio::test]
async fn test_reducer_failure_is_captured() {
    let acc = accumulate_async(vec![1i64, 2, 3]).reduce(refuse).map(|d, _| async move { d + 1 });
    let err = acc.to_vec().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ReducerFailed);
    assert_eq!(acc.error().await.unwrap(), Some(err));
}

#[tokio::test]
async fn test_raise_mode_surfaces_at_result() {
    let acc = accumulate_async_with::<i64, Raise>(vec![1, 2, 3], AccumulateOptions::new())
        .reduce(refuse);
    assert_eq!(acc.error_handling(), ErrorHandling::Exception);

    let items: Vec<_> = acc.into_stream().await.collect().await;
    assert!(matches!(items.as_slice(), [Err(e)] if e.code == ErrorCode::ReducerFailed));
}

// ============================================================================
// Sort
// ============================================================================

#[tokio::test]
async fn test_online_sort() {
    let acc = accumulate_async(vec![5, 3, 9])
        .sort(|a: i32, b: i32| async move {
            sleep(1).await;
            a.cmp(&b)
        })
        .append(vec![1, 7])
        .append_one(4);
    assert_eq!(acc.to_vec().await.unwrap(), vec![1, 3, 4, 5, 7, 9]);
}

#[tokio::test]
async fn test_sort_keeps_equal_elements_ahead_of_earlier_ones() {
    // Insertion goes before the first element that does not compare greater,
    // so among equal keys the latest arrival comes first.
    let acc = accumulate_async(vec![(1, 'a'), (0, 'x'), (1, 'b')])
        .sort(|a: (i32, char), b: (i32, char)| async move { a.0.cmp(&b.0) });
    assert_eq!(acc.to_vec().await.unwrap(), vec![(0, 'x'), (1, 'b'), (1, 'a')]);
}

// ============================================================================
// Pivot
// ============================================================================

#[tokio::test]
async fn test_pivot_seven_rows_into_three() {
    let acc = accumulate_async(vec![1i64, 2, 3, 4, 5, 6, 7]).pivot(
        AsyncPivotSpec::new(modulo_three, add)
            .value_name("val")
            .classification_name("thisIsTheKey"),
    );
    assert_eq!(
        rows(acc.to_vec().await.unwrap()),
        vec![
            json!({"thisIsTheKey": "1", "val": 12}),
            json!({"thisIsTheKey": "2", "val": 7}),
            json!({"thisIsTheKey": "0", "val": 9}),
        ]
    );
}

#[tokio::test]
async fn test_pivot_reducer_failure() {
    let acc = accumulate_async(vec![1i64, 2, 3])
        .pivot(AsyncPivotSpec::new(modulo_three, refuse))
        .append(vec![4]);
    let err = acc.to_vec().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ReducerFailed);
    assert_eq!(err.stage, StageKind::Pivot);
    assert_eq!(err.partition.as_deref(), Some("1"));
}

#[tokio::test]
async fn test_pivot_example_columns() {
    let acc = accumulate_async(make_example_data(1000)).pivot(
        AsyncPivotSpec::with_initial_value(
            |d: ExampleRecord| async move {
                if d.modulo(100) == 0 {
                    sleep(1).await;
                }
                Ok::<_, CallbackError>(ClassifierResult::from(d.last_name))
            },
            BTreeMap::<String, u32>::new(),
            |mut acc: BTreeMap<String, u32>, d: ExampleRecord, _| async move {
                if d.modulo(4) == 0 {
                    *acc.entry(d.first_name.to_string()).or_default() += 1;
                }
                Ok::<_, CallbackError>(acc)
            },
        )
        .classification_name("lastName"),
    );

    let out = rows(acc.to_vec().await.unwrap());
    assert_eq!(out.len(), 9);
    assert_eq!(
        out[0],
        json!({"lastName": "Wang", "Maria": 6, "Yan": 6, "Mohammed": 6, "John": 5, "Wei": 5})
    );
    assert_eq!(
        out[8],
        json!({"lastName": "Singh", "John": 6, "Wei": 6, "Maria": 6, "Yan": 5, "Mohammed": 5})
    );
}

#[tokio::test]
async fn test_pivot_metadata_is_spread() {
    let acc = accumulate_async(make_example_data(90)).pivot(
        AsyncPivotSpec::with_initial_value(
            |d: ExampleRecord| async move {
                Ok::<_, CallbackError>(
                    Classification::with_metadata(
                        d.first_name,
                        json!({"firstName": d.first_name}),
                    )
                    .into(),
                )
            },
            0u32,
            |n: u32, _d: ExampleRecord, _| async move { Ok::<_, CallbackError>(n + 1) },
        )
        .value_name("count"),
    );
    let out = rows(acc.to_vec().await.unwrap());
    assert_eq!(out.len(), 10);
    assert_eq!(out[0], json!({"firstName": "Maria", "count": 9}));
}

#[tokio::test]
async fn test_pivot_fan_out_and_empty_classification() {
    let acc = accumulate_async((0i64..5).collect()).pivot(
        AsyncPivotSpec::with_initial_value(
            |d: i64| async move {
                let parity = if d % 2 == 0 { "even" } else { "odd" };
                let entries = match d {
                    0 => Vec::new(),
                    1 => vec![Classification::new("all"), Classification::new(parity)],
                    _ => vec![
                        Classification::with_metadata("all", json!({"first": d})),
                        Classification::new(parity),
                    ],
                };
                Ok::<_, CallbackError>(ClassifierResult::from(entries))
            },
            0usize,
            |count: usize, _d: i64, _| async move { Ok::<_, CallbackError>(count + 1) },
        )
        .classification_name("k")
        .value_name("n"),
    );
    assert_eq!(
        rows(acc.to_vec().await.unwrap()),
        vec![
            json!({"k": "all", "first": 2, "n": 4}),
            json!({"k": "odd", "n": 2}),
            json!({"k": "even", "n": 2}),
        ]
    );
}

#[tokio::test]
async fn test_panicking_callback_closes_the_queue() {
    let acc = accumulate_async(vec![1i32, 2]).map(|d, _| async move {
        assert!(d < 0, "callback gave up");
        d
    });
    let err = acc.to_vec().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::QueueClosed);
    assert_eq!(acc.queue_state(), QueueState::Closed);
    assert_eq!(acc.pending(), 0);
}
