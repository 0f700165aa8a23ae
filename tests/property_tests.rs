//! Property-based tests using proptest

use proptest::prelude::*;
use rapid_accumulate::*;
use serde_json::Value;

fn sum(acc: i64, cur: i64, _: usize) -> CallbackResult<i64> {
    Ok(acc + cur)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn test_round_trip_preserves_input(data in prop::collection::vec(any::<i32>(), 0..50)) {
        let mut acc = accumulate(data.clone());
        prop_assert_eq!(acc.to_vec().unwrap(), data);
    }

    #[test]
    fn test_reduce_matches_fold(
        data in prop::collection::vec(-1000i64..1000, 0..50),
        initial in -1000i64..1000
    ) {
        let mut acc = accumulate(data.clone()).reduce_with(initial, sum);
        let expected = data.iter().fold(initial, |a, b| a + b);
        prop_assert_eq!(acc.to_vec().unwrap(), vec![expected]);
    }

    #[test]
    fn test_split_appends_match_single_append(
        data in prop::collection::vec(-1000i64..1000, 1..50),
        split in 0usize..50
    ) {
        let split = split.min(data.len());
        let (head, tail) = data.split_at(split);

        let mut whole = accumulate(data.clone()).reduce(sum);
        let mut pieces = accumulate(head.to_vec()).reduce(sum).append(tail.to_vec());
        prop_assert_eq!(whole.to_vec().unwrap(), pieces.to_vec().unwrap());
    }

    #[test]
    fn test_single_key_pivot_equals_reduce(data in prop::collection::vec(-1000i64..1000, 1..50)) {
        let mut direct = accumulate(data.clone()).reduce(sum);
        let mut pivoted = accumulate(data)
            .pivot(PivotSpec::new(|_: &i64| Ok("all".into()), sum).value_name("total"));

        let total = direct.to_vec().unwrap()[0];
        let rows = pivoted.to_vec().unwrap();
        prop_assert_eq!(rows.len(), 1);
        prop_assert_eq!(&rows[0]["total"], &Value::from(total));
    }

    #[test]
    fn test_fan_out_reaches_every_partition(data in prop::collection::vec(0i64..100, 1..50)) {
        let mut acc = accumulate(data.clone()).pivot(
            PivotSpec::with_initial_value(
                |_: &i64| Ok(vec!["left", "right"].into()),
                0usize,
                |n: usize, _d: i64, _| Ok(n + 1),
            )
            .value_name("n"),
        );
        let rows = acc.to_vec().unwrap();
        prop_assert_eq!(rows.len(), 2);
        for row in rows {
            prop_assert_eq!(&row["n"], &Value::from(data.len()));
        }
    }

    #[test]
    fn test_sort_matches_std_sort(data in prop::collection::vec(any::<i16>(), 0..50)) {
        let mut acc = accumulate(data.clone()).sort(|a: &i16, b| a.cmp(b));
        let mut expected = data;
        expected.sort();
        prop_assert_eq!(acc.to_vec().unwrap(), expected);
    }

    #[test]
    fn test_online_sort_is_ordered(
        initial in prop::collection::vec(any::<i16>(), 0..20),
        later in prop::collection::vec(any::<i16>(), 0..20)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let sorted = runtime.block_on(async {
            accumulate_async(initial.clone())
                .sort(|a: i16, b: i16| async move { a.cmp(&b) })
                .append(later.clone())
                .to_vec()
                .await
                .unwrap()
        });

        let mut expected: Vec<i16> = initial.into_iter().chain(later).collect();
        expected.sort();
        prop_assert_eq!(sorted, expected);
    }
}
