//! Planning against the in-memory store, then scanning every split on its
//! own worker thread.

use bytes::Bytes;
use ferry_plan::{KeyInterval, RangePartitioner, Value, WorkUnit};
use ferry_scan::{ColumnSpec, ColumnType, MemoryRangeStore, ScanOptions, ScanTask, StoreRow};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

fn load(store: &MemoryRangeStore, table: &str, keys: &BTreeSet<Vec<u8>>) {
    for key in keys {
        store
            .put(
                table,
                StoreRow::new(key.clone()).with_cell("cf", "raw", key.clone()),
            )
            .unwrap();
    }
}

fn scan_all(
    store: &Arc<MemoryRangeStore>,
    table: &str,
    requested: &KeyInterval,
    options: ScanOptions,
) -> Vec<Bytes> {
    let splits = RangePartitioner::new()
        .plan(store.as_ref(), table, requested)
        .unwrap();

    let workers: Vec<_> = WorkUnit::ranges(splits)
        .into_iter()
        .map(|unit| {
            // Units travel to workers encoded.
            let payload = unit.to_cbor().unwrap();
            let store = Arc::clone(store);
            let table = table.to_string();
            thread::spawn(move || {
                let unit = WorkUnit::from_cbor(&payload).unwrap();
                let mut task = ScanTask::new(vec![ColumnSpec::new("rowkey", ColumnType::BinaryString)])
                    .unwrap()
                    .with_options(options);
                let mut keys = Vec::new();
                task.run_unit(store.as_ref(), &table, &unit, |record| {
                    if let Value::Text(text) = &record[0] {
                        keys.push(ferry_plan::unescape_binary(text));
                    }
                })
                .unwrap();
                keys
            })
        })
        .collect();

    workers
        .into_iter()
        .flat_map(|w| w.join().unwrap())
        .collect()
}

#[test]
fn workers_cover_the_request_exactly_once() {
    let store = Arc::new(MemoryRangeStore::new());
    store.create_table("orders", vec![Bytes::from("m"), Bytes::from("t")]);
    let keys: BTreeSet<Vec<u8>> = ["a", "c", "k", "m", "p", "t", "u", "w"]
        .iter()
        .map(|k| k.as_bytes().to_vec())
        .collect();
    load(&store, "orders", &keys);

    let requested = KeyInterval::parse("c", "v", false).unwrap();
    let scanned = scan_all(&store, "orders", &requested, ScanOptions::new(2));

    let expected: Vec<Bytes> = ["c", "k", "m", "p", "t", "u"]
        .iter()
        .map(|k| Bytes::from(*k))
        .collect();
    assert_eq!(scanned, expected);
}

#[test]
fn binary_keys_round_trip_through_job_text() {
    let store = Arc::new(MemoryRangeStore::new());
    store.create_table("blobs", vec![Bytes::from_static(&[0x80])]);
    let keys: BTreeSet<Vec<u8>> = [vec![0x00, 0x01], vec![0x7f], vec![0x80, 0xff], vec![0xfe]]
        .into_iter()
        .collect();
    load(&store, "blobs", &keys);

    let requested = KeyInterval::parse("\\x01", "\\xFF", true).unwrap();
    let scanned = scan_all(&store, "blobs", &requested, ScanOptions::default());
    assert_eq!(
        scanned,
        vec![
            Bytes::from_static(&[0x7f]),
            Bytes::from_static(&[0x80, 0xff]),
            Bytes::from_static(&[0xfe]),
        ]
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn scanned_rows_equal_rows_in_range(
        keys in prop::collection::btree_set(prop::collection::vec(any::<u8>(), 1..4), 0..40),
        split_points in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..3), 0..5),
        start in prop::collection::vec(any::<u8>(), 0..3),
        end in prop::collection::vec(any::<u8>(), 0..3),
        caching in 1usize..8,
    ) {
        let store = Arc::new(MemoryRangeStore::new());
        store.create_table("t", split_points.into_iter().map(Bytes::from).collect());
        load(&store, "t", &keys);

        let start_bound = ferry_plan::KeyBound::from_raw(&start);
        let end_bound = ferry_plan::KeyBound::from_raw(&end);
        let Ok(requested) = KeyInterval::new(start_bound, end_bound) else {
            return Ok(());
        };

        let scanned = scan_all(&store, "t", &requested, ScanOptions::new(caching));
        let expected: Vec<Bytes> = keys
            .iter()
            .filter(|k| requested.contains(k))
            .map(|k| Bytes::from(k.clone()))
            .collect();
        prop_assert_eq!(scanned, expected);
    }
}
