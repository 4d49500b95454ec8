//! Property tests for the partitioners.

use bytes::Bytes;
use ferry_plan::{
    CountPartitioner, KeyBound, KeyInterval, PartitionBoundary, RangePartitioner, ScanSplit,
};
use proptest::prelude::*;

/// Short keys over a tiny alphabet so bounds collide often.
fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(prop::sample::select(vec![b'a', b'b', b'c', 0x00, 0xff]), 1..4)
}

fn bound_strategy() -> impl Strategy<Value = KeyBound> {
    prop_oneof![
        1 => Just(KeyBound::Unbounded),
        4 => key_strategy().prop_map(|k| KeyBound::bounded(k)),
    ]
}

fn regions_strategy() -> impl Strategy<Value = Vec<PartitionBoundary>> {
    prop::collection::btree_set(key_strategy(), 0..6).prop_map(|points| {
        let points: Vec<Bytes> = points.into_iter().map(Bytes::from).collect();
        PartitionBoundary::covering(&points)
    })
}

fn interval_strategy() -> impl Strategy<Value = KeyInterval> {
    (bound_strategy(), bound_strategy()).prop_map(|(a, b)| {
        KeyInterval::new(a.clone(), b.clone())
            .or_else(|_| KeyInterval::new(b, a))
            .unwrap()
    })
}

/// Every key named by the regions or the request, plus neighbours.
fn probes(requested: &KeyInterval, regions: &[PartitionBoundary]) -> Vec<Vec<u8>> {
    let mut keys: Vec<Vec<u8>> = vec![Vec::new(), vec![0x00], vec![0xff; 4]];
    let bounds = regions
        .iter()
        .flat_map(|r| [&r.start, &r.end])
        .chain([requested.start(), requested.end()]);
    for bound in bounds {
        if let Some(k) = bound.as_bytes() {
            keys.push(k.to_vec());
            let mut after = k.to_vec();
            after.push(0x00);
            keys.push(after);
            let mut before = k.to_vec();
            before.pop();
            keys.push(before);
        }
    }
    keys
}

fn covering_splits<'a>(splits: &'a [ScanSplit], key: &[u8]) -> Vec<&'a ScanSplit> {
    splits.iter().filter(|s| s.contains(key)).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn splits_cover_exactly_the_request(
        requested in interval_strategy(),
        regions in regions_strategy(),
        extra in prop::collection::vec(key_strategy(), 0..8),
    ) {
        let splits = RangePartitioner::new().split(&requested, &regions);

        let mut keys = probes(&requested, &regions);
        keys.extend(extra);
        for key in keys {
            let hits = covering_splits(&splits, &key);
            if requested.contains(&key) {
                prop_assert_eq!(hits.len(), 1, "key {:?} covered {} times", key, hits.len());
            } else {
                prop_assert!(hits.is_empty(), "key {:?} outside request was covered", key);
            }
        }
    }

    #[test]
    fn every_split_sits_in_one_region(
        requested in interval_strategy(),
        regions in regions_strategy(),
    ) {
        let splits = RangePartitioner::new().split(&requested, &regions);
        prop_assert!(splits.len() <= regions.len());
        for split in &splits {
            let owner = regions.iter().find(|r| {
                split.start().cmp_as_start(&r.start).is_ge()
                    && split.end().cmp_as_end(&r.end).is_le()
            });
            prop_assert!(owner.is_some(), "split {} crosses a region edge", split);
        }
    }

    #[test]
    fn range_split_is_idempotent(
        requested in interval_strategy(),
        regions in regions_strategy(),
    ) {
        let partitioner = RangePartitioner::new();
        prop_assert_eq!(
            partitioner.split(&requested, &regions),
            partitioner.split(&requested, &regions)
        );
    }

    #[test]
    fn chunks_reconstruct_the_count(count in 0i64..5_000, parallelism in 1usize..64) {
        let chunks = CountPartitioner::new().split(count, parallelism).unwrap();

        let total: u64 = chunks.iter().map(|c| c.length).sum();
        prop_assert_eq!(total, count as u64);

        let mut next = 0u64;
        for chunk in &chunks {
            prop_assert_eq!(chunk.offset, next);
            next = chunk.end();
        }
        prop_assert_eq!(next, count as u64);

        if count > 0 {
            prop_assert_eq!(chunks.len(), parallelism);
            let max = chunks.iter().map(|c| c.length).max().unwrap();
            let min = chunks.iter().map(|c| c.length).min().unwrap();
            prop_assert!(max - min <= 1);
        } else {
            prop_assert_eq!(chunks.len(), 1);
        }

        prop_assert_eq!(&chunks, &CountPartitioner::new().split(count, parallelism).unwrap());
    }
}
