use annex_core::{
    BinarySet, Bitset, BitsetView, Config, Dataset, FlatIndex, IndexNode, Neighbor,
    RangeSearchResult, Version,
};
use proptest::prelude::*;

// Strategy: per-query neighbour lists with ascending distances
fn arb_lists() -> impl Strategy<Value = Vec<Vec<Neighbor>>> {
    prop::collection::vec(
        prop::collection::vec((0i64..10_000, 0.0f32..100.0), 0..20).prop_map(|mut hits| {
            hits.sort_by(|a, b| a.1.total_cmp(&b.1));
            hits.into_iter()
                .map(|(id, d)| Neighbor::new(id, d))
                .collect::<Vec<_>>()
        }),
        1..30,
    )
}

fn arb_vectors(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-10.0f32..10.0, (8 * dim)..=(64 * dim))
        .prop_map(move |mut v| {
            v.truncate(v.len() / dim * dim);
            v
        })
}

proptest! {
    #[test]
    fn prop_range_encoding_invariants(lists in arb_lists()) {
        let nq = lists.len();
        let total: usize = lists.iter().map(Vec::len).sum();
        let result = RangeSearchResult::from_neighbors(lists.clone(), annex_core::MetricType::L2);

        prop_assert_eq!(result.lims().len(), nq + 1);
        prop_assert_eq!(result.lims()[0], 0);
        prop_assert_eq!(result.lims()[nq], total);
        prop_assert!(result.lims().windows(2).all(|w| w[0] <= w[1]));

        for (q, list) in lists.iter().enumerate() {
            let (ids, _) = result.query(q);
            let expected: Vec<i64> = list.iter().map(|n| n.id).collect();
            prop_assert_eq!(ids, expected.as_slice());
        }

        // The arrays are accepted back by the validating constructor
        let rebuilt = RangeSearchResult::new(
            result.ids().to_vec(),
            result.distances().to_vec(),
            result.lims().to_vec(),
        );
        prop_assert!(rebuilt.is_ok());
    }

    #[test]
    fn prop_bitset_count_matches_tests(bits in prop::collection::vec(any::<bool>(), 0..300)) {
        let mut owned = Bitset::new(bits.len());
        for (i, &b) in bits.iter().enumerate() {
            if b {
                owned.set(i);
            }
        }
        let view = owned.view();
        let expected = bits.iter().filter(|&&b| b).count();
        prop_assert_eq!(view.count_ones(), expected);
        for (i, &b) in bits.iter().enumerate() {
            prop_assert_eq!(view.test(i), b);
        }
    }

    #[test]
    fn prop_flat_results_sorted_and_unmasked(data in arb_vectors(4), mask_seed in any::<u64>()) {
        let rows = data.len() / 4;
        let base = Dataset::new(rows, 4, data.as_slice()).unwrap();
        let cfg = Config::new().set("metric_type", "L2").set("topk", 10);
        let mut index = FlatIndex::new(Version::current());
        index.build(&base, &cfg).unwrap();

        let mut mask = Bitset::new(rows);
        for i in 0..rows {
            if (mask_seed >> (i % 64)) & 1 == 1 {
                mask.set(i);
            }
        }

        let query = Dataset::new(1, 4, &data[..4]).unwrap();
        let result = index.search(&query, &cfg, mask.view()).unwrap();
        let ids = result.ids().unwrap();
        let distances = result.distances().unwrap();

        for (slot, &id) in ids.iter().enumerate() {
            if id >= 0 {
                prop_assert!(!mask.view().test(id as usize));
            }
            if slot > 0 && id >= 0 {
                prop_assert!(distances[slot - 1] <= distances[slot]);
            }
        }

        // A round trip through the binary set is query-equivalent
        let mut binset = BinarySet::new();
        index.serialize(&mut binset).unwrap();
        let mut loaded = FlatIndex::new(Version::current());
        loaded.deserialize(&BinarySet::from_bytes(&binset.to_bytes()).unwrap(), &Config::new()).unwrap();
        prop_assert_eq!(loaded.search(&query, &cfg, mask.view()).unwrap(), result.clone());

        let unfiltered = index.search(&query, &cfg, BitsetView::empty()).unwrap();
        prop_assert_eq!(unfiltered.ids().unwrap()[0] >= 0, true);
    }
}
