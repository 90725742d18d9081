//! Behavior every backend shares, checked through the factory.

use annex::{
    BinarySet, Bitset, BitsetView, Config, Dataset, IndexError, IndexFactory, IndexNode,
    IndexPack, IndexState, LocalFileManager, Version,
};
use annex_testkit::{calc_accuracy, calc_recall, gen_dataset, gen_random_bitset, write_raw_data};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const TYPES: [&str; 5] = ["FLAT", "IVF_FLAT", "IVF_SQ8", "HNSW", "DISKANN"];
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

fn pack() -> IndexPack {
    IndexPack::with_file_manager(Arc::new(LocalFileManager::new()))
}

fn build_cfg(name: &str, metric: &str, dir: &Path, rows: usize, dim: usize) -> Config {
    let cfg = Config::new().set("metric_type", metric);
    match name {
        "IVF_FLAT" | "IVF_SQ8" => cfg.set("nlist", 16).set("nprobe", 16),
        "HNSW" => cfg.set("m", 16).set("ef_construction", 100).set("ef", 100),
        "DISKANN" => cfg
            .set("index_prefix", dir.join("diskann").join("idx").to_str().unwrap())
            .set("data_path", dir.join("raw.bin").to_str().unwrap())
            .set("pq_code_budget_gb", (rows * dim) as f64 * 0.5 / GIB)
            .set("build_dram_budget_gb", 1.0)
            .set("max_degree", 32)
            .set("search_list_size", 100),
        _ => cfg,
    }
}

/// Build `name` over `data` (rows of `dim`), optionally with explicit ids.
/// The directory holds DISKANN's files and must outlive the index.
fn build(
    name: &str,
    metric: &str,
    data: &[f32],
    dim: usize,
    ids: Option<&[i64]>,
) -> (Box<dyn IndexNode>, TempDir) {
    let dir = TempDir::new().unwrap();
    let rows = data.len() / dim;
    write_raw_data(&dir.path().join("raw.bin"), data, rows, dim).unwrap();

    let mut base = Dataset::new(rows, dim, data).unwrap();
    if let Some(ids) = ids {
        base = base.with_ids(ids).unwrap();
    }
    let mut index = IndexFactory::create(name, Version::current(), &pack()).unwrap();
    index
        .build(&base, &build_cfg(name, metric, dir.path(), rows, dim))
        .unwrap();
    (index, dir)
}

#[test]
fn test_results_stay_in_id_space() {
    let dim = 32;
    let data = gen_dataset(1000, dim, 1);
    let ids: Vec<i64> = (0..1000).map(|i| 5000 + 7 * i).collect();
    let queries = gen_dataset(20, dim, 2);
    let q = Dataset::new(20, dim, queries.as_slice()).unwrap();
    let cfg = Config::new().set("topk", 10);

    for name in TYPES {
        let (implicit, _d1) = build(name, "L2", &data, dim, None);
        let result = implicit.search(&q, &cfg, BitsetView::empty()).unwrap();
        assert!(
            result.ids().unwrap().iter().all(|id| (0..1000).contains(id)),
            "{} returned an id outside [0, 1000)",
            name
        );

        let (explicit, _d2) = build(name, "L2", &data, dim, Some(ids.as_slice()));
        let result = explicit.search(&q, &cfg, BitsetView::empty()).unwrap();
        assert!(
            result.ids().unwrap().iter().all(|id| ids.contains(id)),
            "{} returned an id outside the dataset",
            name
        );
    }
}

#[test]
fn test_masked_ids_never_returned() {
    let dim = 32;
    let data = gen_dataset(1000, dim, 3);
    let queries = gen_dataset(10, dim, 4);
    let q = Dataset::new(10, dim, queries.as_slice()).unwrap();
    let mask = gen_random_bitset(1000, 300, 5);
    let view = mask.view();

    for name in TYPES {
        let (index, _dir) = build(name, "L2", &data, dim, None);

        let top = index.search(&q, &Config::new().set("topk", 10), view).unwrap();
        for &id in top.ids().unwrap() {
            assert!(id >= 0 && !view.test(id as usize), "{} returned masked {}", name, id);
        }

        let range = index
            .range_search(&q, &Config::new().set("radius", 14.0), view)
            .unwrap();
        for &id in range.ids() {
            assert!(!view.test(id as usize), "{} range returned masked {}", name, id);
        }
    }
}

#[test]
fn test_range_encoding_and_ordering() {
    let dim = 32;
    let data = gen_dataset(800, dim, 6);
    let queries = gen_dataset(8, dim, 7);
    let q = Dataset::new(8, dim, queries.as_slice()).unwrap();

    for name in TYPES {
        let (l2, _d1) = build(name, "L2", &data, dim, None);
        let range = l2
            .range_search(&q, &Config::new().set("radius", 14.0), BitsetView::empty())
            .unwrap();
        let lims = range.lims();
        assert_eq!(lims.len(), 9);
        assert_eq!(lims[0], 0);
        assert!(lims.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(lims[8], range.ids().len());
        assert_eq!(lims[8], range.distances().len());

        let cfg = Config::new().set("topk", 10);
        let first = l2.search(&q, &cfg, BitsetView::empty()).unwrap();
        for row in first.distances().unwrap().chunks(10) {
            assert!(row.windows(2).all(|w| w[0] <= w[1]), "{} L2 order", name);
        }
        assert_eq!(first, l2.search(&q, &cfg, BitsetView::empty()).unwrap());

        let (ip, _d2) = build(name, "IP", &data, dim, None);
        let scores = ip.search(&q, &cfg, BitsetView::empty()).unwrap();
        for row in scores.distances().unwrap().chunks(10) {
            assert!(row.windows(2).all(|w| w[0] >= w[1]), "{} IP order", name);
        }
    }
}

#[test]
fn test_serialize_round_trip() {
    let dim = 32;
    let data = gen_dataset(600, dim, 8);
    let queries = gen_dataset(10, dim, 9);
    let q = Dataset::new(10, dim, queries.as_slice()).unwrap();
    let mask = gen_random_bitset(600, 60, 10);
    let cfg = Config::new().set("topk", 10);

    for name in TYPES {
        let (index, _dir) = build(name, "IP", &data, dim, None);
        let mut binset = BinarySet::new();
        index.serialize(&mut binset).unwrap();

        let mut loaded = IndexFactory::create(name, Version::current(), &pack()).unwrap();
        loaded
            .deserialize(&BinarySet::from_bytes(&binset.to_bytes()).unwrap(), &Config::new())
            .unwrap();
        assert_eq!(loaded.count(), 600, "{}", name);
        assert_eq!(
            index.search(&q, &cfg, mask.view()).unwrap(),
            loaded.search(&q, &cfg, mask.view()).unwrap(),
            "{} results changed across serialization",
            name
        );
    }
}

#[test]
fn test_search_before_ready_fails() {
    let q = Dataset::new(1, 8, vec![0.0; 8]).unwrap();
    for name in TYPES {
        let index = IndexFactory::create(name, Version::current(), &pack()).unwrap();
        assert!(matches!(
            index.search(&q, &Config::new().set("topk", 1), BitsetView::empty()),
            Err(IndexError::NotReady)
        ));
        assert!(matches!(
            index.range_search(&q, &Config::new().set("radius", 1.0), BitsetView::empty()),
            Err(IndexError::NotReady)
        ));
    }
}

#[test]
fn test_failed_retrain_keeps_ready_index() {
    let dim = 32;
    let data = gen_dataset(400, dim, 17);
    let queries = gen_dataset(5, dim, 18);
    let q = Dataset::new(5, dim, queries.as_slice()).unwrap();
    let cfg = Config::new().set("topk", 5);

    for name in TYPES {
        let (mut index, dir) = build(name, "L2", &data, dim, None);
        let before = index.search(&q, &cfg, BitsetView::empty()).unwrap();

        let base = Dataset::new(400, dim, data.as_slice()).unwrap();
        let bad = build_cfg(name, "L2", dir.path(), 400, dim).set("bogus", 1);
        assert!(
            matches!(index.train(&base, &bad), Err(IndexError::InvalidParameter(_))),
            "{}",
            name
        );
        assert_eq!(index.state(), IndexState::Ready, "{}", name);
        assert_eq!(index.search(&q, &cfg, BitsetView::empty()).unwrap(), before, "{}", name);
    }
}

#[test]
fn test_dimension_mismatch() {
    let data = gen_dataset(300, 128, 11);
    let narrow = gen_dataset(1, 64, 12);
    let q = Dataset::new(1, 64, narrow.as_slice()).unwrap();

    for name in TYPES {
        let (index, _dir) = build(name, "L2", &data, 128, None);
        assert!(
            matches!(
                index.search(&q, &Config::new().set("topk", 1), BitsetView::empty()),
                Err(IndexError::DimensionMismatch { expected: 128, actual: 64 })
            ),
            "{}",
            name
        );
    }
}

#[test]
fn test_mask_coverage_shrinks_range_results() {
    let (rows, dim, nq) = (10_000, 128, 100);
    let data = gen_dataset(rows, dim, 13);
    let queries = gen_dataset(nq, dim, 14);
    let q = Dataset::new(nq, dim, queries.as_slice()).unwrap();
    let range_cfg = Config::new().set("radius", 60.0);

    for name in TYPES {
        let (index, _dir) = build(name, "L2", &data, dim, None);
        let mut previous: Option<Vec<usize>> = None;

        for percent in (0..=100).step_by(10) {
            // Nested masks: each level excludes a superset of the last
            let mut mask = Bitset::new(rows);
            for row in 0..rows * percent / 100 {
                mask.set(row);
            }
            let result = index.range_search(&q, &range_cfg, mask.view()).unwrap();
            let sizes: Vec<usize> = result.lims().windows(2).map(|w| w[1] - w[0]).collect();

            if let Some(previous) = &previous {
                for (now, before) in sizes.iter().zip(previous) {
                    assert!(now <= before, "{} grew at {}% masked", name, percent);
                }
            }
            if percent == 100 {
                assert_eq!(result.total(), 0);
            }
            previous = Some(sizes);
        }
    }
}

#[test]
fn test_empty_golden_agrees_with_empty_candidates() {
    let dim = 32;
    let data = gen_dataset(500, dim, 15);
    let queries = gen_dataset(5, dim, 16);
    let q = Dataset::new(5, dim, queries.as_slice()).unwrap();
    // Far below any pairwise distance of uniform 32-d data
    let cfg = Config::new().set("radius", 0.01);

    let (golden, _d1) = build("FLAT", "L2", &data, dim, None);
    let want = golden.range_search(&q, &cfg, BitsetView::empty()).unwrap();
    assert_eq!(want.total(), 0);

    for name in TYPES {
        let (index, _d2) = build(name, "L2", &data, dim, None);
        let got = index.range_search(&q, &cfg, BitsetView::empty()).unwrap();
        assert_eq!(got.total(), 0, "{}", name);
        assert_eq!(calc_recall(want.ids(), want.lims(), got.ids(), got.lims(), 5), 1.0);
        assert_eq!(calc_accuracy(want.ids(), want.lims(), got.ids(), got.lims(), 5), 1.0);
    }
}
