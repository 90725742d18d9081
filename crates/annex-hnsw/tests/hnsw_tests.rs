use annex_core::{
    Bitset, BitsetView, Config, Dataset, FlatIndex, IndexError, IndexNode, MetricType, Version,
};
use annex_hnsw::HnswIndex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DIM: usize = 32;

fn random_data(rows: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..rows * DIM).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn build_cfg(metric: &str) -> Config {
    Config::new()
        .set("metric_type", metric)
        .set("m", 16)
        .set("ef_construction", 200)
        .set("ef", 200)
        .set("topk", 10)
}

fn build(metric: &str, data: &[f32]) -> HnswIndex {
    let base = Dataset::new(data.len() / DIM, DIM, data).unwrap();
    let mut index = HnswIndex::new(Version::current());
    index.build(&base, &build_cfg(metric)).unwrap();
    index
}

fn golden(metric: &str, data: &[f32]) -> FlatIndex {
    let base = Dataset::new(data.len() / DIM, DIM, data).unwrap();
    let mut index = FlatIndex::new(Version::current());
    index.build(&base, &Config::new().set("metric_type", metric)).unwrap();
    index
}

fn recall(got: &Dataset<'_>, want: &Dataset<'_>, k: usize) -> f32 {
    let got = got.ids().unwrap();
    let want = want.ids().unwrap();
    let mut hits = 0;
    for (g, w) in got.chunks(k).zip(want.chunks(k)) {
        hits += g.iter().filter(|id| **id >= 0 && w.contains(id)).count();
    }
    hits as f32 / want.iter().filter(|id| **id >= 0).count().max(1) as f32
}

#[test]
fn test_recall_against_flat() {
    let data = random_data(2000, 1);
    let queries = random_data(50, 2);
    let q = Dataset::new(50, DIM, queries.as_slice()).unwrap();

    // Inner product is not a metric space, so the graph is held to a
    // looser bar there
    for (metric, floor) in [("L2", 0.9), ("COSINE", 0.9), ("IP", 0.7)] {
        let index = build(metric, &data);
        let flat = golden(metric, &data);
        let cfg = Config::new().set("topk", 10);

        let got = index.search(&q, &cfg, BitsetView::empty()).unwrap();
        let want = flat.search(&q, &cfg, BitsetView::empty()).unwrap();
        let r = recall(&got, &want, 10);
        assert!(r >= floor, "{} recall {}", metric, r);
    }
}

#[test]
fn test_similarity_scores_descend() {
    let data = random_data(500, 3);
    let index = build("COSINE", &data);
    let q = Dataset::new(1, DIM, &data[..DIM]).unwrap();

    let result = index.search(&q, &Config::new().set("topk", 10), BitsetView::empty()).unwrap();
    let scores = result.distances().unwrap();
    assert_eq!(result.ids().unwrap()[0], 0);
    assert!((scores[0] - 1.0).abs() < 1e-5);
    for pair in scores.windows(2) {
        assert!(pair[0] >= pair[1]);
    }
}

#[test]
fn test_mask_respected_at_all_densities() {
    let data = random_data(1000, 4);
    let queries = random_data(10, 5);
    let q = Dataset::new(10, DIM, queries.as_slice()).unwrap();
    let index = build("L2", &data);

    for excluded in [0, 300, 500, 950, 1000] {
        let mut mask = Bitset::new(1000);
        for i in 0..excluded {
            mask.set((i * 7) % 1000);
        }
        let result = index
            .search(&q, &Config::new().set("topk", 20), mask.view())
            .unwrap();
        for &id in result.ids().unwrap() {
            assert!(id == -1 || !mask.view().test(id as usize));
        }
        if excluded == 1000 {
            assert!(result.ids().unwrap().iter().all(|&id| id == -1));
        }
    }
}

#[test]
fn test_range_search_matches_flat() {
    let data = random_data(1000, 6);
    let index = build("L2", &data);
    let flat = golden("L2", &data);
    let q = Dataset::new(1, DIM, &data[5 * DIM..6 * DIM]).unwrap();

    // Mean squared distance between rows is about 21
    let cfg = Config::new().set("radius", 14.0);
    let got = index.range_search(&q, &cfg, BitsetView::empty()).unwrap();
    let want = flat.range_search(&q, &cfg, BitsetView::empty()).unwrap();

    assert!(got.total() <= want.total());
    assert!(got.total() as f32 >= want.total() as f32 * 0.9);
    for &d in got.distances() {
        assert!(d <= 14.0);
    }
    assert_eq!(got.ids()[0], 5);
}

#[test]
fn test_iterator_walks_in_order() {
    let data = random_data(800, 7);
    let index = build("L2", &data);
    let q = Dataset::new(1, DIM, &data[..DIM]).unwrap();

    let mut mask = Bitset::new(800);
    mask.set(0);
    let mut iters = index.ann_iterator(&q, &Config::new(), mask.view()).unwrap();
    assert!(iters[0].has_next());

    let first: Vec<_> = iters[0].by_ref().take(100).collect();
    assert_eq!(first.len(), 100);
    assert!(first.iter().all(|n| n.id != 0));
    for pair in first.windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
    }
}

#[test]
fn test_iterator_unsupported_on_minimal_version() {
    let data = random_data(50, 8);
    let base = Dataset::new(50, DIM, data.as_slice()).unwrap();
    let mut index = HnswIndex::new(Version::minimal());
    index.build(&base, &build_cfg("L2")).unwrap();

    let q = Dataset::new(1, DIM, &data[..DIM]).unwrap();
    assert!(matches!(
        index.ann_iterator(&q, &Config::new(), BitsetView::empty()),
        Err(IndexError::Unsupported(_))
    ));
}

#[test]
fn test_lifecycle_errors() {
    let index = HnswIndex::new(Version::current());
    let q = Dataset::new(1, DIM, vec![0.0; DIM]).unwrap();
    assert!(matches!(
        index.search(&q, &Config::new().set("topk", 1), BitsetView::empty()),
        Err(IndexError::NotReady)
    ));

    let mut index = HnswIndex::new(Version::current());
    assert!(matches!(
        index.add(&q, &Config::new()),
        Err(IndexError::NotTrained)
    ));

    let data = random_data(10, 9);
    let index = build("L2", &data);
    let short = Dataset::new(1, 16, vec![0.0; 16]).unwrap();
    assert!(matches!(
        index.search(&short, &Config::new().set("topk", 1), BitsetView::empty()),
        Err(IndexError::DimensionMismatch {
            expected: 32,
            actual: 16
        })
    ));
}

#[test]
fn test_explicit_ids_and_raw_vectors() {
    let data = random_data(100, 10);
    let ids: Vec<i64> = (0..100).map(|i| 1000 + i * 3).collect();
    let base = Dataset::new(100, DIM, data.as_slice())
        .unwrap()
        .with_ids(ids.as_slice())
        .unwrap();
    let mut index = HnswIndex::new(Version::current());
    index.build(&base, &build_cfg("L2")).unwrap();

    let q = Dataset::new(1, DIM, &data[42 * DIM..43 * DIM]).unwrap();
    let result = index.search(&q, &Config::new().set("topk", 1), BitsetView::empty()).unwrap();
    assert_eq!(result.ids().unwrap(), &[1126]);

    let vectors = index.get_vector_by_ids(&[1126]).unwrap();
    assert_eq!(vectors.row(0).unwrap(), &data[42 * DIM..43 * DIM]);
    assert!(matches!(
        index.get_vector_by_ids(&[7]),
        Err(IndexError::InvalidParameter(_))
    ));

    let cosine = build("COSINE", &data);
    assert!(!cosine.has_raw_data(MetricType::Cosine));
    assert!(matches!(
        cosine.get_vector_by_ids(&[0]),
        Err(IndexError::RawDataUnavailable(_))
    ));
}

#[test]
fn test_file_round_trip() {
    let data = random_data(300, 11);
    let index = build("IP", &data);
    let queries = random_data(5, 12);
    let q = Dataset::new(5, DIM, queries.as_slice()).unwrap();
    let cfg = Config::new().set("topk", 10);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hnsw.idx");
    index.serialize_to_file(&path).unwrap();

    let mut loaded = HnswIndex::new(Version::current());
    loaded.deserialize_from_file(&path, &Config::new()).unwrap();
    assert_eq!(loaded.count(), 300);
    assert_eq!(
        index.search(&q, &cfg, BitsetView::empty()).unwrap(),
        loaded.search(&q, &cfg, BitsetView::empty()).unwrap()
    );
    assert_eq!(
        index.get_index_meta(&Config::new()).unwrap(),
        loaded.get_index_meta(&Config::new()).unwrap()
    );

    // Loaded graphs keep accepting vectors
    let extra = random_data(10, 13);
    loaded
        .add(&Dataset::new(10, DIM, extra.as_slice()).unwrap(), &Config::new())
        .unwrap();
    assert_eq!(loaded.count(), 310);
}

#[test]
fn test_meta_reports_levels() {
    let data = random_data(1000, 14);
    let index = build("L2", &data);
    let meta = index.get_index_meta(&Config::new()).unwrap();

    assert_eq!(meta["index_type"], "HNSW");
    assert_eq!(meta["count"], 1000);
    let histogram = meta["level_histogram"].as_array().unwrap();
    assert_eq!(histogram[0], 1000);
    for pair in histogram.windows(2) {
        assert!(pair[0].as_u64().unwrap() >= pair[1].as_u64().unwrap());
    }
}
