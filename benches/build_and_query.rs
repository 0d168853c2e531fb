use criterion::{black_box, criterion_group, criterion_main, Criterion};

use srtree::dataset::{DatasetSource, InMemoryDataset};
use srtree::geometry::Rectangle;
use srtree::query::{query_static, GeoQuery, TextQuery};
use srtree::signature::minhash::{LcgHash, MinHashScheme};
use srtree::signature::pqgram::PQGramScheme;
use srtree::signature::stringset::StringSetScheme;
use srtree::signature::SignatureScheme;
use srtree::tree::mutable::RStarTree;
use srtree::tree::static_tree::StaticSRTree;

const BENCH_NUM_ROWS: u64 = 2_000;
const BENCH_NODE_CAPACITY_MIN: usize = 8;
const BENCH_NODE_CAPACITY_MAX: usize = 32;
const BENCH_QGRAM_Q: usize = 3;

fn configure_criterion() -> Criterion {
    Criterion::default().measurement_time(std::time::Duration::from_secs(10))
}

fn generate_dataset() -> InMemoryDataset {
    let words = ["amenity:bench", "amenity:cafe", "highway:footway", "shop:bakery"];
    let mut ds = InMemoryDataset::new();
    for i in 0..BENCH_NUM_ROWS {
        let lat = (i % 100) as f64;
        let lon = (i / 100) as f64;
        let mbr = Rectangle::new(lat, lat + 1.0, lon, lon + 1.0);
        let strings = vec![words[i as usize % words.len()].to_string()];
        ds.push(i, mbr, strings);
    }
    ds
}

fn bench_build_stringset(_c: &mut Criterion) {
    let dataset = generate_dataset();
    let mut cc = configure_criterion();
    cc.bench_function("build_stringset", |b| {
        b.iter(|| {
            let scheme = StringSetScheme::new();
            let mut tree =
                RStarTree::new(scheme, BENCH_NODE_CAPACITY_MIN, BENCH_NODE_CAPACITY_MAX).unwrap();
            for row in dataset.rows() {
                let sig = tree
                    .scheme()
                    .signature_many(row.strings.iter().map(String::as_str))
                    .unwrap();
                tree.insert(row.item_id, row.mbr, sig);
            }
            black_box(tree);
        })
    });
}

fn bench_build_pqgram(_c: &mut Criterion) {
    let dataset = generate_dataset();
    let mut cc = configure_criterion();
    cc.bench_function("build_pqgram", |b| {
        b.iter(|| {
            let scheme = PQGramScheme::new(BENCH_QGRAM_Q);
            let mut tree =
                RStarTree::new(scheme, BENCH_NODE_CAPACITY_MIN, BENCH_NODE_CAPACITY_MAX).unwrap();
            for row in dataset.rows() {
                let sig = tree
                    .scheme()
                    .signature_many(row.strings.iter().map(String::as_str))
                    .unwrap();
                tree.insert(row.item_id, row.mbr, sig);
            }
            black_box(tree);
        })
    });
}

fn bench_build_minhash(_c: &mut Criterion) {
    use rand::SeedableRng;
    let dataset = generate_dataset();
    let mut cc = configure_criterion();
    cc.bench_function("build_minhash", |b| {
        b.iter(|| {
            let mut rng = rand::rngs::StdRng::seed_from_u64(42);
            let scheme = MinHashScheme::<LcgHash>::new_default_size(BENCH_QGRAM_Q, &mut rng);
            let mut tree =
                RStarTree::new(scheme, BENCH_NODE_CAPACITY_MIN, BENCH_NODE_CAPACITY_MAX).unwrap();
            for row in dataset.rows() {
                let sig = tree
                    .scheme()
                    .signature_many(row.strings.iter().map(String::as_str))
                    .unwrap();
                tree.insert(row.item_id, row.mbr, sig);
            }
            black_box(tree);
        })
    });
}

fn bench_query_static_pqgram(_c: &mut Criterion) {
    let dataset = generate_dataset();
    let scheme = PQGramScheme::new(BENCH_QGRAM_Q);
    let mut tree =
        RStarTree::new(scheme, BENCH_NODE_CAPACITY_MIN, BENCH_NODE_CAPACITY_MAX).unwrap();
    for row in dataset.rows() {
        let sig = tree
            .scheme()
            .signature_many(row.strings.iter().map(String::as_str))
            .unwrap();
        tree.insert(row.item_id, row.mbr, sig);
    }
    let frozen = StaticSRTree::build(&tree);

    let geo = GeoQuery::region(Rectangle::new(10.0, 40.0, 10.0, 40.0));
    let text = TextQuery::term("amenity:bench", 0);
    let mut cc = configure_criterion();
    cc.bench_function("query_static_pqgram", |b| {
        b.iter(|| {
            let results = query_static(&frozen, tree.scheme(), &geo, &text).unwrap();
            black_box(results);
        })
    });
}

fn bench_query_mutable_stringset(_c: &mut Criterion) {
    let dataset = generate_dataset();
    let scheme = StringSetScheme::new();
    let mut tree =
        RStarTree::new(scheme, BENCH_NODE_CAPACITY_MIN, BENCH_NODE_CAPACITY_MAX).unwrap();
    for row in dataset.rows() {
        let sig = tree
            .scheme()
            .signature_many(row.strings.iter().map(String::as_str))
            .unwrap();
        tree.insert(row.item_id, row.mbr, sig);
    }

    let geo = GeoQuery::region(Rectangle::new(10.0, 40.0, 10.0, 40.0));
    let text = TextQuery::term("amenity:bench", 0);
    let mut cc = configure_criterion();
    cc.bench_function("query_mutable_stringset", |b| {
        b.iter(|| {
            let results = srtree::query::query_mutable(&tree, tree.scheme(), &geo, &text).unwrap();
            black_box(results);
        })
    });
}

criterion_group!(
    benches,
    bench_build_stringset,
    bench_build_pqgram,
    bench_build_minhash,
    bench_query_static_pqgram,
    bench_query_mutable_stringset,
);
criterion_main!(benches);
