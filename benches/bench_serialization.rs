use criterion::{criterion_group, criterion_main, Criterion};

use srtree::dataset::{DatasetSource, InMemoryDataset};
use srtree::geometry::Rectangle;
use srtree::signature::stringset::StringSetScheme;
use srtree::signature::SignatureScheme;
use srtree::tree::mutable::RStarTree;
use srtree::tree::static_tree::StaticSRTree;

const BENCH_NUM_ROWS: u64 = 2_000;
const BENCH_NODE_CAPACITY_MIN: usize = 8;
const BENCH_NODE_CAPACITY_MAX: usize = 32;

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

fn built_tree() -> RStarTree<StringSetScheme> {
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
    tree
}

fn bench_mutable_tree_serialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("RStarTree Serialization");
    let tree = built_tree();

    group.bench_function("serialize", |b| {
        b.iter(|| {
            let _encoded: Vec<u8> = bincode::serialize(&tree).unwrap();
        })
    });

    let encoded: Vec<u8> = bincode::serialize(&tree).unwrap();
    group.bench_function("deserialize", |b| {
        b.iter(|| {
            let _decoded: RStarTree<StringSetScheme> =
                bincode::deserialize(&encoded[..]).unwrap();
        })
    });
}

fn bench_static_tree_serialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("StaticSRTree Serialization");
    let frozen = StaticSRTree::build(&built_tree());

    group.bench_function("serialize", |b| {
        b.iter(|| {
            let _encoded: Vec<u8> = bincode::serialize(&frozen).unwrap();
        })
    });

    let encoded: Vec<u8> = bincode::serialize(&frozen).unwrap();
    group.bench_function("deserialize", |b| {
        b.iter(|| {
            let _decoded: StaticSRTree<StringSetScheme> =
                bincode::deserialize(&encoded[..]).unwrap();
        })
    });
}

criterion_group!(
    benches,
    bench_mutable_tree_serialization,
    bench_static_tree_serialization
);
criterion_main!(benches);
