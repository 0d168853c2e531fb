use rand::SeedableRng;
use tracing::info;

use srtree::dataset::{DatasetSource, InMemoryDataset};
use srtree::geometry::Rectangle;
use srtree::query::{query_static, GeoQuery, TextQuery};
use srtree::signature::minhash::{LcgHash, MinHashScheme};
use srtree::signature::pqgram::PQGramScheme;
use srtree::signature::stringset::StringSetScheme;
use srtree::signature::SignatureScheme;
use srtree::tree::build::build_parallel;
use srtree::tree::mutable::RStarTree;
use srtree::tree::static_tree::StaticSRTree;

fn main() {
    println!("{}", "=".repeat(100));
    println!("srtree demo");

    let dataset = sample_dataset();
    info!(rows = dataset.len(), "built in-memory dataset");

    demo_minwise_lcg(&dataset);
    demo_minwise_sha(&dataset);
    demo_stringset(&dataset);
    demo_qgram(&dataset);
    demo_parallel_build(&dataset);
}

fn sample_dataset() -> InMemoryDataset {
    let mut ds = InMemoryDataset::new();
    let poi = [
        (0.10, 0.10, vec!["amenity:bench", "material:wood"]),
        (0.12, 0.11, vec!["amenity:bench", "material:metal"]),
        (0.50, 0.50, vec!["amenity:cafe", "cuisine:coffee_shop"]),
        (0.52, 0.49, vec!["amenity:restaurant", "cuisine:italian"]),
        (0.90, 0.90, vec!["highway:footway", "surface:paved"]),
        (0.91, 0.92, vec!["highway:footway", "surface:gravel"]),
        (0.30, 0.70, vec!["amenity:bench", "material:stone"]),
        (0.70, 0.30, vec!["shop:bakery", "cuisine:bread"]),
    ];
    for (i, (lat, lon, tags)) in poi.iter().enumerate() {
        let rect = Rectangle::new(*lat, *lat + 0.01, *lon, *lon + 0.01);
        let strings = tags.iter().map(|s| s.to_string()).collect();
        ds.push(i as u64, rect, strings);
    }
    ds
}

fn build<S: SignatureScheme>(scheme: S, dataset: &InMemoryDataset) -> RStarTree<S>
where
    S::Sig: PartialEq,
{
    let mut tree = RStarTree::new(scheme, 2, 8).expect("valid fan-out bounds");
    for row in dataset.rows() {
        let sig = tree
            .scheme()
            .signature_many(row.strings.iter().map(String::as_str))
            .expect("non-empty string set");
        tree.insert(row.item_id, row.mbr, sig);
    }
    tree.check().expect("tree is internally consistent after build");
    tree
}

fn demo_minwise_lcg(dataset: &InMemoryDataset) {
    println!("{}", "-".repeat(100));
    println!("minwise-lcg32");
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let scheme = MinHashScheme::<LcgHash>::new_default_size(3, &mut rng);
    run_demo(scheme, dataset, "amenity:bench", 0);
}

fn demo_minwise_sha(dataset: &InMemoryDataset) {
    println!("{}", "-".repeat(100));
    println!("minwise-sha");
    let mut rng = rand::rngs::StdRng::seed_from_u64(11);
    let scheme =
        MinHashScheme::<srtree::signature::minhash::Sha3Hash>::new_default_size(3, &mut rng);
    run_demo(scheme, dataset, "highway:footway", 0);
}

fn demo_stringset(dataset: &InMemoryDataset) {
    println!("{}", "-".repeat(100));
    println!("stringset");
    let scheme = StringSetScheme::new();
    run_demo(scheme, dataset, "amenity:bench", 0);
}

fn demo_qgram(dataset: &InMemoryDataset) {
    println!("{}", "-".repeat(100));
    println!("qgram");
    let scheme = PQGramScheme::new(3);
    run_demo(scheme, dataset, "amenity:cafe", 1);
}

fn demo_parallel_build(dataset: &InMemoryDataset) {
    println!("{}", "-".repeat(100));
    println!("parallel build (stringset, 4 workers)");
    let scheme = StringSetScheme::new();
    let tree = build_parallel(scheme, 2, 8, dataset, 4).expect("parallel build succeeds");
    tree.check().expect("parallel build is internally consistent");
    info!(depth = tree.depth(), "parallel build complete");
}

fn run_demo<S: SignatureScheme>(
    scheme: S,
    dataset: &InMemoryDataset,
    query: &str,
    edit_distance: usize,
) where
    S::Sig: srtree::signature::SigCodec + PartialEq,
{
    let tree = build(scheme, dataset);
    info!(depth = tree.depth(), "tree built");

    let frozen = StaticSRTree::build(&tree);
    info!(
        items = frozen.num_items(),
        internal = frozen.num_internal_nodes(),
        leaves = frozen.num_leaf_nodes(),
        "serialized to static tree"
    );

    let geo = GeoQuery::region(Rectangle::new(0.0, 1.0, 0.0, 1.0));
    let text = TextQuery::term(query, edit_distance);
    let results = query_static(&frozen, tree.scheme(), &geo, &text).expect("well-formed query");
    info!(?results, query, edit_distance, "query complete");
}
