use shared::*;

use srtree::dataset::DatasetSource;
use srtree::signature::stringset::StringSetScheme;
use srtree::signature::SignatureScheme;
use srtree::tree::mutable::RStarTree;
use srtree::tree::static_tree::StaticSRTree;
use tracing::info;

#[test]
fn mutable_tree_survives_freeze_with_identical_query_results() {
    info!("building mutable tree from sample dataset");
    let scheme = StringSetScheme::new();
    let mut tree = RStarTree::new(scheme, CAPACITY_MIN, CAPACITY_MAX).unwrap();
    for row in sample_dataset().rows() {
        let sig = tree
            .scheme()
            .signature_many(row.strings.iter().map(String::as_str))
            .unwrap();
        tree.insert(row.item_id, row.mbr, sig);
    }
    tree.check().expect("mutable tree passes consistency check");

    let pred = tree.scheme().may_have_match("amenity:bench", 0).unwrap();
    let mut expected = tree.find(&|_| true, &pred);
    expected.sort_unstable();

    let frozen = StaticSRTree::build(&tree);
    let mut actual = frozen.find(&|_| true, &pred);
    actual.sort_unstable();

    assert_eq!(expected, actual);
    assert_eq!(frozen.num_items(), 8);
}

#[test]
fn deleting_an_item_removes_it_from_subsequent_queries() {
    let scheme = StringSetScheme::new();
    let mut tree = RStarTree::new(scheme, CAPACITY_MIN, CAPACITY_MAX).unwrap();
    for row in sample_dataset().rows() {
        let sig = tree
            .scheme()
            .signature_many(row.strings.iter().map(String::as_str))
            .unwrap();
        tree.insert(row.item_id, row.mbr, sig);
    }

    let pred = tree.scheme().may_have_match("amenity:bench", 0).unwrap();
    let before = tree.find(&|_| true, &pred);
    assert!(before.contains(&0));

    let deleted = tree.delete(0, &rect(0.10, 0.10));
    assert!(deleted);
    tree.check().expect("mutable tree still consistent after delete");

    let after = tree.find(&|_| true, &pred);
    assert!(!after.contains(&0));
    assert_eq!(after.len(), before.len() - 1);
}

#[test]
fn overflow_heavy_build_keeps_tree_balanced() {
    let scheme = StringSetScheme::new();
    let mut tree = RStarTree::new(scheme, CAPACITY_MIN, CAPACITY_MAX).unwrap();
    for i in 0..200u64 {
        let x = (i % 20) as f64;
        let y = (i / 20) as f64;
        let sig = tree.scheme().signature("tag").unwrap();
        tree.insert(i, rect(x, y), sig);
    }
    tree.check().expect("heavily-overflowing build stays consistent");
    let pred = tree.scheme().may_have_match("tag", 0).unwrap();
    assert_eq!(tree.find(&|_| true, &pred).len(), 200);
}
