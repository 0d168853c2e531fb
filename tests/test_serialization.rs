#![cfg(feature = "serde")]

use shared::*;

use srtree::signature::stringset::StringSetScheme;
use srtree::signature::SignatureScheme;
use srtree::tree::mutable::RStarTree;
use srtree::tree::static_tree::StaticSRTree;

fn built_tree() -> RStarTree<StringSetScheme> {
    let scheme = StringSetScheme::new();
    let mut tree = RStarTree::new(scheme, CAPACITY_MIN, CAPACITY_MAX).unwrap();
    for row in sample_dataset().rows() {
        let sig = tree
            .scheme()
            .signature_many(row.strings.iter().map(String::as_str))
            .unwrap();
        tree.insert(row.item_id, row.mbr, sig);
    }
    tree
}

#[test]
fn mutable_tree_round_trips_through_bincode() -> anyhow::Result<()> {
    let tree = built_tree();
    let pred = tree.scheme().may_have_match("amenity:bench", 0).unwrap();
    let mut before = tree.find(&|_| true, &pred);
    before.sort_unstable();

    let encoded = bincode::serialize(&tree)?;
    let decoded: RStarTree<StringSetScheme> = bincode::deserialize(&encoded[..])?;

    let mut after = decoded.find(&|_| true, &pred);
    after.sort_unstable();
    assert_eq!(before, after);
    assert_eq!(decoded.depth(), tree.depth());
    Ok(())
}

#[test]
fn static_tree_round_trips_through_bincode() -> anyhow::Result<()> {
    let tree = built_tree();
    let frozen = StaticSRTree::build(&tree);
    let pred = tree.scheme().may_have_match("amenity:bench", 0).unwrap();
    let mut before = frozen.find(&|_| true, &pred);
    before.sort_unstable();

    let encoded = bincode::serialize(&frozen)?;
    let decoded: StaticSRTree<StringSetScheme> = bincode::deserialize(&encoded[..])?;

    let mut after = decoded.find(&|_| true, &pred);
    after.sort_unstable();
    assert_eq!(before, after);
    assert_eq!(decoded.num_items(), frozen.num_items());
    Ok(())
}
