//! The serialized, read-only tree: a BFS-walk flattening of
//! [`super::mutable::RStarTree`] into five parallel arrays, queried by
//! recursive descent that never mutates state and so needs no
//! synchronisation to share across threads.
//!
//! Node ids are assigned in level order as the BFS queue drains them:
//! internal nodes first (ids `0..num_internal`), then leaf nodes
//! (`num_internal..num_internal+num_leaf`), then item "nodes" (everything
//! past that, with an entry in the MBR/signature/item arrays but none in
//! the node array — an item has no children to record). Because every
//! R*-tree built here is height-balanced, a plain BFS naturally produces
//! that partition: the deepest level visited is always the leaf level.

use tracing::{debug, info};

use crate::exceptions::SrtreeError;
use crate::geometry::Rectangle;
use crate::signature::{Predicate, SigCodec, SignatureScheme};
use crate::tree::mutable::RStarTree;
use crate::tree::NodeId;

/// Current wire format version. Bump whenever the array layout changes.
pub const FORMAT_VERSION: u8 = 2;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct NodeRecord {
    first_child_id: u32,
    num_children: u8,
}

/// A frozen, read-only R*-tree. Construct with [`StaticSRTree::build`] from
/// a [`RStarTree`]; after that, `find`/`visit` are the only operations, and
/// both are safely callable from multiple threads without locking.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StaticSRTree<S: SignatureScheme>
where
    S::Sig: SigCodec,
{
    depth: usize,
    num_internal: u32,
    num_leaf: u32,
    num_item: u32,
    nodes: Vec<NodeRecord>,
    mbrs: Vec<Rectangle>,
    sigs: Vec<Vec<u8>>,
    items: Vec<u64>,
    _scheme: std::marker::PhantomData<S>,
}

impl<S: SignatureScheme> StaticSRTree<S>
where
    S::Sig: SigCodec,
{
    /// Flattens `tree` into level order. `tree` is left untouched; this is a
    /// read, not a move, since nothing about freezing requires consuming the
    /// mutable tree.
    pub fn build(tree: &RStarTree<S>) -> Self {
        info!(depth = tree.depth(), "serializing mutable tree to static form");

        // First pass: BFS by level, recording each tree NodeId's level-order
        // position so internal nodes can look up their first child's new id
        // once every node above the leaf level has one.
        let mut level_order: Vec<NodeId> = Vec::new();
        let mut leaf_ids: Vec<NodeId> = Vec::new();
        let mut frontier = vec![tree.root_id()];
        for level in (0..=tree.depth()).rev() {
            let mut next_frontier = Vec::new();
            for &node_id in &frontier {
                level_order.push(node_id);
                if level > 0 {
                    next_frontier.extend(tree.node_children(node_id));
                } else {
                    leaf_ids.push(node_id);
                }
            }
            frontier = next_frontier;
        }
        let num_internal = (level_order.len() - leaf_ids.len()) as u32;
        let num_leaf = leaf_ids.len() as u32;
        let id_of: std::collections::HashMap<NodeId, u32> = level_order
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i as u32))
            .collect();

        // Second pass: emit mbrs/sigs in level order, and for leaves, the
        // item ids flattened into a single trailing array.
        let mut nodes = Vec::with_capacity(level_order.len());
        let mut mbrs = Vec::with_capacity(level_order.len());
        let mut sigs = Vec::with_capacity(level_order.len());
        let mut items: Vec<u64> = Vec::new();

        for &node_id in &level_order {
            mbrs.push(tree.node_mbr(node_id));
            sigs.push(tree.node_sig(node_id).encode());
            let is_leaf = id_of[&node_id] >= num_internal;
            if is_leaf {
                let entries = tree.leaf_items(node_id);
                let first_child_id = (num_internal + num_leaf) + items.len() as u32;
                for e in entries {
                    items.push(e.item_id);
                }
                nodes.push(NodeRecord {
                    first_child_id,
                    num_children: entries.len() as u8,
                });
            } else {
                let children = tree.node_children(node_id);
                let first_child_id = *id_of
                    .get(children.first().expect("internal node has at least one child"))
                    .expect("child visited in level order");
                nodes.push(NodeRecord {
                    first_child_id,
                    num_children: children.len() as u8,
                });
            }
        }

        let num_item = items.len() as u32;
        debug!(num_internal, num_leaf, num_item, "static tree serialized");
        StaticSRTree {
            depth: tree.depth(),
            num_internal,
            num_leaf,
            num_item,
            nodes,
            mbrs,
            sigs,
            items,
            _scheme: std::marker::PhantomData,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn num_internal_nodes(&self) -> u32 {
        self.num_internal
    }

    pub fn num_leaf_nodes(&self) -> u32 {
        self.num_leaf
    }

    pub fn num_items(&self) -> u32 {
        self.num_item
    }

    fn node_count(&self) -> u32 {
        self.num_internal + self.num_leaf
    }

    /// `(first_child_id, num_children)` for a non-item node id.
    fn node(&self, id: u32) -> (u32, u8) {
        let rec = &self.nodes[id as usize];
        (rec.first_child_id, rec.num_children)
    }

    fn mbr(&self, id: u32) -> &Rectangle {
        &self.mbrs[id as usize]
    }

    fn signature(&self, id: u32) -> S::Sig {
        S::Sig::decode(&self.sigs[id as usize])
    }

    fn item(&self, id: u32) -> u64 {
        self.items[(id - self.node_count()) as usize]
    }

    /// Recursively collects item ids whose MBR satisfies `geom` and whose
    /// signature satisfies `predicate`, in encountered order. Both
    /// predicates are evaluated on a child before the traversal descends
    /// into it, so a failing child prunes its whole subtree.
    pub fn find(
        &self,
        geom: &impl Fn(&Rectangle) -> bool,
        predicate: &S::MayHaveMatch,
    ) -> Vec<u64> {
        let mut out = Vec::new();
        if geom(self.mbr(0)) && predicate.eval(&self.signature(0)) {
            self.find_recursive(0, self.depth, geom, predicate, &mut out);
        }
        out
    }

    fn find_recursive(
        &self,
        id: u32,
        level: usize,
        geom: &impl Fn(&Rectangle) -> bool,
        predicate: &S::MayHaveMatch,
        out: &mut Vec<u64>,
    ) {
        let (first_child, num_children) = self.node(id);
        if level == 0 {
            for i in 0..num_children as u32 {
                let item_id_slot = first_child + i;
                out.push(self.item(item_id_slot));
            }
            return;
        }
        for i in 0..num_children as u32 {
            let child_id = first_child + i;
            if geom(self.mbr(child_id)) && predicate.eval(&self.signature(child_id)) {
                self.find_recursive(child_id, level - 1, geom, predicate, out);
            }
        }
    }

    /// Like [`StaticSRTree::find`], but also records every interior node
    /// visited (pruned or not decided by the caller's `visitor`), useful for
    /// diagnostics and the `--prune-bench`-equivalent accounting named in
    /// the external interface.
    pub fn visit(
        &self,
        geom: &impl Fn(&Rectangle) -> bool,
        predicate: &S::MayHaveMatch,
        mut visitor: impl FnMut(u32, &Rectangle, bool),
    ) -> Vec<u64> {
        let mut out = Vec::new();
        let root_pass = geom(self.mbr(0)) && predicate.eval(&self.signature(0));
        visitor(0, self.mbr(0), root_pass);
        if root_pass {
            self.visit_recursive(0, self.depth, geom, predicate, &mut visitor, &mut out);
        }
        out
    }

    fn visit_recursive(
        &self,
        id: u32,
        level: usize,
        geom: &impl Fn(&Rectangle) -> bool,
        predicate: &S::MayHaveMatch,
        visitor: &mut impl FnMut(u32, &Rectangle, bool),
        out: &mut Vec<u64>,
    ) {
        let (first_child, num_children) = self.node(id);
        if level == 0 {
            for i in 0..num_children as u32 {
                out.push(self.item(first_child + i));
            }
            return;
        }
        for i in 0..num_children as u32 {
            let child_id = first_child + i;
            let pass = geom(self.mbr(child_id)) && predicate.eval(&self.signature(child_id));
            visitor(child_id, self.mbr(child_id), pass);
            if pass {
                self.visit_recursive(child_id, level - 1, geom, predicate, visitor, out);
            }
        }
    }
}

/// Encodes a [`StaticSRTree`] into the versioned wire format named in the
/// external interface: a version byte, a population-count header, then the
/// five length-prefixed arrays.
pub fn to_bytes<S: SignatureScheme>(tree: &StaticSRTree<S>) -> Vec<u8>
where
    S::Sig: SigCodec,
{
    let mut out = Vec::new();
    out.push(FORMAT_VERSION);
    out.extend_from_slice(&(tree.depth as u32).to_le_bytes());
    out.extend_from_slice(&tree.num_internal.to_le_bytes());
    out.extend_from_slice(&tree.num_leaf.to_le_bytes());
    out.extend_from_slice(&tree.num_item.to_le_bytes());

    write_array(&mut out, &tree.nodes, |rec, buf| {
        buf.extend_from_slice(&rec.first_child_id.to_le_bytes());
        buf.push(rec.num_children);
    });
    write_array(&mut out, &tree.mbrs, |r, buf| {
        buf.extend_from_slice(&r.min_lat.to_le_bytes());
        buf.extend_from_slice(&r.max_lat.to_le_bytes());
        buf.extend_from_slice(&r.min_lon.to_le_bytes());
        buf.extend_from_slice(&r.max_lon.to_le_bytes());
    });
    write_array(&mut out, &tree.sigs, |s, buf| {
        buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
        buf.extend_from_slice(s);
    });
    write_array(&mut out, &tree.items, |id, buf| {
        buf.extend_from_slice(&id.to_le_bytes());
    });
    out
}

fn write_array<T>(out: &mut Vec<u8>, items: &[T], mut encode_one: impl FnMut(&T, &mut Vec<u8>)) {
    let mut body = Vec::new();
    for item in items {
        encode_one(item, &mut body);
    }
    out.extend_from_slice(&(items.len() as u32).to_le_bytes());
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&body);
}

/// Reads back the version byte only, for callers that want to fail fast on
/// a mismatched blob before attempting a full parse.
pub fn peek_version(bytes: &[u8]) -> Result<u8, SrtreeError> {
    bytes.first().copied().ok_or(SrtreeError::Io("empty blob".into()))
}

pub fn check_version(bytes: &[u8]) -> Result<(), SrtreeError> {
    let found = peek_version(bytes)?;
    if found != FORMAT_VERSION {
        return Err(SrtreeError::VersionMismatch {
            expected: FORMAT_VERSION,
            found,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::stringset::StringSetScheme;
    use crate::tree::mutable::RStarTree;

    fn rect(a: f64, b: f64, c: f64, d: f64) -> Rectangle {
        Rectangle::new(a, b, c, d)
    }

    fn sample_tree() -> RStarTree<StringSetScheme> {
        let scheme = StringSetScheme::new();
        let mut tree = RStarTree::new(scheme, 2, 4).unwrap();
        for i in 0..30u64 {
            let x = i as f64;
            let sig = tree.scheme().signature("tag").unwrap();
            tree.insert(i, rect(x, x + 0.5, x, x + 0.5), sig);
        }
        tree
    }

    #[test]
    fn static_tree_preserves_item_count() {
        let tree = sample_tree();
        let expected = tree.find(&|_| true, &tree.scheme().may_have_match("tag", 0).unwrap()).len();
        let frozen = StaticSRTree::build(&tree);
        assert_eq!(frozen.num_items(), expected as u32);
    }

    #[test]
    fn static_tree_find_matches_mutable_find() {
        let tree = sample_tree();
        let pred = tree.scheme().may_have_match("tag", 0).unwrap();
        let frozen = StaticSRTree::build(&tree);
        let mut expected = tree.find(&|r| r.intersects(&rect(5.0, 10.0, 5.0, 10.0)), &pred);
        let mut actual = frozen.find(&|r| r.intersects(&rect(5.0, 10.0, 5.0, 10.0)), &pred);
        expected.sort_unstable();
        actual.sort_unstable();
        assert_eq!(expected, actual);
    }

    #[test]
    fn to_bytes_starts_with_version_byte() {
        let tree = sample_tree();
        let frozen = StaticSRTree::build(&tree);
        let bytes = to_bytes(&frozen);
        assert!(check_version(&bytes).is_ok());
    }

    #[test]
    fn version_mismatch_is_reported() {
        let bytes = vec![99u8, 0, 0, 0, 0];
        let err = check_version(&bytes).unwrap_err();
        assert!(matches!(
            err,
            SrtreeError::VersionMismatch { expected: FORMAT_VERSION, found: 99 }
        ));
    }
}
