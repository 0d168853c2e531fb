//! The mutable R*-tree: forced-reinsertion insertion (Beckmann et al.),
//! axis/index-choice splitting, and a build-time-only deletion path.
//!
//! Nodes live in an arena (`Vec<RefCell<ArenaNode<S>>>`) addressed by
//! [`NodeId`] rather than a `Box`-recursive enum: splits and forced
//! reinsertion both detach and reattach subtrees more aggressively than a
//! plain R-tree ever needs to, and an arena sidesteps re-deriving `Box`
//! ownership on every one of those moves. The root always lives at id 0 for
//! the tree's whole lifetime; a root split reuses that slot in place rather
//! than allocating a new one, so callers never need to track a moving root
//! id.

use std::cell::RefCell;
use std::cmp::Ordering;

use tracing::{debug, info};

use crate::exceptions::SrtreeError;
use crate::geometry::Rectangle;
use crate::signature::SignatureScheme;
use crate::tree::NodeId;

/// A single indexed item: the unit of storage at leaf level.
#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(bound(
        serialize = "S::Sig: serde::Serialize",
        deserialize = "S::Sig: serde::de::DeserializeOwned"
    ))
)]
pub struct ItemEntry<S: SignatureScheme> {
    pub item_id: u64,
    pub mbr: Rectangle,
    pub sig: S::Sig,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(bound(
        serialize = "S::Sig: serde::Serialize",
        deserialize = "S::Sig: serde::de::DeserializeOwned"
    ))
)]
enum ArenaNode<S: SignatureScheme> {
    Leaf {
        mbr: Rectangle,
        sig: S::Sig,
        parent: Option<NodeId>,
        items: Vec<ItemEntry<S>>,
    },
    Internal {
        mbr: Rectangle,
        sig: S::Sig,
        parent: Option<NodeId>,
        children: Vec<NodeId>,
    },
    /// A deleted slot; never reoccupied, so ids stay stable for anything
    /// still holding one.
    Tombstone,
}

impl<S: SignatureScheme> ArenaNode<S> {
    fn mbr(&self) -> &Rectangle {
        match self {
            ArenaNode::Leaf { mbr, .. } | ArenaNode::Internal { mbr, .. } => mbr,
            ArenaNode::Tombstone => unreachable!("access through a tombstoned node"),
        }
    }

    fn sig(&self) -> &S::Sig {
        match self {
            ArenaNode::Leaf { sig, .. } | ArenaNode::Internal { sig, .. } => sig,
            ArenaNode::Tombstone => unreachable!("access through a tombstoned node"),
        }
    }

    fn parent(&self) -> Option<NodeId> {
        match self {
            ArenaNode::Leaf { parent, .. } | ArenaNode::Internal { parent, .. } => *parent,
            ArenaNode::Tombstone => unreachable!("access through a tombstoned node"),
        }
    }

    fn set_parent(&mut self, p: Option<NodeId>) {
        match self {
            ArenaNode::Leaf { parent, .. } | ArenaNode::Internal { parent, .. } => *parent = p,
            ArenaNode::Tombstone => unreachable!("access through a tombstoned node"),
        }
    }

    fn is_leaf(&self) -> bool {
        matches!(self, ArenaNode::Leaf { .. })
    }

    fn len(&self) -> usize {
        match self {
            ArenaNode::Leaf { items, .. } => items.len(),
            ArenaNode::Internal { children, .. } => children.len(),
            ArenaNode::Tombstone => 0,
        }
    }
}

/// An item or a detached subtree, ready to be routed back into the tree at
/// a specific level-from-leaf (`0` for items, the subtree's own height for
/// a reinserted internal node).
enum Entry<S: SignatureScheme> {
    Item(ItemEntry<S>),
    Subtree {
        mbr: Rectangle,
        node: NodeId,
    },
}

impl<S: SignatureScheme> Entry<S> {
    fn mbr(&self) -> &Rectangle {
        match self {
            Entry::Item(i) => &i.mbr,
            Entry::Subtree { mbr, .. } => mbr,
        }
    }
}

enum Overflow<S: SignatureScheme> {
    Leaf(Vec<ItemEntry<S>>),
    Internal(Vec<NodeId>),
}

/// A mutable R*-tree over items identified by `u64` id, generic over a
/// [`SignatureScheme`] so every node also carries a combined textual
/// signature alongside its MBR.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(bound(
        serialize = "S: serde::Serialize, S::Sig: serde::Serialize",
        deserialize = "S: serde::de::DeserializeOwned, S::Sig: serde::de::DeserializeOwned"
    ))
)]
pub struct RStarTree<S: SignatureScheme> {
    scheme: S,
    arena: Vec<RefCell<ArenaNode<S>>>,
    root: NodeId,
    m: usize,
    big_m: usize,
    /// Tree height measured in edges from root to leaf; `0` while the root
    /// is itself a leaf.
    depth: usize,
}

impl<S: SignatureScheme> RStarTree<S> {
    /// Creates an empty tree with fan-out bounds `[m, big_m]`.
    ///
    /// # Errors
    ///
    /// Returns [`SrtreeError::InvalidCapacity`] unless `2 <= m <= big_m/2`.
    pub fn new(scheme: S, m: usize, big_m: usize) -> Result<Self, SrtreeError> {
        if m < 2 || m > big_m / 2 {
            return Err(SrtreeError::InvalidCapacity { m, big_m });
        }
        info!("creating RStarTree with m={}, M={}", m, big_m);
        let root_sig = scheme.empty_signature();
        let arena = vec![RefCell::new(ArenaNode::Leaf {
            mbr: Rectangle::empty(),
            sig: root_sig,
            parent: None,
            items: Vec::new(),
        })];
        Ok(RStarTree {
            scheme,
            arena,
            root: 0,
            m,
            big_m,
            depth: 0,
        })
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn root_mbr(&self) -> Rectangle {
        self.arena[self.root as usize].borrow().mbr().clone()
    }

    pub fn root_signature(&self) -> S::Sig {
        self.arena[self.root as usize].borrow().sig().clone()
    }

    pub fn scheme(&self) -> &S {
        &self.scheme
    }

    /// The arena id of the current root. Stable across inserts/deletes: a
    /// root split reuses this same id rather than allocating a fresh one.
    pub fn root_id(&self) -> NodeId {
        self.root
    }

    pub fn node_mbr(&self, node_id: NodeId) -> Rectangle {
        self.arena[node_id as usize].borrow().mbr().clone()
    }

    pub fn node_sig(&self, node_id: NodeId) -> S::Sig {
        self.arena[node_id as usize].borrow().sig().clone()
    }

    /// Children of an internal node, in storage order. Panics if `node_id`
    /// names a leaf; callers drive the recursion by `depth()` and never
    /// call this once they've reached level 0.
    pub fn node_children(&self, node_id: NodeId) -> Vec<NodeId> {
        match &*self.arena[node_id as usize].borrow() {
            ArenaNode::Internal { children, .. } => children.clone(),
            _ => panic!("node_children called on a non-internal node"),
        }
    }

    /// Items of a leaf node, in storage order. Panics if `node_id` names an
    /// internal node.
    pub fn leaf_items(&self, node_id: NodeId) -> Vec<ItemEntry<S>> {
        match &*self.arena[node_id as usize].borrow() {
            ArenaNode::Leaf { items, .. } => items.clone(),
            _ => panic!("leaf_items called on a non-leaf node"),
        }
    }

    /// Inserts a single item, driving forced reinsertion/splitting until
    /// every overflow this insertion caused has been resolved.
    pub fn insert(&mut self, item_id: u64, mbr: Rectangle, sig: S::Sig) {
        debug!(item_id, "inserting item into RStarTree");
        self.insert_one(Entry::Item(ItemEntry { item_id, mbr, sig }), 0);
    }

    fn insert_one(&mut self, entry: Entry<S>, target_level: usize) {
        let mut levels_touched = vec![false; self.depth + 1];
        let mut queue = vec![(entry, target_level)];
        while let Some((entry, level)) = queue.pop() {
            let root_level = self.depth;
            if let Some((overflow, overflow_level)) =
                self.insert_recursive(self.root, entry, root_level, level, &mut queue, &mut levels_touched)
            {
                debug_assert_eq!(overflow_level, self.depth, "root overflow must be at root level");
                self.split_root(overflow);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn insert_recursive(
        &mut self,
        node_id: NodeId,
        entry: Entry<S>,
        level_here: usize,
        target_level: usize,
        queue: &mut Vec<(Entry<S>, usize)>,
        levels_touched: &mut Vec<bool>,
    ) -> Option<(Overflow<S>, usize)> {
        if level_here == target_level {
            self.place_entry(node_id, entry);
        } else {
            let best = self.choose_subtree(node_id, entry.mbr());
            let child_id = self.nth_child(node_id, best);
            if let Some((child_overflow, child_level)) =
                self.insert_recursive(child_id, entry, level_here - 1, target_level, queue, levels_touched)
            {
                self.resolve_overflow(node_id, child_id, child_overflow, child_level, queue, levels_touched);
            }
            self.refresh_node(node_id);
        }

        if self.arena[node_id as usize].borrow().len() > self.big_m {
            Some((self.take_all(node_id), level_here))
        } else {
            None
        }
    }

    fn resolve_overflow(
        &mut self,
        parent_id: NodeId,
        child_id: NodeId,
        overflow: Overflow<S>,
        level: usize,
        queue: &mut Vec<(Entry<S>, usize)>,
        levels_touched: &mut Vec<bool>,
    ) {
        if level >= levels_touched.len() {
            levels_touched.resize(level + 1, false);
        }
        if !levels_touched[level] {
            levels_touched[level] = true;
            let (keep, removed) = self.forced_reinsert_split(overflow);
            self.restore_entries(child_id, keep);
            self.refresh_node(child_id);
            for entry in removed {
                queue.push((entry, level));
            }
        } else {
            let sibling_id = self.split_node(child_id, overflow);
            self.attach_child(parent_id, sibling_id);
        }
    }

    fn place_entry(&mut self, node_id: NodeId, entry: Entry<S>) {
        let mut node = self.arena[node_id as usize].borrow_mut();
        match (&mut *node, entry) {
            (ArenaNode::Leaf { items, .. }, Entry::Item(item)) => items.push(item),
            (ArenaNode::Internal { children, .. }, Entry::Subtree { node: child, .. }) => {
                children.push(child);
                drop(node);
                self.arena[child as usize].borrow_mut().set_parent(Some(node_id));
            }
            _ => unreachable!("entry kind does not match node kind at the target level"),
        }
    }

    fn restore_entries(&mut self, node_id: NodeId, overflow: Overflow<S>) {
        let mut node = self.arena[node_id as usize].borrow_mut();
        match (&mut *node, overflow) {
            (ArenaNode::Leaf { items, .. }, Overflow::Leaf(kept)) => *items = kept,
            (ArenaNode::Internal { children, .. }, Overflow::Internal(kept)) => *children = kept,
            _ => unreachable!("overflow kind does not match node kind"),
        }
    }

    fn choose_subtree(&self, node_id: NodeId, new_mbr: &Rectangle) -> usize {
        let children = {
            let node = self.arena[node_id as usize].borrow();
            match &*node {
                ArenaNode::Internal { children, .. } => children.clone(),
                _ => unreachable!("choose_subtree called on a non-internal node"),
            }
        };
        let children_are_leaves = children
            .first()
            .map(|&id| self.arena[id as usize].borrow().is_leaf())
            .unwrap_or(false);
        let mbrs: Vec<Rectangle> = children
            .iter()
            .map(|&id| self.arena[id as usize].borrow().mbr().clone())
            .collect();

        if children_are_leaves {
            (0..mbrs.len())
                .min_by(|&a, &b| {
                    let overlap_a = self.leaf_own_item_overlap(children[a], new_mbr);
                    let overlap_b = self.leaf_own_item_overlap(children[b], new_mbr);
                    overlap_a
                        .partial_cmp(&overlap_b)
                        .unwrap_or(Ordering::Equal)
                        .then_with(|| {
                            mbrs[a]
                                .enlargement(new_mbr)
                                .partial_cmp(&mbrs[b].enlargement(new_mbr))
                                .unwrap_or(Ordering::Equal)
                        })
                        .then_with(|| mbrs[a].area().partial_cmp(&mbrs[b].area()).unwrap_or(Ordering::Equal))
                })
                .unwrap_or(0)
        } else {
            (0..mbrs.len())
                .min_by(|&a, &b| {
                    mbrs[a]
                        .enlargement(new_mbr)
                        .partial_cmp(&mbrs[b].enlargement(new_mbr))
                        .unwrap_or(Ordering::Equal)
                        .then_with(|| mbrs[a].area().partial_cmp(&mbrs[b].area()).unwrap_or(Ordering::Equal))
                })
                .unwrap_or(0)
        }
    }

    /// `Σ area(new_mbr ∩ mbr(item))` over `leaf_id`'s own items — the
    /// candidate's existing entries, not its siblings.
    fn leaf_own_item_overlap(&self, leaf_id: NodeId, new_mbr: &Rectangle) -> f64 {
        match &*self.arena[leaf_id as usize].borrow() {
            ArenaNode::Leaf { items, .. } => {
                items.iter().map(|item| new_mbr.overlap_area(&item.mbr)).sum()
            }
            _ => unreachable!("leaf_own_item_overlap called on a non-leaf node"),
        }
    }

    fn nth_child(&self, node_id: NodeId, index: usize) -> NodeId {
        match &*self.arena[node_id as usize].borrow() {
            ArenaNode::Internal { children, .. } => children[index],
            _ => unreachable!("nth_child called on a non-internal node"),
        }
    }

    fn attach_child(&mut self, parent_id: NodeId, child_id: NodeId) {
        {
            let mut parent = self.arena[parent_id as usize].borrow_mut();
            if let ArenaNode::Internal { children, .. } = &mut *parent {
                children.push(child_id);
            } else {
                unreachable!("attach_child called on a non-internal parent");
            }
        }
        self.arena[child_id as usize].borrow_mut().set_parent(Some(parent_id));
        self.refresh_node(parent_id);
    }

    fn take_all(&self, node_id: NodeId) -> Overflow<S> {
        let mut node = self.arena[node_id as usize].borrow_mut();
        match &mut *node {
            ArenaNode::Leaf { items, .. } => Overflow::Leaf(std::mem::take(items)),
            ArenaNode::Internal { children, .. } => Overflow::Internal(std::mem::take(children)),
            ArenaNode::Tombstone => unreachable!("take_all on a tombstoned node"),
        }
    }

    /// Sorts the `M+1` overflowing entries by descending distance from
    /// their collective centre, keeps the closest `M+1-p`, and returns the
    /// farthest `p` as [`Entry`] values ready to requeue.
    fn forced_reinsert_split(&self, overflow: Overflow<S>) -> (Overflow<S>, Vec<Entry<S>>) {
        let p = self.big_m / 3;
        match overflow {
            Overflow::Leaf(mut items) => {
                let centre = items
                    .iter()
                    .fold(Rectangle::empty(), |acc, e| acc.union(&e.mbr));
                items.sort_by(|a, b| dist_to_centre(&b.mbr, &centre)
                    .partial_cmp(&dist_to_centre(&a.mbr, &centre))
                    .unwrap_or(Ordering::Equal));
                let removed: Vec<Entry<S>> = items
                    .drain(0..p.min(items.len()))
                    .map(Entry::Item)
                    .collect();
                (Overflow::Leaf(items), removed)
            }
            Overflow::Internal(children) => {
                let mbrs: Vec<Rectangle> = children
                    .iter()
                    .map(|&id| self.arena[id as usize].borrow().mbr().clone())
                    .collect();
                let centre = mbrs.iter().fold(Rectangle::empty(), |acc, m| acc.union(m));
                let mut order: Vec<usize> = (0..children.len()).collect();
                order.sort_by(|&a, &b| {
                    dist_to_centre(&mbrs[b], &centre)
                        .partial_cmp(&dist_to_centre(&mbrs[a], &centre))
                        .unwrap_or(Ordering::Equal)
                });
                let cut = p.min(order.len());
                let removed_idx = &order[..cut];
                let kept_idx = &order[cut..];
                let removed = removed_idx
                    .iter()
                    .map(|&i| Entry::Subtree {
                        mbr: mbrs[i].clone(),
                        node: children[i],
                    })
                    .collect();
                let kept = kept_idx.iter().map(|&i| children[i]).collect();
                (Overflow::Internal(kept), removed)
            }
        }
    }

    /// Splits an overflowing node's `M+1` entries into two groups per the
    /// R*-tree axis/index-choice heuristic, writes one group back into
    /// `node_id`, and allocates a fresh sibling for the other.
    fn split_node(&mut self, node_id: NodeId, overflow: Overflow<S>) -> NodeId {
        let parent = self.arena[node_id as usize].borrow().parent();
        match overflow {
            Overflow::Leaf(items) => {
                let mbrs: Vec<Rectangle> = items.iter().map(|e| e.mbr.clone()).collect();
                let (order, k) = best_split_order(&mbrs, self.m);
                let (g1, g2) = partition_by_order(items, &order, k);
                self.restore_entries(node_id, Overflow::Leaf(g1));
                let sibling = self.alloc_leaf(g2, parent);
                self.refresh_node(node_id);
                self.refresh_node(sibling);
                sibling
            }
            Overflow::Internal(children) => {
                let mbrs: Vec<Rectangle> = children
                    .iter()
                    .map(|&id| self.arena[id as usize].borrow().mbr().clone())
                    .collect();
                let (order, k) = best_split_order(&mbrs, self.m);
                let (g1, g2) = partition_by_order(children, &order, k);
                self.restore_entries(node_id, Overflow::Internal(g1));
                let sibling = self.alloc_internal(g2, parent);
                self.refresh_node(node_id);
                self.refresh_node(sibling);
                sibling
            }
        }
    }

    fn split_root(&mut self, overflow: Overflow<S>) {
        debug!("splitting root, depth {} -> {}", self.depth, self.depth + 1);
        let (child1, child2) = match overflow {
            Overflow::Leaf(items) => {
                let mbrs: Vec<Rectangle> = items.iter().map(|e| e.mbr.clone()).collect();
                let (order, k) = best_split_order(&mbrs, self.m);
                let (g1, g2) = partition_by_order(items, &order, k);
                (self.alloc_leaf(g1, Some(self.root)), self.alloc_leaf(g2, Some(self.root)))
            }
            Overflow::Internal(children) => {
                let mbrs: Vec<Rectangle> = children
                    .iter()
                    .map(|&id| self.arena[id as usize].borrow().mbr().clone())
                    .collect();
                let (order, k) = best_split_order(&mbrs, self.m);
                let (g1, g2) = partition_by_order(children, &order, k);
                let c1 = self.alloc_internal(g1, Some(self.root));
                let c2 = self.alloc_internal(g2, Some(self.root));
                for &c in self.children_of(c1).iter() {
                    self.arena[c as usize].borrow_mut().set_parent(Some(c1));
                }
                for &c in self.children_of(c2).iter() {
                    self.arena[c as usize].borrow_mut().set_parent(Some(c2));
                }
                (c1, c2)
            }
        };
        *self.arena[self.root as usize].borrow_mut() = ArenaNode::Internal {
            mbr: Rectangle::empty(),
            sig: self.scheme.empty_signature(),
            parent: None,
            children: vec![child1, child2],
        };
        self.depth += 1;
        self.refresh_node(self.root);
    }

    fn children_of(&self, node_id: NodeId) -> Vec<NodeId> {
        match &*self.arena[node_id as usize].borrow() {
            ArenaNode::Internal { children, .. } => children.clone(),
            _ => Vec::new(),
        }
    }

    fn alloc_leaf(&mut self, items: Vec<ItemEntry<S>>, parent: Option<NodeId>) -> NodeId {
        let id = self.arena.len() as NodeId;
        self.arena.push(RefCell::new(ArenaNode::Leaf {
            mbr: Rectangle::empty(),
            sig: self.scheme.empty_signature(),
            parent,
            items,
        }));
        self.refresh_node(id);
        id
    }

    fn alloc_internal(&mut self, children: Vec<NodeId>, parent: Option<NodeId>) -> NodeId {
        let id = self.arena.len() as NodeId;
        self.arena.push(RefCell::new(ArenaNode::Internal {
            mbr: Rectangle::empty(),
            sig: self.scheme.empty_signature(),
            parent,
            children,
        }));
        self.refresh_node(id);
        id
    }

    /// Recomputes `node_id`'s cached MBR and signature from its current
    /// children/items.
    fn refresh_node(&self, node_id: NodeId) {
        let mut node = self.arena[node_id as usize].borrow_mut();
        match &mut *node {
            ArenaNode::Leaf { mbr, sig, items, .. } => {
                if items.is_empty() {
                    *mbr = Rectangle::empty();
                    *sig = self.scheme.empty_signature();
                    return;
                }
                *mbr = items.iter().fold(Rectangle::empty(), |acc, e| acc.union(&e.mbr));
                let sigs: Vec<&S::Sig> = items.iter().map(|e| &e.sig).collect();
                *sig = self.scheme.combine_many(sigs);
            }
            ArenaNode::Internal { mbr, sig, children, .. } => {
                if children.is_empty() {
                    *mbr = Rectangle::empty();
                    *sig = self.scheme.empty_signature();
                    return;
                }
                let child_mbrs: Vec<Rectangle> = children
                    .iter()
                    .map(|&id| self.arena[id as usize].borrow().mbr().clone())
                    .collect();
                *mbr = child_mbrs.iter().fold(Rectangle::empty(), |acc, m| acc.union(m));
                let child_sigs: Vec<S::Sig> = children
                    .iter()
                    .map(|&id| self.arena[id as usize].borrow().sig().clone())
                    .collect();
                *sig = self.scheme.combine_many(child_sigs.iter());
            }
            ArenaNode::Tombstone => {}
        }
    }

    /// Recursively collects every item id whose MBR intersects `geom` and
    /// whose cached signature satisfies `predicate`, pruning subtrees that
    /// fail either check. Always seeds from the current root.
    pub fn find(
        &self,
        geom: &impl Fn(&Rectangle) -> bool,
        predicate: &S::MayHaveMatch,
    ) -> Vec<u64>
    where
        S::MayHaveMatch: crate::signature::Predicate<S::Sig>,
    {
        use crate::signature::Predicate;
        let mut out = Vec::new();
        self.find_recursive(self.root, geom, predicate, &mut out);
        out
    }

    fn find_recursive(
        &self,
        node_id: NodeId,
        geom: &impl Fn(&Rectangle) -> bool,
        predicate: &S::MayHaveMatch,
        out: &mut Vec<u64>,
    ) where
        S::MayHaveMatch: crate::signature::Predicate<S::Sig>,
    {
        use crate::signature::Predicate;
        let node = self.arena[node_id as usize].borrow();
        match &*node {
            ArenaNode::Leaf { items, .. } => {
                for item in items {
                    if geom(&item.mbr) && predicate.eval(&item.sig) {
                        out.push(item.item_id);
                    }
                }
            }
            ArenaNode::Internal { children, .. } => {
                let children = children.clone();
                drop(node);
                for child_id in children {
                    let (child_mbr, child_sig) = {
                        let child = self.arena[child_id as usize].borrow();
                        (child.mbr().clone(), child.sig().clone())
                    };
                    if geom(&child_mbr) && predicate.eval(&child_sig) {
                        self.find_recursive(child_id, geom, predicate, out);
                    }
                }
            }
            ArenaNode::Tombstone => {}
        }
    }

    /// Removes an item by id. A subtree left underfull by the removal is
    /// detached and its contents requeued for fresh top-down insertion; a
    /// root left with a single child collapses, shrinking `depth`.
    ///
    /// Never called once the tree has been frozen into a [`super::static_tree::StaticSRTree`].
    pub fn delete(&mut self, item_id: u64, mbr_hint: &Rectangle) -> bool {
        let (deleted, orphans) = self.delete_recursive(self.root, item_id, mbr_hint, self.depth);
        if deleted {
            for (entry, level) in orphans {
                self.insert_one(entry, level);
            }
            self.collapse_root();
        }
        deleted
    }

    fn delete_recursive(
        &mut self,
        node_id: NodeId,
        item_id: u64,
        mbr_hint: &Rectangle,
        level_here: usize,
    ) -> (bool, Vec<(Entry<S>, usize)>) {
        let is_leaf = self.arena[node_id as usize].borrow().is_leaf();
        if is_leaf {
            let mut node = self.arena[node_id as usize].borrow_mut();
            if let ArenaNode::Leaf { items, .. } = &mut *node {
                if let Some(pos) = items.iter().position(|e| e.item_id == item_id) {
                    items.remove(pos);
                    drop(node);
                    self.refresh_node(node_id);
                    return (true, Vec::new());
                }
            }
            return (false, Vec::new());
        }

        let candidate_children: Vec<NodeId> = {
            let node = self.arena[node_id as usize].borrow();
            match &*node {
                ArenaNode::Internal { children, .. } => children
                    .iter()
                    .copied()
                    .filter(|&c| self.arena[c as usize].borrow().mbr().intersects(mbr_hint))
                    .collect(),
                _ => unreachable!(),
            }
        };

        let mut all_orphans = Vec::new();
        let mut any_deleted = false;
        let mut to_detach = Vec::new();

        for child_id in candidate_children {
            let (deleted, mut orphans) =
                self.delete_recursive(child_id, item_id, mbr_hint, level_here - 1);
            if deleted {
                any_deleted = true;
                all_orphans.append(&mut orphans);
                let child_len = self.arena[child_id as usize].borrow().len();
                if child_len < self.m && child_len > 0 {
                    to_detach.push((child_id, level_here - 1));
                } else if child_len == 0 {
                    to_detach.push((child_id, level_here - 1));
                }
                break;
            }
        }

        for (child_id, child_level) in to_detach {
            let overflow = self.take_all(child_id);
            {
                let mut node = self.arena[node_id as usize].borrow_mut();
                if let ArenaNode::Internal { children, .. } = &mut *node {
                    children.retain(|&c| c != child_id);
                }
            }
            *self.arena[child_id as usize].borrow_mut() = ArenaNode::Tombstone;
            match overflow {
                Overflow::Leaf(items) => {
                    all_orphans.extend(items.into_iter().map(|i| (Entry::Item(i), 0)));
                }
                Overflow::Internal(children) => {
                    for c in children {
                        let mbr = self.arena[c as usize].borrow().mbr().clone();
                        all_orphans.push((Entry::Subtree { mbr, node: c }, child_level));
                    }
                }
            }
        }

        if any_deleted {
            self.refresh_node(node_id);
        }
        (any_deleted, all_orphans)
    }

    fn collapse_root(&mut self) {
        loop {
            let (is_leaf, only_child) = {
                let node = self.arena[self.root as usize].borrow();
                match &*node {
                    ArenaNode::Internal { children, .. } if children.len() == 1 => {
                        (false, Some(children[0]))
                    }
                    _ => (node.is_leaf(), None),
                }
            };
            if is_leaf {
                return;
            }
            let Some(child_id) = only_child else { return };
            let child = std::mem::replace(&mut *self.arena[child_id as usize].borrow_mut(), ArenaNode::Tombstone);
            *self.arena[self.root as usize].borrow_mut() = match child {
                ArenaNode::Leaf { mbr, sig, items, .. } => ArenaNode::Leaf {
                    mbr,
                    sig,
                    parent: None,
                    items,
                },
                ArenaNode::Internal { mbr, sig, children, .. } => ArenaNode::Internal {
                    mbr,
                    sig,
                    parent: None,
                    children,
                },
                ArenaNode::Tombstone => unreachable!(),
            };
            if let ArenaNode::Internal { children, .. } = &*self.arena[self.root as usize].borrow() {
                for &c in children {
                    self.arena[c as usize].borrow_mut().set_parent(Some(self.root));
                }
            }
            self.depth -= 1;
        }
    }

    /// Verifies structural invariants: uniform child kind per level, cached
    /// MBR/signature agreeing with a fresh recomputation, and correct
    /// child-to-parent back-links. Intended for tests and `--check`-style
    /// build verification, not the hot path.
    pub fn check(&self) -> Result<(), SrtreeError>
    where
        S::Sig: PartialEq,
    {
        self.check_recursive(self.root, None)
    }

    fn check_recursive(&self, node_id: NodeId, expected_parent: Option<NodeId>) -> Result<(), SrtreeError>
    where
        S::Sig: PartialEq,
    {
        let node = self.arena[node_id as usize].borrow();
        if node.parent() != expected_parent {
            return Err(SrtreeError::ConsistencyCheckFailed {
                stage: "parent_back_link",
                detail: format!("node {node_id} has parent {:?}, expected {:?}", node.parent(), expected_parent),
            });
        }
        let cached_mbr = node.mbr().clone();
        let cached_sig = node.sig().clone();
        drop(node);
        self.refresh_node(node_id);
        let node = self.arena[node_id as usize].borrow();
        if *node.mbr() != cached_mbr {
            return Err(SrtreeError::ConsistencyCheckFailed {
                stage: "mbr_cache",
                detail: format!("node {node_id} cached mbr did not match recomputed mbr"),
            });
        }
        if *node.sig() != cached_sig {
            return Err(SrtreeError::ConsistencyCheckFailed {
                stage: "signature_cache",
                detail: format!("node {node_id} cached signature did not match recomputed signature"),
            });
        }
        if let ArenaNode::Internal { children, .. } = &*node {
            let mixed = {
                let mut leaf_seen = false;
                let mut internal_seen = false;
                for &c in children {
                    if self.arena[c as usize].borrow().is_leaf() {
                        leaf_seen = true;
                    } else {
                        internal_seen = true;
                    }
                }
                leaf_seen && internal_seen
            };
            if mixed {
                return Err(SrtreeError::ConsistencyCheckFailed {
                    stage: "uniform_child_kind",
                    detail: format!("node {node_id} mixes leaf and internal children"),
                });
            }
            let children = children.clone();
            drop(node);
            for c in children {
                self.check_recursive(c, Some(node_id))?;
            }
        }
        Ok(())
    }
}

fn dist_to_centre(mbr: &Rectangle, centre: &Rectangle) -> f64 {
    let dlat = mbr.center(0) - centre.center(0);
    let dlon = mbr.center(1) - centre.center(1);
    dlat * dlat + dlon * dlon
}

/// Computes the axis and split index minimizing, in order: summed group
/// perimeter (to pick the axis), then overlap area, then total area (to
/// pick the index within that axis). Returns a permutation of `0..mbrs.len()`
/// and the cut point `k` such that `order[..k]`/`order[k..]` are the two
/// groups.
fn best_split_order(mbrs: &[Rectangle], m: usize) -> (Vec<usize>, usize) {
    let n = mbrs.len();
    let mut order: Vec<usize> = (0..n).collect();
    let mut best_axis = 0usize;
    let mut best_margin = f64::INFINITY;

    for axis in 0..2 {
        order.sort_by(|&a, &b| {
            mbrs[a]
                .center(axis)
                .partial_cmp(&mbrs[b].center(axis))
                .unwrap_or(Ordering::Equal)
        });
        for k in m..=n - m {
            let g1 = order[..k].iter().fold(Rectangle::empty(), |acc, &i| acc.union(&mbrs[i]));
            let g2 = order[k..].iter().fold(Rectangle::empty(), |acc, &i| acc.union(&mbrs[i]));
            let margin = g1.margin() + g2.margin();
            if margin < best_margin {
                best_margin = margin;
                best_axis = axis;
            }
        }
    }

    order.sort_by(|&a, &b| {
        mbrs[a]
            .center(best_axis)
            .partial_cmp(&mbrs[b].center(best_axis))
            .unwrap_or(Ordering::Equal)
    });

    let mut best_overlap = f64::INFINITY;
    let mut best_area = f64::INFINITY;
    let mut best_k = m;
    for k in m..=n - m {
        let g1 = order[..k].iter().fold(Rectangle::empty(), |acc, &i| acc.union(&mbrs[i]));
        let g2 = order[k..].iter().fold(Rectangle::empty(), |acc, &i| acc.union(&mbrs[i]));
        let overlap = g1.overlap_area(&g2);
        let area = g1.area() + g2.area();
        if overlap < best_overlap || ((overlap - best_overlap).abs() < 1e-10 && area < best_area) {
            best_overlap = overlap;
            best_area = area;
            best_k = k;
        }
    }
    (order, best_k)
}

fn partition_by_order<T>(items: Vec<T>, order: &[usize], k: usize) -> (Vec<T>, Vec<T>) {
    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    let mut g1 = Vec::with_capacity(k);
    let mut g2 = Vec::with_capacity(order.len() - k);
    for (pos, &idx) in order.iter().enumerate() {
        let item = slots[idx].take().expect("each index visited exactly once");
        if pos < k {
            g1.push(item);
        } else {
            g2.push(item);
        }
    }
    (g1, g2)
}
