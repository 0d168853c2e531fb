//! The R*-tree itself: a mutable, insert-only-by-default build structure
//! ([`mutable::RStarTree`]) and the read-only [`static_tree::StaticSRTree`]
//! it gets frozen into for querying.
//!
//! Both are generic over [`crate::signature::SignatureScheme`] so the same
//! insertion/split/query machinery works for MinHash, PQGram, StringSet, or
//! a [`crate::signature::dedup::Dedup`]-wrapped variant of any of them.

pub mod build;
pub mod mutable;
pub mod static_tree;

/// An index into the tree's node arena. Stable for the lifetime of the
/// node; deletion tombstones a slot rather than reusing its id, so ids
/// handed out during one build never get reassigned to an unrelated node.
pub type NodeId = u32;
