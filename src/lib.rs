//! `srtree`: a spatial-textual R*-tree. Every node carries both a minimum
//! bounding rectangle and a compact textual signature summarising the
//! strings attached to the items beneath it, so a query of the form
//! "intersects this geometry AND may contain this text within edit
//! distance k" can prune whole subtrees instead of scanning a flat index.
//!
//! - [`geometry`] — rectangles and the geo-constraint algebra queries are
//!   built from.
//! - [`qgram`] — the sliding-window substrings every signature scheme
//!   summarises.
//! - [`signature`] — the four interchangeable signature schemes (MinHash,
//!   positional q-gram, string-set, and a deduplicating adapter over any of
//!   them) and their `MayHaveMatch` pruning predicates.
//! - [`tree`] — the mutable build structure and the read-only serialized
//!   form it freezes into.
//! - [`query`] — the AND/OR expression-tree driver tying a geo-constraint
//!   and a text predicate together into one `find` call.
//! - [`dataset`] — a minimal dataset-source abstraction for the build path.

pub mod dataset;
pub mod exceptions;
pub mod geometry;
mod logging;
pub mod qgram;
pub mod query;
pub mod signature;
pub mod tree;
