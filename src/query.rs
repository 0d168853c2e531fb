//! The query driver: an AND/OR expression tree over `(query_string,
//! edit_distance)` leaves, compiled once into a combined [`Predicate`] that
//! [`crate::tree::mutable::RStarTree::find`]/[`crate::tree::static_tree::StaticSRTree::find`]
//! can evaluate directly, paired with a [`GeoConstraint`] built the same way
//! from rectangles.
//!
//! Turning a user-facing query string into one of these trees is out of
//! scope here (see the module docs on why) — callers build
//! [`TextQuery`]/[`GeoQuery`] values directly, the way a parser's output
//! would.

use crate::geometry::{GeoConstraint, Rectangle};
use crate::signature::{Predicate, SignatureScheme};

/// An AND/OR expression tree over textual leaves.
#[derive(Debug, Clone)]
pub enum TextQuery {
    Term { query: String, edit_distance: usize },
    And(Box<TextQuery>, Box<TextQuery>),
    Or(Box<TextQuery>, Box<TextQuery>),
}

impl TextQuery {
    pub fn term(query: impl Into<String>, edit_distance: usize) -> Self {
        TextQuery::Term {
            query: query.into(),
            edit_distance,
        }
    }

    pub fn and(self, other: TextQuery) -> Self {
        TextQuery::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: TextQuery) -> Self {
        TextQuery::Or(Box::new(self), Box::new(other))
    }

    /// Compiles this expression into `scheme`'s `MayHaveMatch` type, leaves
    /// becoming `scheme.may_have_match(query, k)` and internals becoming
    /// `/` (AND) or `+` (OR) over the children.
    pub fn compile<S: SignatureScheme>(&self, scheme: &S) -> Result<S::MayHaveMatch, crate::exceptions::SrtreeError> {
        match self {
            TextQuery::Term { query, edit_distance } => scheme.may_have_match(query, *edit_distance),
            TextQuery::And(a, b) => Ok(a.compile(scheme)?.and(b.compile(scheme)?)),
            TextQuery::Or(a, b) => Ok(a.compile(scheme)?.or(b.compile(scheme)?)),
        }
    }
}

/// An AND/OR expression tree over rectangle leaves, compiled into a
/// [`GeoConstraint`]: `And` becomes pairwise intersection (`/`), `Or`
/// becomes union (`+`).
#[derive(Debug, Clone)]
pub enum GeoQuery {
    Region(Rectangle),
    And(Box<GeoQuery>, Box<GeoQuery>),
    Or(Box<GeoQuery>, Box<GeoQuery>),
}

impl GeoQuery {
    pub fn region(r: Rectangle) -> Self {
        GeoQuery::Region(r)
    }

    pub fn and(self, other: GeoQuery) -> Self {
        GeoQuery::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: GeoQuery) -> Self {
        GeoQuery::Or(Box::new(self), Box::new(other))
    }

    pub fn compile(&self) -> GeoConstraint {
        match self {
            GeoQuery::Region(r) => GeoConstraint::single(*r),
            GeoQuery::And(a, b) => a.compile().intersection(&b.compile()),
            GeoQuery::Or(a, b) => a.compile().union(&b.compile()),
        }
    }
}

/// Runs `geo` AND `text` against a static tree, returning candidate item ids
/// sorted and deduplicated. Both halves are compiled once up front; the
/// actual traversal is a single `find` call per the pruning contract each
/// scheme upholds (no false negatives, possible false positives).
pub fn query_static<S: SignatureScheme>(
    tree: &crate::tree::static_tree::StaticSRTree<S>,
    scheme: &S,
    geo: &GeoQuery,
    text: &TextQuery,
) -> Result<Vec<u64>, crate::exceptions::SrtreeError>
where
    S::Sig: crate::signature::SigCodec,
{
    let constraint = geo.compile();
    let predicate = text.compile(scheme)?;
    let mut results = tree.find(&|r: &Rectangle| constraint.intersects(r), &predicate);
    results.sort_unstable();
    results.dedup();
    Ok(results)
}

/// Same as [`query_static`], against the mutable, pre-serialization tree.
pub fn query_mutable<S: SignatureScheme>(
    tree: &crate::tree::mutable::RStarTree<S>,
    scheme: &S,
    geo: &GeoQuery,
    text: &TextQuery,
) -> Result<Vec<u64>, crate::exceptions::SrtreeError> {
    let constraint = geo.compile();
    let predicate = text.compile(scheme)?;
    let mut results = tree.find(&|r: &Rectangle| constraint.intersects(r), &predicate);
    results.sort_unstable();
    results.dedup();
    Ok(results)
}
