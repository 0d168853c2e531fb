//! Signature schemes: compact, union-closed summaries of a string set, with
//! a monotone "may have match" pruning predicate over them.
//!
//! Every scheme in this module (MinHash, PQGram, StringSet) implements
//! [`SignatureScheme`]. The tree in [`crate::tree`] is generic over this
//! trait so the same insertion/split/query machinery works regardless of
//! which scheme is chosen.

pub mod dedup;
pub mod minhash;
pub mod pqgram;
pub mod stringset;

use crate::exceptions::SrtreeError;

/// Byte (de)serialization for a scheme's signature type, used by the
/// [`dedup`] adapter to intern signatures into its variant store without
/// needing to know the concrete scheme.
pub trait SigCodec: Sized {
    fn encode(&self) -> Vec<u8>;
    fn decode(bytes: &[u8]) -> Self;
}

/// A pruning predicate over signatures, built from one or more leaves by `+`
/// (logical OR) and `/` (logical AND). `eval` never produces a false
/// negative against the scheme's correctness contract (see each scheme's
/// module docs) but may produce false positives.
pub trait Predicate<Sig>: Clone {
    fn eval(&self, sig: &Sig) -> bool;
    fn and(self, other: Self) -> Self;
    fn or(self, other: Self) -> Self;
}

/// Capability set shared by every signature scheme.
///
/// `Sig` must form an associative, commutative monoid under `combine`, with
/// `empty_signature()` as the identity. Implementations of `combine_many`
/// should fold in balanced-binary order (see [`tree_reduce`]) so repeated
/// builds produce bit-identical signatures regardless of traversal order,
/// modulo the monoid's own commutativity.
pub trait SignatureScheme {
    type Sig: Clone;
    type MayHaveMatch: Predicate<Self::Sig>;

    fn empty_signature(&self) -> Self::Sig;

    /// Signature of the q-gram set of a single (non-empty) string.
    fn signature(&self, s: &str) -> Result<Self::Sig, SrtreeError>;

    /// Signature of the union of q-gram sets of a non-empty set of strings.
    fn signature_many<'a, I>(&self, strs: I) -> Result<Self::Sig, SrtreeError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut iter = strs.into_iter();
        let first = iter.next().ok_or(SrtreeError::EmptyString)?;
        let mut sig = self.signature(first)?;
        for s in iter {
            sig = self.combine(&sig, &self.signature(s)?);
        }
        Ok(sig)
    }

    fn combine(&self, a: &Self::Sig, b: &Self::Sig) -> Self::Sig;

    /// Tree-reducing fold of `sigs` under [`SignatureScheme::combine`].
    /// Returns [`SignatureScheme::empty_signature`] for an empty input.
    fn combine_many<'a, I>(&self, sigs: I) -> Self::Sig
    where
        Self::Sig: 'a,
        I: IntoIterator<Item = &'a Self::Sig>,
    {
        let items: Vec<&Self::Sig> = sigs.into_iter().collect();
        if items.is_empty() {
            return self.empty_signature();
        }
        tree_reduce(&items, |a, b| self.combine(a, b))
    }

    fn may_have_match(
        &self,
        query: &str,
        edit_distance: usize,
    ) -> Result<Self::MayHaveMatch, SrtreeError>;
}

/// Balanced-binary fold, matching the reference implementation's
/// `treeReduce`: numerically the same regardless of how the caller chunked
/// the input, which keeps repeated builds reproducible when `combine` is
/// only approximately associative in floating point (it isn't here, but the
/// shape is shared with schemes that could be).
pub fn tree_reduce<T: Clone>(items: &[&T], combine: impl Fn(&T, &T) -> T) -> T {
    match items.len() {
        0 => panic!("tree_reduce requires at least one item"),
        1 => items[0].clone(),
        n => {
            let mid = n / 2;
            let left = tree_reduce(&items[..mid], &combine);
            let right = tree_reduce(&items[mid..], &combine);
            combine(&left, &right)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_reduce_matches_linear_fold_for_commutative_combine() {
        let values = [1i64, 2, 3, 4, 5, 6, 7];
        let refs: Vec<&i64> = values.iter().collect();
        let reduced = tree_reduce(&refs, |a, b| a + b);
        let linear: i64 = values.iter().sum();
        assert_eq!(reduced, linear);
    }
}
