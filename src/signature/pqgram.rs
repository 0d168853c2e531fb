//! Positional q-gram signatures: each q-gram is paired with the offset it
//! occurred at, and grams are interned into a shared 24-bit dictionary so a
//! signature stores `(dictionary_id, position)` pairs instead of raw
//! substrings.
//!
//! `min_str_len`/`max_str_len` track the shortest/longest source string
//! contributing to a signature, used as a cheap pre-check before the id
//! intersection count is computed: a candidate whose string lengths can't
//! possibly be within `k` edits of the query is rejected without touching
//! the pair arrays at all.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::exceptions::SrtreeError;
use crate::qgram::QGram;
use crate::signature::{Predicate, SignatureScheme};

/// Sentinel dictionary id: one past the largest id a 24-bit dictionary can
/// hold (`2^24 - 1`).
const NSTR: u32 = (1 << 24) - 1;
/// "Unset" sentinel for `min_str_len`/`max_str_len`, chosen so it acts as the
/// monoid identity under `min`/`max` respectively.
const NPOS: u32 = u32::MAX;

#[derive(Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct Dictionary {
    by_str: HashMap<String, u32>,
    by_id: Vec<String>,
}

impl Dictionary {
    fn intern(&mut self, gram: &str) -> Result<u32, SrtreeError> {
        if let Some(id) = self.by_str.get(gram) {
            return Ok(*id);
        }
        let id = self.by_id.len() as u32;
        if id >= NSTR {
            return Err(SrtreeError::ConsistencyCheckFailed {
                stage: "pqgram_dictionary",
                detail: format!("dictionary exceeds 24-bit capacity ({NSTR} entries)"),
            });
        }
        self.by_id.push(gram.to_string());
        self.by_str.insert(gram.to_string(), id);
        Ok(id)
    }
}

/// A positional q-gram signature: a sorted, deduplicated set of
/// `(dictionary_id, position)` pairs plus the shortest/longest source string
/// length contributing to it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PQGramSignature {
    pairs: Vec<(u32, u32)>,
    min_str_len: u32,
    max_str_len: u32,
}

impl PQGramSignature {
    pub fn identity() -> Self {
        PQGramSignature {
            pairs: Vec::new(),
            min_str_len: NPOS,
            max_str_len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn min_str_len(&self) -> u32 {
        self.min_str_len
    }

    pub fn max_str_len(&self) -> u32 {
        self.max_str_len
    }

    /// Sorted-merge union of the pair sets, with min/max of the lengths.
    pub fn combine(&self, other: &PQGramSignature) -> PQGramSignature {
        let mut pairs = Vec::with_capacity(self.pairs.len() + other.pairs.len());
        let (mut i, mut j) = (0, 0);
        while i < self.pairs.len() && j < other.pairs.len() {
            match self.pairs[i].cmp(&other.pairs[j]) {
                std::cmp::Ordering::Less => {
                    pairs.push(self.pairs[i]);
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    pairs.push(other.pairs[j]);
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    pairs.push(self.pairs[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        pairs.extend_from_slice(&self.pairs[i..]);
        pairs.extend_from_slice(&other.pairs[j..]);
        PQGramSignature {
            pairs,
            min_str_len: self.min_str_len.min(other.min_str_len),
            max_str_len: self.max_str_len.max(other.max_str_len),
        }
    }

    /// Multiset intersection count of the `id` component only (position is
    /// ignored here; the pairs are sorted id-major so a merge walk over the
    /// id values alone gives the same count a prefix-stripped comparison
    /// would).
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.pairs.len() * 8);
        out.extend_from_slice(&self.min_str_len.to_le_bytes());
        out.extend_from_slice(&self.max_str_len.to_le_bytes());
        for (id, pos) in &self.pairs {
            out.extend_from_slice(&id.to_le_bytes());
            out.extend_from_slice(&pos.to_le_bytes());
        }
        out
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        let min_str_len = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let max_str_len = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let pairs = bytes[8..]
            .chunks_exact(8)
            .map(|c| {
                let id = u32::from_le_bytes(c[0..4].try_into().unwrap());
                let pos = u32::from_le_bytes(c[4..8].try_into().unwrap());
                (id, pos)
            })
            .collect();
        PQGramSignature {
            pairs,
            min_str_len,
            max_str_len,
        }
    }

    fn id_intersection_count(&self, other: &PQGramSignature) -> usize {
        let (mut i, mut j, mut count) = (0, 0, 0);
        while i < self.pairs.len() && j < other.pairs.len() {
            match self.pairs[i].0.cmp(&other.pairs[j].0) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    count += 1;
                    i += 1;
                    j += 1;
                }
            }
        }
        count
    }
}

impl crate::signature::SigCodec for PQGramSignature {
    fn encode(&self) -> Vec<u8> {
        self.to_bytes()
    }

    fn decode(bytes: &[u8]) -> Self {
        Self::from_bytes(bytes)
    }
}

/// Interns q-grams into a shared dictionary so signatures produced by the
/// same scheme instance are directly comparable.
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PQGramScheme {
    q: usize,
    dict: RefCell<Dictionary>,
}

impl PQGramScheme {
    pub fn new(q: usize) -> Self {
        PQGramScheme {
            q,
            dict: RefCell::new(Dictionary::default()),
        }
    }

    fn signature_of(&self, s: &str) -> Result<PQGramSignature, SrtreeError> {
        let qg = QGram::new(s, self.q)?;
        let mut dict = self.dict.borrow_mut();
        let mut pairs = Vec::with_capacity(qg.size());
        for (pos, gram) in qg.iter().enumerate() {
            let id = dict.intern(gram)?;
            pairs.push((id, pos as u32));
        }
        pairs.sort_unstable();
        pairs.dedup();
        let str_len = s.len() as u32;
        Ok(PQGramSignature {
            pairs,
            min_str_len: str_len,
            max_str_len: str_len,
        })
    }
}

impl SignatureScheme for PQGramScheme {
    type Sig = PQGramSignature;
    type MayHaveMatch = PQGramMayHaveMatch;

    fn empty_signature(&self) -> Self::Sig {
        PQGramSignature::identity()
    }

    fn signature(&self, s: &str) -> Result<Self::Sig, SrtreeError> {
        if s.is_empty() {
            return Err(SrtreeError::EmptyString);
        }
        self.signature_of(s)
    }

    fn combine(&self, a: &Self::Sig, b: &Self::Sig) -> Self::Sig {
        a.combine(b)
    }

    fn may_have_match(
        &self,
        query: &str,
        edit_distance: usize,
    ) -> Result<Self::MayHaveMatch, SrtreeError> {
        if query.is_empty() {
            return Err(SrtreeError::EmptyString);
        }
        let sref = self.signature_of(query)?;
        Ok(PQGramMayHaveMatch {
            node: Node::Leaf(Box::new(LeafPredicate {
                sref,
                query_len: query.len(),
                q: self.q,
                k: edit_distance,
            })),
        })
    }
}

#[derive(Debug, Clone)]
struct LeafPredicate {
    sref: PQGramSignature,
    query_len: usize,
    q: usize,
    k: usize,
}

impl LeafPredicate {
    /// Mirrors the reference rejection cascade: two cheap length checks
    /// before the id-intersection count is computed.
    fn matches(&self, sig: &PQGramSignature) -> bool {
        if sig.is_empty() {
            return false;
        }
        let num_grams = self.query_len as i64 - self.q as i64 + 1;
        let k = self.k as i64;
        if num_grams > sig.max_str_len() as i64 + k {
            return false;
        }
        if num_grams + k < sig.min_str_len() as i64 {
            return false;
        }
        let count = self.sref.id_intersection_count(sig) as i64;
        let threshold = self.query_len as i64 - k * self.q as i64 - 1;
        count > threshold
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(Box<LeafPredicate>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
}

impl Node {
    fn eval(&self, sig: &PQGramSignature) -> bool {
        match self {
            Node::Leaf(p) => p.matches(sig),
            Node::And(a, b) => a.eval(sig) && b.eval(sig),
            Node::Or(a, b) => a.eval(sig) || b.eval(sig),
        }
    }
}

/// `MayHaveMatch` predicate tree for the PQGram scheme.
#[derive(Debug, Clone)]
pub struct PQGramMayHaveMatch {
    node: Node,
}

impl Predicate<PQGramSignature> for PQGramMayHaveMatch {
    fn eval(&self, sig: &PQGramSignature) -> bool {
        self.node.eval(sig)
    }

    fn and(self, other: Self) -> Self {
        PQGramMayHaveMatch {
            node: Node::And(Box::new(self.node), Box::new(other.node)),
        }
    }

    fn or(self, other: Self) -> Self {
        PQGramMayHaveMatch {
            node: Node::Or(Box::new(self.node), Box::new(other.node)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dictionary_assigns_stable_ids_across_calls() {
        let s = PQGramScheme::new(2);
        let sig1 = s.signature("abcde").unwrap();
        let sig2 = s.signature("abcde").unwrap();
        assert_eq!(sig1, sig2);
    }

    #[test]
    fn self_query_always_matches() {
        let s = PQGramScheme::new(3);
        let sig = s.signature("@amenity:bench").unwrap();
        let pred = s.may_have_match("@amenity:bench", 0).unwrap();
        assert!(pred.eval(&sig));
    }

    #[test]
    fn union_combine_preserves_both_members() {
        let s = PQGramScheme::new(2);
        let sig_a = s.signature("abcde").unwrap();
        let sig_b = s.signature("fghij").unwrap();
        let combined = s.combine(&sig_a, &sig_b);
        assert_eq!(combined.len(), sig_a.len() + sig_b.len());
        assert_eq!(
            combined.min_str_len(),
            sig_a.min_str_len().min(sig_b.min_str_len())
        );
        assert_eq!(
            combined.max_str_len(),
            sig_a.max_str_len().max(sig_b.max_str_len())
        );
        assert!(s.may_have_match("abcde", 0).unwrap().eval(&combined));
        assert!(s.may_have_match("fghij", 0).unwrap().eval(&combined));
    }

    #[test]
    fn single_substitution_still_matches_at_k_1() {
        let s = PQGramScheme::new(3);
        let sig = s.signature("gardxn").unwrap(); // "garden" with one substitution
        let pred = s.may_have_match("garden", 1).unwrap();
        assert!(pred.eval(&sig));
    }

    #[test]
    fn unrelated_string_does_not_match_at_k_0() {
        let s = PQGramScheme::new(3);
        let sig = s.signature("completely_unrelated_text").unwrap();
        let pred = s.may_have_match("garden", 0).unwrap();
        assert!(!pred.eval(&sig));
    }

    #[test]
    fn empty_signature_never_matches() {
        let s = PQGramScheme::new(3);
        let pred = s.may_have_match("garden", 0).unwrap();
        assert!(!pred.eval(&PQGramSignature::identity()));
    }

    #[test]
    fn length_prefilter_rejects_without_counting() {
        let s = PQGramScheme::new(3);
        let sig = s.signature("hi").unwrap();
        let pred = s.may_have_match("a much longer query string", 0).unwrap();
        assert!(!pred.eval(&sig));
    }
}
