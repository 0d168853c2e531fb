//! StringSet signatures: exact membership over a shared dictionary of
//! interned strings, with no tolerance for edit distance.
//!
//! This is the scheme to reach for when a field is drawn from a small,
//! closed vocabulary (tags, categories) where approximate matching would
//! only produce noise. `may_have_match` rejects any `edit_distance > 0`
//! request with [`SrtreeError::UnsupportedEditDistance`] rather than
//! silently widening the match.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::exceptions::SrtreeError;
use crate::signature::{Predicate, SignatureScheme};

/// Interns normalised strings into dense `u32` ids. Conceptually a flat trie
/// over the corpus vocabulary; a `HashMap` gives the same id-stability
/// guarantee without the extra traversal machinery a prefix tree would add
/// for a scheme that never needs prefix queries.
#[derive(Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct Dictionary {
    by_str: HashMap<String, u32>,
    by_id: Vec<String>,
}

impl Dictionary {
    fn intern(&mut self, s: &str) -> u32 {
        if let Some(id) = self.by_str.get(s) {
            return *id;
        }
        let id = self.by_id.len() as u32;
        self.by_id.push(s.to_string());
        self.by_str.insert(s.to_string(), id);
        id
    }

    fn lookup(&self, s: &str) -> Option<u32> {
        self.by_str.get(s).copied()
    }
}

/// A sorted, deduplicated set of dictionary ids.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StringSetSignature {
    ids: Vec<u32>,
}

impl StringSetSignature {
    pub fn identity() -> Self {
        StringSetSignature { ids: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: u32) -> bool {
        self.ids.binary_search(&id).is_ok()
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.ids.len() * 4);
        for id in &self.ids {
            out.extend_from_slice(&id.to_le_bytes());
        }
        out
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        let ids = bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
            .collect();
        StringSetSignature { ids }
    }

    pub fn combine(&self, other: &StringSetSignature) -> StringSetSignature {
        let mut ids = Vec::with_capacity(self.ids.len() + other.ids.len());
        let (mut i, mut j) = (0, 0);
        while i < self.ids.len() && j < other.ids.len() {
            match self.ids[i].cmp(&other.ids[j]) {
                std::cmp::Ordering::Less => {
                    ids.push(self.ids[i]);
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    ids.push(other.ids[j]);
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    ids.push(self.ids[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        ids.extend_from_slice(&self.ids[i..]);
        ids.extend_from_slice(&other.ids[j..]);
        StringSetSignature { ids }
    }
}

impl crate::signature::SigCodec for StringSetSignature {
    fn encode(&self) -> Vec<u8> {
        self.to_bytes()
    }

    fn decode(bytes: &[u8]) -> Self {
        Self::from_bytes(bytes)
    }
}

/// Exact-match string-set scheme: a signature is the set of dictionary ids
/// for every string an item carries, and membership is the only supported
/// predicate.
#[derive(Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StringSetScheme {
    dict: RefCell<Dictionary>,
}

impl StringSetScheme {
    pub fn new() -> Self {
        StringSetScheme {
            dict: RefCell::new(Dictionary::default()),
        }
    }
}

impl SignatureScheme for StringSetScheme {
    type Sig = StringSetSignature;
    type MayHaveMatch = StringSetMayHaveMatch;

    fn empty_signature(&self) -> Self::Sig {
        StringSetSignature::identity()
    }

    fn signature(&self, s: &str) -> Result<Self::Sig, SrtreeError> {
        if s.is_empty() {
            return Err(SrtreeError::EmptyString);
        }
        let id = self.dict.borrow_mut().intern(s);
        Ok(StringSetSignature { ids: vec![id] })
    }

    fn combine(&self, a: &Self::Sig, b: &Self::Sig) -> Self::Sig {
        a.combine(b)
    }

    fn may_have_match(
        &self,
        query: &str,
        edit_distance: usize,
    ) -> Result<Self::MayHaveMatch, SrtreeError> {
        if edit_distance > 0 {
            return Err(SrtreeError::UnsupportedEditDistance {
                scheme: "stringset",
                k: edit_distance,
            });
        }
        // A query for a string never interned by this scheme can never be a
        // member of any signature it produced; use a sentinel id that
        // `contains` can never hold instead of erroring, so queries against
        // an empty or unrelated corpus are legal "no match" results.
        let id = self.dict.borrow().lookup(query).unwrap_or(u32::MAX);
        Ok(StringSetMayHaveMatch {
            node: Node::Leaf(id),
        })
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(u32),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
}

impl Node {
    fn eval(&self, sig: &StringSetSignature) -> bool {
        match self {
            Node::Leaf(id) => sig.contains(*id),
            Node::And(a, b) => a.eval(sig) && b.eval(sig),
            Node::Or(a, b) => a.eval(sig) || b.eval(sig),
        }
    }
}

/// `MayHaveMatch` predicate tree for the StringSet scheme.
#[derive(Debug, Clone)]
pub struct StringSetMayHaveMatch {
    node: Node,
}

impl Predicate<StringSetSignature> for StringSetMayHaveMatch {
    fn eval(&self, sig: &StringSetSignature) -> bool {
        self.node.eval(sig)
    }

    fn and(self, other: Self) -> Self {
        StringSetMayHaveMatch {
            node: Node::And(Box::new(self.node), Box::new(other.node)),
        }
    }

    fn or(self, other: Self) -> Self {
        StringSetMayHaveMatch {
            node: Node::Or(Box::new(self.node), Box::new(other.node)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_member_matches() {
        let s = StringSetScheme::new();
        let sig = s.signature("bench").unwrap();
        let pred = s.may_have_match("bench", 0).unwrap();
        assert!(pred.eval(&sig));
    }

    #[test]
    fn non_member_does_not_match() {
        let s = StringSetScheme::new();
        let sig = s.signature("bench").unwrap();
        let pred = s.may_have_match("tree", 0).unwrap();
        assert!(!pred.eval(&sig));
    }

    #[test]
    fn edit_distance_above_zero_is_rejected() {
        let s = StringSetScheme::new();
        let err = s.may_have_match("bench", 1).unwrap_err();
        assert!(matches!(
            err,
            SrtreeError::UnsupportedEditDistance { scheme: "stringset", k: 1 }
        ));
    }

    #[test]
    fn union_of_two_signatures_matches_either_member() {
        let s = StringSetScheme::new();
        let sig_a = s.signature("bench").unwrap();
        let sig_b = s.signature("tree").unwrap();
        let combined = s.combine(&sig_a, &sig_b);
        assert!(s.may_have_match("bench", 0).unwrap().eval(&combined));
        assert!(s.may_have_match("tree", 0).unwrap().eval(&combined));
    }
}
