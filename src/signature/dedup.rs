//! Wraps any [`SignatureScheme`] so the per-node payload shrinks to a `u32`
//! handle into an append-only store of deduplicated encoded signatures,
//! instead of repeating a potentially large signature at every node that
//! happens to combine to the same value.
//!
//! The store is shared (`Arc<Mutex<_>>`) between the scheme and every
//! `MayHaveMatch` it produces, since evaluating a predicate against a
//! candidate handle requires decoding that handle's bytes back into the
//! inner scheme's signature type.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::exceptions::SrtreeError;
use crate::signature::{Predicate, SigCodec, SignatureScheme};

#[derive(Debug, Default)]
struct VariantStore {
    bytes: Vec<Vec<u8>>,
    index: HashMap<Vec<u8>, u32>,
}

impl VariantStore {
    fn intern(&mut self, bytes: Vec<u8>) -> u32 {
        if let Some(id) = self.index.get(&bytes) {
            return *id;
        }
        let id = self.bytes.len() as u32;
        self.index.insert(bytes.clone(), id);
        self.bytes.push(bytes);
        id
    }

    fn get(&self, id: u32) -> &[u8] {
        &self.bytes[id as usize]
    }
}

/// A signature scheme whose `Sig` is a `u32` handle into a shared
/// deduplicated byte store, delegating all actual signature logic to the
/// wrapped scheme `S`.
pub struct Dedup<S: SignatureScheme>
where
    S::Sig: SigCodec,
{
    inner: S,
    store: Arc<Mutex<VariantStore>>,
}

impl<S: SignatureScheme> Dedup<S>
where
    S::Sig: SigCodec,
{
    pub fn new(inner: S) -> Self {
        Dedup {
            inner,
            store: Arc::new(Mutex::new(VariantStore::default())),
        }
    }

    fn intern_sig(&self, sig: &S::Sig) -> u32 {
        self.store.lock().unwrap().intern(sig.encode())
    }

    fn decode(&self, id: u32) -> S::Sig {
        let store = self.store.lock().unwrap();
        S::Sig::decode(store.get(id))
    }
}

impl<S: SignatureScheme> SignatureScheme for Dedup<S>
where
    S::Sig: SigCodec,
{
    type Sig = u32;
    type MayHaveMatch = DedupMayHaveMatch<S>;

    fn empty_signature(&self) -> Self::Sig {
        self.intern_sig(&self.inner.empty_signature())
    }

    fn signature(&self, s: &str) -> Result<Self::Sig, SrtreeError> {
        let sig = self.inner.signature(s)?;
        Ok(self.intern_sig(&sig))
    }

    fn combine(&self, a: &Self::Sig, b: &Self::Sig) -> Self::Sig {
        let sa = self.decode(*a);
        let sb = self.decode(*b);
        let combined = self.inner.combine(&sa, &sb);
        self.intern_sig(&combined)
    }

    fn may_have_match(
        &self,
        query: &str,
        edit_distance: usize,
    ) -> Result<Self::MayHaveMatch, SrtreeError> {
        let inner = self.inner.may_have_match(query, edit_distance)?;
        Ok(DedupMayHaveMatch {
            inner,
            store: Arc::clone(&self.store),
        })
    }
}

/// `MayHaveMatch` wrapper that decodes a candidate handle before delegating
/// to the inner scheme's predicate.
pub struct DedupMayHaveMatch<S: SignatureScheme>
where
    S::Sig: SigCodec,
{
    inner: S::MayHaveMatch,
    store: Arc<Mutex<VariantStore>>,
}

impl<S: SignatureScheme> Clone for DedupMayHaveMatch<S>
where
    S::Sig: SigCodec,
{
    fn clone(&self) -> Self {
        DedupMayHaveMatch {
            inner: self.inner.clone(),
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: SignatureScheme> Predicate<u32> for DedupMayHaveMatch<S>
where
    S::Sig: SigCodec,
{
    fn eval(&self, sig: &u32) -> bool {
        let decoded = {
            let store = self.store.lock().unwrap();
            S::Sig::decode(store.get(*sig))
        };
        self.inner.eval(&decoded)
    }

    fn and(self, other: Self) -> Self {
        DedupMayHaveMatch {
            inner: self.inner.and(other.inner),
            store: self.store,
        }
    }

    fn or(self, other: Self) -> Self {
        DedupMayHaveMatch {
            inner: self.inner.or(other.inner),
            store: self.store,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::stringset::StringSetScheme;

    #[test]
    fn identical_signatures_share_one_handle() {
        let d = Dedup::new(StringSetScheme::new());
        let h1 = d.signature("bench").unwrap();
        let h2 = d.signature("bench").unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn distinct_signatures_get_distinct_handles() {
        let d = Dedup::new(StringSetScheme::new());
        let h1 = d.signature("bench").unwrap();
        let h2 = d.signature("tree").unwrap();
        assert_ne!(h1, h2);
    }

    #[test]
    fn predicate_decodes_and_delegates() {
        let d = Dedup::new(StringSetScheme::new());
        let handle = d.signature("bench").unwrap();
        let pred = d.may_have_match("bench", 0).unwrap();
        assert!(pred.eval(&handle));
        let other = d.may_have_match("tree", 0).unwrap();
        assert!(!other.eval(&handle));
    }

    #[test]
    fn combine_dedups_equal_unions() {
        let d = Dedup::new(StringSetScheme::new());
        let a = d.signature("bench").unwrap();
        let b = d.signature("tree").unwrap();
        let c1 = d.combine(&a, &b);
        let c2 = d.combine(&a, &b);
        assert_eq!(c1, c2);
    }
}
