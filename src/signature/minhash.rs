//! MinHash signatures: a fixed-size vector of per-permutation minima over a
//! string's q-gram set, combined by entrywise `min`, with an estimated
//! Jaccard-resemblance pruning predicate.
//!
//! Two permutation families are supported: a linear-congruential
//! composition (`LcgHash`) and a salted SHA3 digest (`Sha3Hash`), selected by
//! the `H: Permutation` type parameter on [`MinHashScheme`].

use rand::{Rng, RngCore};
use sha3::{Digest, Sha3_256};

use crate::exceptions::SrtreeError;
use crate::qgram::QGram;
use crate::signature::{Predicate, SignatureScheme};

/// Reference width: 56 64-bit entries, matching the reference deployment.
pub const DEFAULT_SIGNATURE_SIZE: usize = 56;

/// A parametrised hash permutation over strings (and, for composition inside
/// `Combine`, over other permutations' outputs).
pub trait Permutation: Clone {
    fn generate(rng: &mut dyn RngCore, hash_size: usize) -> Self;
    fn hash_str(&self, s: &str) -> u64;
}

/// Linear-congruential permutation: a composition of `hash_size` random
/// coefficients modulo a randomly chosen ~63-bit prime.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LcgHash {
    coefficients: Vec<u64>,
    prime: u64,
}

impl LcgHash {
    fn str_to_int_mod_p(s: &str, p: u64) -> u64 {
        let mut acc: u128 = 0;
        for b in s.bytes() {
            acc = (acc << 8) | b as u128;
            acc %= p as u128;
        }
        acc as u64
    }

    fn compose(&self, x: u64) -> u64 {
        let p = self.prime as u128;
        let mut result = self.coefficients[0] as u128;
        for c in &self.coefficients[1..] {
            result = (result * x as u128) % p;
            result = (result + *c as u128) % p;
        }
        result as u64
    }
}

impl Permutation for LcgHash {
    fn generate(rng: &mut dyn RngCore, hash_size: usize) -> Self {
        let coefficients = (0..hash_size.max(1)).map(|_| rng.next_u64()).collect();
        let prime = random_63_bit_prime(rng);
        LcgHash { coefficients, prime }
    }

    fn hash_str(&self, s: &str) -> u64 {
        let x = Self::str_to_int_mod_p(s, self.prime);
        self.compose(x)
    }
}

/// Draws a random odd 63-bit candidate and walks forward to the next prime,
/// verified with a deterministic Miller-Rabin test (the fixed witness set
/// `{2,3,5,7,11,13,17,19,23,29,31,37}` is provably correct for all `u64`).
fn random_63_bit_prime(rng: &mut dyn RngCore) -> u64 {
    let mut candidate = rng.gen_range(1u64..(1u64 << 62)) | 1;
    loop {
        if is_prime_u64(candidate) {
            return candidate;
        }
        candidate = candidate.wrapping_add(2);
    }
}

fn is_prime_u64(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    for p in [2u64, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37] {
        if n == p {
            return true;
        }
        if n % p == 0 {
            return false;
        }
    }
    let mut d = n - 1;
    let mut r = 0u32;
    while d % 2 == 0 {
        d /= 2;
        r += 1;
    }
    'witness: for a in [2u64, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37] {
        if a >= n {
            continue;
        }
        let mut x = mulmod_pow(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 0..r - 1 {
            x = mulmod(x, x, n);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

fn mulmod(a: u64, b: u64, m: u64) -> u64 {
    ((a as u128 * b as u128) % m as u128) as u64
}

fn mulmod_pow(mut base: u64, mut exp: u64, m: u64) -> u64 {
    let mut result = 1u64;
    base %= m;
    while exp > 0 {
        if exp & 1 == 1 {
            result = mulmod(result, base, m);
        }
        exp >>= 1;
        base = mulmod(base, base, m);
    }
    result
}

/// Salted SHA3 permutation, truncated to 64 bits.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sha3Hash {
    salt: u64,
}

impl Permutation for Sha3Hash {
    fn generate(rng: &mut dyn RngCore, _hash_size: usize) -> Self {
        Sha3Hash {
            salt: rng.next_u64(),
        }
    }

    fn hash_str(&self, s: &str) -> u64 {
        let mut hasher = Sha3_256::new();
        hasher.update(self.salt.to_le_bytes());
        hasher.update(s.as_bytes());
        let digest = hasher.finalize();
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(buf)
    }
}

/// A fixed-length MinHash signature. Combine is entrywise `min`; identity is
/// all entries at `u64::MAX`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MinHashSignature {
    entries: Vec<u64>,
}

impl MinHashSignature {
    pub fn identity(size: usize) -> Self {
        MinHashSignature {
            entries: vec![u64::MAX; size],
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn combine(&self, other: &MinHashSignature) -> MinHashSignature {
        MinHashSignature {
            entries: self
                .entries
                .iter()
                .zip(other.entries.iter())
                .map(|(a, b)| (*a).min(*b))
                .collect(),
        }
    }

    /// `|{i : a[i] == b[i]}| / N`.
    pub fn resemblance(&self, other: &MinHashSignature) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        let matches = self
            .entries
            .iter()
            .zip(other.entries.iter())
            .filter(|(a, b)| a == b)
            .count();
        matches as f64 / self.entries.len() as f64
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.entries.len() * 8);
        for e in &self.entries {
            out.extend_from_slice(&e.to_le_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let entries = bytes
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
            .collect();
        MinHashSignature { entries }
    }
}

impl crate::signature::SigCodec for MinHashSignature {
    fn encode(&self) -> Vec<u8> {
        self.to_bytes()
    }

    fn decode(bytes: &[u8]) -> Self {
        Self::from_bytes(bytes)
    }
}

/// Generates MinHash signatures for q-grams using `size` independent
/// permutations of family `H`, drawn once from a CSPRNG seed and then shared
/// by every signature/predicate this scheme produces.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MinHashScheme<H: Permutation> {
    q: usize,
    size: usize,
    perms: Vec<H>,
}

impl<H: Permutation> MinHashScheme<H> {
    pub fn new(q: usize, size: usize, hash_size: usize, rng: &mut dyn RngCore) -> Self {
        let perms = (0..size).map(|_| H::generate(rng, hash_size)).collect();
        MinHashScheme { q, size, perms }
    }

    pub fn new_default_size(q: usize, rng: &mut dyn RngCore) -> Self {
        Self::new(q, DEFAULT_SIGNATURE_SIZE, 2, rng)
    }

    fn signature_of_grams<'a>(&self, grams: impl Iterator<Item = &'a str>) -> MinHashSignature {
        let mut entries = vec![u64::MAX; self.size];
        for g in grams {
            for (i, perm) in self.perms.iter().enumerate() {
                entries[i] = entries[i].min(perm.hash_str(g));
            }
        }
        MinHashSignature { entries }
    }
}

impl<H: Permutation> SignatureScheme for MinHashScheme<H> {
    type Sig = MinHashSignature;
    type MayHaveMatch = MinHashMayHaveMatch;

    fn empty_signature(&self) -> Self::Sig {
        MinHashSignature::identity(self.size)
    }

    fn signature(&self, s: &str) -> Result<Self::Sig, SrtreeError> {
        if s.is_empty() {
            return Err(SrtreeError::EmptyString);
        }
        let qg = QGram::new(s, self.q)?;
        Ok(self.signature_of_grams(qg.iter()))
    }

    fn combine(&self, a: &Self::Sig, b: &Self::Sig) -> Self::Sig {
        a.combine(b)
    }

    fn may_have_match(
        &self,
        query: &str,
        edit_distance: usize,
    ) -> Result<Self::MayHaveMatch, SrtreeError> {
        let qref = QGram::new(query, self.q)?;
        let sref = self.signature_of_grams(qref.iter());
        let threshold = qref.size() as i64 - (edit_distance * self.q) as i64;
        Ok(MinHashMayHaveMatch {
            node: Node::Leaf(Box::new(LeafPredicate {
                sref,
                query_size: qref.size(),
                threshold,
            })),
        })
    }
}

#[derive(Debug, Clone)]
struct LeafPredicate {
    sref: MinHashSignature,
    query_size: usize,
    threshold: i64,
}

impl LeafPredicate {
    fn matches(&self, sig: &MinHashSignature) -> bool {
        let g = sig.combine(&self.sref);
        let roh_g_ref = g.resemblance(&self.sref);
        if roh_g_ref == 0.0 {
            // Every permutation disagreed: the safeguard branch. Accept
            // rather than risk a false negative.
            return true;
        }
        let roh_ns_ref = sig.resemblance(&self.sref);
        let est = roh_ns_ref / roh_g_ref * self.query_size as f64;
        est >= self.threshold as f64
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(Box<LeafPredicate>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
}

impl Node {
    fn eval(&self, sig: &MinHashSignature) -> bool {
        match self {
            Node::Leaf(p) => p.matches(sig),
            Node::And(a, b) => a.eval(sig) && b.eval(sig),
            Node::Or(a, b) => a.eval(sig) || b.eval(sig),
        }
    }
}

/// `MayHaveMatch` predicate tree for the MinHash scheme.
#[derive(Debug, Clone)]
pub struct MinHashMayHaveMatch {
    node: Node,
}

impl Predicate<MinHashSignature> for MinHashMayHaveMatch {
    fn eval(&self, sig: &MinHashSignature) -> bool {
        self.node.eval(sig)
    }

    fn and(self, other: Self) -> Self {
        MinHashMayHaveMatch {
            node: Node::And(Box::new(self.node), Box::new(other.node)),
        }
    }

    fn or(self, other: Self) -> Self {
        MinHashMayHaveMatch {
            node: Node::Or(Box::new(self.node), Box::new(other.node)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn scheme(q: usize) -> MinHashScheme<LcgHash> {
        let mut rng = StdRng::seed_from_u64(42);
        MinHashScheme::new_default_size(q, &mut rng)
    }

    #[test]
    fn single_string_signature_matches_itself() {
        let s = scheme(3);
        let sig = s.signature("@amenity:bench").unwrap();
        assert_ne!(sig, s.empty_signature());
        let pred = s.may_have_match("@amenity:bench", 0).unwrap();
        assert!(pred.eval(&sig));
    }

    #[test]
    fn union_of_two_strings_matches_both() {
        let s = scheme(3);
        let sig_a = s.signature("@amenity:bench").unwrap();
        let sig_b = s.signature("@highway:footway").unwrap();
        let combined = s.combine(&sig_a, &sig_b);
        let pa = s.may_have_match("@amenity:bench", 0).unwrap();
        let pb = s.may_have_match("@highway:footway", 0).unwrap();
        assert!(pa.eval(&combined));
        assert!(pb.eval(&combined));
    }

    #[test]
    fn divide_by_zero_branch_is_conservative() {
        let s = scheme(3);
        let sref = s.signature("gardenfence").unwrap();
        let unrelated = MinHashSignature::identity(sref.len());
        // An identity signature disagrees with sref on every entry by
        // construction (u64::MAX vs a real hash), so resemblance(g, sref) is
        // zero and the predicate must accept rather than reject.
        let pred = s.may_have_match("gardenfence", 0).unwrap();
        assert!(pred.eval(&unrelated));
    }

    #[test]
    fn and_or_algebra() {
        let s = scheme(3);
        let p1 = s.may_have_match("bench", 0).unwrap();
        let p2 = s.may_have_match("tree", 0).unwrap();
        let sig = s
            .signature_many(["bench", "tree"].into_iter())
            .unwrap();
        assert!(p1.clone().and(p2.clone()).eval(&sig));
        assert!(p1.or(p2).eval(&sig));
    }

    #[test]
    fn is_prime_agrees_on_known_values() {
        assert!(is_prime_u64(2));
        assert!(is_prime_u64(97));
        assert!(!is_prime_u64(100));
        assert!(is_prime_u64((1u64 << 61) - 1)); // a known Mersenne prime
    }
}
