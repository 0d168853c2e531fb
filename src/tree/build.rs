//! Coarse-grained parallel build: worker threads claim dataset cells off a
//! shared atomic cursor, but all per-item work (signature, choose-subtree,
//! insert) runs under a single tree mutex — the parallelism only overlaps
//! cell hand-off and string work with the previous item's tree mutation,
//! it does not make the tree itself lock-free.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::dataset::DatasetSource;
use crate::exceptions::SrtreeError;
use crate::signature::SignatureScheme;
use crate::tree::mutable::RStarTree;

/// Builds a tree from `dataset` using `num_threads` workers. Equivalent to
/// inserting every row single-threaded through [`RStarTree::insert`]; the
/// concurrency only changes how cells are pulled off the dataset, not the
/// resulting tree shape (insertion order across cells is nondeterministic,
/// but `Combine` is associative/commutative so the cached payloads don't
/// depend on it).
pub fn build_parallel<S>(
    scheme: S,
    m: usize,
    big_m: usize,
    dataset: &impl DatasetSource,
    num_threads: usize,
) -> Result<RStarTree<S>, SrtreeError>
where
    S: SignatureScheme + Send,
{
    let tree = Mutex::new(RStarTree::new(scheme, m, big_m)?);
    let cells = dataset.cells(num_threads.max(1));
    let cursor = AtomicUsize::new(0);
    let seen = Mutex::new(HashSet::<u64>::new());
    let errors = Mutex::new(Vec::<SrtreeError>::new());

    std::thread::scope(|s| {
        for _ in 0..num_threads.max(1) {
            s.spawn(|| loop {
                let idx = cursor.fetch_add(1, Ordering::SeqCst);
                let Some(cell) = cells.get(idx) else {
                    break;
                };
                for row in cell.iter() {
                    if !seen.lock().unwrap().insert(row.item_id) {
                        continue;
                    }
                    let mut guard = tree.lock().unwrap();
                    let sig = match guard
                        .scheme()
                        .signature_many(row.strings.iter().map(String::as_str))
                    {
                        Ok(sig) => sig,
                        Err(e) => {
                            errors.lock().unwrap().push(e);
                            continue;
                        }
                    };
                    guard.insert(row.item_id, row.mbr, sig);
                }
            });
        }
    });

    if let Some(e) = errors.into_inner().unwrap().into_iter().next() {
        return Err(e);
    }
    Ok(tree.into_inner().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::InMemoryDataset;
    use crate::geometry::Rectangle;
    use crate::signature::stringset::StringSetScheme;

    fn dataset(n: u64) -> InMemoryDataset {
        let mut ds = InMemoryDataset::new();
        for i in 0..n {
            let x = (i % 20) as f64;
            let y = (i / 20) as f64;
            ds.push(
                i,
                Rectangle::new(x, x + 1.0, y, y + 1.0),
                vec!["tag".to_string()],
            );
        }
        ds
    }

    #[test]
    fn parallel_build_matches_item_count() {
        let ds = dataset(200);
        let tree = build_parallel(StringSetScheme::new(), 2, 8, &ds, 4).unwrap();
        tree.check().expect("parallel build stays consistent");
        let pred = tree.scheme().may_have_match("tag", 0).unwrap();
        assert_eq!(tree.find(&|_| true, &pred).len(), 200);
    }

    #[test]
    fn parallel_build_with_single_thread_matches_sequential() {
        let ds = dataset(50);
        let tree = build_parallel(StringSetScheme::new(), 2, 4, &ds, 1).unwrap();
        tree.check().expect("single-threaded parallel path stays consistent");
        let pred = tree.scheme().may_have_match("tag", 0).unwrap();
        assert_eq!(tree.find(&|_| true, &pred).len(), 50);
    }
}
