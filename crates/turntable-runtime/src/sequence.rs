//! [`SequenceGenerator`] – non-repeating viewing orders.
//!
//! A sequence is built in three steps:
//!
//! 1. **Filter** – drop foils and every model already in the cumulative seen
//!    history.
//! 2. **Truncate** – keep the first `target_len` survivors in catalog order.
//! 3. **Shuffle** – Fisher-Yates over the truncated pool with the injected
//!    random source.
//!
//! When fewer models survive the filter than requested the sequence is
//! simply shorter; the trial controller detects the shortfall.
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashSet;
//! use rand::SeedableRng;
//! use rand::rngs::StdRng;
//! use turntable_runtime::catalog::{FoilRule, ModelCatalog};
//! use turntable_runtime::sequence::SequenceGenerator;
//!
//! let catalog = ModelCatalog::new(["a.glb", "b.glb", "x_foil.glb"], FoilRule::default());
//! let mut rng = StdRng::seed_from_u64(7);
//! let seq = SequenceGenerator::new(10).generate(&catalog, &HashSet::new(), &mut rng);
//! assert_eq!(seq.len(), 2);
//! ```

use std::collections::HashSet;

use rand::Rng;
use tracing::debug;

use crate::catalog::ModelCatalog;

/// Shuffle `items` in place: for `i` from the last index down to 1, swap
/// with a uniform index in `[0, i]`.
pub fn fisher_yates<T, R: Rng + ?Sized>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}

/// Produces viewing orders of a fixed target length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceGenerator {
    target_len: usize,
}

impl SequenceGenerator {
    pub fn new(target_len: usize) -> Self {
        Self { target_len }
    }

    pub fn target_len(&self) -> usize {
        self.target_len
    }

    /// Build a fresh sequence from `catalog`, excluding everything in `seen`.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        catalog: &ModelCatalog,
        seen: &HashSet<String>,
        rng: &mut R,
    ) -> Vec<String> {
        let mut pool: Vec<String> = catalog
            .regular()
            .into_iter()
            .filter(|m| !seen.contains(*m))
            .map(str::to_string)
            .collect();
        let available = pool.len();
        pool.truncate(self.target_len);
        fisher_yates(&mut pool, rng);
        debug!(
            target = self.target_len,
            available,
            len = pool.len(),
            "generated model sequence"
        );
        pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FoilRule;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn catalog(regular: usize, foils: usize) -> ModelCatalog {
        let mut names: Vec<String> = (1..=regular).map(|i| format!("Set_{i}_orig_matte_0.glb")).collect();
        names.extend((1..=foils).map(|i| format!("Set_{i}_foil.glb")));
        ModelCatalog::new(names, FoilRule::default())
    }

    fn assert_unique(seq: &[String]) {
        let set: HashSet<&String> = seq.iter().collect();
        assert_eq!(set.len(), seq.len(), "duplicates in {seq:?}");
    }

    #[test]
    fn twenty_regular_five_foils_target_ten() {
        let catalog = catalog(20, 5);
        let mut rng = StdRng::seed_from_u64(1);
        let seq = SequenceGenerator::new(10).generate(&catalog, &HashSet::new(), &mut rng);
        assert_eq!(seq.len(), 10);
        assert_unique(&seq);
        assert!(seq.iter().all(|m| !catalog.is_foil(m)));
    }

    #[test]
    fn output_is_a_permutation_of_the_truncated_pool() {
        let catalog = catalog(20, 5);
        let seen: HashSet<String> = ["Set_2_orig_matte_0.glb", "Set_3_orig_matte_0.glb"]
            .into_iter()
            .map(String::from)
            .collect();
        let mut rng = StdRng::seed_from_u64(99);
        let mut seq = SequenceGenerator::new(16).generate(&catalog, &seen, &mut rng);

        let mut expected: Vec<String> = catalog
            .regular()
            .into_iter()
            .filter(|m| !seen.contains(*m))
            .take(16)
            .map(String::from)
            .collect();
        seq.sort();
        expected.sort();
        assert_eq!(seq, expected);
    }

    #[test]
    fn seen_models_are_excluded() {
        let catalog = catalog(12, 0);
        let seen: HashSet<String> = catalog.regular()[..5].iter().map(|m| m.to_string()).collect();
        let mut rng = StdRng::seed_from_u64(3);
        let seq = SequenceGenerator::new(10).generate(&catalog, &seen, &mut rng);
        assert_eq!(seq.len(), 7);
        assert!(seq.iter().all(|m| !seen.contains(m)));
    }

    #[test]
    fn short_pool_yields_short_sequence() {
        let catalog = catalog(3, 4);
        let mut rng = StdRng::seed_from_u64(3);
        let seq = SequenceGenerator::new(10).generate(&catalog, &HashSet::new(), &mut rng);
        assert_eq!(seq.len(), 3);

        let all_seen: HashSet<String> = catalog.all().iter().cloned().collect();
        assert!(SequenceGenerator::new(10).generate(&catalog, &all_seen, &mut rng).is_empty());
    }

    #[test]
    fn same_seed_same_order() {
        let catalog = catalog(20, 0);
        let generator = SequenceGenerator::new(10);
        let a = generator.generate(&catalog, &HashSet::new(), &mut StdRng::seed_from_u64(42));
        let b = generator.generate(&catalog, &HashSet::new(), &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn fisher_yates_keeps_every_element() {
        let mut items: Vec<u32> = (0..50).collect();
        fisher_yates(&mut items, &mut StdRng::seed_from_u64(5));
        let mut sorted = items.clone();
        sorted.sort();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());

        let mut single = vec![1];
        fisher_yates(&mut single, &mut StdRng::seed_from_u64(5));
        assert_eq!(single, vec![1]);
        let mut empty: Vec<u32> = vec![];
        fisher_yates(&mut empty, &mut StdRng::seed_from_u64(5));
    }
}
