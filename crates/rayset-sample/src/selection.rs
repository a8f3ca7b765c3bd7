//! Uniform random selection planning.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Result, SampleError};

/// A planned subset of a source ray sequence.
///
/// Holds the selected source indices in ascending order plus the flux
/// rescale factor `total / target` applied to every surviving ray. The
/// identity selection (target == total) is represented without
/// materializing any indices.
#[derive(Debug, Clone)]
pub struct SelectionSet {
    total: u64,
    flux_scale: f64,
    kind: SelectionKind,
}

#[derive(Debug, Clone)]
enum SelectionKind {
    Identity,
    /// Sorted, distinct source indices.
    Indices(Vec<u64>),
}

impl SelectionSet {
    /// Plan a uniform random selection of exactly `target` of `total`
    /// indices, without replacement; every size-`target` combination is
    /// equally likely.
    ///
    /// A `seed` makes the selection reproducible for the same
    /// `(total, target)` pair; without one the RNG is entropy-seeded.
    /// Memory stays O(target) regardless of `total`; no permutation
    /// buffer of the whole index range is ever built.
    pub fn plan(total: u64, target: u64, seed: Option<u64>) -> Result<Self> {
        if target == 0 || target > total {
            return Err(SampleError::InvalidTarget { target, total });
        }
        if target == total {
            return Ok(Self::identity(total));
        }
        let mut rng = new_rng(seed);
        let mut indices = floyd_sample(&mut rng, total, target);
        indices.sort_unstable();
        Ok(Self::from_sorted_indices(total, indices))
    }

    /// The no-op selection: every index survives, flux scale 1.
    pub fn identity(total: u64) -> Self {
        Self {
            total,
            flux_scale: 1.0,
            kind: SelectionKind::Identity,
        }
    }

    /// Wrap already-planned indices; they must be sorted and distinct.
    pub(crate) fn from_sorted_indices(total: u64, indices: Vec<u64>) -> Self {
        debug_assert!(indices.windows(2).all(|w| w[0] < w[1]));
        let flux_scale = if indices.len() as u64 == total {
            1.0
        } else {
            total as f64 / indices.len() as f64
        };
        Self {
            total,
            flux_scale,
            kind: SelectionKind::Indices(indices),
        }
    }

    /// Source sequence length this selection was planned against.
    pub fn total_count(&self) -> u64 {
        self.total
    }

    /// Number of selected indices.
    pub fn target_count(&self) -> u64 {
        match &self.kind {
            SelectionKind::Identity => self.total,
            SelectionKind::Indices(indices) => indices.len() as u64,
        }
    }

    /// Flux rescale factor for surviving rays.
    pub fn flux_scale(&self) -> f64 {
        self.flux_scale
    }

    /// Whether this is the no-op selection.
    pub fn is_identity(&self) -> bool {
        matches!(self.kind, SelectionKind::Identity)
    }

    /// Whether `index` is selected.
    pub fn contains(&self, index: u64) -> bool {
        match &self.kind {
            SelectionKind::Identity => index < self.total,
            SelectionKind::Indices(indices) => indices.binary_search(&index).is_ok(),
        }
    }

    /// Selected indices in ascending order.
    pub fn iter(&self) -> Box<dyn Iterator<Item = u64> + '_> {
        match &self.kind {
            SelectionKind::Identity => Box::new(0..self.total),
            SelectionKind::Indices(indices) => Box::new(indices.iter().copied()),
        }
    }

    /// Streaming membership cursor for a single ascending pass.
    pub fn cursor(&self) -> SelectionCursor<'_> {
        SelectionCursor { set: self, pos: 0 }
    }
}

/// Streaming membership test over source indices visited in ascending
/// order; each admitted index is consumed, so the whole pass is O(target).
pub struct SelectionCursor<'a> {
    set: &'a SelectionSet,
    pos: usize,
}

impl SelectionCursor<'_> {
    /// Whether `index` is selected. Indices must be fed in ascending order.
    pub fn admits(&mut self, index: u64) -> bool {
        match &self.set.kind {
            SelectionKind::Identity => index < self.set.total,
            SelectionKind::Indices(indices) => {
                while self.pos < indices.len() && indices[self.pos] < index {
                    self.pos += 1;
                }
                if self.pos < indices.len() && indices[self.pos] == index {
                    self.pos += 1;
                    true
                } else {
                    false
                }
            }
        }
    }
}

pub(crate) fn new_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Floyd's algorithm: `target` distinct values from `[0, total)` with every
/// combination equally likely, in O(target) memory. Output order is
/// unspecified.
pub(crate) fn floyd_sample(rng: &mut StdRng, total: u64, target: u64) -> Vec<u64> {
    let mut chosen: HashSet<u64> = HashSet::with_capacity(target as usize);
    for j in (total - target)..total {
        let pick = rng.gen_range(0..=j);
        if !chosen.insert(pick) {
            chosen.insert(j);
        }
    }
    chosen.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_selection_validity() {
        for (total, target) in [(1u64, 1u64), (10, 1), (10, 9), (100, 37), (1000, 1000)] {
            let selection = SelectionSet::plan(total, target, Some(7)).unwrap();
            assert_eq!(selection.target_count(), target);
            let indices: Vec<u64> = selection.iter().collect();
            assert_eq!(indices.len() as u64, target);
            assert!(indices.windows(2).all(|w| w[0] < w[1]), "sorted, distinct");
            assert!(indices.iter().all(|&i| i < total));
        }
    }

    #[test]
    fn test_identity_case() {
        let selection = SelectionSet::plan(42, 42, None).unwrap();
        assert!(selection.is_identity());
        assert_relative_eq!(selection.flux_scale(), 1.0);
        assert_eq!(selection.target_count(), 42);
        assert!(selection.contains(0));
        assert!(selection.contains(41));
        assert!(!selection.contains(42));
    }

    #[test]
    fn test_flux_scale() {
        let selection = SelectionSet::plan(1000, 50, Some(42)).unwrap();
        assert_relative_eq!(selection.flux_scale(), 20.0);
    }

    #[test]
    fn test_rejection() {
        assert!(matches!(
            SelectionSet::plan(10, 0, None),
            Err(SampleError::InvalidTarget { target: 0, total: 10 })
        ));
        assert!(matches!(
            SelectionSet::plan(10, 11, None),
            Err(SampleError::InvalidTarget {
                target: 11,
                total: 10
            })
        ));
        assert!(matches!(
            SelectionSet::plan(0, 1, None),
            Err(SampleError::InvalidTarget { target: 1, total: 0 })
        ));
    }

    #[test]
    fn test_seeded_determinism() {
        let a: Vec<u64> = SelectionSet::plan(500, 100, Some(42)).unwrap().iter().collect();
        let b: Vec<u64> = SelectionSet::plan(500, 100, Some(42)).unwrap().iter().collect();
        assert_eq!(a, b);

        let c: Vec<u64> = SelectionSet::plan(500, 100, Some(43)).unwrap().iter().collect();
        assert_ne!(a, c);
    }

    #[test]
    fn test_entropy_seeding_diverges() {
        let a: Vec<u64> = SelectionSet::plan(1000, 500, None).unwrap().iter().collect();
        let b: Vec<u64> = SelectionSet::plan(1000, 500, None).unwrap().iter().collect();
        // Identical draws are possible in principle but have probability
        // 1 / C(1000, 500).
        assert_ne!(a, b);
    }

    #[test]
    fn test_large_total_small_target() {
        // Would be unreasonable with an O(total) permutation buffer.
        let selection = SelectionSet::plan(100_000_000, 10, Some(1)).unwrap();
        assert_eq!(selection.target_count(), 10);
        assert!(selection.iter().all(|i| i < 100_000_000));
    }

    #[test]
    fn test_cursor_matches_contains() {
        let selection = SelectionSet::plan(200, 40, Some(9)).unwrap();
        let mut cursor = selection.cursor();
        let mut admitted = 0u64;
        for index in 0..200 {
            let admits = cursor.admits(index);
            assert_eq!(admits, selection.contains(index));
            if admits {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 40);
    }

    #[test]
    fn test_every_index_reachable() {
        // Over many seeds each index of a small range should be drawn at
        // least once; guards against an off-by-one at either end.
        let mut seen = [false; 10];
        for seed in 0..200 {
            for index in SelectionSet::plan(10, 3, Some(seed)).unwrap().iter() {
                seen[index as usize] = true;
            }
        }
        assert!(seen.iter().all(|&s| s));
    }
}
