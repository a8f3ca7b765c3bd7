//! Flux-weighted angular stratified selection.
//!
//! Bins rays by the spherical angles of their direction cosines and
//! allocates per-bin sample counts proportional to per-bin flux, so that
//! sparse high-flux lobes survive subsampling that plain uniform selection
//! would occasionally thin out. Requires a prepass over every ray's
//! direction and flux; bin membership lists make this O(total) in memory,
//! unlike the O(target) uniform planner.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use rayset_model::Vec3;

use crate::error::{Result, SampleError};
use crate::selection::{floyd_sample, new_rng, SelectionSet};

const DEFAULT_THETA_BINS: usize = 90;
const DEFAULT_PHI_BINS: usize = 180;

#[derive(Debug, Default)]
struct Bin {
    indices: Vec<u64>,
    flux: f64,
}

/// Two-pass planner: feed every ray's direction and flux to
/// [`StratifiedPlanner::observe`], then call [`StratifiedPlanner::plan`].
#[derive(Debug)]
pub struct StratifiedPlanner {
    theta_bins: usize,
    phi_bins: usize,
    bins: BTreeMap<(u16, u16), Bin>,
    observed: u64,
}

impl StratifiedPlanner {
    /// Planner with the default 90×180 angular grid.
    pub fn new() -> Self {
        Self::with_bins(DEFAULT_THETA_BINS, DEFAULT_PHI_BINS)
    }

    /// Planner with a custom `(theta, phi)` grid.
    pub fn with_bins(theta_bins: usize, phi_bins: usize) -> Self {
        Self {
            theta_bins: theta_bins.max(1),
            phi_bins: phi_bins.max(1),
            bins: BTreeMap::new(),
            observed: 0,
        }
    }

    /// Record one ray. `index` is its position in the source sequence;
    /// feed every ray exactly once, in any order.
    pub fn observe(&mut self, index: u64, direction: Vec3, flux: f64) {
        let norm = direction.norm().max(1e-12);
        let n = (direction.z / norm).clamp(-1.0, 1.0);
        let theta = n.acos();
        let phi = direction.y.atan2(direction.x);

        let ti = (((theta / PI) * self.theta_bins as f64) as usize).min(self.theta_bins - 1);
        let phi_norm = (phi + PI) / (2.0 * PI);
        let pj = ((phi_norm * self.phi_bins as f64) as usize).min(self.phi_bins - 1);

        let bin = self.bins.entry((ti as u16, pj as u16)).or_default();
        bin.indices.push(index);
        bin.flux += flux.max(0.0);
        self.observed += 1;
    }

    /// Plan a selection of exactly `target` of the observed rays.
    ///
    /// Allocation is proportional to per-bin flux (per-bin ray count when
    /// the file carries no flux at all), floored at one ray per non-empty
    /// bin and capped at the bin population, then adjusted to hit `target`
    /// exactly. Selection within each bin is uniform without replacement.
    pub fn plan(self, target: u64, seed: Option<u64>) -> Result<SelectionSet> {
        let total = self.observed;
        if target == 0 || target > total {
            return Err(SampleError::InvalidTarget { target, total });
        }
        if target == total {
            return Ok(SelectionSet::identity(total));
        }
        let mut rng = new_rng(seed);

        let keys: Vec<(u16, u16)> = self.bins.keys().copied().collect();
        let total_flux: f64 = self.bins.values().map(|b| b.flux).sum();

        let mut alloc: BTreeMap<(u16, u16), usize> = BTreeMap::new();
        for (key, bin) in &self.bins {
            let share = if total_flux > 0.0 {
                bin.flux / total_flux
            } else {
                bin.indices.len() as f64 / total as f64
            };
            let want = (target as f64 * share).round() as usize;
            alloc.insert(*key, want.clamp(1, bin.indices.len()));
        }
        let mut current: usize = alloc.values().sum();

        if current > target as usize {
            // Shed from the largest allocations first, keeping the
            // one-per-bin floor.
            let mut by_alloc = keys.clone();
            by_alloc.sort_by(|a, b| alloc[b].cmp(&alloc[a]).then(a.cmp(b)));
            'trim: for key in by_alloc {
                while alloc[&key] > 1 {
                    *alloc.get_mut(&key).unwrap() -= 1;
                    current -= 1;
                    if current == target as usize {
                        break 'trim;
                    }
                }
            }
        } else if current < target as usize {
            // Grow where spare capacity remains, largest headroom first.
            let mut by_headroom = keys.clone();
            by_headroom.sort_by(|a, b| {
                let ha = self.bins[a].indices.len() - alloc[a];
                let hb = self.bins[b].indices.len() - alloc[b];
                hb.cmp(&ha).then(a.cmp(b))
            });
            'grow: for key in by_headroom {
                while alloc[&key] < self.bins[&key].indices.len() {
                    *alloc.get_mut(&key).unwrap() += 1;
                    current += 1;
                    if current == target as usize {
                        break 'grow;
                    }
                }
            }
        }

        let mut selected: Vec<u64> = Vec::with_capacity(current);
        for (key, bin) in &self.bins {
            let want = alloc[key];
            if want >= bin.indices.len() {
                selected.extend_from_slice(&bin.indices);
            } else {
                for pos in floyd_sample(&mut rng, bin.indices.len() as u64, want as u64) {
                    selected.push(bin.indices[pos as usize]);
                }
            }
        }

        // The one-per-bin floor can overshoot when there are more occupied
        // bins than target rays; discard uniformly back down to size.
        if selected.len() > target as usize {
            let keep = floyd_sample(&mut rng, selected.len() as u64, target);
            let mut kept: Vec<u64> = keep.into_iter().map(|p| selected[p as usize]).collect();
            std::mem::swap(&mut selected, &mut kept);
        }

        selected.sort_unstable();
        Ok(SelectionSet::from_sorted_indices(total, selected))
    }
}

impl Default for StratifiedPlanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two angular clusters: `count_up` rays along +z and `count_down`
    /// along -z, with per-ray fluxes `flux_up` and `flux_down`.
    fn two_cluster_planner(
        count_up: u64,
        flux_up: f64,
        count_down: u64,
        flux_down: f64,
    ) -> StratifiedPlanner {
        let mut planner = StratifiedPlanner::new();
        for i in 0..count_up {
            planner.observe(i, Vec3::new(0.0, 0.0, 1.0), flux_up);
        }
        for i in 0..count_down {
            planner.observe(count_up + i, Vec3::new(0.0, 0.0, -1.0), flux_down);
        }
        planner
    }

    #[test]
    fn test_exact_target_size() {
        let planner = two_cluster_planner(60, 1.0, 40, 1.0);
        let selection = planner.plan(10, Some(3)).unwrap();
        assert_eq!(selection.target_count(), 10);
        assert_eq!(selection.total_count(), 100);
        let indices: Vec<u64> = selection.iter().collect();
        assert!(indices.windows(2).all(|w| w[0] < w[1]));
        assert!(indices.iter().all(|&i| i < 100));
    }

    #[test]
    fn test_flux_proportional_allocation() {
        // 90% of flux points up; the up cluster should dominate.
        let planner = two_cluster_planner(50, 9.0, 50, 1.0);
        let selection = planner.plan(20, Some(5)).unwrap();
        let up_count = selection.iter().filter(|&i| i < 50).count();
        let down_count = selection.iter().filter(|&i| i >= 50).count();
        assert_eq!(up_count + down_count, 20);
        assert!(up_count >= 14, "up cluster got {up_count} of 20");
        // The floor keeps the weak cluster represented.
        assert!(down_count >= 1);
    }

    #[test]
    fn test_zero_flux_falls_back_to_counts() {
        let planner = two_cluster_planner(75, 0.0, 25, 0.0);
        let selection = planner.plan(20, Some(11)).unwrap();
        let up_count = selection.iter().filter(|&i| i < 75).count();
        assert!((13..=17).contains(&up_count), "up cluster got {up_count}");
    }

    #[test]
    fn test_more_bins_than_target() {
        // 30 rays in 30 distinct azimuthal bins, target 5: the floor
        // overshoots and the planner must discard back down to size.
        let mut planner = StratifiedPlanner::new();
        for i in 0..30u64 {
            let phi = (i as f64 + 0.5) / 30.0 * 2.0 * PI - PI;
            planner.observe(i, Vec3::new(phi.cos(), phi.sin(), 0.0), 1.0);
        }
        let selection = planner.plan(5, Some(2)).unwrap();
        assert_eq!(selection.target_count(), 5);
    }

    #[test]
    fn test_identity_and_rejection() {
        let planner = two_cluster_planner(5, 1.0, 5, 1.0);
        let selection = planner.plan(10, None).unwrap();
        assert!(selection.is_identity());

        let planner = two_cluster_planner(5, 1.0, 5, 1.0);
        assert!(matches!(
            planner.plan(11, None),
            Err(SampleError::InvalidTarget {
                target: 11,
                total: 10
            })
        ));
        let planner = two_cluster_planner(5, 1.0, 5, 1.0);
        assert!(matches!(
            planner.plan(0, None),
            Err(SampleError::InvalidTarget { target: 0, .. })
        ));
    }

    #[test]
    fn test_seeded_determinism() {
        let a: Vec<u64> = two_cluster_planner(80, 2.0, 20, 1.0)
            .plan(15, Some(42))
            .unwrap()
            .iter()
            .collect();
        let b: Vec<u64> = two_cluster_planner(80, 2.0, 20, 1.0)
            .plan(15, Some(42))
            .unwrap()
            .iter()
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unnormalized_directions_tolerated() {
        let mut planner = StratifiedPlanner::new();
        planner.observe(0, Vec3::new(0.0, 0.0, 5.0), 1.0);
        planner.observe(1, Vec3::new(0.0, 0.0, 0.0), 1.0);
        planner.observe(2, Vec3::new(0.0, 3.0, 0.0), 1.0);
        let selection = planner.plan(2, Some(1)).unwrap();
        assert_eq!(selection.target_count(), 2);
    }
}
