//! One simulated ray.

use crate::{Point3, Vec3};

/// One ray record: origin, direction cosines, flux, and optional
/// wavelength/polarization data.
///
/// Records are constructed by a codec's decode step and consumed immutably
/// downstream; the only sanctioned mutation is the uniform flux rescale
/// applied to a whole file via [`RayRecord::with_flux_scaled`].
#[derive(Debug, Clone, PartialEq)]
pub struct RayRecord {
    /// Origin in the header's source units.
    pub position: Point3,
    /// Direction cosines (l, m, n); expected to have unit norm.
    pub direction: Vec3,
    /// Non-negative flux contribution of this ray.
    pub flux: f64,
    /// Wavelength in micrometers, present iff the header says per-ray.
    pub wavelength: Option<f64>,
    /// Stokes parameters, present iff the header says polarized.
    pub stokes: Option<[f64; 4]>,
}

impl RayRecord {
    /// A flux-only record with no wavelength or polarization data.
    pub fn new(position: Point3, direction: Vec3, flux: f64) -> Self {
        Self {
            position,
            direction,
            flux,
            wavelength: None,
            stokes: None,
        }
    }

    /// Absolute deviation of the direction-cosine norm from 1.
    pub fn direction_norm_error(&self) -> f64 {
        (self.direction.norm() - 1.0).abs()
    }

    /// Whether the direction cosines are normalized within `tolerance`.
    pub fn has_unit_direction(&self, tolerance: f64) -> bool {
        self.direction_norm_error() <= tolerance
    }

    /// This record with its flux multiplied by `scale`.
    pub fn with_flux_scaled(mut self, scale: f64) -> Self {
        self.flux *= scale;
        self
    }
}
