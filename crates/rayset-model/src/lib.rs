#![warn(missing_docs)]

//! In-memory model of illumination ray files.
//!
//! A ray file is a header plus an ordered sequence of ray records, each
//! describing one simulated ray's origin, direction cosines, flux, and
//! optional wavelength/polarization data. This crate defines the shared
//! representation that the format codecs decode into and encode from;
//! it knows nothing about any on-disk layout.

mod header;
mod record;
mod units;

pub use header::{FluxMode, RayFileHeader, TraceProExtra, VendorExtra, WavelengthMode, ZemaxExtra};
pub use record::RayRecord;
pub use units::{FluxUnits, SourceUnits};

/// A point in 3D space.
pub type Point3 = nalgebra::Point3<f64>;

/// A vector in 3D space.
pub type Vec3 = nalgebra::Vector3<f64>;

/// Default tolerance for the unit-norm check on direction cosines.
pub const DIRECTION_TOLERANCE: f64 = 1e-3;
