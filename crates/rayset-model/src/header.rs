//! Ray file header: everything about a file except its records.

use crate::units::{FluxUnits, SourceUnits};

/// How per-ray flux is stored in a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FluxMode {
    /// Every record carries its own flux field.
    #[default]
    PerRay,
    /// Records omit the flux field; each ray carries
    /// `total_flux / ray_count`.
    Uniform,
}

/// How wavelength is stored in a file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WavelengthMode {
    /// One header-level wavelength in micrometers; 0.0 means unspecified.
    Fixed(f64),
    /// Every record carries its own wavelength field.
    PerRay,
}

impl WavelengthMode {
    /// Whether records carry a wavelength field under this mode.
    pub fn is_per_ray(&self) -> bool {
        matches!(self, WavelengthMode::PerRay)
    }
}

impl Default for WavelengthMode {
    fn default() -> Self {
        WavelengthMode::Fixed(0.0)
    }
}

/// Header fields the model does not interpret but a same-format round trip
/// must reproduce byte for byte. Codecs default these when encoding across
/// formats.
#[derive(Debug, Clone, PartialEq)]
pub enum VendorExtra {
    /// No vendor block (ASCII sources).
    None,
    /// Zemax binary echo block.
    Zemax(ZemaxExtra),
    /// TracePro binary echo block.
    TracePro(TraceProExtra),
}

impl VendorExtra {
    /// The Zemax echo block, if this header came from a Zemax file.
    pub fn as_zemax(&self) -> Option<&ZemaxExtra> {
        match self {
            VendorExtra::Zemax(extra) => Some(extra),
            _ => None,
        }
    }

    /// The TracePro echo block, if this header came from a TracePro file.
    pub fn as_tracepro(&self) -> Option<&TraceProExtra> {
        match self {
            VendorExtra::TracePro(extra) => Some(extra),
            _ => None,
        }
    }
}

impl Default for VendorExtra {
    fn default() -> Self {
        VendorExtra::None
    }
}

/// Uninterpreted fields of the Zemax binary header.
#[derive(Debug, Clone, PartialEq)]
pub struct ZemaxExtra {
    /// File identifier word (1010 or 8675309).
    pub identifier: i32,
    /// NUL-padded description text.
    pub description: [u8; 100],
    /// Declared source flux (distinct from the ray-set flux total).
    pub source_flux: f32,
    /// Azimuth angular range begin, degrees.
    pub azimuth_beg: f32,
    /// Azimuth angular range end, degrees.
    pub azimuth_end: f32,
    /// Polar angular range begin, degrees.
    pub polar_beg: f32,
    /// Polar angular range end, degrees.
    pub polar_end: f32,
    /// Source location.
    pub location: [f32; 3],
    /// Source rotation.
    pub rotation: [f32; 3],
    /// Source scale.
    pub scale: [f32; 3],
    /// Unused header words, echoed.
    pub unused: [f32; 4],
    /// Raw polarization flag word; any nonzero value means polarized and is
    /// echoed verbatim on re-encode.
    pub polarization_word: i32,
    /// Trailing reserved word, echoed.
    pub reserved: i32,
}

impl Default for ZemaxExtra {
    fn default() -> Self {
        let mut description = [0u8; 100];
        let text = b"rayset converted ray data";
        description[..text.len()].copy_from_slice(text);
        Self {
            identifier: 1010,
            description,
            source_flux: 0.0,
            azimuth_beg: 0.0,
            azimuth_end: 0.0,
            polar_beg: 0.0,
            polar_end: 0.0,
            location: [0.0; 3],
            rotation: [0.0; 3],
            scale: [1.0; 3],
            unused: [0.0; 4],
            polarization_word: 0,
            reserved: 0,
        }
    }
}

impl ZemaxExtra {
    /// Description text with NUL padding stripped, lossily decoded.
    pub fn description_text(&self) -> String {
        let end = self
            .description
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.description.len());
        String::from_utf8_lossy(&self.description[..end]).into_owned()
    }
}

/// Uninterpreted fields of the TracePro binary header.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceProExtra {
    /// Format version word.
    pub version: u32,
    /// Polar angular range begin, degrees.
    pub polar_beg: f32,
    /// Polar angular range end, degrees.
    pub polar_end: f32,
    /// Azimuth angular range begin, degrees.
    pub azimuth_beg: f32,
    /// Azimuth angular range end, degrees.
    pub azimuth_end: f32,
}

impl Default for TraceProExtra {
    fn default() -> Self {
        Self {
            version: 1,
            polar_beg: 0.0,
            polar_end: 180.0,
            azimuth_beg: 0.0,
            azimuth_end: 360.0,
        }
    }
}

/// Metadata of one ray file.
///
/// The flag fields (`flux_mode`, `polarized`, `wavelength`) fully determine
/// the record layout of the binary formats; codecs derive record width from
/// this header and never guess it from the data.
#[derive(Debug, Clone, Default)]
pub struct RayFileHeader {
    /// Length unit of record positions.
    pub source_units: SourceUnits,
    /// Flux metric of record flux values and `total_flux`.
    pub flux_units: FluxUnits,
    /// Declared record count; must match the body exactly.
    pub ray_count: u64,
    /// Whether flux is per-record or uniform across the file.
    pub flux_mode: FluxMode,
    /// Declared ray-set flux total.
    pub total_flux: f64,
    /// Whether records carry 4 Stokes parameters.
    pub polarized: bool,
    /// Per-ray or fixed wavelength, micrometers.
    pub wavelength: WavelengthMode,
    /// Vendor echo block for same-format round trips.
    pub extra: VendorExtra,
}

impl RayFileHeader {
    /// The flux every ray carries when `flux_mode` is uniform.
    ///
    /// Returns `None` for per-ray files, and 0.0 for an empty uniform file.
    pub fn uniform_flux(&self) -> Option<f64> {
        match self.flux_mode {
            FluxMode::PerRay => None,
            FluxMode::Uniform if self.ray_count == 0 => Some(0.0),
            FluxMode::Uniform => Some(self.total_flux / self.ray_count as f64),
        }
    }
}
