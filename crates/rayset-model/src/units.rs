//! Physical unit enumerations shared by all ray file formats.

use serde::{Deserialize, Serialize};

/// Length unit of ray positions in a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SourceUnits {
    /// Millimeters.
    #[default]
    Millimeters,
    /// Centimeters.
    Centimeters,
    /// Meters.
    Meters,
    /// Inches (25.4 mm).
    Inches,
    /// Feet (304.8 mm).
    Feet,
}

impl SourceUnits {
    /// Conversion factor from this unit to millimeters.
    pub fn to_millimeters(self) -> f64 {
        match self {
            SourceUnits::Millimeters => 1.0,
            SourceUnits::Centimeters => 10.0,
            SourceUnits::Meters => 1000.0,
            SourceUnits::Inches => 25.4,
            SourceUnits::Feet => 304.8,
        }
    }

    /// Conversion factor from this unit to `other`.
    pub fn scale_to(self, other: SourceUnits) -> f64 {
        self.to_millimeters() / other.to_millimeters()
    }

    /// Short lowercase name used in text headers and CLI output.
    pub fn name(self) -> &'static str {
        match self {
            SourceUnits::Millimeters => "mm",
            SourceUnits::Centimeters => "cm",
            SourceUnits::Meters => "m",
            SourceUnits::Inches => "in",
            SourceUnits::Feet => "ft",
        }
    }

    /// Parse the short name produced by [`SourceUnits::name`].
    pub fn from_name(name: &str) -> Option<SourceUnits> {
        match name {
            "mm" => Some(SourceUnits::Millimeters),
            "cm" => Some(SourceUnits::Centimeters),
            "m" => Some(SourceUnits::Meters),
            "in" => Some(SourceUnits::Inches),
            "ft" => Some(SourceUnits::Feet),
            _ => None,
        }
    }
}

/// Flux metric of the per-ray (or total) flux values in a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FluxUnits {
    /// Radiometric watts.
    #[default]
    Watts,
    /// Photometric lumens.
    Lumens,
    /// Anything else; echoed unchanged, never converted.
    Other,
}

impl FluxUnits {
    /// Short lowercase name used in text headers and CLI output.
    pub fn name(self) -> &'static str {
        match self {
            FluxUnits::Watts => "watts",
            FluxUnits::Lumens => "lumens",
            FluxUnits::Other => "other",
        }
    }

    /// Parse the short name produced by [`FluxUnits::name`].
    pub fn from_name(name: &str) -> Option<FluxUnits> {
        match name {
            "watts" => Some(FluxUnits::Watts),
            "lumens" => Some(FluxUnits::Lumens),
            "other" => Some(FluxUnits::Other),
            _ => None,
        }
    }
}
