//! TracePro-importable ASCII ray files (`.dat`, output only).
//!
//! Comment headers, an angular-range/transform block, the column banner,
//! then one `%.6E` record per line in millimeters and watts. Only flux-only
//! record sets are representable; the format has no wavelength or
//! polarization columns.

use std::io::{Seek, Write};

use rayset_model::{FluxUnits, RayFileHeader, RayRecord};

use crate::error::{FormatError, Result};

/// Width of the patchable ray count fields.
const COUNT_WIDTH: usize = 10;

/// TracePro rejects rays with zero or negative flux; written flux is
/// floored to this value.
const FLUX_FLOOR: f64 = 1e-30;

/// Streaming encoder for one target file.
#[derive(Debug)]
pub(crate) struct Writer<W: Write + Seek> {
    w: W,
    /// Source units to millimeters.
    unit_scale: f64,
    generated_offset: u64,
}

impl<W: Write + Seek> Writer<W> {
    pub(crate) fn new(mut w: W, header: &RayFileHeader) -> Result<Self> {
        if header.flux_units != FluxUnits::Watts {
            return Err(FormatError::unsupported(format!(
                "TracePro ASCII carries radiometric watts; cannot encode {}",
                header.flux_units.name()
            )));
        }
        if header.wavelength.is_per_ray() {
            return Err(FormatError::unsupported(
                "TracePro ASCII carries flux-only records; cannot encode per-ray wavelengths",
            ));
        }
        if header.polarized {
            return Err(FormatError::unsupported(
                "TracePro ASCII carries flux-only records; cannot encode polarization",
            ));
        }

        let angles = header.extra.as_tracepro().cloned().unwrap_or_default();
        writeln!(w, "!! Ray data exported by rayset")?;
        let prefix = format!(
            "# NbrRays Requested: {:width$},  NbrRays Generated: ",
            header.ray_count,
            width = COUNT_WIDTH
        );
        w.write_all(prefix.as_bytes())?;
        let generated_offset = w.stream_position()?;
        writeln!(w, "{:width$}", 0, width = COUNT_WIDTH)?;
        writeln!(
            w,
            "Angular Range PolarBeg: {:8.4}, PolarEnd: {:8.4}, AzimuthBeg: {:8.4}, AzimuthEnd: {:8.4}",
            angles.polar_beg, angles.polar_end, angles.azimuth_beg, angles.azimuth_end
        )?;
        writeln!(w, "Rotation AboutX   0.0000, AboutY   0.0000, AboutZ   0.0000")?;
        writeln!(w, "Translation X   0.0000, Y   0.0000, Z   0.0000")?;
        writeln!(w, "Scale X   1.0000, Y   1.0000, Z   1.0000")?;
        // Positions are written in millimeters.
        writeln!(w, "Conversion Factor From Meters   1000.0000")?;
        writeln!(w, "X Pos Y Pos Z Pos X Vec Y Vec Z Vec Inc Flux")?;

        Ok(Self {
            w,
            unit_scale: header.source_units.to_millimeters(),
            generated_offset,
        })
    }

    pub(crate) fn write(&mut self, record: &RayRecord) -> Result<()> {
        let flux = record.flux;
        let flux = if !flux.is_finite() || flux <= 0.0 {
            FLUX_FLOOR
        } else {
            flux
        };
        writeln!(
            self.w,
            "{:.6E} {:.6E} {:.6E} {:.6E} {:.6E} {:.6E} {:.6E} ",
            record.position.x * self.unit_scale,
            record.position.y * self.unit_scale,
            record.position.z * self.unit_scale,
            record.direction.x,
            record.direction.y,
            record.direction.z,
            flux,
        )?;
        Ok(())
    }

    pub(crate) fn finish(&mut self, count: u64, _flux_total: Option<f64>) -> Result<()> {
        if count >= 10u64.pow(COUNT_WIDTH as u32) {
            return Err(FormatError::unsupported(format!(
                "ray count {count} exceeds the TracePro ASCII count field width"
            )));
        }
        self.w.flush()?;
        self.w
            .seek(std::io::SeekFrom::Start(self.generated_offset))?;
        write!(self.w, "{count:width$}", width = COUNT_WIDTH)?;
        self.w.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayset_model::{FluxMode, Point3, SourceUnits, Vec3, VendorExtra, WavelengthMode};
    use std::io::Cursor;

    fn sample_header(count: u64) -> RayFileHeader {
        RayFileHeader {
            source_units: SourceUnits::Millimeters,
            flux_units: FluxUnits::Watts,
            ray_count: count,
            flux_mode: FluxMode::PerRay,
            total_flux: 0.0,
            polarized: false,
            wavelength: WavelengthMode::Fixed(0.0),
            extra: VendorExtra::None,
        }
    }

    #[test]
    fn test_output_shape() {
        let header = sample_header(2);
        let mut buf = Vec::new();
        let mut writer = Writer::new(Cursor::new(&mut buf), &header).unwrap();
        writer
            .write(&RayRecord::new(
                Point3::new(1.0, 2.0, 3.0),
                Vec3::new(0.0, 0.0, 1.0),
                0.5,
            ))
            .unwrap();
        writer
            .write(&RayRecord::new(
                Point3::new(-1.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                0.0,
            ))
            .unwrap();
        writer.finish(2, None).unwrap();

        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("!! Ray data exported by rayset\n"));
        assert!(text.contains(&format!("NbrRays Generated: {:10}", 2)));
        assert!(text.contains("Angular Range PolarBeg:   0.0000, PolarEnd: 180.0000"));
        assert!(text.contains("Conversion Factor From Meters   1000.0000"));
        assert!(text.contains("X Pos Y Pos Z Pos X Vec Y Vec Z Vec Inc Flux"));
        // Zero flux is floored, never written as-is.
        assert!(text.contains("1.000000E-30"));

        let data_lines: Vec<&str> = text
            .lines()
            .filter(|l| l.split_whitespace().count() == 7 && l.contains('E'))
            .collect();
        assert_eq!(data_lines.len(), 2);
    }

    #[test]
    fn test_units_scaled_to_millimeters() {
        let mut header = sample_header(1);
        header.source_units = SourceUnits::Inches;
        let mut buf = Vec::new();
        let mut writer = Writer::new(Cursor::new(&mut buf), &header).unwrap();
        writer
            .write(&RayRecord::new(
                Point3::new(2.0, 0.0, 0.0),
                Vec3::new(0.0, 0.0, 1.0),
                1.0,
            ))
            .unwrap();
        writer.finish(1, None).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("5.080000E1"));
    }

    #[test]
    fn test_spectral_rejected() {
        let mut header = sample_header(1);
        header.wavelength = WavelengthMode::PerRay;
        let mut buf = Vec::new();
        let err = Writer::new(Cursor::new(&mut buf), &header).unwrap_err();
        assert!(matches!(err, FormatError::UnsupportedFlagCombination(_)));
    }

    #[test]
    fn test_lumens_rejected() {
        let mut header = sample_header(1);
        header.flux_units = FluxUnits::Lumens;
        let mut buf = Vec::new();
        let err = Writer::new(Cursor::new(&mut buf), &header).unwrap_err();
        assert!(matches!(err, FormatError::UnsupportedFlagCombination(_)));
    }
}
