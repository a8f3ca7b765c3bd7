//! Plain ASCII ray files (`.txt`).
//!
//! A short block of `key: value` header lines followed by one
//! whitespace-delimited record per line in the fixed column order of the
//! active field set: `x y z l m n [flux] [wavelength] [s0 s1 s2 s3]`.
//! The ray count is a fixed-width zero-padded field so the true written
//! count can be patched in place after streaming. Text output preserves
//! field semantics but never round-trips bit-exactly to a binary format.

use std::io::{BufRead, Seek, SeekFrom, Write};

use rayset_model::{
    FluxMode, FluxUnits, Point3, RayFileHeader, RayRecord, SourceUnits, Vec3, VendorExtra,
    WavelengthMode,
};

use crate::error::{FormatError, Result};
use crate::layout::RecordLayout;

/// Width of the zero-padded ray count field.
const COUNT_WIDTH: usize = 10;
/// Byte offset of the count digits within the canonical first line.
const COUNT_OFFSET: u64 = 6;
/// Number of header lines.
const HEADER_LINES: u64 = 6;

pub(crate) fn layout_for(header: &RayFileHeader) -> RecordLayout {
    RecordLayout {
        wavelength: header.wavelength.is_per_ray(),
        flux: header.flux_mode == FluxMode::PerRay,
        stokes: header.polarized,
    }
}

pub(crate) fn read_header<R: BufRead>(r: &mut R) -> Result<RayFileHeader> {
    let mut ray_count: Option<u64> = None;
    let mut units: Option<SourceUnits> = None;
    let mut flux_units: Option<FluxUnits> = None;
    let mut flux_mode: Option<(FluxMode, f64)> = None;
    let mut wavelength: Option<WavelengthMode> = None;
    let mut polarized: Option<bool> = None;

    for line_no in 1..=HEADER_LINES {
        let mut line = String::new();
        if r.read_line(&mut line)? == 0 {
            return Err(FormatError::TruncatedHeader(crate::RayFormat::AsciiText));
        }
        let trimmed = line.trim();
        let (key, value) = trimmed.split_once(':').ok_or_else(|| {
            FormatError::malformed_text(line_no, "expected a `key: value` header line")
        })?;
        let value = value.trim();
        let duplicate = match key.trim() {
            "rays" => ray_count
                .replace(value.parse().map_err(|_| {
                    FormatError::malformed_text(line_no, format!("invalid ray count `{value}`"))
                })?)
                .is_some(),
            "units" => units
                .replace(SourceUnits::from_name(value).ok_or_else(|| {
                    FormatError::malformed_text(line_no, format!("unknown units `{value}`"))
                })?)
                .is_some(),
            "flux-units" => flux_units
                .replace(FluxUnits::from_name(value).ok_or_else(|| {
                    FormatError::malformed_text(line_no, format!("unknown flux units `{value}`"))
                })?)
                .is_some(),
            "flux-mode" => {
                let mode = if value == "per-ray" {
                    (FluxMode::PerRay, 0.0)
                } else if let Some(total) = value.strip_prefix("total") {
                    let total = total.trim().parse().map_err(|_| {
                        FormatError::malformed_text(
                            line_no,
                            format!("invalid total flux `{}`", total.trim()),
                        )
                    })?;
                    (FluxMode::Uniform, total)
                } else {
                    return Err(FormatError::malformed_text(
                        line_no,
                        format!("unknown flux mode `{value}`"),
                    ));
                };
                flux_mode.replace(mode).is_some()
            }
            "wavelength" => {
                let mode = if value == "per-ray" {
                    WavelengthMode::PerRay
                } else if let Some(um) = value.strip_prefix("fixed") {
                    WavelengthMode::Fixed(um.trim().parse().map_err(|_| {
                        FormatError::malformed_text(
                            line_no,
                            format!("invalid wavelength `{}`", um.trim()),
                        )
                    })?)
                } else {
                    return Err(FormatError::malformed_text(
                        line_no,
                        format!("unknown wavelength mode `{value}`"),
                    ));
                };
                wavelength.replace(mode).is_some()
            }
            "polarization" => polarized
                .replace(match value {
                    "stokes" => true,
                    "none" => false,
                    other => {
                        return Err(FormatError::malformed_text(
                            line_no,
                            format!("unknown polarization `{other}`"),
                        ))
                    }
                })
                .is_some(),
            other => {
                return Err(FormatError::malformed_text(
                    line_no,
                    format!("unknown header key `{other}`"),
                ))
            }
        };
        if duplicate {
            return Err(FormatError::malformed_text(
                line_no,
                "duplicate header key",
            ));
        }
    }

    let missing = |key: &str| FormatError::malformed_text(HEADER_LINES, format!("missing header key `{key}`"));
    let (flux_mode, total_from_mode) = flux_mode.ok_or_else(|| missing("flux-mode"))?;
    Ok(RayFileHeader {
        source_units: units.ok_or_else(|| missing("units"))?,
        flux_units: flux_units.ok_or_else(|| missing("flux-units"))?,
        ray_count: ray_count.ok_or_else(|| missing("rays"))?,
        flux_mode,
        total_flux: total_from_mode,
        polarized: polarized.ok_or_else(|| missing("polarization"))?,
        wavelength: wavelength.ok_or_else(|| missing("wavelength"))?,
        extra: VendorExtra::None,
    })
}

/// Lazy record stream for one decoded file.
#[derive(Debug)]
pub(crate) struct RecordDecoder<R: BufRead> {
    r: R,
    layout: RecordLayout,
    declared: u64,
    uniform_flux: f64,
    yielded: u64,
    line: u64,
    finished: bool,
}

impl<R: BufRead> RecordDecoder<R> {
    pub(crate) fn new(r: R, header: &RayFileHeader) -> Self {
        Self {
            r,
            layout: layout_for(header),
            declared: header.ray_count,
            uniform_flux: header.uniform_flux().unwrap_or(0.0),
            yielded: 0,
            line: HEADER_LINES,
            finished: false,
        }
    }

    /// Next non-blank line, or `None` at end of input.
    fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            let mut line = String::new();
            if self.r.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            self.line += 1;
            if !line.trim().is_empty() {
                return Ok(Some(line));
            }
        }
    }

    fn check_trailing(&mut self) -> Result<()> {
        let mut extras = 0u64;
        while self.next_line()?.is_some() {
            extras += 1;
        }
        if extras == 0 {
            Ok(())
        } else {
            Err(FormatError::HeaderMismatch {
                declared: self.declared,
                actual: self.declared + extras,
            })
        }
    }

    fn parse_record(&self, line: &str) -> Result<RayRecord> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let expected = self.layout.field_count();
        if fields.len() != expected {
            return Err(FormatError::malformed_text(
                self.line,
                format!("expected {expected} fields, found {}", fields.len()),
            ));
        }
        let mut values = Vec::with_capacity(expected);
        for field in &fields {
            values.push(field.parse::<f64>().map_err(|_| {
                FormatError::malformed_text(self.line, format!("invalid number `{field}`"))
            })?);
        }

        let mut o = 0usize;
        let mut take = || {
            let v = values[o];
            o += 1;
            v
        };
        let position = Point3::new(take(), take(), take());
        let direction = Vec3::new(take(), take(), take());
        let flux = if self.layout.flux {
            take()
        } else {
            self.uniform_flux
        };
        let wavelength = self.layout.wavelength.then(&mut take);
        let stokes = if self.layout.stokes {
            Some([take(), take(), take(), take()])
        } else {
            None
        };
        Ok(RayRecord {
            position,
            direction,
            flux,
            wavelength,
            stokes,
        })
    }
}

impl<R: BufRead> Iterator for RecordDecoder<R> {
    type Item = Result<RayRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.yielded == self.declared {
            self.finished = true;
            return match self.check_trailing() {
                Ok(()) => None,
                Err(e) => Some(Err(e)),
            };
        }
        let line = match self.next_line() {
            Ok(Some(line)) => line,
            Ok(None) => {
                self.finished = true;
                return Some(Err(FormatError::HeaderMismatch {
                    declared: self.declared,
                    actual: self.yielded,
                }));
            }
            Err(e) => {
                self.finished = true;
                return Some(Err(e));
            }
        };
        match self.parse_record(&line) {
            Ok(record) => {
                self.yielded += 1;
                Some(Ok(record))
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Streaming encoder for one target file.
pub(crate) struct Writer<W: Write + Seek> {
    w: W,
    layout: RecordLayout,
    count_offset: u64,
}

impl<W: Write + Seek> Writer<W> {
    pub(crate) fn new(mut w: W, header: &RayFileHeader) -> Result<Self> {
        let start = w.stream_position()?;
        writeln!(w, "rays: {:0width$}", 0, width = COUNT_WIDTH)?;
        writeln!(w, "units: {}", header.source_units.name())?;
        writeln!(w, "flux-units: {}", header.flux_units.name())?;
        match header.flux_mode {
            FluxMode::PerRay => writeln!(w, "flux-mode: per-ray")?,
            FluxMode::Uniform => writeln!(w, "flux-mode: total {:.6e}", header.total_flux)?,
        }
        match header.wavelength {
            WavelengthMode::PerRay => writeln!(w, "wavelength: per-ray")?,
            WavelengthMode::Fixed(um) => writeln!(w, "wavelength: fixed {um:.6}")?,
        }
        writeln!(
            w,
            "polarization: {}",
            if header.polarized { "stokes" } else { "none" }
        )?;
        Ok(Self {
            w,
            layout: layout_for(header),
            count_offset: start + COUNT_OFFSET,
        })
    }

    pub(crate) fn write(&mut self, record: &RayRecord) -> Result<()> {
        let mut line = format!(
            "{:.6} {:.6} {:.6} {:.6} {:.6} {:.6}",
            record.position.x,
            record.position.y,
            record.position.z,
            record.direction.x,
            record.direction.y,
            record.direction.z,
        );
        if self.layout.flux {
            line.push_str(&format!(" {:.6e}", record.flux));
        }
        if self.layout.wavelength {
            let um = record
                .wavelength
                .ok_or(FormatError::RecordMismatch("missing wavelength"))?;
            line.push_str(&format!(" {um:.6}"));
        }
        if self.layout.stokes {
            let stokes = record
                .stokes
                .ok_or(FormatError::RecordMismatch("missing Stokes parameters"))?;
            for v in stokes {
                line.push_str(&format!(" {v:.6}"));
            }
        }
        writeln!(self.w, "{line}")?;
        Ok(())
    }

    pub(crate) fn finish(&mut self, count: u64, _flux_total: Option<f64>) -> Result<()> {
        // A uniform-flux total written up front stays correct under flux
        // rescaling (k * (F/N) * (N/k) == F), so only the count needs a patch.
        if count >= 10u64.pow(COUNT_WIDTH as u32) {
            return Err(FormatError::unsupported(format!(
                "ray count {count} exceeds the ASCII header field width"
            )));
        }
        self.w.flush()?;
        self.w.seek(SeekFrom::Start(self.count_offset))?;
        write!(self.w, "{count:0width$}", width = COUNT_WIDTH)?;
        self.w.flush()?;
        Ok(())
    }
}
