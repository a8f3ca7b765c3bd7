//! Zemax binary ray source files (`.dat`).
//!
//! 208-byte little-endian header followed by fixed-width f32 records.
//! Field order per record: x y z l m n flux, then wavelength (micrometers)
//! for spectral files, then four Stokes parameters for polarized files.
//! Flux is always per-ray in this format.

use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

use rayset_model::{
    FluxMode, FluxUnits, Point3, RayFileHeader, RayRecord, SourceUnits, Vec3, VendorExtra,
    WavelengthMode, ZemaxExtra,
};

use crate::error::{short_header, FormatError, Result};
use crate::format::RayFormat;
use crate::layout::RecordLayout;
use crate::wire;

pub(crate) const HEADER_LEN: u64 = 208;

const IDENTIFIER_CLASSIC: i32 = 1010;
const IDENTIFIER_ALT: i32 = 8675309;

const COUNT_OFFSET: u64 = 4;
const SOURCE_FLUX_OFFSET: u64 = 108;
const RAY_SET_FLUX_OFFSET: u64 = 112;

/// Zemax rejects rays with zero or negative flux; written flux is floored
/// to this value.
const FLUX_FLOOR: f32 = 1e-30;

pub(crate) fn layout_for(header: &RayFileHeader) -> RecordLayout {
    RecordLayout {
        wavelength: header.wavelength.is_per_ray(),
        flux: true,
        stokes: header.polarized,
    }
}

fn unit_code(units: SourceUnits) -> i32 {
    match units {
        SourceUnits::Millimeters => 0,
        SourceUnits::Centimeters => 1,
        SourceUnits::Meters => 2,
        SourceUnits::Inches => 3,
        SourceUnits::Feet => 4,
    }
}

fn units_from_code(code: i32) -> Option<SourceUnits> {
    match code {
        0 => Some(SourceUnits::Millimeters),
        1 => Some(SourceUnits::Centimeters),
        2 => Some(SourceUnits::Meters),
        3 => Some(SourceUnits::Inches),
        4 => Some(SourceUnits::Feet),
        _ => None,
    }
}

pub(crate) fn read_header<R: Read>(r: &mut R) -> Result<RayFileHeader> {
    let mut buf = [0u8; HEADER_LEN as usize];
    r.read_exact(&mut buf)
        .map_err(|e| short_header(e, RayFormat::ZemaxBinary))?;

    let identifier = wire::i32_at(&buf, 0);
    if identifier != IDENTIFIER_CLASSIC && identifier != IDENTIFIER_ALT {
        return Err(FormatError::unsupported(format!(
            "unrecognized Zemax file identifier {identifier}"
        )));
    }

    let declared = wire::i32_at(&buf, 4);
    if declared < 0 {
        return Err(FormatError::unsupported(format!(
            "negative declared ray count {declared}"
        )));
    }

    let mut description = [0u8; 100];
    description.copy_from_slice(&buf[8..108]);

    let units_code = wire::i32_at(&buf, 136);
    let source_units = units_from_code(units_code).ok_or_else(|| {
        FormatError::unsupported(format!("unrecognized Zemax dimension units code {units_code}"))
    })?;

    let format_type = wire::i32_at(&buf, 192);
    let flux_type = wire::i32_at(&buf, 196);
    let fixed_wavelength = wire::f32_at(&buf, 116) as f64;
    let (wavelength, flux_units) = match format_type {
        0 => {
            let flux_units = match flux_type {
                0 => FluxUnits::Watts,
                1 => FluxUnits::Lumens,
                other => {
                    return Err(FormatError::unsupported(format!(
                        "unrecognized Zemax flux type {other}"
                    )))
                }
            };
            (WavelengthMode::Fixed(fixed_wavelength), flux_units)
        }
        2 => {
            if flux_type != 0 {
                return Err(FormatError::unsupported(format!(
                    "Zemax spectral files carry radiometric flux, found flux type {flux_type}"
                )));
            }
            (WavelengthMode::PerRay, FluxUnits::Watts)
        }
        other => {
            return Err(FormatError::unsupported(format!(
                "unrecognized Zemax ray format type {other}"
            )))
        }
    };

    let polarization_word = wire::i32_at(&buf, 200);

    let extra = ZemaxExtra {
        identifier,
        description,
        source_flux: wire::f32_at(&buf, 108),
        azimuth_beg: wire::f32_at(&buf, 120),
        azimuth_end: wire::f32_at(&buf, 124),
        polar_beg: wire::f32_at(&buf, 128),
        polar_end: wire::f32_at(&buf, 132),
        location: [
            wire::f32_at(&buf, 140),
            wire::f32_at(&buf, 144),
            wire::f32_at(&buf, 148),
        ],
        rotation: [
            wire::f32_at(&buf, 152),
            wire::f32_at(&buf, 156),
            wire::f32_at(&buf, 160),
        ],
        scale: [
            wire::f32_at(&buf, 164),
            wire::f32_at(&buf, 168),
            wire::f32_at(&buf, 172),
        ],
        unused: [
            wire::f32_at(&buf, 176),
            wire::f32_at(&buf, 180),
            wire::f32_at(&buf, 184),
            wire::f32_at(&buf, 188),
        ],
        polarization_word,
        reserved: wire::i32_at(&buf, 204),
    };

    Ok(RayFileHeader {
        source_units,
        flux_units,
        ray_count: declared as u64,
        flux_mode: FluxMode::PerRay,
        total_flux: wire::f32_at(&buf, 112) as f64,
        polarized: polarization_word != 0,
        wavelength,
        extra: VendorExtra::Zemax(extra),
    })
}

fn build_header(header: &RayFileHeader) -> Result<[u8; HEADER_LEN as usize]> {
    let flux_type = match (header.wavelength.is_per_ray(), header.flux_units) {
        (_, FluxUnits::Other) => {
            return Err(FormatError::unsupported(
                "Zemax files cannot carry unspecified flux units",
            ))
        }
        (true, FluxUnits::Lumens) => {
            return Err(FormatError::unsupported(
                "Zemax spectral files carry radiometric flux; cannot encode lumens",
            ))
        }
        (_, FluxUnits::Watts) => 0,
        (false, FluxUnits::Lumens) => 1,
    };
    let format_type = if header.wavelength.is_per_ray() { 2 } else { 0 };
    let fixed_wavelength = match header.wavelength {
        WavelengthMode::Fixed(w) => w as f32,
        WavelengthMode::PerRay => 0.0,
    };
    let extra = header.extra.as_zemax().cloned().unwrap_or_default();
    let polarization_word = match (header.polarized, extra.polarization_word) {
        (false, _) => 0,
        (true, 0) => 1,
        (true, word) => word,
    };

    let mut buf = [0u8; HEADER_LEN as usize];
    wire::put_i32(&mut buf, 0, extra.identifier);
    // Ray count is patched with the true written count on finish.
    wire::put_i32(&mut buf, 4, 0);
    buf[8..108].copy_from_slice(&extra.description);
    wire::put_f32(&mut buf, 108, extra.source_flux);
    wire::put_f32(&mut buf, 112, header.total_flux as f32);
    wire::put_f32(&mut buf, 116, fixed_wavelength);
    wire::put_f32(&mut buf, 120, extra.azimuth_beg);
    wire::put_f32(&mut buf, 124, extra.azimuth_end);
    wire::put_f32(&mut buf, 128, extra.polar_beg);
    wire::put_f32(&mut buf, 132, extra.polar_end);
    wire::put_i32(&mut buf, 136, unit_code(header.source_units));
    for (i, v) in extra.location.iter().enumerate() {
        wire::put_f32(&mut buf, 140 + 4 * i, *v);
    }
    for (i, v) in extra.rotation.iter().enumerate() {
        wire::put_f32(&mut buf, 152 + 4 * i, *v);
    }
    for (i, v) in extra.scale.iter().enumerate() {
        wire::put_f32(&mut buf, 164 + 4 * i, *v);
    }
    for (i, v) in extra.unused.iter().enumerate() {
        wire::put_f32(&mut buf, 176 + 4 * i, *v);
    }
    wire::put_i32(&mut buf, 192, format_type);
    wire::put_i32(&mut buf, 196, flux_type);
    wire::put_i32(&mut buf, 200, polarization_word);
    wire::put_i32(&mut buf, 204, extra.reserved);
    Ok(buf)
}

/// Check a known body length against the header before streaming.
pub(crate) fn validate_body_len(header: &RayFileHeader, byte_len: u64) -> Result<()> {
    let width = layout_for(header).width_bytes();
    let body = byte_len.saturating_sub(HEADER_LEN);
    let whole = body - body % width;
    if body % width != 0 {
        return Err(FormatError::TruncatedRecord {
            offset: HEADER_LEN + whole,
        });
    }
    if body / width != header.ray_count {
        return Err(FormatError::HeaderMismatch {
            declared: header.ray_count,
            actual: body / width,
        });
    }
    Ok(())
}

/// Lazy record stream for one decoded file.
#[derive(Debug)]
pub(crate) struct RecordDecoder<R: Read> {
    r: R,
    layout: RecordLayout,
    declared: u64,
    yielded: u64,
    offset: u64,
    finished: bool,
}

impl<R: Read> RecordDecoder<R> {
    pub(crate) fn new(r: R, header: &RayFileHeader) -> Self {
        Self {
            r,
            layout: layout_for(header),
            declared: header.ray_count,
            yielded: 0,
            offset: HEADER_LEN,
            finished: false,
        }
    }

    /// After the declared count is exhausted the body must be exhausted too.
    fn check_trailing(&mut self) -> Result<()> {
        let width = self.layout.width_bytes();
        let mut trailing = 0u64;
        let mut buf = [0u8; 4096];
        loop {
            match self.r.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => trailing += n as u64,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if trailing == 0 {
            Ok(())
        } else if trailing % width != 0 {
            Err(FormatError::TruncatedRecord {
                offset: self.offset + trailing - trailing % width,
            })
        } else {
            Err(FormatError::HeaderMismatch {
                declared: self.declared,
                actual: self.declared + trailing / width,
            })
        }
    }

    fn read_record(&mut self) -> Result<RayRecord> {
        let width = self.layout.width_bytes() as usize;
        let mut buf = [0u8; 48];
        self.r.read_exact(&mut buf[..width]).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                FormatError::TruncatedRecord {
                    offset: self.offset,
                }
            } else {
                FormatError::Io(e)
            }
        })?;

        let mut o = 0usize;
        let position = Point3::new(
            wire::take_f32(&buf, &mut o),
            wire::take_f32(&buf, &mut o),
            wire::take_f32(&buf, &mut o),
        );
        let direction = Vec3::new(
            wire::take_f32(&buf, &mut o),
            wire::take_f32(&buf, &mut o),
            wire::take_f32(&buf, &mut o),
        );
        let flux = wire::take_f32(&buf, &mut o);
        let wavelength = self
            .layout
            .wavelength
            .then(|| wire::take_f32(&buf, &mut o));
        let stokes = self.layout.stokes.then(|| {
            [
                wire::take_f32(&buf, &mut o),
                wire::take_f32(&buf, &mut o),
                wire::take_f32(&buf, &mut o),
                wire::take_f32(&buf, &mut o),
            ]
        });

        self.offset += width as u64;
        self.yielded += 1;
        Ok(RayRecord {
            position,
            direction,
            flux,
            wavelength,
            stokes,
        })
    }
}

impl<R: Read> Iterator for RecordDecoder<R> {
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
        match self.read_record() {
            Ok(record) => Some(Ok(record)),
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Streaming encoder for one target file.
#[derive(Debug)]
pub(crate) struct Writer<W: Write + Seek> {
    w: W,
    layout: RecordLayout,
}

impl<W: Write + Seek> Writer<W> {
    pub(crate) fn new(mut w: W, header: &RayFileHeader) -> Result<Self> {
        let buf = build_header(header)?;
        w.write_all(&buf)?;
        Ok(Self {
            w,
            layout: layout_for(header),
        })
    }

    pub(crate) fn write(&mut self, record: &RayRecord) -> Result<()> {
        let mut fields = [0f32; 12];
        let mut n = 0usize;
        for v in [
            record.position.x,
            record.position.y,
            record.position.z,
            record.direction.x,
            record.direction.y,
            record.direction.z,
        ] {
            fields[n] = v as f32;
            n += 1;
        }
        fields[n] = sanitize_flux(record.flux);
        n += 1;
        if self.layout.wavelength {
            let w = record
                .wavelength
                .ok_or(FormatError::RecordMismatch("missing wavelength"))?;
            fields[n] = w as f32;
            n += 1;
        }
        if self.layout.stokes {
            let stokes = record
                .stokes
                .ok_or(FormatError::RecordMismatch("missing Stokes parameters"))?;
            for v in stokes {
                fields[n] = v as f32;
                n += 1;
            }
        }
        for v in &fields[..n] {
            self.w.write_all(&v.to_le_bytes())?;
        }
        Ok(())
    }

    pub(crate) fn finish(&mut self, count: u64, flux_total: Option<f64>) -> Result<()> {
        if count > i32::MAX as u64 {
            return Err(FormatError::unsupported(format!(
                "ray count {count} exceeds the Zemax format limit"
            )));
        }
        self.w.flush()?;
        self.w.seek(SeekFrom::Start(COUNT_OFFSET))?;
        self.w.write_all(&(count as i32).to_le_bytes())?;
        if let Some(total) = flux_total {
            self.w.seek(SeekFrom::Start(SOURCE_FLUX_OFFSET))?;
            self.w.write_all(&(total as f32).to_le_bytes())?;
            self.w.seek(SeekFrom::Start(RAY_SET_FLUX_OFFSET))?;
            self.w.write_all(&(total as f32).to_le_bytes())?;
        }
        self.w.flush()?;
        Ok(())
    }
}

fn sanitize_flux(flux: f64) -> f32 {
    let f = flux as f32;
    if !f.is_finite() || f <= 0.0 {
        FLUX_FLOOR
    } else {
        f
    }
}
