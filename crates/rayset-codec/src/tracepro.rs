//! TracePro binary ray files (`.tpr`).
//!
//! 64-byte little-endian header followed by fixed-width f32 records. This
//! is an independent contract, not a re-encoding of the Zemax layout:
//! positions are always millimeters, flux is always radiometric watts,
//! wavelengths are nanometers, and the wavelength field precedes flux in
//! each record. A uniform-flux flag drops the per-record flux field
//! entirely; every ray then carries `total_flux / ray_count`.

use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

use rayset_model::{
    FluxMode, FluxUnits, Point3, RayFileHeader, RayRecord, SourceUnits, TraceProExtra, Vec3,
    VendorExtra, WavelengthMode,
};

use crate::error::{short_header, FormatError, Result};
use crate::format::RayFormat;
use crate::layout::RecordLayout;
use crate::wire;

pub(crate) const HEADER_LEN: u64 = 64;

const MAGIC: [u8; 4] = *b"TPRS";
const VERSION: u32 = 1;

const COUNT_OFFSET: u64 = 8;
const TOTAL_FLUX_OFFSET: u64 = 16;

const FLAG_WAVELENGTH: u32 = 1;
const FLAG_POLARIZED: u32 = 1 << 1;
const FLAG_UNIFORM_FLUX: u32 = 1 << 2;
const KNOWN_FLAGS: u32 = FLAG_WAVELENGTH | FLAG_POLARIZED | FLAG_UNIFORM_FLUX;

/// Nanometers per micrometer; the model carries micrometers.
const NM_PER_UM: f64 = 1000.0;

pub(crate) fn layout_for(header: &RayFileHeader) -> RecordLayout {
    RecordLayout {
        wavelength: header.wavelength.is_per_ray(),
        flux: header.flux_mode == FluxMode::PerRay,
        stokes: header.polarized,
    }
}

pub(crate) fn read_header<R: Read>(r: &mut R) -> Result<RayFileHeader> {
    let mut buf = [0u8; HEADER_LEN as usize];
    r.read_exact(&mut buf)
        .map_err(|e| short_header(e, RayFormat::TraceProBinary))?;

    if buf[0..4] != MAGIC {
        return Err(FormatError::unsupported(
            "not a TracePro binary ray file (bad magic)",
        ));
    }
    let version = wire::u32_at(&buf, 4);
    if version != VERSION {
        return Err(FormatError::unsupported(format!(
            "unsupported TracePro format version {version}"
        )));
    }

    let flags = wire::u32_at(&buf, 28);
    if flags & !KNOWN_FLAGS != 0 {
        return Err(FormatError::unsupported(format!(
            "unknown TracePro flag bits {:#x}",
            flags & !KNOWN_FLAGS
        )));
    }

    let fixed_wavelength_nm = wire::f32_at(&buf, 24) as f64;
    let wavelength = if flags & FLAG_WAVELENGTH != 0 {
        WavelengthMode::PerRay
    } else {
        WavelengthMode::Fixed(fixed_wavelength_nm / NM_PER_UM)
    };
    let flux_mode = if flags & FLAG_UNIFORM_FLUX != 0 {
        FluxMode::Uniform
    } else {
        FluxMode::PerRay
    };

    Ok(RayFileHeader {
        source_units: SourceUnits::Millimeters,
        flux_units: FluxUnits::Watts,
        ray_count: wire::u64_at(&buf, 8),
        flux_mode,
        total_flux: wire::f64_at(&buf, 16),
        polarized: flags & FLAG_POLARIZED != 0,
        wavelength,
        extra: VendorExtra::TracePro(TraceProExtra {
            version,
            polar_beg: wire::f32_at(&buf, 32),
            polar_end: wire::f32_at(&buf, 36),
            azimuth_beg: wire::f32_at(&buf, 40),
            azimuth_end: wire::f32_at(&buf, 44),
        }),
    })
}

fn build_header(header: &RayFileHeader) -> Result<[u8; HEADER_LEN as usize]> {
    if header.flux_units != FluxUnits::Watts {
        return Err(FormatError::unsupported(format!(
            "TracePro binary carries radiometric watts; cannot encode {}",
            header.flux_units.name()
        )));
    }

    let mut flags = 0u32;
    let fixed_wavelength_nm = match header.wavelength {
        WavelengthMode::PerRay => {
            flags |= FLAG_WAVELENGTH;
            0.0
        }
        WavelengthMode::Fixed(um) => (um * NM_PER_UM) as f32,
    };
    if header.polarized {
        flags |= FLAG_POLARIZED;
    }
    if header.flux_mode == FluxMode::Uniform {
        flags |= FLAG_UNIFORM_FLUX;
    }

    let extra = header.extra.as_tracepro().cloned().unwrap_or_default();

    let mut buf = [0u8; HEADER_LEN as usize];
    buf[0..4].copy_from_slice(&MAGIC);
    wire::put_u32(&mut buf, 4, VERSION);
    // Ray count is patched with the true written count on finish.
    wire::put_u64(&mut buf, 8, 0);
    wire::put_f64(&mut buf, 16, header.total_flux);
    wire::put_f32(&mut buf, 24, fixed_wavelength_nm);
    wire::put_u32(&mut buf, 28, flags);
    wire::put_f32(&mut buf, 32, extra.polar_beg);
    wire::put_f32(&mut buf, 36, extra.polar_end);
    wire::put_f32(&mut buf, 40, extra.azimuth_beg);
    wire::put_f32(&mut buf, 44, extra.azimuth_end);
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
    uniform_flux: f64,
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
            uniform_flux: header.uniform_flux().unwrap_or(0.0),
            yielded: 0,
            offset: HEADER_LEN,
            finished: false,
        }
    }

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
        // Wavelength precedes flux in this format.
        let wavelength = self
            .layout
            .wavelength
            .then(|| wire::take_f32(&buf, &mut o) / NM_PER_UM);
        let flux = if self.layout.flux {
            wire::take_f32(&buf, &mut o)
        } else {
            self.uniform_flux
        };
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
    /// Source units to millimeters.
    unit_scale: f64,
}

impl<W: Write + Seek> Writer<W> {
    pub(crate) fn new(mut w: W, header: &RayFileHeader) -> Result<Self> {
        let buf = build_header(header)?;
        w.write_all(&buf)?;
        Ok(Self {
            w,
            layout: layout_for(header),
            unit_scale: header.source_units.to_millimeters(),
        })
    }

    pub(crate) fn write(&mut self, record: &RayRecord) -> Result<()> {
        let mut fields = [0f32; 12];
        let mut n = 0usize;
        for v in [
            record.position.x * self.unit_scale,
            record.position.y * self.unit_scale,
            record.position.z * self.unit_scale,
            record.direction.x,
            record.direction.y,
            record.direction.z,
        ] {
            fields[n] = v as f32;
            n += 1;
        }
        if self.layout.wavelength {
            let um = record
                .wavelength
                .ok_or(FormatError::RecordMismatch("missing wavelength"))?;
            fields[n] = (um * NM_PER_UM) as f32;
            n += 1;
        }
        if self.layout.flux {
            fields[n] = record.flux as f32;
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
        self.w.flush()?;
        self.w.seek(SeekFrom::Start(COUNT_OFFSET))?;
        self.w.write_all(&count.to_le_bytes())?;
        if let Some(total) = flux_total {
            self.w.seek(SeekFrom::Start(TOTAL_FLUX_OFFSET))?;
            self.w.write_all(&total.to_le_bytes())?;
        }
        self.w.flush()?;
        Ok(())
    }
}
