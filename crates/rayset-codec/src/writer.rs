//! Format-dispatched encoding.

use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use rayset_model::{RayFileHeader, RayRecord};

use crate::error::Result;
use crate::format::RayFormat;
use crate::{ascii, tracepro, tracepro_ascii, zemax};

/// What a finished writer actually produced.
#[derive(Debug, Clone, Copy)]
pub struct WriteSummary {
    /// Number of records written.
    pub records_written: u64,
    /// Sum of the written records' flux.
    pub flux_written: f64,
}

/// Streaming encoder for one target ray file.
///
/// The header is written on construction with a placeholder ray count;
/// [`RayWriter::finish`] patches the count actually written back into the
/// header, so a stale count carried over from a source header can never
/// leak into the output. Unit and flux conventions of the target format
/// are applied per record; raw field bytes are never copied across
/// formats.
pub struct RayWriter<W: Write + Seek> {
    inner: Inner<W>,
    written: u64,
    flux_sum: f64,
    recompute_flux: bool,
}

enum Inner<W: Write + Seek> {
    Zemax(zemax::Writer<W>),
    TracePro(tracepro::Writer<W>),
    Ascii(ascii::Writer<W>),
    TraceProAscii(tracepro_ascii::Writer<W>),
}

impl RayWriter<BufWriter<File>> {
    /// Create a file and write the target-format header for
    /// `source_header`'s flag set.
    pub fn create(
        path: impl AsRef<Path>,
        format: RayFormat,
        source_header: &RayFileHeader,
    ) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(format, BufWriter::new(file), source_header)
    }
}

impl<W: Write + Seek> RayWriter<W> {
    /// Write the target-format header for `source_header`'s flag set.
    ///
    /// Fails up front when the source flags cannot be represented in the
    /// target format (for example photometric flux in a TracePro file).
    pub fn new(format: RayFormat, w: W, source_header: &RayFileHeader) -> Result<Self> {
        let inner = match format {
            RayFormat::ZemaxBinary => Inner::Zemax(zemax::Writer::new(w, source_header)?),
            RayFormat::TraceProBinary => Inner::TracePro(tracepro::Writer::new(w, source_header)?),
            RayFormat::AsciiText => Inner::Ascii(ascii::Writer::new(w, source_header)?),
            RayFormat::TraceProAscii => {
                Inner::TraceProAscii(tracepro_ascii::Writer::new(w, source_header)?)
            }
        };
        Ok(Self {
            inner,
            written: 0,
            flux_sum: 0.0,
            recompute_flux: false,
        })
    }

    /// Also patch the header's flux totals from the accumulated written
    /// flux on finish. Enabled by the pipeline when it rescales flux;
    /// a pure format translation echoes the declared totals instead.
    pub fn recompute_flux_totals(&mut self, recompute: bool) {
        self.recompute_flux = recompute;
    }

    /// Encode one record.
    pub fn write_record(&mut self, record: &RayRecord) -> Result<()> {
        match &mut self.inner {
            Inner::Zemax(writer) => writer.write(record)?,
            Inner::TracePro(writer) => writer.write(record)?,
            Inner::Ascii(writer) => writer.write(record)?,
            Inner::TraceProAscii(writer) => writer.write(record)?,
        }
        self.written += 1;
        self.flux_sum += record.flux;
        Ok(())
    }

    /// Flush and patch the true written count (and flux totals when
    /// requested) back into the header.
    pub fn finish(mut self) -> Result<WriteSummary> {
        let flux_total = self.recompute_flux.then_some(self.flux_sum);
        match &mut self.inner {
            Inner::Zemax(writer) => writer.finish(self.written, flux_total)?,
            Inner::TracePro(writer) => writer.finish(self.written, flux_total)?,
            Inner::Ascii(writer) => writer.finish(self.written, flux_total)?,
            Inner::TraceProAscii(writer) => writer.finish(self.written, flux_total)?,
        }
        Ok(WriteSummary {
            records_written: self.written,
            flux_written: self.flux_sum,
        })
    }
}
