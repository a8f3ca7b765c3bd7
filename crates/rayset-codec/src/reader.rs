//! Format-dispatched decoding.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use rayset_model::{RayFileHeader, RayRecord};

use crate::error::{FormatError, Result};
use crate::format::RayFormat;
use crate::{ascii, tracepro, zemax};

/// Streaming decoder for one ray file.
///
/// The header is decoded eagerly; records are decoded lazily as the reader
/// is iterated. The sequence is finite and single-pass: re-reading a source
/// requires opening a new reader.
#[derive(Debug)]
pub struct RayReader<R: BufRead> {
    header: RayFileHeader,
    inner: Inner<R>,
}

#[derive(Debug)]
enum Inner<R: BufRead> {
    Zemax(zemax::RecordDecoder<R>),
    TracePro(tracepro::RecordDecoder<R>),
    Ascii(ascii::RecordDecoder<R>),
}

impl RayReader<BufReader<File>> {
    /// Open a file and decode its header.
    ///
    /// The file length is passed to the codec so binary formats can validate
    /// the body length against the declared ray count up front.
    pub fn open(path: impl AsRef<Path>, format: RayFormat) -> Result<Self> {
        let path = path.as_ref();
        let len = std::fs::metadata(path)?.len();
        let file = File::open(path)?;
        Self::new(format, BufReader::new(file), Some(len))
    }
}

impl<R: BufRead> RayReader<R> {
    /// Decode a header from `reader` and prepare the record stream.
    ///
    /// `byte_len`, when known, lets the binary codecs reject truncated or
    /// miscounted bodies before any record is read; streaming detection
    /// still applies either way.
    pub fn new(format: RayFormat, mut reader: R, byte_len: Option<u64>) -> Result<Self> {
        match format {
            RayFormat::ZemaxBinary => {
                let header = zemax::read_header(&mut reader)?;
                if let Some(len) = byte_len {
                    zemax::validate_body_len(&header, len)?;
                }
                Ok(Self {
                    inner: Inner::Zemax(zemax::RecordDecoder::new(reader, &header)),
                    header,
                })
            }
            RayFormat::TraceProBinary => {
                let header = tracepro::read_header(&mut reader)?;
                if let Some(len) = byte_len {
                    tracepro::validate_body_len(&header, len)?;
                }
                Ok(Self {
                    inner: Inner::TracePro(tracepro::RecordDecoder::new(reader, &header)),
                    header,
                })
            }
            RayFormat::AsciiText => {
                let header = ascii::read_header(&mut reader)?;
                Ok(Self {
                    inner: Inner::Ascii(ascii::RecordDecoder::new(reader, &header)),
                    header,
                })
            }
            RayFormat::TraceProAscii => Err(FormatError::DecodeUnsupported(format)),
        }
    }

    /// The decoded header.
    pub fn header(&self) -> &RayFileHeader {
        &self.header
    }
}

impl<R: BufRead> Iterator for RayReader<R> {
    type Item = Result<RayRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            Inner::Zemax(decoder) => decoder.next(),
            Inner::TracePro(decoder) => decoder.next(),
            Inner::Ascii(decoder) => decoder.next(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::RayWriter;
    use rayset_model::{Point3, RayRecord, Vec3};
    use std::io::Cursor;

    fn sample_file(format: RayFormat, count: u64) -> Vec<u8> {
        let header = RayFileHeader {
            ray_count: count,
            total_flux: count as f64,
            ..Default::default()
        };
        let mut buf = Vec::new();
        let mut writer = RayWriter::new(format, Cursor::new(&mut buf), &header).unwrap();
        for i in 0..count {
            writer
                .write_record(&RayRecord::new(
                    Point3::new(i as f64, 0.0, 0.0),
                    Vec3::new(0.0, 0.0, 1.0),
                    1.0,
                ))
                .unwrap();
        }
        writer.finish().unwrap();
        buf
    }

    #[test]
    fn test_dispatch_all_decodable_formats() {
        for format in [
            RayFormat::ZemaxBinary,
            RayFormat::TraceProBinary,
            RayFormat::AsciiText,
        ] {
            let bytes = sample_file(format, 3);
            let len = bytes.len() as u64;
            let reader = RayReader::new(format, Cursor::new(&bytes), Some(len)).unwrap();
            assert_eq!(reader.header().ray_count, 3);
            let records: Vec<_> = reader.map(|r| r.unwrap()).collect();
            assert_eq!(records.len(), 3, "format {format}");
            assert_eq!(records[2].position.x, 2.0);
        }
    }

    #[test]
    fn test_tracepro_ascii_not_decodable() {
        let err = RayReader::new(
            RayFormat::TraceProAscii,
            Cursor::new(Vec::new()),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, FormatError::DecodeUnsupported(_)));
    }

    #[test]
    fn test_open_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rays.dat");
        std::fs::write(&path, sample_file(RayFormat::ZemaxBinary, 2)).unwrap();

        let reader = RayReader::open(&path, RayFormat::ZemaxBinary).unwrap();
        assert_eq!(reader.header().ray_count, 2);
        assert_eq!(reader.count(), 2);
    }

    #[test]
    fn test_open_rejects_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rays.dat");
        let mut bytes = sample_file(RayFormat::ZemaxBinary, 2);
        bytes.truncate(bytes.len() - 5);
        std::fs::write(&path, bytes).unwrap();

        let err = RayReader::open(&path, RayFormat::ZemaxBinary).unwrap_err();
        assert!(matches!(err, FormatError::TruncatedRecord { .. }));
    }
}
