#![warn(missing_docs)]

//! Ray file format codecs.
//!
//! Each supported format gets its own module implementing the same
//! capability set: decode a header, stream records lazily, encode a header,
//! stream records out, and patch the true written count back on finish.
//! [`RayReader`] and [`RayWriter`] dispatch over the [`RayFormat`] tag so
//! callers never touch a format module directly.
//!
//! Decoded record sequences are finite and single-pass; re-reading a source
//! means re-invoking decode. Writers recompute the declared ray count from
//! what was actually written rather than trusting a count carried over from
//! the source header.
//!
//! # Example
//!
//! ```no_run
//! use rayset_codec::{RayFormat, RayReader, RayWriter};
//!
//! let mut reader = RayReader::open("source.dat", RayFormat::ZemaxBinary).unwrap();
//! let header = reader.header().clone();
//! let mut writer = RayWriter::create("target.txt", RayFormat::AsciiText, &header).unwrap();
//! for record in reader {
//!     writer.write_record(&record.unwrap()).unwrap();
//! }
//! let summary = writer.finish().unwrap();
//! println!("wrote {} rays", summary.records_written);
//! ```

mod ascii;
mod error;
mod format;
mod layout;
mod reader;
mod tracepro;
mod tracepro_ascii;
mod wire;
mod writer;
mod zemax;

pub use error::{FormatError, Result};
pub use format::RayFormat;
pub use reader::RayReader;
pub use writer::{RayWriter, WriteSummary};
