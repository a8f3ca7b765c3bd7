#![warn(missing_docs)]

//! Streaming ray file conversion and subsampling.
//!
//! This crate orchestrates the codecs and the sampler into one job:
//! decode a source ray file, optionally subsample it to a target ray
//! count with flux rescaling, and encode the result into a (possibly
//! different) target format. Records stream through in bounded memory;
//! progress flows to the caller over a one-way channel; cancellation is
//! cooperative and checked between record batches; a failed or cancelled
//! job never leaves a partial target file behind.
//!
//! The engine itself never logs or prints. Each [`convert`] invocation is
//! self-contained, so any number of jobs may run concurrently with no
//! shared state; [`ConvertJob::spawn`] puts one job on its own thread.
//!
//! # Example
//!
//! ```no_run
//! use rayset_pipeline::{convert, CancelToken, ConvertRequest, ConvertSettings, SampleMethod};
//! use rayset_codec::RayFormat;
//!
//! let request = ConvertRequest {
//!     source: "big.dat".into(),
//!     source_format: RayFormat::ZemaxBinary,
//!     target: "small.dat".into(),
//!     target_format: RayFormat::ZemaxBinary,
//!     target_rays: Some(50_000),
//!     seed: Some(42),
//!     method: SampleMethod::Random,
//! };
//! let report = convert(
//!     &request,
//!     &ConvertSettings::default(),
//!     None,
//!     &CancelToken::new(),
//! )
//! .unwrap();
//! println!("kept {} rays", report.records_written);
//! ```

mod cancel;
mod convert;
mod error;
mod progress;
mod settings;
mod worker;

pub use cancel::CancelToken;
pub use convert::{convert, ConvertReport, ConvertRequest, SampleMethod};
pub use error::{ConvertError, Result};
pub use progress::{JobState, Progress};
pub use settings::ConvertSettings;
pub use worker::ConvertJob;
