//! The conversion job itself.

use std::fs;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use rayset_codec::{RayFormat, RayReader, RayWriter};
use rayset_sample::{SampleError, SelectionSet, StratifiedPlanner};

use crate::cancel::CancelToken;
use crate::error::{ConvertError, Result};
use crate::progress::{send_records, send_state, JobState, Progress};
use crate::settings::ConvertSettings;

/// How to choose which rays survive subsampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SampleMethod {
    /// Uniform random selection without replacement.
    #[default]
    Random,
    /// Flux-weighted angular stratification; needs an extra pass over the
    /// source.
    AngularStratified,
}

impl SampleMethod {
    /// Short lowercase name used on the command line.
    pub fn name(self) -> &'static str {
        match self {
            SampleMethod::Random => "random",
            SampleMethod::AngularStratified => "stratified",
        }
    }

    /// Parse the short name produced by [`SampleMethod::name`].
    pub fn from_name(name: &str) -> Option<SampleMethod> {
        match name {
            "random" => Some(SampleMethod::Random),
            "stratified" | "angular-stratified" => Some(SampleMethod::AngularStratified),
            _ => None,
        }
    }
}

/// Everything one conversion job needs from its caller.
#[derive(Debug, Clone)]
pub struct ConvertRequest {
    /// Source file path.
    pub source: PathBuf,
    /// Format to decode the source as.
    pub source_format: RayFormat,
    /// Target file path.
    pub target: PathBuf,
    /// Format to encode the target as.
    pub target_format: RayFormat,
    /// Subsample down to this many rays; `None` converts without sampling.
    pub target_rays: Option<u64>,
    /// Seed for reproducible selections; `None` draws from entropy.
    pub seed: Option<u64>,
    /// Selection method, used only when `target_rays` triggers sampling.
    pub method: SampleMethod,
}

/// What a finished conversion produced.
#[derive(Debug, Clone, Serialize)]
pub struct ConvertReport {
    /// Records decoded from the source.
    pub records_read: u64,
    /// Records encoded into the target.
    pub records_written: u64,
    /// Flux rescale factor applied to surviving rays.
    pub flux_scale: f64,
    /// Total flux written to the target.
    pub flux_written: f64,
    /// Records whose direction cosines failed the unit-norm check.
    pub flagged_directions: u64,
    /// Wall-clock job duration in seconds.
    pub elapsed_seconds: f64,
}

/// Removes the target file on drop unless the job completed.
struct TargetGuard {
    path: PathBuf,
    armed: bool,
}

impl TargetGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for TargetGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn check_cancel(cancel: &CancelToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(ConvertError::Cancelled)
    } else {
        Ok(())
    }
}

/// Run one conversion job to completion.
///
/// Decodes `request.source`, optionally subsamples to `request.target_rays`
/// with flux rescaling, and encodes into `request.target`. Progress events
/// flow through `progress` (when given); `cancel` is checked between record
/// batches. On any failure or cancellation the partially written target is
/// removed.
pub fn convert(
    request: &ConvertRequest,
    settings: &ConvertSettings,
    progress: Option<&Sender<Progress>>,
    cancel: &CancelToken,
) -> Result<ConvertReport> {
    match run(request, settings, progress, cancel) {
        Ok(report) => {
            send_state(progress, JobState::Done);
            Ok(report)
        }
        Err(e) => {
            let state = if matches!(e, ConvertError::Cancelled) {
                JobState::Cancelled
            } else {
                JobState::Failed
            };
            send_state(progress, state);
            Err(e)
        }
    }
}

fn run(
    request: &ConvertRequest,
    settings: &ConvertSettings,
    progress: Option<&Sender<Progress>>,
    cancel: &CancelToken,
) -> Result<ConvertReport> {
    settings.validate()?;
    let started = Instant::now();

    // A zero target can never be valid; reject it before any file I/O.
    if request.target_rays == Some(0) {
        return Err(SampleError::InvalidTarget {
            target: 0,
            total: 0,
        }
        .into());
    }

    send_state(progress, JobState::Reading);
    let mut reader = RayReader::open(&request.source, request.source_format)?;
    let header = reader.header().clone();
    let total = header.ray_count;

    let selection = match request.target_rays {
        None => SelectionSet::identity(total),
        Some(target) => {
            if target > total {
                return Err(SampleError::InvalidTarget { target, total }.into());
            }
            if target == total || request.method == SampleMethod::Random {
                send_state(progress, JobState::Sampling);
                SelectionSet::plan(total, target, request.seed)?
            } else {
                // Stratification needs the directions and fluxes before it
                // can plan, so decode the source once for the prepass and
                // re-open it for the copy pass.
                let mut planner = StratifiedPlanner::new();
                let mut observed = 0u64;
                for (index, record) in reader.by_ref().enumerate() {
                    let record = record?;
                    planner.observe(index as u64, record.direction, record.flux);
                    observed += 1;
                    if observed % settings.progress_interval == 0 {
                        check_cancel(cancel)?;
                    }
                }
                drop(reader);
                send_state(progress, JobState::Sampling);
                let selection = planner.plan(target, request.seed)?;
                reader = RayReader::open(&request.source, request.source_format)?;
                selection
            }
        }
    };
    let scale = selection.flux_scale();

    send_state(progress, JobState::Writing);
    let guard = TargetGuard::new(request.target.clone());
    let mut writer = RayWriter::create(&request.target, request.target_format, &header)?;
    if scale != 1.0 {
        writer.recompute_flux_totals(true);
    }

    let mut cursor = selection.cursor();
    let mut processed = 0u64;
    let mut flagged = 0u64;
    for (index, record) in reader.by_ref().enumerate() {
        let record = record?;
        if !record.has_unit_direction(settings.direction_tolerance) {
            flagged += 1;
        }
        if cursor.admits(index as u64) {
            let record = if scale != 1.0 {
                record.with_flux_scaled(scale)
            } else {
                record
            };
            writer.write_record(&record)?;
        }
        processed += 1;
        if processed % settings.progress_interval == 0 {
            check_cancel(cancel)?;
            send_records(progress, processed, total);
        }
    }
    check_cancel(cancel)?;
    let summary = writer.finish()?;
    send_records(progress, processed, total);
    guard.keep();

    Ok(ConvertReport {
        records_read: processed,
        records_written: summary.records_written,
        flux_scale: scale,
        flux_written: summary.flux_written,
        flagged_directions: flagged,
        elapsed_seconds: started.elapsed().as_secs_f64(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rayset_codec::FormatError;
    use rayset_model::{Point3, RayFileHeader, RayRecord, Vec3};
    use std::path::Path;

    fn write_zemax(path: &Path, fluxes: &[f64]) {
        let header = RayFileHeader {
            ray_count: fluxes.len() as u64,
            total_flux: fluxes.iter().sum(),
            ..Default::default()
        };
        let mut writer = RayWriter::create(path, RayFormat::ZemaxBinary, &header).unwrap();
        for (i, &flux) in fluxes.iter().enumerate() {
            writer
                .write_record(&RayRecord::new(
                    Point3::new(i as f64, 0.0, 0.0),
                    Vec3::new(0.0, 0.0, 1.0),
                    flux,
                ))
                .unwrap();
        }
        writer.finish().unwrap();
    }

    fn request(
        source: &Path,
        target: &Path,
        target_rays: Option<u64>,
        seed: Option<u64>,
    ) -> ConvertRequest {
        ConvertRequest {
            source: source.to_path_buf(),
            source_format: RayFormat::ZemaxBinary,
            target: target.to_path_buf(),
            target_format: RayFormat::ZemaxBinary,
            target_rays,
            seed,
            method: SampleMethod::Random,
        }
    }

    #[test]
    fn test_identity_conversion_is_byte_exact() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.dat");
        let target = dir.path().join("target.dat");
        let fluxes: Vec<f64> = (0..100).map(|i| (i % 7 + 1) as f64).collect();
        write_zemax(&source, &fluxes);

        let report = convert(
            &request(&source, &target, None, None),
            &ConvertSettings::default(),
            None,
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(report.records_read, 100);
        assert_eq!(report.records_written, 100);
        assert_relative_eq!(report.flux_scale, 1.0);

        assert_eq!(fs::read(&source).unwrap(), fs::read(&target).unwrap());
    }

    #[test]
    fn test_subsample_rescales_flux_by_twenty() {
        // Scale factor 20, the same ratio as the canonical
        // 1,000,000 -> 50,000 scenario.
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.dat");
        let target = dir.path().join("target.dat");
        let fluxes: Vec<f64> = (0..10_000).map(|i| (i + 1) as f64).collect();
        write_zemax(&source, &fluxes);

        let report = convert(
            &request(&source, &target, Some(500), Some(42)),
            &ConvertSettings::default(),
            None,
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(report.records_written, 500);
        assert_relative_eq!(report.flux_scale, 20.0);

        // The output must be valid under the target format's own decoder.
        let reader = RayReader::open(&target, RayFormat::ZemaxBinary).unwrap();
        assert_eq!(reader.header().ray_count, 500);
        let mut last_index = None;
        for record in reader {
            let record = record.unwrap();
            // Position encodes the source index; flux must be exactly
            // 20x that record's original flux.
            let source_index = record.position.x as u64;
            assert!(source_index < 10_000);
            assert_relative_eq!(
                record.flux,
                20.0 * (source_index + 1) as f64,
                max_relative = 1e-6
            );
            // Streaming selection emits in ascending source order.
            if let Some(last) = last_index {
                assert!(source_index > last);
            }
            last_index = Some(source_index);
        }
    }

    #[test]
    fn test_expected_flux_is_conserved_over_seeds() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.dat");
        let fluxes: Vec<f64> = (0..200).map(|i| (i % 10 + 1) as f64).collect();
        let source_total: f64 = fluxes.iter().sum();
        write_zemax(&source, &fluxes);

        let seeds = 100u64;
        let mut sum = 0.0;
        for seed in 0..seeds {
            let target = dir.path().join(format!("target-{seed}.dat"));
            let report = convert(
                &request(&source, &target, Some(40), Some(seed)),
                &ConvertSettings::default(),
                None,
                &CancelToken::new(),
            )
            .unwrap();
            sum += report.flux_written;
        }
        let mean = sum / seeds as f64;
        assert_relative_eq!(mean, source_total, max_relative = 0.05);
    }

    #[test]
    fn test_zero_target_rejected_without_io() {
        let dir = tempfile::tempdir().unwrap();
        // The source deliberately does not exist: rejection must come first.
        let source = dir.path().join("missing.dat");
        let target = dir.path().join("target.dat");
        let err = convert(
            &request(&source, &target, Some(0), None),
            &ConvertSettings::default(),
            None,
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConvertError::Sample(SampleError::InvalidTarget { target: 0, .. })
        ));
        assert!(!target.exists());
    }

    #[test]
    fn test_oversized_target_rejected_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.dat");
        let target = dir.path().join("target.dat");
        write_zemax(&source, &[1.0, 1.0, 1.0]);

        let err = convert(
            &request(&source, &target, Some(4), None),
            &ConvertSettings::default(),
            None,
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConvertError::Sample(SampleError::InvalidTarget {
                target: 4,
                total: 3
            })
        ));
        assert!(!target.exists());
    }

    #[test]
    fn test_malformed_source_leaves_no_target() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.dat");
        let target = dir.path().join("target.dat");
        write_zemax(&source, &[1.0, 1.0]);
        let mut bytes = fs::read(&source).unwrap();
        bytes.truncate(bytes.len() - 3);
        fs::write(&source, bytes).unwrap();

        let err = convert(
            &request(&source, &target, None, None),
            &ConvertSettings::default(),
            None,
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConvertError::Format(FormatError::TruncatedRecord { .. })
        ));
        assert!(!target.exists());
    }

    #[test]
    fn test_cancellation_removes_partial_target() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.dat");
        let target = dir.path().join("target.dat");
        write_zemax(&source, &vec![1.0; 50]);

        let cancel = CancelToken::new();
        cancel.cancel();
        let settings = ConvertSettings {
            progress_interval: 1,
            ..Default::default()
        };
        let err = convert(
            &request(&source, &target, None, None),
            &settings,
            None,
            &cancel,
        )
        .unwrap_err();
        assert!(matches!(err, ConvertError::Cancelled));
        assert!(!target.exists());
    }

    #[test]
    fn test_progress_states_and_monotonic_records() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.dat");
        let target = dir.path().join("target.dat");
        write_zemax(&source, &vec![1.0; 100]);

        let (tx, rx) = std::sync::mpsc::channel();
        let settings = ConvertSettings {
            progress_interval: 10,
            ..Default::default()
        };
        convert(
            &request(&source, &target, Some(10), Some(1)),
            &settings,
            Some(&tx),
            &CancelToken::new(),
        )
        .unwrap();
        drop(tx);

        let events: Vec<Progress> = rx.iter().collect();
        let states: Vec<JobState> = events
            .iter()
            .filter_map(|e| match e {
                Progress::State(s) => Some(*s),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                JobState::Reading,
                JobState::Sampling,
                JobState::Writing,
                JobState::Done
            ]
        );

        let counts: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                Progress::Records { processed, total } => {
                    assert_eq!(*total, 100);
                    Some(*processed)
                }
                _ => None,
            })
            .collect();
        assert!(!counts.is_empty());
        assert!(counts.windows(2).all(|w| w[0] <= w[1]), "monotonic");
        assert_eq!(*counts.last().unwrap(), 100);
    }

    #[test]
    fn test_cross_format_to_ascii() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.dat");
        let target = dir.path().join("target.txt");
        write_zemax(&source, &[1.0, 2.0, 3.0, 4.0]);

        let mut req = request(&source, &target, Some(2), Some(7));
        req.target_format = RayFormat::AsciiText;
        let report = convert(&req, &ConvertSettings::default(), None, &CancelToken::new()).unwrap();
        assert_eq!(report.records_written, 2);

        let reader = RayReader::open(&target, RayFormat::AsciiText).unwrap();
        assert_eq!(reader.header().ray_count, 2);
        assert_eq!(reader.count(), 2);
    }

    #[test]
    fn test_stratified_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.dat");
        let target = dir.path().join("target.dat");

        // Two opposing angular lobes of very different flux.
        let header = RayFileHeader {
            ray_count: 100,
            total_flux: 55.0,
            ..Default::default()
        };
        let mut writer = RayWriter::create(&source, RayFormat::ZemaxBinary, &header).unwrap();
        for i in 0..100u64 {
            let (dir_z, flux) = if i < 80 { (1.0, 1.0) } else { (-1.0, 0.1) };
            writer
                .write_record(&RayRecord::new(
                    Point3::new(i as f64, 0.0, 0.0),
                    Vec3::new(0.0, 0.0, dir_z),
                    flux,
                ))
                .unwrap();
        }
        writer.finish().unwrap();

        let mut req = request(&source, &target, Some(10), Some(42));
        req.method = SampleMethod::AngularStratified;
        let report = convert(&req, &ConvertSettings::default(), None, &CancelToken::new()).unwrap();
        assert_eq!(report.records_written, 10);
        assert_relative_eq!(report.flux_scale, 10.0);

        let reader = RayReader::open(&target, RayFormat::ZemaxBinary).unwrap();
        assert_eq!(reader.header().ray_count, 10);
        let records: Vec<RayRecord> = reader.map(|r| r.unwrap()).collect();
        // The weak lobe survives thanks to the one-per-bin floor.
        assert!(records.iter().any(|r| r.direction.z < 0.0));
        assert!(records.iter().any(|r| r.direction.z > 0.0));
    }

    #[test]
    fn test_direction_flags_counted() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.dat");
        let target = dir.path().join("target.dat");

        let header = RayFileHeader {
            ray_count: 3,
            total_flux: 3.0,
            ..Default::default()
        };
        let mut writer = RayWriter::create(&source, RayFormat::ZemaxBinary, &header).unwrap();
        for direction in [
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(0.0, 0.0, 1.5),
            Vec3::new(0.6, 0.0, 0.8),
        ] {
            writer
                .write_record(&RayRecord::new(Point3::new(0.0, 0.0, 0.0), direction, 1.0))
                .unwrap();
        }
        writer.finish().unwrap();

        let report = convert(
            &request(&source, &target, None, None),
            &ConvertSettings::default(),
            None,
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(report.flagged_directions, 1);
    }

    #[test]
    fn test_method_names() {
        assert_eq!(SampleMethod::from_name("random"), Some(SampleMethod::Random));
        assert_eq!(
            SampleMethod::from_name("stratified"),
            Some(SampleMethod::AngularStratified)
        );
        assert_eq!(SampleMethod::from_name("best"), None);
        assert_eq!(SampleMethod::AngularStratified.name(), "stratified");
    }
}
