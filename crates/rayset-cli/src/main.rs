//! rayset CLI - convert and subsample illumination ray files.
//!
//! Wraps the conversion pipeline in two subcommands: `convert` runs a
//! (possibly subsampling) format conversion with live progress, and `info`
//! prints a file's header without converting.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};

use rayset_codec::{RayFormat, RayReader};
use rayset_model::{FluxMode, RayFileHeader, WavelengthMode};
use rayset_pipeline::{
    ConvertJob, ConvertRequest, ConvertSettings, JobState, Progress, SampleMethod,
};

#[derive(Parser)]
#[command(name = "rayset")]
#[command(about = "Convert and subsample illumination ray files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a ray file, optionally subsampling to a target ray count
    Convert {
        /// Input ray file
        input: PathBuf,
        /// Output ray file
        output: PathBuf,
        /// Input format (zemax, tracepro, ascii); inferred from the
        /// extension when omitted
        #[arg(long)]
        from: Option<String>,
        /// Output format (zemax, tracepro, ascii, tracepro-ascii);
        /// inferred from the extension when omitted
        #[arg(long)]
        to: Option<String>,
        /// Subsample down to this many rays (flux is rescaled to preserve
        /// the total)
        #[arg(long)]
        rays: Option<u64>,
        /// Seed for a reproducible selection
        #[arg(long)]
        seed: Option<u64>,
        /// Sampling method: random or stratified
        #[arg(long, default_value = "random")]
        method: String,
        /// TOML file with conversion settings
        #[arg(long)]
        settings: Option<PathBuf>,
        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
        /// Suppress progress output
        #[arg(short, long)]
        quiet: bool,
    },
    /// Display a ray file's header
    Info {
        /// Ray file to inspect
        input: PathBuf,
        /// Input format (zemax, tracepro, ascii); inferred from the
        /// extension when omitted
        #[arg(long)]
        from: Option<String>,
        /// Print the header as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Convert {
            input,
            output,
            from,
            to,
            rays,
            seed,
            method,
            settings,
            json,
            quiet,
        } => run_convert(
            &input, &output, from, to, rays, seed, &method, settings, json, quiet,
        ),
        Commands::Info { input, from, json } => show_info(&input, from, json),
    }
}

/// Resolve a format from an explicit tag or the file extension.
fn resolve_format(path: &Path, tag: Option<String>, role: &str) -> Result<RayFormat> {
    if let Some(tag) = tag {
        return RayFormat::from_tag(&tag)
            .ok_or_else(|| anyhow!("unknown {role} format `{tag}` (expected zemax, tracepro, ascii, or tracepro-ascii)"));
    }
    RayFormat::from_extension(path).ok_or_else(|| {
        anyhow!(
            "cannot infer the {role} format of `{}`; pass --{} explicitly",
            path.display(),
            if role == "input" { "from" } else { "to" }
        )
    })
}

#[allow(clippy::too_many_arguments)]
fn run_convert(
    input: &Path,
    output: &Path,
    from: Option<String>,
    to: Option<String>,
    rays: Option<u64>,
    seed: Option<u64>,
    method: &str,
    settings_path: Option<PathBuf>,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let source_format = resolve_format(input, from, "input")?;
    let target_format = resolve_format(output, to, "output")?;
    let method = SampleMethod::from_name(method)
        .ok_or_else(|| anyhow!("unknown sampling method `{method}` (expected random or stratified)"))?;

    let settings = match settings_path {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings file {}", path.display()))?;
            toml::from_str(&text)
                .with_context(|| format!("failed to parse settings file {}", path.display()))?
        }
        None => ConvertSettings::default(),
    };

    let request = ConvertRequest {
        source: input.to_path_buf(),
        source_format,
        target: output.to_path_buf(),
        target_format,
        target_rays: rays,
        seed,
        method,
    };

    let job = ConvertJob::spawn(request, settings);
    let mut last_percent = None;
    for event in job.progress().iter() {
        if quiet {
            continue;
        }
        match event {
            Progress::Records { processed, total } if total > 0 => {
                let percent = (processed * 100 / total).min(100);
                if last_percent != Some(percent) {
                    eprint!("\r{percent:3}%");
                    let _ = std::io::stderr().flush();
                    last_percent = Some(percent);
                }
            }
            Progress::State(state) => {
                if last_percent.is_some() {
                    eprintln!();
                    last_percent = None;
                }
                match state {
                    JobState::Reading => eprintln!("reading {}", input.display()),
                    JobState::Sampling => eprintln!("planning selection"),
                    JobState::Writing => eprintln!("writing {}", output.display()),
                    _ => {}
                }
            }
            Progress::Records { .. } => {}
        }
    }
    if last_percent.is_some() && !quiet {
        eprintln!();
    }

    let report = job.join().context("conversion failed")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "wrote {} of {} rays to {}",
            report.records_written,
            report.records_read,
            output.display()
        );
        if report.flux_scale != 1.0 {
            println!(
                "flux rescaled by {:.6} (total written {:.6e})",
                report.flux_scale, report.flux_written
            );
        }
        if report.flagged_directions > 0 {
            println!(
                "warning: {} rays had non-unit direction cosines",
                report.flagged_directions
            );
        }
        println!("finished in {:.2}s", report.elapsed_seconds);
    }
    Ok(())
}

fn show_info(input: &Path, from: Option<String>, json: bool) -> Result<()> {
    let format = resolve_format(input, from, "input")?;
    if !format.supports_decode() {
        bail!("{format} files cannot be decoded");
    }
    let reader = RayReader::open(input, format)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let header = reader.header();

    if json {
        println!("{}", serde_json::to_string_pretty(&header_json(format, header))?);
    } else {
        println!("format:       {format}");
        println!("rays:         {}", header.ray_count);
        println!("units:        {}", header.source_units.name());
        println!("flux units:   {}", header.flux_units.name());
        match header.flux_mode {
            FluxMode::PerRay => println!("flux:         per-ray (total {:.6e})", header.total_flux),
            FluxMode::Uniform => println!("flux:         uniform (total {:.6e})", header.total_flux),
        }
        match header.wavelength {
            WavelengthMode::PerRay => println!("wavelength:   per-ray"),
            WavelengthMode::Fixed(um) if um > 0.0 => println!("wavelength:   {um:.4} um"),
            WavelengthMode::Fixed(_) => println!("wavelength:   unspecified"),
        }
        println!(
            "polarization: {}",
            if header.polarized { "stokes" } else { "none" }
        );
        if let Some(extra) = header.extra.as_zemax() {
            let description = extra.description_text();
            if !description.is_empty() {
                println!("description:  {description}");
            }
        }
    }
    Ok(())
}

fn header_json(format: RayFormat, header: &RayFileHeader) -> serde_json::Value {
    let wavelength = match header.wavelength {
        WavelengthMode::PerRay => serde_json::json!("per-ray"),
        WavelengthMode::Fixed(um) => serde_json::json!(um),
    };
    let flux_mode = match header.flux_mode {
        FluxMode::PerRay => "per-ray",
        FluxMode::Uniform => "uniform",
    };
    serde_json::json!({
        "format": format.tag(),
        "rays": header.ray_count,
        "units": header.source_units.name(),
        "flux_units": header.flux_units.name(),
        "flux_mode": flux_mode,
        "total_flux": header.total_flux,
        "wavelength_um": wavelength,
        "polarized": header.polarized,
    })
}
