// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Equalizing image files
//! - Listing GPU adapters
//! - Showing and initializing the configuration

use histeq::backends::AnyBackend;
use histeq::gpu::list_adapters;
use histeq::media::conversions::{from_dynamic, to_dynamic};
use histeq::pipelines::equalize::ChannelReport;
use histeq::{BackendPreference, ComputeBackend, Config, EqualizeOptions, Equalizer, Stage};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Arguments of the `equalize` command
pub struct EqualizeArgs {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub backend: Option<BackendPreference>,
    pub device: Option<usize>,
    pub sequential: bool,
    pub timings: bool,
    pub histogram: bool,
}

/// Equalize one image file and save the result
pub fn equalize_image(args: EqualizeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load();
    let preference = args.backend.unwrap_or(config.backend);
    let device_index = args.device.or(config.device_index);
    let options = EqualizeOptions {
        concurrent_channels: config.concurrent_channels && !args.sequential,
    };
    let report_timings = args.timings || config.report_timings;

    let decoded = image::open(&args.input)
        .map_err(|e| format!("Failed to open {}: {}", args.input.display(), e))?;
    let input = from_dynamic(decoded)?;
    println!(
        "Input: {} ({}x{}, {} channel{})",
        args.input.display(),
        input.width(),
        input.height(),
        input.layout().channel_count(),
        if input.layout().channel_count() == 1 { "" } else { "s" }
    );

    let backend = AnyBackend::select(preference, config.power_preference, device_index)?;
    println!("Backend: {}", backend.name());

    let equalizer = Equalizer::with_options(backend, options);
    let started = Instant::now();
    let equalized = equalizer.equalize(&input)?;
    let elapsed = started.elapsed();

    let output = args
        .output
        .unwrap_or_else(|| default_output_path(&args.input));
    for report in &equalized.channels {
        if args.histogram {
            print_histogram(report);
        }
        if report_timings {
            print_timings(report);
        }
    }
    if report_timings {
        println!("Total: {:.3} ms", elapsed.as_secs_f64() * 1000.0);
    }

    to_dynamic(equalized.image)?
        .save(&output)
        .map_err(|e| format!("Failed to save {}: {}", output.display(), e))?;
    println!("Saved: {}", output.display());

    Ok(())
}

/// `<dir>/<stem>_equalized.<ext>`, PNG when the input has no extension
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    let extension = input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("png");
    input.with_file_name(format!("{}_equalized.{}", stem, extension))
}

fn print_timings(report: &ChannelReport) {
    let stages: Vec<String> = Stage::ALL
        .iter()
        .map(|&stage| {
            format!(
                "{} {:.3} ms",
                stage,
                report.timings.get(stage).as_secs_f64() * 1000.0
            )
        })
        .collect();
    println!("  [{}] {}", report.channel, stages.join(", "));
}

fn print_histogram(report: &ChannelReport) {
    println!(
        "  [{}] {} pixels in {} bins",
        report.channel,
        report.histogram.total(),
        report.histogram.occupied_bins()
    );
    for (row, bins) in report.histogram.bins().chunks(16).enumerate() {
        if bins.iter().all(|&count| count == 0) {
            continue;
        }
        let counts: Vec<String> = bins.iter().map(|count| format!("{:>6}", count)).collect();
        println!("      {:>3}: {}", row * 16, counts.join(" "));
    }
}

/// List all GPU adapters
pub fn list_devices() -> Result<(), Box<dyn std::error::Error>> {
    let adapters = list_adapters();

    if adapters.is_empty() {
        println!("No GPU adapters found. The cpu backend is always available.");
        return Ok(());
    }

    println!("Available GPU adapters:");
    println!();
    for (index, adapter) in adapters.iter().enumerate() {
        println!("  [{}] {}", index, adapter.name);
        println!(
            "      Backend: {:?}, type: {:?}, max workgroup size: {}",
            adapter.backend, adapter.device_type, adapter.max_workgroup_size
        );
        if !adapter.driver.is_empty() {
            println!("      Driver: {}", adapter.driver);
        }
        println!();
    }
    println!("Pick one with `histeq equalize --device <INDEX>` or `device_index` in the config.");

    Ok(())
}

/// Print the effective configuration, optionally writing it out
pub fn show_config(init: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load();
    let path = Config::path();

    match &path {
        Some(path) if path.exists() => println!("Config file: {}", path.display()),
        Some(path) => println!("Config file: {} (not present, using defaults)", path.display()),
        None => println!("Config file: no config directory on this platform"),
    }
    println!("{}", serde_json::to_string_pretty(&config)?);

    if init {
        let path = path.ok_or("No config directory on this platform")?;
        config.save_to(&path)?;
        println!("Wrote {}", path.display());
    }

    Ok(())
}
