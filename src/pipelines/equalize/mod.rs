// SPDX-License-Identifier: GPL-3.0-only

//! Histogram equalization pipeline
//!
//! ```text
//! Image ─▶ split ─┬─▶ [grey]  upload ─▶ histogram ─▶ scan ─▶ normalize ─▶ apply ─┐
//!                 │                                                              ├─▶ interleave
//!                 └─▶ [R,G,B] one ChannelPipeline per plane, same stages ────────┘
//! ```
//!
//! # Stage barriers
//!
//! Within a channel, work is enqueued in FIFO order and the host blocks on
//! three readbacks: the histogram (before the scan), the cumulative histogram
//! (before normalization) and the output plane (before the image is usable).
//! The LUT is also read back for the channel report.
//!
//! Channels share nothing but the backend and may run concurrently.

pub mod apply;
pub mod histogram;
pub mod normalize;
pub mod scan;
pub mod types;

pub use types::{
    ChannelOutput, ChannelReport, CumulativeHistogram, EqualizedImage, Histogram, Lut,
    StageTimings,
};

use crate::backends::ComputeBackend;
use crate::constants::{MAX_PIXELS, TABLE_BYTES, padded_plane_bytes};
use crate::errors::{
    BackendError, ChannelFailure, EqualizeError, EqualizeResult, InputError, Stage, StageContext,
};
use crate::media::{Channel, ChannelLayout, InterleavedImage, Plane};
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info, warn};

/// How the orchestrator schedules channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EqualizeOptions {
    /// Run the three color channels in parallel
    pub concurrent_channels: bool,
}

impl Default for EqualizeOptions {
    fn default() -> Self {
        Self {
            concurrent_channels: true,
        }
    }
}

/// Device buffers exclusively owned by one channel pipeline
struct ChannelBuffers<B: ComputeBackend> {
    pixels: B::Buffer,
    histogram: B::Buffer,
    scratch: B::Buffer,
    lut: B::Buffer,
    output: B::Buffer,
}

impl<B: ComputeBackend> ChannelBuffers<B> {
    fn upload(backend: &B, samples: &[u8]) -> Result<Self, BackendError> {
        let plane_bytes = padded_plane_bytes(samples.len());
        let buffers = Self {
            pixels: backend.allocate("pixels", plane_bytes)?,
            histogram: backend.allocate("histogram", TABLE_BYTES)?,
            scratch: backend.allocate("scan_scratch", TABLE_BYTES)?,
            lut: backend.allocate("lut", TABLE_BYTES)?,
            output: backend.allocate("output", plane_bytes)?,
        };
        backend.write(&buffers.pixels, samples)?;
        Ok(buffers)
    }
}

/// Run `f` as `stage`, recording its wall time and tagging its failure
fn timed<T>(
    timings: &mut StageTimings,
    channel: Channel,
    stage: Stage,
    f: impl FnOnce() -> Result<T, BackendError>,
) -> EqualizeResult<T> {
    let started = Instant::now();
    let value = f().at_stage(stage)?;
    let elapsed = started.elapsed();
    timings.record(stage, elapsed);
    debug!(
        channel = %channel,
        stage = %stage,
        elapsed_us = elapsed.as_micros() as u64,
        "Stage complete"
    );
    Ok(value)
}

/// The four stages for one plane, parametrized by channel
pub struct ChannelPipeline<'a, B: ComputeBackend> {
    backend: &'a B,
    channel: Channel,
}

impl<'a, B: ComputeBackend> ChannelPipeline<'a, B> {
    pub fn new(backend: &'a B, channel: Channel) -> Self {
        Self { backend, channel }
    }

    /// Equalize one plane of samples.
    ///
    /// An empty plane is valid and yields an empty output with the identity
    /// LUT. On failure the backend is drained before the error is returned.
    pub fn run(&self, samples: &[u8]) -> EqualizeResult<ChannelOutput> {
        let result = self.run_stages(samples);
        if let Err(e) = &result {
            warn!(channel = %self.channel, error = %e, "Channel pipeline failed");
            if let Err(drain) = self.backend.synchronize() {
                warn!(channel = %self.channel, error = %drain, "Failed to drain backend");
            }
        }
        result
    }

    fn run_stages(&self, samples: &[u8]) -> EqualizeResult<ChannelOutput> {
        let pixels = samples.len() as u64;
        let pixel_count = u32::try_from(samples.len())
            .ok()
            .filter(|_| pixels <= MAX_PIXELS)
            .ok_or(InputError::TooManyPixels { pixels })?;

        let backend = self.backend;
        let channel = self.channel;
        let mut timings = StageTimings::default();

        let buffers = timed(&mut timings, channel, Stage::Upload, || {
            ChannelBuffers::upload(backend, samples)
        })?;

        let histogram = timed(&mut timings, channel, Stage::Histogram, || {
            histogram::accumulate(backend, &buffers.pixels, &buffers.histogram, pixel_count)
        })?;

        let (cumulative_buffer, cumulative) = timed(&mut timings, channel, Stage::Scan, || {
            scan::inclusive_scan(backend, &buffers.histogram, &buffers.scratch)
        })?;

        let lut = timed(&mut timings, channel, Stage::Normalize, || {
            normalize::launch(
                backend,
                cumulative_buffer,
                &buffers.lut,
                normalize::params(&cumulative),
            )?;
            apply::read_lut(backend, &buffers.lut)
        })?;

        let output = timed(&mut timings, channel, Stage::Apply, || {
            apply::apply_lut(
                backend,
                &buffers.pixels,
                &buffers.lut,
                &buffers.output,
                pixel_count,
            )
        })?;

        debug!(
            channel = %channel,
            pixels = pixel_count,
            occupied_bins = histogram.occupied_bins(),
            total_us = timings.total().as_micros() as u64,
            "Channel equalized"
        );

        Ok(ChannelOutput {
            samples: output,
            report: ChannelReport {
                channel,
                histogram,
                cumulative,
                lut,
                timings,
            },
        })
    }
}

/// Orchestrates channel pipelines over whole images
pub struct Equalizer<B: ComputeBackend> {
    backend: B,
    options: EqualizeOptions,
}

impl<B: ComputeBackend> Equalizer<B> {
    /// Create an equalizer with default options
    pub fn new(backend: B) -> Self {
        Self::with_options(backend, EqualizeOptions::default())
    }

    pub fn with_options(backend: B, options: EqualizeOptions) -> Self {
        Self { backend, options }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn options(&self) -> EqualizeOptions {
        self.options
    }

    /// Equalize a single plane as `channel`
    pub fn equalize_plane(&self, plane: &Plane, channel: Channel) -> EqualizeResult<ChannelOutput> {
        ChannelPipeline::new(&self.backend, channel).run(&plane.samples)
    }

    /// Equalize a greyscale or RGB image.
    ///
    /// Greyscale runs one channel pipeline; RGB runs three independent ones
    /// and interleaves the results. Any failure fails the whole image.
    pub fn equalize(&self, image: &InterleavedImage) -> EqualizeResult<EqualizedImage> {
        if image.width() == 0 || image.height() == 0 {
            return Err(InputError::ZeroDimensions {
                width: image.width(),
                height: image.height(),
            }
            .into());
        }

        let layout = image.layout();
        info!(
            width = image.width(),
            height = image.height(),
            layout = ?layout,
            backend = self.backend.name(),
            "Equalizing image"
        );

        let planes = image.split_planes();
        let outputs = match layout {
            ChannelLayout::Greyscale => vec![self.equalize_plane(&planes[0], Channel::Grey)?],
            ChannelLayout::Rgb => self.equalize_color(&planes, layout.channels())?,
        };

        let mut output_planes = Vec::with_capacity(outputs.len());
        let mut reports = Vec::with_capacity(outputs.len());
        for output in outputs {
            output_planes.push(Plane::new(image.width(), image.height(), output.samples)?);
            reports.push(output.report);
        }

        Ok(EqualizedImage {
            image: InterleavedImage::from_planes(&output_planes)?,
            channels: reports,
        })
    }

    fn equalize_color(
        &self,
        planes: &[Plane],
        channels: &[Channel],
    ) -> EqualizeResult<Vec<ChannelOutput>> {
        let results: Vec<(Channel, EqualizeResult<ChannelOutput>)> =
            if self.options.concurrent_channels {
                planes
                    .par_iter()
                    .zip(channels.par_iter())
                    .map(|(plane, &channel)| (channel, self.equalize_plane(plane, channel)))
                    .collect()
            } else {
                // Sequential: stop issuing channels after the first failure
                let mut results = Vec::with_capacity(planes.len());
                for (plane, &channel) in planes.iter().zip(channels) {
                    let result = self.equalize_plane(plane, channel);
                    let failed = result.is_err();
                    results.push((channel, result));
                    if failed {
                        break;
                    }
                }
                results
            };

        let mut outputs = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (channel, result) in results {
            match result {
                Ok(output) => outputs.push(output),
                Err(error) => failures.push(ChannelFailure { channel, error }),
            }
        }

        if failures.is_empty() {
            Ok(outputs)
        } else {
            Err(EqualizeError::Channels {
                failures,
                channel_count: channels.len(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{CpuBackend, Kernel};

    #[test]
    fn test_greyscale_four_values() {
        let equalizer = Equalizer::new(CpuBackend::new());
        let image = InterleavedImage::new(2, 2, 1, vec![0, 64, 128, 255]).unwrap();
        let result = equalizer.equalize(&image).unwrap();
        assert_eq!(result.image.data(), &[64, 128, 191, 255]);
        assert_eq!(result.channels.len(), 1);
        assert_eq!(result.channels[0].channel, Channel::Grey);
        assert_eq!(result.channels[0].histogram.occupied_bins(), 4);
    }

    #[test]
    fn test_empty_plane_runs() {
        let backend = CpuBackend::new();
        let output = ChannelPipeline::new(&backend, Channel::Grey)
            .run(&[])
            .unwrap();
        assert!(output.samples.is_empty());
        assert_eq!(output.report.lut, Lut::identity());
        assert_eq!(output.report.cumulative.total(), 0);
    }

    #[test]
    fn test_sequential_matches_concurrent() {
        let data: Vec<u8> = (0..300u32).map(|i| (i * 7 % 256) as u8).collect();
        let image = InterleavedImage::new(10, 10, 3, data).unwrap();
        let sequential = Equalizer::with_options(
            CpuBackend::new(),
            EqualizeOptions {
                concurrent_channels: false,
            },
        )
        .equalize(&image)
        .unwrap();
        let concurrent = Equalizer::new(CpuBackend::new()).equalize(&image).unwrap();
        assert_eq!(sequential.image, concurrent.image);
    }

    /// Backend that fails the n-th allocation
    struct FailingBackend {
        inner: CpuBackend,
        fail_at: usize,
        allocations: std::sync::atomic::AtomicUsize,
        drained: std::sync::atomic::AtomicBool,
    }

    impl FailingBackend {
        fn new(fail_at: usize) -> Self {
            Self {
                inner: CpuBackend::new(),
                fail_at,
                allocations: Default::default(),
                drained: Default::default(),
            }
        }
    }

    impl ComputeBackend for FailingBackend {
        type Buffer = <CpuBackend as ComputeBackend>::Buffer;

        fn name(&self) -> &str {
            "failing"
        }

        fn allocate(&self, label: &'static str, size: u64) -> Result<Self::Buffer, BackendError> {
            let n = self
                .allocations
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n == self.fail_at {
                return Err(BackendError::new("allocate", "out of device memory"));
            }
            self.inner.allocate(label, size)
        }

        fn write(&self, buffer: &Self::Buffer, data: &[u8]) -> Result<(), BackendError> {
            self.inner.write(buffer, data)
        }

        fn fill_zero(&self, buffer: &Self::Buffer) -> Result<(), BackendError> {
            self.inner.fill_zero(buffer)
        }

        fn launch(&self, kernel: Kernel<'_, Self::Buffer>) -> Result<(), BackendError> {
            self.inner.launch(kernel)
        }

        fn read(&self, buffer: &Self::Buffer, size: u64) -> Result<Vec<u8>, BackendError> {
            self.inner.read(buffer, size)
        }

        fn synchronize(&self) -> Result<(), BackendError> {
            self.drained
                .store(true, std::sync::atomic::Ordering::SeqCst);
            self.inner.synchronize()
        }
    }

    #[test]
    fn test_greyscale_failure_names_stage() {
        let equalizer = Equalizer::new(FailingBackend::new(1));
        let image = InterleavedImage::new(2, 2, 1, vec![1, 2, 3, 4]).unwrap();
        let err = equalizer.equalize(&image).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Upload));
        assert!(
            equalizer
                .backend()
                .drained
                .load(std::sync::atomic::Ordering::SeqCst)
        );
    }

    #[test]
    fn test_color_failure_reports_channel() {
        let equalizer = Equalizer::with_options(
            FailingBackend::new(7),
            EqualizeOptions {
                concurrent_channels: false,
            },
        );
        let image = InterleavedImage::new(2, 1, 3, vec![1, 2, 3, 4, 5, 6]).unwrap();
        match equalizer.equalize(&image).unwrap_err() {
            EqualizeError::Channels {
                failures,
                channel_count,
            } => {
                assert_eq!(channel_count, 3);
                assert_eq!(failures.len(), 1);
                // Five buffers per channel: the eighth allocation is green's third
                assert_eq!(failures[0].channel, Channel::Green);
                assert_eq!(failures[0].error.stage(), Some(Stage::Upload));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_concurrent_color_failure_fails_image() {
        let equalizer = Equalizer::new(FailingBackend::new(7));
        assert!(equalizer.options().concurrent_channels);
        let image = InterleavedImage::new(2, 1, 3, vec![1, 2, 3, 4, 5, 6]).unwrap();
        match equalizer.equalize(&image) {
            Err(EqualizeError::Channels {
                failures,
                channel_count,
            }) => {
                assert_eq!(channel_count, 3);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].error.stage(), Some(Stage::Upload));
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("a failed channel must not produce an image"),
        }
        // The two healthy channels still allocate all five of their buffers
        let allocations = equalizer
            .backend()
            .allocations
            .load(std::sync::atomic::Ordering::SeqCst);
        assert!(allocations >= 11);
    }
}
