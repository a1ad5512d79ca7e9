// SPDX-License-Identifier: GPL-3.0-only

//! Tables produced by the equalization stages

use crate::constants::{BIN_COUNT, MAX_INTENSITY};
use crate::errors::{BackendError, Stage};
use crate::media::{Channel, InterleavedImage};
use std::time::Duration;

/// Decode a 256-entry `u32` table read back from the device
pub(crate) fn decode_table(bytes: &[u8]) -> Result<[u32; BIN_COUNT], BackendError> {
    if bytes.len() < BIN_COUNT * 4 {
        return Err(BackendError::new(
            "read",
            format!("expected {} bytes, got {}", BIN_COUNT * 4, bytes.len()),
        ));
    }
    let mut table = [0u32; BIN_COUNT];
    for (slot, word) in table.iter_mut().zip(bytes.chunks_exact(4)) {
        *slot = bytemuck::pod_read_unaligned(word);
    }
    Ok(table)
}

/// Pixel count per intensity, index = intensity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Histogram(pub [u32; BIN_COUNT]);

impl Histogram {
    pub fn zeroed() -> Self {
        Self([0; BIN_COUNT])
    }

    /// Sequential count, used as the reference for the parallel accumulator
    pub fn from_samples(samples: &[u8]) -> Self {
        let mut bins = [0u32; BIN_COUNT];
        for &sample in samples {
            bins[sample as usize] += 1;
        }
        Self(bins)
    }

    pub fn bins(&self) -> &[u32; BIN_COUNT] {
        &self.0
    }

    /// Sum of all counters; equals the plane's pixel count
    pub fn total(&self) -> u64 {
        self.0.iter().map(|&count| u64::from(count)).sum()
    }

    /// Number of intensities that occur at least once
    pub fn occupied_bins(&self) -> usize {
        self.0.iter().filter(|&&count| count > 0).count()
    }
}

/// Inclusive running sum of a histogram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CumulativeHistogram(pub [u32; BIN_COUNT]);

impl CumulativeHistogram {
    /// Sequential inclusive prefix sum
    pub fn sequential(histogram: &Histogram) -> Self {
        let mut running = 0u32;
        let mut cumulative = [0u32; BIN_COUNT];
        for (slot, &count) in cumulative.iter_mut().zip(histogram.0.iter()) {
            running += count;
            *slot = running;
        }
        Self(cumulative)
    }

    pub fn values(&self) -> &[u32; BIN_COUNT] {
        &self.0
    }

    /// Total pixel count (last element)
    pub fn total(&self) -> u32 {
        self.0[BIN_COUNT - 1]
    }

    /// Smallest non-zero entry, if any
    pub fn min_nonzero(&self) -> Option<u32> {
        self.0.iter().copied().find(|&value| value > 0)
    }

    pub fn is_monotonic(&self) -> bool {
        self.0.windows(2).all(|pair| pair[0] <= pair[1])
    }
}

/// Input intensity to output intensity mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lut(pub [u8; BIN_COUNT]);

impl Lut {
    pub fn identity() -> Self {
        let mut table = [0u8; BIN_COUNT];
        for (value, slot) in table.iter_mut().enumerate() {
            *slot = value as u8;
        }
        Self(table)
    }

    /// Narrow a device table, clamping to the output range
    pub fn from_words(words: &[u32; BIN_COUNT]) -> Self {
        let mut table = [0u8; BIN_COUNT];
        for (slot, &word) in table.iter_mut().zip(words.iter()) {
            *slot = word.min(MAX_INTENSITY) as u8;
        }
        Self(table)
    }

    pub fn entries(&self) -> &[u8; BIN_COUNT] {
        &self.0
    }

    #[inline]
    pub fn map(&self, sample: u8) -> u8 {
        self.0[sample as usize]
    }

    pub fn is_monotonic(&self) -> bool {
        self.0.windows(2).all(|pair| pair[0] <= pair[1])
    }
}

/// Wall-clock time spent in each stage, including its barrier wait
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StageTimings {
    pub upload: Duration,
    pub histogram: Duration,
    pub scan: Duration,
    pub normalize: Duration,
    pub apply: Duration,
}

impl StageTimings {
    pub fn get(&self, stage: Stage) -> Duration {
        match stage {
            Stage::Upload => self.upload,
            Stage::Histogram => self.histogram,
            Stage::Scan => self.scan,
            Stage::Normalize => self.normalize,
            Stage::Apply => self.apply,
        }
    }

    pub(crate) fn record(&mut self, stage: Stage, elapsed: Duration) {
        match stage {
            Stage::Upload => self.upload = elapsed,
            Stage::Histogram => self.histogram = elapsed,
            Stage::Scan => self.scan = elapsed,
            Stage::Normalize => self.normalize = elapsed,
            Stage::Apply => self.apply = elapsed,
        }
    }

    pub fn total(&self) -> Duration {
        Stage::ALL.iter().map(|&stage| self.get(stage)).sum()
    }
}

/// Everything one channel pipeline produced
#[derive(Debug, Clone)]
pub struct ChannelReport {
    pub channel: Channel,
    pub histogram: Histogram,
    pub cumulative: CumulativeHistogram,
    pub lut: Lut,
    pub timings: StageTimings,
}

/// Output plane plus the report that produced it
#[derive(Debug, Clone)]
pub struct ChannelOutput {
    pub samples: Vec<u8>,
    pub report: ChannelReport,
}

/// Finished image with per-channel reports in interleaving order
#[derive(Debug, Clone)]
pub struct EqualizedImage {
    pub image: InterleavedImage,
    pub channels: Vec<ChannelReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_table_rejects_short_read() {
        assert!(decode_table(&[0u8; 16]).is_err());
    }

    #[test]
    fn test_decode_table() {
        let words: Vec<u32> = (0..BIN_COUNT as u32).collect();
        let table = decode_table(bytemuck::cast_slice(&words)).unwrap();
        assert_eq!(table[0], 0);
        assert_eq!(table[255], 255);
    }

    #[test]
    fn test_sequential_prefix_sum() {
        let histogram = Histogram::from_samples(&[0, 0, 3, 255]);
        let cumulative = CumulativeHistogram::sequential(&histogram);
        assert_eq!(cumulative.0[0], 2);
        assert_eq!(cumulative.0[2], 2);
        assert_eq!(cumulative.0[3], 3);
        assert_eq!(cumulative.total(), 4);
        assert_eq!(cumulative.min_nonzero(), Some(2));
        assert!(cumulative.is_monotonic());
    }

    #[test]
    fn test_lut_from_words_clamps() {
        let mut words = [0u32; BIN_COUNT];
        words[255] = 1000;
        assert_eq!(Lut::from_words(&words).0[255], 255);
    }

    #[test]
    fn test_timings_total() {
        let mut timings = StageTimings::default();
        timings.record(Stage::Scan, Duration::from_millis(2));
        timings.record(Stage::Apply, Duration::from_millis(3));
        assert_eq!(timings.total(), Duration::from_millis(5));
    }
}
