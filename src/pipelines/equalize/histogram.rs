// SPDX-License-Identifier: GPL-3.0-only

//! Histogram accumulation stage

use super::types::{Histogram, decode_table};
use crate::backends::{ComputeBackend, Kernel};
use crate::constants::TABLE_BYTES;
use crate::errors::BackendError;

/// Zero `histogram`, count every sample of `pixels` into it, and read it back.
///
/// The readback is the barrier between accumulation and the scan.
pub fn accumulate<B: ComputeBackend>(
    backend: &B,
    pixels: &B::Buffer,
    histogram: &B::Buffer,
    pixel_count: u32,
) -> Result<Histogram, BackendError> {
    backend.fill_zero(histogram)?;
    backend.launch(Kernel::Accumulate {
        pixels,
        histogram,
        pixel_count,
    })?;
    let bytes = backend.read(histogram, TABLE_BYTES)?;
    Ok(Histogram(decode_table(&bytes)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::CpuBackend;
    use crate::constants::padded_plane_bytes;

    fn run(samples: &[u8]) -> Histogram {
        let backend = CpuBackend::new();
        let pixels = backend
            .allocate("pixels", padded_plane_bytes(samples.len()))
            .unwrap();
        let histogram = backend.allocate("histogram", TABLE_BYTES).unwrap();
        backend.write(&pixels, samples).unwrap();
        accumulate(&backend, &pixels, &histogram, samples.len() as u32).unwrap()
    }

    #[test]
    fn test_counts_match_sequential() {
        let samples: Vec<u8> = (0..10_007u32).map(|i| (i * 31 % 251) as u8).collect();
        let histogram = run(&samples);
        assert_eq!(histogram, Histogram::from_samples(&samples));
        assert_eq!(histogram.total(), samples.len() as u64);
    }

    #[test]
    fn test_no_lost_updates_on_one_bin() {
        let samples = vec![42u8; 100_000];
        let histogram = run(&samples);
        assert_eq!(histogram.0[42], 100_000);
        assert_eq!(histogram.occupied_bins(), 1);
    }

    #[test]
    fn test_empty_plane() {
        assert_eq!(run(&[]), Histogram::zeroed());
    }

    #[test]
    fn test_padding_not_counted() {
        // 5 samples occupy two words; the three padding bytes are zero
        let histogram = run(&[9, 9, 9, 9, 9]);
        assert_eq!(histogram.0[0], 0);
        assert_eq!(histogram.0[9], 5);
    }

    #[test]
    fn test_stale_counts_cleared() {
        let backend = CpuBackend::new();
        let pixels = backend.allocate("pixels", 4).unwrap();
        let histogram = backend.allocate("histogram", TABLE_BYTES).unwrap();
        backend.write(&pixels, &[1, 2, 3, 4]).unwrap();
        accumulate(&backend, &pixels, &histogram, 4).unwrap();
        let second = accumulate(&backend, &pixels, &histogram, 4).unwrap();
        assert_eq!(second.total(), 4);
    }
}
