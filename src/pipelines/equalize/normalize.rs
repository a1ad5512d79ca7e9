// SPDX-License-Identifier: GPL-3.0-only

//! Normalizer: cumulative histogram to LUT
//!
//! `lut[i] = floor((255 * cumulative[i] + floor(total / 2)) / total)`, which is
//! `255 * cumulative[i] / total` rounded half up, in exact integer arithmetic.
//! Both backends produce the same table bit for bit.
//!
//! Distributions with at most one occupied intensity (including the empty
//! plane) get the identity table, so flat images pass through unchanged.

use super::types::{CumulativeHistogram, Lut};
use crate::backends::{ComputeBackend, Kernel, NormalizeParams};
use crate::constants::{BIN_COUNT, MAX_INTENSITY};
use crate::errors::BackendError;

/// One LUT entry for a cumulative count out of `total`.
///
/// Returns 0 when `total` is 0; callers use the identity table instead.
#[inline]
pub fn lut_entry(cumulative: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let total = u64::from(total);
    let scaled = (u64::from(MAX_INTENSITY) * u64::from(cumulative) + total / 2) / total;
    scaled.min(u64::from(MAX_INTENSITY)) as u8
}

/// Kernel parameters for a cumulative histogram
pub fn params(cumulative: &CumulativeHistogram) -> NormalizeParams {
    let total = cumulative.total();
    // Zero or one occupied bin: the first non-zero entry already holds every pixel
    let identity = match cumulative.min_nonzero() {
        None => true,
        Some(first) => first == total,
    };
    NormalizeParams { total, identity }
}

/// Host reference of the normalize kernel
pub fn normalize(cumulative: &CumulativeHistogram) -> Lut {
    let params = params(cumulative);
    if params.identity {
        return Lut::identity();
    }
    let mut table = [0u8; BIN_COUNT];
    for (slot, &count) in table.iter_mut().zip(cumulative.values().iter()) {
        *slot = lut_entry(count, params.total);
    }
    Lut(table)
}

/// Enqueue the normalize kernel from `cumulative` into `lut`
pub fn launch<B: ComputeBackend>(
    backend: &B,
    cumulative: &B::Buffer,
    lut: &B::Buffer,
    params: NormalizeParams,
) -> Result<(), BackendError> {
    backend.launch(Kernel::Normalize {
        cumulative,
        lut,
        params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::CpuBackend;
    use crate::constants::TABLE_BYTES;
    use crate::pipelines::equalize::types::{Histogram, decode_table};

    fn cumulative_of(samples: &[u8]) -> CumulativeHistogram {
        CumulativeHistogram::sequential(&Histogram::from_samples(samples))
    }

    #[test]
    fn test_lut_entry_rounding() {
        // 255 * 1 / 4 = 63.75 rounds up, 255 * 3 / 4 = 191.25 rounds down
        assert_eq!(lut_entry(1, 4), 64);
        assert_eq!(lut_entry(2, 4), 128);
        assert_eq!(lut_entry(3, 4), 191);
        assert_eq!(lut_entry(4, 4), 255);
        assert_eq!(lut_entry(0, 4), 0);
    }

    #[test]
    fn test_lut_entry_zero_total() {
        assert_eq!(lut_entry(0, 0), 0);
    }

    #[test]
    fn test_lut_entry_large_total() {
        let total = 1u32 << 31;
        assert_eq!(lut_entry(total, total), 255);
        assert_eq!(lut_entry(total / 2, total), 128);
    }

    #[test]
    fn test_four_distinct_values() {
        let lut = normalize(&cumulative_of(&[0, 64, 128, 255]));
        assert_eq!(lut.map(0), 64);
        assert_eq!(lut.map(64), 128);
        assert_eq!(lut.map(128), 191);
        assert_eq!(lut.map(255), 255);
        assert!(lut.is_monotonic());
    }

    #[test]
    fn test_empty_plane_is_identity() {
        let cumulative = cumulative_of(&[]);
        assert!(params(&cumulative).identity);
        assert_eq!(normalize(&cumulative), Lut::identity());
    }

    #[test]
    fn test_single_value_is_identity() {
        let cumulative = cumulative_of(&[0; 16]);
        assert_eq!(normalize(&cumulative), Lut::identity());
        let cumulative = cumulative_of(&[77; 9]);
        assert_eq!(normalize(&cumulative), Lut::identity());
    }

    #[test]
    fn test_two_values_are_scaled() {
        let cumulative = cumulative_of(&[10, 10, 10, 200]);
        let params = params(&cumulative);
        assert!(!params.identity);
        assert_eq!(params.total, 4);
        let lut = normalize(&cumulative);
        assert_eq!(lut.map(10), 191);
        assert_eq!(lut.map(200), 255);
    }

    #[test]
    fn test_deterministic() {
        let cumulative = cumulative_of(&[3, 1, 4, 1, 5, 9, 2, 6, 5, 3, 5]);
        assert_eq!(normalize(&cumulative), normalize(&cumulative));
    }

    #[test]
    fn test_kernel_matches_host() {
        let backend = CpuBackend::new();
        let cumulative = cumulative_of(&[0, 1, 1, 2, 3, 5, 8, 13, 21, 34, 55, 89, 144, 233]);
        let input = backend.allocate("cumulative", TABLE_BYTES).unwrap();
        let lut = backend.allocate("lut", TABLE_BYTES).unwrap();
        backend
            .write(&input, bytemuck::cast_slice(cumulative.values()))
            .unwrap();

        launch(&backend, &input, &lut, params(&cumulative)).unwrap();
        let words = decode_table(&backend.read(&lut, TABLE_BYTES).unwrap()).unwrap();
        assert_eq!(Lut::from_words(&words), normalize(&cumulative));
    }
}
