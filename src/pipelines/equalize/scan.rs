// SPDX-License-Identifier: GPL-3.0-only

//! Prefix scan stage
//!
//! Hillis–Steele inclusive scan over the 256 bins: pass `k` adds the entry
//! `2^k` places back, reading only the previous pass's buffer and writing the
//! other one. The two buffers swap roles after every pass.

use super::types::{CumulativeHistogram, decode_table};
use crate::backends::{ComputeBackend, Kernel};
use crate::constants::{SCAN_PASSES, TABLE_BYTES};
use crate::errors::BackendError;

/// Scan `histogram` in place using `scratch` as the second buffer.
///
/// Returns whichever buffer holds the final pass (with an even pass count,
/// `histogram` itself) along with its contents. The readback is the barrier
/// between the scan and normalization.
pub fn inclusive_scan<'a, B: ComputeBackend>(
    backend: &B,
    histogram: &'a B::Buffer,
    scratch: &'a B::Buffer,
) -> Result<(&'a B::Buffer, CumulativeHistogram), BackendError> {
    let (mut src, mut dst) = (histogram, scratch);
    for pass in 0..SCAN_PASSES {
        backend.launch(Kernel::ScanStep {
            src,
            dst,
            offset: 1 << pass,
        })?;
        std::mem::swap(&mut src, &mut dst);
    }
    let bytes = backend.read(src, TABLE_BYTES)?;
    Ok((src, CumulativeHistogram(decode_table(&bytes)?)))
}
