// SPDX-License-Identifier: GPL-3.0-only

//! LUT application stage

use super::types::{Lut, decode_table};
use crate::backends::{ComputeBackend, Kernel};
use crate::constants::TABLE_BYTES;
use crate::errors::BackendError;

/// Read back a LUT written by the normalize kernel
pub fn read_lut<B: ComputeBackend>(backend: &B, lut: &B::Buffer) -> Result<Lut, BackendError> {
    let bytes = backend.read(lut, TABLE_BYTES)?;
    Ok(Lut::from_words(&decode_table(&bytes)?))
}

/// Map every pixel through `lut` into `output` and read the output plane.
///
/// The LUT is complete when this is enqueued; the readback is the final
/// barrier before the plane is usable.
pub fn apply_lut<B: ComputeBackend>(
    backend: &B,
    pixels: &B::Buffer,
    lut: &B::Buffer,
    output: &B::Buffer,
    pixel_count: u32,
) -> Result<Vec<u8>, BackendError> {
    backend.launch(Kernel::Apply {
        pixels,
        lut,
        output,
        pixel_count,
    })?;
    backend.read(output, u64::from(pixel_count))
}
