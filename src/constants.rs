// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline-wide constants

/// Number of histogram bins (one per 8-bit intensity)
pub const BIN_COUNT: usize = 256;

/// Largest representable intensity
pub const MAX_INTENSITY: u32 = 255;

/// Hillis–Steele passes needed to scan `BIN_COUNT` elements: log2(256)
pub const SCAN_PASSES: u32 = BIN_COUNT.trailing_zeros();

/// Size in bytes of a device histogram, cumulative histogram or LUT buffer
pub const TABLE_BYTES: u64 = (BIN_COUNT * std::mem::size_of::<u32>()) as u64;

/// Threads per workgroup; must match `@workgroup_size` in every kernel
pub const WORKGROUP_SIZE: u32 = 256;

/// Samples packed into one `u32` word of a device plane buffer
pub const SAMPLES_PER_WORD: usize = 4;

/// Upper bound on pixels per plane.
///
/// Counters are 32-bit and the normalize kernel doubles remainders that are
/// smaller than the pixel count, so the count has to stay at or below 2^31.
pub const MAX_PIXELS: u64 = 1 << 31;

/// Directory name under the user config dir
pub const CONFIG_DIR_NAME: &str = "histeq";

/// Config file name inside [`CONFIG_DIR_NAME`]
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Bytes needed to hold `pixels` samples on the device, padded to whole words.
///
/// Never returns zero: empty planes still get one word so bindings stay valid.
pub fn padded_plane_bytes(pixels: usize) -> u64 {
    let words = pixels.div_ceil(SAMPLES_PER_WORD).max(1);
    (words * SAMPLES_PER_WORD) as u64
}
