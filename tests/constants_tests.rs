// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for constants module

use histeq::constants::{
    BIN_COUNT, MAX_INTENSITY, MAX_PIXELS, SAMPLES_PER_WORD, SCAN_PASSES, TABLE_BYTES,
    WORKGROUP_SIZE, padded_plane_bytes,
};

#[test]
fn test_bins_cover_every_intensity() {
    assert_eq!(BIN_COUNT, MAX_INTENSITY as usize + 1);
    assert_eq!(TABLE_BYTES, BIN_COUNT as u64 * 4);
}

#[test]
fn test_one_workgroup_covers_the_table() {
    // Scan and normalize dispatch a single workgroup over all bins
    assert_eq!(WORKGROUP_SIZE as usize, BIN_COUNT);
    assert_eq!(2u32.pow(SCAN_PASSES) as usize, BIN_COUNT);
}

#[test]
fn test_plane_padding_is_word_aligned() {
    for pixels in [0usize, 1, 3, 4, 5, 1023, 1024, 1025] {
        let bytes = padded_plane_bytes(pixels);
        assert_eq!(bytes % SAMPLES_PER_WORD as u64, 0);
        assert!(bytes >= pixels as u64);
        assert!(bytes < pixels as u64 + 2 * SAMPLES_PER_WORD as u64);
    }
}

#[test]
fn test_pixel_limit_fits_counters() {
    assert!(MAX_PIXELS <= u64::from(u32::MAX));
}
