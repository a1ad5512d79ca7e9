// SPDX-License-Identifier: GPL-3.0-only
//! WGSL kernels and GPU dispatch helpers for histogram equalization
//!
//! Each kernel is a standalone program with a `main` entry point and a single
//! bind group. Planes are stored byte-packed, four 8-bit samples per `u32`;
//! histogram, cumulative histogram and LUT buffers hold 256 `u32` entries.

pub mod gpu_helpers;
pub mod gpu_processor;
pub mod params;

pub use gpu_processor::{compute_dispatch_size, tile_workgroups};

/// Atomic histogram accumulation, one invocation per pixel
pub const HISTOGRAM_SHADER: &str = include_str!("histogram.wgsl");

/// One Hillis–Steele inclusive scan pass
pub const SCAN_SHADER: &str = include_str!("scan.wgsl");

/// Cumulative histogram to LUT
pub const NORMALIZE_SHADER: &str = include_str!("normalize.wgsl");

/// LUT application, one invocation per packed word
pub const APPLY_SHADER: &str = include_str!("apply.wgsl");

#[cfg(test)]
mod tests {
    use super::*;

    /// Validate that a WGSL shader compiles successfully using naga
    fn validate_shader(name: &str, source: &str) {
        let result = naga::front::wgsl::parse_str(source);
        match result {
            Ok(module) => {
                let info = naga::valid::Validator::new(
                    naga::valid::ValidationFlags::all(),
                    naga::valid::Capabilities::all(),
                )
                .validate(&module);

                if let Err(e) = info {
                    panic!("Shader '{}' validation failed: {:?}", name, e);
                }
                assert!(
                    module.entry_points.iter().any(|ep| ep.name == "main"),
                    "Shader '{}' has no main entry point",
                    name
                );
            }
            Err(e) => {
                panic!("Shader '{}' parse failed: {:?}", name, e);
            }
        }
    }

    #[test]
    fn test_histogram_shader_valid() {
        validate_shader("histogram", HISTOGRAM_SHADER);
    }

    #[test]
    fn test_scan_shader_valid() {
        validate_shader("scan", SCAN_SHADER);
    }

    #[test]
    fn test_normalize_shader_valid() {
        validate_shader("normalize", NORMALIZE_SHADER);
    }

    #[test]
    fn test_apply_shader_valid() {
        validate_shader("apply", APPLY_SHADER);
    }

    #[test]
    fn test_kernels_use_shared_workgroup_size() {
        let attribute = format!("@workgroup_size({})", crate::constants::WORKGROUP_SIZE);
        for source in [HISTOGRAM_SHADER, SCAN_SHADER, NORMALIZE_SHADER, APPLY_SHADER] {
            assert!(source.contains(&attribute));
        }
    }
}
