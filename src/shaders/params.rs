// SPDX-License-Identifier: GPL-3.0-only

//! Uniform parameter blocks for the equalization kernels
//!
//! Layouts mirror the WGSL structs; each is padded to 16 bytes.

use bytemuck::{Pod, Zeroable};

/// Histogram kernel parameters
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct AccumulateParams {
    pub pixel_count: u32,
    pub _padding0: u32,
    pub _padding1: u32,
    pub _padding2: u32,
}

/// Scan pass parameters
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct ScanParams {
    pub offset: u32,
    pub len: u32,
    pub _padding0: u32,
    pub _padding1: u32,
}

/// Normalize kernel parameters
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct NormalizeParams {
    pub total: u32,
    /// Non-zero emits the identity LUT
    pub identity: u32,
    pub _padding0: u32,
    pub _padding1: u32,
}

/// LUT application parameters
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct ApplyParams {
    pub pixel_count: u32,
    pub word_count: u32,
    pub _padding0: u32,
    pub _padding1: u32,
}
