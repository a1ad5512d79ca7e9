// SPDX-License-Identifier: GPL-3.0-only

//! histeq - GPU histogram equalization for 8-bit images
//!
//! Greyscale and RGB images are equalized one channel plane at a time by a
//! four-stage data-parallel pipeline: atomic histogram accumulation, a
//! Hillis–Steele prefix scan, normalization into a lookup table, and LUT
//! application.
//!
//! # Architecture
//!
//! - [`pipelines`]: the channel pipeline and the image orchestrator
//! - [`backends`]: the compute-backend contract with wgpu and CPU implementations
//! - [`shaders`]: WGSL kernels and dispatch helpers
//! - [`gpu`]: device creation and adapter listing
//! - [`media`]: image planes and `image` crate conversions
//! - [`config`]: user configuration handling
//!
//! # Example
//!
//! ```no_run
//! use histeq::backends::CpuBackend;
//! use histeq::media::InterleavedImage;
//! use histeq::pipelines::Equalizer;
//!
//! let image = InterleavedImage::new(2, 2, 1, vec![0, 64, 128, 255])?;
//! let equalized = Equalizer::new(CpuBackend::new()).equalize(&image)?;
//! assert_eq!(equalized.image.data(), &[64, 128, 191, 255]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod gpu;
pub mod media;
pub mod pipelines;
pub mod shaders;

// Re-export commonly used types
pub use backends::{AnyBackend, ComputeBackend, CpuBackend, WgpuBackend};
pub use config::{BackendPreference, Config, PowerPreference};
pub use errors::{EqualizeError, EqualizeResult, InputError, Stage};
pub use media::{Channel, InterleavedImage, Plane};
pub use pipelines::{EqualizeOptions, EqualizedImage, Equalizer};
