// SPDX-License-Identifier: GPL-3.0-only

//! Compute backend abstraction
//!
//! The equalization stages only need five primitives from an accelerator:
//! buffer allocation, host-to-device writes, device-to-host reads, zero-fill,
//! and kernel launches. [`ComputeBackend`] is that contract.
//!
//! Launches are enqueued in FIFO order; a launch may return before the kernel
//! has run. [`ComputeBackend::read`] and [`ComputeBackend::synchronize`] are the
//! only blocking calls and act as host barriers.
//!
//! - [`cpu`]: rayon data-parallel kernels on the host
//! - [`gpu`]: WGSL compute kernels on a wgpu device

pub mod cpu;
pub mod gpu;

use crate::config::{BackendPreference, PowerPreference};
use crate::constants::{SAMPLES_PER_WORD, WORKGROUP_SIZE};
use crate::errors::{BackendError, EqualizeError, EqualizeResult};
use std::fmt;
use tracing::{info, warn};

pub use cpu::CpuBackend;
pub use gpu::WgpuBackend;

/// Parameters of the normalize kernel, derived from the cumulative histogram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeParams {
    /// Total pixel count (last cumulative entry)
    pub total: u32,
    /// Emit the identity mapping instead of scaling
    pub identity: bool,
}

/// One kernel launch with its buffer arguments
pub enum Kernel<'a, B> {
    /// Atomically count every sample of `pixels` into `histogram`
    Accumulate {
        pixels: &'a B,
        histogram: &'a B,
        pixel_count: u32,
    },
    /// One Hillis–Steele pass: `dst[i] = src[i] + src[i - offset]` for `i >= offset`
    ScanStep { src: &'a B, dst: &'a B, offset: u32 },
    /// Scale a cumulative histogram into a LUT
    Normalize {
        cumulative: &'a B,
        lut: &'a B,
        params: NormalizeParams,
    },
    /// `output[p] = lut[pixels[p]]`
    Apply {
        pixels: &'a B,
        lut: &'a B,
        output: &'a B,
        pixel_count: u32,
    },
}

impl<B> Kernel<'_, B> {
    pub fn name(&self) -> &'static str {
        match self {
            Kernel::Accumulate { .. } => "accumulate",
            Kernel::ScanStep { .. } => "scan_step",
            Kernel::Normalize { .. } => "normalize",
            Kernel::Apply { .. } => "apply",
        }
    }

    /// Number of parallel tasks the launch declares
    pub fn task_count(&self) -> u32 {
        match self {
            Kernel::Accumulate { pixel_count, .. } => *pixel_count,
            Kernel::ScanStep { .. } | Kernel::Normalize { .. } => WORKGROUP_SIZE,
            // Planes are byte-packed into u32 words; each task owns one word
            Kernel::Apply { pixel_count, .. } => {
                pixel_count.div_ceil(SAMPLES_PER_WORD as u32)
            }
        }
    }
}

/// Device primitives the pipeline is written against
pub trait ComputeBackend: Send + Sync {
    /// Device-resident buffer handle; released on drop
    type Buffer;

    /// Human-readable backend/device name
    fn name(&self) -> &str;

    /// Allocate a buffer of `size` bytes (a multiple of 4)
    fn allocate(&self, label: &'static str, size: u64) -> Result<Self::Buffer, BackendError>;

    /// Copy `data` to the start of `buffer`.
    ///
    /// When `data.len()` is not a multiple of 4, the rest of the last word
    /// is zeroed; bytes past that word are left untouched.
    fn write(&self, buffer: &Self::Buffer, data: &[u8]) -> Result<(), BackendError>;

    /// Set every byte of `buffer` to zero
    fn fill_zero(&self, buffer: &Self::Buffer) -> Result<(), BackendError>;

    /// Enqueue a kernel
    fn launch(&self, kernel: Kernel<'_, Self::Buffer>) -> Result<(), BackendError>;

    /// Wait for all enqueued work, then copy `size` bytes back to the host
    fn read(&self, buffer: &Self::Buffer, size: u64) -> Result<Vec<u8>, BackendError>;

    /// Wait for all enqueued work to finish
    fn synchronize(&self) -> Result<(), BackendError>;
}

/// Backend picked at runtime from configuration
pub enum AnyBackend {
    Cpu(CpuBackend),
    Gpu(WgpuBackend),
}

impl fmt::Debug for AnyBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnyBackend::Cpu(backend) => write!(f, "Cpu({})", backend.name()),
            AnyBackend::Gpu(backend) => write!(f, "Gpu({})", backend.name()),
        }
    }
}

impl AnyBackend {
    /// Create the backend a preference asks for.
    ///
    /// `Auto` falls back to the CPU only when no GPU device can be created;
    /// a kernel build failure is returned as-is. `device_index` is passed to
    /// [`WgpuBackend::new`] and ignored by the CPU backend.
    pub fn select(
        preference: BackendPreference,
        power: PowerPreference,
        device_index: Option<usize>,
    ) -> EqualizeResult<Self> {
        match preference {
            BackendPreference::Cpu => Ok(AnyBackend::Cpu(CpuBackend::new())),
            BackendPreference::Gpu => Ok(AnyBackend::Gpu(pollster::block_on(WgpuBackend::new(
                power,
                device_index,
            ))?)),
            BackendPreference::Auto => {
                match pollster::block_on(WgpuBackend::new(power, device_index)) {
                    Ok(backend) => Ok(AnyBackend::Gpu(backend)),
                    Err(EqualizeError::Device(error)) => {
                        warn!(error = %error, "GPU unavailable, using CPU backend");
                        Ok(AnyBackend::Cpu(CpuBackend::new()))
                    }
                    Err(e) => Err(e),
                }
            }
        }
        .inspect(|backend| info!(backend = ?backend, "Compute backend selected"))
    }
}

/// Buffer of either backend
pub enum AnyBuffer {
    Cpu(<CpuBackend as ComputeBackend>::Buffer),
    Gpu(<WgpuBackend as ComputeBackend>::Buffer),
}

fn mismatched() -> BackendError {
    BackendError::new("dispatch", "buffer belongs to a different backend")
}

impl ComputeBackend for AnyBackend {
    type Buffer = AnyBuffer;

    fn name(&self) -> &str {
        match self {
            AnyBackend::Cpu(backend) => backend.name(),
            AnyBackend::Gpu(backend) => backend.name(),
        }
    }

    fn allocate(&self, label: &'static str, size: u64) -> Result<AnyBuffer, BackendError> {
        match self {
            AnyBackend::Cpu(backend) => backend.allocate(label, size).map(AnyBuffer::Cpu),
            AnyBackend::Gpu(backend) => backend.allocate(label, size).map(AnyBuffer::Gpu),
        }
    }

    fn write(&self, buffer: &AnyBuffer, data: &[u8]) -> Result<(), BackendError> {
        match (self, buffer) {
            (AnyBackend::Cpu(backend), AnyBuffer::Cpu(buffer)) => backend.write(buffer, data),
            (AnyBackend::Gpu(backend), AnyBuffer::Gpu(buffer)) => backend.write(buffer, data),
            _ => Err(mismatched()),
        }
    }

    fn fill_zero(&self, buffer: &AnyBuffer) -> Result<(), BackendError> {
        match (self, buffer) {
            (AnyBackend::Cpu(backend), AnyBuffer::Cpu(buffer)) => backend.fill_zero(buffer),
            (AnyBackend::Gpu(backend), AnyBuffer::Gpu(buffer)) => backend.fill_zero(buffer),
            _ => Err(mismatched()),
        }
    }

    fn launch(&self, kernel: Kernel<'_, AnyBuffer>) -> Result<(), BackendError> {
        match self {
            AnyBackend::Cpu(backend) => backend.launch(narrow(kernel, |b| match b {
                AnyBuffer::Cpu(buffer) => Some(buffer),
                AnyBuffer::Gpu(_) => None,
            })?),
            AnyBackend::Gpu(backend) => backend.launch(narrow(kernel, |b| match b {
                AnyBuffer::Gpu(buffer) => Some(buffer),
                AnyBuffer::Cpu(_) => None,
            })?),
        }
    }

    fn read(&self, buffer: &AnyBuffer, size: u64) -> Result<Vec<u8>, BackendError> {
        match (self, buffer) {
            (AnyBackend::Cpu(backend), AnyBuffer::Cpu(buffer)) => backend.read(buffer, size),
            (AnyBackend::Gpu(backend), AnyBuffer::Gpu(buffer)) => backend.read(buffer, size),
            _ => Err(mismatched()),
        }
    }

    fn synchronize(&self) -> Result<(), BackendError> {
        match self {
            AnyBackend::Cpu(backend) => backend.synchronize(),
            AnyBackend::Gpu(backend) => backend.synchronize(),
        }
    }
}

/// Re-type a kernel's buffer arguments for a concrete backend
fn narrow<'a, B>(
    kernel: Kernel<'a, AnyBuffer>,
    pick: impl Fn(&'a AnyBuffer) -> Option<&'a B>,
) -> Result<Kernel<'a, B>, BackendError> {
    let select = |buffer| pick(buffer).ok_or_else(mismatched);
    Ok(match kernel {
        Kernel::Accumulate {
            pixels,
            histogram,
            pixel_count,
        } => Kernel::Accumulate {
            pixels: select(pixels)?,
            histogram: select(histogram)?,
            pixel_count,
        },
        Kernel::ScanStep { src, dst, offset } => Kernel::ScanStep {
            src: select(src)?,
            dst: select(dst)?,
            offset,
        },
        Kernel::Normalize {
            cumulative,
            lut,
            params,
        } => Kernel::Normalize {
            cumulative: select(cumulative)?,
            lut: select(lut)?,
            params,
        },
        Kernel::Apply {
            pixels,
            lut,
            output,
            pixel_count,
        } => Kernel::Apply {
            pixels: select(pixels)?,
            lut: select(lut)?,
            output: select(output)?,
            pixel_count,
        },
    })
}
