// SPDX-License-Identifier: GPL-3.0-only

//! Host compute backend
//!
//! Runs the four kernels with rayon over the same word-packed buffers the GPU
//! uses. Histogram bins are real atomics, and scan steps refuse to read and
//! write the same buffer, so the CPU path exercises the same concurrency
//! rules as the device path.

use super::{ComputeBackend, Kernel, NormalizeParams};
use crate::constants::{BIN_COUNT, SAMPLES_PER_WORD};
use crate::errors::BackendError;
use crate::pipelines::equalize::normalize::lut_entry;
use rayon::prelude::*;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

/// Host-resident buffer of `u32` words
#[derive(Debug)]
pub struct CpuBuffer {
    label: &'static str,
    words: RwLock<Vec<u32>>,
}

impl CpuBuffer {
    fn size(&self) -> Result<u64, BackendError> {
        Ok(self.lock_read("size")?.len() as u64 * 4)
    }

    fn lock_read(
        &self,
        operation: &'static str,
    ) -> Result<std::sync::RwLockReadGuard<'_, Vec<u32>>, BackendError> {
        self.words
            .read()
            .map_err(|_| BackendError::new(operation, format!("buffer `{}` poisoned", self.label)))
    }

    fn lock_write(
        &self,
        operation: &'static str,
    ) -> Result<std::sync::RwLockWriteGuard<'_, Vec<u32>>, BackendError> {
        self.words
            .write()
            .map_err(|_| BackendError::new(operation, format!("buffer `{}` poisoned", self.label)))
    }
}

/// Kernels never read and write the same buffer
fn ensure_distinct(read: &CpuBuffer, written: &CpuBuffer) -> Result<(), BackendError> {
    if std::ptr::eq(read, written) {
        return Err(BackendError::new(
            "launch",
            format!("`{}` is both read and written by one kernel", written.label),
        ));
    }
    Ok(())
}

/// Data-parallel host backend
#[derive(Debug)]
pub struct CpuBackend {
    name: String,
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuBackend {
    pub fn new() -> Self {
        Self {
            name: format!("cpu ({} threads)", rayon::current_num_threads()),
        }
    }

    fn accumulate(
        &self,
        pixels: &CpuBuffer,
        histogram: &CpuBuffer,
        pixel_count: u32,
    ) -> Result<(), BackendError> {
        ensure_distinct(pixels, histogram)?;
        let words = pixels.lock_read("launch")?;
        let samples: &[u8] = bytemuck::cast_slice(words.as_slice());
        let samples = samples.get(..pixel_count as usize).ok_or_else(|| {
            BackendError::new("launch", "pixel count exceeds the plane buffer")
        })?;

        let mut bins = histogram.lock_write("launch")?;
        if bins.len() < BIN_COUNT {
            return Err(BackendError::new("launch", "histogram buffer too small"));
        }

        // Counting adds onto whatever the buffer holds, like the device kernel
        let counters: Vec<AtomicU32> = bins[..BIN_COUNT]
            .iter()
            .map(|&count| AtomicU32::new(count))
            .collect();
        samples.par_iter().for_each(|&sample| {
            counters[sample as usize].fetch_add(1, Ordering::Relaxed);
        });
        for (slot, counter) in bins.iter_mut().zip(counters) {
            *slot = counter.into_inner();
        }
        Ok(())
    }

    fn scan_step(&self, src: &CpuBuffer, dst: &CpuBuffer, offset: u32) -> Result<(), BackendError> {
        ensure_distinct(src, dst)?;
        let previous_guard = src.lock_read("launch")?;
        let mut next = dst.lock_write("launch")?;
        let previous: &[u32] = previous_guard.as_slice();
        if previous.len() < BIN_COUNT || next.len() < BIN_COUNT {
            return Err(BackendError::new("launch", "scan buffer too small"));
        }

        let offset = offset as usize;
        next[..BIN_COUNT]
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, slot)| {
                *slot = if i >= offset {
                    previous[i].wrapping_add(previous[i - offset])
                } else {
                    previous[i]
                };
            });
        Ok(())
    }

    fn normalize(
        &self,
        cumulative: &CpuBuffer,
        lut: &CpuBuffer,
        params: NormalizeParams,
    ) -> Result<(), BackendError> {
        ensure_distinct(cumulative, lut)?;
        let cumulative = cumulative.lock_read("launch")?;
        let mut lut = lut.lock_write("launch")?;
        if cumulative.len() < BIN_COUNT || lut.len() < BIN_COUNT {
            return Err(BackendError::new("launch", "normalize buffer too small"));
        }
        for (i, slot) in lut[..BIN_COUNT].iter_mut().enumerate() {
            *slot = if params.identity || params.total == 0 {
                i as u32
            } else {
                u32::from(lut_entry(cumulative[i], params.total))
            };
        }
        Ok(())
    }

    fn apply(
        &self,
        pixels: &CpuBuffer,
        lut: &CpuBuffer,
        output: &CpuBuffer,
        pixel_count: u32,
    ) -> Result<(), BackendError> {
        ensure_distinct(pixels, output)?;
        ensure_distinct(lut, output)?;
        let words = pixels.lock_read("launch")?;
        let table_guard = lut.lock_read("launch")?;
        let mut out_words = output.lock_write("launch")?;
        let table: &[u32] = table_guard.as_slice();
        if table.len() < BIN_COUNT {
            return Err(BackendError::new("launch", "LUT buffer too small"));
        }

        let count = pixel_count as usize;
        let samples: &[u8] = bytemuck::cast_slice(words.as_slice());
        let out: &mut [u8] = bytemuck::cast_slice_mut(out_words.as_mut_slice());
        if samples.len() < count || out.len() < count {
            return Err(BackendError::new("launch", "pixel count exceeds the plane buffer"));
        }

        out[..count]
            .par_chunks_mut(SAMPLES_PER_WORD)
            .zip(samples[..count].par_chunks(SAMPLES_PER_WORD))
            .for_each(|(dst, src)| {
                for (d, &s) in dst.iter_mut().zip(src) {
                    *d = table[s as usize] as u8;
                }
            });
        Ok(())
    }
}

impl ComputeBackend for CpuBackend {
    type Buffer = CpuBuffer;

    fn name(&self) -> &str {
        &self.name
    }

    fn allocate(&self, label: &'static str, size: u64) -> Result<CpuBuffer, BackendError> {
        if size % 4 != 0 {
            return Err(BackendError::new(
                "allocate",
                format!("size {} of `{}` is not a multiple of 4", size, label),
            ));
        }
        let words = usize::try_from(size / 4)
            .map_err(|_| BackendError::new("allocate", format!("`{}` too large", label)))?;
        debug!(label, size, "Allocating host buffer");
        Ok(CpuBuffer {
            label,
            words: RwLock::new(vec![0; words]),
        })
    }

    fn write(&self, buffer: &CpuBuffer, data: &[u8]) -> Result<(), BackendError> {
        let mut words = buffer.lock_write("write")?;
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(words.as_mut_slice());
        let target = bytes.get_mut(..data.len().next_multiple_of(4)).ok_or_else(|| {
            BackendError::new(
                "write",
                format!("{} bytes do not fit `{}`", data.len(), buffer.label),
            )
        })?;
        let (head, tail) = target.split_at_mut(data.len());
        head.copy_from_slice(data);
        tail.fill(0);
        Ok(())
    }

    fn fill_zero(&self, buffer: &CpuBuffer) -> Result<(), BackendError> {
        buffer.lock_write("fill")?.fill(0);
        Ok(())
    }

    fn launch(&self, kernel: Kernel<'_, CpuBuffer>) -> Result<(), BackendError> {
        debug!(
            kernel = kernel.name(),
            tasks = kernel.task_count(),
            "Running host kernel"
        );
        match kernel {
            Kernel::Accumulate {
                pixels,
                histogram,
                pixel_count,
            } => self.accumulate(pixels, histogram, pixel_count),
            Kernel::ScanStep { src, dst, offset } => self.scan_step(src, dst, offset),
            Kernel::Normalize {
                cumulative,
                lut,
                params,
            } => self.normalize(cumulative, lut, params),
            Kernel::Apply {
                pixels,
                lut,
                output,
                pixel_count,
            } => self.apply(pixels, lut, output, pixel_count),
        }
    }

    fn read(&self, buffer: &CpuBuffer, size: u64) -> Result<Vec<u8>, BackendError> {
        if size > buffer.size()? {
            return Err(BackendError::new(
                "read",
                format!("{} bytes exceed `{}`", size, buffer.label),
            ));
        }
        let words = buffer.lock_read("read")?;
        let bytes: &[u8] = bytemuck::cast_slice(words.as_slice());
        Ok(bytes[..size as usize].to_vec())
    }

    fn synchronize(&self) -> Result<(), BackendError> {
        // Host kernels complete before launch returns
        Ok(())
    }
}
