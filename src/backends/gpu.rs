// SPDX-License-Identifier: GPL-3.0-only

//! wgpu compute backend
//!
//! Each kernel is a WGSL program compiled once when the backend is created.
//! Launches record one compute pass and submit it without waiting; the queue
//! executes submissions in order, which gives the FIFO guarantee the pipeline
//! relies on. Reads map a staging copy and block until it is available.

use super::{ComputeBackend, Kernel};
use crate::config::PowerPreference;
use crate::constants::{BIN_COUNT, SAMPLES_PER_WORD, WORKGROUP_SIZE};
use crate::errors::{BackendError, CompileError, EqualizeError, EqualizeResult};
use crate::gpu::wgpu::util::DeviceExt;
use crate::gpu::{self, GpuDeviceInfo, wgpu};
use crate::shaders::gpu_helpers::{self, BindingKind};
use crate::shaders::gpu_processor::{compute_dispatch_size, read_buffer, tile_workgroups};
use crate::shaders::{self, params};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Device-resident storage buffer
#[derive(Debug)]
pub struct GpuBuffer {
    label: &'static str,
    buffer: wgpu::Buffer,
    size: u64,
}

/// A compiled kernel and the layout of its single bind group
struct KernelProgram {
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
}

/// Compute backend on a wgpu device
pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    info: GpuDeviceInfo,
    name: String,
    accumulate: KernelProgram,
    scan: KernelProgram,
    normalize: KernelProgram,
    apply: KernelProgram,
}

/// Format one compiler diagnostic as `line:column: message`
fn format_message(message: &wgpu::CompilationMessage) -> String {
    match &message.location {
        Some(location) => format!(
            "{}:{}: {}",
            location.line_number, location.line_position, message.message
        ),
        None => message.message.clone(),
    }
}

/// Build one kernel program, collecting the compiler's diagnostics as the log.
async fn compile_program(
    device: &wgpu::Device,
    program: &'static str,
    source: &str,
    bindings: &[BindingKind],
) -> Result<(wgpu::BindGroupLayout, wgpu::ComputePipeline), CompileError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(program),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let compilation = module.get_compilation_info().await;
    let layout = gpu_helpers::create_layout(device, program, bindings);
    let pipeline = gpu_helpers::create_pipeline(device, program, &layout, &module, "main");

    let scope_error = device.pop_error_scope().await;

    let mut log = Vec::new();
    for message in &compilation.messages {
        match message.message_type {
            wgpu::CompilationMessageType::Error => log.push(format_message(message)),
            _ => debug!(program, message = %format_message(message), "Shader diagnostic"),
        }
    }
    if log.is_empty()
        && let Some(error) = scope_error
    {
        log.push(error.to_string());
    }

    if !log.is_empty() {
        return Err(CompileError {
            program,
            log: log.join("\n"),
        });
    }

    debug!(program, "Kernel program built");
    Ok((layout, pipeline))
}

async fn build_kernel(
    device: &wgpu::Device,
    program: &'static str,
    source: &str,
    bindings: &[BindingKind],
) -> Result<KernelProgram, CompileError> {
    let (layout, pipeline) = compile_program(device, program, source, bindings).await?;
    Ok(KernelProgram { layout, pipeline })
}

fn ensure_distinct(read: &GpuBuffer, written: &GpuBuffer) -> Result<(), BackendError> {
    if std::ptr::eq(read, written) {
        return Err(BackendError::new(
            "launch",
            format!("`{}` is both read and written by one kernel", written.label),
        ));
    }
    Ok(())
}

impl WgpuBackend {
    /// Create a device and build all four kernel programs.
    ///
    /// `device_index` picks an adapter from [`gpu::list_adapters`]; without
    /// one the adapter is chosen by `power`.
    ///
    /// Fails with [`EqualizeError::Device`] when no adapter or device is
    /// available (including an out-of-range index) and with
    /// [`EqualizeError::Compile`] when a program does not build.
    pub async fn new(power: PowerPreference, device_index: Option<usize>) -> EqualizeResult<Self> {
        let (device, queue, info) =
            gpu::create_compute_device("histeq_compute", power, device_index)
                .await
                .map_err(EqualizeError::Device)?;

        use BindingKind::{StorageRead, StorageReadWrite, Uniform};
        let accumulate = build_kernel(
            &device,
            "histogram",
            shaders::HISTOGRAM_SHADER,
            &[StorageRead, StorageReadWrite, Uniform],
        )
        .await?;
        let scan = build_kernel(
            &device,
            "scan",
            shaders::SCAN_SHADER,
            &[StorageRead, StorageReadWrite, Uniform],
        )
        .await?;
        let normalize = build_kernel(
            &device,
            "normalize",
            shaders::NORMALIZE_SHADER,
            &[StorageRead, StorageReadWrite, Uniform],
        )
        .await?;
        let apply = build_kernel(
            &device,
            "apply",
            shaders::APPLY_SHADER,
            &[StorageRead, StorageRead, StorageReadWrite, Uniform],
        )
        .await?;

        let name = format!("{} ({:?})", info.adapter_name, info.backend);
        info!(device = %name, "GPU compute backend ready");

        Ok(Self {
            device,
            queue,
            info,
            name,
            accumulate,
            scan,
            normalize,
            apply,
        })
    }

    /// Adapter details of the device in use
    pub fn info(&self) -> &GpuDeviceInfo {
        &self.info
    }

    /// Run `f` inside validation and out-of-memory error scopes
    fn scoped<T>(&self, operation: &'static str, f: impl FnOnce() -> T) -> Result<T, BackendError> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f();
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());
        match validation.or(out_of_memory) {
            Some(error) => Err(BackendError::new(operation, error.to_string())),
            None => Ok(value),
        }
    }
}

impl ComputeBackend for WgpuBackend {
    type Buffer = GpuBuffer;

    fn name(&self) -> &str {
        &self.name
    }

    fn allocate(&self, label: &'static str, size: u64) -> Result<GpuBuffer, BackendError> {
        if size == 0 || size % 4 != 0 {
            return Err(BackendError::new(
                "allocate",
                format!("size {} of `{}` is not a positive multiple of 4", size, label),
            ));
        }
        let limits = self.device.limits();
        let max = limits
            .max_buffer_size
            .min(u64::from(limits.max_storage_buffer_binding_size));
        if size > max {
            return Err(BackendError::new(
                "allocate",
                format!("`{}` needs {} bytes, device allows {}", label, size, max),
            ));
        }

        debug!(label, size, "Allocating device buffer");
        let buffer = self.scoped("allocate", || {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        })?;
        Ok(GpuBuffer {
            label,
            buffer,
            size,
        })
    }

    fn write(&self, buffer: &GpuBuffer, data: &[u8]) -> Result<(), BackendError> {
        if data.len() as u64 > buffer.size {
            return Err(BackendError::new(
                "write",
                format!("{} bytes do not fit `{}`", data.len(), buffer.label),
            ));
        }
        if data.is_empty() {
            return Ok(());
        }

        // Queue writes must be 4-byte sized; buffers always are
        let padded;
        let data = if data.len() % 4 == 0 {
            data
        } else {
            padded = {
                let mut bytes = data.to_vec();
                bytes.resize(data.len().next_multiple_of(4), 0);
                bytes
            };
            &padded
        };
        self.scoped("write", || self.queue.write_buffer(&buffer.buffer, 0, data))
    }

    fn fill_zero(&self, buffer: &GpuBuffer) -> Result<(), BackendError> {
        self.scoped("fill", || {
            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("fill_zero"),
                });
            encoder.clear_buffer(&buffer.buffer, 0, None);
            self.queue.submit(std::iter::once(encoder.finish()));
        })
    }

    fn launch(&self, kernel: Kernel<'_, GpuBuffer>) -> Result<(), BackendError> {
        let name = kernel.name();
        let tasks = kernel.task_count();
        if tasks == 0 {
            debug!(kernel = name, "Skipping empty launch");
            return Ok(());
        }

        let (program, uniform, buffers): (&KernelProgram, Vec<u8>, Vec<&wgpu::Buffer>) =
            match kernel {
                Kernel::Accumulate {
                    pixels,
                    histogram,
                    pixel_count,
                } => {
                    ensure_distinct(pixels, histogram)?;
                    let params = params::AccumulateParams {
                        pixel_count,
                        ..Default::default()
                    };
                    (
                        &self.accumulate,
                        bytemuck::bytes_of(&params).to_vec(),
                        vec![&pixels.buffer, &histogram.buffer],
                    )
                }
                Kernel::ScanStep { src, dst, offset } => {
                    ensure_distinct(src, dst)?;
                    let params = params::ScanParams {
                        offset,
                        len: BIN_COUNT as u32,
                        ..Default::default()
                    };
                    (
                        &self.scan,
                        bytemuck::bytes_of(&params).to_vec(),
                        vec![&src.buffer, &dst.buffer],
                    )
                }
                Kernel::Normalize {
                    cumulative,
                    lut,
                    params: normalize,
                } => {
                    ensure_distinct(cumulative, lut)?;
                    let params = params::NormalizeParams {
                        total: normalize.total,
                        identity: u32::from(normalize.identity),
                        ..Default::default()
                    };
                    (
                        &self.normalize,
                        bytemuck::bytes_of(&params).to_vec(),
                        vec![&cumulative.buffer, &lut.buffer],
                    )
                }
                Kernel::Apply {
                    pixels,
                    lut,
                    output,
                    pixel_count,
                } => {
                    ensure_distinct(pixels, output)?;
                    ensure_distinct(lut, output)?;
                    let params = params::ApplyParams {
                        pixel_count,
                        word_count: pixel_count.div_ceil(SAMPLES_PER_WORD as u32),
                        ..Default::default()
                    };
                    (
                        &self.apply,
                        bytemuck::bytes_of(&params).to_vec(),
                        vec![&pixels.buffer, &lut.buffer, &output.buffer],
                    )
                }
            };

        let workgroups = compute_dispatch_size(tasks, WORKGROUP_SIZE);
        let (x, y) = tile_workgroups(workgroups, self.info.max_workgroups_per_dimension)
            .ok_or_else(|| {
                BackendError::new(
                    "launch",
                    format!("{} workgroups exceed the device dispatch grid", workgroups),
                )
            })?;
        debug!(kernel = name, tasks, x, y, "Dispatching GPU kernel");

        self.scoped("launch", || {
            let params = self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(name),
                    contents: &uniform,
                    usage: wgpu::BufferUsages::UNIFORM,
                });
            let bound: Vec<&wgpu::Buffer> = buffers
                .iter()
                .copied()
                .chain(std::iter::once(&params))
                .collect();
            let bind_group =
                gpu_helpers::create_bind_group(&self.device, name, &program.layout, &bound);

            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(name) });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(name),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&program.pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(x, y, 1);
            }
            self.queue.submit(std::iter::once(encoder.finish()));
        })
    }

    fn read(&self, buffer: &GpuBuffer, size: u64) -> Result<Vec<u8>, BackendError> {
        if size > buffer.size {
            return Err(BackendError::new(
                "read",
                format!("{} bytes requested from {}-byte `{}`", size, buffer.size, buffer.label),
            ));
        }
        let copy_size = size.next_multiple_of(4);
        if copy_size == 0 {
            self.synchronize()?;
            return Ok(Vec::new());
        }

        let staging = self.scoped("read", || {
            let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("readback"),
                size: copy_size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("readback"),
                });
            encoder.copy_buffer_to_buffer(&buffer.buffer, 0, &staging, 0, copy_size);
            self.queue.submit(std::iter::once(encoder.finish()));
            staging
        })?;

        let mut data = read_buffer(&self.device, &staging)?;
        data.truncate(size as usize);
        Ok(data)
    }

    fn synchronize(&self) -> Result<(), BackendError> {
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map(|_| ())
            .map_err(|e| {
                warn!(error = ?e, "GPU queue did not drain");
                BackendError::new("synchronize", format!("{:?}", e))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn backend() -> Option<WgpuBackend> {
        match WgpuBackend::new(PowerPreference::default(), None).await {
            Ok(backend) => Some(backend),
            Err(EqualizeError::Device(e)) => {
                println!("Skipping test (no GPU): {}", e);
                None
            }
            Err(e) => panic!("backend creation failed: {}", e),
        }
    }

    #[tokio::test]
    async fn test_broken_program_reports_build_log() {
        let Ok((device, _queue, _info)) =
            gpu::create_compute_device("test_compile", PowerPreference::default(), None).await
        else {
            println!("Skipping test (no GPU)");
            return;
        };
        let broken = "@compute @workgroup_size(256)\nfn main() { let x = ; }\n";
        let err = build_kernel(&device, "broken", broken, &[])
            .await
            .err()
            .expect("broken program must not build");
        assert_eq!(err.program, "broken");
        assert!(!err.log.is_empty());
    }

    #[tokio::test]
    async fn test_unaligned_write_read() {
        let Some(backend) = backend().await else {
            return;
        };
        let buffer = backend.allocate("test", 8).unwrap();
        backend.write(&buffer, &[9; 8]).unwrap();
        backend.write(&buffer, &[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(backend.read(&buffer, 5).unwrap(), vec![1, 2, 3, 4, 5]);
        assert_eq!(backend.read(&buffer, 8).unwrap(), vec![1, 2, 3, 4, 5, 0, 0, 0]);

        backend.fill_zero(&buffer).unwrap();
        assert_eq!(backend.read(&buffer, 8).unwrap(), vec![0; 8]);
    }

    #[tokio::test]
    async fn test_oversized_write_rejected() {
        let Some(backend) = backend().await else {
            return;
        };
        let buffer = backend.allocate("test", 4).unwrap();
        let err = backend.write(&buffer, &[0; 5]).unwrap_err();
        assert_eq!(err.operation, "write");
    }

    #[tokio::test]
    async fn test_aliased_scan_rejected() {
        let Some(backend) = backend().await else {
            return;
        };
        let buffer = backend.allocate("table", 1024).unwrap();
        let err = backend
            .launch(Kernel::ScanStep {
                src: &buffer,
                dst: &buffer,
                offset: 1,
            })
            .unwrap_err();
        assert_eq!(err.operation, "launch");
    }
}
