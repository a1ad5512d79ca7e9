// SPDX-License-Identifier: GPL-3.0-only

//! GPU initialization utilities for compute pipelines.
//!
//! This module provides helpers for creating wgpu devices for compute work
//! and for listing the adapters the `devices` command reports.

use crate::config::PowerPreference;
use crate::errors::BackendError;
use std::sync::Arc;
use tracing::{debug, info};

/// Re-export wgpu for the compute backend and shader helpers
pub use ::wgpu;

/// Information about the created GPU device
#[derive(Debug, Clone)]
pub struct GpuDeviceInfo {
    /// Name of the GPU adapter
    pub adapter_name: String,
    /// Backend being used (Vulkan, Metal, DX12, etc.)
    pub backend: wgpu::Backend,
    /// Discrete, integrated, software, ...
    pub device_type: wgpu::DeviceType,
    /// Largest workgroup count per dispatch dimension
    pub max_workgroups_per_dimension: u32,
}

/// One adapter as reported by `histeq devices`
#[derive(Debug, Clone)]
pub struct AdapterSummary {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
    pub driver: String,
    pub max_workgroup_size: u32,
}

impl From<PowerPreference> for wgpu::PowerPreference {
    fn from(preference: PowerPreference) -> Self {
        match preference {
            PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
            PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
        }
    }
}

fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    })
}

/// Adapters in the order `histeq devices` numbers them
fn enumerate(instance: &wgpu::Instance) -> Vec<wgpu::Adapter> {
    instance.enumerate_adapters(wgpu::Backends::all())
}

/// Take the adapter at `index` of the enumeration order
fn pick_adapter(
    mut adapters: Vec<wgpu::Adapter>,
    index: usize,
) -> Result<wgpu::Adapter, BackendError> {
    let count = adapters.len();
    if index >= count {
        return Err(BackendError::new(
            "select_adapter",
            format!("device index {} is out of range ({} adapters found)", index, count),
        ));
    }
    Ok(adapters.swap_remove(index))
}

/// Create a wgpu device and queue for compute work.
///
/// # Arguments
///
/// * `label` - A label for the device (for debugging)
/// * `power` - Adapter power preference, used when no index is given
/// * `device_index` - Position of the adapter in [`list_adapters`]
///
/// # Returns
///
/// A tuple of (Device, Queue, GpuDeviceInfo) or the reason no device exists
pub async fn create_compute_device(
    label: &str,
    power: PowerPreference,
    device_index: Option<usize>,
) -> Result<(Arc<wgpu::Device>, Arc<wgpu::Queue>, GpuDeviceInfo), BackendError> {
    info!(
        label = label,
        power = ?power,
        device_index = ?device_index,
        "Creating GPU device for compute"
    );

    let instance = create_instance();

    let adapter = match device_index {
        Some(index) => pick_adapter(enumerate(&instance), index)?,
        None => instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: power.into(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| BackendError::new("request_adapter", e.to_string()))?,
    };

    let adapter_info = adapter.get_info();
    let adapter_limits = adapter.limits();

    info!(
        adapter = %adapter_info.name,
        backend = ?adapter_info.backend,
        device_type = ?adapter_info.device_type,
        "GPU adapter selected for compute"
    );

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some(label),
            required_features: wgpu::Features::empty(),
            required_limits: adapter_limits.clone(),
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        })
        .await
        .map_err(|e| BackendError::new("request_device", e.to_string()))?;

    debug!(
        max_buffer_size = adapter_limits.max_buffer_size,
        max_storage_binding = adapter_limits.max_storage_buffer_binding_size,
        max_workgroups = adapter_limits.max_compute_workgroups_per_dimension,
        "GPU device limits"
    );

    let info = GpuDeviceInfo {
        adapter_name: adapter_info.name.clone(),
        backend: adapter_info.backend,
        device_type: adapter_info.device_type,
        max_workgroups_per_dimension: adapter_limits.max_compute_workgroups_per_dimension,
    };

    Ok((Arc::new(device), Arc::new(queue), info))
}

/// List every adapter wgpu can see, without creating devices
pub fn list_adapters() -> Vec<AdapterSummary> {
    enumerate(&create_instance())
        .into_iter()
        .map(|adapter| {
            let info = adapter.get_info();
            AdapterSummary {
                name: info.name,
                backend: info.backend,
                device_type: info.device_type,
                driver: info.driver,
                max_workgroup_size: adapter.limits().max_compute_workgroup_size_x,
            }
        })
        .collect()
}
