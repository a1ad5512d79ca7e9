// SPDX-License-Identifier: GPL-3.0-only

//! Shared GPU processor infrastructure
//!
//! Dispatch sizing and buffer readback used by the wgpu compute backend.

use crate::errors::BackendError;
use crate::gpu::wgpu;

/// Helper for buffer readback (map, poll, read, unmap)
///
/// Blocks until every submission that touches `buffer` has completed.
///
/// # Arguments
/// * `device` - The wgpu device for polling
/// * `buffer` - The buffer to read from (must be MAP_READ)
///
/// # Returns
/// The buffer contents as a Vec<u8>
pub fn read_buffer(device: &wgpu::Device, buffer: &wgpu::Buffer) -> Result<Vec<u8>, BackendError> {
    let slice = buffer.slice(..);
    let (sender, receiver) = futures::channel::oneshot::channel();

    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });

    device
        .poll(wgpu::PollType::wait_indefinitely())
        .map_err(|e| BackendError::new("read", format!("device poll failed: {:?}", e)))?;

    pollster::block_on(receiver)
        .map_err(|_| BackendError::new("read", "Failed to receive buffer mapping"))?
        .map_err(|e| BackendError::new("read", format!("Failed to map buffer: {:?}", e)))?;

    let data = slice.get_mapped_range().to_vec();
    buffer.unmap();

    Ok(data)
}

/// Calculate compute shader dispatch size (workgroups needed)
///
/// Given a task count and workgroup size, returns the number of workgroups
/// needed to cover every task.
#[inline]
pub fn compute_dispatch_size(tasks: u32, workgroup_size: u32) -> u32 {
    tasks.div_ceil(workgroup_size)
}

/// Spread `workgroups` over x and y when it exceeds the per-dimension limit.
///
/// Kernels rebuild the linear index as `gid.x + gid.y * groups.x * size`, so
/// the grid may overshoot; the extra invocations bounds-check and exit.
/// Returns `None` when even a square grid would not fit.
pub fn tile_workgroups(workgroups: u32, max_per_dimension: u32) -> Option<(u32, u32)> {
    if max_per_dimension == 0 {
        return None;
    }
    if workgroups <= max_per_dimension {
        return Some((workgroups, 1));
    }
    let rows = workgroups.div_ceil(max_per_dimension);
    if rows > max_per_dimension {
        return None;
    }
    Some((workgroups.div_ceil(rows), rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_dispatch_size() {
        assert_eq!(compute_dispatch_size(640, 16), 40);
        assert_eq!(compute_dispatch_size(641, 16), 41);
        assert_eq!(compute_dispatch_size(256, 256), 1);
        assert_eq!(compute_dispatch_size(1, 256), 1);
        assert_eq!(compute_dispatch_size(0, 256), 0);
    }

    #[test]
    fn test_tile_workgroups_fits_one_row() {
        assert_eq!(tile_workgroups(100, 65535), Some((100, 1)));
        assert_eq!(tile_workgroups(65535, 65535), Some((65535, 1)));
    }

    #[test]
    fn test_tile_workgroups_covers_every_group() {
        let (x, y) = tile_workgroups(200_000, 65535).unwrap();
        assert!(x <= 65535 && y <= 65535);
        assert!(x as u64 * y as u64 >= 200_000);

        assert_eq!(tile_workgroups(7, 3), Some((3, 3)));
    }

    #[test]
    fn test_tile_workgroups_too_large() {
        assert_eq!(tile_workgroups(10, 3), None);
        assert_eq!(tile_workgroups(1, 0), None);
    }
}
