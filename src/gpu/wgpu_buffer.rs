//! wgpu back end for `DeviceBuffer`
//!
//! Host-readable buffers get a MAP_READ staging twin; reads copy into it,
//! submit, and block on the map callback.

use super::buffer_manager::{check_range, BufferAllocator, BufferUsage, DeviceBuffer};
use crate::error::{EngineError, EngineResult, OptionExt};
use std::sync::Arc;

pub struct WgpuBuffer {
    label: String,
    usage: BufferUsage,
    size: u64,
    buffer: wgpu::Buffer,
    staging: Option<wgpu::Buffer>,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
}

fn check_alignment(offset: u64, len: u64) -> EngineResult<()> {
    if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 || len % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
        return Err(EngineError::GpuOperationFailed {
            operation: "buffer copy".to_string(),
            error: format!(
                "offset {} and length {} must be multiples of {}",
                offset,
                len,
                wgpu::COPY_BUFFER_ALIGNMENT
            ),
        });
    }
    Ok(())
}

impl DeviceBuffer for WgpuBuffer {
    fn label(&self) -> &str {
        &self.label
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn usage(&self) -> BufferUsage {
        self.usage
    }

    fn copy(&self, data: &[u8], offset: u64) -> EngineResult<()> {
        check_range(offset, data.len() as u64, self.size)?;
        check_alignment(offset, data.len() as u64)?;
        self.queue.write_buffer(&self.buffer, offset, data);
        Ok(())
    }

    fn read(&self, out: &mut [u8]) -> EngineResult<()> {
        let staging = self
            .staging
            .as_ref()
            .ok_or_engine(|| EngineError::BufferNotReadable {
                label: self.label.clone(),
            })?;
        let len = out.len() as u64;
        check_range(0, len, self.size)?;
        check_alignment(0, len)?;
        if len == 0 {
            return Ok(());
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Buffer Readback"),
            });
        encoder.copy_buffer_to_buffer(&self.buffer, 0, staging, 0, len);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..len);
        let (sender, receiver) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);

        receiver
            .recv()?
            .map_err(|e| EngineError::GpuOperationFailed {
                operation: format!("map '{}'", self.label),
                error: e.to_string(),
            })?;

        {
            let mapped = slice.get_mapped_range();
            out.copy_from_slice(&mapped);
        }
        staging.unmap();
        Ok(())
    }

    fn binding(&self) -> Option<wgpu::BindingResource<'_>> {
        Some(self.buffer.as_entire_binding())
    }
}

/// Allocates `WgpuBuffer`s on one device
pub struct WgpuAllocator {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
}

impl WgpuAllocator {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self { device, queue }
    }

    /// Open the default adapter without a surface
    pub fn new_headless() -> EngineResult<Self> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            ..Default::default()
        }))
        .ok_or(EngineError::DeviceNotFound)?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("SDF Engine Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
            },
            None,
        ))
        .map_err(|e| EngineError::GpuOperationFailed {
            operation: "request_device".to_string(),
            error: e.to_string(),
        })?;

        log::info!(
            "[WgpuAllocator::new_headless] using adapter '{}'",
            adapter.get_info().name
        );
        Ok(Self::new(Arc::new(device), Arc::new(queue)))
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }
}

impl BufferAllocator for WgpuAllocator {
    fn allocate(
        &self,
        label: &str,
        size: u64,
        usage: BufferUsage,
    ) -> EngineResult<Box<dyn DeviceBuffer>> {
        let max = self.device.limits().max_storage_buffer_binding_size as u64;
        if size == 0 || size > max {
            log::error!(
                "[WgpuAllocator::allocate] '{}' size {} outside 1..={}",
                label,
                size,
                max
            );
            return Err(EngineError::BufferCreationFailed {
                size,
                usage: usage.to_string(),
            });
        }
        // wgpu needs sizes padded to the copy alignment
        let padded = size.div_ceil(wgpu::COPY_BUFFER_ALIGNMENT) * wgpu::COPY_BUFFER_ALIGNMENT;

        let mut usages = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST;
        if usage.host_readable() {
            usages |= wgpu::BufferUsages::COPY_SRC;
        }
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: padded,
            usage: usages,
            mapped_at_creation: false,
        });

        let staging = usage.host_readable().then(|| {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("{} Readback", label)),
                size: padded,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });

        Ok(Box::new(WgpuBuffer {
            label: label.to_string(),
            usage,
            size,
            buffer,
            staging,
            device: self.device.clone(),
            queue: self.queue.clone(),
        }))
    }
}
