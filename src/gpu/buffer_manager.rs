//! Device buffer abstraction
//!
//! The core only ever needs four things from a GPU buffer: its size, a
//! host-to-device copy, a device-to-host read (for buffers created
//! host-readable) and a binding for descriptor wiring. `HostBuffer` keeps the
//! bytes in memory so the whole engine can run headless.

use crate::error::{EngineError, EngineResult};
use parking_lot::Mutex;
use std::fmt;

/// Usage hint a buffer is allocated with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// Written by the GPU only
    DeviceLocal,
    /// Written by the host, read by the GPU
    HostToDevice,
    /// Written by the GPU, read back by the host
    DeviceToHost,
}

impl BufferUsage {
    pub fn host_readable(self) -> bool {
        matches!(self, BufferUsage::DeviceToHost)
    }
}

impl fmt::Display for BufferUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BufferUsage::DeviceLocal => "device-local",
            BufferUsage::HostToDevice => "host-to-device",
            BufferUsage::DeviceToHost => "device-to-host",
        };
        f.write_str(name)
    }
}

/// A device-resident buffer
pub trait DeviceBuffer: Send + Sync {
    fn label(&self) -> &str;

    fn size(&self) -> u64;

    fn usage(&self) -> BufferUsage;

    /// Copy `data` into the buffer at byte `offset`
    fn copy(&self, data: &[u8], offset: u64) -> EngineResult<()>;

    /// Read the first `out.len()` bytes of the buffer
    fn read(&self, out: &mut [u8]) -> EngineResult<()>;

    /// Apply a list of sub-region updates, each `(offset, bytes)`
    fn copy_regions(&self, regions: &[(u64, &[u8])]) -> EngineResult<()> {
        regions
            .iter()
            .try_for_each(|(offset, bytes)| self.copy(bytes, *offset))
    }

    /// Resource for bind group creation; `None` for host-only buffers
    #[cfg(feature = "native")]
    fn binding(&self) -> Option<wgpu::BindingResource<'_>>;
}

/// Creates device buffers
pub trait BufferAllocator: Send + Sync {
    fn allocate(
        &self,
        label: &str,
        size: u64,
        usage: BufferUsage,
    ) -> EngineResult<Box<dyn DeviceBuffer>>;
}

/// Fail unless `offset + len` fits in `size`
pub fn check_range(offset: u64, len: u64, size: u64) -> EngineResult<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(EngineError::BufferAccess { offset, len, size }),
    }
}

/// In-memory buffer with the same contract as a device buffer
pub struct HostBuffer {
    label: String,
    usage: BufferUsage,
    bytes: Mutex<Vec<u8>>,
}

impl HostBuffer {
    pub fn new(label: &str, size: u64, usage: BufferUsage) -> EngineResult<Self> {
        let len = usize::try_from(size).map_err(|_| EngineError::BufferCreationFailed {
            size,
            usage: usage.to_string(),
        })?;
        Ok(Self {
            label: label.to_string(),
            usage,
            bytes: Mutex::new(vec![0; len]),
        })
    }

    /// Copy of the current contents regardless of usage (test inspection)
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }
}

impl DeviceBuffer for HostBuffer {
    fn label(&self) -> &str {
        &self.label
    }

    fn size(&self) -> u64 {
        self.bytes.lock().len() as u64
    }

    fn usage(&self) -> BufferUsage {
        self.usage
    }

    fn copy(&self, data: &[u8], offset: u64) -> EngineResult<()> {
        let mut bytes = self.bytes.lock();
        check_range(offset, data.len() as u64, bytes.len() as u64)?;
        let start = offset as usize;
        bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read(&self, out: &mut [u8]) -> EngineResult<()> {
        if !self.usage.host_readable() {
            return Err(EngineError::BufferNotReadable {
                label: self.label.clone(),
            });
        }
        let bytes = self.bytes.lock();
        check_range(0, out.len() as u64, bytes.len() as u64)?;
        out.copy_from_slice(&bytes[..out.len()]);
        Ok(())
    }

    #[cfg(feature = "native")]
    fn binding(&self) -> Option<wgpu::BindingResource<'_>> {
        None
    }
}

/// Allocator for `HostBuffer`s
#[derive(Debug, Default, Clone, Copy)]
pub struct HostAllocator;

impl BufferAllocator for HostAllocator {
    fn allocate(
        &self,
        label: &str,
        size: u64,
        usage: BufferUsage,
    ) -> EngineResult<Box<dyn DeviceBuffer>> {
        log::debug!(
            "[HostAllocator::allocate] '{}' {} bytes ({})",
            label,
            size,
            usage
        );
        Ok(Box::new(HostBuffer::new(label, size, usage)?))
    }
}
