//! GPU-facing plumbing: device buffers and the refinement request channel

pub mod buffer_manager;
pub mod request_channel;
#[cfg(feature = "native")]
pub mod wgpu_buffer;

pub use buffer_manager::{BufferAllocator, BufferUsage, DeviceBuffer, HostAllocator, HostBuffer};
pub use request_channel::{
    create_request_channel, handle_requests, RequestChannel, RequestFrameStats, RequestRecord,
};
#[cfg(feature = "native")]
pub use wgpu_buffer::{WgpuAllocator, WgpuBuffer};
