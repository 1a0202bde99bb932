//! CPU side of the GPU refinement request protocol
//!
//! The raymarcher owns one request slot per work group and writes the
//! position and wanted depth of any node it found too coarse. Once per frame,
//! after that frame's GPU work has completed, the CPU reads every slot,
//! refines the octree, uploads the dirty node ranges and then overwrites the
//! whole request array with blanks. Slots are levels, not edges: a request
//! that is still needed will simply be written again next frame.

use super::buffer_manager::{BufferAllocator, BufferUsage, DeviceBuffer};
use crate::constants::gpu_limits::MAX_REQUEST_SLOTS;
use crate::error::{EngineError, EngineResult};
use crate::octree::{
    drain_pending_uploads, handle_request, octree_buffer_size, OctreeNode, RequestOutcome,
    SparseOctreeData,
};
use crate::sdf::SdfArena;
use bytemuck::{Pod, Zeroable};
use glam::DVec3;
use static_assertions::const_assert_eq;

/// One request slot as laid out in device memory
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct RequestRecord {
    pub position: [f32; 3],
    /// Wanted depth; 0 marks an empty slot
    pub depth: u32,
}

const_assert_eq!(std::mem::size_of::<RequestRecord>(), 16);

impl RequestRecord {
    pub const EMPTY: Self = Self {
        position: [0.0; 3],
        depth: 0,
    };

    pub fn is_empty(&self) -> bool {
        self.depth == 0
    }
}

/// Per-frame summary of `handle_requests`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFrameStats {
    pub slots: usize,
    pub non_empty: usize,
    pub expanded: usize,
    pub bricked: usize,
    pub dropped: usize,
    pub pending: usize,
    pub at_capacity: usize,
    pub upload_ranges: usize,
    pub uploaded_nodes: usize,
}

pub struct RequestChannel {
    request_buffer: Box<dyn DeviceBuffer>,
    octree_buffer: Box<dyn DeviceBuffer>,
    slots: Vec<RequestRecord>,
    blank: Vec<RequestRecord>,
}

/// Allocate the request and octree buffers and upload the initial tree
pub fn create_request_channel(
    allocator: &dyn BufferAllocator,
    slot_count: usize,
    octree: &mut SparseOctreeData,
) -> EngineResult<RequestChannel> {
    if slot_count == 0 || slot_count > MAX_REQUEST_SLOTS as usize {
        return Err(EngineError::invalid_config(
            "request_slots",
            slot_count,
            format!("must be in 1..={}", MAX_REQUEST_SLOTS),
        ));
    }

    let request_bytes = (slot_count * std::mem::size_of::<RequestRecord>()) as u64;
    let request_buffer = allocator.allocate("Request Buffer", request_bytes, BufferUsage::DeviceToHost)?;
    let octree_buffer = allocator.allocate(
        "Octree Buffer",
        octree_buffer_size(&octree.config),
        BufferUsage::HostToDevice,
    )?;

    let blank = vec![RequestRecord::EMPTY; slot_count];
    request_buffer.copy(bytemuck::cast_slice(&blank), 0)?;

    let channel = RequestChannel {
        request_buffer,
        octree_buffer,
        slots: vec![RequestRecord::EMPTY; slot_count],
        blank,
    };
    let (ranges, nodes) = upload_octree_ranges(octree, channel.octree_buffer.as_ref())?;

    log::info!(
        "[RequestChannel::create] {} slots, initial upload {} nodes in {} ranges",
        slot_count,
        nodes,
        ranges
    );
    Ok(channel)
}

impl RequestChannel {
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn request_buffer(&self) -> &dyn DeviceBuffer {
        self.request_buffer.as_ref()
    }

    pub fn octree_buffer(&self) -> &dyn DeviceBuffer {
        self.octree_buffer.as_ref()
    }
}

/// Drain and service every request slot. Call once per rendered frame, after
/// the GPU work that wrote the slots is known complete.
pub fn handle_requests(
    channel: &mut RequestChannel,
    octree: &mut SparseOctreeData,
    arena: &SdfArena,
) -> EngineResult<RequestFrameStats> {
    channel
        .request_buffer
        .read(bytemuck::cast_slice_mut(&mut channel.slots))?;

    let mut stats = RequestFrameStats {
        slots: channel.slots.len(),
        ..Default::default()
    };

    for record in channel.slots.iter().filter(|r| !r.is_empty()) {
        stats.non_empty += 1;
        let position = DVec3::from(record.position.map(f64::from));
        match handle_request(octree, arena, position, record.depth) {
            RequestOutcome::Expanded => stats.expanded += 1,
            RequestOutcome::Bricked => stats.bricked += 1,
            RequestOutcome::Dropped => stats.dropped += 1,
            RequestOutcome::Pending => stats.pending += 1,
            RequestOutcome::AtCapacity => stats.at_capacity += 1,
            RequestOutcome::AlreadyResolved | RequestOutcome::Final => {}
        }
    }

    let (ranges, nodes) = upload_octree_ranges(octree, channel.octree_buffer.as_ref())?;
    stats.upload_ranges = ranges;
    stats.uploaded_nodes = nodes;

    // Clear every slot, consumed or not
    channel
        .request_buffer
        .copy(bytemuck::cast_slice(&channel.blank), 0)?;

    if stats.non_empty > 0 {
        log::debug!(
            "[RequestChannel::handle_requests] {} requests, {} expanded, {} nodes uploaded",
            stats.non_empty,
            stats.expanded,
            stats.uploaded_nodes
        );
    }
    Ok(stats)
}

/// Copy every pending node range into `target`. Returns (ranges, nodes).
pub fn upload_octree_ranges(
    octree: &mut SparseOctreeData,
    target: &dyn DeviceBuffer,
) -> EngineResult<(usize, usize)> {
    let ranges = drain_pending_uploads(octree);
    let node_size = std::mem::size_of::<OctreeNode>() as u64;
    let nodes = &octree.nodes;

    let regions: Vec<(u64, &[u8])> = ranges
        .iter()
        .map(|r| {
            let end = (r.end as usize).min(nodes.len());
            let start = (r.start as usize).min(end);
            (
                start as u64 * node_size,
                bytemuck::cast_slice(&nodes[start..end]),
            )
        })
        .collect();
    target.copy_regions(&regions)?;

    let count = ranges.iter().map(|r| r.len()).sum();
    Ok((ranges.len(), count))
}
