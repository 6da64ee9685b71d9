//! Device buffer set for the simulation pipeline.
//!
//! All buffers are sized once from the body capacity; the active count only
//! shrinks between reallocations. Double buffering is expressed two ways:
//! the body arrays are two separate buffers whose in/out roles swap after
//! every tick, while the Morton key, sort index, and work-queue buffers each
//! hold both halves of their double buffer and kernels pick a half through
//! the pass-parameter selector.
//!
//! ## Bind group contract (group 0)
//!
//! | Binding | Buffer |
//! |---------|--------|
//! | 0  | SimulationValues |
//! | 1  | bodies (in role) |
//! | 2  | bodies (out role) |
//! | 3  | parent/lock words: arrival counters + merge locks |
//! | 4  | nodes (20-word records) |
//! | 5  | node AABB/depth traversal mirror |
//! | 6  | Morton key double buffer |
//! | 7  | sort index double buffer |
//! | 8  | work queue double buffer |
//! | 9  | radix per-workgroup histograms |
//! | 10 | radix scanned workgroup bases |
//! | 11 | radix bucket totals + global bases |
//! | 12 | merge task queue |

use glam::Vec3;

use crate::error::SimError;
use crate::gpu::context::GpuContext;
use crate::gpu::types::{
    GpuBody, GpuSimValues, MortonKey, QueueState, NUM_RADIX_BUCKETS, WORKGROUP_SIZE,
};
use crate::units::UnitSet;

/// Words in a work-queue or merge-queue header.
pub const QUEUE_HEADER_WORDS: u64 = 4;

/// All device memory owned by one simulation.
pub struct SimulationBuffers {
    pub capacity: u32,

    pub sim_values: wgpu::Buffer,
    /// Two physical body buffers; `body_parity` selects which is "in".
    pub bodies: [wgpu::Buffer; 2],
    pub node_locks: wgpu::Buffer,
    pub nodes: wgpu::Buffer,
    pub node_extents: wgpu::Buffer,
    pub morton_keys: wgpu::Buffer,
    pub sort_indices: wgpu::Buffer,
    pub work_queue: wgpu::Buffer,
    pub radix_wg_hist: wgpu::Buffer,
    pub radix_wg_scanned: wgpu::Buffer,
    pub radix_bucket_totals: wgpu::Buffer,
    pub merge_queue: wgpu::Buffer,

    /// Indirect dispatch args for the reduction levels. Lives outside the
    /// shared bind group: a buffer cannot be writable storage and the
    /// indirect source of the same dispatch.
    pub dispatch_args: wgpu::Buffer,
    pub queue_state: wgpu::Buffer,
}

impl SimulationBuffers {
    /// Workgroups needed to cover `count` items.
    pub fn group_count(count: u32) -> u32 {
        count.div_ceil(WORKGROUP_SIZE)
    }

    /// Node slots for `capacity` leaves (leaves + internal nodes).
    pub fn node_slots(capacity: u32) -> u64 {
        2 * u64::from(capacity) - 1
    }

    /// Validate a requested capacity against device limits.
    ///
    /// The node buffer is the largest allocation, so the storage binding
    /// limit is checked against it specifically. Refusing here beats
    /// silently truncating the simulation.
    pub fn check_capacity(context: &GpuContext, capacity: u32) -> Result<(), SimError> {
        if capacity == 0 {
            return Err(SimError::CapacityExceeded {
                requested: capacity,
                detail: "capacity must be at least 1".into(),
            });
        }
        let limits = context.device.limits();

        let node_bytes = Self::node_slots(capacity) * std::mem::size_of::<crate::gpu::types::GpuNode>() as u64;
        if node_bytes > u64::from(limits.max_storage_buffer_binding_size) {
            return Err(SimError::CapacityExceeded {
                requested: capacity,
                detail: format!(
                    "node buffer needs {} bytes, device allows {}",
                    node_bytes, limits.max_storage_buffer_binding_size
                ),
            });
        }

        let groups = Self::group_count(capacity);
        if groups > limits.max_compute_workgroups_per_dimension {
            return Err(SimError::CapacityExceeded {
                requested: capacity,
                detail: format!(
                    "needs {} workgroups per dispatch, device allows {}",
                    groups, limits.max_compute_workgroups_per_dimension
                ),
            });
        }
        Ok(())
    }

    /// Allocate every buffer for `capacity` bodies.
    pub fn new(context: &GpuContext, capacity: u32) -> Result<Self, SimError> {
        Self::check_capacity(context, capacity)?;
        let device = &context.device;

        let cap = u64::from(capacity);
        let node_slots = Self::node_slots(capacity);
        let max_groups = u64::from(Self::group_count(capacity));

        let storage = wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_DST
            | wgpu::BufferUsages::COPY_SRC;

        let make = |label: &str, size: u64, usage: wgpu::BufferUsages| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage,
                mapped_at_creation: false,
            })
        };

        let body_bytes = cap * std::mem::size_of::<GpuBody>() as u64;
        let queue_half_words = QUEUE_HEADER_WORDS + cap;

        Ok(Self {
            capacity,
            sim_values: make(
                "Simulation Values",
                std::mem::size_of::<GpuSimValues>() as u64,
                storage,
            ),
            bodies: [
                make("Bodies A", body_bytes, storage),
                make("Bodies B", body_bytes, storage),
            ],
            // (capacity - 1) arrival counters followed by capacity merge locks.
            node_locks: make("Parent/Lock Words", (2 * cap - 1) * 4, storage),
            nodes: make(
                "Tree Nodes",
                node_slots * std::mem::size_of::<crate::gpu::types::GpuNode>() as u64,
                storage,
            ),
            node_extents: make(
                "Node Extents",
                node_slots * std::mem::size_of::<crate::gpu::types::GpuNodeExtent>() as u64,
                storage,
            ),
            morton_keys: make(
                "Morton Keys",
                2 * cap * std::mem::size_of::<MortonKey>() as u64,
                storage,
            ),
            sort_indices: make("Sort Indices", 2 * cap * 4, storage),
            work_queue: make("Propagate Work Queue", 2 * queue_half_words * 4, storage),
            radix_wg_hist: make(
                "Radix Workgroup Histograms",
                max_groups * u64::from(NUM_RADIX_BUCKETS) * 4,
                storage,
            ),
            radix_wg_scanned: make(
                "Radix Scanned Bases",
                max_groups * u64::from(NUM_RADIX_BUCKETS) * 4,
                storage,
            ),
            radix_bucket_totals: make(
                "Radix Bucket Totals",
                u64::from(2 * NUM_RADIX_BUCKETS) * 4,
                storage,
            ),
            merge_queue: make(
                "Merge Task Queue",
                (QUEUE_HEADER_WORDS + 2 * cap) * 4,
                storage,
            ),
            dispatch_args: make(
                "Reduce Dispatch Args",
                16,
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::INDIRECT,
            ),
            queue_state: make(
                "Queue State Uniform",
                std::mem::size_of::<QueueState>() as u64,
                wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            ),
        })
    }

    /// Upload initial simulation state: bodies into the given role, the
    /// SimulationValues record, and the queue-arm capacity uniform.
    pub fn upload_initial_state(
        &self,
        context: &GpuContext,
        bodies: &[GpuBody],
        active_count: u32,
        body_parity: usize,
        bounds: (Vec3, Vec3),
        units: UnitSet,
    ) {
        let queue = &context.queue;
        queue.write_buffer(
            &self.bodies[body_parity],
            0,
            bytemuck::cast_slice(bodies),
        );
        let values = GpuSimValues::new(active_count, self.capacity, bounds, units);
        queue.write_buffer(&self.sim_values, 0, bytemuck::bytes_of(&values));
        let state = QueueState {
            capacity: self.capacity,
            _pad0: 0,
            _pad1: 0,
            _pad2: 0,
        };
        queue.write_buffer(&self.queue_state, 0, bytemuck::bytes_of(&state));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_count_rounds_up() {
        assert_eq!(SimulationBuffers::group_count(1), 1);
        assert_eq!(SimulationBuffers::group_count(256), 1);
        assert_eq!(SimulationBuffers::group_count(257), 2);
        assert_eq!(SimulationBuffers::group_count(1024), 4);
    }

    #[test]
    fn node_slots_counts_leaves_and_internals() {
        assert_eq!(SimulationBuffers::node_slots(1), 1);
        assert_eq!(SimulationBuffers::node_slots(16), 31);
    }
}
