//! GPU layer: device context, buffer set, compute pipelines, and readback.

pub mod buffers;
pub mod context;
pub mod pipelines;
pub mod readback;
pub mod types;

pub use buffers::SimulationBuffers;
pub use context::GpuContext;
pub use pipelines::{PassParamGroups, SimulationPipelines};
pub use types::{
    FrameParams, GpuBody, GpuNode, GpuNodeExtent, GpuSimValues, MortonKey, PassParams,
    SimCounters, MAX_REDUCE_LEVELS, NUM_RADIX_BUCKETS, RADIX_BITS, RADIX_PASSES, SENTINEL,
    WORKGROUP_SIZE,
};
