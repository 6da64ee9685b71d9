//! # Gravitron: GPU-resident Barnes-Hut N-body simulation
//!
//! Gravitron simulates gravitational N-body dynamics for very large body
//! counts by approximating long-range forces with a spatial tree built and
//! evaluated entirely on the GPU via `wgpu` compute shaders.
//!
//! ## Pipeline
//!
//! Each tick runs a fixed dispatch sequence over shared device buffers:
//!
//! 1. **Reset** - per-tick counters and queues (`shaders/reset_values.wgsl`)
//! 2. **Morton** - 63-bit spatial keys from positions in the world bounds
//! 3. **Radix sort** - stable 16-pass 4-bit sort of (key, index) pairs
//! 4. **Dead compaction** - stream-compact merged and escaped bodies out of
//!    the sorted-slot permutation
//! 5. **Tree build** - recursion-free parallel binary radix tree
//! 6. **Reduction** - lock-free bottom-up center-of-mass/AABB propagation
//! 7. **Force** - per-body tree traversal, integration, overlap detection
//! 8. **Merge** - momentum-conserving resolution of queued merge tasks
//!
//! ## Layers
//!
//! - [`gpu`] - device context, byte-exact buffer records, compute
//!   pipelines, readback helpers
//! - [`sim`] - the [`sim::GpuSimulation`] orchestrator, the command queue,
//!   scenario generation, and CPU reference/verification tooling
//! - [`config`] / [`units`] - runtime parameters and unit scaling
//!
//! ## Headless by design
//!
//! The crate owns no window or renderer. A renderer binds
//! [`sim::GpuSimulation::body_buffer`] for drawing and polls
//! [`sim::GpuSimulation::counters`] for live counts; configuration changes
//! arrive through the thread-safe command queue and are applied between
//! ticks, never during one.

pub mod config;
pub mod error;
pub mod gpu;
pub mod sim;
pub mod units;

pub use config::{InteractionMode, ReductionStrategy, SimConfig};
pub use error::SimError;
pub use gpu::{GpuBody, GpuContext, SimCounters};
pub use sim::{Command, GpuSimulation};
