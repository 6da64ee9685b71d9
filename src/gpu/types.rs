//! Byte-exact host mirrors of the WGSL storage and uniform structs.
//!
//! Every struct here must match its WGSL counterpart field for field; the
//! layout tests at the bottom pin the sizes so a drifting field shows up as
//! a test failure instead of corrupted simulation state.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::units::UnitSet;

/// Index sentinel used for missing parents and children.
pub const SENTINEL: u32 = 0xffff_ffff;

/// Threads per workgroup for every kernel in the pipeline. Must match the
/// `@workgroup_size` attributes in the shaders.
pub const WORKGROUP_SIZE: u32 = 256;

/// Bits per radix-sort digit.
pub const RADIX_BITS: u32 = 4;

/// Buckets per radix-sort pass.
pub const NUM_RADIX_BUCKETS: u32 = 1 << RADIX_BITS;

/// Radix passes needed to cover the 63-bit Morton keys.
pub const RADIX_PASSES: u32 = 16;

/// Upper bound on reduction levels: 63 key bits plus the 32-bit
/// duplicate-key tiebreak bound the tree depth.
pub const MAX_REDUCE_LEVELS: u32 = 96;

/// One body: position + mass, velocity + density, color.
///
/// Dead bodies are tagged with a non-positive mass and removed by the
/// compaction stage.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct GpuBody {
    pub pos: [f32; 3],
    pub mass: f32,
    pub vel: [f32; 3],
    pub density: f32,
    pub color: [f32; 4],
}

impl GpuBody {
    pub fn new(pos: Vec3, vel: Vec3, mass: f32, density: f32) -> Self {
        Self {
            pos: pos.to_array(),
            mass,
            vel: vel.to_array(),
            density,
            color: [0.43, 0.74, 0.94, 1.0],
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.pos)
    }

    pub fn velocity(&self) -> Vec3 {
        Vec3::from_array(self.vel)
    }

    pub fn is_alive(&self) -> bool {
        self.mass > 0.0
    }
}

/// One tree node, leaf or internal. 20 words.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct GpuNode {
    /// xyz = center of mass, w = total mass.
    pub com_mass: [f32; 4],
    pub aabb_min: [f32; 3],
    pub _pad0: f32,
    pub aabb_max: [f32; 3],
    pub _pad1: f32,
    pub child_a: u32,
    pub child_b: u32,
    /// Height above the deepest descendant leaf.
    pub depth: u32,
    pub body_count: u32,
    /// Post-reduction mirror of the arrival counter; 2 once processed.
    pub ready_children: u32,
    /// Parent node index, `SENTINEL` for the root.
    pub parent: u32,
    pub _pad2: u32,
    pub _pad3: u32,
}

impl GpuNode {
    /// An unlinked node record: sentinel children and parent, everything
    /// else zero.
    pub fn empty() -> Self {
        let mut node: GpuNode = bytemuck::Zeroable::zeroed();
        node.child_a = SENTINEL;
        node.child_b = SENTINEL;
        node.parent = SENTINEL;
        node
    }

    pub fn is_leaf(&self) -> bool {
        self.child_a == SENTINEL
    }

    pub fn mass(&self) -> f32 {
        self.com_mass[3]
    }

    pub fn com(&self) -> Vec3 {
        Vec3::new(self.com_mass[0], self.com_mass[1], self.com_mass[2])
    }
}

/// Compact per-node traversal record: bounding box and depth only, so the
/// opening test touches 32 bytes per visited node.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct GpuNodeExtent {
    pub aabb_min: [f32; 3],
    pub depth: u32,
    pub aabb_max: [f32; 3],
    pub _pad: u32,
}

/// Global simulation state shared by every stage.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct GpuSimValues {
    pub num_bodies: u32,
    pub initial_num_bodies: u32,
    pub just_died: u32,
    pub just_merged: u32,
    pub out_of_bounds: u32,
    pub _pad0: u32,
    pub _pad1: u32,
    pub _pad2: u32,
    pub world_min: [f32; 3],
    pub _pad3: f32,
    pub world_max: [f32; 3],
    pub _pad4: f32,
    pub gravitational_constant: f32,
    pub unit_length: f32,
    pub unit_mass: f32,
    pub unit_time: f32,
    pub debug_u: [u32; 32],
    pub debug_f: [f32; 32],
}

impl GpuSimValues {
    pub fn new(num_bodies: u32, capacity: u32, bounds: (Vec3, Vec3), units: UnitSet) -> Self {
        Self {
            num_bodies,
            initial_num_bodies: capacity,
            just_died: 0,
            just_merged: 0,
            out_of_bounds: 0,
            _pad0: 0,
            _pad1: 0,
            _pad2: 0,
            world_min: bounds.0.to_array(),
            _pad3: 0.0,
            world_max: bounds.1.to_array(),
            _pad4: 0.0,
            gravitational_constant: units.gravitational_constant,
            unit_length: units.unit_length,
            unit_mass: units.unit_mass,
            unit_time: units.unit_time,
            debug_u: [0; 32],
            debug_f: [0.0; 32],
        }
    }
}

/// Live counters read back from the SimulationValues header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimCounters {
    pub num_bodies: u32,
    pub initial_num_bodies: u32,
    pub just_died: u32,
    pub just_merged: u32,
    pub out_of_bounds: u32,
}

/// Per-tick uniform parameters, written once before the stage sequence.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct FrameParams {
    pub theta: f32,
    pub dt: f32,
    pub softening: f32,
    pub elasticity: f32,
    pub interaction_mode: u32,
    pub num_groups: u32,
    pub _pad0: u32,
    pub _pad1: u32,
}

/// Per-dispatch uniform parameters. Pre-created once per distinct value and
/// bound per dispatch; never written after creation.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct PassParams {
    /// Bit shift of the current radix digit.
    pub pass_shift: u32,
    /// Which half of the key/index double buffers is the source.
    pub src_half: u32,
    /// Which work-queue half feeds the current propagation level.
    pub queue_half: u32,
    /// Reset-kernel mode flag.
    pub mode: u32,
}

/// Reset-kernel mode: zero the per-tick counters and queues.
pub const RESET_MODE_TICK_BEGIN: u32 = 0;
/// Reset-kernel mode: subtract the compacted dead total from the body count.
pub const RESET_MODE_DECREMENT_DEAD: u32 = 1;

/// Uniform for the queue-arm kernel (capacity only).
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct QueueState {
    pub capacity: u32,
    pub _pad0: u32,
    pub _pad1: u32,
    pub _pad2: u32,
}

/// A 63-bit Morton key stored as (lo, hi) words, matching the device layout.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Pod, Zeroable)]
pub struct MortonKey {
    pub lo: u32,
    pub hi: u32,
}

impl MortonKey {
    pub fn value(self) -> u64 {
        (u64::from(self.hi) << 32) | u64::from(self.lo)
    }

    pub fn from_value(v: u64) -> Self {
        Self {
            lo: v as u32,
            hi: (v >> 32) as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_sizes_match_the_device_layout() {
        assert_eq!(std::mem::size_of::<GpuBody>(), 48);
        assert_eq!(std::mem::size_of::<GpuNode>(), 80);
        assert_eq!(std::mem::size_of::<GpuNodeExtent>(), 32);
        assert_eq!(std::mem::size_of::<GpuSimValues>(), 336);
        assert_eq!(std::mem::size_of::<FrameParams>(), 32);
        assert_eq!(std::mem::size_of::<PassParams>(), 16);
        assert_eq!(std::mem::size_of::<MortonKey>(), 8);
    }

    #[test]
    fn morton_key_round_trips() {
        let key = MortonKey::from_value(0x7abc_def0_1234_5678);
        assert_eq!(key.lo, 0x1234_5678);
        assert_eq!(key.hi, 0x7abc_def0);
        assert_eq!(key.value(), 0x7abc_def0_1234_5678);
    }

    #[test]
    fn dead_bodies_use_the_mass_sentinel() {
        let mut body = GpuBody::new(Vec3::ZERO, Vec3::ZERO, 5.0, 1.0);
        assert!(body.is_alive());
        body.mass = 0.0;
        assert!(!body.is_alive());
    }
}
