//! Simulation configuration.
//!
//! All values are plain data polled at tick start; runtime changes flow
//! through the command queue so they can never race an in-flight dispatch
//! sequence.

use serde::{Deserialize, Serialize};

/// What happens when two bodies overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InteractionMode {
    /// Overlaps are ignored.
    None,
    /// The heavier body absorbs the lighter one (momentum-conserving).
    Merge,
    /// Bodies exchange a restitution impulse.
    Collide,
}

impl InteractionMode {
    pub(crate) fn as_u32(self) -> u32 {
        match self {
            InteractionMode::None => 0,
            InteractionMode::Merge => 1,
            InteractionMode::Collide => 2,
        }
    }
}

/// Which driver runs the bottom-up reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReductionStrategy {
    /// Output-sensitive work queue with indirect dispatch per level.
    WorkQueue,
    /// Fixed number of conservatively sized passes; kept as a correctness
    /// fallback to validate the queue driver against.
    FixedIteration,
}

/// Simulation parameters shared by every stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Barnes-Hut opening angle; smaller is more accurate.
    pub theta: f32,

    /// Integration timestep.
    pub dt: f32,

    /// Softening length preventing force singularities at small separations.
    pub softening: f32,

    /// Restitution coefficient for collision impulses (0..1).
    pub elasticity: f32,

    /// Default body density used when generating scenarios; individual
    /// bodies carry their own density for radius derivation.
    pub density: f32,

    /// Overlap handling mode.
    pub interaction_mode: InteractionMode,

    /// Reduction driver.
    pub reduction: ReductionStrategy,

    /// Compaction cadence in ticks while no interaction mode can kill
    /// bodies; merge and collide mode compact every tick.
    pub compact_interval: u32,

    /// Half-extent of the cubic world volume. Bodies integrated outside the
    /// volume are culled.
    pub world_half_extent: f32,

    /// Unit scaling uploaded into the SimulationValues record.
    pub units: crate::units::UnitSet,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            theta: 0.6,
            dt: 0.001,
            softening: 0.001,
            elasticity: 1.0,
            density: 1.0,
            interaction_mode: InteractionMode::Merge,
            reduction: ReductionStrategy::WorkQueue,
            compact_interval: 16,
            world_half_extent: 350_000.0,
            units: crate::units::UnitSet::natural(),
        }
    }
}

impl SimConfig {
    /// World bounds as (min, max) corners.
    pub fn world_bounds(&self) -> (glam::Vec3, glam::Vec3) {
        let h = self.world_half_extent;
        (glam::Vec3::splat(-h), glam::Vec3::splat(h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let config = SimConfig::default();
        assert!(config.theta > 0.0);
        assert!(config.dt > 0.0);
        assert!(config.softening > 0.0);
        assert!(config.compact_interval >= 1);
        let (min, max) = config.world_bounds();
        assert!(min.x < max.x);
    }

    #[test]
    fn interaction_mode_maps_to_kernel_constants() {
        assert_eq!(InteractionMode::None.as_u32(), 0);
        assert_eq!(InteractionMode::Merge.as_u32(), 1);
        assert_eq!(InteractionMode::Collide.as_u32(), 2);
    }
}
