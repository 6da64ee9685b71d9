//! Scenario generation: initial body distributions.
//!
//! Deterministic under a seed so scenarios can be replayed and tested.

use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::gpu::types::GpuBody;

/// Parameters for a randomized disk galaxy.
#[derive(Debug, Clone)]
pub struct DiskParams {
    pub num_bodies: usize,
    pub radius_range: (f32, f32),
    pub mass_range: (f32, f32),
    pub density: f32,
    pub center: Vec3,
    pub center_velocity: Vec3,
    /// Inclination of the disk plane.
    pub phi: f32,
    /// Mass of the central body.
    pub center_mass: f32,
    /// 0..1; how tightly bodies stick to the disk plane.
    pub adherence_to_plane: f32,
    /// Scales the circular-orbit speed (1.0 = approximately circular).
    pub orbital_factor: f32,
}

impl Default for DiskParams {
    fn default() -> Self {
        Self {
            num_bodies: 10_000,
            radius_range: (100.0, 10_000.0),
            mass_range: (100.0, 1_200.0),
            density: 1.0,
            center: Vec3::ZERO,
            center_velocity: Vec3::ZERO,
            phi: 0.0,
            center_mass: 1.0e6,
            adherence_to_plane: 0.95,
            orbital_factor: 1.0,
        }
    }
}

/// Two equal-mass bodies placed symmetrically around the origin at rest.
pub fn two_body(separation: f32, mass: f32, density: f32) -> Vec<GpuBody> {
    let offset = Vec3::new(separation * 0.5, 0.0, 0.0);
    vec![
        GpuBody::new(-offset, Vec3::ZERO, mass, density),
        GpuBody::new(offset, Vec3::ZERO, mass, density),
    ]
}

/// Uniform random box of bodies at rest.
pub fn random_box(
    seed: u64,
    num_bodies: usize,
    half_extent: f32,
    mass_range: (f32, f32),
    density: f32,
) -> Vec<GpuBody> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..num_bodies)
        .map(|_| {
            let pos = Vec3::new(
                rng.random_range(-half_extent..half_extent),
                rng.random_range(-half_extent..half_extent),
                rng.random_range(-half_extent..half_extent),
            );
            let mass = rng.random_range(mass_range.0..=mass_range.1);
            GpuBody::new(pos, Vec3::ZERO, mass, density)
        })
        .collect()
}

/// Random disk galaxy around a massive central body.
///
/// Each body gets an approximately circular orbital velocity from the mass
/// enclosed within its radius (central body plus an estimate of the interior
/// disk mass), tilted by `phi` and jittered off the plane by
/// `adherence_to_plane`.
pub fn random_disk(seed: u64, params: &DiskParams) -> Vec<GpuBody> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut bodies = Vec::with_capacity(params.num_bodies + 1);

    let center_density = params.density * 10.0;
    bodies.push(GpuBody::new(
        params.center,
        params.center_velocity,
        params.center_mass,
        center_density,
    ));

    let mean_mass = 0.5 * (params.mass_range.0 + params.mass_range.1);
    let (sin_phi, cos_phi) = params.phi.sin_cos();

    for _ in 0..params.num_bodies {
        let r = rng.random_range(params.radius_range.0..=params.radius_range.1);
        let angle = rng.random_range(0.0..std::f32::consts::TAU);

        // Off-plane jitter shrinks as adherence approaches 1.
        let wobble = (1.0 - params.adherence_to_plane) * r;
        let height = rng.random_range(-wobble..=wobble);

        // Disk-local coordinates, then tilt around the x axis by phi.
        let local = Vec3::new(r * angle.cos(), height, r * angle.sin());
        let pos = Vec3::new(
            local.x,
            local.y * cos_phi - local.z * sin_phi,
            local.y * sin_phi + local.z * cos_phi,
        );

        // Fraction of the disk interior to this radius, assuming the radial
        // distribution is roughly uniform.
        let interior_fraction = (r - params.radius_range.0)
            / (params.radius_range.1 - params.radius_range.0).max(1e-6);
        let enclosed_mass =
            params.center_mass + mean_mass * params.num_bodies as f32 * interior_fraction;
        let orbital_speed = (enclosed_mass / r.max(1e-6)).sqrt() * params.orbital_factor;

        // Tangent in the disk plane, tilted the same way.
        let local_tangent = Vec3::new(-angle.sin(), 0.0, angle.cos());
        let tangent = Vec3::new(
            local_tangent.x,
            local_tangent.y * cos_phi - local_tangent.z * sin_phi,
            local_tangent.y * sin_phi + local_tangent.z * cos_phi,
        );

        let mass = rng.random_range(params.mass_range.0..=params.mass_range.1);
        bodies.push(GpuBody::new(
            params.center + pos,
            params.center_velocity + tangent * orbital_speed,
            mass,
            params.density,
        ));
    }
    bodies
}
