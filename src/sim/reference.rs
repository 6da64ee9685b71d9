//! CPU reference implementations of the device pipeline.
//!
//! These mirror the kernel semantics step for step: same quantization, same
//! index-augmented prefix comparisons, same opening test. They serve as the
//! oracle for both the pure-CPU property tests and the GPU integration
//! tests. They are not a fast path and never run during normal simulation.

use glam::Vec3;

use crate::gpu::types::{GpuBody, GpuNode, SENTINEL};

/// Bits per Morton axis, matching the kernel.
pub const MORTON_BITS_PER_AXIS: u32 = 21;

const AABB_MIN_EXTENT: f32 = 1e-6;

fn spread_bits(v: u32, offset: u32) -> u64 {
    let mut out = 0u64;
    for b in 0..MORTON_BITS_PER_AXIS {
        let bit = u64::from((v >> b) & 1);
        out |= bit << (3 * b + offset);
    }
    out
}

fn quantize_axis(x: f32, min_x: f32, extent: f32) -> u32 {
    let cells = (1u32 << MORTON_BITS_PER_AXIS) as f32;
    let t = ((x - min_x) / extent).clamp(0.0, 1.0);
    ((t * cells) as u32).min((1 << MORTON_BITS_PER_AXIS) - 1)
}

/// 63-bit Morton key of a position inside the given bounds.
pub fn morton_key(pos: Vec3, world_min: Vec3, world_max: Vec3) -> u64 {
    let extent = (world_max - world_min).max(Vec3::splat(AABB_MIN_EXTENT));
    let qx = quantize_axis(pos.x, world_min.x, extent.x);
    let qy = quantize_axis(pos.y, world_min.y, extent.y);
    let qz = quantize_axis(pos.z, world_min.z, extent.z);
    spread_bits(qx, 0) | spread_bits(qy, 1) | spread_bits(qz, 2)
}

/// Stable (key, original index) sort of the active bodies.
pub fn sorted_keys(bodies: &[GpuBody], world_min: Vec3, world_max: Vec3) -> (Vec<u64>, Vec<u32>) {
    let mut pairs: Vec<(u64, u32)> = bodies
        .iter()
        .enumerate()
        .map(|(i, body)| {
            let key = if body.is_alive() {
                morton_key(body.position(), world_min, world_max)
            } else {
                u64::MAX
            };
            (key, i as u32)
        })
        .collect();
    pairs.sort_by_key(|&(key, _)| key);
    (
        pairs.iter().map(|&(key, _)| key).collect(),
        pairs.iter().map(|&(_, index)| index).collect(),
    )
}

/// Index-augmented common-prefix length, identical to the kernel's.
fn common_prefix(keys: &[u64], i: u32, j: i64) -> i32 {
    if j < 0 || j >= keys.len() as i64 {
        return -1;
    }
    let a = keys[i as usize];
    let b = keys[j as usize];
    if a != b {
        (a ^ b).leading_zeros() as i32
    } else {
        64 + (i ^ j as u32).leading_zeros() as i32
    }
}

/// Build the binary radix tree over `keys` (sorted). Returns `2n - 1` node
/// records: leaves in `[0, n)` with only parent links filled, internal
/// nodes in `[n, 2n - 1)` with children and parents.
pub fn build_tree(keys: &[u64]) -> Vec<GpuNode> {
    let n = keys.len() as u32;
    assert!(n >= 1);
    let mut nodes = vec![GpuNode::empty(); (2 * n - 1) as usize];
    if n == 1 {
        nodes[0].parent = SENTINEL;
        return nodes;
    }

    for i in 0..n - 1 {
        let d: i64 = if common_prefix(keys, i, i as i64 + 1) > common_prefix(keys, i, i as i64 - 1)
        {
            1
        } else {
            -1
        };
        let delta_min = common_prefix(keys, i, i as i64 - d);

        let mut l_max: i64 = 2;
        while common_prefix(keys, i, i as i64 + l_max * d) > delta_min {
            l_max <<= 1;
        }

        let mut l: i64 = 0;
        let mut t = l_max >> 1;
        while t >= 1 {
            if common_prefix(keys, i, i as i64 + (l + t) * d) > delta_min {
                l += t;
            }
            t >>= 1;
        }
        let j = i as i64 + l * d;

        let delta_node = common_prefix(keys, i, j);
        let mut s: i64 = 0;
        let mut div: i64 = 2;
        let mut probe = (l + div - 1) / div;
        while probe >= 1 {
            if common_prefix(keys, i, i as i64 + (s + probe) * d) > delta_node {
                s += probe;
            }
            if probe == 1 {
                break;
            }
            div *= 2;
            probe = (l + div - 1) / div;
        }
        let gamma = i as i64 + s * d + d.min(0);

        let first = (i as i64).min(j);
        let last = (i as i64).max(j);
        let child_a = if first == gamma {
            gamma as u32
        } else {
            n + gamma as u32
        };
        let child_b = if last == gamma + 1 {
            (gamma + 1) as u32
        } else {
            n + (gamma + 1) as u32
        };

        let me = n + i;
        nodes[me as usize].child_a = child_a;
        nodes[me as usize].child_b = child_b;
        nodes[child_a as usize].parent = me;
        nodes[child_b as usize].parent = me;
        if i == 0 {
            nodes[me as usize].parent = SENTINEL;
        }
    }
    nodes
}

/// Seed leaves from bodies and propagate COM/AABB bottom-up.
pub fn reduce_tree(nodes: &mut [GpuNode], bodies: &[GpuBody], sorted_indices: &[u32]) {
    let n = sorted_indices.len() as u32;

    for (slot, &body_index) in sorted_indices.iter().enumerate() {
        let body = &bodies[body_index as usize];
        let mass = body.mass.max(0.0);
        let leaf = &mut nodes[slot];
        leaf.com_mass = [body.pos[0], body.pos[1], body.pos[2], mass];
        leaf.aabb_min = body.pos;
        leaf.aabb_max = body.pos;
        leaf.depth = 0;
        leaf.body_count = u32::from(mass > 0.0);
        leaf.ready_children = 2;
    }
    if n < 2 {
        return;
    }

    // Post-order over an explicit stack; children are always finished
    // before their parent, mirroring the level-by-level device dispatches.
    let root = n as usize;
    let mut stack = vec![(root, false)];
    while let Some((id, expanded)) = stack.pop() {
        if id < n as usize {
            continue;
        }
        if !expanded {
            stack.push((id, true));
            stack.push((nodes[id].child_a as usize, false));
            stack.push((nodes[id].child_b as usize, false));
            continue;
        }
        let a = nodes[nodes[id].child_a as usize];
        let b = nodes[nodes[id].child_b as usize];
        let mass = a.com_mass[3] + b.com_mass[3];
        let com = if mass > 0.0 {
            [
                (a.com_mass[0] * a.com_mass[3] + b.com_mass[0] * b.com_mass[3]) / mass,
                (a.com_mass[1] * a.com_mass[3] + b.com_mass[1] * b.com_mass[3]) / mass,
                (a.com_mass[2] * a.com_mass[3] + b.com_mass[2] * b.com_mass[3]) / mass,
            ]
        } else {
            [
                0.5 * (a.com_mass[0] + b.com_mass[0]),
                0.5 * (a.com_mass[1] + b.com_mass[1]),
                0.5 * (a.com_mass[2] + b.com_mass[2]),
            ]
        };
        let node = &mut nodes[id];
        node.com_mass = [com[0], com[1], com[2], mass];
        for axis in 0..3 {
            node.aabb_min[axis] = a.aabb_min[axis].min(b.aabb_min[axis]);
            node.aabb_max[axis] = a.aabb_max[axis].max(b.aabb_max[axis]);
        }
        node.depth = a.depth.max(b.depth) + 1;
        node.body_count = a.body_count + b.body_count;
        node.ready_children = 2;
    }
}

/// Build, seed, and reduce a tree over the live bodies in one call.
pub fn build_reduced_tree(
    bodies: &[GpuBody],
    world_min: Vec3,
    world_max: Vec3,
) -> (Vec<GpuNode>, Vec<u32>) {
    let (keys, indices) = sorted_keys(bodies, world_min, world_max);
    let mut nodes = build_tree(&keys);
    reduce_tree(&mut nodes, bodies, &indices);
    (nodes, indices)
}

fn pair_accel(from: Vec3, to: Vec3, mass: f32, softening: f32, g: f32) -> Vec3 {
    let d = to - from;
    let r2 = d.length_squared() + softening * softening;
    g * mass * d / (r2 * r2.sqrt())
}

/// Barnes-Hut acceleration on sorted slot `slot`, mirroring the kernel's
/// opening test (box extent over distance to box center).
pub fn tree_accel(
    nodes: &[GpuNode],
    sorted_indices: &[u32],
    bodies: &[GpuBody],
    slot: usize,
    theta: f32,
    softening: f32,
    g: f32,
) -> Vec3 {
    let n = sorted_indices.len();
    let pos = bodies[sorted_indices[slot] as usize].position();
    let mut accel = Vec3::ZERO;
    if n < 2 {
        return accel;
    }

    let mut stack = vec![n];
    while let Some(id) = stack.pop() {
        let node = &nodes[id];
        if id < n {
            if id == slot || node.mass() <= 0.0 {
                continue;
            }
            accel += pair_accel(pos, node.com(), node.mass(), softening, g);
            continue;
        }
        let size = (0..3)
            .map(|axis| node.aabb_max[axis] - node.aabb_min[axis])
            .fold(0.0f32, f32::max);
        let center = Vec3::new(
            0.5 * (node.aabb_min[0] + node.aabb_max[0]),
            0.5 * (node.aabb_min[1] + node.aabb_max[1]),
            0.5 * (node.aabb_min[2] + node.aabb_max[2]),
        );
        let dist = (center - pos).length().max(1e-12);
        if size / dist < theta {
            if node.mass() > 0.0 {
                accel += pair_accel(pos, node.com(), node.mass(), softening, g);
            }
        } else {
            stack.push(node.child_a as usize);
            stack.push(node.child_b as usize);
        }
    }
    accel
}

/// Exact O(n^2) acceleration on body `index`.
pub fn brute_force_accel(bodies: &[GpuBody], index: usize, softening: f32, g: f32) -> Vec3 {
    let pos = bodies[index].position();
    let mut accel = Vec3::ZERO;
    for (j, other) in bodies.iter().enumerate() {
        if j == index || !other.is_alive() {
            continue;
        }
        accel += pair_accel(pos, other.position(), other.mass, softening, g);
    }
    accel
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::body_gen;
    use crate::sim::verify::check_tree;
    use approx::assert_relative_eq;

    fn world() -> (Vec3, Vec3) {
        (Vec3::splat(-10_000.0), Vec3::splat(10_000.0))
    }

    #[test]
    fn morton_keys_fit_63_bits_and_preserve_axis_order() {
        let (min, max) = world();
        let a = morton_key(Vec3::new(-9_999.0, 0.0, 0.0), min, max);
        let b = morton_key(Vec3::new(9_999.0, 0.0, 0.0), min, max);
        assert!(a < b);
        assert_eq!(a >> 63, 0);
        assert_eq!(b >> 63, 0);
    }

    #[test]
    fn morton_degenerate_extent_does_not_divide_by_zero() {
        // All bodies coincident: extent clamps instead of dividing by zero.
        let p = Vec3::splat(5.0);
        let key = morton_key(p, p, p);
        assert_eq!(key >> 63, 0);
    }

    #[test]
    fn sorted_keys_are_non_decreasing_and_a_permutation() {
        let bodies = body_gen::random_box(42, 500, 9_000.0, (1.0, 10.0), 1.0);
        let (min, max) = world();
        let (keys, indices) = sorted_keys(&bodies, min, max);

        for window in keys.windows(2) {
            assert!(window[0] <= window[1]);
        }
        let mut seen = indices.clone();
        seen.sort_unstable();
        let expected: Vec<u32> = (0..500).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn equal_keys_keep_their_original_relative_order() {
        // All bodies coincident: every key equal, stable order preserved.
        let bodies: Vec<_> = (0..64)
            .map(|_| GpuBody::new(Vec3::splat(1.0), Vec3::ZERO, 1.0, 1.0))
            .collect();
        let (min, max) = world();
        let (_, indices) = sorted_keys(&bodies, min, max);
        let expected: Vec<u32> = (0..64).collect();
        assert_eq!(indices, expected);
    }

    #[test]
    fn tree_is_well_formed_for_random_input() {
        let bodies = body_gen::random_box(9, 300, 9_000.0, (1.0, 10.0), 1.0);
        let (min, max) = world();
        let (nodes, _) = build_reduced_tree(&bodies, min, max);
        let report = check_tree(&nodes, 300);
        assert!(report.is_ok(), "tree check failed: {:?}", report);
    }

    #[test]
    fn tree_is_well_formed_for_duplicate_keys() {
        // Coincident bodies exercise the index tiebreak.
        let bodies: Vec<_> = (0..33)
            .map(|_| GpuBody::new(Vec3::splat(2.0), Vec3::ZERO, 1.0, 1.0))
            .collect();
        let (min, max) = world();
        let (nodes, _) = build_reduced_tree(&bodies, min, max);
        let report = check_tree(&nodes, 33);
        assert!(report.is_ok(), "tree check failed: {:?}", report);
    }

    #[test]
    fn tree_handles_two_bodies() {
        let bodies = body_gen::two_body(10.0, 5.0, 1.0);
        let (min, max) = world();
        let (nodes, _) = build_reduced_tree(&bodies, min, max);
        assert_eq!(nodes.len(), 3);
        assert!(check_tree(&nodes, 2).is_ok());
        assert_relative_eq!(nodes[2].mass(), 10.0);
    }

    #[test]
    fn reduction_masses_and_bounds_match_direct_sums() {
        let bodies = body_gen::random_box(5, 16, 9_000.0, (1.0, 4.0), 1.0);
        let (min, max) = world();
        let (nodes, _) = build_reduced_tree(&bodies, min, max);

        let total: f32 = bodies.iter().map(|b| b.mass).sum();
        let root = &nodes[16];
        assert_relative_eq!(root.mass(), total, max_relative = 1e-5);

        for axis in 0..3 {
            let lo = bodies
                .iter()
                .map(|b| b.pos[axis])
                .fold(f32::INFINITY, f32::min);
            let hi = bodies
                .iter()
                .map(|b| b.pos[axis])
                .fold(f32::NEG_INFINITY, f32::max);
            assert_relative_eq!(root.aabb_min[axis], lo, max_relative = 1e-5);
            assert_relative_eq!(root.aabb_max[axis], hi, max_relative = 1e-5);
        }

        // Every internal node's mass equals the sum of its leaf range.
        for node in nodes.iter().skip(16) {
            let a = &nodes[node.child_a as usize];
            let b = &nodes[node.child_b as usize];
            assert_relative_eq!(node.mass(), a.mass() + b.mass(), max_relative = 1e-5);
            assert_eq!(node.body_count, a.body_count + b.body_count);
        }
    }

    #[test]
    fn tree_force_converges_to_brute_force_as_theta_shrinks() {
        let bodies = body_gen::random_box(2024, 200, 5_000.0, (50.0, 500.0), 1.0);
        let (min, max) = world();
        let (nodes, indices) = build_reduced_tree(&bodies, min, max);

        let softening = 0.001;
        for slot in (0..200).step_by(17) {
            let approx_accel = tree_accel(&nodes, &indices, &bodies, slot, 0.01, softening, 1.0);
            let exact = brute_force_accel(&bodies, indices[slot] as usize, softening, 1.0);
            let error = (approx_accel - exact).length() / exact.length().max(1e-12);
            assert!(error < 1e-3, "slot {}: relative error {}", slot, error);
        }
    }

    #[test]
    fn wider_theta_still_tracks_brute_force_loosely() {
        let bodies = body_gen::random_box(7, 200, 5_000.0, (50.0, 500.0), 1.0);
        let (min, max) = world();
        let (nodes, indices) = build_reduced_tree(&bodies, min, max);

        for slot in (0..200).step_by(29) {
            let approx_accel = tree_accel(&nodes, &indices, &bodies, slot, 0.5, 0.001, 1.0);
            let exact = brute_force_accel(&bodies, indices[slot] as usize, 0.001, 1.0);
            let error = (approx_accel - exact).length() / exact.length().max(1e-12);
            assert!(error < 0.1, "slot {}: relative error {}", slot, error);
        }
    }
}
