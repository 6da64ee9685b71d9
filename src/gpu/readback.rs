//! Typed readback helpers over [`GpuContext::read_buffer`].
//!
//! All of these block on the device and are meant for diagnostics, tests,
//! and the counter API, never the per-tick hot path.

use crate::error::SimError;
use crate::gpu::buffers::SimulationBuffers;
use crate::gpu::context::GpuContext;
use crate::gpu::types::{GpuBody, GpuNode, GpuSimValues, MortonKey, SimCounters};

/// Read the full SimulationValues record.
pub fn read_sim_values(
    context: &GpuContext,
    buffers: &SimulationBuffers,
) -> Result<GpuSimValues, SimError> {
    let bytes = context.read_buffer(
        &buffers.sim_values,
        std::mem::size_of::<GpuSimValues>() as u64,
    )?;
    Ok(*bytemuck::from_bytes(&bytes))
}

/// Read just the live counters.
pub fn read_counters(
    context: &GpuContext,
    buffers: &SimulationBuffers,
) -> Result<SimCounters, SimError> {
    let values = read_sim_values(context, buffers)?;
    Ok(SimCounters {
        num_bodies: values.num_bodies,
        initial_num_bodies: values.initial_num_bodies,
        just_died: values.just_died,
        just_merged: values.just_merged,
        out_of_bounds: values.out_of_bounds,
    })
}

/// Read the body buffer currently holding role `parity`.
pub fn read_bodies(
    context: &GpuContext,
    buffers: &SimulationBuffers,
    parity: usize,
) -> Result<Vec<GpuBody>, SimError> {
    let bytes = context.read_buffer(
        &buffers.bodies[parity],
        u64::from(buffers.capacity) * std::mem::size_of::<GpuBody>() as u64,
    )?;
    Ok(bytemuck::cast_slice(&bytes).to_vec())
}

/// Read the node records for the active tree (`2n - 1` slots).
pub fn read_nodes(
    context: &GpuContext,
    buffers: &SimulationBuffers,
    num_bodies: u32,
) -> Result<Vec<GpuNode>, SimError> {
    if num_bodies == 0 {
        return Ok(Vec::new());
    }
    let slots = 2 * u64::from(num_bodies) - 1;
    let bytes = context.read_buffer(
        &buffers.nodes,
        slots * std::mem::size_of::<GpuNode>() as u64,
    )?;
    Ok(bytemuck::cast_slice(&bytes).to_vec())
}

/// Read one half of the Morton key double buffer (active prefix only).
pub fn read_morton_keys(
    context: &GpuContext,
    buffers: &SimulationBuffers,
    half: u32,
    num_bodies: u32,
) -> Result<Vec<MortonKey>, SimError> {
    let all = context.read_buffer(
        &buffers.morton_keys,
        2 * u64::from(buffers.capacity) * std::mem::size_of::<MortonKey>() as u64,
    )?;
    let keys: &[MortonKey] = bytemuck::cast_slice(&all);
    let base = (half * buffers.capacity) as usize;
    Ok(keys[base..base + num_bodies as usize].to_vec())
}

/// Read one half of the sort index double buffer (active prefix only).
pub fn read_sort_indices(
    context: &GpuContext,
    buffers: &SimulationBuffers,
    half: u32,
    num_bodies: u32,
) -> Result<Vec<u32>, SimError> {
    let all = context.read_buffer(&buffers.sort_indices, 2 * u64::from(buffers.capacity) * 4)?;
    let indices: &[u32] = bytemuck::cast_slice(&all);
    let base = (half * buffers.capacity) as usize;
    Ok(indices[base..base + num_bodies as usize].to_vec())
}
