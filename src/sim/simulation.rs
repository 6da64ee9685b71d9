//! Pipeline orchestrator.
//!
//! One control thread issues a fixed, strictly ordered dispatch sequence per
//! tick; every stage is recorded as its own labeled compute pass, so each
//! stage's writes are visible to the next before it reads them. Broadly:
//!
//! 1. Drain pending commands and reset the per-tick counters and queues.
//! 2. Generate Morton codes (dead bodies get the all-ones key).
//! 3. Radix sort the (key, index) pairs.
//! 4. Trim the dead suffix off the sorted stream and shrink the active count.
//! 5. Build the binary radix tree over the sorted keys.
//! 6. Propagate center-of-mass and bounds bottom-up.
//! 7. Evaluate forces, integrate, and detect overlaps.
//! 8. Resolve queued merges, then swap the body buffers.
//!
//! The double buffers swap by role, never by copying: the body buffers flip
//! which pre-built bind group variant gets bound, and the key/index halves
//! flip a host-tracked parity bit fed to kernels through the pass params.

use std::sync::mpsc::Sender;
use std::time::Instant;

use crate::config::{InteractionMode, ReductionStrategy, SimConfig};
use crate::error::SimError;
use crate::gpu::buffers::SimulationBuffers;
use crate::gpu::context::GpuContext;
use crate::gpu::pipelines::{frame_params, PassParamGroups, SimulationPipelines};
use crate::gpu::readback;
use crate::gpu::types::{
    FrameParams, GpuBody, GpuNode, MortonKey, SimCounters, MAX_REDUCE_LEVELS, RADIX_PASSES,
    RESET_MODE_DECREMENT_DEAD, RESET_MODE_TICK_BEGIN, WORKGROUP_SIZE,
};
use crate::sim::commands::{Command, CommandQueue};
use crate::sim::verify::{check_tree, TreeDefect};

/// Fixed pass count for the fixed-iteration reduction fallback.
const FIXED_REDUCE_ITERATIONS: u32 = 64;

/// GPU-resident Barnes-Hut simulation.
pub struct GpuSimulation {
    context: GpuContext,
    config: SimConfig,
    buffers: SimulationBuffers,
    pipelines: SimulationPipelines,

    global_groups: [wgpu::BindGroup; 2],
    frame_buffer: wgpu::Buffer,
    frame_group: wgpu::BindGroup,
    arm_group: wgpu::BindGroup,
    pass_groups: PassParamGroups,

    commands: CommandQueue,

    /// Which body buffer currently holds the "in" role.
    body_parity: usize,
    /// Which half of the key/index double buffers is current.
    pair_parity: u32,
    /// Host-side upper bound on the active body count; the authoritative
    /// count lives on the device and only shrinks.
    host_body_count: u32,
    steps: u64,

    profiling: bool,
    debug_string: String,
}

impl GpuSimulation {
    /// Build the full pipeline for `bodies`, sized so `bodies.len()` is the
    /// capacity upper bound. Fatal on kernel compile failure or a capacity
    /// the device cannot hold.
    pub fn new(
        context: GpuContext,
        config: SimConfig,
        bodies: &[GpuBody],
    ) -> Result<Self, SimError> {
        let capacity = bodies.len() as u32;
        let buffers = SimulationBuffers::new(&context, capacity)?;
        let pipelines = SimulationPipelines::new(&context)?;

        let device = &context.device;
        let global_groups = pipelines.create_global_groups(device, &buffers);
        let frame_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Params"),
            size: std::mem::size_of::<FrameParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let frame_group = pipelines.create_frame_group(device, &frame_buffer);
        let arm_group = pipelines.create_arm_group(device, &buffers);
        let pass_groups = PassParamGroups::new(device, &pipelines.pass_layout);

        let node_bytes =
            SimulationBuffers::node_slots(capacity) * std::mem::size_of::<crate::gpu::types::GpuNode>() as u64;
        log::info!(
            "simulation ready: {} bodies, {:.1} MiB of nodes, adapter {}",
            capacity,
            node_bytes as f64 / (1024.0 * 1024.0),
            context.adapter_name()
        );

        let mut sim = Self {
            context,
            config,
            buffers,
            pipelines,
            global_groups,
            frame_buffer,
            frame_group,
            arm_group,
            pass_groups,
            commands: CommandQueue::new(),
            body_parity: 0,
            pair_parity: 0,
            host_body_count: capacity,
            steps: 0,
            profiling: false,
            debug_string: String::new(),
        };
        sim.upload(bodies, capacity)?;
        Ok(sim)
    }

    fn upload(&mut self, bodies: &[GpuBody], active_count: u32) -> Result<(), SimError> {
        self.buffers.upload_initial_state(
            &self.context,
            bodies,
            active_count,
            self.body_parity,
            self.config.world_bounds(),
            self.config.units,
        );

        // Seed the identity permutation in both index halves.
        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Init Encoder"),
                });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Init Indices"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipelines.init_indices);
            pass.set_bind_group(0, &self.global_groups[self.body_parity], &[]);
            pass.set_bind_group(1, &self.frame_group, &[]);
            pass.set_bind_group(2, self.pass_groups.source_half(0), &[]);
            pass.dispatch_workgroups(SimulationBuffers::group_count(self.buffers.capacity), 1, 1);
        }
        self.context.submit_and_wait(encoder);
        Ok(())
    }

    /// Thread-safe handle for injecting deferred commands.
    pub fn command_sender(&self) -> Sender<Command> {
        self.commands.sender()
    }

    /// Enqueue a command from the owning thread.
    pub fn enqueue(&self, command: Command) {
        self.commands.enqueue(command);
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// The body buffer a renderer should bind this frame.
    pub fn body_buffer(&self) -> &wgpu::Buffer {
        &self.buffers.bodies[self.body_parity]
    }

    pub fn set_profiling(&mut self, enabled: bool) {
        self.profiling = enabled;
    }

    /// Per-stage timing of the last profiled tick.
    pub fn debug_string(&self) -> &str {
        &self.debug_string
    }

    /// Run one tick: drain commands, then the fixed stage sequence, then
    /// swap the body buffers.
    pub fn step(&mut self) {
        self.commands.drain_into(&mut self.config);

        if self.host_body_count == 0 {
            self.steps += 1;
            return;
        }

        let groups = SimulationBuffers::group_count(self.host_body_count);
        let params = frame_params(&self.config, groups);
        self.context
            .queue
            .write_buffer(&self.frame_buffer, 0, bytemuck::bytes_of(&params));

        // Compaction cadence: dead bodies are only produced by merges and
        // bounds culling, and the dead count lives on the device, so merge
        // mode compacts every tick and the rest poll periodically instead
        // of stalling the pipeline on a readback.
        let compact_due = self.config.interaction_mode == InteractionMode::Merge
            || self.steps % u64::from(self.config.compact_interval.max(1)) == 0;

        if self.profiling {
            self.step_profiled(groups, compact_due);
        } else {
            let mut encoder =
                self.context
                    .device
                    .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                        label: Some("Tick Encoder"),
                    });
            self.record_tick(&mut encoder, groups, compact_due);
            self.context.queue.submit(Some(encoder.finish()));
        }

        if compact_due {
            self.pair_parity ^= 1;
        }
        self.body_parity ^= 1;
        self.steps += 1;
    }

    /// Record the whole stage sequence into one encoder. Dead bodies carry
    /// the all-ones key, so after the sort they form a suffix and the
    /// compaction pass trims them off before the tree is built.
    fn record_tick(&self, encoder: &mut wgpu::CommandEncoder, groups: u32, compact_due: bool) {
        self.encode_reset(encoder, RESET_MODE_TICK_BEGIN);

        let mut parity = self.pair_parity;
        self.encode_morton(encoder, parity, groups);
        self.encode_sort(encoder, parity, groups);
        if compact_due {
            self.encode_compact(encoder, parity, groups);
            parity ^= 1;
            self.encode_reset(encoder, RESET_MODE_DECREMENT_DEAD);
        }

        self.encode_tree_build(encoder, parity);
        self.encode_reduce(encoder, parity, groups);
        self.encode_force(encoder, parity, groups);
        if self.config.interaction_mode == InteractionMode::Merge {
            self.encode_merge(encoder, groups);
        }
    }

    /// Profiled tick: one submission per stage with a device sync after
    /// each. Slow, but the only way to time individual stages without
    /// timestamp queries.
    fn step_profiled(&mut self, groups: u32, compact_due: bool) {
        let mut report = String::new();
        let mut parity = self.pair_parity;

        let mut run = |label: &str, f: &dyn Fn(&mut wgpu::CommandEncoder), out: &mut String| {
            let start = Instant::now();
            let mut encoder =
                self.context
                    .device
                    .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                        label: Some(label),
                    });
            f(&mut encoder);
            self.context.submit_and_wait(encoder);
            let elapsed = start.elapsed();
            out.push_str(&format!("{label}: {:.3} ms\n", elapsed.as_secs_f64() * 1e3));
            log::debug!("{label}: {:?}", elapsed);
        };

        run(
            "reset",
            &|e| self.encode_reset(e, RESET_MODE_TICK_BEGIN),
            &mut report,
        );
        {
            let p = parity;
            run("morton", &|e| self.encode_morton(e, p, groups), &mut report);
            run("radix sort", &|e| self.encode_sort(e, p, groups), &mut report);
        }
        if compact_due {
            let p = parity;
            run("compact", &|e| self.encode_compact(e, p, groups), &mut report);
            parity ^= 1;
            run(
                "decrement dead",
                &|e| self.encode_reset(e, RESET_MODE_DECREMENT_DEAD),
                &mut report,
            );
        }
        let p = parity;
        run("tree build", &|e| self.encode_tree_build(e, p), &mut report);
        run("reduce", &|e| self.encode_reduce(e, p, groups), &mut report);
        run("force", &|e| self.encode_force(e, p, groups), &mut report);
        if self.config.interaction_mode == InteractionMode::Merge {
            run("merge", &|e| self.encode_merge(e, groups), &mut report);
        }

        self.debug_string = report;
    }

    fn begin_pass<'e>(
        &self,
        encoder: &'e mut wgpu::CommandEncoder,
        label: &str,
    ) -> wgpu::ComputePass<'e> {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(label),
            timestamp_writes: None,
        });
        pass.set_bind_group(0, &self.global_groups[self.body_parity], &[]);
        pass.set_bind_group(1, &self.frame_group, &[]);
        pass
    }

    fn encode_reset(&self, encoder: &mut wgpu::CommandEncoder, mode: u32) {
        let mut pass = self.begin_pass(encoder, "Reset Values");
        pass.set_pipeline(&self.pipelines.reset_values);
        pass.set_bind_group(2, self.pass_groups.reset_mode(mode), &[]);
        pass.dispatch_workgroups(1, 1, 1);
    }

    fn encode_compact(&self, encoder: &mut wgpu::CommandEncoder, src_half: u32, groups: u32) {
        let mut pass = self.begin_pass(encoder, "Dead Compaction");
        pass.set_bind_group(2, self.pass_groups.source_half(src_half), &[]);
        pass.set_pipeline(&self.pipelines.compact_count);
        pass.dispatch_workgroups(groups, 1, 1);
        pass.set_pipeline(&self.pipelines.compact_scan);
        pass.dispatch_workgroups(1, 1, 1);
        pass.set_pipeline(&self.pipelines.compact_scatter);
        pass.dispatch_workgroups(groups, 1, 1);
    }

    fn encode_morton(&self, encoder: &mut wgpu::CommandEncoder, src_half: u32, groups: u32) {
        let mut pass = self.begin_pass(encoder, "Morton Codes");
        pass.set_pipeline(&self.pipelines.morton);
        pass.set_bind_group(2, self.pass_groups.source_half(src_half), &[]);
        pass.dispatch_workgroups(groups, 1, 1);
    }

    fn encode_sort(&self, encoder: &mut wgpu::CommandEncoder, src_half: u32, groups: u32) {
        let mut pass = self.begin_pass(encoder, "Radix Sort");
        for sort_pass in 0..RADIX_PASSES {
            let pass_src = src_half ^ (sort_pass & 1);
            pass.set_bind_group(2, self.pass_groups.radix(pass_src, sort_pass), &[]);
            pass.set_pipeline(&self.pipelines.radix_histogram);
            pass.dispatch_workgroups(groups, 1, 1);
            pass.set_pipeline(&self.pipelines.radix_scan);
            pass.dispatch_workgroups(1, 1, 1);
            pass.set_pipeline(&self.pipelines.radix_scatter);
            pass.dispatch_workgroups(groups, 1, 1);
        }
    }

    fn encode_tree_build(&self, encoder: &mut wgpu::CommandEncoder, src_half: u32) {
        if self.host_body_count < 2 {
            return;
        }
        let internal_groups = SimulationBuffers::group_count(self.host_body_count - 1);
        let mut pass = self.begin_pass(encoder, "Tree Build");
        pass.set_pipeline(&self.pipelines.tree_build);
        pass.set_bind_group(2, self.pass_groups.source_half(src_half), &[]);
        pass.dispatch_workgroups(internal_groups, 1, 1);
    }

    fn encode_reduce(&self, encoder: &mut wgpu::CommandEncoder, src_half: u32, groups: u32) {
        {
            let mut pass = self.begin_pass(encoder, "Reduce Init Leaves");
            pass.set_pipeline(&self.pipelines.reduce_init_leaves);
            pass.set_bind_group(2, self.pass_groups.source_half(src_half), &[]);
            pass.dispatch_workgroups(groups, 1, 1);
        }
        if self.host_body_count < 2 {
            return;
        }

        match self.config.reduction {
            ReductionStrategy::WorkQueue => {
                for level in 0..MAX_REDUCE_LEVELS {
                    self.encode_reduce_level(encoder, level, None);
                }
            }
            ReductionStrategy::FixedIteration => {
                // Conservative direct sizing: the queue can hold at most one
                // node per internal node at level 0 and roughly halves each
                // level for balanced trees; the floor keeps degenerate
                // chains covered.
                for level in 0..FIXED_REDUCE_ITERATIONS {
                    let upper = (self.host_body_count - 1) >> level.min(31);
                    let threads = upper.max(3 * WORKGROUP_SIZE + 1);
                    let direct = SimulationBuffers::group_count(threads);
                    self.encode_reduce_level(encoder, level, Some(direct));
                }
            }
        }
    }

    /// One propagation level: arm the indirect args and reset the outgoing
    /// queue half, then consume the incoming half.
    fn encode_reduce_level(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        level: u32,
        direct_groups: Option<u32>,
    ) {
        let parity = level & 1;
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Reduce Arm"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipelines.queue_arm);
            pass.set_bind_group(0, &self.arm_group, &[]);
            pass.set_bind_group(1, self.pass_groups.queue_level(parity), &[]);
            pass.dispatch_workgroups(1, 1, 1);
        }
        {
            let mut pass = self.begin_pass(encoder, "Reduce Propagate");
            pass.set_pipeline(&self.pipelines.reduce_propagate);
            pass.set_bind_group(2, self.pass_groups.queue_level(parity), &[]);
            match direct_groups {
                Some(groups) => pass.dispatch_workgroups(groups, 1, 1),
                None => pass.dispatch_workgroups_indirect(&self.buffers.dispatch_args, 0),
            }
        }
    }

    fn encode_force(&self, encoder: &mut wgpu::CommandEncoder, src_half: u32, groups: u32) {
        let mut pass = self.begin_pass(encoder, "Force And Integrate");
        pass.set_pipeline(&self.pipelines.force);
        pass.set_bind_group(2, self.pass_groups.source_half(src_half), &[]);
        pass.dispatch_workgroups(groups, 1, 1);
    }

    fn encode_merge(&self, encoder: &mut wgpu::CommandEncoder, groups: u32) {
        let mut pass = self.begin_pass(encoder, "Merge Bodies");
        pass.set_pipeline(&self.pipelines.merge);
        pass.set_bind_group(2, self.pass_groups.source_half(0), &[]);
        pass.dispatch_workgroups(groups, 1, 1);
    }

    /// Blocking readback of the live counters; also refreshes the host-side
    /// body-count bound. Slow; do not call per tick.
    pub fn counters(&mut self) -> Result<SimCounters, SimError> {
        let counters = readback::read_counters(&self.context, &self.buffers)?;
        self.host_body_count = counters.num_bodies;
        Ok(counters)
    }

    /// Blocking readback of every body slot in the current "in" buffer.
    pub fn read_bodies(&self) -> Result<Vec<GpuBody>, SimError> {
        readback::read_bodies(&self.context, &self.buffers, self.body_parity)
    }

    /// Blocking readback of the live bodies only.
    pub fn read_alive_bodies(&self) -> Result<Vec<GpuBody>, SimError> {
        Ok(self
            .read_bodies()?
            .into_iter()
            .filter(GpuBody::is_alive)
            .collect())
    }

    /// Diagnostic tree verification over read-back node records. Debug and
    /// test tooling; any defect means a build/reduction logic bug.
    pub fn verify_tree(&mut self) -> Result<Result<(), Vec<TreeDefect>>, SimError> {
        let counters = self.counters()?;
        let nodes = readback::read_nodes(&self.context, &self.buffers, counters.num_bodies)?;
        Ok(check_tree(&nodes, counters.num_bodies))
    }

    /// Stop-the-world capacity change: reallocate every buffer for
    /// `new_capacity` and re-upload the live bodies. On failure the previous
    /// allocation and capacity are retained.
    pub fn resize(&mut self, new_capacity: u32) -> Result<(), SimError> {
        let live = self.read_alive_bodies()?;
        if live.len() as u32 > new_capacity {
            return Err(SimError::CapacityExceeded {
                requested: new_capacity,
                detail: format!("{} live bodies would not fit", live.len()),
            });
        }

        // Allocate first; the old buffers stay untouched if this fails.
        let buffers = SimulationBuffers::new(&self.context, new_capacity)?;
        let device = &self.context.device;
        self.global_groups = self.pipelines.create_global_groups(device, &buffers);
        self.arm_group = self.pipelines.create_arm_group(device, &buffers);
        self.buffers = buffers;

        self.body_parity = 0;
        self.pair_parity = 0;
        self.host_body_count = live.len() as u32;

        let active = live.len() as u32;
        let mut padded = live;
        padded.resize(new_capacity as usize, bytemuck::Zeroable::zeroed());
        self.upload(&padded, active)?;
        log::info!("resized to capacity {}", new_capacity);
        Ok(())
    }

    /// Blocking readback of the current sorted (key, index) pairs over the
    /// active bodies. Diagnostics and tests only.
    pub fn read_sorted_pairs(&mut self) -> Result<(Vec<u64>, Vec<u32>), SimError> {
        let counters = self.counters()?;
        let keys = readback::read_morton_keys(
            &self.context,
            &self.buffers,
            self.pair_parity,
            counters.num_bodies,
        )?;
        let indices = readback::read_sort_indices(
            &self.context,
            &self.buffers,
            self.pair_parity,
            counters.num_bodies,
        )?;
        Ok((keys.into_iter().map(MortonKey::value).collect(), indices))
    }

    /// Blocking readback of the active tree's node records. Diagnostics and
    /// tests only.
    pub fn read_tree(&mut self) -> Result<Vec<GpuNode>, SimError> {
        let counters = self.counters()?;
        readback::read_nodes(&self.context, &self.buffers, counters.num_bodies)
    }
}
