//! Compute pipelines and cached bind groups for the simulation.
//!
//! Every kernel shares one storage bind group layout (group 0, bindings
//! 0-12), one per-tick frame uniform (group 1), and one per-dispatch pass
//! uniform (group 2). Kernels declare only the bindings they use; the shared
//! layout is a superset. The queue-arm kernel is the single exception: it
//! writes the indirect dispatch args, which must stay out of the shared
//! group, so it gets its own small layout.
//!
//! Bind groups are pre-created for every distinct pass-parameter value and
//! for both body-buffer parities, so the per-tick encoder does no allocation.

use std::borrow::Cow;

use wgpu::util::DeviceExt;

use crate::error::SimError;
use crate::gpu::buffers::SimulationBuffers;
use crate::gpu::context::GpuContext;
use crate::gpu::types::{
    FrameParams, PassParams, RADIX_BITS, RADIX_PASSES, RESET_MODE_DECREMENT_DEAD,
    RESET_MODE_TICK_BEGIN,
};

/// All compute pipelines in dispatch order.
pub struct SimulationPipelines {
    pub init_indices: wgpu::ComputePipeline,
    pub reset_values: wgpu::ComputePipeline,
    pub morton: wgpu::ComputePipeline,
    pub compact_count: wgpu::ComputePipeline,
    pub compact_scan: wgpu::ComputePipeline,
    pub compact_scatter: wgpu::ComputePipeline,
    pub radix_histogram: wgpu::ComputePipeline,
    pub radix_scan: wgpu::ComputePipeline,
    pub radix_scatter: wgpu::ComputePipeline,
    pub tree_build: wgpu::ComputePipeline,
    pub reduce_init_leaves: wgpu::ComputePipeline,
    pub reduce_propagate: wgpu::ComputePipeline,
    pub queue_arm: wgpu::ComputePipeline,
    pub force: wgpu::ComputePipeline,
    pub merge: wgpu::ComputePipeline,

    pub global_layout: wgpu::BindGroupLayout,
    pub frame_layout: wgpu::BindGroupLayout,
    pub pass_layout: wgpu::BindGroupLayout,
    pub arm_layout: wgpu::BindGroupLayout,
}

impl SimulationPipelines {
    /// Create every pipeline, surfacing validation failures as
    /// [`SimError::ShaderCompilation`]. Kernel compile errors are fatal at
    /// initialization; the simulation refuses to start.
    pub fn new(context: &GpuContext) -> Result<Self, SimError> {
        let device = &context.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let global_layout = Self::create_global_layout(device);
        let frame_layout = Self::create_uniform_layout(device, "Frame Params Layout");
        let pass_layout = Self::create_uniform_layout(device, "Pass Params Layout");
        let arm_layout = Self::create_arm_layout(device);

        let shared_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Simulation Pipeline Layout"),
                bind_group_layouts: &[&global_layout, &frame_layout, &pass_layout],
                push_constant_ranges: &[],
            });
        let arm_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Queue Arm Pipeline Layout"),
            bind_group_layouts: &[&arm_layout, &pass_layout],
            push_constant_ranges: &[],
        });

        let module = |source: &str, label: &str| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
            })
        };
        let init_module = module(include_str!("../../shaders/init_indices.wgsl"), "init_indices");
        let reset_module = module(include_str!("../../shaders/reset_values.wgsl"), "reset_values");
        let morton_module = module(include_str!("../../shaders/morton.wgsl"), "morton");
        let compact_module = module(include_str!("../../shaders/dead_compact.wgsl"), "dead_compact");
        let radix_module = module(include_str!("../../shaders/radix_sort.wgsl"), "radix_sort");
        let tree_module = module(include_str!("../../shaders/tree_build.wgsl"), "tree_build");
        let reduce_module = module(include_str!("../../shaders/reduce.wgsl"), "reduce");
        let arm_module = module(include_str!("../../shaders/queue_arm.wgsl"), "queue_arm");
        let force_module = module(include_str!("../../shaders/force.wgsl"), "force");
        let merge_module = module(include_str!("../../shaders/merge_bodies.wgsl"), "merge_bodies");

        let make = |module: &wgpu::ShaderModule, entry: &str, label: &str, layout: &wgpu::PipelineLayout| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(layout),
                module,
                entry_point: Some(entry),
                compilation_options: Default::default(),
                cache: None,
            })
        };

        let pipelines = Self {
            init_indices: make(&init_module, "main", "Init Indices", &shared_pipeline_layout),
            reset_values: make(&reset_module, "main", "Reset Values", &shared_pipeline_layout),
            morton: make(&morton_module, "main", "Morton Codes", &shared_pipeline_layout),
            compact_count: make(
                &compact_module,
                "count_dead",
                "Dead Compact Count",
                &shared_pipeline_layout,
            ),
            compact_scan: make(
                &compact_module,
                "scan_dead",
                "Dead Compact Scan",
                &shared_pipeline_layout,
            ),
            compact_scatter: make(
                &compact_module,
                "scatter_dead",
                "Dead Compact Scatter",
                &shared_pipeline_layout,
            ),
            radix_histogram: make(
                &radix_module,
                "histogram",
                "Radix Histogram",
                &shared_pipeline_layout,
            ),
            radix_scan: make(&radix_module, "scan", "Radix Scan", &shared_pipeline_layout),
            radix_scatter: make(
                &radix_module,
                "scatter",
                "Radix Scatter",
                &shared_pipeline_layout,
            ),
            tree_build: make(
                &tree_module,
                "main",
                "Binary Radix Tree Build",
                &shared_pipeline_layout,
            ),
            reduce_init_leaves: make(
                &reduce_module,
                "init_leaves",
                "Reduce Init Leaves",
                &shared_pipeline_layout,
            ),
            reduce_propagate: make(
                &reduce_module,
                "propagate",
                "Reduce Propagate",
                &shared_pipeline_layout,
            ),
            queue_arm: make(&arm_module, "main", "Queue Arm", &arm_pipeline_layout),
            force: make(&force_module, "main", "Force And Integrate", &shared_pipeline_layout),
            merge: make(&merge_module, "main", "Merge Bodies", &shared_pipeline_layout),
            global_layout,
            frame_layout,
            pass_layout,
            arm_layout,
        };

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(SimError::ShaderCompilation(error.to_string()));
        }
        Ok(pipelines)
    }

    fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
        wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: false },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }
    }

    fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
        wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }
    }

    fn create_global_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        let entries: Vec<wgpu::BindGroupLayoutEntry> =
            (0u32..13).map(Self::storage_entry).collect();
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Simulation Storage Layout"),
            entries: &entries,
        })
    }

    fn create_uniform_layout(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries: &[Self::uniform_entry(0)],
        })
    }

    fn create_arm_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Queue Arm Layout"),
            entries: &[
                Self::storage_entry(0),
                Self::storage_entry(1),
                Self::uniform_entry(2),
            ],
        })
    }

    /// Create the two parity variants of the shared storage bind group.
    /// Variant `p` binds `bodies[p]` as "in" and `bodies[1 - p]` as "out";
    /// the tick-end body swap just flips which variant gets bound.
    pub fn create_global_groups(
        &self,
        device: &wgpu::Device,
        buffers: &SimulationBuffers,
    ) -> [wgpu::BindGroup; 2] {
        let make = |parity: usize| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Simulation Storage Bind Group"),
                layout: &self.global_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffers.sim_values.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: buffers.bodies[parity].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: buffers.bodies[1 - parity].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: buffers.node_locks.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: buffers.nodes.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 5,
                        resource: buffers.node_extents.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 6,
                        resource: buffers.morton_keys.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 7,
                        resource: buffers.sort_indices.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 8,
                        resource: buffers.work_queue.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 9,
                        resource: buffers.radix_wg_hist.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 10,
                        resource: buffers.radix_wg_scanned.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 11,
                        resource: buffers.radix_bucket_totals.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 12,
                        resource: buffers.merge_queue.as_entire_binding(),
                    },
                ],
            })
        };
        [make(0), make(1)]
    }

    pub fn create_frame_group(
        &self,
        device: &wgpu::Device,
        frame_buffer: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Frame Params Bind Group"),
            layout: &self.frame_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_buffer.as_entire_binding(),
            }],
        })
    }

    pub fn create_arm_group(
        &self,
        device: &wgpu::Device,
        buffers: &SimulationBuffers,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Queue Arm Bind Group"),
            layout: &self.arm_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffers.work_queue.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: buffers.dispatch_args.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: buffers.queue_state.as_entire_binding(),
                },
            ],
        })
    }
}

/// Pre-created pass-parameter bind groups, one per distinct value the
/// dispatch sequence can need. Buffers are kept alive alongside their
/// groups.
pub struct PassParamGroups {
    _buffers: Vec<wgpu::Buffer>,
    /// `radix[src][pass]`: digit shift `4 * pass`, reading from half `src`.
    /// Pass 0 entries double as the plain source-half selectors for the
    /// morton/compact/tree/leaf/force kernels, which ignore the shift.
    radix: [[wgpu::BindGroup; RADIX_PASSES as usize]; 2],
    /// `queue[parity]`: propagation level with `parity` as the input half.
    queue: [wgpu::BindGroup; 2],
    /// `reset[mode]`: tick-begin and decrement-dead resets.
    reset: [wgpu::BindGroup; 2],
}

impl PassParamGroups {
    pub fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout) -> Self {
        let mut buffers = Vec::new();
        let mut make = |params: PassParams, label: &str| {
            let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::bytes_of(&params),
                usage: wgpu::BufferUsages::UNIFORM,
            });
            let group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            });
            buffers.push(buffer);
            group
        };

        let radix = [0u32, 1].map(|src| {
            std::array::from_fn(|pass| {
                make(
                    PassParams {
                        pass_shift: pass as u32 * RADIX_BITS,
                        src_half: src,
                        queue_half: 0,
                        mode: 0,
                    },
                    "Radix Pass Params",
                )
            })
        });
        let queue = [0u32, 1].map(|parity| {
            make(
                PassParams {
                    pass_shift: 0,
                    src_half: 0,
                    queue_half: parity,
                    mode: 0,
                },
                "Queue Pass Params",
            )
        });
        let reset = [RESET_MODE_TICK_BEGIN, RESET_MODE_DECREMENT_DEAD].map(|mode| {
            make(
                PassParams {
                    pass_shift: 0,
                    src_half: 0,
                    queue_half: 0,
                    mode,
                },
                "Reset Pass Params",
            )
        });

        Self {
            _buffers: buffers,
            radix,
            queue,
            reset,
        }
    }

    /// Radix pass `pass` reading from half `src`.
    pub fn radix(&self, src: u32, pass: u32) -> &wgpu::BindGroup {
        &self.radix[src as usize][pass as usize]
    }

    /// Plain source-half selector for non-sort kernels.
    pub fn source_half(&self, src: u32) -> &wgpu::BindGroup {
        &self.radix[src as usize][0]
    }

    /// Propagation level whose input is queue half `parity`.
    pub fn queue_level(&self, parity: u32) -> &wgpu::BindGroup {
        &self.queue[parity as usize]
    }

    pub fn reset_mode(&self, mode: u32) -> &wgpu::BindGroup {
        &self.reset[mode as usize]
    }
}

/// Frame params packing helper.
pub fn frame_params(config: &crate::config::SimConfig, num_groups: u32) -> FrameParams {
    FrameParams {
        theta: config.theta,
        dt: config.dt,
        softening: config.softening,
        elasticity: config.elasticity,
        interaction_mode: config.interaction_mode.as_u32(),
        num_groups,
        _pad0: 0,
        _pad1: 0,
    }
}
