use bytemuck::{Pod, Zeroable};

use crate::camera::CullingCamera;
use crate::constants::{buffer_layouts, gpu_driven::CULL_WORKGROUP_SIZE};
use crate::renderer::gpu_context::GpuContext;

use super::draw_batch::DrawBatch;
use super::indirect_commands::DrawCommand;
use super::persistent_buffer::{DeviceStorage, PersistentBuffer};
use super::visibility_counter::VisibilityCounter;

/// Per-instance record tested by the culling shader
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct CullInstance {
    pub aabb_min: [f32; 4],
    pub aabb_max: [f32; 4],
    /// Index of the phase-1 command this instance belongs to
    pub command_index: u32,
    /// Instance index within that command
    pub instance_index: u32,
    pub _padding: [u32; 2],
}

/// Flatten batches into cull records, one per instance, with command
/// indices matching `CommandList::assemble_unculled`. Hidden batches keep
/// their command index but get no records, so none of their instances
/// survive.
pub fn build_cull_records(batches: &[DrawBatch], out: &mut Vec<CullInstance>) {
    out.clear();
    for (command_index, batch) in batches.iter().enumerate() {
        if !batch.is_visible() {
            continue;
        }
        for instance in 0..batch.instance_count() {
            let [aabb_min, aabb_max] = batch.instance_aabb(instance as usize).to_gpu();
            out.push(CullInstance {
                aabb_min,
                aabb_max,
                command_index: command_index as u32,
                instance_index: instance,
                _padding: [0; 2],
            });
        }
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// GPU culling compute pipeline, shared by every mesh group
pub struct CullingPipeline {
    cull_pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl CullingPipeline {
    pub fn new(ctx: &GpuContext) -> Self {
        let device = ctx.device();

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("GPU Culling Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/gpu_culling.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Culling Bind Group Layout"),
            entries: &[
                // Camera frustum
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Cull records
                storage_entry(1, true),
                // Phase-1 commands and offsets
                storage_entry(2, true),
                storage_entry(3, true),
                // Phase-2 commands and offsets
                storage_entry(4, false),
                storage_entry(5, false),
                // Visibility counter
                storage_entry(6, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Culling Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let cull_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Cull Instances Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: "cull_instances",
        });

        Self {
            cull_pipeline,
            bind_group_layout,
        }
    }

    /// Reset the counter and record the culling pass for one group
    pub fn execute(
        &self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        targets: &GpuCullingTargets,
        phase1_commands: &wgpu::Buffer,
        phase1_offsets: &wgpu::Buffer,
    ) {
        targets.counter.reset(encoder);

        if targets.instance_count == 0 {
            return;
        }

        let bind_group = ctx.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Culling Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: targets.camera_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: targets.records.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: phase1_commands.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: phase1_offsets.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: targets.compacted_commands.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: targets.compacted_offsets.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: targets.counter.as_binding(),
                },
            ],
        });

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Culling Pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.cull_pipeline);
        pass.set_bind_group(0, &bind_group, &[]);

        let workgroups = (targets.instance_count + CULL_WORKGROUP_SIZE - 1) / CULL_WORKGROUP_SIZE;
        pass.dispatch_workgroups(workgroups, 1, 1);
    }
}

/// Per-group inputs and outputs of the culling pass
pub struct GpuCullingTargets {
    camera_buffer: wgpu::Buffer,
    records: PersistentBuffer<CullInstance, DeviceStorage>,
    record_scratch: Vec<CullInstance>,
    compacted_commands: PersistentBuffer<DrawCommand, DeviceStorage>,
    compacted_offsets: PersistentBuffer<u32, DeviceStorage>,
    counter: VisibilityCounter,
    instance_count: u32,
}

impl GpuCullingTargets {
    pub fn new(ctx: &GpuContext, label: &'static str) -> Self {
        let capacity = buffer_layouts::INITIAL_COMMAND_CAPACITY as usize;

        let camera_buffer = ctx.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: buffer_layouts::CULLING_CAMERA_SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            camera_buffer,
            records: PersistentBuffer::device(ctx, "Cull Records", wgpu::BufferUsages::STORAGE, capacity),
            record_scratch: Vec::with_capacity(capacity),
            compacted_commands: PersistentBuffer::device(
                ctx,
                "Compacted Draw Commands",
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::INDIRECT,
                capacity,
            ),
            compacted_offsets: PersistentBuffer::device(
                ctx,
                "Compacted Entity Offsets",
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::VERTEX,
                capacity,
            ),
            counter: VisibilityCounter::new(ctx),
            instance_count: 0,
        }
    }

    /// Upload cull records and camera data for this frame
    pub fn prepare(&mut self, ctx: &GpuContext, batches: &[DrawBatch], camera: CullingCamera) {
        build_cull_records(batches, &mut self.record_scratch);
        self.instance_count = self.record_scratch.len() as u32;

        self.records.put(ctx, &self.record_scratch);
        // Worst case every instance survives
        self.compacted_commands.reserve(ctx, self.record_scratch.len());
        self.compacted_offsets.reserve(ctx, self.record_scratch.len());

        let camera = CullingCamera {
            instance_count: self.instance_count,
            ..camera
        };
        ctx.queue()
            .write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(&camera));
    }

    /// Upper bound for the GPU-sourced draw count
    pub fn max_draw_count(&self) -> u32 {
        self.instance_count
    }

    pub fn compacted_commands(&self) -> &wgpu::Buffer {
        self.compacted_commands.buffer()
    }

    pub fn compacted_offsets(&self) -> &wgpu::Buffer {
        self.compacted_offsets.buffer()
    }

    pub fn counter(&self) -> &VisibilityCounter {
        &self.counter
    }
}
