//! Per-frame batch to indirect-command conversion for both mesh groups
//!
//! Small groups are culled on the CPU and drawn with a CPU-known count.
//! Large groups (see `FeatureFlags::use_gpu_culling`) upload every drawable
//! batch and let `cull_instances` compact survivors; the draw then reads its
//! count from the group's `VisibilityCounter`.

use crate::camera::CullingCamera;
use crate::config::FeatureFlags;
use crate::error::EngineResult;
use crate::constants::buffer_layouts::{DRAW_COMMAND_SIZE, INITIAL_COMMAND_CAPACITY};
use crate::renderer::gpu_context::GpuContext;
use crate::renderer::render_state::RenderState;

use super::culling_pipeline::{CullingPipeline, GpuCullingTargets};
use super::draw_batch::{BatchKind, DrawBatch};
use super::indirect_commands::{CommandList, DrawCommand, FrameStats};
use super::persistent_buffer::{DeviceStorage, PersistentBuffer};

/// Where a group's draw count comes from this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawSource {
    Empty,
    /// Count known on the CPU
    Cpu { count: u32 },
    /// Count read from the visibility counter, clamped to `max_count`
    Gpu { max_count: u32 },
}

/// How `CommandPipeline::draw` records a group's draws
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawMode {
    Skip,
    /// One `multi_draw_indexed_indirect` with a CPU count
    MultiIndirect { count: u32 },
    /// One `draw_indexed_indirect` per command
    SingleIndirect { count: u32 },
    /// One `draw_indexed` per CPU command. Used when indirect draws would
    /// drop `base_instance`.
    Direct,
    /// `multi_draw_indexed_indirect_count` reading the visibility counter
    IndirectCount { max_count: u32 },
}

impl DrawMode {
    pub fn select(source: DrawSource, multi_draw: bool, indirect_first_instance: bool) -> Self {
        match source {
            DrawSource::Empty => Self::Skip,
            DrawSource::Cpu { .. } if !indirect_first_instance => Self::Direct,
            DrawSource::Cpu { count } if multi_draw => Self::MultiIndirect { count },
            DrawSource::Cpu { count } => Self::SingleIndirect { count },
            DrawSource::Gpu { max_count } => Self::IndirectCount { max_count },
        }
    }
}

/// Rasterizer state for a group pipeline. Wireframe draws the same commands
/// with backface culling off and line polygons.
pub fn primitive_state(wireframe: bool) -> wgpu::PrimitiveState {
    wgpu::PrimitiveState {
        topology: wgpu::PrimitiveTopology::TriangleList,
        strip_index_format: None,
        front_face: wgpu::FrontFace::Ccw,
        cull_mode: if wireframe { None } else { Some(wgpu::Face::Back) },
        polygon_mode: if wireframe {
            wgpu::PolygonMode::Line
        } else {
            wgpu::PolygonMode::Fill
        },
        unclipped_depth: false,
        conservative: false,
    }
}

/// Solid and optional wireframe pipelines for one group
pub struct GroupPrograms {
    pub solid: wgpu::RenderPipeline,
    pub wireframe: Option<wgpu::RenderPipeline>,
}

impl GroupPrograms {
    /// Wireframe falls back to solid when the device cannot draw lines
    pub fn select(&self, flags: &FeatureFlags) -> &wgpu::RenderPipeline {
        match (&self.wireframe, flags.wireframe) {
            (Some(wireframe), true) => wireframe,
            _ => &self.solid,
        }
    }
}

struct MeshGroup {
    list: CommandList,
    commands: PersistentBuffer<DrawCommand, DeviceStorage>,
    entity_offsets: PersistentBuffer<u32, DeviceStorage>,
    culling: Option<GpuCullingTargets>,
    source: DrawSource,
}

impl MeshGroup {
    fn new(ctx: &GpuContext, kind: BatchKind, gpu_culling: bool) -> Self {
        let capacity = INITIAL_COMMAND_CAPACITY as usize;
        let (command_label, offset_label, camera_label) = match kind {
            BatchKind::Static => (
                "Static Draw Commands",
                "Static Entity Offsets",
                "Static Culling Camera",
            ),
            BatchKind::Animated => (
                "Animated Draw Commands",
                "Animated Entity Offsets",
                "Animated Culling Camera",
            ),
        };

        Self {
            list: CommandList::with_capacity(capacity),
            commands: PersistentBuffer::device(
                ctx,
                command_label,
                wgpu::BufferUsages::INDIRECT | wgpu::BufferUsages::STORAGE,
                capacity,
            ),
            entity_offsets: PersistentBuffer::device(
                ctx,
                offset_label,
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::VERTEX,
                capacity,
            ),
            culling: gpu_culling.then(|| GpuCullingTargets::new(ctx, camera_label)),
            source: DrawSource::Empty,
        }
    }

    fn prepare(
        &mut self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        culling_pipeline: Option<&CullingPipeline>,
        batches: &[DrawBatch],
        camera: CullingCamera,
        flags: &FeatureFlags,
    ) -> FrameStats {
        let gpu_path = match (culling_pipeline, self.culling.as_mut()) {
            (Some(pipeline), Some(targets)) if flags.use_gpu_culling(batches.len()) => {
                Some((pipeline, targets))
            }
            _ => None,
        };

        let mut stats = match gpu_path {
            Some((pipeline, targets)) => {
                let stats = *self.list.assemble_unculled(batches, flags);
                self.commands.put(ctx, self.list.commands());
                self.entity_offsets.put(ctx, self.list.entity_offsets());

                targets.prepare(ctx, batches, camera);
                pipeline.execute(
                    ctx,
                    encoder,
                    targets,
                    self.commands.buffer(),
                    self.entity_offsets.buffer(),
                );

                self.source = match targets.max_draw_count() {
                    0 => DrawSource::Empty,
                    max_count => DrawSource::Gpu { max_count },
                };
                stats
            }
            None => {
                let stats = *self.list.assemble(batches, flags);
                self.commands.put(ctx, self.list.commands());
                self.entity_offsets.put(ctx, self.list.entity_offsets());

                self.source = match self.list.len() as u32 {
                    0 => DrawSource::Empty,
                    count => DrawSource::Cpu { count },
                };
                stats
            }
        };

        if self.source != DrawSource::Empty {
            stats.draw_calls = 1;
        }
        stats
    }
}

/// Command assembly and indirect submission for static and animated batches
pub struct CommandPipeline {
    culling_pipeline: Option<CullingPipeline>,
    /// Without MULTI_DRAW_INDIRECT, CPU-counted groups draw one command at a time
    multi_draw: bool,
    /// Without INDIRECT_FIRST_INSTANCE, CPU-counted groups draw direct
    indirect_first_instance: bool,
    static_group: MeshGroup,
    animated_group: MeshGroup,
    stats: FrameStats,
}

impl CommandPipeline {
    pub fn new(ctx: &GpuContext) -> Self {
        let gpu_culling = ctx.supports_gpu_culling();
        if !gpu_culling {
            log::info!("[CommandPipeline] GPU culling unsupported, using CPU culling only");
        }

        Self {
            culling_pipeline: gpu_culling.then(|| CullingPipeline::new(ctx)),
            multi_draw: ctx
                .features()
                .contains(wgpu::Features::MULTI_DRAW_INDIRECT),
            indirect_first_instance: ctx.supports_indirect_first_instance(),
            static_group: MeshGroup::new(ctx, BatchKind::Static, gpu_culling),
            animated_group: MeshGroup::new(ctx, BatchKind::Animated, gpu_culling),
            stats: FrameStats::default(),
        }
    }

    /// Build and upload this frame's commands for both groups. GPU culling
    /// passes, if any, are recorded into `encoder`.
    pub fn prepare(
        &mut self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        state: &RenderState,
        flags: &FeatureFlags,
    ) -> FrameStats {
        let camera = CullingCamera::new(&state.frustum, state.camera.position, 0);
        let culling_pipeline = self.culling_pipeline.as_ref();

        let mut stats = self.static_group.prepare(
            ctx,
            encoder,
            culling_pipeline,
            state.static_batches.as_slice(),
            camera,
            flags,
        );
        stats += self.animated_group.prepare(
            ctx,
            encoder,
            culling_pipeline,
            state.animated_batches.as_slice(),
            camera,
            flags,
        );

        log::trace!(
            "[CommandPipeline] {} commands, {} draw calls, gpu culled: {}",
            stats.commands_emitted,
            stats.draw_calls,
            stats.gpu_culled
        );
        self.stats = stats;
        stats
    }

    fn group(&self, kind: BatchKind) -> &MeshGroup {
        match kind {
            BatchKind::Static => &self.static_group,
            BatchKind::Animated => &self.animated_group,
        }
    }

    /// Record the draws for `kind`, normally a single indirect multi-draw.
    /// The caller has already set the pipeline, bind groups and mesh buffers.
    pub fn draw<'a>(&'a self, pass: &mut wgpu::RenderPass<'a>, kind: BatchKind) {
        let group = self.group(kind);
        match self.draw_mode(kind) {
            DrawMode::Skip => {}
            DrawMode::MultiIndirect { count } => {
                pass.multi_draw_indexed_indirect(group.commands.buffer(), 0, count);
            }
            DrawMode::SingleIndirect { count } => {
                for i in 0..count as u64 {
                    pass.draw_indexed_indirect(group.commands.buffer(), i * DRAW_COMMAND_SIZE);
                }
            }
            DrawMode::Direct => {
                for command in group.list.commands() {
                    pass.draw_indexed(
                        command.index_range(),
                        command.base_vertex as i32,
                        command.instance_range(),
                    );
                }
            }
            DrawMode::IndirectCount { max_count } => {
                if let Some(targets) = &group.culling {
                    let (count_buffer, count_offset) = targets.counter().draw_parameter();
                    pass.multi_draw_indexed_indirect_count(
                        targets.compacted_commands(),
                        0,
                        count_buffer,
                        count_offset,
                        max_count,
                    );
                }
            }
        }
    }

    pub fn draw_mode(&self, kind: BatchKind) -> DrawMode {
        DrawMode::select(
            self.group(kind).source,
            self.multi_draw,
            self.indirect_first_instance,
        )
    }

    pub fn draw_source(&self, kind: BatchKind) -> DrawSource {
        self.group(kind).source
    }

    /// Command buffer the next `draw` of `kind` reads from
    pub fn command_buffer(&self, kind: BatchKind) -> &wgpu::Buffer {
        let group = self.group(kind);
        match (&group.source, &group.culling) {
            (DrawSource::Gpu { .. }, Some(targets)) => targets.compacted_commands(),
            _ => group.commands.buffer(),
        }
    }

    /// Entity offsets parallel to `command_buffer(kind)`
    pub fn entity_offsets_buffer(&self, kind: BatchKind) -> &wgpu::Buffer {
        let group = self.group(kind);
        match (&group.source, &group.culling) {
            (DrawSource::Gpu { .. }, Some(targets)) => targets.compacted_offsets(),
            _ => group.entity_offsets.buffer(),
        }
    }

    /// Copy the visibility counters of GPU-culled groups into their readback
    /// buffers, for `read_visible_count`
    pub fn copy_counts_for_readback(&self, encoder: &mut wgpu::CommandEncoder) {
        for group in [&self.static_group, &self.animated_group] {
            if let (DrawSource::Gpu { .. }, Some(targets)) = (&group.source, &group.culling) {
                targets.counter().copy_for_readback(encoder);
            }
        }
    }

    /// Surviving instance count of a GPU-culled group, `None` for CPU-culled
    /// groups. Stalls; diagnostics only.
    pub fn read_visible_count(&self, ctx: &GpuContext, kind: BatchKind) -> EngineResult<Option<u32>> {
        let group = self.group(kind);
        match (&group.source, &group.culling) {
            (DrawSource::Gpu { .. }, Some(targets)) => {
                let counts = targets.counter().read_blocking(ctx)?;
                Ok(Some(counts.visible))
            }
            _ => Ok(None),
        }
    }

    /// CPU command list of the last frame for `kind`
    pub fn command_list(&self, kind: BatchKind) -> &CommandList {
        &self.group(kind).list
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Number of command buffer reallocations across both groups
    pub fn grow_count(&self) -> u32 {
        [&self.static_group, &self.animated_group]
            .iter()
            .map(|g| g.commands.grow_count() + g.entity_offsets.grow_count())
            .sum()
    }

    pub fn supports_gpu_culling(&self) -> bool {
        self.culling_pipeline.is_some()
    }
}
