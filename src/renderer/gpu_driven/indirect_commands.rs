use bytemuck::{Pod, Zeroable};

use crate::config::FeatureFlags;

use super::draw_batch::DrawBatch;

/// GPU indirect draw indexed command structure
/// Matches the hardware multi-draw-indirect argument layout exactly
/// Total size: 20 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawCommand {
    /// Number of indices to draw
    pub index_count: u32,

    /// Number of instances to draw
    pub instance_count: u32,

    /// Offset into the index buffer
    pub first_index: u32,

    /// Value added to each index before fetching vertex
    pub base_vertex: u32,

    /// Offset into the instance range
    pub base_instance: u32,
}

impl DrawCommand {
    pub fn new(index_count: u32, instance_count: u32) -> Self {
        Self {
            index_count,
            instance_count,
            ..Default::default()
        }
    }

    /// Index range for a direct `draw_indexed` of this command
    pub fn index_range(&self) -> std::ops::Range<u32> {
        self.first_index..self.first_index + self.index_count
    }

    /// Instance range for a direct `draw_indexed`, starting at the entity row
    pub fn instance_range(&self) -> std::ops::Range<u32> {
        self.base_instance..self.base_instance + self.instance_count
    }
}

/// Per-frame diagnostics, exposed to profiling overlays only
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    pub vertices_drawn: u64,
    pub entities_drawn: u64,
    pub lines_drawn: u64,
    pub commands_emitted: u32,
    pub draw_calls: u32,
    /// Counts were taken before GPU culling and are an upper bound
    pub gpu_culled: bool,
}

impl std::ops::AddAssign for FrameStats {
    fn add_assign(&mut self, other: Self) {
        self.vertices_drawn += other.vertices_drawn;
        self.entities_drawn += other.entities_drawn;
        self.lines_drawn += other.lines_drawn;
        self.commands_emitted += other.commands_emitted;
        self.draw_calls += other.draw_calls;
        self.gpu_culled |= other.gpu_culled;
    }
}

/// CPU-side command assembly for one mesh group
///
/// Commands and entity offsets are rebuilt from scratch every frame into
/// containers that keep their capacity.
#[derive(Debug, Default)]
pub struct CommandList {
    commands: Vec<DrawCommand>,
    entity_offsets: Vec<u32>,
    stats: FrameStats,
}

impl CommandList {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            commands: Vec::with_capacity(capacity),
            entity_offsets: Vec::with_capacity(capacity),
            stats: FrameStats::default(),
        }
    }

    /// Reset counters and empty the containers without freeing them
    pub fn clear(&mut self) {
        self.commands.clear();
        self.entity_offsets.clear();
        self.stats = FrameStats::default();
    }

    /// CPU-culled assembly. With frustum culling on, batches that failed the
    /// camera test (hidden ones included) are left out entirely. With it off,
    /// every batch is emitted.
    pub fn assemble(&mut self, batches: &[DrawBatch], flags: &FeatureFlags) -> &FrameStats {
        self.clear();
        for batch in batches {
            if flags.frustum_culling && !batch.is_visible_for_camera() {
                continue;
            }
            self.emit(batch, flags.wireframe);
        }
        &self.stats
    }

    /// Phase-1 assembly for GPU culling: one command per batch, in batch
    /// order. Which instances draw is decided later on the GPU.
    pub fn assemble_unculled(&mut self, batches: &[DrawBatch], flags: &FeatureFlags) -> &FrameStats {
        self.clear();
        for batch in batches {
            self.emit(batch, flags.wireframe);
        }
        self.stats.gpu_culled = true;
        &self.stats
    }

    fn emit(&mut self, batch: &DrawBatch, wireframe: bool) {
        let command = batch.command();
        let instances = command.instance_count as u64;

        self.stats.vertices_drawn += batch.vertex_count() as u64 * instances;
        if batch.vertex_count() > 0 {
            self.stats.entities_drawn += instances;
        }
        if wireframe {
            // Triangle lists rasterize one line per index
            self.stats.lines_drawn += command.index_count as u64 * instances;
        }

        self.commands.push(command.to_draw_command());
        self.entity_offsets.push(command.entity_offset);
        self.stats.commands_emitted += 1;
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn entity_offsets(&self) -> &[u32] {
        &self.entity_offsets
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.commands.capacity()
    }
}
