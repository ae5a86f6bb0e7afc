use crate::bounds::{Aabb, BoundingSphere};
use crate::camera::Frustum;

use super::indirect_commands::DrawCommand;

/// Opaque compiled-program handle from the shader manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ProgramId(pub u32);

/// Opaque material handle from the material manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MaterialId(pub u32);

/// Mesh group a batch is drawn with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BatchKind {
    #[default]
    Static,
    Animated,
}

/// Indirect draw descriptor embedded in a batch
///
/// `entity_offset` indexes the per-entity transform/material table and stays
/// fixed for the batch within a frame. It travels in a parallel array on the
/// GPU, never inside `DrawCommand`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchCommand {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: u32,
    pub entity_offset: u32,
}

impl BatchCommand {
    /// The 5-word hardware command; the first instance is the entity offset
    /// so `instance_index` in the vertex stage lands on the entity table row.
    pub fn to_draw_command(&self) -> DrawCommand {
        DrawCommand {
            index_count: self.index_count,
            instance_count: self.instance_count,
            first_index: self.first_index,
            base_vertex: self.base_vertex,
            base_instance: self.entity_offset,
        }
    }
}

/// Every field of a batch, applied in one `DrawBatch::init`
#[derive(Debug, Clone, Copy)]
pub struct DrawBatchDesc<'a> {
    pub program: ProgramId,
    pub material: MaterialId,
    pub kind: BatchKind,
    pub visible: bool,
    pub selected: bool,
    pub aabb: Aabb,
    pub instance_aabbs: &'a [Aabb],
    pub vertex_count: u32,
    pub command: BatchCommand,
}

impl<'a> Default for DrawBatchDesc<'a> {
    fn default() -> Self {
        Self {
            program: ProgramId::default(),
            material: MaterialId::default(),
            kind: BatchKind::Static,
            visible: true,
            selected: false,
            aabb: Aabb::EMPTY,
            instance_aabbs: &[],
            vertex_count: 0,
            command: BatchCommand::default(),
        }
    }
}

/// Per-drawable record, pooled and reused in place across frames
#[derive(Debug, Clone, Default)]
pub struct DrawBatch {
    program: ProgramId,
    material: MaterialId,
    kind: BatchKind,
    visible: bool,
    visible_for_camera: bool,
    selected: bool,
    aabb: Aabb,
    instance_aabbs: Vec<Aabb>,
    sphere: BoundingSphere,
    vertex_count: u32,
    command: BatchCommand,
}

impl DrawBatch {
    pub fn new(desc: &DrawBatchDesc<'_>) -> Self {
        let mut batch = Self::default();
        batch.init(desc);
        batch
    }

    /// Reset every field from `desc`. Camera visibility starts as the
    /// `visible` flag until the next frustum test; instance bounds reuse the
    /// existing allocation.
    pub fn init(&mut self, desc: &DrawBatchDesc<'_>) {
        self.program = desc.program;
        self.material = desc.material;
        self.kind = desc.kind;
        self.visible = desc.visible;
        self.visible_for_camera = desc.visible;
        self.selected = desc.selected;
        self.aabb = desc.aabb;
        self.instance_aabbs.clear();
        self.instance_aabbs.extend_from_slice(desc.instance_aabbs);
        self.sphere = if desc.aabb.is_empty() {
            BoundingSphere::default()
        } else {
            desc.aabb.bounding_sphere()
        };
        self.vertex_count = desc.vertex_count;
        self.command = desc.command;
    }

    /// CPU frustum test, run once per frame per batch. A hidden batch never
    /// counts as visible to the camera.
    pub fn update_camera_visibility(&mut self, frustum: &Frustum) {
        self.visible_for_camera = self.visible && frustum.intersects_aabb(&self.aabb);
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_visible_for_camera(&self) -> bool {
        self.visible_for_camera
    }

    /// Test hook and escape hatch for externally computed visibility. Hidden
    /// batches stay invisible.
    pub fn set_visible_for_camera(&mut self, visible: bool) {
        self.visible_for_camera = self.visible && visible;
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn kind(&self) -> BatchKind {
        self.kind
    }

    pub fn is_animated(&self) -> bool {
        self.kind == BatchKind::Animated
    }

    pub fn program(&self) -> ProgramId {
        self.program
    }

    pub fn material(&self) -> MaterialId {
        self.material
    }

    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    /// Bounds of instance `i`, falling back to the batch bounds
    pub fn instance_aabb(&self, i: usize) -> &Aabb {
        self.instance_aabbs.get(i).unwrap_or(&self.aabb)
    }

    pub fn bounding_sphere(&self) -> &BoundingSphere {
        &self.sphere
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn instance_count(&self) -> u32 {
        self.command.instance_count
    }

    pub fn entity_offset(&self) -> u32 {
        self.command.entity_offset
    }

    pub fn command(&self) -> &BatchCommand {
        &self.command
    }
}
