use crate::bounds::Aabb;
use crate::camera::{build_frustum, init_camera, CameraData, Frustum};
use crate::constants::render_state::INITIAL_BATCH_CAPACITY;
use crate::renderer::gpu_driven::BatchArena;

use super::extension::{ExtensionKey, Extensions};

/// Sun-style light
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub direction: [f32; 3],
    pub color: [f32; 3],
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: [-0.3, -1.0, -0.2],
            color: [1.0, 1.0, 1.0],
            intensity: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub radius: f32,
}

/// Scene changes tracked per cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    EntityMoved,
    StaticEntityMoved,
    EntityAdded,
    DirectionalLightMoved,
    PointLightMoved,
    MaterialChanged,
}

/// Cycle in which each kind of change last happened. Values only increase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeCounters {
    pub entity_moved: u64,
    pub static_entity_moved: u64,
    pub entity_added: u64,
    pub directional_light_moved: u64,
    pub point_light_moved: u64,
    pub material_changed: u64,
}

impl ChangeCounters {
    fn field_mut(&mut self, kind: ChangeKind) -> &mut u64 {
        match kind {
            ChangeKind::EntityMoved => &mut self.entity_moved,
            ChangeKind::StaticEntityMoved => &mut self.static_entity_moved,
            ChangeKind::EntityAdded => &mut self.entity_added,
            ChangeKind::DirectionalLightMoved => &mut self.directional_light_moved,
            ChangeKind::PointLightMoved => &mut self.point_light_moved,
            ChangeKind::MaterialChanged => &mut self.material_changed,
        }
    }

    pub fn get(&self, kind: ChangeKind) -> u64 {
        match kind {
            ChangeKind::EntityMoved => self.entity_moved,
            ChangeKind::StaticEntityMoved => self.static_entity_moved,
            ChangeKind::EntityAdded => self.entity_added,
            ChangeKind::DirectionalLightMoved => self.directional_light_moved,
            ChangeKind::PointLightMoved => self.point_light_moved,
            ChangeKind::MaterialChanged => self.material_changed,
        }
    }

    /// Record `kind` in `cycle`
    pub fn mark(&mut self, kind: ChangeKind, cycle: u64) {
        let field = self.field_mut(kind);
        *field = (*field).max(cycle);
    }

    /// Whether `kind` happened after `cycle`
    pub fn changed_since(&self, kind: ChangeKind, cycle: u64) -> bool {
        self.get(kind) > cycle
    }
}

/// Consumer-side helper remembering the last cycle it processed
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeTracker {
    last_cycle: u64,
}

impl ChangeTracker {
    /// Whether `kind` changed since the previous `advance`
    pub fn changed(&self, state: &RenderState, kind: ChangeKind) -> bool {
        state.changes.changed_since(kind, self.last_cycle)
    }

    pub fn advance(&mut self, state: &RenderState) {
        self.last_cycle = self.last_cycle.max(state.cycle);
    }

    pub fn last_cycle(&self) -> u64 {
        self.last_cycle
    }
}

/// One complete per-frame scene snapshot
///
/// Three of these exist, one per slot, for the lifetime of the buffer. They
/// are rewritten in place every tick.
#[derive(Debug)]
pub struct RenderState {
    pub camera: CameraData,
    /// Derived from `camera` on publish
    pub frustum: Frustum,
    pub directional_light: DirectionalLight,
    pub point_lights: Vec<PointLight>,
    pub static_batches: BatchArena,
    pub animated_batches: BatchArena,
    /// Union of every live batch bound, computed on publish
    pub scene_bounds: Aabb,
    /// Publish counter, stamped by the writer
    pub cycle: u64,
    pub changes: ChangeCounters,
    extensions: Extensions,
}

impl Default for RenderState {
    fn default() -> Self {
        Self::new(init_camera(1280, 720))
    }
}

impl RenderState {
    pub fn new(camera: CameraData) -> Self {
        Self {
            frustum: build_frustum(&camera),
            camera,
            directional_light: DirectionalLight::default(),
            point_lights: Vec::new(),
            static_batches: BatchArena::with_capacity(INITIAL_BATCH_CAPACITY),
            animated_batches: BatchArena::with_capacity(INITIAL_BATCH_CAPACITY),
            scene_bounds: Aabb::EMPTY,
            cycle: 0,
            changes: ChangeCounters::default(),
            extensions: Extensions::default(),
        }
    }

    /// Copy of everything except extension instances and pooled batch storage
    pub(super) fn duplicate(&self, extensions: Extensions) -> Self {
        let mut state = Self::new(self.camera);
        state.directional_light = self.directional_light;
        state.point_lights.clone_from(&self.point_lights);
        state.cycle = self.cycle;
        state.changes = self.changes;
        state.extensions = extensions;
        state
    }

    /// Record a change in the cycle currently being built
    pub fn mark_changed(&mut self, kind: ChangeKind) {
        self.changes.mark(kind, self.cycle);
    }

    /// Drop all batches for a full rebuild this tick
    pub fn clear_batches(&mut self) {
        self.static_batches.clear();
        self.animated_batches.clear();
    }

    pub fn batch_count(&self) -> usize {
        self.static_batches.len() + self.animated_batches.len()
    }

    /// Derive frustum, camera visibility and scene bounds from the mutated
    /// state, right before it becomes readable.
    pub(super) fn finalize(&mut self) {
        self.frustum = build_frustum(&self.camera);
        self.static_batches.update_camera_visibility(&self.frustum);
        self.animated_batches.update_camera_visibility(&self.frustum);
        self.scene_bounds = self
            .static_batches
            .bounds()
            .union(&self.animated_batches.bounds());
    }

    pub fn extension<T: 'static>(&self, key: &ExtensionKey<T>) -> Option<&T> {
        self.extensions.get(key)
    }

    pub fn extension_mut<T: 'static>(&mut self, key: &ExtensionKey<T>) -> Option<&mut T> {
        self.extensions.get_mut(key)
    }
}
