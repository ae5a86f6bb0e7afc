// Frame pipeline constants - SINGLE SOURCE OF TRUTH
//
// CPU code and the WGSL culling shader must agree on every layout value here.
// Keep `renderer/shaders/gpu_culling.wgsl` in sync when changing these.

/// Render state hand-off
pub mod render_state {
    /// Producer slot, consumer slot, in-flight slot
    pub const SLOT_COUNT: usize = 3;

    /// Pre-allocated draw batches per group in every slot
    pub const INITIAL_BATCH_CAPACITY: usize = 1024;
}

/// GPU buffer alignment requirement
pub mod alignment {
    /// `copy_buffer_to_buffer` and `write_buffer` require 4-byte multiples
    pub const COPY_BUFFER_ALIGN: u64 = wgpu::COPY_BUFFER_ALIGNMENT;
}

/// Indirect command buffer layouts
pub mod buffer_layouts {
    /// Size of indirect indexed draw command (5 u32 values)
    pub const DRAW_COMMAND_SIZE: u64 = 20;

    /// Size of a per-instance cull record (2 vec4 + 4 u32)
    pub const CULL_INSTANCE_SIZE: u64 = 48;

    /// Size of the culling camera uniform (6 planes + position + count)
    pub const CULLING_CAMERA_SIZE: u64 = 128;

    /// Visibility counter (draw count, instance count, padding)
    pub const VISIBILITY_COUNTER_SIZE: u64 = 16;

    /// Initial command capacity before any growth
    pub const INITIAL_COMMAND_CAPACITY: u32 = 1024;

    /// Growth multiplier applied to the requested element count
    pub const GROWTH_FACTOR: u64 = 2;
}

/// GPU-driven culling
pub mod gpu_driven {
    /// Threads per workgroup in `cull_instances`
    pub const CULL_WORKGROUP_SIZE: u32 = 64;

    /// Batch count above which GPU culling replaces CPU culling
    pub const DEFAULT_GPU_CULLING_THRESHOLD: usize = 4096;
}

/// Environment probes
pub mod probes {
    /// Cube faces per probe
    pub const FACE_COUNT: u8 = 6;

    /// Mask with every face rendered
    pub const ALL_FACES: u8 = (1 << FACE_COUNT) - 1;

    /// Default probe re-renders per frame
    pub const DEFAULT_FRAME_BUDGET: usize = 3;
}

/// Shader reload hand-over
pub mod shaders {
    /// Bounded wait for an asynchronous program reload
    pub const RELOAD_TIMEOUT_MS: u64 = 2000;
}
