/// GPU-driven command assembly
///
/// Turns pooled draw batches into packed indirect draw commands plus a
/// parallel entity offset array, culled either on the CPU or by a compute
/// pass that sources the draw count from a GPU counter.
///
/// Key components:
/// - DrawBatch records pooled in a BatchArena
/// - CommandList for CPU culling and packing
/// - PersistentBuffer for grow-only command storage
/// - CullingPipeline and VisibilityCounter for GPU culling
/// - CommandPipeline tying both mesh groups together

pub mod batch_arena;
pub mod command_pipeline;
pub mod culling_pipeline;
pub mod draw_batch;
pub mod indirect_commands;
pub mod persistent_buffer;
pub mod visibility_counter;


pub use batch_arena::BatchArena;
pub use command_pipeline::{primitive_state, CommandPipeline, DrawMode, DrawSource, GroupPrograms};
pub use culling_pipeline::{build_cull_records, CullInstance, CullingPipeline, GpuCullingTargets};
pub use draw_batch::{BatchCommand, BatchKind, DrawBatch, DrawBatchDesc, MaterialId, ProgramId};
pub use indirect_commands::{CommandList, DrawCommand, FrameStats};
pub use persistent_buffer::{BufferStorage, DeviceStorage, HostStorage, PersistentBuffer};
pub use visibility_counter::{VisibilityCounter, VisibilityCounts};
