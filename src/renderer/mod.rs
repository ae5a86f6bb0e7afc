pub mod error;
pub mod fence;
pub mod frame;
pub mod gpu_context;
pub mod gpu_driven;
pub mod probes;
pub mod program_slot;
pub mod render_state;

pub use error::{RendererErrorContext, RendererResult};
pub use fence::FrameFence;
pub use frame::{FrameRenderer, PhaseContext, PhaseHook, RenderPhase};
pub use gpu_context::{GpuContext, GpuExecutor, GpuExecutorHandle, GpuJob, PREFERRED_FEATURES};
pub use gpu_driven::{
    primitive_state, BatchArena, BatchCommand, BatchKind, CommandList, CommandPipeline,
    DrawBatch, DrawBatchDesc, DrawCommand, DrawMode, DrawSource, FrameStats, GroupPrograms, MaterialId,
    PersistentBuffer, ProgramId, VisibilityCounter,
};
pub use probes::{ProbeDesc, ProbeId, ProbeRequest, ProbeScheduler, Urgency};
pub use program_slot::ProgramSlot;
pub use render_state::{
    ChangeKind, ChangeTracker, DirectionalLight, ExtensionKey, PointLight, RenderState,
    RenderStateBuffer, StateReader, StateWriter,
};
