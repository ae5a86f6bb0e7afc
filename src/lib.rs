pub mod bounds;
pub mod camera;
pub mod config;
pub mod constants;
pub mod error;
pub mod renderer;

pub use bounds::{Aabb, BoundingSphere};
pub use camera::{CameraData, Frustum};
pub use config::{ConfigWatcher, FeatureFlags, RenderConfig, SharedConfig};
pub use error::{EngineError, EngineResult};
pub use renderer::{
    BatchKind, CommandPipeline, DrawBatch, DrawBatchDesc, DrawCommand, FrameRenderer,
    FrameStats, GpuContext, ProbeScheduler, RenderState, RenderStateBuffer, StateReader,
    StateWriter,
};
