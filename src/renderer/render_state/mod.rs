/// Render state hand-off
///
/// The simulation fills a `RenderState` through a `StateWriter` and publishes
/// it; the render thread picks up the newest one through a `StateReader`.
/// Three slots rotate between them, gated by GPU completion fences.

pub mod buffer;
pub mod extension;
pub mod state;


pub use buffer::{RenderStateBuffer, RenderStateBufferBuilder, StateReader, StateWriter};
pub use extension::{ExtensionKey, Extensions};
pub use state::{
    ChangeCounters, ChangeKind, ChangeTracker, DirectionalLight, PointLight, RenderState,
};
