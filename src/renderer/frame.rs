//! Per-frame orchestration on the render thread
//!
//! Order within a frame is fixed: sample config, drain queued GPU jobs, take
//! the newest render state, `BeforeCommands` hooks, command assembly for both
//! mesh groups, `AfterCommands` hooks, probe hooks, submit, fence.

use std::time::Duration;

use crate::camera::camera_position;
use crate::config::{ConfigWatcher, FeatureFlags, SharedConfig};
use crate::error::EngineResult;

use super::fence::FrameFence;
use super::gpu_context::{GpuContext, GpuExecutor, GpuExecutorHandle};
use super::gpu_driven::{CommandPipeline, FrameStats};
use super::probes::{ProbeRequest, ProbeScheduler};
use super::render_state::{RenderState, StateReader};

/// Point in the frame where a hook runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderPhase {
    /// Before command assembly, e.g. shadow or depth prepasses
    BeforeCommands,
    /// After command buffers are uploaded; main passes draw here
    AfterCommands,
    /// Environment probe re-renders for this frame
    Probes,
}

/// Everything a hook may touch during its phase
pub struct PhaseContext<'a> {
    pub gpu: &'a GpuContext,
    pub encoder: &'a mut wgpu::CommandEncoder,
    pub state: &'a RenderState,
    pub flags: FeatureFlags,
    pub commands: &'a CommandPipeline,
    /// Probes scheduled this frame; empty outside `RenderPhase::Probes`
    pub probes: &'a [ProbeRequest],
    pub frame_index: u64,
}

pub type PhaseHook = Box<dyn FnMut(&mut PhaseContext<'_>) -> EngineResult<()>>;

fn run_phase(
    hooks: &mut [(RenderPhase, PhaseHook)],
    phase: RenderPhase,
    cx: &mut PhaseContext<'_>,
) -> EngineResult<()> {
    for (_, hook) in hooks.iter_mut().filter(|(p, _)| *p == phase) {
        hook(cx)?;
    }
    Ok(())
}

pub struct FrameRenderer {
    config: SharedConfig,
    watcher: ConfigWatcher,
    flags: FeatureFlags,
    reload_timeout: Duration,
    executor: GpuExecutor,
    commands: CommandPipeline,
    probes: ProbeScheduler,
    hooks: Vec<(RenderPhase, PhaseHook)>,
    probe_batch: Vec<ProbeRequest>,
    stats: FrameStats,
    frame_index: u64,
}

impl FrameRenderer {
    pub fn new(ctx: &GpuContext, config: SharedConfig) -> Self {
        let snapshot = config.snapshot();
        let mut watcher = ConfigWatcher::new();
        watcher.poll(&config);

        log::info!(
            "[FrameRenderer] Initialized (gpu culling supported: {}, wireframe supported: {})",
            ctx.supports_gpu_culling(),
            ctx.supports_wireframe()
        );

        Self {
            flags: snapshot.feature_flags(),
            reload_timeout: Duration::from_millis(snapshot.reload_timeout_ms),
            watcher,
            config,
            executor: GpuExecutor::new(),
            commands: CommandPipeline::new(ctx),
            probes: ProbeScheduler::new(snapshot.probe_budget),
            hooks: Vec::new(),
            probe_batch: Vec::with_capacity(snapshot.probe_budget),
            stats: FrameStats::default(),
            frame_index: 0,
        }
    }

    /// Append a hook; hooks of the same phase run in registration order
    pub fn add_hook(
        &mut self,
        phase: RenderPhase,
        hook: impl FnMut(&mut PhaseContext<'_>) -> EngineResult<()> + 'static,
    ) {
        self.hooks.push((phase, Box::new(hook)));
    }

    /// Handle for queuing GPU work from other threads
    pub fn executor_handle(&self) -> GpuExecutorHandle {
        self.executor.handle()
    }

    pub fn probes(&self) -> &ProbeScheduler {
        &self.probes
    }

    pub fn probes_mut(&mut self) -> &mut ProbeScheduler {
        &mut self.probes
    }

    pub fn commands(&self) -> &CommandPipeline {
        &self.commands
    }

    pub fn flags(&self) -> FeatureFlags {
        self.flags
    }

    /// Timeout for program reloads, from the current config
    pub fn reload_timeout(&self) -> Duration {
        self.reload_timeout
    }

    /// Diagnostics of the last rendered frame
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    fn sample_config(&mut self, ctx: &GpuContext) {
        let Some(config) = self.watcher.poll(&self.config) else {
            return;
        };

        self.flags = config.feature_flags();
        self.reload_timeout = Duration::from_millis(config.reload_timeout_ms);
        self.probes.set_budget(config.probe_budget);

        if self.flags.gpu_culling && !self.commands.supports_gpu_culling() {
            log::warn!("[FrameRenderer] GPU culling requested but unsupported, culling on CPU");
        }
        if self.flags.wireframe && !ctx.supports_wireframe() {
            log::warn!("[FrameRenderer] Wireframe requested but POLYGON_MODE_LINE is unavailable");
        }
        log::info!(
            "[FrameRenderer] Applied config version {}",
            self.config.version()
        );
    }

    /// Render the newest published state and attach the frame's completion
    /// fence to its slot.
    pub fn render_frame(
        &mut self,
        ctx: &GpuContext,
        reader: &mut StateReader,
    ) -> EngineResult<FrameStats> {
        self.sample_config(ctx);
        self.executor.drain(ctx);

        let flags = self.flags;
        let frame_index = self.frame_index;
        let mut encoder = ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        let state = reader.current_readable();

        run_phase(
            &mut self.hooks,
            RenderPhase::BeforeCommands,
            &mut PhaseContext {
                gpu: ctx,
                encoder: &mut encoder,
                state,
                flags,
                commands: &self.commands,
                probes: &[],
                frame_index,
            },
        )?;

        let commands = &mut self.commands;
        let stats = ctx.checked("command prepare", |ctx| {
            commands.prepare(ctx, &mut encoder, state, &flags)
        });

        run_phase(
            &mut self.hooks,
            RenderPhase::AfterCommands,
            &mut PhaseContext {
                gpu: ctx,
                encoder: &mut encoder,
                state,
                flags,
                commands: &self.commands,
                probes: &[],
                frame_index,
            },
        )?;

        self.probe_batch.clear();
        self.probe_batch
            .extend_from_slice(self.probes.next_frame(camera_position(&state.camera)));

        if !self.probe_batch.is_empty() {
            let result = run_phase(
                &mut self.hooks,
                RenderPhase::Probes,
                &mut PhaseContext {
                    gpu: ctx,
                    encoder: &mut encoder,
                    state,
                    flags,
                    commands: &self.commands,
                    probes: &self.probe_batch,
                    frame_index,
                },
            );
            self.finish_probes(result.is_ok());
            result?;
        }

        ctx.checked("frame submit", |ctx| {
            ctx.queue().submit(Some(encoder.finish()));
        });
        reader.attach_fence(FrameFence::after_submitted_work(ctx.queue()));
        ctx.poll();

        if flags.debug_overlay {
            log::debug!(
                "[FrameRenderer] Frame {}: {} vertices, {} entities, {} lines, {} draw calls",
                frame_index,
                stats.vertices_drawn,
                stats.entities_drawn,
                stats.lines_drawn,
                stats.draw_calls
            );
        }

        self.stats = stats;
        self.frame_index += 1;
        Ok(stats)
    }

    /// Complete this frame's probes if a hook rendered them. Anything left
    /// unfinished, including the whole batch when no hook ran or one failed,
    /// goes back to the front of the queue.
    fn finish_probes(&mut self, rendered: bool) {
        if rendered && self.hooks.iter().any(|(phase, _)| *phase == RenderPhase::Probes) {
            self.probes.complete_frame();
        }
        self.probes.end_frame();
    }
}
