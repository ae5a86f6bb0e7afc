//! Explicit GPU context handle and the serializing job queue in front of it
//!
//! `GpuContext` owns the device and queue. It can be moved onto the render
//! thread but not shared (`!Sync`, not `Clone`), so every component that
//! touches GPU state has to be handed `&GpuContext` by the render thread.
//! Other threads go through a `GpuExecutorHandle`, whose jobs run when the
//! render thread drains the `GpuExecutor`.

use std::cell::Cell;
use std::marker::PhantomData;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::error::{EngineError, EngineResult};

/// Features the pipeline uses when the adapter offers them
pub const PREFERRED_FEATURES: wgpu::Features = wgpu::Features::MULTI_DRAW_INDIRECT
    .union(wgpu::Features::MULTI_DRAW_INDIRECT_COUNT)
    .union(wgpu::Features::INDIRECT_FIRST_INSTANCE)
    .union(wgpu::Features::POLYGON_MODE_LINE);

/// Non-shareable owner of the device and queue
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    _not_sync: PhantomData<Cell<()>>,
}

impl GpuContext {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            _not_sync: PhantomData,
        }
    }

    /// Create a context without a surface (tools, tests, offscreen work)
    pub fn request_headless() -> EngineResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or(EngineError::NoAdapter)?;

        let info = adapter.get_info();
        log::info!("[GpuContext] Using adapter {} ({:?})", info.name, info.backend);

        let features = adapter.features() & PREFERRED_FEATURES;
        if !features.contains(wgpu::Features::MULTI_DRAW_INDIRECT_COUNT) {
            log::warn!("[GpuContext] MULTI_DRAW_INDIRECT_COUNT unavailable, GPU culling disabled");
        }
        if !features.contains(wgpu::Features::INDIRECT_FIRST_INSTANCE) {
            log::warn!(
                "[GpuContext] INDIRECT_FIRST_INSTANCE unavailable, drawing direct instead of indirect"
            );
        }

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Frame Pipeline Device"),
                required_features: features,
                required_limits: wgpu::Limits::default(),
            },
            None,
        ))
        .map_err(|e| EngineError::DeviceRequest(e.to_string()))?;

        Ok(Self::new(device, queue))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn features(&self) -> wgpu::Features {
        self.device.features()
    }

    /// Indirect commands can carry `base_instance`, which is how draws find
    /// their entity rows
    pub fn supports_indirect_first_instance(&self) -> bool {
        self.features().contains(wgpu::Features::INDIRECT_FIRST_INSTANCE)
    }

    /// GPU culling needs the draw count sourced from a buffer and compacted
    /// commands that keep their `base_instance`
    pub fn supports_gpu_culling(&self) -> bool {
        self.features().contains(
            wgpu::Features::MULTI_DRAW_INDIRECT_COUNT | wgpu::Features::INDIRECT_FIRST_INSTANCE,
        )
    }

    pub fn supports_wireframe(&self) -> bool {
        self.features().contains(wgpu::Features::POLYGON_MODE_LINE)
    }

    /// Process completed-work callbacks (fences, buffer maps) without blocking
    pub fn poll(&self) {
        self.device.poll(wgpu::Maintain::Poll);
    }

    /// Run `f` and check for driver validation errors afterwards.
    ///
    /// Debug builds log the error with `label` and abort the process, since
    /// later frames would run on undefined driver state. Release builds skip
    /// the check entirely.
    #[cfg(debug_assertions)]
    pub fn checked<R>(&self, label: &str, f: impl FnOnce(&Self) -> R) -> R {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let result = f(self);
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            log::error!("[GpuContext] Driver error during '{}': {}", label, error);
            std::process::abort();
        }
        result
    }

    #[cfg(not(debug_assertions))]
    #[inline(always)]
    pub fn checked<R>(&self, _label: &str, f: impl FnOnce(&Self) -> R) -> R {
        f(self)
    }
}

/// Job queued for the render thread
pub type GpuJob<C = GpuContext> = Box<dyn FnOnce(&C) + Send + 'static>;

/// Serializing queue drained by the thread that owns the context
pub struct GpuExecutor<C = GpuContext> {
    sender: Sender<GpuJob<C>>,
    receiver: Receiver<GpuJob<C>>,
}

impl<C> GpuExecutor<C> {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Cloneable, `Send` submission handle for other threads
    pub fn handle(&self) -> GpuExecutorHandle<C> {
        GpuExecutorHandle {
            sender: self.sender.clone(),
        }
    }

    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Run every job queued before this call, in submission order.
    /// Jobs queued while draining wait for the next drain.
    pub fn drain(&self, ctx: &C) -> usize {
        let queued = self.receiver.len();
        let mut ran = 0;
        for job in self.receiver.try_iter().take(queued) {
            job(ctx);
            ran += 1;
        }
        if ran > 0 {
            log::trace!("[GpuExecutor] Ran {} queued jobs", ran);
        }
        ran
    }
}

impl<C> Default for GpuExecutor<C> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct GpuExecutorHandle<C = GpuContext> {
    sender: Sender<GpuJob<C>>,
}

impl<C> Clone for GpuExecutorHandle<C> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<C> GpuExecutorHandle<C> {
    /// Queue `job` for the render thread
    pub fn submit(&self, job: impl FnOnce(&C) + Send + 'static) -> EngineResult<()> {
        self.sender
            .send(Box::new(job))
            .map_err(|_| EngineError::SystemError {
                component: "gpu_executor".to_string(),
                error: "render thread executor has shut down".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeContext {
        log: Mutex<Vec<u32>>,
    }

    #[test]
    fn test_jobs_run_in_submission_order_on_drain() {
        let executor: GpuExecutor<FakeContext> = GpuExecutor::new();
        let ctx = FakeContext::default();

        let workers: Vec<_> = (0..2)
            .map(|t| {
                let handle = executor.handle();
                std::thread::spawn(move || {
                    for i in 0..10u32 {
                        handle
                            .submit(move |ctx: &FakeContext| ctx.log.lock().push(t * 100 + i))
                            .unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert!(ctx.log.lock().is_empty());
        assert_eq!(executor.drain(&ctx), 20);

        let log = ctx.log.lock();
        let first: Vec<u32> = log.iter().copied().filter(|v| *v < 100).collect();
        let second: Vec<u32> = log.iter().copied().filter(|v| *v >= 100).collect();
        assert_eq!(first, (0..10).collect::<Vec<_>>());
        assert_eq!(second, (100..110).collect::<Vec<_>>());
    }

    #[test]
    fn test_jobs_submitted_during_drain_wait_for_next_drain() {
        let executor: GpuExecutor<FakeContext> = GpuExecutor::new();
        let ctx = FakeContext::default();
        let handle = executor.handle();
        let inner = Arc::new(handle.clone());

        handle
            .submit(move |ctx: &FakeContext| {
                ctx.log.lock().push(1);
                inner.submit(|ctx: &FakeContext| ctx.log.lock().push(2)).unwrap();
            })
            .unwrap();

        assert_eq!(executor.drain(&ctx), 1);
        assert_eq!(*ctx.log.lock(), vec![1]);
        assert_eq!(executor.drain(&ctx), 1);
        assert_eq!(*ctx.log.lock(), vec![1, 2]);
    }

    #[test]
    fn test_submit_fails_after_executor_dropped() {
        let executor: GpuExecutor<FakeContext> = GpuExecutor::new();
        let handle = executor.handle();
        drop(executor);
        assert!(handle.submit(|_| {}).is_err());
    }
}
