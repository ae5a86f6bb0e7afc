//! GPU completion fences
//!
//! A `FrameFence` is created for every submitted frame and signaled from the
//! queue's work-done callback. Callbacks only fire while the render thread
//! polls the device, so waiting on a fence from another thread relies on the
//! render loop keeping `device.poll` going.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

struct FenceInner {
    signaled: AtomicBool,
    lock: Mutex<()>,
    cvar: Condvar,
}

/// Shared completion flag for one submitted frame
#[derive(Clone)]
pub struct FrameFence {
    inner: Arc<FenceInner>,
}

impl std::fmt::Debug for FrameFence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameFence")
            .field("signaled", &self.is_signaled())
            .finish()
    }
}

impl FrameFence {
    /// Unsignaled fence
    pub fn new() -> Self {
        Self {
            inner: Arc::new(FenceInner {
                signaled: AtomicBool::new(false),
                lock: Mutex::new(()),
                cvar: Condvar::new(),
            }),
        }
    }

    /// Fence that is already complete (startup, CPU-only frames)
    pub fn signaled() -> Self {
        let fence = Self::new();
        fence.signal();
        fence
    }

    /// Fence signaled once all work submitted to `queue` so far has finished
    pub fn after_submitted_work(queue: &wgpu::Queue) -> Self {
        let fence = Self::new();
        let signal = fence.clone();
        queue.on_submitted_work_done(move || signal.signal());
        fence
    }

    pub fn is_signaled(&self) -> bool {
        self.inner.signaled.load(Ordering::Acquire)
    }

    pub fn signal(&self) {
        self.inner.signaled.store(true, Ordering::Release);
        let _guard = self.inner.lock.lock();
        self.inner.cvar.notify_all();
    }

    /// Block until signaled
    pub fn wait(&self) {
        if self.is_signaled() {
            return;
        }
        let mut guard = self.inner.lock.lock();
        while !self.is_signaled() {
            self.inner.cvar.wait(&mut guard);
        }
    }

    /// Block until signaled or `timeout` elapses; returns whether it signaled
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_signaled() {
            return true;
        }
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.lock.lock();
        while !self.is_signaled() {
            if self.inner.cvar.wait_until(&mut guard, deadline).timed_out() {
                return self.is_signaled();
            }
        }
        true
    }
}

impl Default for FrameFence {
    fn default() -> Self {
        Self::new()
    }
}
