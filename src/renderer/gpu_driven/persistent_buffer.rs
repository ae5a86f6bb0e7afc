//! Persistent, monotonically growing command buffers
//!
//! Capacity only ever grows. Growth allocates twice the requested size and
//! copies the old contents, so bytes below the old capacity survive. Each
//! frame writes its whole array at offset 0 instead of appending.

use std::marker::PhantomData;

use bytemuck::Pod;

use crate::constants::{alignment, buffer_layouts};
use crate::renderer::gpu_context::GpuContext;

/// Backing memory for a `PersistentBuffer`
pub trait BufferStorage {
    /// Whatever the storage needs to allocate and write
    type Context;

    fn capacity_bytes(&self) -> u64;

    /// Reallocate to `new_capacity` bytes keeping all current contents
    fn grow(&mut self, ctx: &Self::Context, new_capacity: u64);

    fn write(&mut self, ctx: &Self::Context, offset: u64, bytes: &[u8]);
}

/// Host memory storage, used as a CPU mirror and in tests
#[derive(Debug, Default, Clone)]
pub struct HostStorage {
    bytes: Vec<u8>,
}

impl HostStorage {
    pub fn new(capacity: u64) -> Self {
        Self {
            bytes: vec![0; capacity as usize],
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl BufferStorage for HostStorage {
    type Context = ();

    fn capacity_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn grow(&mut self, _ctx: &(), new_capacity: u64) {
        self.bytes.resize(new_capacity as usize, 0);
    }

    fn write(&mut self, _ctx: &(), offset: u64, bytes: &[u8]) {
        let start = offset as usize;
        self.bytes[start..start + bytes.len()].copy_from_slice(bytes);
    }
}

/// GPU buffer storage; growth copies the old buffer on the GPU timeline
pub struct DeviceStorage {
    buffer: wgpu::Buffer,
    label: &'static str,
    usage: wgpu::BufferUsages,
}

impl DeviceStorage {
    pub fn new(ctx: &GpuContext, label: &'static str, usage: wgpu::BufferUsages, capacity: u64) -> Self {
        let usage = usage | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC;
        let buffer = ctx.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: align_copy(capacity.max(alignment::COPY_BUFFER_ALIGN)),
            usage,
            mapped_at_creation: false,
        });

        Self { buffer, label, usage }
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

impl BufferStorage for DeviceStorage {
    type Context = GpuContext;

    fn capacity_bytes(&self) -> u64 {
        self.buffer.size()
    }

    fn grow(&mut self, ctx: &GpuContext, new_capacity: u64) {
        let new_buffer = ctx.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some(self.label),
            size: align_copy(new_capacity),
            usage: self.usage,
            mapped_at_creation: false,
        });

        let mut encoder = ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Persistent Buffer Growth"),
            });
        encoder.copy_buffer_to_buffer(&self.buffer, 0, &new_buffer, 0, self.buffer.size());
        ctx.queue().submit(Some(encoder.finish()));

        let old = std::mem::replace(&mut self.buffer, new_buffer);
        old.destroy();
    }

    fn write(&mut self, ctx: &GpuContext, offset: u64, bytes: &[u8]) {
        ctx.queue().write_buffer(&self.buffer, offset, bytes);
    }
}

fn align_copy(size: u64) -> u64 {
    let align = alignment::COPY_BUFFER_ALIGN;
    (size + align - 1) / align * align
}

/// Typed, growable buffer of `T`
pub struct PersistentBuffer<T: Pod, S: BufferStorage> {
    storage: S,
    len: usize,
    grow_count: u32,
    _marker: PhantomData<T>,
}

impl<T: Pod, S: BufferStorage> PersistentBuffer<T, S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            len: 0,
            grow_count: 0,
            _marker: PhantomData,
        }
    }

    /// Replace the contents with `data`, written at offset 0
    pub fn put(&mut self, ctx: &S::Context, data: &[T]) {
        self.put_at(ctx, 0, data);
        self.len = data.len();
    }

    /// Write `data` starting at element `offset`, growing if needed
    pub fn put_at(&mut self, ctx: &S::Context, offset: usize, data: &[T]) {
        let element = std::mem::size_of::<T>() as u64;
        let end = (offset + data.len()) as u64 * element;
        self.ensure_capacity(ctx, end);

        if !data.is_empty() {
            self.storage
                .write(ctx, offset as u64 * element, bytemuck::cast_slice(data));
        }
        self.len = self.len.max(offset + data.len());
    }

    /// Make room for at least `elements` without writing anything
    pub fn reserve(&mut self, ctx: &S::Context, elements: usize) {
        self.ensure_capacity(ctx, (elements * std::mem::size_of::<T>()) as u64);
    }

    /// Grow lazily once a write would exceed the current capacity
    fn ensure_capacity(&mut self, ctx: &S::Context, required_bytes: u64) {
        let capacity = self.storage.capacity_bytes();
        if required_bytes <= capacity {
            return;
        }

        let new_capacity = align_copy(required_bytes * buffer_layouts::GROWTH_FACTOR);
        log::debug!(
            "[PersistentBuffer] Growing from {} to {} bytes",
            capacity,
            new_capacity
        );
        self.storage.grow(ctx, new_capacity);
        self.grow_count += 1;
    }

    /// Elements written by the last `put`
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Capacity in elements
    pub fn capacity(&self) -> usize {
        (self.storage.capacity_bytes() / std::mem::size_of::<T>() as u64) as usize
    }

    /// Number of reallocations so far
    pub fn grow_count(&self) -> u32 {
        self.grow_count
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }
}

impl<T: Pod> PersistentBuffer<T, HostStorage> {
    /// Host-backed buffer with room for `capacity` elements
    pub fn host(capacity: usize) -> Self {
        Self::new(HostStorage::new((capacity * std::mem::size_of::<T>()) as u64))
    }

    /// Copy of every element slot up to the capacity
    pub fn to_vec(&self) -> Vec<T> {
        self.storage
            .bytes()
            .chunks_exact(std::mem::size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }
}

impl<T: Pod> PersistentBuffer<T, DeviceStorage> {
    pub fn device(
        ctx: &GpuContext,
        label: &'static str,
        usage: wgpu::BufferUsages,
        capacity: usize,
    ) -> Self {
        Self::new(DeviceStorage::new(
            ctx,
            label,
            usage,
            (capacity * std::mem::size_of::<T>()) as u64,
        ))
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        self.storage.buffer()
    }
}
