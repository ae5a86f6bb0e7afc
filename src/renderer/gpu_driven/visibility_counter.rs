use bytemuck::{Pod, Zeroable};

use crate::constants::buffer_layouts::VISIBILITY_COUNTER_SIZE;
use crate::renderer::error::{gpu_operation_error, RendererErrorContext, RendererResult};
use crate::renderer::gpu_context::GpuContext;

/// Counter contents as written by `cull_instances`
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct VisibilityCounts {
    /// Surviving instances; also the number of compacted draw commands
    pub visible: u32,

    /// Instances tested by the culling pass
    pub tested: u32,

    pub _padding: [u32; 2],
}

/// GPU-resident atomic counter
///
/// Incremented once per surviving instance by the culling pass, then bound as
/// the count buffer of `multi_draw_indexed_indirect_count`. The CPU never has
/// to know the count before issuing the draw; `read_blocking` exists for
/// diagnostics only.
pub struct VisibilityCounter {
    buffer: wgpu::Buffer,
    readback: wgpu::Buffer,
}

impl VisibilityCounter {
    pub fn new(ctx: &GpuContext) -> Self {
        let buffer = ctx.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("Visibility Counter"),
            size: VISIBILITY_COUNTER_SIZE,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::INDIRECT
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let readback = ctx.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("Visibility Counter Readback"),
            size: VISIBILITY_COUNTER_SIZE,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self { buffer, readback }
    }

    /// Zero the counter on the GPU timeline
    pub fn reset(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.clear_buffer(&self.buffer, 0, None);
    }

    /// Storage binding for the culling pass
    pub fn as_binding(&self) -> wgpu::BindingResource {
        self.buffer.as_entire_binding()
    }

    /// Count buffer and offset for an indirect-count draw
    pub fn draw_parameter(&self) -> (&wgpu::Buffer, wgpu::BufferAddress) {
        (&self.buffer, 0)
    }

    /// Queue a copy into the readback buffer
    pub fn copy_for_readback(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.copy_buffer_to_buffer(&self.buffer, 0, &self.readback, 0, VISIBILITY_COUNTER_SIZE);
    }

    /// Map the readback buffer and return its contents. Stalls until the GPU
    /// has finished; diagnostics only.
    pub fn read_blocking(&self, ctx: &GpuContext) -> RendererResult<VisibilityCounts> {
        let slice = self.readback.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();

        slice.map_async(wgpu::MapMode::Read, move |result| {
            sender.send(result).ok();
        });

        ctx.device().poll(wgpu::Maintain::Wait);
        pollster::block_on(receiver)
            .renderer_context("visibility counter map callback dropped")?
            .map_err(|e| gpu_operation_error("visibility counter readback", e))?;

        let data = slice.get_mapped_range();
        let counts = *bytemuck::from_bytes::<VisibilityCounts>(&data);

        drop(data);
        self.readback.unmap();

        Ok(counts)
    }
}
