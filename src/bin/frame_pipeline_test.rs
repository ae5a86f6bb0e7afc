/// Frame Pipeline Test
///
/// Runs the full frame pipeline headless: a simulation thread publishes
/// render states for a grid of cubes while the render thread assembles and
/// culls indirect commands and draws them into an offscreen target. Midway
/// the config switches to GPU culling, then to wireframe.
///
/// Exits cleanly when no GPU adapter is available.

use std::cell::RefCell;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use cgmath::{Matrix4, Point3, Vector3};
use wgpu::util::DeviceExt;

use hearth_frame::bounds::Aabb;
use hearth_frame::camera::build_view_projection;
use hearth_frame::config::{RenderConfig, SharedConfig};
use hearth_frame::error::{EngineError, EngineResult};
use hearth_frame::renderer::{
    primitive_state, BatchCommand, BatchKind, DrawBatchDesc, FrameRenderer, GpuContext,
    GroupPrograms, ProbeDesc, ProgramSlot, RenderPhase, RenderState, RenderStateBuffer,
    StateWriter, Urgency,
};

const GRID: u32 = 48;
const SPACING: f32 = 4.0;
const ANIMATED_INSTANCES: u32 = 4;
const ANIMATED_BATCHES: u32 = 64;
const TICKS: u32 = 240;
const TARGET_SIZE: u32 = 256;
const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct EntityRow {
    placement: [f32; 4],
    color: [f32; 4],
}

#[rustfmt::skip]
const CUBE_VERTICES: [[f32; 3]; 8] = [
    [-0.5, -0.5, -0.5], [0.5, -0.5, -0.5], [0.5, 0.5, -0.5], [-0.5, 0.5, -0.5],
    [-0.5, -0.5, 0.5], [0.5, -0.5, 0.5], [0.5, 0.5, 0.5], [-0.5, 0.5, 0.5],
];

#[rustfmt::skip]
const CUBE_INDICES: [u32; 36] = [
    4, 5, 6, 6, 7, 4, // +z
    1, 0, 3, 3, 2, 1, // -z
    5, 1, 2, 2, 6, 5, // +x
    0, 4, 7, 7, 3, 0, // -x
    7, 6, 2, 2, 3, 7, // +y
    0, 1, 5, 5, 4, 0, // -y
];

fn static_count() -> u32 {
    GRID * GRID
}

fn entity_count() -> u32 {
    static_count() + ANIMATED_BATCHES * ANIMATED_INSTANCES
}

fn static_position(index: u32) -> Point3<f32> {
    let half = GRID as f32 * SPACING * 0.5;
    Point3::new(
        (index % GRID) as f32 * SPACING - half,
        0.0,
        (index / GRID) as f32 * SPACING - half,
    )
}

fn animated_position(batch: u32, instance: u32, tick: u32) -> Point3<f32> {
    let angle = (batch as f32 * 0.37 + tick as f32 * 0.02) + instance as f32 * 0.1;
    let radius = 20.0 + batch as f32 * 0.5;
    Point3::new(angle.cos() * radius, 4.0 + instance as f32 * 1.5, angle.sin() * radius)
}

fn animated_rows_for(tick: u32) -> impl Iterator<Item = EntityRow> {
    (0..ANIMATED_BATCHES).flat_map(move |batch| {
        (0..ANIMATED_INSTANCES).map(move |instance| {
            let p = animated_position(batch, instance, tick);
            EntityRow {
                placement: [p.x, p.y, p.z, 1.0],
                color: [0.8, 0.4, 0.2, 1.0],
            }
        })
    })
}

fn cube_bounds(center: Point3<f32>) -> Aabb {
    Aabb::from_center_extent(center, Vector3::new(0.5, 0.5, 0.5))
}

/// Rebuild the writable state for `tick`
fn simulate(state: &mut RenderState, tick: u32, scratch: &mut Vec<Aabb>) {
    state.camera.position = [0.0, 12.0, 40.0];
    state.camera.yaw_radians = -std::f32::consts::FRAC_PI_2 + (tick as f32 * 0.01).sin();
    state.camera.pitch_radians = -0.25;

    state.clear_batches();
    let index_count = CUBE_INDICES.len() as u32;

    for i in 0..static_count() {
        state.static_batches.push(&DrawBatchDesc {
            kind: BatchKind::Static,
            aabb: cube_bounds(static_position(i)),
            vertex_count: CUBE_VERTICES.len() as u32,
            command: BatchCommand {
                index_count,
                instance_count: 1,
                first_index: 0,
                base_vertex: 0,
                entity_offset: i,
            },
            ..Default::default()
        });
    }

    for batch in 0..ANIMATED_BATCHES {
        scratch.clear();
        scratch.extend((0..ANIMATED_INSTANCES).map(|i| cube_bounds(animated_position(batch, i, tick))));
        let aabb = scratch.iter().fold(Aabb::EMPTY, |acc, b| acc.union(b));

        state.animated_batches.push(&DrawBatchDesc {
            kind: BatchKind::Animated,
            aabb,
            instance_aabbs: scratch.as_slice(),
            vertex_count: CUBE_VERTICES.len() as u32,
            command: BatchCommand {
                index_count,
                instance_count: ANIMATED_INSTANCES,
                first_index: 0,
                base_vertex: 0,
                entity_offset: static_count() + batch * ANIMATED_INSTANCES,
            },
            ..Default::default()
        });
    }
}

fn run_simulation(mut writer: StateWriter) -> u64 {
    let mut scratch = Vec::with_capacity(ANIMATED_INSTANCES as usize);
    for tick in 0..TICKS {
        simulate(writer.acquire_writable(), tick, &mut scratch);
        writer.publish();
        thread::sleep(Duration::from_millis(4));
    }
    writer.cycle() - 1
}

struct DebugScene {
    programs: ProgramSlot<GroupPrograms>,
    camera_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    bind_group_layout: wgpu::BindGroupLayout,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    entity_buffer: wgpu::Buffer,
    target: wgpu::TextureView,
}

fn build_programs(
    ctx: &GpuContext,
    layout: &wgpu::BindGroupLayout,
) -> EngineResult<GroupPrograms> {
    let device = ctx.device();
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Entity Debug Shader"),
        source: wgpu::ShaderSource::Wgsl(
            include_str!("../renderer/shaders/entity_debug.wgsl").into(),
        ),
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Entity Debug Layout"),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });

    let create = |wireframe: bool| {
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(if wireframe { "Entity Wireframe" } else { "Entity Solid" }),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![0 => Float32x3],
                }],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: COLOR_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: primitive_state(wireframe),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        })
    };

    let programs = ctx.checked("entity pipelines", |ctx| GroupPrograms {
        solid: create(false),
        wireframe: ctx.supports_wireframe().then(|| create(true)),
    });
    Ok(programs)
}

fn build_scene(ctx: &GpuContext) -> Result<DebugScene> {
    let device = ctx.device();

    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Entity Debug Bind Group Layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    });

    let programs = pollster::block_on(ProgramSlot::load_initial(
        "entity_debug",
        async { build_programs(ctx, &bind_group_layout) },
    ))?;

    let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Debug Camera"),
        size: std::mem::size_of::<[[f32; 4]; 4]>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut rows = Vec::with_capacity(entity_count() as usize);
    for i in 0..static_count() {
        let p = static_position(i);
        rows.push(EntityRow {
            placement: [p.x, p.y, p.z, 1.0],
            color: [0.3, 0.6, 0.3, 1.0],
        });
    }
    rows.extend(animated_rows_for(0));
    let entity_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Entity Table"),
        contents: bytemuck::cast_slice(&rows),
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
    });

    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Entity Debug Bind Group"),
        layout: &bind_group_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: entity_buffer.as_entire_binding(),
            },
        ],
    });

    let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Cube Vertices"),
        contents: bytemuck::cast_slice(&CUBE_VERTICES),
        usage: wgpu::BufferUsages::VERTEX,
    });
    let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Cube Indices"),
        contents: bytemuck::cast_slice(&CUBE_INDICES),
        usage: wgpu::BufferUsages::INDEX,
    });

    let target = device
        .create_texture(&wgpu::TextureDescriptor {
            label: Some("Offscreen Target"),
            size: wgpu::Extent3d {
                width: TARGET_SIZE,
                height: TARGET_SIZE,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
        .create_view(&wgpu::TextureViewDescriptor::default());

    Ok(DebugScene {
        programs,
        camera_buffer,
        bind_group,
        bind_group_layout,
        vertex_buffer,
        index_buffer,
        entity_buffer,
        target,
    })
}

fn install_hooks(frame: &mut FrameRenderer, scene: Rc<RefCell<DebugScene>>) {
    let upload = scene.clone();
    let mut animated_rows = Vec::with_capacity((ANIMATED_BATCHES * ANIMATED_INSTANCES) as usize);
    frame.add_hook(RenderPhase::BeforeCommands, move |cx| {
        let scene = upload.borrow();
        let queue = cx.gpu.queue();

        // cgmath projections target OpenGL depth; remap z to [0, 1]
        let view_proj = OPENGL_TO_WGPU_MATRIX * build_view_projection(&cx.state.camera);
        let matrix: [[f32; 4]; 4] = view_proj.into();
        queue.write_buffer(&scene.camera_buffer, 0, bytemuck::cast_slice(&matrix));

        let tick = cx.state.cycle.saturating_sub(1) as u32;
        animated_rows.clear();
        animated_rows.extend(animated_rows_for(tick));
        let offset = static_count() as u64 * std::mem::size_of::<EntityRow>() as u64;
        queue.write_buffer(&scene.entity_buffer, offset, bytemuck::cast_slice(&animated_rows));
        Ok(())
    });

    let draw = scene;
    frame.add_hook(RenderPhase::AfterCommands, move |cx| {
        let scene = draw.borrow();
        let commands = cx.commands;
        {
            let mut pass = cx.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Entity Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &scene.target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_pipeline(scene.programs.current().select(&cx.flags));
            pass.set_bind_group(0, &scene.bind_group, &[]);
            pass.set_vertex_buffer(0, scene.vertex_buffer.slice(..));
            pass.set_index_buffer(scene.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            for kind in [BatchKind::Static, BatchKind::Animated] {
                commands.draw(&mut pass, kind);
            }
        }
        commands.copy_counts_for_readback(cx.encoder);
        Ok(())
    });

    frame.add_hook(RenderPhase::Probes, |cx| {
        for request in cx.probes {
            log::debug!(
                "[FrameTest] Probe {:?} renders faces {:?}",
                request.probe,
                request.missing_faces().collect::<Vec<_>>()
            );
        }
        Ok(())
    });
}

#[rustfmt::skip]
const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

fn main() -> Result<()> {
    env_logger::init();

    println!("Frame Pipeline Test");
    println!("===================\n");

    let ctx = match GpuContext::request_headless() {
        Ok(ctx) => ctx,
        Err(EngineError::NoAdapter) => {
            println!("No GPU adapter available, skipping");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let config = SharedConfig::new(RenderConfig::default());
    let mut frame = FrameRenderer::new(&ctx, config.clone());
    let scene = Rc::new(RefCell::new(build_scene(&ctx)?));
    install_hooks(&mut frame, scene.clone());

    let probes: Vec<_> = (0..6)
        .map(|i| {
            let position = Point3::new(i as f32 * 16.0 - 40.0, 2.0, 0.0);
            frame.probes_mut().register(ProbeDesc {
                position,
                volume: Aabb::from_center_extent(position, Vector3::new(8.0, 8.0, 8.0)),
            })
        })
        .collect();
    frame.probes_mut().request(probes[5], Urgency::Urgent)?;

    // Queued from another thread, runs on the render thread's next drain
    let handle = frame.executor_handle();
    thread::spawn(move || {
        handle.submit(|ctx: &GpuContext| {
            log::info!("[FrameTest] Executor job ran with features {:?}", ctx.features());
        })
    })
    .join()
    .map_err(|_| anyhow::anyhow!("executor submit thread panicked"))??;

    let (writer, mut reader) = RenderStateBuffer::new(RenderState::default());
    let simulation = thread::spawn(move || run_simulation(writer));

    let start = Instant::now();
    let mut frames = 0u64;
    while !simulation.is_finished() || reader.has_fresh() {
        let stats = frame.render_frame(&ctx, &mut reader)?;
        frames += 1;

        match frames {
            30 => {
                println!("Switching to GPU culling");
                config.update(|c| {
                    c.gpu_culling = true;
                    c.gpu_culling_threshold = 1;
                });
            }
            60 => {
                if frame.commands().supports_gpu_culling() {
                    let visible = frame.commands().read_visible_count(&ctx, BatchKind::Static)?;
                    println!("GPU culled static instances visible: {:?}", visible);
                }
                println!("Switching to wireframe");
                config.update(|c| c.wireframe = true);

                let timeout = frame.reload_timeout();
                let mut scene = scene.borrow_mut();
                let layout = &scene.bind_group_layout;
                let reloaded = build_programs(&ctx, layout);
                if let Err(e) = pollster::block_on(scene.programs.reload(async { reloaded }, timeout)) {
                    log::warn!("[FrameTest] {}", e);
                }
            }
            _ => {}
        }

        if frames % 50 == 0 {
            println!(
                "frame {:>4}: {} commands, {} entities, {} vertices, {} lines, gpu culled: {}",
                frames,
                stats.commands_emitted,
                stats.entities_drawn,
                stats.vertices_drawn,
                stats.lines_drawn,
                stats.gpu_culled
            );
        }
    }

    let published = simulation
        .join()
        .map_err(|_| anyhow::anyhow!("simulation thread panicked"))?;
    ctx.device().poll(wgpu::Maintain::Wait);

    println!("\nPublished {} states, rendered {} frames in {:?}", published, frames, start.elapsed());
    println!("Command buffer reallocations: {}", frame.commands().grow_count());
    println!(
        "Probes complete: {}/{}",
        probes.iter().filter(|id| frame.probes().is_complete(**id)).count(),
        probes.len()
    );
    println!(
        "Entity table: {} rows",
        scene.borrow().entity_buffer.size() / std::mem::size_of::<EntityRow>() as u64
    );

    Ok(())
}
