//! Conway's Game of Life
//!
//! A single pipeline group with a render pipeline that draws one instanced
//! quad per cell and a compute pipeline that steps the simulation. Two bind
//! groups share one layout; the compute pass swaps them after every step so
//! the next frame reads what this one wrote.
//!
//! ```sh
//! RUST_LOG=debug cargo run --example conway
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use wgpu_kit::{
    Attribute, AttributeOptions, BindGroup, BindGroupOptions, Canvas, ComputePipeline,
    ComputePipelineOptions, ContextSettings, DeviceContext, Executor, ExecutorOptions,
    PipelineGroup, PipelineGroupOptions, RenderPipeline, RenderPipelineOptions, Storage,
    StorageOptions, Uniform, UniformOptions, VertexAttributeObject,
    VertexAttributeObjectOptions,
};

const GRID_SIZE: u32 = 32;
const UPDATE_INTERVAL: Duration = Duration::from_millis(200);

const CELL_SHADER: &str = r"
struct VertexOutput {
    @builtin(position) position: vec4f,
    @location(0) cell: vec2f,
};

@group(0) @binding(0) var<uniform> grid: vec2f;
@group(0) @binding(1) var<storage> cellState: array<u32>;

@vertex
fn vertexMain(@location(0) position: vec2f, @builtin(instance_index) instance: u32) -> VertexOutput {
    let i = f32(instance);
    let cell = vec2f(i % grid.x, floor(i / grid.x));
    let state = f32(cellState[instance]);
    let offset = cell / grid * 2.0;
    var out: VertexOutput;
    out.position = vec4f((position * state + 1.0) / grid - 1.0 + offset, 0.0, 1.0);
    out.cell = cell;
    return out;
}

@fragment
fn fragmentMain(in: VertexOutput) -> @location(0) vec4f {
    let c = in.cell / grid;
    return vec4f(c, 1.0 - c.x, 1.0);
}
";

const SIMULATION_SHADER: &str = r"
@group(0) @binding(0) var<uniform> grid: vec2f;
@group(0) @binding(1) var<storage> cellStateIn: array<u32>;
@group(0) @binding(2) var<storage, read_write> cellStateOut: array<u32>;

fn cellIndex(cell: vec2u) -> u32 {
    return (cell.y % u32(grid.y)) * u32(grid.x) + (cell.x % u32(grid.x));
}

fn cellActive(x: u32, y: u32) -> u32 {
    return cellStateIn[cellIndex(vec2(x, y))];
}

@compute @workgroup_size(8, 8)
fn computeMain(@builtin(global_invocation_id) cell: vec3u) {
    let neighbors = cellActive(cell.x + 1u, cell.y + 1u)
        + cellActive(cell.x + 1u, cell.y)
        + cellActive(cell.x + 1u, cell.y - 1u)
        + cellActive(cell.x, cell.y - 1u)
        + cellActive(cell.x - 1u, cell.y - 1u)
        + cellActive(cell.x - 1u, cell.y)
        + cellActive(cell.x - 1u, cell.y + 1u)
        + cellActive(cell.x, cell.y + 1u);
    let i = cellIndex(cell.xy);
    switch neighbors {
        case 2u: { cellStateOut[i] = cellStateIn[i]; }
        case 3u: { cellStateOut[i] = 1u; }
        default: { cellStateOut[i] = 0u; }
    }
}
";

// Two triangles covering one cell, in cell-local [-0.8, 0.8] space.
const QUAD: [f32; 12] = [
    -0.8, -0.8, 0.8, -0.8, 0.8, 0.8, //
    -0.8, -0.8, 0.8, 0.8, -0.8, 0.8,
];

fn seed_cells() -> Vec<u32> {
    (0..GRID_SIZE * GRID_SIZE)
        .map(|i| u32::from(i % 3 == 0 || i % 7 == 0))
        .collect()
}

struct State {
    window: Arc<Window>,
    canvas: Canvas,
    executor: Executor,
    last_step: Instant,
}

impl State {
    fn new(window: Arc<Window>) -> anyhow::Result<Self> {
        let ctx = DeviceContext::new(ContextSettings::default());
        let size = window.inner_size();
        let canvas = Canvas::from_window(&ctx, Arc::clone(&window), size.width, size.height)?;

        let mut quad = VertexAttributeObject::new(VertexAttributeObjectOptions {
            label: Some("Cell".into()),
            item_count: Some(6),
            context: Some(ctx.clone()),
            ..Default::default()
        })?;
        quad.add_attribute(Attribute::new(AttributeOptions {
            label: Some("position".into()),
            format: Some(wgpu::VertexFormat::Float32x2),
            shader_location: Some(0),
            item_size: Some(2),
            item_count: Some(6),
            data: Some(QUAD.to_vec().into()),
        })?)?;

        let grid = Uniform::new(UniformOptions {
            label: Some("Grid".into()),
            binding: Some(0),
            data: Some(vec![GRID_SIZE as f32, GRID_SIZE as f32].into()),
            context: Some(ctx.clone()),
            ..Default::default()
        })?;
        let cells_a = Storage::new(StorageOptions {
            label: Some("Cells A".into()),
            binding: Some(1),
            visibility: Some(wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::COMPUTE),
            data: Some(seed_cells().into()),
            context: Some(ctx.clone()),
            ..Default::default()
        })?;
        let cells_b = Storage::new(StorageOptions {
            label: Some("Cells B".into()),
            binding: Some(2),
            visibility: Some(wgpu::ShaderStages::COMPUTE),
            data: Some(vec![0u32; (GRID_SIZE * GRID_SIZE) as usize].into()),
            read_only: false,
            context: Some(ctx.clone()),
        })?;

        let mut ping = BindGroup::new(BindGroupOptions {
            label: Some("Cells Ping".into()),
            context: Some(ctx.clone()),
            ..Default::default()
        });
        ping.add_uniforms([grid.clone()])?;
        ping.add_storages([cells_a.clone(), cells_b.clone()])?;

        let mut pong = BindGroup::new(BindGroupOptions {
            label: Some("Cells Pong".into()),
            layout: ping.layout(),
            context: Some(ctx.clone()),
            ..Default::default()
        });
        pong.add_uniforms([grid])?;
        pong.add_storages([cells_b.with_binding(1), cells_a.with_binding(2)])?;

        let render = RenderPipeline::new(RenderPipelineOptions {
            label: Some("Cells".into()),
            shader: Some(CELL_SHADER.into()),
            ..Default::default()
        })?;

        let mut simulation = ComputePipeline::new(ComputePipelineOptions {
            label: Some("Simulation".into()),
            shader: Some(SIMULATION_SHADER.into()),
            ..Default::default()
        })?;
        simulation.dispatch_over((GRID_SIZE, GRID_SIZE));
        let mut standby = pong;
        simulation.set_on_after_pass(move |pass| pass.swap_bind_group(&mut standby));

        let mut group = PipelineGroup::new(PipelineGroupOptions {
            label: Some("Game of Life".into()),
            pipelines: vec![render.into(), simulation.into()],
            canvas: Some(canvas.clone()),
            vertex_count: Some(6),
            instance_count: Some(GRID_SIZE * GRID_SIZE),
            context: Some(ctx),
            ..Default::default()
        })?;
        group.add_vertex_attribute_object(quad)?;
        group.add_bind_group(ping)?;

        let mut executor = Executor::new(ExecutorOptions {
            label: Some("Game of Life".into()),
            ..Default::default()
        });
        executor.add_pipeline_groups([group])?;

        Ok(Self {
            window,
            canvas,
            executor,
            last_step: Instant::now(),
        })
    }
}

#[derive(Default)]
struct App {
    state: Option<State>,
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        let attributes = Window::default_attributes().with_title("wgpu-kit: game of life");
        let state = event_loop
            .create_window(attributes)
            .map_err(anyhow::Error::from)
            .and_then(|window| State::new(Arc::new(window)));
        match state {
            Ok(state) => {
                state.window.request_redraw();
                self.state = Some(state);
            }
            Err(err) => {
                log::error!("Failed to initialize: {err:#}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                state.canvas.set_client_size(size.width, size.height);
                state.window.request_redraw();
            }
            WindowEvent::RedrawRequested => {
                state.last_step = Instant::now();
                if let Err(err) = state.executor.run() {
                    log::error!("Step {} failed: {err}", state.executor.frame());
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(state) = self.state.as_ref() else {
            return;
        };
        let next = state.last_step + UPDATE_INTERVAL;
        if Instant::now() >= next {
            state.window.request_redraw();
        } else {
            event_loop.set_control_flow(ControlFlow::WaitUntil(next));
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let event_loop = EventLoop::new()?;
    event_loop.run_app(&mut App::default())?;
    Ok(())
}
