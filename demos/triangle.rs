//! Hello Triangle
//!
//! One render pipeline group: an interleaved position/color VAO, a tint
//! uniform, and a canvas bound to the device context.
//!
//! ```sh
//! RUST_LOG=info cargo run --example triangle
//! ```

use std::sync::Arc;

use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use wgpu_kit::{
    Attribute, AttributeOptions, BindGroup, BindGroupOptions, Canvas, ContextSettings,
    DeviceContext, Executor, ExecutorOptions, PipelineGroup, PipelineGroupOptions,
    RenderPipeline, RenderPipelineOptions, Uniform, UniformOptions, VertexAttributeObject,
    VertexAttributeObjectOptions,
};

const SHADER: &str = r"
struct VertexOutput {
    @builtin(position) position: vec4f,
    @location(0) color: vec3f,
};

@group(0) @binding(0) var<uniform> tint: vec4f;

@vertex
fn vertexMain(@location(0) position: vec2f, @location(1) color: vec3f) -> VertexOutput {
    var out: VertexOutput;
    out.position = vec4f(position, 0.0, 1.0);
    out.color = color;
    return out;
}

@fragment
fn fragmentMain(in: VertexOutput) -> @location(0) vec4f {
    return vec4f(in.color, 1.0) * tint;
}
";

const POSITIONS: [f32; 6] = [0.0, 0.5, -0.5, -0.5, 0.5, -0.5];
const COLORS: [f32; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

struct State {
    window: Arc<Window>,
    canvas: Canvas,
    executor: Executor,
}

impl State {
    fn new(window: Arc<Window>) -> anyhow::Result<Self> {
        let ctx = DeviceContext::new(ContextSettings::default());
        let size = window.inner_size();
        let canvas = Canvas::from_window(&ctx, Arc::clone(&window), size.width, size.height)?;
        ctx.set_canvas(canvas.clone())?;

        let mut vao = VertexAttributeObject::new(VertexAttributeObjectOptions {
            label: Some("Triangle".into()),
            item_count: Some(3),
            context: Some(ctx.clone()),
            ..Default::default()
        })?;
        vao.add_attributes([
            Attribute::new(AttributeOptions {
                label: Some("position".into()),
                format: Some(wgpu::VertexFormat::Float32x2),
                shader_location: Some(0),
                item_size: Some(2),
                item_count: Some(3),
                data: Some(POSITIONS.to_vec().into()),
            })?,
            Attribute::new(AttributeOptions {
                label: Some("color".into()),
                format: Some(wgpu::VertexFormat::Float32x3),
                shader_location: Some(1),
                item_size: Some(3),
                item_count: Some(3),
                data: Some(COLORS.to_vec().into()),
            })?,
        ])?;

        let tint = Uniform::new(UniformOptions {
            label: Some("Tint".into()),
            binding: Some(0),
            visibility: Some(wgpu::ShaderStages::FRAGMENT),
            data: Some(vec![1.0f32, 1.0, 1.0, 1.0].into()),
            context: Some(ctx.clone()),
        })?;
        let mut bind_group = BindGroup::new(BindGroupOptions {
            label: Some("Triangle".into()),
            context: Some(ctx.clone()),
            ..Default::default()
        });
        bind_group.add_uniforms([tint])?;

        let pipeline = RenderPipeline::new(RenderPipelineOptions {
            label: Some("Triangle".into()),
            shader: Some(SHADER.into()),
            clear_color: Some(wgpu::Color {
                r: 0.1,
                g: 0.1,
                b: 0.12,
                a: 1.0,
            }),
            ..Default::default()
        })?;

        // No canvas here: the group falls back to the context's canvas.
        let mut group = PipelineGroup::new(PipelineGroupOptions {
            label: Some("Triangle".into()),
            pipelines: vec![pipeline.into()],
            vertex_count: Some(3),
            enable_multisampling: true,
            context: Some(ctx),
            ..Default::default()
        })?;
        group.add_vertex_attribute_object(vao)?;
        group.add_bind_group(bind_group)?;

        let mut executor = Executor::new(ExecutorOptions {
            label: Some("Triangle".into()),
            ..Default::default()
        });
        executor.add_pipeline_groups([group])?;

        Ok(Self {
            window,
            canvas,
            executor,
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
        let attributes = Window::default_attributes().with_title("wgpu-kit: triangle");
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
                if let Err(err) = state.executor.run() {
                    log::error!("Frame {} failed: {err}", state.executor.frame());
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);
    event_loop.run_app(&mut App::default())?;
    Ok(())
}
