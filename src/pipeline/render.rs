//! Render pipelines.

use crate::device::{
    GpuBackend, PipelineLayoutId, RenderPipelineDesc, RenderPipelineId, VertexBufferLayout,
};
use crate::errors::{KitError, Result};
use crate::label::Label;

use super::state::{ColorTarget, RenderTargets};
use super::{PassContext, PassHook, PassHooks, ShaderSource};

#[derive(Default)]
pub struct RenderPipelineOptions {
    pub label: Option<String>,
    /// WGSL source. Required.
    pub shader: Option<String>,
    /// Defaults to `vertexMain`.
    pub vertex_entry: Option<String>,
    /// Defaults to `fragmentMain`.
    pub fragment_entry: Option<String>,
    /// Defaults to opaque black. Use [`RenderPipeline::set_clear_color`] with
    /// `None` to keep the previous contents instead.
    pub clear_color: Option<wgpu::Color>,
    /// Defaults to alpha blending.
    pub color_target: Option<ColorTarget>,
    /// Defaults to a counter-clockwise triangle list without culling.
    pub primitive: Option<wgpu::PrimitiveState>,
    pub on_before_pass: Option<PassHook>,
    pub on_after_pass: Option<PassHook>,
}

#[derive(Debug)]
pub struct RenderPipeline {
    pub(super) label: Label,
    shader: ShaderSource,
    clear_color: Option<wgpu::Color>,
    color_target: ColorTarget,
    primitive: wgpu::PrimitiveState,
    pub(super) hooks: PassHooks,
    gpu: Option<RenderPipelineId>,
}

impl RenderPipeline {
    pub fn new(options: RenderPipelineOptions) -> Result<Self> {
        let code = options
            .shader
            .ok_or_else(|| KitError::missing("RenderPipeline", "shader"))?;
        let mut shader = ShaderSource::new(code);
        shader.set_entries(options.vertex_entry, options.fragment_entry, None);

        Ok(Self {
            label: options.label.into(),
            shader,
            clear_color: Some(options.clear_color.unwrap_or(wgpu::Color::BLACK)),
            color_target: options.color_target.unwrap_or_default(),
            primitive: options.primitive.unwrap_or_default(),
            hooks: PassHooks {
                before: options.on_before_pass,
                after: options.on_after_pass,
            },
            gpu: None,
        })
    }

    #[inline]
    #[must_use]
    pub fn label(&self) -> &Label {
        &self.label
    }

    #[must_use]
    pub fn shader(&self) -> &ShaderSource {
        &self.shader
    }

    #[must_use]
    pub fn clear_color(&self) -> Option<wgpu::Color> {
        self.clear_color
    }

    /// `None` loads the previous attachment contents instead of clearing.
    pub fn set_clear_color(&mut self, color: Option<wgpu::Color>) {
        self.clear_color = color;
    }

    #[must_use]
    pub fn color_target(&self) -> ColorTarget {
        self.color_target
    }

    pub fn set_blend(&mut self, blend: Option<wgpu::BlendState>) {
        self.color_target.blend = blend;
    }

    pub fn set_write_mask(&mut self, mask: wgpu::ColorWrites) {
        self.color_target.write_mask = mask;
    }

    #[must_use]
    pub fn primitive(&self) -> wgpu::PrimitiveState {
        self.primitive
    }

    pub fn set_topology(&mut self, topology: wgpu::PrimitiveTopology) {
        self.primitive.topology = topology;
    }

    pub fn set_strip_index_format(&mut self, format: Option<wgpu::IndexFormat>) {
        self.primitive.strip_index_format = format;
    }

    pub fn set_front_face(&mut self, face: wgpu::FrontFace) {
        self.primitive.front_face = face;
    }

    pub fn set_cull_mode(&mut self, mode: Option<wgpu::Face>) {
        self.primitive.cull_mode = mode;
    }

    pub fn set_on_before_pass<F>(&mut self, hook: F)
    where
        F: FnMut(&mut PassContext<'_>) -> Result<()> + Send + 'static,
    {
        self.hooks.before = Some(Box::new(hook));
    }

    pub fn set_on_after_pass<F>(&mut self, hook: F)
    where
        F: FnMut(&mut PassContext<'_>) -> Result<()> + Send + 'static,
    {
        self.hooks.after = Some(Box::new(hook));
    }

    #[must_use]
    pub fn gpu_pipeline(&self) -> Option<RenderPipelineId> {
        self.gpu
    }

    #[must_use]
    pub fn is_built(&self) -> bool {
        self.gpu.is_some()
    }

    pub(crate) fn build(
        &mut self,
        device: &dyn GpuBackend,
        layout: PipelineLayoutId,
        vertex_buffers: &[VertexBufferLayout],
        color_format: wgpu::TextureFormat,
        targets: &RenderTargets,
    ) -> Result<RenderPipelineId> {
        if self.gpu.is_some() {
            return Err(KitError::AlreadyBuilt("Render pipeline"));
        }
        let shader = self.shader.build_module(device, &self.label);

        let id = device.create_render_pipeline(&RenderPipelineDesc {
            label: self.label.derive("Render Pipeline"),
            layout,
            shader,
            vertex_entry: self.shader.vertex_entry().to_string(),
            fragment_entry: self.shader.fragment_entry().to_string(),
            vertex_buffers: vertex_buffers.to_vec(),
            color_target: self.color_target.with_format(color_format),
            primitive: self.primitive,
            depth_stencil: targets.depth_stencil.pipeline_state(),
            multisample: targets.multisample.as_wgpu(),
        })?;
        log::debug!("Built render pipeline {}", self.label);
        self.gpu = Some(id);
        Ok(id)
    }

    pub(crate) fn release(&mut self, device: &dyn GpuBackend) {
        if let Some(id) = self.gpu.take() {
            device.destroy_render_pipeline(id);
        }
        self.shader.release_module(device);
    }
}
