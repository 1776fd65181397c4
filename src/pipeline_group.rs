//! Pipeline Groups
//!
//! A [`PipelineGroup`] is the aggregation root of everything one frame of a
//! demo needs: pipelines, vertex attribute objects, bind groups, an optional
//! index buffer, draw counts, the target canvas, and the multisample and
//! depth/stencil state shared by its render pipelines.
//!
//! # Build
//!
//! [`PipelineGroup::build`] runs once:
//! 1. realizes bind groups that were never built,
//! 2. derives the pipeline layout from the bind groups sorted by index,
//!    rejecting gaps and duplicates,
//! 3. for render groups, configures the canvas and creates the attachment
//!    textures,
//! 4. builds every pipeline against that layout. Render pipelines use the
//!    VAO layouts in registration order; compute pipelines ignore them.
//!
//! # Frames
//!
//! Frames are recorded by the [`Executor`](crate::Executor). Each pipeline
//! contributes one pass, framed by its before/after hooks.

use smallvec::SmallVec;

use crate::bind_group::BindGroup;
use crate::canvas::Canvas;
use crate::device::{
    BindGroupLayoutId, CommandBuffer, ComputeCommand, ComputePassRecord, DeviceContext,
    GpuBackend, PassRecord, PipelineLayoutId, RenderCommand, RenderPassRecord,
    VertexBufferLayout,
};
use crate::errors::{KitError, Result};
use crate::index_buffer::IndexBuffer;
use crate::label::Label;
use crate::pipeline::{
    ComputePipeline, DepthStencil, DrawCounts, HookStage, MultisampleState, Pipeline,
    PipelineKind, RenderPipeline, RenderTargets,
};
use crate::vao::VertexAttributeObject;

#[derive(Debug, Default)]
pub struct PipelineGroupOptions {
    pub label: Option<String>,
    pub pipelines: Vec<Pipeline>,
    /// Render target. Defaults to the context's canvas.
    pub canvas: Option<Canvas>,
    /// Renders with 4 samples per pixel, resolved into the canvas.
    pub enable_multisampling: bool,
    pub enable_depth_stencil: bool,
    /// Vertices drawn when no index buffer is set. Defaults to 0.
    pub vertex_count: Option<u32>,
    /// Defaults to 1.
    pub instance_count: Option<u32>,
    pub context: Option<DeviceContext>,
}

#[derive(Debug)]
pub struct PipelineGroup {
    label: Label,
    pipelines: Vec<Pipeline>,
    vertex_attribute_objects: Vec<VertexAttributeObject>,
    bind_groups: Vec<BindGroup>,
    index_buffer: Option<IndexBuffer>,
    draw: DrawCounts,
    canvas: Option<Canvas>,
    targets: RenderTargets,
    pipeline_layout: Option<PipelineLayoutId>,
    context: DeviceContext,
}

/// Read-only state a render pass is recorded from.
struct PassSources<'a> {
    canvas: Option<&'a Canvas>,
    targets: &'a RenderTargets,
    vertex_attribute_objects: &'a [VertexAttributeObject],
    index_buffer: Option<&'a IndexBuffer>,
}

impl PipelineGroup {
    pub fn new(options: PipelineGroupOptions) -> Result<Self> {
        let mut targets = RenderTargets::default();
        if options.enable_multisampling {
            targets.multisample.set_count(4)?;
        }
        targets.depth_stencil.set_enabled(options.enable_depth_stencil);

        Ok(Self {
            label: options.label.into(),
            pipelines: options.pipelines,
            vertex_attribute_objects: Vec::new(),
            bind_groups: Vec::new(),
            index_buffer: None,
            draw: DrawCounts {
                vertex_count: options.vertex_count.unwrap_or(0),
                instance_count: options.instance_count.unwrap_or(1),
            },
            canvas: options.canvas,
            targets,
            pipeline_layout: None,
            context: options.context.unwrap_or_else(DeviceContext::global),
        })
    }

    #[inline]
    #[must_use]
    pub fn label(&self) -> &Label {
        &self.label
    }

    #[inline]
    #[must_use]
    pub fn context(&self) -> &DeviceContext {
        &self.context
    }

    #[inline]
    #[must_use]
    pub fn is_built(&self) -> bool {
        self.pipeline_layout.is_some()
    }

    #[must_use]
    pub fn pipeline_layout(&self) -> Option<PipelineLayoutId> {
        self.pipeline_layout
    }

    fn ensure_unbuilt(&self) -> Result<()> {
        if self.is_built() {
            return Err(KitError::AlreadyBuilt("Pipeline group"));
        }
        Ok(())
    }

    // ========================================================================
    // Members
    // ========================================================================

    #[must_use]
    pub fn pipelines(&self) -> &[Pipeline] {
        &self.pipelines
    }

    #[must_use]
    pub fn pipeline_mut(&mut self, index: usize) -> Option<&mut Pipeline> {
        self.pipelines.get_mut(index)
    }

    pub fn render_pipeline_mut(&mut self, index: usize) -> Result<&mut RenderPipeline> {
        self.pipelines
            .get_mut(index)
            .ok_or(KitError::NotSet("Render pipeline"))?
            .as_render_mut()
    }

    pub fn compute_pipeline_mut(&mut self, index: usize) -> Result<&mut ComputePipeline> {
        self.pipelines
            .get_mut(index)
            .ok_or(KitError::NotSet("Compute pipeline"))?
            .as_compute_mut()
    }

    pub fn add_pipeline(&mut self, pipeline: impl Into<Pipeline>) -> Result<()> {
        self.ensure_unbuilt()?;
        self.pipelines.push(pipeline.into());
        Ok(())
    }

    #[must_use]
    pub fn vertex_attribute_objects(&self) -> &[VertexAttributeObject] {
        &self.vertex_attribute_objects
    }

    /// VAOs are bound to successive vertex buffer slots in the order added.
    pub fn add_vertex_attribute_object(&mut self, vao: VertexAttributeObject) -> Result<()> {
        self.ensure_unbuilt()?;
        self.vertex_attribute_objects.push(vao);
        Ok(())
    }

    pub fn add_vertex_attribute_objects(
        &mut self,
        vaos: impl IntoIterator<Item = VertexAttributeObject>,
    ) -> Result<()> {
        for vao in vaos {
            self.add_vertex_attribute_object(vao)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn bind_groups(&self) -> &[BindGroup] {
        &self.bind_groups
    }

    #[must_use]
    pub fn bind_group(&self, index: u32) -> Option<&BindGroup> {
        self.bind_groups.iter().find(|group| group.index() == index)
    }

    pub fn bind_group_mut(&mut self, index: u32) -> Option<&mut BindGroup> {
        self.bind_groups
            .iter_mut()
            .find(|group| group.index() == index)
    }

    pub fn add_bind_group(&mut self, bind_group: BindGroup) -> Result<()> {
        self.ensure_unbuilt()?;
        self.bind_groups.push(bind_group);
        Ok(())
    }

    pub fn add_bind_groups(&mut self, groups: impl IntoIterator<Item = BindGroup>) -> Result<()> {
        for group in groups {
            self.add_bind_group(group)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn index_buffer(&self) -> Option<&IndexBuffer> {
        self.index_buffer.as_ref()
    }

    pub fn index_buffer_mut(&mut self) -> Option<&mut IndexBuffer> {
        self.index_buffer.as_mut()
    }

    /// Switches the group to indexed drawing and uploads the indices.
    pub fn set_index_buffer(&mut self, mut index_buffer: IndexBuffer) -> Result<()> {
        index_buffer.update_gpu_buffer()?;
        self.index_buffer = Some(index_buffer);
        Ok(())
    }

    #[must_use]
    pub fn vertex_count(&self) -> u32 {
        self.draw.vertex_count
    }

    pub fn set_vertex_count(&mut self, count: u32) {
        self.draw.vertex_count = count;
    }

    #[must_use]
    pub fn instance_count(&self) -> u32 {
        self.draw.instance_count
    }

    pub fn set_instance_count(&mut self, count: u32) {
        self.draw.instance_count = count;
    }

    #[must_use]
    pub fn canvas(&self) -> Option<&Canvas> {
        self.canvas.as_ref()
    }

    pub fn set_canvas(&mut self, canvas: Canvas) -> Result<()> {
        self.ensure_unbuilt()?;
        self.canvas = Some(canvas);
        Ok(())
    }

    // ========================================================================
    // Render state
    // ========================================================================

    #[must_use]
    pub fn multisample(&self) -> &MultisampleState {
        &self.targets.multisample
    }

    /// Render pipelines bake the sample count, so this is only available
    /// before [`build`](Self::build).
    pub fn multisample_mut(&mut self) -> Result<&mut MultisampleState> {
        self.ensure_unbuilt()?;
        Ok(&mut self.targets.multisample)
    }

    #[must_use]
    pub fn depth_stencil(&self) -> &DepthStencil {
        &self.targets.depth_stencil
    }

    pub fn depth_stencil_mut(&mut self) -> Result<&mut DepthStencil> {
        self.ensure_unbuilt()?;
        Ok(&mut self.targets.depth_stencil)
    }

    #[must_use]
    pub fn render_targets(&self) -> &RenderTargets {
        &self.targets
    }

    fn has_render_pipelines(&self) -> bool {
        self.pipelines
            .iter()
            .any(|pipeline| pipeline.kind() == PipelineKind::Render)
    }

    // ========================================================================
    // Build
    // ========================================================================

    fn derive_layouts(&mut self) -> Result<SmallVec<[BindGroupLayoutId; 4]>> {
        for group in &mut self.bind_groups {
            if !group.is_realized() {
                group.update_bind_group()?;
            }
        }
        self.bind_groups.sort_by_key(BindGroup::index);

        let mut layouts = SmallVec::new();
        for (expected, group) in (0u32..).zip(&self.bind_groups) {
            let index = group.index();
            if index < expected {
                return Err(KitError::DuplicateBindGroupIndex(index));
            }
            if index > expected {
                return Err(KitError::BindGroupIndexGap {
                    expected,
                    found: index,
                });
            }
            layouts.push(group.layout().ok_or(KitError::NotSet("Bind group layout"))?);
        }
        Ok(layouts)
    }

    fn vertex_layouts(&self) -> Result<SmallVec<[VertexBufferLayout; 2]>> {
        self.vertex_attribute_objects
            .iter()
            .map(|vao| {
                vao.layout()
                    .cloned()
                    .ok_or(KitError::NotSet("Vertex attribute layout"))
            })
            .collect()
    }

    fn resolve_canvas(&mut self) -> Result<Canvas> {
        if self.canvas.is_none() {
            self.canvas = self.context.canvas();
        }
        self.canvas.clone().ok_or(KitError::NotSet("Canvas"))
    }

    /// Builds the pipeline layout and every pipeline. Fails if called twice.
    ///
    /// On failure the layout, pipelines and attachments created by this call
    /// are destroyed and the group stays unbuilt.
    pub fn build(&mut self) -> Result<()> {
        self.ensure_unbuilt()?;
        let device = self.context.get_device()?;

        let layouts = self.derive_layouts()?;
        let layout =
            device.create_pipeline_layout(&self.label.derive("Pipeline Layout"), &layouts)?;
        if let Err(err) = self.build_pipelines(device.as_ref(), layout) {
            for pipeline in &mut self.pipelines {
                pipeline.release(device.as_ref());
            }
            self.targets.release(device.as_ref());
            device.destroy_pipeline_layout(layout);
            return Err(err);
        }

        log::debug!(
            "Built pipeline group {} ({} pipelines, {} bind groups, {} vertex buffers)",
            self.label,
            self.pipelines.len(),
            self.bind_groups.len(),
            self.vertex_attribute_objects.len()
        );
        self.pipeline_layout = Some(layout);
        Ok(())
    }

    fn build_pipelines(&mut self, device: &dyn GpuBackend, layout: PipelineLayoutId) -> Result<()> {
        let mut vertex_layouts = SmallVec::new();
        let mut color_format = None;
        if self.has_render_pipelines() {
            vertex_layouts = self.vertex_layouts()?;
            let canvas = self.resolve_canvas()?;
            canvas.configure(device)?;
            self.targets.ensure(device, &canvas)?;
            color_format = Some(canvas.format());
        }

        if let Some(index_buffer) = &mut self.index_buffer
            && index_buffer.gpu_buffer().is_none()
        {
            index_buffer.update_gpu_buffer()?;
        }

        for pipeline in &mut self.pipelines {
            match pipeline {
                Pipeline::Render(render) => {
                    let format = color_format.ok_or(KitError::NotSet("Canvas"))?;
                    render.build(device, layout, &vertex_layouts, format, &self.targets)?;
                }
                Pipeline::Compute(compute) => {
                    compute.build(device, layout)?;
                }
            }
        }
        Ok(())
    }

    /// Destroys the pipelines with their shader modules, the pipeline layout,
    /// the attachment textures and the bind groups. Vertex and index buffers
    /// are left alone.
    pub fn release(&mut self) {
        let Some(device) = self.context.device() else {
            return;
        };
        for pipeline in &mut self.pipelines {
            pipeline.release(device.as_ref());
        }
        if let Some(layout) = self.pipeline_layout.take() {
            device.destroy_pipeline_layout(layout);
        }
        self.targets.release(device.as_ref());
        for group in &mut self.bind_groups {
            group.release();
        }
        log::debug!("Released pipeline group {}", self.label);
    }

    // ========================================================================
    // Frames
    // ========================================================================

    /// Fits the canvas to its client size, clamped to the device's maximum
    /// texture dimension, and rebuilds surface configuration and attachments
    /// when anything changed. Returns `true` if the canvas was resized.
    pub fn resize_to_canvas(&mut self) -> Result<bool> {
        let Some(canvas) = self.canvas.clone() else {
            return Ok(false);
        };
        let device = self.context.get_device()?;

        let resized = canvas.fit_to_client(device.limits().max_texture_dimension_2d);
        if !canvas.is_configured() {
            canvas.configure(device.as_ref())?;
        }
        self.targets.ensure(device.as_ref(), &canvas)?;
        Ok(resized)
    }

    /// Records one pass per pipeline, running hooks around each.
    pub(crate) fn record_frame(&mut self, frame: u64, auto_resize: bool) -> Result<CommandBuffer> {
        if !self.is_built() {
            return Err(KitError::NotSet("Pipeline layout"));
        }
        if auto_resize && self.has_render_pipelines() {
            self.resize_to_canvas()?;
        }

        let mut commands = CommandBuffer::new(self.label.derive("Command Buffer"));
        let Self {
            pipelines,
            vertex_attribute_objects,
            bind_groups,
            index_buffer,
            draw,
            canvas,
            targets,
            ..
        } = self;
        let sources = PassSources {
            canvas: canvas.as_ref(),
            targets,
            vertex_attribute_objects,
            index_buffer: index_buffer.as_ref(),
        };

        for pipeline in pipelines.iter_mut() {
            pipeline.run_hook(HookStage::Before, frame, bind_groups, draw)?;
            for group in bind_groups.iter_mut() {
                group.refresh()?;
            }

            let pass = match pipeline {
                Pipeline::Render(render) => {
                    PassRecord::Render(sources.render_pass(render, bind_groups, *draw)?)
                }
                Pipeline::Compute(compute) => {
                    PassRecord::Compute(compute_pass(compute, bind_groups)?)
                }
            };
            log::trace!("Recorded {} pass for {}", pipeline.kind(), pipeline.label());
            commands.passes.push(pass);

            pipeline.run_hook(HookStage::After, frame, bind_groups, draw)?;
        }
        Ok(commands)
    }
}

impl PassSources<'_> {
    fn render_pass(
        &self,
        pipeline: &RenderPipeline,
        bind_groups: &[BindGroup],
        draw: DrawCounts,
    ) -> Result<RenderPassRecord> {
        let canvas = self.canvas.ok_or(KitError::NotSet("Canvas"))?;
        let gpu = pipeline
            .gpu_pipeline()
            .ok_or(KitError::NotSet("Render pipeline"))?;

        let mut commands = Vec::with_capacity(
            2 + self.vertex_attribute_objects.len() + bind_groups.len() + 1,
        );
        commands.push(RenderCommand::SetPipeline(gpu));
        for (slot, vao) in (0u32..).zip(self.vertex_attribute_objects) {
            let buffer = vao.gpu_buffer().ok_or(KitError::NotSet("Vertex buffer"))?;
            commands.push(RenderCommand::SetVertexBuffer {
                slot,
                buffer: buffer.id,
            });
        }
        for group in bind_groups {
            commands.push(RenderCommand::SetBindGroup {
                index: group.index(),
                group: group.group().ok_or(KitError::NotSet("Bind group"))?,
            });
        }

        let instances = 0..draw.instance_count;
        let indexed = self
            .index_buffer
            .and_then(|index| index.gpu_buffer().map(|gpu| (index, gpu)));
        match indexed {
            Some((index, gpu)) => {
                commands.push(RenderCommand::SetIndexBuffer {
                    buffer: gpu.id,
                    format: index.index_format(),
                });
                commands.push(RenderCommand::DrawIndexed {
                    indices: index.draw_range(),
                    base_vertex: index.base_vertex(),
                    instances,
                });
            }
            None => commands.push(RenderCommand::Draw {
                vertices: 0..draw.vertex_count,
                instances,
            }),
        }

        Ok(RenderPassRecord {
            label: pipeline.label().derive("Render Pass"),
            color: self.targets.color_attachment(canvas, pipeline.clear_color()),
            depth_stencil: self.targets.depth_attachment(),
            commands,
        })
    }
}

fn compute_pass(pipeline: &ComputePipeline, bind_groups: &[BindGroup]) -> Result<ComputePassRecord> {
    let gpu = pipeline
        .gpu_pipeline()
        .ok_or(KitError::NotSet("Compute pipeline"))?;

    let mut commands = Vec::with_capacity(bind_groups.len() + 2);
    commands.push(ComputeCommand::SetPipeline(gpu));
    for group in bind_groups {
        commands.push(ComputeCommand::SetBindGroup {
            index: group.index(),
            group: group.group().ok_or(KitError::NotSet("Bind group"))?,
        });
    }
    let count = pipeline.workgroup_count();
    commands.push(ComputeCommand::Dispatch {
        x: count.x,
        y: count.y,
        z: count.z,
    });

    Ok(ComputePassRecord {
        label: pipeline.label().derive("Compute Pass"),
        commands,
    })
}
