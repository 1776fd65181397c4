//! Pipelines
//!
//! A [`Pipeline`] is either a [`RenderPipeline`] or a [`ComputePipeline`].
//! Both carry a label, WGSL source with entry point names, optional
//! before/after pass hooks, and the GPU pipeline once built. Building happens
//! inside [`PipelineGroup::build`](crate::PipelineGroup::build), which supplies
//! the pipeline layout, vertex layouts and render state; a pipeline cannot be
//! built twice.
//!
//! Pass hooks run around every pass of the pipeline and receive a
//! [`PassContext`] with the frame number, the draw counts and mutable access
//! to the pipeline itself and to the group's bind groups.

mod compute;
mod render;
pub mod state;

use std::fmt;

pub use compute::{ComputePipeline, ComputePipelineOptions, Workgroups};
pub use render::{RenderPipeline, RenderPipelineOptions};
pub use state::{ColorTarget, DepthStencil, MultisampleState, RenderTargets};

use crate::bind_group::BindGroup;
use crate::device::{GpuBackend, ShaderModuleId};
use crate::errors::{KitError, Result};
use crate::label::Label;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Render,
    Compute,
}

impl PipelineKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Render => "render",
            Self::Compute => "compute",
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Shader source
// ============================================================================

/// WGSL source, its entry point names, and the compiled module.
#[derive(Debug, Clone)]
pub struct ShaderSource {
    code: String,
    vertex_entry: String,
    fragment_entry: String,
    compute_entry: String,
    module: Option<ShaderModuleId>,
}

impl ShaderSource {
    pub const DEFAULT_VERTEX_ENTRY: &'static str = "vertexMain";
    pub const DEFAULT_FRAGMENT_ENTRY: &'static str = "fragmentMain";
    pub const DEFAULT_COMPUTE_ENTRY: &'static str = "computeMain";

    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            vertex_entry: Self::DEFAULT_VERTEX_ENTRY.to_string(),
            fragment_entry: Self::DEFAULT_FRAGMENT_ENTRY.to_string(),
            compute_entry: Self::DEFAULT_COMPUTE_ENTRY.to_string(),
            module: None,
        }
    }

    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    #[must_use]
    pub fn vertex_entry(&self) -> &str {
        &self.vertex_entry
    }

    #[must_use]
    pub fn fragment_entry(&self) -> &str {
        &self.fragment_entry
    }

    #[must_use]
    pub fn compute_entry(&self) -> &str {
        &self.compute_entry
    }

    #[must_use]
    pub fn module(&self) -> Option<ShaderModuleId> {
        self.module
    }

    pub(crate) fn set_entries(
        &mut self,
        vertex: Option<String>,
        fragment: Option<String>,
        compute: Option<String>,
    ) {
        if let Some(vertex) = vertex {
            self.vertex_entry = vertex;
        }
        if let Some(fragment) = fragment {
            self.fragment_entry = fragment;
        }
        if let Some(compute) = compute {
            self.compute_entry = compute;
        }
    }

    pub(crate) fn build_module(&mut self, device: &dyn GpuBackend, label: &Label) -> ShaderModuleId {
        let module = device.create_shader_module(&label.derive("Shader"), &self.code);
        self.module = Some(module);
        module
    }

    pub(crate) fn release_module(&mut self, device: &dyn GpuBackend) {
        if let Some(module) = self.module.take() {
            device.destroy_shader_module(module);
        }
    }
}

// ============================================================================
// Pass hooks
// ============================================================================

/// Draw parameters of a pipeline group, adjustable from pass hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCounts {
    pub vertex_count: u32,
    pub instance_count: u32,
}

impl Default for DrawCounts {
    fn default() -> Self {
        Self {
            vertex_count: 0,
            instance_count: 1,
        }
    }
}

/// What a pass hook can see and change: the pipeline it is attached to,
/// the group's bind groups and draw counts.
pub struct PassContext<'a> {
    frame: u64,
    pipeline: &'a mut Pipeline,
    bind_groups: &'a mut [BindGroup],
    draw: &'a mut DrawCounts,
}

impl PassContext<'_> {
    /// Number of completed `Executor::run` calls.
    #[inline]
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    #[inline]
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        self.pipeline
    }

    /// Changes made here (clear color, workgroup count, ...) apply to the
    /// pass recorded next for this pipeline.
    #[inline]
    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        self.pipeline
    }

    #[inline]
    #[must_use]
    pub fn pipeline_label(&self) -> &Label {
        self.pipeline.label()
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> PipelineKind {
        self.pipeline.kind()
    }

    #[must_use]
    pub fn bind_groups(&self) -> &[BindGroup] {
        self.bind_groups
    }

    #[must_use]
    pub fn bind_group(&self, index: u32) -> Option<&BindGroup> {
        self.bind_groups.iter().find(|group| group.index() == index)
    }

    pub fn bind_group_mut(&mut self, index: u32) -> Option<&mut BindGroup> {
        self.bind_groups.iter_mut().find(|group| group.index() == index)
    }

    #[must_use]
    pub fn draw_counts(&self) -> DrawCounts {
        *self.draw
    }

    pub fn set_vertex_count(&mut self, count: u32) {
        self.draw.vertex_count = count;
    }

    pub fn set_instance_count(&mut self, count: u32) {
        self.draw.instance_count = count;
    }

    /// Exchanges the group's bind group at `standby.index()` with `standby`.
    ///
    /// Both must share one layout, so the pipeline layout stays valid.
    pub fn swap_bind_group(&mut self, standby: &mut BindGroup) -> Result<()> {
        let index = standby.index();
        let active = self
            .bind_groups
            .iter_mut()
            .find(|group| group.index() == index)
            .ok_or(KitError::BindGroupSwap(index, "no bind group at this index"))?;
        if active.layout().is_none() || active.layout() != standby.layout() {
            return Err(KitError::BindGroupSwap(index, "layouts differ"));
        }
        std::mem::swap(active, standby);
        Ok(())
    }
}

pub type PassHook = Box<dyn FnMut(&mut PassContext<'_>) -> Result<()> + Send>;

#[derive(Default)]
pub(crate) struct PassHooks {
    pub before: Option<PassHook>,
    pub after: Option<PassHook>,
}

impl fmt::Debug for PassHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassHooks")
            .field("before", &self.before.is_some())
            .field("after", &self.after.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HookStage {
    Before,
    After,
}

// ============================================================================
// Pipeline
// ============================================================================

#[derive(Debug)]
pub enum Pipeline {
    Render(RenderPipeline),
    Compute(ComputePipeline),
}

impl Pipeline {
    #[must_use]
    pub fn kind(&self) -> PipelineKind {
        match self {
            Self::Render(_) => PipelineKind::Render,
            Self::Compute(_) => PipelineKind::Compute,
        }
    }

    #[must_use]
    pub fn label(&self) -> &Label {
        match self {
            Self::Render(p) => p.label(),
            Self::Compute(p) => p.label(),
        }
    }

    #[must_use]
    pub fn is_built(&self) -> bool {
        match self {
            Self::Render(p) => p.is_built(),
            Self::Compute(p) => p.is_built(),
        }
    }

    /// Destroys the GPU pipeline and shader module so the pipeline can be
    /// built again.
    pub(crate) fn release(&mut self, device: &dyn GpuBackend) {
        match self {
            Self::Render(p) => p.release(device),
            Self::Compute(p) => p.release(device),
        }
    }

    fn mismatch(&self, expected: PipelineKind) -> KitError {
        KitError::PipelineKindMismatch {
            expected: expected.as_str(),
            found: self.kind().as_str(),
        }
    }

    pub fn as_render(&self) -> Result<&RenderPipeline> {
        match self {
            Self::Render(p) => Ok(p),
            Self::Compute(_) => Err(self.mismatch(PipelineKind::Render)),
        }
    }

    pub fn as_render_mut(&mut self) -> Result<&mut RenderPipeline> {
        match self {
            Self::Render(p) => Ok(p),
            Self::Compute(_) => Err(self.mismatch(PipelineKind::Render)),
        }
    }

    pub fn as_compute(&self) -> Result<&ComputePipeline> {
        match self {
            Self::Compute(p) => Ok(p),
            Self::Render(_) => Err(self.mismatch(PipelineKind::Compute)),
        }
    }

    pub fn as_compute_mut(&mut self) -> Result<&mut ComputePipeline> {
        match self {
            Self::Compute(p) => Ok(p),
            Self::Render(_) => Err(self.mismatch(PipelineKind::Compute)),
        }
    }

    fn hooks_mut(&mut self) -> &mut PassHooks {
        match self {
            Self::Render(p) => &mut p.hooks,
            Self::Compute(p) => &mut p.hooks,
        }
    }

    /// Runs the hook for `stage` with this pipeline lent to it. The hook is
    /// taken out while it runs and put back unless it installed a new one.
    pub(crate) fn run_hook(
        &mut self,
        stage: HookStage,
        frame: u64,
        bind_groups: &mut [BindGroup],
        draw: &mut DrawCounts,
    ) -> Result<()> {
        let taken = match stage {
            HookStage::Before => self.hooks_mut().before.take(),
            HookStage::After => self.hooks_mut().after.take(),
        };
        let Some(mut hook) = taken else {
            return Ok(());
        };

        let result = hook(&mut PassContext {
            frame,
            pipeline: &mut *self,
            bind_groups,
            draw,
        });

        let hooks = self.hooks_mut();
        let slot = match stage {
            HookStage::Before => &mut hooks.before,
            HookStage::After => &mut hooks.after,
        };
        if slot.is_none() {
            *slot = Some(hook);
        }
        result
    }
}

impl From<RenderPipeline> for Pipeline {
    fn from(pipeline: RenderPipeline) -> Self {
        Self::Render(pipeline)
    }
}

impl From<ComputePipeline> for Pipeline {
    fn from(pipeline: ComputePipeline) -> Self {
        Self::Compute(pipeline)
    }
}
