//! Compute pipelines.

use crate::device::{ComputePipelineDesc, ComputePipelineId, GpuBackend, PipelineLayoutId};
use crate::errors::{KitError, Result};
use crate::label::Label;

use super::{PassContext, PassHook, PassHooks, ShaderSource};

/// A 3D workgroup size or dispatch count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Workgroups {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Workgroups {
    #[must_use]
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Number of workgroups of `size` needed to cover `extent` invocations.
    #[must_use]
    pub fn covering(extent: impl Into<Self>, size: impl Into<Self>) -> Self {
        let extent = extent.into();
        let size = size.into();
        Self {
            x: extent.x.div_ceil(size.x.max(1)),
            y: extent.y.div_ceil(size.y.max(1)),
            z: extent.z.div_ceil(size.z.max(1)),
        }
    }
}

impl From<u32> for Workgroups {
    fn from(x: u32) -> Self {
        Self::new(x, 1, 1)
    }
}

impl From<(u32, u32)> for Workgroups {
    fn from((x, y): (u32, u32)) -> Self {
        Self::new(x, y, 1)
    }
}

impl From<(u32, u32, u32)> for Workgroups {
    fn from((x, y, z): (u32, u32, u32)) -> Self {
        Self::new(x, y, z)
    }
}

impl From<[u32; 3]> for Workgroups {
    fn from([x, y, z]: [u32; 3]) -> Self {
        Self::new(x, y, z)
    }
}

#[derive(Default)]
pub struct ComputePipelineOptions {
    pub label: Option<String>,
    /// WGSL source. Required.
    pub shader: Option<String>,
    /// Defaults to `computeMain`.
    pub compute_entry: Option<String>,
    /// Size the shader declares with `@workgroup_size`. Defaults to (8, 8, 1).
    pub workgroup_size: Option<Workgroups>,
    /// Workgroups dispatched per pass. Defaults to (1, 1, 1).
    pub workgroup_count: Option<Workgroups>,
    pub on_before_pass: Option<PassHook>,
    pub on_after_pass: Option<PassHook>,
}

#[derive(Debug)]
pub struct ComputePipeline {
    pub(super) label: Label,
    shader: ShaderSource,
    workgroup_size: Workgroups,
    workgroup_count: Workgroups,
    pub(super) hooks: PassHooks,
    gpu: Option<ComputePipelineId>,
}

impl ComputePipeline {
    pub const DEFAULT_WORKGROUP_SIZE: Workgroups = Workgroups::new(8, 8, 1);

    pub fn new(options: ComputePipelineOptions) -> Result<Self> {
        let code = options
            .shader
            .ok_or_else(|| KitError::missing("ComputePipeline", "shader"))?;
        let mut shader = ShaderSource::new(code);
        shader.set_entries(None, None, options.compute_entry);

        Ok(Self {
            label: options.label.into(),
            shader,
            workgroup_size: options
                .workgroup_size
                .unwrap_or(Self::DEFAULT_WORKGROUP_SIZE),
            workgroup_count: options.workgroup_count.unwrap_or(Workgroups::new(1, 1, 1)),
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

    #[inline]
    #[must_use]
    pub fn workgroup_size(&self) -> Workgroups {
        self.workgroup_size
    }

    #[inline]
    #[must_use]
    pub fn workgroup_count(&self) -> Workgroups {
        self.workgroup_count
    }

    pub fn set_workgroup_count(&mut self, count: impl Into<Workgroups>) {
        self.workgroup_count = count.into();
    }

    /// Sets the dispatch count to cover `extent` invocations with the
    /// pipeline's workgroup size.
    pub fn dispatch_over(&mut self, extent: impl Into<Workgroups>) {
        self.workgroup_count = Workgroups::covering(extent, self.workgroup_size);
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
    pub fn gpu_pipeline(&self) -> Option<ComputePipelineId> {
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
    ) -> Result<ComputePipelineId> {
        if self.gpu.is_some() {
            return Err(KitError::AlreadyBuilt("Compute pipeline"));
        }
        let shader = self.shader.build_module(device, &self.label);

        let id = device.create_compute_pipeline(&ComputePipelineDesc {
            label: self.label.derive("Compute Pipeline"),
            layout,
            shader,
            entry_point: self.shader.compute_entry().to_string(),
        })?;
        log::debug!("Built compute pipeline {}", self.label);
        self.gpu = Some(id);
        Ok(id)
    }

    pub(crate) fn release(&mut self, device: &dyn GpuBackend) {
        if let Some(id) = self.gpu.take() {
            device.destroy_compute_pipeline(id);
        }
        self.shader.release_module(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covering_rounds_up() {
        let count = Workgroups::covering((100u32, 64u32), (8u32, 8u32, 1u32));
        assert_eq!(count, Workgroups::new(13, 8, 1));
    }

    #[test]
    fn shader_is_required() {
        let err = ComputePipeline::new(ComputePipelineOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            KitError::MissingField {
                field: "shader",
                ..
            }
        ));
    }
}
