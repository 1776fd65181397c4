//! Recorded GPU work.
//!
//! A frame is recorded into a [`CommandBuffer`] of render and compute passes
//! and handed to [`GpuBackend::submit`](super::GpuBackend::submit), which
//! replays it onto one encoder. Keeping the recording backend-neutral lets the
//! same frame be executed by `wgpu` or inspected in tests.

use std::ops::Range;

use super::backend::{
    BindGroupId, BufferId, ComputePipelineId, RenderPipelineId, SurfaceId, TextureId,
};

/// Where a color attachment writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentTarget {
    /// An offscreen texture (e.g. the multisample target).
    Texture(TextureId),
    /// The current frame of a surface.
    Surface(SurfaceId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorAttachment {
    pub target: AttachmentTarget,
    pub resolve_target: Option<AttachmentTarget>,
    pub load: wgpu::LoadOp<wgpu::Color>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DepthStencilAttachment {
    pub texture: TextureId,
    pub depth_ops: Option<wgpu::Operations<f32>>,
    pub stencil_ops: Option<wgpu::Operations<u32>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderCommand {
    SetPipeline(RenderPipelineId),
    SetBindGroup {
        index: u32,
        group: BindGroupId,
    },
    SetVertexBuffer {
        slot: u32,
        buffer: BufferId,
    },
    SetIndexBuffer {
        buffer: BufferId,
        format: wgpu::IndexFormat,
    },
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
    DrawIndexed {
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComputeCommand {
    SetPipeline(ComputePipelineId),
    SetBindGroup { index: u32, group: BindGroupId },
    Dispatch { x: u32, y: u32, z: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassRecord {
    pub label: String,
    pub color: ColorAttachment,
    pub depth_stencil: Option<DepthStencilAttachment>,
    pub commands: Vec<RenderCommand>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputePassRecord {
    pub label: String,
    pub commands: Vec<ComputeCommand>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PassRecord {
    Render(RenderPassRecord),
    Compute(ComputePassRecord),
}

/// One submission worth of passes, in execution order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandBuffer {
    pub label: String,
    pub passes: Vec<PassRecord>,
}

impl CommandBuffer {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            passes: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn render_passes(&self) -> impl Iterator<Item = &RenderPassRecord> {
        self.passes.iter().filter_map(|pass| match pass {
            PassRecord::Render(render) => Some(render),
            PassRecord::Compute(_) => None,
        })
    }

    pub fn compute_passes(&self) -> impl Iterator<Item = &ComputePassRecord> {
        self.passes.iter().filter_map(|pass| match pass {
            PassRecord::Compute(compute) => Some(compute),
            PassRecord::Render(_) => None,
        })
    }

    /// Every surface written or resolved into, deduplicated, in first-use order.
    #[must_use]
    pub fn surfaces(&self) -> Vec<SurfaceId> {
        let mut surfaces = Vec::new();
        for pass in self.render_passes() {
            let targets = [Some(pass.color.target), pass.color.resolve_target];
            for target in targets.into_iter().flatten() {
                if let AttachmentTarget::Surface(id) = target
                    && !surfaces.contains(&id)
                {
                    surfaces.push(id);
                }
            }
        }
        surfaces
    }
}

#[cfg(test)]
mod tests {
    use slotmap::SlotMap;

    use super::*;

    #[test]
    fn surfaces_are_deduplicated_across_passes() {
        let mut surfaces: SlotMap<SurfaceId, ()> = SlotMap::with_key();
        let mut textures: SlotMap<TextureId, ()> = SlotMap::with_key();
        let surface = surfaces.insert(());
        let msaa = textures.insert(());

        let pass = |target, resolve_target| {
            PassRecord::Render(RenderPassRecord {
                label: "pass".into(),
                color: ColorAttachment {
                    target,
                    resolve_target,
                    load: wgpu::LoadOp::Load,
                },
                depth_stencil: None,
                commands: Vec::new(),
            })
        };

        let mut cmd = CommandBuffer::new("frame");
        cmd.passes.push(pass(AttachmentTarget::Surface(surface), None));
        cmd.passes.push(pass(
            AttachmentTarget::Texture(msaa),
            Some(AttachmentTarget::Surface(surface)),
        ));
        cmd.passes.push(PassRecord::Compute(ComputePassRecord {
            label: "compute".into(),
            commands: Vec::new(),
        }));

        assert_eq!(cmd.surfaces(), vec![surface]);
        assert_eq!(cmd.render_passes().count(), 2);
        assert_eq!(cmd.compute_passes().count(), 1);
    }
}
