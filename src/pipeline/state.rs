//! Render state shared by every render pipeline of a group, and the
//! attachment textures it implies.

use crate::canvas::Canvas;
use crate::device::{
    AttachmentTarget, ColorAttachment, DepthStencilAttachment, GpuBackend, TextureDesc, TextureId,
};
use crate::errors::{KitError, Result};

// ============================================================================
// Multisampling
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultisampleState {
    count: u32,
    mask: u64,
    alpha_to_coverage_enabled: bool,
}

impl Default for MultisampleState {
    fn default() -> Self {
        Self {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        }
    }
}

impl MultisampleState {
    #[inline]
    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[inline]
    #[must_use]
    pub fn is_multisampled(&self) -> bool {
        self.count > 1
    }

    /// Accepts 1 or 4.
    pub fn set_count(&mut self, count: u32) -> Result<()> {
        if !matches!(count, 1 | 4) {
            return Err(KitError::InvalidSampleCount(count));
        }
        self.count = count;
        if count == 1 {
            self.alpha_to_coverage_enabled = false;
        }
        Ok(())
    }

    pub fn set_mask(&mut self, mask: u64) {
        self.mask = mask;
    }

    /// Ignored while the count is 1.
    pub fn set_alpha_to_coverage_enabled(&mut self, enabled: bool) {
        if self.count == 1 {
            log::warn!("Alpha-to-coverage ignored without multisampling");
            return;
        }
        self.alpha_to_coverage_enabled = enabled;
    }

    #[must_use]
    pub fn as_wgpu(&self) -> wgpu::MultisampleState {
        wgpu::MultisampleState {
            count: self.count,
            mask: self.mask,
            alpha_to_coverage_enabled: self.alpha_to_coverage_enabled,
        }
    }
}

// ============================================================================
// Depth / Stencil
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct DepthStencil {
    enabled: bool,
    state: wgpu::DepthStencilState,
    depth_ops: wgpu::Operations<f32>,
    stencil_ops: wgpu::Operations<u32>,
}

impl Default for DepthStencil {
    fn default() -> Self {
        let face = wgpu::StencilFaceState {
            compare: wgpu::CompareFunction::Always,
            fail_op: wgpu::StencilOperation::Keep,
            depth_fail_op: wgpu::StencilOperation::Keep,
            pass_op: wgpu::StencilOperation::Keep,
        };
        Self {
            enabled: false,
            state: wgpu::DepthStencilState {
                format: wgpu::TextureFormat::Depth24PlusStencil8,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState {
                    front: face,
                    back: face,
                    read_mask: 0xff,
                    write_mask: 0xff,
                },
                bias: wgpu::DepthBiasState::default(),
            },
            depth_ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(1.0),
                store: wgpu::StoreOp::Store,
            },
            stencil_ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(0),
                store: wgpu::StoreOp::Store,
            },
        }
    }
}

impl DepthStencil {
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[must_use]
    pub fn format(&self) -> wgpu::TextureFormat {
        self.state.format
    }

    pub fn set_format(&mut self, format: wgpu::TextureFormat) {
        self.state.format = format;
    }

    pub fn set_depth_write_enabled(&mut self, enabled: bool) {
        self.state.depth_write_enabled = enabled;
    }

    pub fn set_depth_compare(&mut self, compare: wgpu::CompareFunction) {
        self.state.depth_compare = compare;
    }

    pub fn set_stencil_front(&mut self, face: wgpu::StencilFaceState) {
        self.state.stencil.front = face;
    }

    pub fn set_stencil_back(&mut self, face: wgpu::StencilFaceState) {
        self.state.stencil.back = face;
    }

    pub fn set_stencil_read_mask(&mut self, mask: u32) {
        self.state.stencil.read_mask = mask;
    }

    pub fn set_stencil_write_mask(&mut self, mask: u32) {
        self.state.stencil.write_mask = mask;
    }

    pub fn set_depth_bias(&mut self, bias: wgpu::DepthBiasState) {
        self.state.bias = bias;
    }

    pub fn set_depth_ops(&mut self, ops: wgpu::Operations<f32>) {
        self.depth_ops = ops;
    }

    pub fn set_stencil_ops(&mut self, ops: wgpu::Operations<u32>) {
        self.stencil_ops = ops;
    }

    /// Pipeline state, `None` when disabled.
    #[must_use]
    pub fn pipeline_state(&self) -> Option<wgpu::DepthStencilState> {
        self.enabled.then(|| self.state.clone())
    }

    fn attachment(&self, texture: TextureId) -> DepthStencilAttachment {
        let format = self.state.format;
        DepthStencilAttachment {
            texture,
            depth_ops: format.has_depth_aspect().then_some(self.depth_ops),
            stencil_ops: format.has_stencil_aspect().then_some(self.stencil_ops),
        }
    }
}

// ============================================================================
// Color target
// ============================================================================

/// Blend and write mask of the single color target. The format comes from
/// the canvas at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorTarget {
    pub blend: Option<wgpu::BlendState>,
    pub write_mask: wgpu::ColorWrites,
}

impl Default for ColorTarget {
    fn default() -> Self {
        let component = wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::SrcAlpha,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        };
        Self {
            blend: Some(wgpu::BlendState {
                color: component,
                alpha: component,
            }),
            write_mask: wgpu::ColorWrites::ALL,
        }
    }
}

impl ColorTarget {
    #[must_use]
    pub fn with_format(&self, format: wgpu::TextureFormat) -> wgpu::ColorTargetState {
        wgpu::ColorTargetState {
            format,
            blend: self.blend,
            write_mask: self.write_mask,
        }
    }
}

// ============================================================================
// Attachment textures
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AttachmentShape {
    width: u32,
    height: u32,
    color_format: wgpu::TextureFormat,
    sample_count: u32,
    depth_format: Option<wgpu::TextureFormat>,
}

/// Multisample and depth/stencil textures sized to a canvas.
#[derive(Debug, Default)]
pub struct RenderTargets {
    pub(crate) multisample: MultisampleState,
    pub(crate) depth_stencil: DepthStencil,
    multisample_texture: Option<TextureId>,
    depth_texture: Option<TextureId>,
    built: Option<AttachmentShape>,
}

impl RenderTargets {
    #[must_use]
    pub fn multisample_texture(&self) -> Option<TextureId> {
        self.multisample_texture
    }

    #[must_use]
    pub fn depth_stencil_texture(&self) -> Option<TextureId> {
        self.depth_texture
    }

    /// (Re)creates the attachment textures unless they already match the
    /// canvas. Returns `true` when textures were rebuilt.
    pub(crate) fn ensure(&mut self, device: &dyn GpuBackend, canvas: &Canvas) -> Result<bool> {
        let (width, height) = canvas.size();
        let shape = AttachmentShape {
            width,
            height,
            color_format: canvas.format(),
            sample_count: self.multisample.count(),
            depth_format: self.depth_stencil.is_enabled().then(|| self.depth_stencil.format()),
        };
        if self.built == Some(shape) {
            return Ok(false);
        }

        self.release(device);

        if shape.sample_count > 1 {
            self.multisample_texture = Some(device.create_texture(&TextureDesc {
                label: "Multi-sample texture".to_string(),
                width,
                height,
                format: shape.color_format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                sample_count: shape.sample_count,
                mip_level_count: 1,
            }));
        }
        if let Some(format) = shape.depth_format {
            self.depth_texture = Some(device.create_texture(&TextureDesc {
                label: "Depth stencil texture".to_string(),
                width,
                height,
                format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                sample_count: shape.sample_count,
                mip_level_count: 1,
            }));
        }

        log::debug!(
            "Built render attachments {width}x{height} (samples: {}, depth: {:?})",
            shape.sample_count,
            shape.depth_format
        );
        self.built = Some(shape);
        Ok(true)
    }

    pub(crate) fn release(&mut self, device: &dyn GpuBackend) {
        if let Some(id) = self.multisample_texture.take() {
            device.destroy_texture(id);
        }
        if let Some(id) = self.depth_texture.take() {
            device.destroy_texture(id);
        }
        self.built = None;
    }

    pub(crate) fn color_attachment(
        &self,
        canvas: &Canvas,
        clear_color: Option<wgpu::Color>,
    ) -> ColorAttachment {
        let surface = AttachmentTarget::Surface(canvas.surface());
        let load = clear_color.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear);
        match self.multisample_texture {
            Some(texture) => ColorAttachment {
                target: AttachmentTarget::Texture(texture),
                resolve_target: Some(surface),
                load,
            },
            None => ColorAttachment {
                target: surface,
                resolve_target: None,
                load,
            },
        }
    }

    pub(crate) fn depth_attachment(&self) -> Option<DepthStencilAttachment> {
        self.depth_texture
            .map(|texture| self.depth_stencil.attachment(texture))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_one_or_four_samples() {
        let mut state = MultisampleState::default();
        assert!(state.set_count(4).is_ok());
        assert!(matches!(state.set_count(2), Err(KitError::InvalidSampleCount(2))));
        assert_eq!(state.count(), 4);
    }

    #[test]
    fn alpha_to_coverage_needs_multisampling() {
        let mut state = MultisampleState::default();
        state.set_alpha_to_coverage_enabled(true);
        assert!(!state.as_wgpu().alpha_to_coverage_enabled);

        state.set_count(4).unwrap();
        state.set_alpha_to_coverage_enabled(true);
        assert!(state.as_wgpu().alpha_to_coverage_enabled);
    }

    #[test]
    fn depth_only_format_has_no_stencil_ops() {
        let mut ds = DepthStencil::default();
        ds.set_format(wgpu::TextureFormat::Depth32Float);
        let mut ids: slotmap::SlotMap<TextureId, ()> = slotmap::SlotMap::with_key();
        let attachment = ds.attachment(ids.insert(()));
        assert!(attachment.depth_ops.is_some());
        assert!(attachment.stencil_ops.is_none());
    }
}
