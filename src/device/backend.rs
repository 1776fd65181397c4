//! Device Abstraction
//!
//! [`GpuBackend`] is the only surface through which the crate touches a GPU.
//! Resources are addressed by opaque slotmap keys so that wrappers can store
//! plain `Copy` handles, compare them for identity, and so that a headless
//! implementation can stand in for a real device.
//!
//! Two implementations ship with the crate:
//! - [`WgpuBackend`](super::WgpuBackend): adapter, device, queue and surfaces through `wgpu`
//! - [`RecordingBackend`](super::RecordingBackend): headless, records every call

use slotmap::new_key_type;

use crate::device::commands::CommandBuffer;
use crate::errors::Result;

new_key_type! {
    /// A GPU buffer.
    pub struct BufferId;
    /// A GPU texture (bound through its default view).
    pub struct TextureId;
    /// A GPU sampler.
    pub struct SamplerId;
    /// A compiled shader module.
    pub struct ShaderModuleId;
    /// A bind group layout.
    pub struct BindGroupLayoutId;
    /// A bind group.
    pub struct BindGroupId;
    /// A pipeline layout.
    pub struct PipelineLayoutId;
    /// A render pipeline.
    pub struct RenderPipelineId;
    /// A compute pipeline.
    pub struct ComputePipelineId;
    /// A presentable surface.
    pub struct SurfaceId;
}

// ============================================================================
// Descriptors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    pub label: String,
    pub size: u64,
    pub usage: wgpu::BufferUsages,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
    pub sample_count: u32,
    pub mip_level_count: u32,
}

/// Destination region of a texture upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureWrite {
    pub mip_level: u32,
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: u32,
}

/// Filtering and addressing of a sampler.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerDesc {
    pub address_mode_u: wgpu::AddressMode,
    pub address_mode_v: wgpu::AddressMode,
    pub address_mode_w: wgpu::AddressMode,
    pub mag_filter: wgpu::FilterMode,
    pub min_filter: wgpu::FilterMode,
    pub mipmap_filter: wgpu::MipmapFilterMode,
    pub lod_min_clamp: f32,
    pub lod_max_clamp: f32,
    pub compare: Option<wgpu::CompareFunction>,
    pub anisotropy_clamp: u16,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Linear,
            lod_min_clamp: 0.0,
            lod_max_clamp: 32.0,
            compare: None,
            anisotropy_clamp: 1,
        }
    }
}

impl SamplerDesc {
    /// The binding type a shader must declare for this sampler.
    #[must_use]
    pub fn binding_type(&self) -> wgpu::SamplerBindingType {
        if self.compare.is_some() {
            wgpu::SamplerBindingType::Comparison
        } else if self.mag_filter == wgpu::FilterMode::Nearest
            && self.min_filter == wgpu::FilterMode::Nearest
            && self.mipmap_filter == wgpu::MipmapFilterMode::Nearest
        {
            wgpu::SamplerBindingType::NonFiltering
        } else {
            wgpu::SamplerBindingType::Filtering
        }
    }
}

/// A resource handle placed into a bind group slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundResource {
    Buffer(BufferId),
    Texture(TextureId),
    Sampler(SamplerId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindGroupEntry {
    pub binding: u32,
    pub resource: BoundResource,
}

/// Owned form of [`wgpu::VertexBufferLayout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexBufferLayout {
    pub array_stride: u64,
    pub step_mode: wgpu::VertexStepMode,
    pub attributes: Vec<wgpu::VertexAttribute>,
}

impl VertexBufferLayout {
    #[must_use]
    pub fn as_wgpu(&self) -> wgpu::VertexBufferLayout<'_> {
        wgpu::VertexBufferLayout {
            array_stride: self.array_stride,
            step_mode: self.step_mode,
            attributes: &self.attributes,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderPipelineDesc {
    pub label: String,
    pub layout: PipelineLayoutId,
    pub shader: ShaderModuleId,
    pub vertex_entry: String,
    pub fragment_entry: String,
    pub vertex_buffers: Vec<VertexBufferLayout>,
    pub color_target: wgpu::ColorTargetState,
    pub primitive: wgpu::PrimitiveState,
    pub depth_stencil: Option<wgpu::DepthStencilState>,
    pub multisample: wgpu::MultisampleState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputePipelineDesc {
    pub label: String,
    pub layout: PipelineLayoutId,
    pub shader: ShaderModuleId,
    pub entry_point: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceConfig {
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub present_mode: wgpu::PresentMode,
}

// ============================================================================
// Backend trait
// ============================================================================

/// Resource creation, uploads, surfaces and submission.
///
/// Creation calls that cannot fail on a real device return the id directly;
/// calls that reference other ids return [`Result`] and fail with
/// [`KitError::NotSet`](crate::errors::KitError::NotSet) when an id is unknown.
pub trait GpuBackend: Send + Sync {
    /// Limits of the negotiated device.
    fn limits(&self) -> wgpu::Limits;

    fn create_buffer(&self, desc: &BufferDesc) -> BufferId;
    fn destroy_buffer(&self, id: BufferId);
    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<()>;

    fn create_texture(&self, desc: &TextureDesc) -> TextureId;
    fn destroy_texture(&self, id: TextureId);
    fn write_texture(&self, id: TextureId, region: &TextureWrite, data: &[u8]) -> Result<()>;

    fn create_sampler(&self, label: &str, desc: &SamplerDesc) -> SamplerId;

    fn create_shader_module(&self, label: &str, source: &str) -> ShaderModuleId;
    fn destroy_shader_module(&self, id: ShaderModuleId);

    fn create_bind_group_layout(
        &self,
        label: &str,
        entries: &[wgpu::BindGroupLayoutEntry],
    ) -> BindGroupLayoutId;
    fn destroy_bind_group_layout(&self, id: BindGroupLayoutId);

    fn create_bind_group(
        &self,
        label: &str,
        layout: BindGroupLayoutId,
        entries: &[BindGroupEntry],
    ) -> Result<BindGroupId>;
    fn destroy_bind_group(&self, id: BindGroupId);

    fn create_pipeline_layout(
        &self,
        label: &str,
        bind_group_layouts: &[BindGroupLayoutId],
    ) -> Result<PipelineLayoutId>;
    fn destroy_pipeline_layout(&self, id: PipelineLayoutId);

    fn create_render_pipeline(&self, desc: &RenderPipelineDesc) -> Result<RenderPipelineId>;
    fn destroy_render_pipeline(&self, id: RenderPipelineId);
    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc) -> Result<ComputePipelineId>;
    fn destroy_compute_pipeline(&self, id: ComputePipelineId);

    /// Creates a surface for a window. Headless backends may refuse.
    fn create_surface(&self, target: wgpu::SurfaceTarget<'static>) -> Result<SurfaceId>;

    /// Preferred pixel format of a surface on this device.
    fn surface_format(&self, surface: SurfaceId) -> Result<wgpu::TextureFormat>;

    fn configure_surface(&self, surface: SurfaceId, config: &SurfaceConfig) -> Result<()>;

    /// Replays `commands` on one command encoder and submits it to the queue
    /// once, presenting every surface frame it rendered to.
    fn submit(&self, commands: &CommandBuffer) -> Result<()>;
}
