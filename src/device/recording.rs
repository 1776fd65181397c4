//! Headless [`GpuBackend`] that records instead of executing.
//!
//! Every created object is kept with its descriptor, buffer writes update a
//! CPU copy of the buffer contents, and each submission is stored verbatim.
//! Useful for tests and for running pipeline groups where no adapter exists.

use parking_lot::Mutex;
use slotmap::{Key, SlotMap};

use super::backend::{
    BindGroupEntry, BindGroupId, BindGroupLayoutId, BufferDesc, BufferId, ComputePipelineDesc,
    ComputePipelineId, GpuBackend, PipelineLayoutId, RenderPipelineDesc, RenderPipelineId,
    SamplerDesc, SamplerId, ShaderModuleId, SurfaceConfig, SurfaceId, TextureDesc, TextureId,
    TextureWrite,
};
use super::commands::CommandBuffer;
use crate::errors::{KitError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedBuffer {
    pub desc: BufferDesc,
    pub contents: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedTexture {
    pub desc: TextureDesc,
    pub writes: Vec<TextureWrite>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedBindGroup {
    pub label: String,
    pub layout: BindGroupLayoutId,
    pub entries: Vec<BindGroupEntry>,
}

/// Running totals of backend calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub buffers_created: usize,
    pub buffers_destroyed: usize,
    pub buffer_writes: usize,
    pub textures_created: usize,
    pub textures_destroyed: usize,
    pub bind_groups_created: usize,
    pub bind_groups_destroyed: usize,
    pub bind_group_layouts_created: usize,
    pub bind_group_layouts_destroyed: usize,
    pub pipeline_layouts_destroyed: usize,
    pub surface_configurations: usize,
}

#[derive(Default)]
struct RecordingState {
    buffers: SlotMap<BufferId, RecordedBuffer>,
    textures: SlotMap<TextureId, RecordedTexture>,
    samplers: SlotMap<SamplerId, SamplerDesc>,
    shaders: SlotMap<ShaderModuleId, String>,
    bind_group_layouts: SlotMap<BindGroupLayoutId, Vec<wgpu::BindGroupLayoutEntry>>,
    bind_groups: SlotMap<BindGroupId, RecordedBindGroup>,
    pipeline_layouts: SlotMap<PipelineLayoutId, Vec<BindGroupLayoutId>>,
    render_pipelines: SlotMap<RenderPipelineId, RenderPipelineDesc>,
    compute_pipelines: SlotMap<ComputePipelineId, ComputePipelineDesc>,
    surfaces: SlotMap<SurfaceId, Option<SurfaceConfig>>,
    submissions: Vec<CommandBuffer>,
    stats: BackendStats,
}

pub struct RecordingBackend {
    limits: wgpu::Limits,
    surface_format: wgpu::TextureFormat,
    state: Mutex<RecordingState>,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn require<K: Key, V>(map: &SlotMap<K, V>, id: K, what: &'static str) -> Result<()> {
    if map.contains_key(id) {
        Ok(())
    } else {
        Err(KitError::NotSet(what))
    }
}

impl RecordingBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            limits: wgpu::Limits::default(),
            surface_format: wgpu::TextureFormat::Bgra8Unorm,
            state: Mutex::default(),
        }
    }

    /// Overrides `max_texture_dimension_2d`, the bound used when fitting
    /// canvases to their client size.
    #[must_use]
    pub fn with_max_texture_dimension(mut self, max: u32) -> Self {
        self.limits.max_texture_dimension_2d = max;
        self
    }

    #[must_use]
    pub fn with_surface_format(mut self, format: wgpu::TextureFormat) -> Self {
        self.surface_format = format;
        self
    }

    /// Registers a surface without a window.
    pub fn create_virtual_surface(&self) -> SurfaceId {
        self.state.lock().surfaces.insert(None)
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    #[must_use]
    pub fn submissions(&self) -> Vec<CommandBuffer> {
        self.state.lock().submissions.clone()
    }

    /// Drains the recorded submissions.
    pub fn take_submissions(&self) -> Vec<CommandBuffer> {
        std::mem::take(&mut self.state.lock().submissions)
    }

    #[must_use]
    pub fn last_submission(&self) -> Option<CommandBuffer> {
        self.state.lock().submissions.last().cloned()
    }

    #[must_use]
    pub fn stats(&self) -> BackendStats {
        self.state.lock().stats
    }

    /// `None` once the buffer is destroyed.
    #[must_use]
    pub fn buffer(&self, id: BufferId) -> Option<RecordedBuffer> {
        self.state.lock().buffers.get(id).cloned()
    }

    #[must_use]
    pub fn buffer_contents(&self, id: BufferId) -> Option<Vec<u8>> {
        self.state.lock().buffers.get(id).map(|b| b.contents.clone())
    }

    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.state.lock().buffers.len()
    }

    #[must_use]
    pub fn live_bind_groups(&self) -> usize {
        self.state.lock().bind_groups.len()
    }

    #[must_use]
    pub fn live_bind_group_layouts(&self) -> usize {
        self.state.lock().bind_group_layouts.len()
    }

    #[must_use]
    pub fn live_pipeline_layouts(&self) -> usize {
        self.state.lock().pipeline_layouts.len()
    }

    /// Render and compute pipelines together.
    #[must_use]
    pub fn live_pipelines(&self) -> usize {
        let state = self.state.lock();
        state.render_pipelines.len() + state.compute_pipelines.len()
    }

    #[must_use]
    pub fn live_shader_modules(&self) -> usize {
        self.state.lock().shaders.len()
    }

    #[must_use]
    pub fn texture(&self, id: TextureId) -> Option<RecordedTexture> {
        self.state.lock().textures.get(id).cloned()
    }

    #[must_use]
    pub fn sampler(&self, id: SamplerId) -> Option<SamplerDesc> {
        self.state.lock().samplers.get(id).cloned()
    }

    #[must_use]
    pub fn shader_source(&self, id: ShaderModuleId) -> Option<String> {
        self.state.lock().shaders.get(id).cloned()
    }

    #[must_use]
    pub fn bind_group_layout_entries(
        &self,
        id: BindGroupLayoutId,
    ) -> Option<Vec<wgpu::BindGroupLayoutEntry>> {
        self.state.lock().bind_group_layouts.get(id).cloned()
    }

    #[must_use]
    pub fn bind_group(&self, id: BindGroupId) -> Option<RecordedBindGroup> {
        self.state.lock().bind_groups.get(id).cloned()
    }

    #[must_use]
    pub fn pipeline_layout(&self, id: PipelineLayoutId) -> Option<Vec<BindGroupLayoutId>> {
        self.state.lock().pipeline_layouts.get(id).cloned()
    }

    #[must_use]
    pub fn render_pipeline(&self, id: RenderPipelineId) -> Option<RenderPipelineDesc> {
        self.state.lock().render_pipelines.get(id).cloned()
    }

    #[must_use]
    pub fn compute_pipeline(&self, id: ComputePipelineId) -> Option<ComputePipelineDesc> {
        self.state.lock().compute_pipelines.get(id).cloned()
    }

    #[must_use]
    pub fn surface_config(&self, id: SurfaceId) -> Option<SurfaceConfig> {
        self.state.lock().surfaces.get(id).copied().flatten()
    }
}

impl GpuBackend for RecordingBackend {
    fn limits(&self) -> wgpu::Limits {
        self.limits.clone()
    }

    fn create_buffer(&self, desc: &BufferDesc) -> BufferId {
        let mut state = self.state.lock();
        state.stats.buffers_created += 1;
        state.buffers.insert(RecordedBuffer {
            desc: desc.clone(),
            contents: vec![0; desc.size as usize],
        })
    }

    fn destroy_buffer(&self, id: BufferId) {
        let mut state = self.state.lock();
        if state.buffers.remove(id).is_some() {
            state.stats.buffers_destroyed += 1;
        }
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        let buffer = state
            .buffers
            .get_mut(id)
            .ok_or(KitError::NotSet("GPU buffer"))?;
        let len = data.len() as u64;
        if offset + len > buffer.desc.size {
            return Err(KitError::WriteOutOfBounds {
                offset,
                len,
                size: buffer.desc.size,
            });
        }
        let start = offset as usize;
        buffer.contents[start..start + data.len()].copy_from_slice(data);
        state.stats.buffer_writes += 1;
        Ok(())
    }

    fn create_texture(&self, desc: &TextureDesc) -> TextureId {
        let mut state = self.state.lock();
        state.stats.textures_created += 1;
        state.textures.insert(RecordedTexture {
            desc: desc.clone(),
            writes: Vec::new(),
        })
    }

    fn destroy_texture(&self, id: TextureId) {
        let mut state = self.state.lock();
        if state.textures.remove(id).is_some() {
            state.stats.textures_destroyed += 1;
        }
    }

    fn write_texture(&self, id: TextureId, region: &TextureWrite, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        let texture = state
            .textures
            .get_mut(id)
            .ok_or(KitError::NotSet("GPU texture"))?;
        let expected = region.bytes_per_row as usize * region.height as usize;
        if data.len() < expected {
            return Err(KitError::TextureDataSize {
                expected,
                actual: data.len(),
            });
        }
        texture.writes.push(*region);
        Ok(())
    }

    fn create_sampler(&self, _label: &str, desc: &SamplerDesc) -> SamplerId {
        self.state.lock().samplers.insert(desc.clone())
    }

    fn create_shader_module(&self, _label: &str, source: &str) -> ShaderModuleId {
        self.state.lock().shaders.insert(source.to_owned())
    }

    fn destroy_shader_module(&self, id: ShaderModuleId) {
        self.state.lock().shaders.remove(id);
    }

    fn create_bind_group_layout(
        &self,
        _label: &str,
        entries: &[wgpu::BindGroupLayoutEntry],
    ) -> BindGroupLayoutId {
        let mut state = self.state.lock();
        state.stats.bind_group_layouts_created += 1;
        state.bind_group_layouts.insert(entries.to_vec())
    }

    fn destroy_bind_group_layout(&self, id: BindGroupLayoutId) {
        let mut state = self.state.lock();
        if state.bind_group_layouts.remove(id).is_some() {
            state.stats.bind_group_layouts_destroyed += 1;
        }
    }

    fn create_bind_group(
        &self,
        label: &str,
        layout: BindGroupLayoutId,
        entries: &[BindGroupEntry],
    ) -> Result<BindGroupId> {
        let mut state = self.state.lock();
        require(&state.bind_group_layouts, layout, "Bind group layout")?;
        state.stats.bind_groups_created += 1;
        Ok(state.bind_groups.insert(RecordedBindGroup {
            label: label.to_owned(),
            layout,
            entries: entries.to_vec(),
        }))
    }

    fn destroy_bind_group(&self, id: BindGroupId) {
        let mut state = self.state.lock();
        if state.bind_groups.remove(id).is_some() {
            state.stats.bind_groups_destroyed += 1;
        }
    }

    fn create_pipeline_layout(
        &self,
        _label: &str,
        bind_group_layouts: &[BindGroupLayoutId],
    ) -> Result<PipelineLayoutId> {
        let mut state = self.state.lock();
        for &id in bind_group_layouts {
            require(&state.bind_group_layouts, id, "Bind group layout")?;
        }
        Ok(state.pipeline_layouts.insert(bind_group_layouts.to_vec()))
    }

    fn destroy_pipeline_layout(&self, id: PipelineLayoutId) {
        let mut state = self.state.lock();
        if state.pipeline_layouts.remove(id).is_some() {
            state.stats.pipeline_layouts_destroyed += 1;
        }
    }

    fn create_render_pipeline(&self, desc: &RenderPipelineDesc) -> Result<RenderPipelineId> {
        let mut state = self.state.lock();
        require(&state.pipeline_layouts, desc.layout, "Pipeline layout")?;
        require(&state.shaders, desc.shader, "Shader module")?;
        Ok(state.render_pipelines.insert(desc.clone()))
    }

    fn destroy_render_pipeline(&self, id: RenderPipelineId) {
        self.state.lock().render_pipelines.remove(id);
    }

    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc) -> Result<ComputePipelineId> {
        let mut state = self.state.lock();
        require(&state.pipeline_layouts, desc.layout, "Pipeline layout")?;
        require(&state.shaders, desc.shader, "Shader module")?;
        Ok(state.compute_pipelines.insert(desc.clone()))
    }

    fn destroy_compute_pipeline(&self, id: ComputePipelineId) {
        self.state.lock().compute_pipelines.remove(id);
    }

    fn create_surface(&self, _target: wgpu::SurfaceTarget<'static>) -> Result<SurfaceId> {
        Err(KitError::SurfaceUnavailable(
            "recording backend has no windowing; use create_virtual_surface".to_string(),
        ))
    }

    fn surface_format(&self, surface: SurfaceId) -> Result<wgpu::TextureFormat> {
        require(&self.state.lock().surfaces, surface, "Surface")?;
        Ok(self.surface_format)
    }

    fn configure_surface(&self, surface: SurfaceId, config: &SurfaceConfig) -> Result<()> {
        let mut state = self.state.lock();
        let slot = state
            .surfaces
            .get_mut(surface)
            .ok_or(KitError::NotSet("Surface"))?;
        *slot = Some(*config);
        state.stats.surface_configurations += 1;
        Ok(())
    }

    fn submit(&self, commands: &CommandBuffer) -> Result<()> {
        let mut state = self.state.lock();
        for id in commands.surfaces() {
            match state.surfaces.get(id) {
                Some(Some(_)) => {}
                Some(None) => return Err(KitError::NotSet("Surface configuration")),
                None => return Err(KitError::NotSet("Surface")),
            }
        }
        state.submissions.push(commands.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_land_in_recorded_contents() {
        let backend = RecordingBackend::new();
        let id = backend.create_buffer(&BufferDesc {
            label: "test".into(),
            size: 8,
            usage: wgpu::BufferUsages::COPY_DST,
        });

        backend.write_buffer(id, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(backend.buffer_contents(id).unwrap(), vec![0, 0, 0, 0, 1, 2, 3, 4]);

        let err = backend.write_buffer(id, 6, &[0; 4]).unwrap_err();
        assert!(matches!(err, KitError::WriteOutOfBounds { size: 8, .. }));
    }

    #[test]
    fn destroyed_buffers_are_gone() {
        let backend = RecordingBackend::new();
        let id = backend.create_buffer(&BufferDesc {
            label: "test".into(),
            size: 4,
            usage: wgpu::BufferUsages::COPY_DST,
        });
        backend.destroy_buffer(id);

        assert!(backend.buffer(id).is_none());
        assert!(backend.write_buffer(id, 0, &[0; 4]).is_err());
        assert_eq!(backend.stats().buffers_destroyed, 1);
    }

    #[test]
    fn submitting_to_unconfigured_surface_fails() {
        use crate::device::commands::{
            AttachmentTarget, ColorAttachment, PassRecord, RenderPassRecord,
        };

        let backend = RecordingBackend::new();
        let surface = backend.create_virtual_surface();
        let mut cmd = CommandBuffer::new("frame");
        cmd.passes.push(PassRecord::Render(RenderPassRecord {
            label: "pass".into(),
            color: ColorAttachment {
                target: AttachmentTarget::Surface(surface),
                resolve_target: None,
                load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
            },
            depth_stencil: None,
            commands: Vec::new(),
        }));

        assert!(backend.submit(&cmd).is_err());

        backend
            .configure_surface(
                surface,
                &SurfaceConfig {
                    width: 4,
                    height: 4,
                    format: wgpu::TextureFormat::Bgra8Unorm,
                    present_mode: wgpu::PresentMode::AutoVsync,
                },
            )
            .unwrap();
        backend.submit(&cmd).unwrap();
        assert_eq!(backend.submissions().len(), 1);

        assert_eq!(backend.take_submissions().len(), 1);
        assert!(backend.submissions().is_empty());
        assert!(backend.last_submission().is_none());
    }
}
