//! `wgpu` implementation of [`GpuBackend`].
//!
//! Every wgpu object lives in a slotmap behind a `parking_lot` lock and is
//! addressed by the ids handed out at creation. Submission replays a
//! [`CommandBuffer`] onto a single encoder: every surface the frame targets is
//! acquired once up front, the encoder is submitted once, and the acquired
//! frames are presented afterwards.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use slotmap::{Key, SlotMap};

use super::backend::{
    BindGroupEntry, BindGroupId, BindGroupLayoutId, BoundResource, BufferDesc, BufferId,
    ComputePipelineDesc, ComputePipelineId, GpuBackend, PipelineLayoutId, RenderPipelineDesc,
    RenderPipelineId, SamplerDesc, SamplerId, ShaderModuleId, SurfaceConfig, SurfaceId,
    TextureDesc, TextureId, TextureWrite, VertexBufferLayout,
};
use super::commands::{
    AttachmentTarget, CommandBuffer, ComputeCommand, ComputePassRecord, PassRecord,
    RenderCommand, RenderPassRecord,
};
use crate::errors::{KitError, Result};
use crate::settings::ContextSettings;

struct TextureEntry {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct SurfaceEntry {
    surface: wgpu::Surface<'static>,
    config: Option<wgpu::SurfaceConfiguration>,
}

/// A negotiated adapter, device and queue plus every object created on them.
pub struct WgpuBackend {
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,

    buffers: RwLock<SlotMap<BufferId, wgpu::Buffer>>,
    textures: RwLock<SlotMap<TextureId, TextureEntry>>,
    samplers: RwLock<SlotMap<SamplerId, wgpu::Sampler>>,
    shaders: RwLock<SlotMap<ShaderModuleId, wgpu::ShaderModule>>,
    bind_group_layouts: RwLock<SlotMap<BindGroupLayoutId, wgpu::BindGroupLayout>>,
    bind_groups: RwLock<SlotMap<BindGroupId, wgpu::BindGroup>>,
    pipeline_layouts: RwLock<SlotMap<PipelineLayoutId, wgpu::PipelineLayout>>,
    render_pipelines: RwLock<SlotMap<RenderPipelineId, wgpu::RenderPipeline>>,
    compute_pipelines: RwLock<SlotMap<ComputePipelineId, wgpu::ComputePipeline>>,
    surfaces: RwLock<SlotMap<SurfaceId, SurfaceEntry>>,
}

impl WgpuBackend {
    /// Negotiates an adapter and device.
    ///
    /// No surface is consulted during adapter selection; surfaces created
    /// later are checked for compatibility when their format is queried.
    pub async fn request(settings: &ContextSettings) -> Result<Self> {
        let instance = wgpu::Instance::default();

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: settings.power_preference,
                compatible_surface: None,
                force_fallback_adapter: settings.force_fallback_adapter,
            })
            .await
            .map_err(|e| KitError::DeviceUnavailable(e.to_string()))?;

        let info = adapter.get_info();
        log::info!("Using adapter {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: settings.label.as_deref(),
                required_features: settings.required_features,
                required_limits: settings.required_limits.clone(),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            buffers: RwLock::default(),
            textures: RwLock::default(),
            samplers: RwLock::default(),
            shaders: RwLock::default(),
            bind_group_layouts: RwLock::default(),
            bind_groups: RwLock::default(),
            pipeline_layouts: RwLock::default(),
            render_pipelines: RwLock::default(),
            compute_pipelines: RwLock::default(),
            surfaces: RwLock::default(),
        })
    }

    #[inline]
    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[inline]
    #[must_use]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    #[inline]
    #[must_use]
    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }
}

fn lookup<'a, K: Key, V>(map: &'a SlotMap<K, V>, id: K, what: &'static str) -> Result<&'a V> {
    map.get(id).ok_or(KitError::NotSet(what))
}

fn acquire_frame(entry: &SurfaceEntry, device: &wgpu::Device) -> Result<wgpu::SurfaceTexture> {
    let Some(config) = &entry.config else {
        return Err(KitError::NotSet("Surface configuration"));
    };
    match entry.surface.get_current_texture() {
        Ok(frame) => Ok(frame),
        Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
            log::warn!("Surface lost or outdated, reconfiguring");
            entry.surface.configure(device, config);
            Ok(entry.surface.get_current_texture()?)
        }
        Err(e) => Err(e.into()),
    }
}

impl GpuBackend for WgpuBackend {
    fn limits(&self) -> wgpu::Limits {
        self.device.limits()
    }

    fn create_buffer(&self, desc: &BufferDesc) -> BufferId {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&desc.label),
            size: desc.size,
            usage: desc.usage,
            mapped_at_creation: false,
        });
        self.buffers.write().insert(buffer)
    }

    fn destroy_buffer(&self, id: BufferId) {
        if let Some(buffer) = self.buffers.write().remove(id) {
            buffer.destroy();
        }
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<()> {
        let buffers = self.buffers.read();
        let buffer = lookup(&buffers, id, "GPU buffer")?;
        let len = data.len() as u64;
        if offset + len > buffer.size() {
            return Err(KitError::WriteOutOfBounds {
                offset,
                len,
                size: buffer.size(),
            });
        }
        self.queue.write_buffer(buffer, offset, data);
        Ok(())
    }

    fn create_texture(&self, desc: &TextureDesc) -> TextureId {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: desc.mip_level_count,
            sample_count: desc.sample_count,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format,
            usage: desc.usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.textures.write().insert(TextureEntry { texture, view })
    }

    fn destroy_texture(&self, id: TextureId) {
        if let Some(entry) = self.textures.write().remove(id) {
            entry.texture.destroy();
        }
    }

    fn write_texture(&self, id: TextureId, region: &TextureWrite, data: &[u8]) -> Result<()> {
        let textures = self.textures.read();
        let entry = lookup(&textures, id, "GPU texture")?;
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &entry.texture,
                mip_level: region.mip_level,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(region.bytes_per_row),
                rows_per_image: Some(region.height),
            },
            wgpu::Extent3d {
                width: region.width,
                height: region.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn create_sampler(&self, label: &str, desc: &SamplerDesc) -> SamplerId {
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(label),
            address_mode_u: desc.address_mode_u,
            address_mode_v: desc.address_mode_v,
            address_mode_w: desc.address_mode_w,
            mag_filter: desc.mag_filter,
            min_filter: desc.min_filter,
            mipmap_filter: desc.mipmap_filter,
            lod_min_clamp: desc.lod_min_clamp,
            lod_max_clamp: desc.lod_max_clamp,
            compare: desc.compare,
            anisotropy_clamp: desc.anisotropy_clamp,
            border_color: None,
        });
        self.samplers.write().insert(sampler)
    }

    fn create_shader_module(&self, label: &str, source: &str) -> ShaderModuleId {
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        self.shaders.write().insert(module)
    }

    fn destroy_shader_module(&self, id: ShaderModuleId) {
        self.shaders.write().remove(id);
    }

    fn create_bind_group_layout(
        &self,
        label: &str,
        entries: &[wgpu::BindGroupLayoutEntry],
    ) -> BindGroupLayoutId {
        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries,
            });
        self.bind_group_layouts.write().insert(layout)
    }

    fn destroy_bind_group_layout(&self, id: BindGroupLayoutId) {
        self.bind_group_layouts.write().remove(id);
    }

    fn destroy_bind_group(&self, id: BindGroupId) {
        self.bind_groups.write().remove(id);
    }

    fn create_bind_group(
        &self,
        label: &str,
        layout: BindGroupLayoutId,
        entries: &[BindGroupEntry],
    ) -> Result<BindGroupId> {
        let layouts = self.bind_group_layouts.read();
        let buffers = self.buffers.read();
        let textures = self.textures.read();
        let samplers = self.samplers.read();

        let layout = lookup(&layouts, layout, "Bind group layout")?;
        let wgpu_entries = entries
            .iter()
            .map(|entry| {
                let resource = match entry.resource {
                    BoundResource::Buffer(id) => {
                        lookup(&buffers, id, "GPU buffer")?.as_entire_binding()
                    }
                    BoundResource::Texture(id) => wgpu::BindingResource::TextureView(
                        &lookup(&textures, id, "GPU texture")?.view,
                    ),
                    BoundResource::Sampler(id) => {
                        wgpu::BindingResource::Sampler(lookup(&samplers, id, "GPU sampler")?)
                    }
                };
                Ok(wgpu::BindGroupEntry {
                    binding: entry.binding,
                    resource,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &wgpu_entries,
        });
        Ok(self.bind_groups.write().insert(group))
    }

    fn create_pipeline_layout(
        &self,
        label: &str,
        bind_group_layouts: &[BindGroupLayoutId],
    ) -> Result<PipelineLayoutId> {
        let layouts = self.bind_group_layouts.read();
        let refs = bind_group_layouts
            .iter()
            .map(|&id| lookup(&layouts, id, "Bind group layout"))
            .collect::<Result<Vec<_>>>()?;

        let layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &refs,
                immediate_size: 0,
            });
        Ok(self.pipeline_layouts.write().insert(layout))
    }

    fn destroy_pipeline_layout(&self, id: PipelineLayoutId) {
        self.pipeline_layouts.write().remove(id);
    }

    fn create_render_pipeline(&self, desc: &RenderPipelineDesc) -> Result<RenderPipelineId> {
        let layouts = self.pipeline_layouts.read();
        let shaders = self.shaders.read();
        let layout = lookup(&layouts, desc.layout, "Pipeline layout")?;
        let module = lookup(&shaders, desc.shader, "Shader module")?;

        let vertex_buffers: Vec<_> = desc
            .vertex_buffers
            .iter()
            .map(VertexBufferLayout::as_wgpu)
            .collect();

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&desc.label),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module,
                    entry_point: Some(&desc.vertex_entry),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers: &vertex_buffers,
                },
                fragment: Some(wgpu::FragmentState {
                    module,
                    entry_point: Some(&desc.fragment_entry),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    targets: &[Some(desc.color_target.clone())],
                }),
                primitive: desc.primitive,
                depth_stencil: desc.depth_stencil.clone(),
                multisample: desc.multisample,
                multiview_mask: None,
                cache: None,
            });
        Ok(self.render_pipelines.write().insert(pipeline))
    }

    fn destroy_render_pipeline(&self, id: RenderPipelineId) {
        self.render_pipelines.write().remove(id);
    }

    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc) -> Result<ComputePipelineId> {
        let layouts = self.pipeline_layouts.read();
        let shaders = self.shaders.read();
        let layout = lookup(&layouts, desc.layout, "Pipeline layout")?;
        let module = lookup(&shaders, desc.shader, "Shader module")?;

        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(&desc.label),
                layout: Some(layout),
                module,
                entry_point: Some(&desc.entry_point),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            });
        Ok(self.compute_pipelines.write().insert(pipeline))
    }

    fn destroy_compute_pipeline(&self, id: ComputePipelineId) {
        self.compute_pipelines.write().remove(id);
    }

    fn create_surface(&self, target: wgpu::SurfaceTarget<'static>) -> Result<SurfaceId> {
        let surface = self.instance.create_surface(target)?;
        Ok(self.surfaces.write().insert(SurfaceEntry {
            surface,
            config: None,
        }))
    }

    fn surface_format(&self, surface: SurfaceId) -> Result<wgpu::TextureFormat> {
        let surfaces = self.surfaces.read();
        let entry = lookup(&surfaces, surface, "Surface")?;
        entry
            .surface
            .get_capabilities(&self.adapter)
            .formats
            .first()
            .copied()
            .ok_or_else(|| {
                KitError::SurfaceUnavailable("surface not supported by adapter".to_string())
            })
    }

    fn configure_surface(&self, surface: SurfaceId, config: &SurfaceConfig) -> Result<()> {
        let mut surfaces = self.surfaces.write();
        let entry = surfaces.get_mut(surface).ok_or(KitError::NotSet("Surface"))?;

        let mut surface_config = entry
            .surface
            .get_default_config(&self.adapter, config.width, config.height)
            .ok_or_else(|| {
                KitError::SurfaceUnavailable("surface not supported by adapter".to_string())
            })?;
        surface_config.format = config.format;
        surface_config.present_mode = config.present_mode;

        entry.surface.configure(&self.device, &surface_config);
        entry.config = Some(surface_config);
        Ok(())
    }

    fn submit(&self, commands: &CommandBuffer) -> Result<()> {
        let surfaces = self.surfaces.read();
        let mut frames: FxHashMap<SurfaceId, (wgpu::SurfaceTexture, wgpu::TextureView)> =
            FxHashMap::default();
        for id in commands.surfaces() {
            let entry = lookup(&surfaces, id, "Surface")?;
            let frame = acquire_frame(entry, &self.device)?;
            let view = frame
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default());
            frames.insert(id, (frame, view));
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(&commands.label),
            });

        for pass in &commands.passes {
            match pass {
                PassRecord::Render(record) => self.encode_render_pass(&mut encoder, record, &frames)?,
                PassRecord::Compute(record) => self.encode_compute_pass(&mut encoder, record)?,
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));

        for (frame, view) in frames.into_values() {
            drop(view);
            frame.present();
        }
        Ok(())
    }
}

impl WgpuBackend {
    fn encode_render_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        record: &RenderPassRecord,
        frames: &FxHashMap<SurfaceId, (wgpu::SurfaceTexture, wgpu::TextureView)>,
    ) -> Result<()> {
        let textures = self.textures.read();
        let buffers = self.buffers.read();
        let bind_groups = self.bind_groups.read();
        let pipelines = self.render_pipelines.read();

        let resolve = |target: AttachmentTarget| -> Result<&wgpu::TextureView> {
            match target {
                AttachmentTarget::Texture(id) => Ok(&lookup(&textures, id, "Attachment texture")?.view),
                AttachmentTarget::Surface(id) => frames
                    .get(&id)
                    .map(|(_, view)| view)
                    .ok_or(KitError::NotSet("Surface frame")),
            }
        };

        let view = resolve(record.color.target)?;
        let resolve_target = record.color.resolve_target.map(resolve).transpose()?;

        let depth_stencil_attachment = match &record.depth_stencil {
            Some(attachment) => Some(wgpu::RenderPassDepthStencilAttachment {
                view: &lookup(&textures, attachment.texture, "Depth texture")?.view,
                depth_ops: attachment.depth_ops,
                stencil_ops: attachment.stencil_ops,
            }),
            None => None,
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&record.label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target,
                ops: wgpu::Operations {
                    load: record.color.load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment,
            ..Default::default()
        });

        for command in &record.commands {
            match command {
                RenderCommand::SetPipeline(id) => {
                    pass.set_pipeline(lookup(&pipelines, *id, "Render pipeline")?);
                }
                RenderCommand::SetBindGroup { index, group } => {
                    pass.set_bind_group(*index, lookup(&bind_groups, *group, "Bind group")?, &[]);
                }
                RenderCommand::SetVertexBuffer { slot, buffer } => {
                    let buffer = lookup(&buffers, *buffer, "Vertex buffer")?;
                    pass.set_vertex_buffer(*slot, buffer.slice(..));
                }
                RenderCommand::SetIndexBuffer { buffer, format } => {
                    let buffer = lookup(&buffers, *buffer, "Index buffer")?;
                    pass.set_index_buffer(buffer.slice(..), *format);
                }
                RenderCommand::Draw {
                    vertices,
                    instances,
                } => pass.draw(vertices.clone(), instances.clone()),
                RenderCommand::DrawIndexed {
                    indices,
                    base_vertex,
                    instances,
                } => pass.draw_indexed(indices.clone(), *base_vertex, instances.clone()),
            }
        }
        Ok(())
    }

    fn encode_compute_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        record: &ComputePassRecord,
    ) -> Result<()> {
        let bind_groups = self.bind_groups.read();
        let pipelines = self.compute_pipelines.read();

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(&record.label),
            timestamp_writes: None,
        });

        for command in &record.commands {
            match command {
                ComputeCommand::SetPipeline(id) => {
                    pass.set_pipeline(lookup(&pipelines, *id, "Compute pipeline")?);
                }
                ComputeCommand::SetBindGroup { index, group } => {
                    pass.set_bind_group(*index, lookup(&bind_groups, *group, "Bind group")?, &[]);
                }
                ComputeCommand::Dispatch { x, y, z } => pass.dispatch_workgroups(*x, *y, *z),
            }
        }
        Ok(())
    }
}
