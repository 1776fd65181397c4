//! Bindable Resource Tests
//!
//! Tests for:
//! - Uniform / Storage: realization, reallocation identity, usage flags, typed updates
//! - Texture / Sampler: upload, mip chain upload, layout entries
//! - BindGroup: layout completeness, supplied layouts, stale-binding refresh

use std::sync::Arc;

use wgpu_kit::device::BoundResource;
use wgpu_kit::{
    BindGroup, BindGroupOptions, BufferRole, DeviceContext, KitError, RecordingBackend, Sampler,
    SamplerOptions, Storage, StorageOptions, Texture, TextureOptions, Uniform, UniformOptions,
};

fn setup() -> (Arc<RecordingBackend>, DeviceContext) {
    let backend = Arc::new(RecordingBackend::new());
    let ctx = DeviceContext::with_backend(backend.clone());
    (backend, ctx)
}

fn uniform(ctx: &DeviceContext, binding: u32, data: Vec<f32>) -> Uniform {
    Uniform::new(UniformOptions {
        label: Some("Params".into()),
        binding: Some(binding),
        visibility: Some(wgpu::ShaderStages::VERTEX),
        data: Some(data.into()),
        context: Some(ctx.clone()),
    })
    .unwrap()
}

fn storage(ctx: &DeviceContext, binding: u32, read_only: bool) -> Storage {
    Storage::new(StorageOptions {
        label: Some("Cells".into()),
        binding: Some(binding),
        visibility: Some(wgpu::ShaderStages::COMPUTE),
        data: Some(vec![0u32; 16].into()),
        read_only,
        context: Some(ctx.clone()),
    })
    .unwrap()
}

fn texture(ctx: &DeviceContext, binding: u32) -> Texture {
    Texture::new(TextureOptions {
        label: Some("Checker".into()),
        binding: Some(binding),
        width: Some(2),
        height: Some(2),
        data: Some([255u8, 0, 0, 255].repeat(4)),
        context: Some(ctx.clone()),
        ..Default::default()
    })
    .unwrap()
}

fn sampler(ctx: &DeviceContext, binding: u32) -> Sampler {
    Sampler::new(SamplerOptions {
        binding: Some(binding),
        context: Some(ctx.clone()),
        ..Default::default()
    })
    .unwrap()
}

fn bind_group(ctx: &DeviceContext, index: u32) -> BindGroup {
    BindGroup::new(BindGroupOptions {
        label: Some(format!("Group {index}")),
        index: Some(index),
        context: Some(ctx.clone()),
        ..Default::default()
    })
}

// ============================================================================
// Buffer Binding Tests
// ============================================================================

#[test]
fn same_size_update_keeps_the_gpu_buffer() {
    let (backend, ctx) = setup();
    let u = uniform(&ctx, 0, vec![0.0; 4]);
    assert!(!u.is_realized());
    assert!(u.update_gpu_buffer().unwrap());
    let first = u.gpu_buffer().unwrap();

    assert!(!u.set_cpu_buffer(vec![1.0f32, 2.0, 3.0, 4.0]).unwrap());
    assert_eq!(u.gpu_buffer().unwrap(), first);
    assert_eq!(
        backend.buffer_contents(first.id).unwrap(),
        bytemuck::cast_slice::<f32, u8>(&[1.0, 2.0, 3.0, 4.0])
    );
    assert_eq!(backend.stats().buffers_created, 1);
}

#[test]
fn size_change_reallocates_the_gpu_buffer() {
    let (backend, ctx) = setup();
    let u = uniform(&ctx, 0, vec![0.0; 4]);
    u.update_gpu_buffer().unwrap();
    let first = u.gpu_buffer().unwrap();

    assert!(u.set_cpu_buffer(vec![0.0f32; 8]).unwrap());
    let second = u.gpu_buffer().unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(second.size, 32);
    assert!(backend.buffer(first.id).is_none());
    assert_eq!(backend.stats().buffers_destroyed, 1);
}

#[test]
fn byte_length_change_within_alignment_reallocates() {
    let (backend, ctx) = setup();
    let u = Uniform::new(UniformOptions {
        binding: Some(0),
        data: Some(vec![1u16, 2, 3].into()),
        context: Some(ctx.clone()),
        ..Default::default()
    })
    .unwrap();
    u.update_gpu_buffer().unwrap();
    let first = u.gpu_buffer().unwrap();
    assert_eq!((first.size, first.byte_len), (8, 6));

    assert!(u.set_cpu_buffer(vec![1u16, 2, 3, 4]).unwrap());
    let second = u.gpu_buffer().unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!((second.size, second.byte_len), (8, 8));
    assert!(backend.buffer(first.id).is_none());
    assert_eq!(
        backend.buffer_contents(second.id).unwrap(),
        bytemuck::cast_slice::<u16, u8>(&[1, 2, 3, 4])
    );
}

#[test]
fn usage_follows_role() {
    let (backend, ctx) = setup();
    let u = uniform(&ctx, 0, vec![0.0; 4]);
    let s = storage(&ctx, 1, false);
    u.update_gpu_buffer().unwrap();
    s.update_gpu_buffer().unwrap();

    let uniform_usage = backend.buffer(u.gpu_buffer().unwrap().id).unwrap().desc.usage;
    assert_eq!(
        uniform_usage,
        wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST
    );
    let storage_usage = backend.buffer(s.gpu_buffer().unwrap().id).unwrap().desc.usage;
    assert!(storage_usage.contains(wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST));
    assert_eq!(s.role(), BufferRole::Storage { read_only: false });
    assert!(!s.read_only());
}

#[test]
fn storage_is_read_only_by_default() {
    let (_, ctx) = setup();
    let s = Storage::new(StorageOptions {
        binding: Some(0),
        data: Some(vec![1.0f32].into()),
        context: Some(ctx),
        ..Default::default()
    })
    .unwrap();
    assert!(s.read_only());
    assert!(matches!(
        s.layout_entry().ty,
        wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            ..
        }
    ));
}

#[test]
fn typed_update_writes_through() {
    let (backend, ctx) = setup();
    let u = uniform(&ctx, 0, vec![0.0; 2]);
    u.update_gpu_buffer().unwrap();

    u.update::<f32>(|values| values[1] = 5.0).unwrap();
    assert_eq!(u.read::<f32, _>(|values| values.to_vec()).unwrap(), vec![0.0, 5.0]);
    let id = u.gpu_buffer().unwrap().id;
    assert_eq!(
        backend.buffer_contents(id).unwrap(),
        bytemuck::cast_slice::<f32, u8>(&[0.0, 5.0])
    );

    assert!(matches!(
        u.update::<u32>(|_| {}),
        Err(KitError::ElementKindMismatch { .. })
    ));
}

#[test]
fn with_binding_shares_the_buffer() {
    let (_, ctx) = setup();
    let s = storage(&ctx, 0, false);
    let other = s.with_binding(3);
    assert_eq!(other.binding(), 3);
    assert!(s.shares_buffer(&other));

    other.update_gpu_buffer().unwrap();
    assert!(s.is_realized());
    assert_eq!(s.gpu_buffer(), other.gpu_buffer());
}

#[test]
fn missing_data_is_reported() {
    let (_, ctx) = setup();
    let err = Storage::new(StorageOptions {
        binding: Some(0),
        context: Some(ctx),
        ..Default::default()
    })
    .unwrap_err();
    assert_eq!(err.to_string(), "Storage data is not set");
}

// ============================================================================
// Texture & Sampler Tests
// ============================================================================

#[test]
fn texture_upload_creates_sized_texture() {
    let (backend, ctx) = setup();
    let t = texture(&ctx, 1);
    assert!(t.update_texture().unwrap());

    let gpu = t.gpu_texture().unwrap();
    let recorded = backend.texture(gpu.id).unwrap();
    assert_eq!((recorded.desc.width, recorded.desc.height), (2, 2));
    assert!(recorded.desc.usage.contains(
        wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST
    ));
    assert_eq!(recorded.writes.len(), 1);
    assert_eq!(recorded.writes[0].bytes_per_row, 8);

    // Unchanged shape: same texture, new write.
    assert!(!t.update_texture().unwrap());
    assert_eq!(t.gpu_texture().unwrap().id, gpu.id);
}

#[test]
fn texture_data_must_match_its_size() {
    let (_, ctx) = setup();
    let t = texture(&ctx, 0);
    assert!(matches!(
        t.set_cpu_buffer(vec![0u8; 15]),
        Err(KitError::TextureDataSize {
            expected: 16,
            actual: 15
        })
    ));
}

#[test]
fn mip_maps_are_uploaded_per_level() {
    let (backend, ctx) = setup();
    let t = Texture::new(TextureOptions {
        binding: Some(0),
        width: Some(8),
        height: Some(4),
        data: Some(vec![128u8; 8 * 4 * 4]),
        context: Some(ctx),
        ..Default::default()
    })
    .unwrap();
    t.generate_mip_maps().unwrap();
    let sizes: Vec<_> = t.mip_levels().iter().map(|l| (l.width, l.height)).collect();
    assert_eq!(sizes, vec![(4, 2), (2, 1)]);

    let gpu = t.gpu_texture().unwrap();
    assert_eq!(gpu.mip_level_count, 3);
    let levels: Vec<u32> = backend
        .texture(gpu.id)
        .unwrap()
        .writes
        .iter()
        .map(|w| w.mip_level)
        .collect();
    assert_eq!(levels, vec![0, 1, 2]);
}

#[test]
fn sampler_defaults_to_linear_repeat() {
    let (backend, ctx) = setup();
    let s = sampler(&ctx, 0);
    let id = s.update_sampler(None).unwrap();
    let desc = backend.sampler(id).unwrap();
    assert_eq!(desc.mag_filter, wgpu::FilterMode::Linear);
    assert_eq!(desc.address_mode_u, wgpu::AddressMode::Repeat);
    assert_eq!(desc.address_mode_w, wgpu::AddressMode::Repeat);
    assert!(matches!(
        s.layout_entry().ty,
        wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
    ));
}

// ============================================================================
// BindGroup Tests
// ============================================================================

#[test]
fn layout_has_one_entry_per_member() {
    let (backend, ctx) = setup();
    let mut group = bind_group(&ctx, 0);
    group.add_uniforms([uniform(&ctx, 0, vec![0.0; 4])]).unwrap();
    group.add_storages([storage(&ctx, 1, true)]).unwrap();
    group.add_textures([texture(&ctx, 2)]).unwrap();
    group.add_samplers([sampler(&ctx, 3)]).unwrap();

    let layout = group.layout().unwrap();
    let entries = backend.bind_group_layout_entries(layout).unwrap();
    let summary: Vec<_> = entries.iter().map(|e| (e.binding, e.visibility)).collect();
    assert_eq!(
        summary,
        vec![
            (0, wgpu::ShaderStages::VERTEX),
            (1, wgpu::ShaderStages::COMPUTE),
            (2, wgpu::ShaderStages::FRAGMENT),
            (3, wgpu::ShaderStages::FRAGMENT),
        ]
    );
    assert!(matches!(
        entries[0].ty,
        wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            ..
        }
    ));
    assert!(matches!(entries[2].ty, wgpu::BindingType::Texture { .. }));

    let recorded = backend.bind_group(group.group().unwrap()).unwrap();
    assert_eq!(recorded.layout, layout);
    assert_eq!(recorded.entries.len(), 4);
    assert!(matches!(recorded.entries[0].resource, BoundResource::Buffer(_)));
    assert!(matches!(recorded.entries[2].resource, BoundResource::Texture(_)));
    assert!(matches!(recorded.entries[3].resource, BoundResource::Sampler(_)));
}

#[test]
fn adding_members_realizes_them() {
    let (_, ctx) = setup();
    let u = uniform(&ctx, 0, vec![0.0; 4]);
    let t = texture(&ctx, 1);
    let mut group = bind_group(&ctx, 0);
    group.add_uniforms([u.clone()]).unwrap();
    group.add_textures([t.clone()]).unwrap();
    assert!(u.is_realized());
    assert!(t.is_realized());
    assert!(group.is_realized());
}

#[test]
fn supplied_layout_is_reported_and_reused() {
    let (backend, ctx) = setup();
    let a = storage(&ctx, 0, false);
    let b = storage(&ctx, 1, false);

    let mut first = bind_group(&ctx, 0);
    first.add_storages([a.clone(), b.clone()]).unwrap();
    let layout = first.layout().unwrap();

    let mut second = BindGroup::new(BindGroupOptions {
        index: Some(0),
        layout: Some(layout),
        context: Some(ctx.clone()),
        ..Default::default()
    });
    second
        .add_storages([b.with_binding(0), a.with_binding(1)])
        .unwrap();

    assert_eq!(second.layout(), Some(layout));
    let recorded = backend.bind_group(second.group().unwrap()).unwrap();
    assert_eq!(recorded.layout, layout);
    let resources: Vec<_> = recorded.entries.iter().map(|e| e.resource).collect();
    assert_eq!(
        resources,
        vec![
            BoundResource::Buffer(b.gpu_buffer().unwrap().id),
            BoundResource::Buffer(a.gpu_buffer().unwrap().id),
        ]
    );
}

#[test]
fn refresh_rebuilds_after_member_reallocation() {
    let (backend, ctx) = setup();
    let u = uniform(&ctx, 0, vec![0.0; 4]);
    let mut group = bind_group(&ctx, 0);
    group.add_uniforms([u.clone()]).unwrap();
    let before = group.group().unwrap();

    assert!(!group.refresh().unwrap());

    u.set_cpu_buffer(vec![0.0f32; 16]).unwrap();
    assert!(group.refresh().unwrap());
    let after = group.group().unwrap();
    assert_ne!(before, after);
    let recorded = backend.bind_group(after).unwrap();
    assert_eq!(
        recorded.entries[0].resource,
        BoundResource::Buffer(u.gpu_buffer().unwrap().id)
    );
    assert!(!group.refresh().unwrap());
}

#[test]
fn repeated_refreshes_keep_one_live_bind_group() {
    let (backend, ctx) = setup();
    let u = uniform(&ctx, 0, vec![0.0; 4]);
    let mut group = bind_group(&ctx, 0);
    group.add_uniforms([u.clone()]).unwrap();
    let layout = group.layout().unwrap();

    for len in 5..105 {
        u.set_cpu_buffer(vec![0.0f32; len]).unwrap();
        assert!(group.refresh().unwrap());
    }

    let stats = backend.stats();
    assert_eq!(stats.bind_groups_created, 101);
    assert_eq!(stats.bind_groups_destroyed, 100);
    assert_eq!(backend.live_bind_groups(), 1);
    assert_eq!(backend.live_bind_group_layouts(), 1);
    assert_eq!(group.layout(), Some(layout));
}

#[test]
fn additions_replace_the_generated_layout() {
    let (backend, ctx) = setup();
    let mut group = bind_group(&ctx, 0);
    group.add_uniforms([uniform(&ctx, 0, vec![0.0; 4])]).unwrap();
    let first = group.layout().unwrap();

    group.add_storages([storage(&ctx, 1, true)]).unwrap();
    assert_ne!(group.layout(), Some(first));
    assert!(backend.bind_group_layout_entries(first).is_none());
    assert_eq!(backend.live_bind_group_layouts(), 1);
    assert_eq!(backend.live_bind_groups(), 1);

    group.release();
    assert!(group.group().is_none());
    assert_eq!(backend.live_bind_group_layouts(), 0);
    assert_eq!(backend.live_bind_groups(), 0);
}

#[test]
fn supplied_layout_survives_rebuilds_and_release() {
    let (backend, ctx) = setup();
    let mut owner = bind_group(&ctx, 0);
    owner.add_storages([storage(&ctx, 0, true)]).unwrap();
    let layout = owner.layout().unwrap();

    let mut borrower = BindGroup::new(BindGroupOptions {
        layout: Some(layout),
        context: Some(ctx.clone()),
        ..Default::default()
    });
    borrower.add_storages([storage(&ctx, 0, true)]).unwrap();
    borrower.update_bind_group().unwrap();
    borrower.release();

    assert!(backend.bind_group_layout_entries(layout).is_some());
    assert_eq!(backend.live_bind_groups(), 1);
}
