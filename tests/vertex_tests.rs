//! Vertex Data Tests
//!
//! Tests for:
//! - VertexAttributeObject: stride/offset derivation, interleaving, GPU upload
//! - Attribute: required options, too-short data
//! - IndexBuffer: index format selection, draw range, element kind checks

use std::sync::Arc;

use wgpu_kit::{
    Attribute, AttributeOptions, CpuBuffer, DeviceContext, ElementKind, IndexBuffer,
    IndexBufferOptions, KitError, RecordingBackend, VertexAttributeObject,
    VertexAttributeObjectOptions,
};

fn setup() -> (Arc<RecordingBackend>, DeviceContext) {
    let backend = Arc::new(RecordingBackend::new());
    let ctx = DeviceContext::with_backend(backend.clone());
    (backend, ctx)
}

fn float_attribute(location: u32, item_size: usize, data: Vec<f32>) -> Attribute {
    let format = match item_size {
        2 => wgpu::VertexFormat::Float32x2,
        3 => wgpu::VertexFormat::Float32x3,
        _ => wgpu::VertexFormat::Float32x4,
    };
    Attribute::new(AttributeOptions {
        label: Some(format!("attr{location}")),
        format: Some(format),
        shader_location: Some(location),
        item_size: Some(item_size),
        item_count: Some(data.len() / item_size),
        data: Some(data.into()),
    })
    .unwrap()
}

fn vao(ctx: &DeviceContext, item_count: usize) -> VertexAttributeObject {
    VertexAttributeObject::new(VertexAttributeObjectOptions {
        label: Some("Triangle".into()),
        item_count: Some(item_count),
        context: Some(ctx.clone()),
        ..Default::default()
    })
    .unwrap()
}

const POSITIONS: [f32; 6] = [-1.0, -1.0, 0.0, 1.0, 1.0, -1.0];
const COLORS: [f32; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

// ============================================================================
// Layout Tests
// ============================================================================

#[test]
fn stride_and_offsets_accumulate_in_insertion_order() {
    let (_, ctx) = setup();
    let mut vao = vao(&ctx, 3);
    vao.add_attribute(float_attribute(0, 2, POSITIONS.to_vec()))
        .unwrap();
    vao.add_attribute(float_attribute(1, 3, COLORS.to_vec()))
        .unwrap();

    let layout = vao.layout().unwrap();
    assert_eq!(layout.array_stride, 20);
    assert_eq!(layout.step_mode, wgpu::VertexStepMode::Vertex);
    let offsets: Vec<u64> = layout.attributes.iter().map(|a| a.offset).collect();
    assert_eq!(offsets, vec![0, 8]);
    let locations: Vec<u32> = layout
        .attributes
        .iter()
        .map(|a| a.shader_location)
        .collect();
    assert_eq!(locations, vec![0, 1]);
}

#[test]
fn empty_vao_has_no_layout_or_buffer() {
    let (backend, ctx) = setup();
    let vao = vao(&ctx, 3);
    assert!(vao.layout().is_none());
    assert!(vao.cpu_buffer().is_none());
    assert!(vao.gpu_buffer().is_none());
    assert_eq!(backend.stats().buffers_created, 0);
}

#[test]
fn instance_step_mode_is_kept() {
    let (_, ctx) = setup();
    let mut vao = VertexAttributeObject::new(VertexAttributeObjectOptions {
        item_count: Some(2),
        step_mode: Some(wgpu::VertexStepMode::Instance),
        context: Some(ctx),
        ..Default::default()
    })
    .unwrap();
    vao.add_attribute(float_attribute(2, 2, vec![0.0, 0.0, 1.0, 1.0]))
        .unwrap();
    assert_eq!(
        vao.layout().unwrap().step_mode,
        wgpu::VertexStepMode::Instance
    );
}

// ============================================================================
// Interleaving Tests
// ============================================================================

#[test]
fn interleaves_attributes_per_item() {
    let (backend, ctx) = setup();
    let mut vao = vao(&ctx, 3);
    vao.add_attributes([
        float_attribute(0, 2, POSITIONS.to_vec()),
        float_attribute(1, 3, COLORS.to_vec()),
    ])
    .unwrap();

    let expected: [f32; 15] = [
        -1.0, -1.0, 1.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 1.0, 0.0, //
        1.0, -1.0, 0.0, 0.0, 1.0,
    ];
    let cpu = vao.cpu_buffer().unwrap();
    assert_eq!(cpu.kind(), ElementKind::F32);
    assert_eq!(cpu.as_slice::<f32>().unwrap(), &expected);

    let gpu = vao.gpu_buffer().unwrap();
    assert_eq!(gpu.size, 60);
    assert_eq!(
        backend.buffer_contents(gpu.id).unwrap(),
        bytemuck::cast_slice::<f32, u8>(&expected)
    );
    let desc = backend.buffer(gpu.id).unwrap().desc;
    assert!(desc.usage.contains(wgpu::BufferUsages::VERTEX));
    assert!(desc.usage.contains(wgpu::BufferUsages::COPY_DST));
}

#[test]
fn each_addition_rebuilds_the_buffer() {
    let (backend, ctx) = setup();
    let mut vao = vao(&ctx, 3);
    vao.add_attribute(float_attribute(0, 2, POSITIONS.to_vec()))
        .unwrap();
    let first = vao.gpu_buffer().unwrap();
    assert_eq!(first.size, 24);

    vao.add_attribute(float_attribute(1, 3, COLORS.to_vec()))
        .unwrap();
    let second = vao.gpu_buffer().unwrap();
    assert_ne!(first.id, second.id);
    assert!(backend.buffer(first.id).is_none());
    assert_eq!(backend.live_buffers(), 1);
}

#[test]
fn mixed_element_kinds_interleave_as_bytes() {
    let (_, ctx) = setup();
    let mut vao = vao(&ctx, 2);
    vao.add_attribute(float_attribute(0, 2, vec![1.0, 2.0, 3.0, 4.0]))
        .unwrap();
    vao.add_attribute(
        Attribute::new(AttributeOptions {
            format: Some(wgpu::VertexFormat::Uint32),
            shader_location: Some(1),
            item_size: Some(1),
            item_count: Some(2),
            data: Some(vec![7u32, 9].into()),
            ..Default::default()
        })
        .unwrap(),
    )
    .unwrap();

    let cpu = vao.cpu_buffer().unwrap();
    assert_eq!(cpu.kind(), ElementKind::U8);
    assert_eq!(cpu.byte_len(), 24);
    assert_eq!(vao.layout().unwrap().array_stride, 12);
    let second_item = &cpu.as_bytes()[12..24];
    assert_eq!(&second_item[8..12], &9u32.to_ne_bytes());
}

// ============================================================================
// Attribute Tests
// ============================================================================

#[test]
fn attribute_requires_its_options() {
    let err = Attribute::new(AttributeOptions {
        format: Some(wgpu::VertexFormat::Float32x2),
        ..Default::default()
    })
    .unwrap_err();
    assert!(matches!(
        err,
        KitError::MissingField {
            resource: "Attribute",
            field: "shader_location"
        }
    ));
}

#[test]
fn short_attribute_is_rejected() {
    let (_, ctx) = setup();
    let mut vao = vao(&ctx, 4);
    let err = vao
        .add_attribute(float_attribute(0, 2, POSITIONS.to_vec()))
        .unwrap_err();
    assert!(matches!(
        err,
        KitError::AttributeTooShort {
            expected: 8,
            actual: 6,
            ..
        }
    ));
    assert!(vao.attributes().is_empty());
}

#[test]
fn attribute_item_count_must_match_the_vao() {
    let (_, ctx) = setup();
    let mut vao = vao(&ctx, 2);
    let err = vao
        .add_attribute(float_attribute(0, 2, POSITIONS.to_vec()))
        .unwrap_err();
    assert!(matches!(
        err,
        KitError::AttributeItemCountMismatch {
            expected: 2,
            found: 3,
            ..
        }
    ));
    assert!(vao.attributes().is_empty());
    assert!(vao.gpu_buffer().is_none());
}

// ============================================================================
// IndexBuffer Tests
// ============================================================================

fn indices(ctx: &DeviceContext, data: impl Into<CpuBuffer>) -> wgpu_kit::Result<IndexBuffer> {
    IndexBuffer::new(IndexBufferOptions {
        data: Some(data.into()),
        context: Some(ctx.clone()),
        ..Default::default()
    })
}

#[test]
fn index_format_follows_element_kind() {
    let (_, ctx) = setup();
    assert_eq!(
        indices(&ctx, vec![0u32, 1, 2]).unwrap().index_format(),
        wgpu::IndexFormat::Uint32
    );
    assert_eq!(
        indices(&ctx, vec![0u16, 1, 2]).unwrap().index_format(),
        wgpu::IndexFormat::Uint16
    );
    assert!(matches!(
        indices(&ctx, vec![0i32, 1, 2]),
        Err(KitError::InvalidIndexKind(ElementKind::I32))
    ));
}

#[test]
fn index_upload_is_padded_to_copy_alignment() {
    let (backend, ctx) = setup();
    let mut index = indices(&ctx, vec![0u16, 1, 2]).unwrap();
    assert!(index.gpu_buffer().is_none());
    assert!(index.update_gpu_buffer().unwrap());

    let gpu = index.gpu_buffer().unwrap();
    assert_eq!(gpu.size, 8);
    let contents = backend.buffer_contents(gpu.id).unwrap();
    assert_eq!(&contents[..6], bytemuck::cast_slice::<u16, u8>(&[0, 1, 2]));
    assert_eq!(&contents[6..], &[0, 0]);
}

#[test]
fn draw_range_runs_from_first_index_to_end() {
    let (_, ctx) = setup();
    let mut index = indices(&ctx, vec![0u16, 1, 2, 2, 1, 3]).unwrap();
    index.set_first_index(Some(3));
    assert_eq!(index.draw_range(), 3..6);

    index.set_index_count(Some(2));
    assert_eq!(index.draw_range(), 3..5);
}
