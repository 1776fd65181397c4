//! Index buffers for indexed drawing.

use std::ops::Range;

use crate::buffer::{BufferPair, BufferRole, CpuBuffer, ElementKind, GpuBuffer};
use crate::device::DeviceContext;
use crate::errors::{KitError, Result};
use crate::label::Label;

#[derive(Debug, Default)]
pub struct IndexBufferOptions {
    pub label: Option<String>,
    /// `u16` or `u32` indices. Required.
    pub data: Option<CpuBuffer>,
    /// Indices drawn per instance. Defaults to the whole array.
    pub index_count: Option<u32>,
    /// First index drawn. Defaults to 0.
    pub first_index: Option<u32>,
    /// Added to every index before fetching a vertex. Defaults to 0.
    pub base_vertex: Option<i32>,
    pub context: Option<DeviceContext>,
}

#[derive(Debug)]
pub struct IndexBuffer {
    buffer: BufferPair,
    index_count: Option<u32>,
    first_index: Option<u32>,
    base_vertex: Option<i32>,
    context: DeviceContext,
}

fn check_kind(data: &CpuBuffer) -> Result<()> {
    match data.kind() {
        ElementKind::U16 | ElementKind::U32 => Ok(()),
        other => Err(KitError::InvalidIndexKind(other)),
    }
}

impl IndexBuffer {
    pub fn new(options: IndexBufferOptions) -> Result<Self> {
        let data = options
            .data
            .ok_or_else(|| KitError::missing("IndexBuffer", "data"))?;
        check_kind(&data)?;

        Ok(Self {
            buffer: BufferPair::new(Label::from(options.label), BufferRole::Index, Some(data)),
            index_count: options.index_count,
            first_index: options.first_index,
            base_vertex: options.base_vertex,
            context: options.context.unwrap_or_else(DeviceContext::global),
        })
    }

    #[must_use]
    pub fn label(&self) -> &Label {
        self.buffer.label()
    }

    /// `Uint32` for `u32` data, otherwise `Uint16`.
    #[must_use]
    pub fn index_format(&self) -> wgpu::IndexFormat {
        match self.buffer.cpu().map(CpuBuffer::kind) {
            Some(ElementKind::U32) => wgpu::IndexFormat::Uint32,
            _ => wgpu::IndexFormat::Uint16,
        }
    }

    /// Number of indices held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.cpu().map_or(0, CpuBuffer::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index range of one indexed draw. Without an explicit count it runs
    /// from the first index to the end of the array. The end saturates at
    /// `u32::MAX`.
    #[must_use]
    pub fn draw_range(&self) -> Range<u32> {
        let first = self.first_index.unwrap_or(0);
        let count = self
            .index_count
            .unwrap_or_else(|| (self.len() as u32).saturating_sub(first));
        first..first.saturating_add(count)
    }

    #[must_use]
    pub fn base_vertex(&self) -> i32 {
        self.base_vertex.unwrap_or(0)
    }

    pub fn set_index_count(&mut self, count: Option<u32>) {
        self.index_count = count;
    }

    pub fn set_first_index(&mut self, first: Option<u32>) {
        self.first_index = first;
    }

    pub fn set_base_vertex(&mut self, base: Option<i32>) {
        self.base_vertex = base;
    }

    #[must_use]
    pub fn gpu_buffer(&self) -> Option<GpuBuffer> {
        self.buffer.gpu()
    }

    #[must_use]
    pub fn cpu_buffer(&self) -> Option<&CpuBuffer> {
        self.buffer.cpu()
    }

    /// Replaces the indices and uploads them.
    pub fn set_cpu_buffer(&mut self, data: impl Into<CpuBuffer>) -> Result<bool> {
        let data = data.into();
        check_kind(&data)?;
        self.buffer.set_cpu(data);
        self.update_gpu_buffer()
    }

    pub fn update_gpu_buffer(&mut self) -> Result<bool> {
        let device = self.context.get_device()?;
        self.buffer.update_gpu_buffer(device.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::device::RecordingBackend;

    fn index_buffer(data: impl Into<CpuBuffer>) -> Result<IndexBuffer> {
        IndexBuffer::new(IndexBufferOptions {
            data: Some(data.into()),
            context: Some(DeviceContext::with_backend(Arc::new(RecordingBackend::new()))),
            ..Default::default()
        })
    }

    #[test]
    fn format_follows_element_kind() {
        assert_eq!(
            index_buffer(vec![0u32, 1, 2]).unwrap().index_format(),
            wgpu::IndexFormat::Uint32
        );
        assert_eq!(
            index_buffer(vec![0u16, 1, 2]).unwrap().index_format(),
            wgpu::IndexFormat::Uint16
        );
        assert!(matches!(
            index_buffer(vec![0.0f32]),
            Err(KitError::InvalidIndexKind(ElementKind::F32))
        ));
    }

    #[test]
    fn draw_range_defaults_to_whole_array() {
        let mut indices = index_buffer(vec![0u16, 1, 2, 2, 3, 0]).unwrap();
        assert_eq!(indices.draw_range(), 0..6);

        indices.set_first_index(Some(3));
        indices.set_index_count(Some(3));
        assert_eq!(indices.draw_range(), 3..6);
    }

    #[test]
    fn draw_range_end_saturates() {
        let mut indices = index_buffer(vec![0u16, 1, 2]).unwrap();
        indices.set_first_index(Some(u32::MAX - 1));
        indices.set_index_count(Some(4));
        assert_eq!(indices.draw_range(), u32::MAX - 1..u32::MAX);
    }
}
