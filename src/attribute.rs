//! Vertex attributes.

use crate::buffer::CpuBuffer;
use crate::errors::{KitError, Result};
use crate::label::Label;

#[derive(Debug, Clone, Default)]
pub struct AttributeOptions {
    pub label: Option<String>,
    /// Required.
    pub format: Option<wgpu::VertexFormat>,
    /// Required.
    pub shader_location: Option<u32>,
    /// Elements per item, e.g. 2 for a `vec2<f32>` position. Required.
    pub item_size: Option<usize>,
    /// Number of items. Required.
    pub item_count: Option<usize>,
    /// Required.
    pub data: Option<CpuBuffer>,
}

/// One named channel of per-vertex (or per-instance) data.
///
/// Attributes only hold CPU data; the owning
/// [`VertexAttributeObject`](crate::VertexAttributeObject) interleaves them
/// into a single GPU buffer.
#[derive(Debug, Clone)]
pub struct Attribute {
    label: Label,
    format: wgpu::VertexFormat,
    shader_location: u32,
    item_size: usize,
    item_count: usize,
    data: CpuBuffer,
}

impl Attribute {
    pub fn new(options: AttributeOptions) -> Result<Self> {
        let missing = |field| KitError::missing("Attribute", field);
        Ok(Self {
            label: options.label.into(),
            format: options.format.ok_or_else(|| missing("format"))?,
            shader_location: options
                .shader_location
                .ok_or_else(|| missing("shader_location"))?,
            item_size: options.item_size.ok_or_else(|| missing("item_size"))?,
            item_count: options.item_count.ok_or_else(|| missing("item_count"))?,
            data: options.data.ok_or_else(|| missing("data"))?,
        })
    }

    #[inline]
    #[must_use]
    pub fn label(&self) -> &Label {
        &self.label
    }

    #[inline]
    #[must_use]
    pub fn format(&self) -> wgpu::VertexFormat {
        self.format
    }

    #[inline]
    #[must_use]
    pub fn shader_location(&self) -> u32 {
        self.shader_location
    }

    #[inline]
    #[must_use]
    pub fn item_size(&self) -> usize {
        self.item_size
    }

    #[inline]
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.item_count
    }

    #[inline]
    #[must_use]
    pub fn data(&self) -> &CpuBuffer {
        &self.data
    }

    pub fn set_data(&mut self, data: impl Into<CpuBuffer>) {
        self.data = data.into();
    }

    /// Bytes one item occupies in an interleaved vertex.
    #[must_use]
    pub fn item_byte_size(&self) -> usize {
        self.item_size * self.data.bytes_per_element()
    }

    /// Raw bytes of item `index`.
    ///
    /// Callers check the length first with [`Attribute::ensure_items`].
    pub(crate) fn item_bytes(&self, index: usize) -> &[u8] {
        let size = self.item_byte_size();
        &self.data.as_bytes()[index * size..(index + 1) * size]
    }

    /// Fails unless the data covers `item_count` items.
    pub fn ensure_items(&self, item_count: usize) -> Result<()> {
        let expected = item_count * self.item_size;
        let actual = self.data.len();
        if actual < expected {
            return Err(KitError::AttributeTooShort {
                label: self.label.to_string(),
                expected,
                actual,
            });
        }
        Ok(())
    }
}
