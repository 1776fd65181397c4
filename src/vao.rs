//! Vertex Attribute Objects
//!
//! A [`VertexAttributeObject`] owns a set of [`Attribute`]s that share one
//! vertex buffer. Attributes are interleaved: item `i` of every attribute is
//! stored back to back, in insertion order, before item `i + 1`.
//!
//! ```text
//! attributes: position (2 x f32), color (3 x f32)
//! stride:     20 bytes
//! buffer:     [pos0 col0][pos1 col1][pos2 col2] ...
//! ```
//!
//! Every addition recomputes the layout, rebuilds the interleaved buffer and
//! uploads it, reallocating the GPU buffer when its size changed.

use crate::attribute::Attribute;
use crate::buffer::{BufferPair, BufferRole, CpuBuffer, GpuBuffer};
use crate::device::{DeviceContext, VertexBufferLayout};
use crate::errors::{KitError, Result};
use crate::label::Label;

#[derive(Debug, Default)]
pub struct VertexAttributeObjectOptions {
    pub label: Option<String>,
    /// Number of vertices (or instances) described. Required.
    pub item_count: Option<usize>,
    /// Defaults to [`wgpu::VertexStepMode::Vertex`].
    pub step_mode: Option<wgpu::VertexStepMode>,
    pub context: Option<DeviceContext>,
}

#[derive(Debug)]
pub struct VertexAttributeObject {
    label: Label,
    step_mode: wgpu::VertexStepMode,
    item_count: usize,
    attributes: Vec<Attribute>,
    layout: Option<VertexBufferLayout>,
    buffer: BufferPair,
    context: DeviceContext,
}

impl VertexAttributeObject {
    pub fn new(options: VertexAttributeObjectOptions) -> Result<Self> {
        let item_count = options
            .item_count
            .ok_or_else(|| KitError::missing("VertexAttributeObject", "item_count"))?;
        let label = Label::from(options.label);

        Ok(Self {
            buffer: BufferPair::new(label.clone(), BufferRole::Vertex, None),
            label,
            step_mode: options.step_mode.unwrap_or_default(),
            item_count,
            attributes: Vec::new(),
            layout: None,
            context: options.context.unwrap_or_else(DeviceContext::global),
        })
    }

    #[inline]
    #[must_use]
    pub fn label(&self) -> &Label {
        &self.label
    }

    #[inline]
    #[must_use]
    pub fn step_mode(&self) -> wgpu::VertexStepMode {
        self.step_mode
    }

    #[inline]
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.item_count
    }

    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// `None` until the first attribute is added.
    #[must_use]
    pub fn layout(&self) -> Option<&VertexBufferLayout> {
        self.layout.as_ref()
    }

    /// The interleaved data, `None` until the first attribute is added.
    #[must_use]
    pub fn cpu_buffer(&self) -> Option<&CpuBuffer> {
        self.buffer.cpu()
    }

    #[must_use]
    pub fn gpu_buffer(&self) -> Option<GpuBuffer> {
        self.buffer.gpu()
    }

    /// Appends `attribute`, which must describe exactly this VAO's item
    /// count, then rebuilds layout and buffer.
    pub fn add_attribute(&mut self, attribute: Attribute) -> Result<()> {
        attribute.ensure_items(self.item_count)?;
        if attribute.item_count() != self.item_count {
            return Err(KitError::AttributeItemCountMismatch {
                label: attribute.label().to_string(),
                expected: self.item_count,
                found: attribute.item_count(),
            });
        }
        self.attributes.push(attribute);
        self.update_layout();
        self.update_buffer()
    }

    pub fn add_attributes(&mut self, attributes: impl IntoIterator<Item = Attribute>) -> Result<()> {
        for attribute in attributes {
            self.add_attribute(attribute)?;
        }
        Ok(())
    }

    fn update_layout(&mut self) {
        let mut offset = 0u64;
        let attributes = self
            .attributes
            .iter()
            .map(|attribute| {
                let vertex_attribute = wgpu::VertexAttribute {
                    format: attribute.format(),
                    offset,
                    shader_location: attribute.shader_location(),
                };
                offset += attribute.item_byte_size() as u64;
                vertex_attribute
            })
            .collect();

        self.layout = Some(VertexBufferLayout {
            array_stride: offset,
            step_mode: self.step_mode,
            attributes,
        });
    }

    fn update_buffer(&mut self) -> Result<()> {
        self.buffer.set_cpu(self.interleave());
        let device = self.context.get_device()?;
        if self.buffer.update_gpu_buffer(device.as_ref())? {
            log::debug!("Allocated {} vertex buffer", self.label);
        }
        Ok(())
    }

    fn interleave(&self) -> CpuBuffer {
        let stride: usize = self.attributes.iter().map(Attribute::item_byte_size).sum();
        let mut bytes = Vec::with_capacity(stride * self.item_count);
        for item in 0..self.item_count {
            for attribute in &self.attributes {
                bytes.extend_from_slice(attribute.item_bytes(item));
            }
        }

        let mut kinds = self.attributes.iter().map(|a| a.data().kind());
        match kinds.next() {
            Some(kind) if kinds.all(|k| k == kind) => CpuBuffer::from_bytes(kind, &bytes),
            _ => CpuBuffer::U8(bytes),
        }
    }
}
