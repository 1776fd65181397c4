//! Storage buffers.

use std::ops::Deref;

use crate::buffer::{BufferBinding, BufferBindingOptions, BufferRole, CpuBuffer};
use crate::device::DeviceContext;
use crate::errors::Result;

#[derive(Debug)]
pub struct StorageOptions {
    pub label: Option<String>,
    /// Required.
    pub binding: Option<u32>,
    /// Defaults to vertex | fragment | compute.
    pub visibility: Option<wgpu::ShaderStages>,
    /// Required.
    pub data: Option<CpuBuffer>,
    /// Bind as `read-only-storage`. Defaults to `true`; shaders that write
    /// the buffer need `false`.
    pub read_only: bool,
    pub context: Option<DeviceContext>,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            label: None,
            binding: None,
            visibility: None,
            data: None,
            read_only: true,
            context: None,
        }
    }
}

/// A storage buffer, read-only or read-write.
#[derive(Debug, Clone)]
pub struct Storage(BufferBinding);

impl Storage {
    pub fn new(options: StorageOptions) -> Result<Self> {
        let StorageOptions {
            label,
            binding,
            visibility,
            data,
            read_only,
            context,
        } = options;
        BufferBinding::new(
            "Storage",
            BufferRole::Storage { read_only },
            BufferBindingOptions {
                label,
                binding,
                visibility,
                data,
                context,
            },
        )
        .map(Self)
    }

    #[must_use]
    pub fn read_only(&self) -> bool {
        matches!(
            self.0.role(),
            BufferRole::Storage { read_only: true }
        )
    }

    #[must_use]
    pub fn with_binding(&self, binding: u32) -> Self {
        Self(self.0.with_binding(binding))
    }
}

impl Deref for Storage {
    type Target = BufferBinding;

    fn deref(&self) -> &BufferBinding {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::device::RecordingBackend;

    #[test]
    fn layout_entry_follows_access() {
        let backend = Arc::new(RecordingBackend::new());
        let ctx = DeviceContext::with_backend(backend);
        let cells = Storage::new(StorageOptions {
            binding: Some(2),
            visibility: Some(wgpu::ShaderStages::COMPUTE),
            data: Some(vec![0u32; 16].into()),
            read_only: false,
            context: Some(ctx),
            ..Default::default()
        })
        .unwrap();

        let entry = cells.layout_entry();
        assert_eq!(entry.binding, 2);
        assert_eq!(entry.visibility, wgpu::ShaderStages::COMPUTE);
        assert!(matches!(
            entry.ty,
            wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: false },
                ..
            }
        ));

        let alias = cells.with_binding(1);
        assert_eq!(alias.binding(), 1);
        assert!(alias.shares_buffer(&cells));
        assert!(!alias.read_only());
    }
}
