//! Uniform buffers.

use std::ops::Deref;

use crate::buffer::{BufferBinding, BufferBindingOptions, BufferRole};
use crate::errors::Result;

pub type UniformOptions = BufferBindingOptions;

/// A uniform buffer bound at a fixed binding number.
///
/// Clones share the buffer. Use [`BufferBinding::with_binding`] to expose the
/// same buffer at another binding in a second bind group.
#[derive(Debug, Clone)]
pub struct Uniform(BufferBinding);

impl Uniform {
    /// Requires `binding` and `data`. The GPU buffer is created on first
    /// upload, which happens at the latest when a bind group realizes it.
    pub fn new(options: UniformOptions) -> Result<Self> {
        BufferBinding::new("Uniform", BufferRole::Uniform, options).map(Self)
    }

    #[must_use]
    pub fn with_binding(&self, binding: u32) -> Self {
        Self(self.0.with_binding(binding))
    }
}

impl Deref for Uniform {
    type Target = BufferBinding;

    fn deref(&self) -> &BufferBinding {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::device::{DeviceContext, RecordingBackend};
    use crate::errors::KitError;

    #[test]
    fn requires_binding_and_data() {
        let err = Uniform::new(UniformOptions {
            data: Some(vec![0.0f32; 4].into()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(
            err,
            KitError::MissingField {
                resource: "Uniform",
                field: "binding"
            }
        ));
    }

    #[test]
    fn typed_update_uploads() {
        let backend = Arc::new(RecordingBackend::new());
        let uniform = Uniform::new(UniformOptions {
            label: Some("time".into()),
            binding: Some(0),
            data: Some(vec![0.0f32].into()),
            context: Some(DeviceContext::with_backend(backend.clone())),
            ..Default::default()
        })
        .unwrap();

        assert!(uniform.gpu_buffer().is_none());
        uniform.update::<f32>(|v| v[0] = 2.5).unwrap();

        let gpu = uniform.gpu_buffer().unwrap();
        assert_eq!(
            backend.buffer_contents(gpu.id).unwrap(),
            2.5f32.to_le_bytes().to_vec()
        );
        assert_eq!(
            backend.buffer(gpu.id).unwrap().desc.usage,
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST
        );
        assert!(uniform.update::<u32>(|_| {}).is_err());
    }
}
