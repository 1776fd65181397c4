//! Texture samplers.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::device::{DeviceContext, SamplerDesc, SamplerId};
use crate::errors::{KitError, Result};
use crate::label::Label;

#[derive(Debug, Default)]
pub struct SamplerOptions {
    pub label: Option<String>,
    /// Required.
    pub binding: Option<u32>,
    /// Defaults to fragment.
    pub visibility: Option<wgpu::ShaderStages>,
    /// Defaults to linear filtering with repeat addressing.
    pub descriptor: Option<SamplerDesc>,
    pub context: Option<DeviceContext>,
}

#[derive(Debug)]
struct SamplerState {
    label: Label,
    desc: SamplerDesc,
    gpu: Option<SamplerId>,
}

/// A sampler shared between clones.
#[derive(Debug, Clone)]
pub struct Sampler {
    binding: u32,
    visibility: wgpu::ShaderStages,
    state: Arc<RwLock<SamplerState>>,
    context: DeviceContext,
}

impl Sampler {
    pub fn new(options: SamplerOptions) -> Result<Self> {
        let binding = options
            .binding
            .ok_or_else(|| KitError::missing("Sampler", "binding"))?;

        Ok(Self {
            binding,
            visibility: options.visibility.unwrap_or(wgpu::ShaderStages::FRAGMENT),
            state: Arc::new(RwLock::new(SamplerState {
                label: options.label.into(),
                desc: options.descriptor.unwrap_or_default(),
                gpu: None,
            })),
            context: options.context.unwrap_or_else(DeviceContext::global),
        })
    }

    #[inline]
    #[must_use]
    pub fn binding(&self) -> u32 {
        self.binding
    }

    #[inline]
    #[must_use]
    pub fn visibility(&self) -> wgpu::ShaderStages {
        self.visibility
    }

    #[must_use]
    pub fn with_binding(&self, binding: u32) -> Self {
        Self {
            binding,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn descriptor(&self) -> SamplerDesc {
        self.state.read().desc.clone()
    }

    #[must_use]
    pub fn gpu_sampler(&self) -> Option<SamplerId> {
        self.state.read().gpu
    }

    #[must_use]
    pub fn is_realized(&self) -> bool {
        self.gpu_sampler().is_some()
    }

    /// Creates a new GPU sampler, optionally from a new descriptor.
    pub fn update_sampler(&self, desc: Option<SamplerDesc>) -> Result<SamplerId> {
        let device = self.context.get_device()?;
        let mut state = self.state.write();
        if let Some(desc) = desc {
            state.desc = desc;
        }
        let id = device.create_sampler(&state.label.derive("Sampler"), &state.desc);
        state.gpu = Some(id);
        Ok(id)
    }

    #[must_use]
    pub fn layout_entry(&self) -> wgpu::BindGroupLayoutEntry {
        wgpu::BindGroupLayoutEntry {
            binding: self.binding,
            visibility: self.visibility,
            ty: wgpu::BindingType::Sampler(self.state.read().desc.binding_type()),
            count: None,
        }
    }
}
