//! Bind Groups
//!
//! A [`BindGroup`] collects uniforms, storage buffers, textures and samplers
//! and derives both its layout and the GPU bind group from them. Members are
//! walked in a fixed order (uniforms, storages, textures, samplers), each
//! contributing one layout entry and one bind group entry at its own binding
//! number.
//!
//! Any addition rebuilds layout and group in full, destroying the ones they
//! replace. The group also remembers which GPU objects it was built against,
//! so that a member reallocated later (e.g. a uniform whose size changed) is
//! picked up by [`BindGroup::refresh`] before the group is bound again. A
//! refresh keeps the layout, so groups sharing it stay interchangeable.
//!
//! # Shared layouts
//!
//! Ping-pong setups need two groups that are interchangeable in one pipeline.
//! Build the first, then construct the second with
//! [`BindGroupOptions::layout`] set to the first group's layout.

use crate::device::{
    BindGroupEntry, BindGroupId, BindGroupLayoutId, BoundResource, DeviceContext,
};
use crate::errors::{KitError, Result};
use crate::label::Label;
use crate::sampler::Sampler;
use crate::storage::Storage;
use crate::texture::Texture;
use crate::uniform::Uniform;

#[derive(Debug, Default)]
pub struct BindGroupOptions {
    pub label: Option<String>,
    /// The `@group(n)` index. Defaults to 0.
    pub index: Option<u32>,
    /// Build against this layout instead of a generated one.
    pub layout: Option<BindGroupLayoutId>,
    pub context: Option<DeviceContext>,
}

#[derive(Debug)]
pub struct BindGroup {
    label: Label,
    index: u32,
    uniforms: Vec<Uniform>,
    storages: Vec<Storage>,
    textures: Vec<Texture>,
    samplers: Vec<Sampler>,
    given_layout: Option<BindGroupLayoutId>,
    generated_layout: Option<BindGroupLayoutId>,
    layout_entries: Vec<wgpu::BindGroupLayoutEntry>,
    group: Option<BindGroupId>,
    bound: Vec<BindGroupEntry>,
    context: DeviceContext,
}

impl BindGroup {
    #[must_use]
    pub fn new(options: BindGroupOptions) -> Self {
        Self {
            label: options.label.into(),
            index: options.index.unwrap_or(0),
            uniforms: Vec::new(),
            storages: Vec::new(),
            textures: Vec::new(),
            samplers: Vec::new(),
            given_layout: options.layout,
            generated_layout: None,
            layout_entries: Vec::new(),
            group: None,
            bound: Vec::new(),
            context: options.context.unwrap_or_else(DeviceContext::global),
        }
    }

    #[inline]
    #[must_use]
    pub fn label(&self) -> &Label {
        &self.label
    }

    #[inline]
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// The supplied layout if any, otherwise the generated one.
    #[must_use]
    pub fn layout(&self) -> Option<BindGroupLayoutId> {
        self.given_layout.or(self.generated_layout)
    }

    #[must_use]
    pub fn layout_entries(&self) -> &[wgpu::BindGroupLayoutEntry] {
        &self.layout_entries
    }

    #[must_use]
    pub fn group(&self) -> Option<BindGroupId> {
        self.group
    }

    #[must_use]
    pub fn is_realized(&self) -> bool {
        self.group.is_some()
    }

    #[must_use]
    pub fn uniforms(&self) -> &[Uniform] {
        &self.uniforms
    }

    #[must_use]
    pub fn storages(&self) -> &[Storage] {
        &self.storages
    }

    #[must_use]
    pub fn textures(&self) -> &[Texture] {
        &self.textures
    }

    #[must_use]
    pub fn samplers(&self) -> &[Sampler] {
        &self.samplers
    }

    pub fn add_uniforms(&mut self, uniforms: impl IntoIterator<Item = Uniform>) -> Result<()> {
        for uniform in uniforms {
            if !uniform.is_realized() {
                uniform.update_gpu_buffer()?;
            }
            self.uniforms.push(uniform);
        }
        self.update_bind_group().map(|_| ())
    }

    pub fn add_storages(&mut self, storages: impl IntoIterator<Item = Storage>) -> Result<()> {
        for storage in storages {
            if !storage.is_realized() {
                storage.update_gpu_buffer()?;
            }
            self.storages.push(storage);
        }
        self.update_bind_group().map(|_| ())
    }

    pub fn add_textures(&mut self, textures: impl IntoIterator<Item = Texture>) -> Result<()> {
        for texture in textures {
            if !texture.is_realized() {
                texture.update_texture()?;
            }
            self.textures.push(texture);
        }
        self.update_bind_group().map(|_| ())
    }

    pub fn add_samplers(&mut self, samplers: impl IntoIterator<Item = Sampler>) -> Result<()> {
        for sampler in samplers {
            if !sampler.is_realized() {
                sampler.update_sampler(None)?;
            }
            self.samplers.push(sampler);
        }
        self.update_bind_group().map(|_| ())
    }

    fn collect_layout_entries(&self) -> Vec<wgpu::BindGroupLayoutEntry> {
        self.uniforms
            .iter()
            .map(|u| u.layout_entry())
            .chain(self.storages.iter().map(|s| s.layout_entry()))
            .chain(self.textures.iter().map(Texture::layout_entry))
            .chain(self.samplers.iter().map(Sampler::layout_entry))
            .collect()
    }

    fn collect_entries(&self) -> Result<Vec<BindGroupEntry>> {
        let mut entries = Vec::with_capacity(
            self.uniforms.len() + self.storages.len() + self.textures.len() + self.samplers.len(),
        );
        for uniform in &self.uniforms {
            let gpu = uniform
                .gpu_buffer()
                .ok_or(KitError::NotSet("Uniform buffer"))?;
            entries.push(BindGroupEntry {
                binding: uniform.binding(),
                resource: BoundResource::Buffer(gpu.id),
            });
        }
        for storage in &self.storages {
            let gpu = storage
                .gpu_buffer()
                .ok_or(KitError::NotSet("Storage buffer"))?;
            entries.push(BindGroupEntry {
                binding: storage.binding(),
                resource: BoundResource::Buffer(gpu.id),
            });
        }
        for texture in &self.textures {
            let gpu = texture.gpu_texture().ok_or(KitError::NotSet("Texture"))?;
            entries.push(BindGroupEntry {
                binding: texture.binding(),
                resource: BoundResource::Texture(gpu.id),
            });
        }
        for sampler in &self.samplers {
            let id = sampler.gpu_sampler().ok_or(KitError::NotSet("Sampler"))?;
            entries.push(BindGroupEntry {
                binding: sampler.binding(),
                resource: BoundResource::Sampler(id),
            });
        }
        Ok(entries)
    }

    /// Rebuilds the bind group, and the layout when it is generated and its
    /// entries changed. Superseded GPU objects are destroyed; a supplied
    /// layout is never destroyed.
    pub fn update_bind_group(&mut self) -> Result<BindGroupId> {
        let device = self.context.get_device()?;
        let entries = self.collect_entries()?;
        let layout_entries = self.collect_layout_entries();

        let layout = match (self.given_layout, self.generated_layout) {
            (Some(layout), _) => layout,
            (None, Some(layout)) if layout_entries == self.layout_entries => layout,
            (None, previous) => {
                let layout = device.create_bind_group_layout(
                    &self.label.derive("Bind Group Layout"),
                    &layout_entries,
                );
                if let Some(previous) = previous {
                    device.destroy_bind_group_layout(previous);
                }
                self.generated_layout = Some(layout);
                layout
            }
        };
        self.layout_entries = layout_entries;

        let group = device.create_bind_group(&self.label.derive("Bind Group"), layout, &entries)?;
        if let Some(previous) = self.group.replace(group) {
            device.destroy_bind_group(previous);
        }
        log::debug!(
            "Built bind group {} (index {}, {} entries)",
            self.label,
            self.index,
            entries.len()
        );
        self.bound = entries;
        Ok(group)
    }

    /// Destroys the bind group and any generated layout. Members keep their
    /// GPU resources.
    pub fn release(&mut self) {
        let Some(device) = self.context.device() else {
            return;
        };
        if let Some(group) = self.group.take() {
            device.destroy_bind_group(group);
        }
        if let Some(layout) = self.generated_layout.take() {
            device.destroy_bind_group_layout(layout);
        }
        self.layout_entries.clear();
        self.bound.clear();
    }

    /// Rebuilds if never built or if any member's GPU object changed since
    /// the last build. Returns `true` when a rebuild happened.
    pub fn refresh(&mut self) -> Result<bool> {
        if self.group.is_none() {
            self.update_bind_group()?;
            return Ok(true);
        }
        if self.collect_entries()? == self.bound {
            return Ok(false);
        }
        log::warn!(
            "Bind group {} references a reallocated resource, rebuilding",
            self.label
        );
        self.update_bind_group()?;
        Ok(true)
    }
}
