//! Sampled textures.
//!
//! Pixel data is kept on the CPU as tightly packed rows (`4 * width` bytes for
//! RGBA8) together with an optional mip chain. [`Texture::update_texture`]
//! allocates the GPU texture when missing or when its shape changed, then
//! uploads level 0 and every mip level.

use std::borrow::Cow;
use std::sync::Arc;

use image::imageops::FilterType;
use parking_lot::RwLock;

use crate::device::{DeviceContext, TextureDesc, TextureId, TextureWrite};
use crate::errors::{KitError, Result};
use crate::label::Label;

#[derive(Debug, Default)]
pub struct TextureOptions {
    pub label: Option<String>,
    /// Required.
    pub binding: Option<u32>,
    /// Defaults to fragment.
    pub visibility: Option<wgpu::ShaderStages>,
    /// Defaults to `Rgba8Unorm`.
    pub format: Option<wgpu::TextureFormat>,
    /// Defaults to 1.
    pub width: Option<u32>,
    /// Defaults to 1.
    pub height: Option<u32>,
    /// Extra usages. `TEXTURE_BINDING | COPY_DST` are always present.
    pub usage: Option<wgpu::TextureUsages>,
    /// Tightly packed pixel rows.
    pub data: Option<Vec<u8>>,
    pub context: Option<DeviceContext>,
}

/// One downsampled level of a mip chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MipLevel {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// A realized GPU texture and the shape it was created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuTexture {
    pub id: TextureId,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
    pub mip_level_count: u32,
}

#[derive(Debug)]
struct TextureState {
    label: Label,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
    usage: wgpu::TextureUsages,
    pixels: Option<Vec<u8>>,
    mips: Vec<MipLevel>,
    gpu: Option<GpuTexture>,
}

impl TextureState {
    fn bytes_per_pixel(&self) -> u32 {
        self.format.block_copy_size(None).unwrap_or(4)
    }

    fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.bytes_per_pixel() as usize
    }

    fn check_len(&self, data: &[u8]) -> Result<()> {
        let expected = self.expected_len();
        if data.len() != expected {
            return Err(KitError::TextureDataSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(())
    }
}

const REQUIRED_USAGE: wgpu::TextureUsages =
    wgpu::TextureUsages::TEXTURE_BINDING.union(wgpu::TextureUsages::COPY_DST);

/// A 2D texture shared between clones.
#[derive(Debug, Clone)]
pub struct Texture {
    binding: u32,
    visibility: wgpu::ShaderStages,
    state: Arc<RwLock<TextureState>>,
    context: DeviceContext,
}

impl Texture {
    pub fn new(options: TextureOptions) -> Result<Self> {
        let binding = options
            .binding
            .ok_or_else(|| KitError::missing("Texture", "binding"))?;

        let state = TextureState {
            label: options.label.into(),
            format: options.format.unwrap_or(wgpu::TextureFormat::Rgba8Unorm),
            width: options.width.unwrap_or(1).max(1),
            height: options.height.unwrap_or(1).max(1),
            usage: options.usage.unwrap_or(REQUIRED_USAGE) | REQUIRED_USAGE,
            pixels: None,
            mips: Vec::new(),
            gpu: None,
        };
        if let Some(data) = &options.data {
            state.check_len(data)?;
        }

        Ok(Self {
            binding,
            visibility: options.visibility.unwrap_or(wgpu::ShaderStages::FRAGMENT),
            state: Arc::new(RwLock::new(TextureState {
                pixels: options.data,
                ..state
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
    pub fn label(&self) -> Label {
        self.state.read().label.clone()
    }

    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        let state = self.state.read();
        (state.width, state.height)
    }

    #[must_use]
    pub fn format(&self) -> wgpu::TextureFormat {
        self.state.read().format
    }

    #[must_use]
    pub fn usage(&self) -> wgpu::TextureUsages {
        self.state.read().usage
    }

    #[must_use]
    pub fn gpu_texture(&self) -> Option<GpuTexture> {
        self.state.read().gpu
    }

    #[must_use]
    pub fn is_realized(&self) -> bool {
        self.gpu_texture().is_some()
    }

    #[must_use]
    pub fn mip_levels(&self) -> Vec<MipLevel> {
        self.state.read().mips.clone()
    }

    /// Sets the size. Existing pixels and mips are dropped.
    pub fn set_texture_size(&self, width: u32, height: u32) {
        let mut state = self.state.write();
        state.width = width.max(1);
        state.height = height.max(1);
        state.pixels = None;
        state.mips.clear();
    }

    pub fn set_texture_format(&self, format: wgpu::TextureFormat) {
        let mut state = self.state.write();
        state.format = format;
        state.pixels = None;
        state.mips.clear();
    }

    /// `TEXTURE_BINDING | COPY_DST` are added to `usage`.
    pub fn set_texture_usage(&self, usage: wgpu::TextureUsages) {
        self.state.write().usage = usage | REQUIRED_USAGE;
    }

    /// Replaces the pixels and uploads them. Mips are dropped.
    pub fn set_cpu_buffer(&self, pixels: Vec<u8>) -> Result<()> {
        {
            let mut state = self.state.write();
            state.check_len(&pixels)?;
            state.pixels = Some(pixels);
            state.mips.clear();
        }
        self.update_texture().map(|_| ())
    }

    /// Adopts the size and RGBA8 pixels of `image`, then uploads.
    pub fn set_from_image(&self, image: &image::DynamicImage) -> Result<()> {
        let rgba = image.to_rgba8();
        {
            let mut state = self.state.write();
            state.width = rgba.width().max(1);
            state.height = rgba.height().max(1);
            state.pixels = Some(rgba.into_raw());
            state.mips.clear();
        }
        self.update_texture().map(|_| ())
    }

    /// Decodes an encoded image (PNG, JPEG) and adopts it.
    pub fn load_from_memory(&self, bytes: &[u8]) -> Result<()> {
        let image = image::load_from_memory(bytes)?;
        self.set_from_image(&image)
    }

    /// Builds the mip chain from the current pixels and uploads every level.
    pub fn generate_mip_maps(&self) -> Result<()> {
        {
            let mut state = self.state.write();
            let pixels = state.pixels.as_deref().ok_or(KitError::NotSet("Texture data"))?;
            let mips = generate_mip_chain(pixels, state.width, state.height)?;
            log::debug!("Generated {} mip levels for {}", mips.len(), state.label);
            state.mips = mips;
        }
        self.update_texture().map(|_| ())
    }

    /// Creates the GPU texture if missing or if its shape changed, then
    /// uploads all levels. Returns `true` when a new texture was created.
    pub fn update_texture(&self) -> Result<bool> {
        let device = self.context.get_device()?;
        let mut state = self.state.write();

        let mip_level_count = 1 + state.mips.len() as u32;
        let wanted = (state.width, state.height, state.format, state.usage, mip_level_count);
        let current = state
            .gpu
            .map(|g| (g.width, g.height, g.format, g.usage, g.mip_level_count));

        let created = current != Some(wanted);
        if created {
            if let Some(old) = state.gpu.take() {
                device.destroy_texture(old.id);
            }
            let id = device.create_texture(&TextureDesc {
                label: state.label.derive("Texture"),
                width: state.width,
                height: state.height,
                format: state.format,
                usage: state.usage,
                sample_count: 1,
                mip_level_count,
            });
            state.gpu = Some(GpuTexture {
                id,
                width: state.width,
                height: state.height,
                format: state.format,
                usage: state.usage,
                mip_level_count,
            });
        }

        let Some(gpu) = state.gpu else {
            return Err(KitError::NotSet("GPU texture"));
        };
        let bpp = state.bytes_per_pixel();
        let level0: Cow<'_, [u8]> = match &state.pixels {
            Some(pixels) => Cow::Borrowed(pixels),
            None => Cow::Owned(vec![0; state.expected_len()]),
        };
        device.write_texture(
            gpu.id,
            &TextureWrite {
                mip_level: 0,
                width: state.width,
                height: state.height,
                bytes_per_row: bpp * state.width,
            },
            &level0,
        )?;
        for (level, mip) in state.mips.iter().enumerate() {
            device.write_texture(
                gpu.id,
                &TextureWrite {
                    mip_level: level as u32 + 1,
                    width: mip.width,
                    height: mip.height,
                    bytes_per_row: bpp * mip.width,
                },
                &mip.data,
            )?;
        }
        Ok(created)
    }

    #[must_use]
    pub fn layout_entry(&self) -> wgpu::BindGroupLayoutEntry {
        let sample_type = self
            .format()
            .sample_type(None, None)
            .unwrap_or(wgpu::TextureSampleType::Float { filterable: true });
        wgpu::BindGroupLayoutEntry {
            binding: self.binding,
            visibility: self.visibility,
            ty: wgpu::BindingType::Texture {
                sample_type,
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        }
    }
}

/// Downsamples RGBA8 `pixels` into successive half-size levels with a
/// bilinear filter, stopping once either dimension reaches 1.
///
/// Level 0 is not included.
pub fn generate_mip_chain(pixels: &[u8], width: u32, height: u32) -> Result<Vec<MipLevel>> {
    let expected = width as usize * height as usize * 4;
    let mut current = image::RgbaImage::from_raw(width, height, pixels.to_vec()).ok_or(
        KitError::TextureDataSize {
            expected,
            actual: pixels.len(),
        },
    )?;

    let mut levels = Vec::new();
    while current.width() > 1 && current.height() > 1 {
        let (w, h) = (current.width() / 2, current.height() / 2);
        current = image::imageops::resize(&current, w, h, FilterType::Triangle);
        levels.push(MipLevel {
            width: w,
            height: h,
            data: current.as_raw().clone(),
        });
    }
    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_halves_until_an_edge_is_one() {
        let pixels = vec![255u8; 8 * 4 * 4];
        let levels = generate_mip_chain(&pixels, 8, 4).unwrap();
        let sizes: Vec<_> = levels.iter().map(|l| (l.width, l.height)).collect();
        assert_eq!(sizes, vec![(4, 2), (2, 1)]);
        assert!(levels.iter().all(|l| l.data.len() == (l.width * l.height * 4) as usize));
    }

    #[test]
    fn uniform_color_survives_downsampling() {
        let pixels: Vec<u8> = [10u8, 20, 30, 255].repeat(4 * 4);
        let levels = generate_mip_chain(&pixels, 4, 4).unwrap();
        assert_eq!(levels.last().unwrap().data, vec![10, 20, 30, 255]);
    }

    #[test]
    fn single_row_has_no_mips() {
        let levels = generate_mip_chain(&[0u8; 16], 4, 1).unwrap();
        assert!(levels.is_empty());
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert!(matches!(
            generate_mip_chain(&[0u8; 15], 2, 2),
            Err(KitError::TextureDataSize {
                expected: 16,
                actual: 15
            })
        ));
    }
}
