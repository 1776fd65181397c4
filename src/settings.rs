//! Device Acquisition Settings
//!
//! [`ContextSettings`] configures how a [`DeviceContext`](crate::device::DeviceContext)
//! negotiates its adapter and device, and how canvases are configured.
//!
//! ```rust,ignore
//! use wgpu_kit::{ContextSettings, DeviceContext};
//!
//! let ctx = DeviceContext::new(ContextSettings {
//!     power_preference: wgpu::PowerPreference::HighPerformance,
//!     vsync: false,
//!     ..Default::default()
//! });
//! ```

/// Configuration for lazy device acquisition.
#[derive(Debug, Clone)]
pub struct ContextSettings {
    /// Adapter selection hint.
    pub power_preference: wgpu::PowerPreference,
    /// Use the software fallback adapter.
    pub force_fallback_adapter: bool,
    /// Features the device must expose.
    pub required_features: wgpu::Features,
    /// Limits the device must satisfy.
    pub required_limits: wgpu::Limits,
    /// Present with vertical sync.
    pub vsync: bool,
    /// Label given to the device.
    pub label: Option<String>,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::default(),
            force_fallback_adapter: false,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            vsync: true,
            label: None,
        }
    }
}

impl ContextSettings {
    #[inline]
    #[must_use]
    pub fn present_mode(&self) -> wgpu::PresentMode {
        if self.vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        }
    }
}
