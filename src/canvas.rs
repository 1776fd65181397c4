//! Presentation target.
//!
//! A [`Canvas`] pairs a surface with two sizes: the client size reported by
//! the host (e.g. a window's inner size) and the backing size the surface is
//! configured with. Render pipeline groups fit the backing size to the client
//! size before each frame.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::device::{DeviceContext, GpuBackend, SurfaceConfig, SurfaceId};
use crate::errors::Result;

#[derive(Debug)]
struct CanvasState {
    surface: SurfaceId,
    format: wgpu::TextureFormat,
    present_mode: wgpu::PresentMode,
    client_size: (u32, u32),
    size: (u32, u32),
    configured_size: Option<(u32, u32)>,
}

/// Shared handle to a surface and its sizes.
#[derive(Clone)]
pub struct Canvas {
    state: Arc<RwLock<CanvasState>>,
}

impl Canvas {
    /// Wraps an existing surface. The backing size starts equal to the
    /// client size.
    pub fn new(ctx: &DeviceContext, surface: SurfaceId, width: u32, height: u32) -> Result<Self> {
        let device = ctx.get_device()?;
        let format = device.surface_format(surface)?;
        let size = (width.max(1), height.max(1));

        Ok(Self {
            state: Arc::new(RwLock::new(CanvasState {
                surface,
                format,
                present_mode: ctx.settings().present_mode(),
                client_size: size,
                size,
                configured_size: None,
            })),
        })
    }

    /// Creates a surface for `window` and wraps it.
    pub fn from_window<W>(ctx: &DeviceContext, window: W, width: u32, height: u32) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle + Send + Sync + 'static,
    {
        let device = ctx.get_device()?;
        let surface = device.create_surface(wgpu::SurfaceTarget::from(window))?;
        Self::new(ctx, surface, width, height)
    }

    #[must_use]
    pub fn surface(&self) -> SurfaceId {
        self.state.read().surface
    }

    #[must_use]
    pub fn format(&self) -> wgpu::TextureFormat {
        self.state.read().format
    }

    /// Backing size in pixels.
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        self.state.read().size
    }

    #[must_use]
    pub fn client_size(&self) -> (u32, u32) {
        self.state.read().client_size
    }

    /// Records the size reported by the host. Takes effect at the next fit.
    pub fn set_client_size(&self, width: u32, height: u32) {
        self.state.write().client_size = (width, height);
    }

    /// Clamps the client size to `[1, max_dimension]` per axis and adopts it
    /// as the backing size. Returns `false` if the backing size already
    /// matched.
    pub fn fit_to_client(&self, max_dimension: u32) -> bool {
        let mut state = self.state.write();
        let max = max_dimension.max(1);
        let (w, h) = state.client_size;
        let target = (w.clamp(1, max), h.clamp(1, max));
        if target == state.size {
            return false;
        }
        log::debug!(
            "Canvas backing size {:?} -> {:?}",
            state.size,
            target
        );
        state.size = target;
        true
    }

    /// `true` if the surface is configured at the current backing size.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        let state = self.state.read();
        state.configured_size == Some(state.size)
    }

    pub fn configure(&self, device: &dyn GpuBackend) -> Result<()> {
        let mut state = self.state.write();
        let (width, height) = state.size;
        device.configure_surface(
            state.surface,
            &SurfaceConfig {
                width,
                height,
                format: state.format,
                present_mode: state.present_mode,
            },
        )?;
        state.configured_size = Some(state.size);
        log::info!("Configured canvas {width}x{height} ({:?})", state.format);
        Ok(())
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Canvas) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl fmt::Debug for Canvas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.state.read(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RecordingBackend;

    fn canvas(width: u32, height: u32) -> (Arc<RecordingBackend>, Canvas) {
        let backend = Arc::new(RecordingBackend::new());
        let surface = backend.create_virtual_surface();
        let ctx = DeviceContext::with_backend(backend.clone());
        let canvas = Canvas::new(&ctx, surface, width, height).unwrap();
        (backend, canvas)
    }

    #[test]
    fn fit_is_idempotent() {
        let (_, canvas) = canvas(64, 32);
        assert!(!canvas.fit_to_client(8192));

        canvas.set_client_size(128, 32);
        assert!(canvas.fit_to_client(8192));
        assert_eq!(canvas.size(), (128, 32));
        assert!(!canvas.fit_to_client(8192));
    }

    #[test]
    fn fit_clamps_to_device_limit_and_one() {
        let (_, canvas) = canvas(64, 64);
        canvas.set_client_size(10_000, 0);
        assert!(canvas.fit_to_client(4096));
        assert_eq!(canvas.size(), (4096, 1));
    }

    #[test]
    fn configure_uses_backing_size() {
        let (backend, canvas) = canvas(20, 10);
        assert!(!canvas.is_configured());
        canvas.configure(backend.as_ref()).unwrap();
        assert!(canvas.is_configured());

        let config = backend.surface_config(canvas.surface()).unwrap();
        assert_eq!((config.width, config.height), (20, 10));
        assert_eq!(config.format, wgpu::TextureFormat::Bgra8Unorm);

        canvas.set_client_size(40, 10);
        canvas.fit_to_client(8192);
        assert!(!canvas.is_configured());
    }
}
