//! Device Context
//!
//! [`DeviceContext`] owns the lazily acquired GPU device and the canvas bound
//! to it. Every entity takes an optional context and falls back to the
//! process-wide default returned by [`DeviceContext::global`].
//!
//! The context is a cheap clone handle; clones share the same device slot.
//!
//! # Acquisition
//!
//! The first [`request_device`](DeviceContext::request_device) (or its
//! blocking form [`get_device`](DeviceContext::get_device)) runs the
//! acquirer. Later calls return the cached device. Concurrent first calls
//! wait on one acquisition instead of each running the acquirer. A failed
//! acquisition leaves the slot empty and the next call retries.

pub mod backend;
pub mod commands;
mod recording;
mod wgpu_backend;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};

pub use backend::{
    BindGroupEntry, BindGroupId, BindGroupLayoutId, BoundResource, BufferDesc, BufferId,
    ComputePipelineDesc, ComputePipelineId, GpuBackend, PipelineLayoutId, RenderPipelineDesc,
    RenderPipelineId, SamplerDesc, SamplerId, ShaderModuleId, SurfaceConfig, SurfaceId,
    TextureDesc, TextureId, TextureWrite, VertexBufferLayout,
};
pub use commands::{
    AttachmentTarget, ColorAttachment, CommandBuffer, ComputeCommand, ComputePassRecord,
    DepthStencilAttachment, PassRecord, RenderCommand, RenderPassRecord,
};
pub use recording::{
    BackendStats, RecordedBindGroup, RecordedBuffer, RecordedTexture, RecordingBackend,
};
pub use wgpu_backend::WgpuBackend;

use crate::canvas::Canvas;
use crate::errors::{KitError, Result};
use crate::settings::ContextSettings;

type AcquireFuture = Pin<Box<dyn Future<Output = Result<Arc<dyn GpuBackend>>>>>;
type Acquirer = Box<dyn Fn(ContextSettings) -> AcquireFuture + Send + Sync>;

struct ContextInner {
    settings: ContextSettings,
    acquirer: Acquirer,
    device: Mutex<Option<Arc<dyn GpuBackend>>>,
    /// Held across the acquirer's future.
    acquiring: futures::lock::Mutex<()>,
    canvas: RwLock<Option<Canvas>>,
}

#[derive(Clone)]
pub struct DeviceContext {
    inner: Arc<ContextInner>,
}

static GLOBAL: OnceLock<DeviceContext> = OnceLock::new();

impl DeviceContext {
    /// A context that negotiates a `wgpu` device on first use.
    #[must_use]
    pub fn new(settings: ContextSettings) -> Self {
        Self::from_acquirer(
            settings,
            Box::new(|settings: ContextSettings| -> AcquireFuture {
                Box::pin(async move {
                    let backend = WgpuBackend::request(&settings).await?;
                    Ok(Arc::new(backend) as Arc<dyn GpuBackend>)
                })
            }),
        )
    }

    /// A context whose device comes from `acquire`, still run lazily on
    /// first use.
    #[must_use]
    pub fn with_acquirer<F>(settings: ContextSettings, acquire: F) -> Self
    where
        F: Fn(&ContextSettings) -> Result<Arc<dyn GpuBackend>> + Send + Sync + 'static,
    {
        Self::from_acquirer(
            settings,
            Box::new(move |settings: ContextSettings| -> AcquireFuture {
                let device = acquire(&settings);
                Box::pin(async move { device })
            }),
        )
    }

    fn from_acquirer(settings: ContextSettings, acquirer: Acquirer) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                settings,
                acquirer,
                device: Mutex::new(None),
                acquiring: futures::lock::Mutex::new(()),
                canvas: RwLock::new(None),
            }),
        }
    }

    /// A context around an already negotiated device.
    #[must_use]
    pub fn with_backend(backend: Arc<dyn GpuBackend>) -> Self {
        let ctx = Self::with_acquirer(ContextSettings::default(), |_| {
            Err(KitError::DeviceUnavailable("device was released".to_string()))
        });
        *ctx.inner.device.lock() = Some(backend);
        ctx
    }

    /// The process-wide default context, created with default settings on
    /// first access unless one was installed earlier.
    pub fn global() -> DeviceContext {
        GLOBAL
            .get_or_init(|| DeviceContext::new(ContextSettings::default()))
            .clone()
    }

    /// Makes `ctx` the process-wide default.
    pub fn install_global(ctx: DeviceContext) -> Result<()> {
        GLOBAL
            .set(ctx)
            .map_err(|_| KitError::GlobalAlreadyInitialized)
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &ContextSettings {
        &self.inner.settings
    }

    /// Returns the device, acquiring it on first call.
    pub async fn request_device(&self) -> Result<Arc<dyn GpuBackend>> {
        if let Some(device) = self.device() {
            return Ok(device);
        }

        let _acquiring = self.inner.acquiring.lock().await;
        if let Some(device) = self.device() {
            return Ok(device);
        }

        let device = (self.inner.acquirer)(self.inner.settings.clone())
            .await
            .map_err(|err| match err {
                err @ (KitError::DeviceUnavailable(_) | KitError::DeviceCreateFailed(_)) => err,
                other => KitError::DeviceUnavailable(other.to_string()),
            })?;

        log::info!("GPU device acquired");
        *self.inner.device.lock() = Some(Arc::clone(&device));
        Ok(device)
    }

    /// Blocking form of [`request_device`](Self::request_device).
    pub fn get_device(&self) -> Result<Arc<dyn GpuBackend>> {
        pollster::block_on(self.request_device())
    }

    /// The device if one was already acquired. Never acquires.
    #[must_use]
    pub fn device(&self) -> Option<Arc<dyn GpuBackend>> {
        self.inner.device.lock().clone()
    }

    #[must_use]
    pub fn has_device(&self) -> bool {
        self.inner.device.lock().is_some()
    }

    /// Binds `canvas` as this context's default render target.
    pub fn set_canvas(&self, canvas: Canvas) -> Result<()> {
        let device = self.get_device()?;
        device
            .surface_format(canvas.surface())
            .map_err(|err| KitError::SurfaceUnavailable(err.to_string()))?;
        *self.inner.canvas.write() = Some(canvas);
        Ok(())
    }

    #[must_use]
    pub fn canvas(&self) -> Option<Canvas> {
        self.inner.canvas.read().clone()
    }

    /// Configures the bound canvas for the acquired device.
    pub fn configure_context(&self) -> Result<()> {
        let device = self.device().ok_or(KitError::NoDevice)?;
        let canvas = self.canvas().ok_or(KitError::NotSet("Canvas"))?;
        canvas.configure(device.as_ref())
    }

    /// `true` when both handles share the same device slot.
    #[must_use]
    pub fn ptr_eq(&self, other: &DeviceContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for DeviceContext {
    fn default() -> Self {
        Self::global()
    }
}

impl fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceContext")
            .field("settings", &self.inner.settings)
            .field("has_device", &self.has_device())
            .field("canvas", &self.canvas())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn acquires_once_and_caches() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let ctx = DeviceContext::with_acquirer(
            ContextSettings::default(),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(RecordingBackend::new()) as Arc<dyn GpuBackend>)
            },
        );

        assert!(!ctx.has_device());
        let first = ctx.get_device().unwrap();
        let second = ctx.clone().get_device().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_acquisition_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let ctx = DeviceContext::with_acquirer(
            ContextSettings::default(),
            move |_| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(KitError::NotSet("adapter"))
                } else {
                    Ok(Arc::new(RecordingBackend::new()) as Arc<dyn GpuBackend>)
                }
            },
        );

        assert!(matches!(ctx.get_device(), Err(KitError::DeviceUnavailable(_))));
        assert!(ctx.get_device().is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn configure_without_device_fails() {
        let ctx = DeviceContext::with_acquirer(
            ContextSettings::default(),
            |_| Ok(Arc::new(RecordingBackend::new()) as Arc<dyn GpuBackend>),
        );
        assert!(matches!(ctx.configure_context(), Err(KitError::NoDevice)));
    }

    #[test]
    fn concurrent_first_requests_share_one_acquisition() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let ctx = DeviceContext::with_acquirer(
            ContextSettings::default(),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(50));
                Ok(Arc::new(RecordingBackend::new()) as Arc<dyn GpuBackend>)
            },
        );

        let start = std::sync::Barrier::new(4);
        let devices: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        start.wait();
                        ctx.get_device().unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(devices.iter().all(|d| Arc::ptr_eq(d, &devices[0])));
    }
}
