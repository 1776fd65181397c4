//! CPU/GPU buffer pairs.
//!
//! [`CpuBuffer`] holds typed host data. [`BufferPair`] keeps that data next to
//! the GPU buffer it was last uploaded into and implements the upload policy:
//! a buffer whose byte size changed is destroyed and reallocated, otherwise it
//! is overwritten in place and keeps its handle.
//!
//! [`BufferBinding`] is the shared, bindable form used by uniforms and storage
//! buffers. Clones share one pair, so a single buffer can appear in several
//! bind groups (ping-pong setups) at different binding numbers.

use std::borrow::Cow;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::device::{BufferDesc, BufferId, DeviceContext, GpuBackend};
use crate::errors::{KitError, Result};
use crate::label::Label;

// ============================================================================
// Element kinds
// ============================================================================

/// Scalar type of the elements in a [`CpuBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    F32,
    U32,
    I32,
    U16,
    U8,
}

impl ElementKind {
    /// Size of one element in bytes.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::F32 | Self::U32 | Self::I32 => 4,
            Self::U16 => 2,
            Self::U8 => 1,
        }
    }
}

/// Scalars that can be stored in a [`CpuBuffer`].
pub trait Element: bytemuck::Pod {
    const KIND: ElementKind;

    fn wrap(values: Vec<Self>) -> CpuBuffer;
    fn slice(buffer: &CpuBuffer) -> Option<&[Self]>;
    fn slice_mut(buffer: &mut CpuBuffer) -> Option<&mut [Self]>;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident) => {
        impl Element for $ty {
            const KIND: ElementKind = ElementKind::$variant;

            fn wrap(values: Vec<Self>) -> CpuBuffer {
                CpuBuffer::$variant(values)
            }

            fn slice(buffer: &CpuBuffer) -> Option<&[Self]> {
                match buffer {
                    CpuBuffer::$variant(values) => Some(values),
                    _ => None,
                }
            }

            fn slice_mut(buffer: &mut CpuBuffer) -> Option<&mut [Self]> {
                match buffer {
                    CpuBuffer::$variant(values) => Some(values),
                    _ => None,
                }
            }
        }

        impl From<Vec<$ty>> for CpuBuffer {
            fn from(values: Vec<$ty>) -> Self {
                CpuBuffer::$variant(values)
            }
        }

        impl From<&[$ty]> for CpuBuffer {
            fn from(values: &[$ty]) -> Self {
                CpuBuffer::$variant(values.to_vec())
            }
        }

        impl<const N: usize> From<[$ty; N]> for CpuBuffer {
            fn from(values: [$ty; N]) -> Self {
                CpuBuffer::$variant(values.to_vec())
            }
        }
    };
}

impl_element!(f32, F32);
impl_element!(u32, U32);
impl_element!(i32, I32);
impl_element!(u16, U16);
impl_element!(u8, U8);

// ============================================================================
// CpuBuffer
// ============================================================================

/// A typed numeric array destined for the GPU.
#[derive(Debug, Clone, PartialEq)]
pub enum CpuBuffer {
    F32(Vec<f32>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    U16(Vec<u16>),
    U8(Vec<u8>),
}

impl CpuBuffer {
    /// `len` zeroed elements of type `T`.
    #[must_use]
    pub fn zeroed<T: Element>(len: usize) -> Self {
        T::wrap(vec![T::zeroed(); len])
    }

    #[must_use]
    pub fn kind(&self) -> ElementKind {
        match self {
            Self::F32(_) => ElementKind::F32,
            Self::U32(_) => ElementKind::U32,
            Self::I32(_) => ElementKind::I32,
            Self::U16(_) => ElementKind::U16,
            Self::U8(_) => ElementKind::U8,
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::U32(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::U8(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    #[must_use]
    pub fn bytes_per_element(&self) -> usize {
        self.kind().size()
    }

    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.len() * self.bytes_per_element()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::F32(v) => bytemuck::cast_slice(v),
            Self::U32(v) => bytemuck::cast_slice(v),
            Self::I32(v) => bytemuck::cast_slice(v),
            Self::U16(v) => bytemuck::cast_slice(v),
            Self::U8(v) => v,
        }
    }

    pub fn as_slice<T: Element>(&self) -> Result<&[T]> {
        T::slice(self).ok_or(KitError::ElementKindMismatch {
            expected: T::KIND,
            found: self.kind(),
        })
    }

    pub fn as_mut_slice<T: Element>(&mut self) -> Result<&mut [T]> {
        let found = self.kind();
        T::slice_mut(self).ok_or(KitError::ElementKindMismatch {
            expected: T::KIND,
            found,
        })
    }

    /// Reinterprets little-endian bytes as elements of `kind`.
    ///
    /// Trailing bytes that do not fill a whole element are dropped.
    #[must_use]
    pub fn from_bytes(kind: ElementKind, bytes: &[u8]) -> Self {
        let whole = bytes.len() - bytes.len() % kind.size();
        let bytes = &bytes[..whole];
        match kind {
            ElementKind::F32 => Self::F32(bytemuck::pod_collect_to_vec(bytes)),
            ElementKind::U32 => Self::U32(bytemuck::pod_collect_to_vec(bytes)),
            ElementKind::I32 => Self::I32(bytemuck::pod_collect_to_vec(bytes)),
            ElementKind::U16 => Self::U16(bytemuck::pod_collect_to_vec(bytes)),
            ElementKind::U8 => Self::U8(bytes.to_vec()),
        }
    }
}

// ============================================================================
// BufferPair
// ============================================================================

/// The role a buffer plays, which fixes its usage flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferRole {
    Vertex,
    Index,
    Uniform,
    Storage { read_only: bool },
}

impl BufferRole {
    #[must_use]
    pub fn usage(self) -> wgpu::BufferUsages {
        use wgpu::BufferUsages as U;
        match self {
            Self::Vertex => U::VERTEX | U::COPY_DST,
            Self::Index => U::INDEX | U::COPY_DST,
            Self::Uniform => U::UNIFORM | U::COPY_DST,
            Self::Storage { .. } => U::STORAGE | U::COPY_DST | U::COPY_SRC,
        }
    }

    /// Bind group binding type, `None` for buffers that are never bound.
    #[must_use]
    pub fn binding_type(self) -> Option<wgpu::BufferBindingType> {
        match self {
            Self::Uniform => Some(wgpu::BufferBindingType::Uniform),
            Self::Storage { read_only } => Some(wgpu::BufferBindingType::Storage { read_only }),
            Self::Vertex | Self::Index => None,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Self::Vertex => "Vertex Buffer",
            Self::Index => "Index Buffer",
            Self::Uniform => "Uniform Buffer",
            Self::Storage { .. } => "Storage Buffer",
        }
    }
}

/// A realized GPU buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuBuffer {
    pub id: BufferId,
    /// Allocated size, see [`gpu_size`].
    pub size: u64,
    /// Length of the CPU data the buffer was allocated for.
    pub byte_len: usize,
}

/// GPU allocation size for `byte_len` bytes of data: rounded up to the copy
/// alignment and never zero.
#[must_use]
pub fn gpu_size(byte_len: usize) -> u64 {
    let align = wgpu::COPY_BUFFER_ALIGNMENT;
    (byte_len as u64).div_ceil(align).max(1) * align
}

#[derive(Debug)]
pub struct BufferPair {
    label: Label,
    role: BufferRole,
    cpu: Option<CpuBuffer>,
    gpu: Option<GpuBuffer>,
}

impl BufferPair {
    #[must_use]
    pub fn new(label: Label, role: BufferRole, cpu: Option<CpuBuffer>) -> Self {
        Self {
            label,
            role,
            cpu,
            gpu: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn label(&self) -> &Label {
        &self.label
    }

    #[inline]
    #[must_use]
    pub fn role(&self) -> BufferRole {
        self.role
    }

    #[inline]
    #[must_use]
    pub fn cpu(&self) -> Option<&CpuBuffer> {
        self.cpu.as_ref()
    }

    #[inline]
    pub fn cpu_mut(&mut self) -> Option<&mut CpuBuffer> {
        self.cpu.as_mut()
    }

    #[inline]
    #[must_use]
    pub fn gpu(&self) -> Option<GpuBuffer> {
        self.gpu
    }

    /// Replaces the CPU data without touching the GPU.
    pub fn set_cpu(&mut self, data: CpuBuffer) {
        self.cpu = Some(data);
    }

    /// Uploads the CPU data, reallocating the GPU buffer whenever the CPU
    /// byte length changed since allocation. Returns `true` if a new GPU
    /// buffer was created.
    pub fn update_gpu_buffer(&mut self, device: &dyn GpuBackend) -> Result<bool> {
        let cpu = self.cpu.as_ref().ok_or(KitError::NotSet("CPU buffer"))?;
        let bytes = cpu.as_bytes();
        let size = gpu_size(bytes.len());

        let (gpu, reallocated) = match self.gpu {
            Some(gpu) if gpu.byte_len == bytes.len() => (gpu, false),
            previous => {
                if let Some(old) = previous {
                    log::debug!(
                        "Reallocating {}: {} -> {} bytes",
                        self.label.derive(self.role.suffix()),
                        old.byte_len,
                        bytes.len()
                    );
                    device.destroy_buffer(old.id);
                }
                let id = device.create_buffer(&BufferDesc {
                    label: self.label.derive(self.role.suffix()),
                    size,
                    usage: self.role.usage(),
                });
                let gpu = GpuBuffer {
                    id,
                    size,
                    byte_len: bytes.len(),
                };
                self.gpu = Some(gpu);
                (gpu, true)
            }
        };

        let data: Cow<'_, [u8]> = if bytes.len() as u64 == size {
            Cow::Borrowed(bytes)
        } else {
            let mut padded = bytes.to_vec();
            padded.resize(size as usize, 0);
            Cow::Owned(padded)
        };
        device.write_buffer(gpu.id, 0, &data)?;
        Ok(reallocated)
    }

    /// Destroys the GPU buffer, keeping the CPU data.
    pub fn release(&mut self, device: &dyn GpuBackend) {
        if let Some(gpu) = self.gpu.take() {
            device.destroy_buffer(gpu.id);
        }
    }
}

// ============================================================================
// BufferBinding
// ============================================================================

pub(crate) const DEFAULT_VISIBILITY: wgpu::ShaderStages =
    wgpu::ShaderStages::VERTEX_FRAGMENT.union(wgpu::ShaderStages::COMPUTE);

/// Options shared by [`Uniform`](crate::Uniform) and [`Storage`](crate::Storage).
#[derive(Debug, Default)]
pub struct BufferBindingOptions {
    pub label: Option<String>,
    /// Required.
    pub binding: Option<u32>,
    /// Defaults to vertex | fragment | compute.
    pub visibility: Option<wgpu::ShaderStages>,
    /// Required.
    pub data: Option<CpuBuffer>,
    pub context: Option<DeviceContext>,
}

/// A bindable buffer shared between clones.
#[derive(Debug, Clone)]
pub struct BufferBinding {
    binding: u32,
    visibility: wgpu::ShaderStages,
    pair: Arc<RwLock<BufferPair>>,
    context: DeviceContext,
}

impl BufferBinding {
    pub(crate) fn new(
        resource: &'static str,
        role: BufferRole,
        options: BufferBindingOptions,
    ) -> Result<Self> {
        let binding = options
            .binding
            .ok_or_else(|| KitError::missing(resource, "binding"))?;
        let data = options
            .data
            .ok_or_else(|| KitError::missing(resource, "data"))?;

        Ok(Self {
            binding,
            visibility: options.visibility.unwrap_or(DEFAULT_VISIBILITY),
            pair: Arc::new(RwLock::new(BufferPair::new(
                options.label.into(),
                role,
                Some(data),
            ))),
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
    pub fn label(&self) -> Label {
        self.pair.read().label().clone()
    }

    #[must_use]
    pub fn role(&self) -> BufferRole {
        self.pair.read().role()
    }

    #[inline]
    #[must_use]
    pub fn context(&self) -> &DeviceContext {
        &self.context
    }

    /// A handle to the same buffer at another binding number.
    #[must_use]
    pub fn with_binding(&self, binding: u32) -> Self {
        Self {
            binding,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_visibility(&self, visibility: wgpu::ShaderStages) -> Self {
        Self {
            visibility,
            ..self.clone()
        }
    }

    /// `true` when both handles share one buffer.
    #[must_use]
    pub fn shares_buffer(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.pair, &other.pair)
    }

    #[must_use]
    pub fn gpu_buffer(&self) -> Option<GpuBuffer> {
        self.pair.read().gpu()
    }

    #[must_use]
    pub fn cpu_buffer(&self) -> Option<CpuBuffer> {
        self.pair.read().cpu().cloned()
    }

    #[must_use]
    pub fn is_realized(&self) -> bool {
        self.gpu_buffer().is_some()
    }

    /// Uploads the CPU data. Returns `true` if the GPU buffer was reallocated.
    pub fn update_gpu_buffer(&self) -> Result<bool> {
        let device = self.context.get_device()?;
        self.pair.write().update_gpu_buffer(device.as_ref())
    }

    /// Replaces the CPU data and uploads it.
    pub fn set_cpu_buffer(&self, data: impl Into<CpuBuffer>) -> Result<bool> {
        let device = self.context.get_device()?;
        let mut pair = self.pair.write();
        pair.set_cpu(data.into());
        pair.update_gpu_buffer(device.as_ref())
    }

    /// Edits the CPU data in place as `[T]` and uploads it.
    pub fn update<T: Element>(&self, f: impl FnOnce(&mut [T])) -> Result<()> {
        let device = self.context.get_device()?;
        let mut pair = self.pair.write();
        let cpu = pair.cpu_mut().ok_or(KitError::NotSet("CPU buffer"))?;
        f(cpu.as_mut_slice::<T>()?);
        pair.update_gpu_buffer(device.as_ref())?;
        Ok(())
    }

    /// Reads the CPU data as `[T]`.
    pub fn read<T: Element, R>(&self, f: impl FnOnce(&[T]) -> R) -> Result<R> {
        let pair = self.pair.read();
        let cpu = pair.cpu().ok_or(KitError::NotSet("CPU buffer"))?;
        Ok(f(cpu.as_slice::<T>()?))
    }

    #[must_use]
    pub fn layout_entry(&self) -> wgpu::BindGroupLayoutEntry {
        let ty = self
            .role()
            .binding_type()
            .unwrap_or(wgpu::BufferBindingType::Uniform);
        wgpu::BindGroupLayoutEntry {
            binding: self.binding,
            visibility: self.visibility,
            ty: wgpu::BindingType::Buffer {
                ty,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }
    }
}
