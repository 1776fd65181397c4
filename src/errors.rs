//! Error Types
//!
//! This module defines the error type used throughout the crate.
//!
//! # Overview
//!
//! [`KitError`] covers three families of failure:
//! - Device and surface negotiation failures
//! - Configuration mistakes (missing options, unbuilt resources, kind mismatches)
//! - Resource-state violations (reading a GPU handle before it exists)
//!
//! None of these are transient. They are raised where they are detected and
//! propagate through `build()` / `run()` unchanged.
//!
//! # Usage
//!
//! ```rust,ignore
//! use wgpu_kit::errors::{KitError, Result};
//!
//! fn build_scene() -> Result<()> {
//!     Ok(())
//! }
//! ```

use thiserror::Error;

use crate::buffer::ElementKind;

/// The error type for every fallible operation in the crate.
#[derive(Error, Debug)]
pub enum KitError {
    // ========================================================================
    // Device & Surface Errors
    // ========================================================================
    /// No adapter or device could be negotiated.
    #[error("No GPU device found: {0}")]
    DeviceUnavailable(String),

    /// The adapter refused the device request.
    #[error("Failed to create WGPU device: {0}")]
    DeviceCreateFailed(#[from] wgpu::RequestDeviceError),

    /// The surface could not produce a drawing context.
    #[error("Could not get WebGPU context: {0}")]
    SurfaceUnavailable(String),

    /// Creating a surface from a window handle failed.
    #[error("Failed to create surface: {0}")]
    SurfaceCreateFailed(#[from] wgpu::CreateSurfaceError),

    /// Acquiring the surface's current frame failed.
    #[error("Failed to acquire surface frame: {0}")]
    SurfaceAcquireFailed(#[from] wgpu::SurfaceError),

    /// An operation needed the device before one was acquired.
    #[error("Attempted to configure context w/o device")]
    NoDevice,

    /// A global context was installed after the default one was already created.
    #[error("The global device context is already initialized")]
    GlobalAlreadyInitialized,

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// A required option was left unset.
    #[error("{resource} {field} is not set")]
    MissingField {
        /// The kind of resource being constructed
        resource: &'static str,
        /// The missing option
        field: &'static str,
    },

    /// A sub-resource was used before being realized or built.
    #[error("{0} not set")]
    NotSet(&'static str),

    /// CPU data of one element kind was accessed as another.
    #[error("Element kind mismatch: expected {expected:?}, found {found:?}")]
    ElementKindMismatch {
        /// The kind requested by the caller
        expected: ElementKind,
        /// The kind actually stored
        found: ElementKind,
    },

    /// Index buffers accept only 16- or 32-bit unsigned data.
    #[error("Index data must be u16 or u32, found {0:?}")]
    InvalidIndexKind(ElementKind),

    /// An attribute does not hold enough elements for its VAO.
    #[error("Attribute {label:?} holds {actual} elements, {expected} required")]
    AttributeTooShort {
        /// Attribute label
        label: String,
        /// `item_count * item_size`
        expected: usize,
        /// Elements actually present
        actual: usize,
    },

    /// An attribute describes a different number of items than its VAO.
    #[error("Attribute {label:?} describes {found} items, its VAO has {expected}")]
    AttributeItemCountMismatch {
        /// Attribute label
        label: String,
        /// The VAO's item count
        expected: usize,
        /// The attribute's item count
        found: usize,
    },

    /// Texture pixel data does not match `width * height * 4`.
    #[error("Texture data holds {actual} bytes, {expected} required")]
    TextureDataSize {
        /// Required byte length
        expected: usize,
        /// Supplied byte length
        actual: usize,
    },

    /// Only single-sampled and 4x multisampled targets are supported.
    #[error("Unsupported multisample count {0}, expected 1 or 4")]
    InvalidSampleCount(u32),

    /// Bind group indices must run 0, 1, 2, ... without holes.
    #[error("Bind group index gap: expected index {expected}, found {found}")]
    BindGroupIndexGap {
        /// Next index the layout needs
        expected: u32,
        /// Index actually present
        found: u32,
    },

    /// Two bind groups in one pipeline group share an index.
    #[error("Duplicate bind group index {0}")]
    DuplicateBindGroupIndex(u32),

    /// A ping-pong swap was attempted between incompatible bind groups.
    #[error("Bind group at index {0} cannot be swapped: {1}")]
    BindGroupSwap(u32, &'static str),

    /// A render-only operation was applied to a compute pipeline or vice versa.
    #[error("Pipeline kind mismatch: expected {expected}, found {found}")]
    PipelineKindMismatch {
        /// Kind the operation needs
        expected: &'static str,
        /// Kind of the pipeline given
        found: &'static str,
    },

    /// Build was requested on something already built.
    #[error("{0} is already built")]
    AlreadyBuilt(&'static str),

    /// A buffer write would run past the end of the GPU allocation.
    #[error("Write of {len} bytes at offset {offset} exceeds buffer size {size}")]
    WriteOutOfBounds {
        /// Byte offset of the write
        offset: u64,
        /// Bytes written
        len: u64,
        /// Allocated size
        size: u64,
    },

    // ========================================================================
    // Image Errors
    // ========================================================================
    /// Image decoding error.
    #[error("Image decode error: {0}")]
    ImageDecodeError(String),
}

// ============================================================================
// Convenient conversion implementations
// ============================================================================

impl From<image::ImageError> for KitError {
    fn from(err: image::ImageError) -> Self {
        KitError::ImageDecodeError(err.to_string())
    }
}

impl KitError {
    pub(crate) fn missing(resource: &'static str, field: &'static str) -> Self {
        KitError::MissingField { resource, field }
    }
}

/// Alias for `Result<T, KitError>`.
pub type Result<T> = std::result::Result<T, KitError>;
