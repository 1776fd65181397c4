#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod errors;
pub mod label;
pub mod settings;
pub mod device;
pub mod canvas;
pub mod buffer;
pub mod attribute;
pub mod vao;
pub mod index_buffer;
pub mod uniform;
pub mod storage;
pub mod texture;
pub mod sampler;
pub mod bind_group;
pub mod pipeline;
pub mod pipeline_group;
pub mod executor;

pub use errors::{KitError, Result};
pub use label::Label;
pub use settings::ContextSettings;
pub use device::{CommandBuffer, DeviceContext, GpuBackend, RecordingBackend, WgpuBackend};
pub use canvas::Canvas;
pub use buffer::{BufferRole, CpuBuffer, Element, ElementKind, GpuBuffer};
pub use attribute::{Attribute, AttributeOptions};
pub use vao::{VertexAttributeObject, VertexAttributeObjectOptions};
pub use index_buffer::{IndexBuffer, IndexBufferOptions};
pub use uniform::{Uniform, UniformOptions};
pub use storage::{Storage, StorageOptions};
pub use texture::{MipLevel, Texture, TextureOptions};
pub use sampler::{Sampler, SamplerOptions};
pub use bind_group::{BindGroup, BindGroupOptions};
pub use pipeline::{
    ComputePipeline, ComputePipelineOptions, PassContext, PassHook, Pipeline, PipelineKind,
    RenderPipeline, RenderPipelineOptions, Workgroups,
};
pub use pipeline_group::{PipelineGroup, PipelineGroupOptions};
pub use executor::{Executor, ExecutorOptions};
