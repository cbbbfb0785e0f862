// FIMG Core Library
// OpenGL ES 1.1 fixed-function emulation and vertex batching for the
// FIMG-3DSE programmable GPU.
//
// Register writes go through a shadowed queue, vertex data is packed into a
// per-context scratch buffer and split into hardware-sized batches, and the
// fixed-function texture environment is compiled into cached vertex and
// pixel programs. All hardware access goes through an injected `Device`.

#[macro_use]
mod macros;

pub mod compat;
pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod fragment;
pub mod host;
pub mod regs;

pub use compat::{FixedFunctionState, ShaderKind, ShaderPipeline, ShaderStats};
pub use config::ContextConfig;
pub use context::{ClearMask, DrawSummary, HardwareContext};
pub use device::{BufferHandle, Device, Gpu, MemoryDevice, PipelineMask, RegisterWrite, Request};
pub use error::{DeviceError, FimgError, Result};
pub use fragment::{ColorBuffer, DepthBuffer, FragmentState, TextureImage};
pub use host::{AttributeFormat, AttributeSource, Indices, Primitive, VertexArrays};
