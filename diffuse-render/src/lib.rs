//! # diffuse-render
//!
//! Type-checked shader programs and a ping-pong diffusion scheduler over an
//! abstract GPU backend.
//!
//! ## Architecture
//!
//! ```text
//!  shader source
//!       │
//!       ▼
//!  ShaderUnit::from_source()   ◀─── compile + extract (diffuse-core)
//!       │
//!       ▼
//!  Program.attach() / link()   ◀─── classify, aggregate, resolve locations
//!       │
//!       ▼
//!  Program.set_*()             ◀─── type/shape checked values
//!       │
//!       ▼
//!  DiffusionScheduler          ◀─── N passes over a framebuffer pair
//!       │
//!       ▼
//!  Backend (headless | glow)
//! ```
//!
//! ## Crate modules
//!
//! - [`backend`]: the `Backend` trait, headless and OpenGL implementations
//! - [`shader`]: compiled shader stages
//! - [`program`]: linked programs and their variable registries
//! - [`resource`]: buffers, textures, framebuffers
//! - [`value`]: element types and stored uniform values
//! - [`scheduler`]: the multi-pass render loop
//! - [`config`]: scheduler configuration
//! - [`dump`]: red-channel text output

pub mod backend;
pub mod config;
pub mod dump;
pub mod error;
pub mod program;
pub mod resource;
pub mod scheduler;
pub mod shader;
pub mod value;

// Re-exports for convenience
pub use backend::gl::GlBackend;
pub use backend::headless::HeadlessBackend;
pub use backend::{Backend, Filter, PixelFormat, PixelType, ShaderStage, TextureDesc};
pub use config::DiffusionConfig;
pub use dump::{dump_red_channel, write_red_channel};
pub use error::RenderError;
pub use program::{AttributeBinding, Program, ProgramVariable, UniformSlot};
pub use resource::{Buffer, FrameBuffer, Texture};
pub use scheduler::{DiffusionScheduler, FrameStats};
pub use shader::ShaderUnit;
pub use value::{Element, UniformValue};
