//! GPU backend capability.
//!
//! Everything above this module talks to the GPU exclusively through the
//! [`Backend`] trait, passed explicitly as `&mut impl Backend`. Handles are
//! plain integers minted by the backend; the backend maps them to its own
//! native objects.
//!
//! Two implementations ship with the crate:
//!
//! - [`headless::HeadlessBackend`]: CPU-side emulation that records every
//!   command. Used by tests, benchmarks and machines without a GPU.
//! - [`gl::GlBackend`]: OpenGL through `glow`, for callers that own a
//!   current GL context.

pub mod gl;
pub mod headless;

use diffuse_core::VariableDescriptor;

use crate::error::RenderError;

macro_rules! handle {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u32);
        )*
    };
}

handle!(
    /// Backend shader object.
    ShaderHandle,
    /// Backend program object.
    ProgramHandle,
    /// Backend vertex buffer.
    BufferHandle,
    /// Backend 2D texture.
    TextureHandle,
    /// Backend framebuffer object.
    FramebufferHandle,
    /// Resolved attribute or uniform location inside a linked program.
    Location,
);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

/// Outcome of a compile or link, with the backend's info log.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildStatus {
    pub success: bool,
    pub log: String,
}

impl BuildStatus {
    pub fn ok() -> Self {
        Self {
            success: true,
            log: String::new(),
        }
    }

    pub fn failed(log: impl Into<String>) -> Self {
        Self {
            success: false,
            log: log.into(),
        }
    }
}

/// Uniform payload, tagged by base type.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformData<'a> {
    Int(&'a [i32]),
    Float(&'a [f32]),
}

impl UniformData<'_> {
    pub fn len(&self) -> usize {
        match self {
            UniformData::Int(v) => v.len(),
            UniformData::Float(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgb,
    Rgba,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Rgb => 3,
            PixelFormat::Rgba => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelType {
    UnsignedByte,
    Float,
}

impl PixelType {
    pub fn size(self) -> usize {
        match self {
            PixelType::UnsignedByte => 1,
            PixelType::Float => 4,
        }
    }
}

/// Magnification filter of a texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Filter {
    Linear,
    Nearest,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub pixel_type: PixelType,
    pub filter: Filter,
}

impl TextureDesc {
    /// Size in bytes of a tightly packed upload for this description.
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.channels() * self.pixel_type.size()
    }
}

/// The GPU operations the reflection and scheduling layers rely on.
///
/// Calls are synchronous and issued from a single thread. Methods that
/// cannot fail in the underlying API return nothing; an implementation that
/// receives an unknown handle should log it and do nothing.
pub trait Backend {
    // ── Shaders ─────────────────────────────────────────────────
    fn create_shader(&mut self, stage: ShaderStage) -> Result<ShaderHandle, RenderError>;
    fn shader_source(&mut self, shader: ShaderHandle, source: &str);
    fn compile_shader(&mut self, shader: ShaderHandle) -> BuildStatus;
    fn delete_shader(&mut self, shader: ShaderHandle);

    // ── Programs ────────────────────────────────────────────────
    fn create_program(&mut self) -> Result<ProgramHandle, RenderError>;
    fn attach_shader(&mut self, program: ProgramHandle, shader: ShaderHandle);
    fn detach_shader(&mut self, program: ProgramHandle, shader: ShaderHandle);
    fn link_program(&mut self, program: ProgramHandle) -> BuildStatus;
    fn delete_program(&mut self, program: ProgramHandle);
    fn attribute_location(&mut self, program: ProgramHandle, name: &str) -> Option<Location>;
    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<Location>;
    fn use_program(&mut self, program: Option<ProgramHandle>);

    /// Upload a uniform value. `descriptor` selects the entry point
    /// (scalar/vector/matrix, arity); samplers receive their unit index.
    fn upload_uniform(&mut self, location: Location, descriptor: VariableDescriptor, data: UniformData<'_>);
    /// Make `unit` the active texture unit and bind `texture` to it.
    fn bind_texture_unit(&mut self, unit: u32, texture: TextureHandle);

    // ── Vertex data ─────────────────────────────────────────────
    fn create_buffer(&mut self) -> Result<BufferHandle, RenderError>;
    fn buffer_data(&mut self, buffer: BufferHandle, bytes: &[u8]);
    fn delete_buffer(&mut self, buffer: BufferHandle);
    fn enable_attribute(&mut self, location: Location);
    fn disable_attribute(&mut self, location: Location);
    /// Point `location` at `buffer`, read as tightly packed elements with
    /// the arity and base type of `descriptor`.
    fn attribute_pointer(&mut self, location: Location, buffer: BufferHandle, descriptor: VariableDescriptor);
    /// Draw `vertex_count` vertices as a triangle list.
    fn draw_triangles(&mut self, vertex_count: usize) -> Result<(), RenderError>;

    // ── Textures & framebuffers ─────────────────────────────────
    fn create_texture(&mut self, desc: &TextureDesc, data: Option<&[u8]>) -> Result<TextureHandle, RenderError>;
    fn set_texture_filter(&mut self, texture: TextureHandle, filter: Filter);
    fn delete_texture(&mut self, texture: TextureHandle);
    /// Create a framebuffer with `color` as its only color attachment.
    /// Fails with [`RenderError::ResourceCreation`] when incomplete.
    fn create_framebuffer(&mut self, color: TextureHandle) -> Result<FramebufferHandle, RenderError>;
    /// Bind a framebuffer as render target; `None` is the visible surface.
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>);
    fn viewport(&mut self, width: u32, height: u32);
    /// Read back the RGBA float contents of a framebuffer.
    fn read_pixels(&mut self, framebuffer: FramebufferHandle, width: u32, height: u32) -> Result<Vec<f32>, RenderError>;
    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle);
    fn flush(&mut self);
}
