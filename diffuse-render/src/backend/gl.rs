//! OpenGL backend over `glow`.
//!
//! Context creation stays with the caller: hand over a `glow::Context` that
//! is current on the calling thread and keep it current for as long as the
//! backend lives. A single vertex array object is created up front so the
//! backend also works on core profiles.

use std::collections::HashMap;

use diffuse_core::{BaseType, VariableDescriptor, VariableKind};
use glow::{
    HasContext, NativeBuffer, NativeFramebuffer, NativeProgram, NativeShader, NativeTexture,
    NativeUniformLocation, NativeVertexArray,
};
use log::{debug, warn};

use super::{
    Backend, BufferHandle, BuildStatus, Filter, FramebufferHandle, Location, PixelFormat,
    PixelType, ProgramHandle, ShaderHandle, ShaderStage, TextureDesc, TextureHandle, UniformData,
};
use crate::error::RenderError;

/// Integer handle → native object map.
struct HandleTable<T> {
    next: u32,
    entries: HashMap<u32, T>,
}

impl<T: Copy> HandleTable<T> {
    fn new() -> Self {
        Self {
            next: 0,
            entries: HashMap::new(),
        }
    }

    fn insert(&mut self, value: T) -> u32 {
        self.next += 1;
        self.entries.insert(self.next, value);
        self.next
    }

    fn get(&self, id: u32) -> Option<T> {
        self.entries.get(&id).copied()
    }

    fn remove(&mut self, id: u32) -> Option<T> {
        self.entries.remove(&id)
    }
}

/// Uniform locations keyed by `(program, name)`. Re-querying a name reuses
/// its id, and a program's entries go away when it is re-linked or deleted.
struct LocationTable<T> {
    next: u32,
    ids: HashMap<(u32, String), u32>,
    entries: HashMap<u32, T>,
}

impl<T> LocationTable<T> {
    fn new() -> Self {
        Self {
            next: 0,
            ids: HashMap::new(),
            entries: HashMap::new(),
        }
    }

    fn insert(&mut self, program: u32, name: &str, value: T) -> u32 {
        let id = match self.ids.get(&(program, name.to_string())) {
            Some(&id) => id,
            None => {
                self.next += 1;
                self.ids.insert((program, name.to_string()), self.next);
                self.next
            }
        };
        self.entries.insert(id, value);
        id
    }

    fn get(&self, id: u32) -> Option<&T> {
        self.entries.get(&id)
    }

    fn forget_program(&mut self, program: u32) {
        let entries = &mut self.entries;
        self.ids.retain(|(owner, _), id| {
            if *owner == program {
                entries.remove(id);
                false
            } else {
                true
            }
        });
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

fn filter_enum(filter: Filter) -> i32 {
    match filter {
        Filter::Linear => glow::LINEAR as i32,
        Filter::Nearest => glow::NEAREST as i32,
    }
}

/// [`Backend`] implementation for OpenGL 3.x / ES 3.x contexts.
pub struct GlBackend {
    gl: glow::Context,
    vertex_array: NativeVertexArray,
    shaders: HandleTable<NativeShader>,
    programs: HandleTable<NativeProgram>,
    buffers: HandleTable<NativeBuffer>,
    textures: HandleTable<NativeTexture>,
    framebuffers: HandleTable<NativeFramebuffer>,
    /// Indexed by `Location.0` for uniforms.
    uniform_locations: LocationTable<NativeUniformLocation>,
}

impl GlBackend {
    pub fn new(gl: glow::Context) -> Result<Self, RenderError> {
        let vertex_array = unsafe { gl.create_vertex_array() }.map_err(RenderError::Backend)?;
        unsafe { gl.bind_vertex_array(Some(vertex_array)) };

        debug!("GL backend ready: {:?}", gl.version());

        Ok(Self {
            gl,
            vertex_array,
            shaders: HandleTable::new(),
            programs: HandleTable::new(),
            buffers: HandleTable::new(),
            textures: HandleTable::new(),
            framebuffers: HandleTable::new(),
            uniform_locations: LocationTable::new(),
        })
    }

    /// The wrapped context, for calls outside the backend surface.
    pub fn context(&self) -> &glow::Context {
        &self.gl
    }

    fn check_error(&self, what: &str) -> Result<(), RenderError> {
        match unsafe { self.gl.get_error() } {
            glow::NO_ERROR => Ok(()),
            code => Err(RenderError::Backend(format!("{what} failed with GL error 0x{code:04x}"))),
        }
    }
}

impl Drop for GlBackend {
    fn drop(&mut self) {
        unsafe { self.gl.delete_vertex_array(self.vertex_array) };
    }
}

impl Backend for GlBackend {
    fn create_shader(&mut self, stage: ShaderStage) -> Result<ShaderHandle, RenderError> {
        let kind = match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        };
        let shader = unsafe { self.gl.create_shader(kind) }.map_err(RenderError::Backend)?;
        Ok(ShaderHandle(self.shaders.insert(shader)))
    }

    fn shader_source(&mut self, shader: ShaderHandle, source: &str) {
        match self.shaders.get(shader.0) {
            Some(native) => unsafe { self.gl.shader_source(native, source) },
            None => warn!("shader_source on unknown shader {}", shader.0),
        }
    }

    fn compile_shader(&mut self, shader: ShaderHandle) -> BuildStatus {
        let Some(native) = self.shaders.get(shader.0) else {
            return BuildStatus::failed(format!("unknown shader {}", shader.0));
        };
        unsafe {
            self.gl.compile_shader(native);
            BuildStatus {
                success: self.gl.get_shader_compile_status(native),
                log: self.gl.get_shader_info_log(native),
            }
        }
    }

    fn delete_shader(&mut self, shader: ShaderHandle) {
        if let Some(native) = self.shaders.remove(shader.0) {
            unsafe { self.gl.delete_shader(native) };
        }
    }

    fn create_program(&mut self) -> Result<ProgramHandle, RenderError> {
        let program = unsafe { self.gl.create_program() }.map_err(RenderError::Backend)?;
        Ok(ProgramHandle(self.programs.insert(program)))
    }

    fn attach_shader(&mut self, program: ProgramHandle, shader: ShaderHandle) {
        match (self.programs.get(program.0), self.shaders.get(shader.0)) {
            (Some(p), Some(s)) => unsafe { self.gl.attach_shader(p, s) },
            _ => warn!("attach_shader({}, {}) on unknown handle", program.0, shader.0),
        }
    }

    fn detach_shader(&mut self, program: ProgramHandle, shader: ShaderHandle) {
        if let (Some(p), Some(s)) = (self.programs.get(program.0), self.shaders.get(shader.0)) {
            unsafe { self.gl.detach_shader(p, s) };
        }
    }

    fn link_program(&mut self, program: ProgramHandle) -> BuildStatus {
        let Some(native) = self.programs.get(program.0) else {
            return BuildStatus::failed(format!("unknown program {}", program.0));
        };
        self.uniform_locations.forget_program(program.0);
        unsafe {
            self.gl.link_program(native);
            BuildStatus {
                success: self.gl.get_program_link_status(native),
                log: self.gl.get_program_info_log(native),
            }
        }
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.uniform_locations.forget_program(program.0);
        if let Some(native) = self.programs.remove(program.0) {
            unsafe { self.gl.delete_program(native) };
        }
    }

    fn attribute_location(&mut self, program: ProgramHandle, name: &str) -> Option<Location> {
        let native = self.programs.get(program.0)?;
        unsafe { self.gl.get_attrib_location(native, name) }.map(Location)
    }

    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<Location> {
        let native = self.programs.get(program.0)?;
        let location = unsafe { self.gl.get_uniform_location(native, name) }?;
        Some(Location(self.uniform_locations.insert(program.0, name, location)))
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        let native = program.and_then(|p| self.programs.get(p.0));
        unsafe { self.gl.use_program(native) };
    }

    fn upload_uniform(&mut self, location: Location, descriptor: VariableDescriptor, data: UniformData<'_>) {
        let Some(native) = self.uniform_locations.get(location.0) else {
            warn!("uniform upload to unknown location {}", location.0);
            return;
        };
        let loc = Some(native);
        let gl = &self.gl;

        unsafe {
            match (data, descriptor.kind, descriptor.dimension) {
                (UniformData::Float(v), VariableKind::Scalar, _) => gl.uniform_1_f32_slice(loc, v),
                (UniformData::Float(v), VariableKind::Vector, 2) => gl.uniform_2_f32_slice(loc, v),
                (UniformData::Float(v), VariableKind::Vector, 3) => gl.uniform_3_f32_slice(loc, v),
                (UniformData::Float(v), VariableKind::Vector, 4) => gl.uniform_4_f32_slice(loc, v),
                (UniformData::Float(v), VariableKind::Matrix, 2) => {
                    gl.uniform_matrix_2_f32_slice(loc, false, v)
                }
                (UniformData::Float(v), VariableKind::Matrix, 3) => {
                    gl.uniform_matrix_3_f32_slice(loc, false, v)
                }
                (UniformData::Float(v), VariableKind::Matrix, 4) => {
                    gl.uniform_matrix_4_f32_slice(loc, false, v)
                }
                (UniformData::Int(v), VariableKind::Scalar | VariableKind::Sampler, _) => {
                    gl.uniform_1_i32_slice(loc, v)
                }
                (UniformData::Int(v), VariableKind::Vector, 2) => gl.uniform_2_i32_slice(loc, v),
                (UniformData::Int(v), VariableKind::Vector, 3) => gl.uniform_3_i32_slice(loc, v),
                (UniformData::Int(v), VariableKind::Vector, 4) => gl.uniform_4_i32_slice(loc, v),
                (data, _, _) => warn!("no uniform entry point for {descriptor} with {data:?}"),
            }
        }
    }

    fn bind_texture_unit(&mut self, unit: u32, texture: TextureHandle) {
        let Some(native) = self.textures.get(texture.0) else {
            warn!("bind of unknown texture {} to unit {unit}", texture.0);
            return;
        };
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + unit);
            self.gl.bind_texture(glow::TEXTURE_2D, Some(native));
        }
    }

    fn create_buffer(&mut self) -> Result<BufferHandle, RenderError> {
        let buffer = unsafe { self.gl.create_buffer() }.map_err(RenderError::ResourceCreation)?;
        Ok(BufferHandle(self.buffers.insert(buffer)))
    }

    fn buffer_data(&mut self, buffer: BufferHandle, bytes: &[u8]) {
        let Some(native) = self.buffers.get(buffer.0) else {
            warn!("buffer_data on unknown buffer {}", buffer.0);
            return;
        };
        unsafe {
            self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(native));
            self.gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, bytes, glow::STATIC_DRAW);
            self.gl.bind_buffer(glow::ARRAY_BUFFER, None);
        }
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        if let Some(native) = self.buffers.remove(buffer.0) {
            unsafe { self.gl.delete_buffer(native) };
        }
    }

    fn enable_attribute(&mut self, location: Location) {
        unsafe { self.gl.enable_vertex_attrib_array(location.0) };
    }

    fn disable_attribute(&mut self, location: Location) {
        unsafe { self.gl.disable_vertex_attrib_array(location.0) };
    }

    fn attribute_pointer(&mut self, location: Location, buffer: BufferHandle, descriptor: VariableDescriptor) {
        let Some(native) = self.buffers.get(buffer.0) else {
            warn!("attribute {} pointed at unknown buffer {}", location.0, buffer.0);
            return;
        };
        if descriptor.kind == VariableKind::Matrix {
            warn!("matrix attributes span several slots; only the first column is bound");
        }
        let components = i32::from(descriptor.dimension);
        unsafe {
            self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(native));
            match descriptor.base_type {
                BaseType::Float => {
                    self.gl
                        .vertex_attrib_pointer_f32(location.0, components, glow::FLOAT, false, 0, 0)
                }
                BaseType::Int => {
                    self.gl
                        .vertex_attrib_pointer_i32(location.0, components, glow::INT, 0, 0)
                }
            }
            self.gl.bind_buffer(glow::ARRAY_BUFFER, None);
        }
    }

    fn draw_triangles(&mut self, vertex_count: usize) -> Result<(), RenderError> {
        let count = i32::try_from(vertex_count)
            .map_err(|_| RenderError::Backend(format!("vertex count {vertex_count} out of range")))?;
        unsafe { self.gl.draw_arrays(glow::TRIANGLES, 0, count) };
        self.check_error("glDrawArrays")
    }

    fn create_texture(&mut self, desc: &TextureDesc, data: Option<&[u8]>) -> Result<TextureHandle, RenderError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RenderError::ResourceCreation(format!(
                "texture size {}x{} is empty",
                desc.width, desc.height
            )));
        }
        if data.is_some_and(|bytes| bytes.len() != desc.byte_len()) {
            return Err(RenderError::ResourceCreation(format!(
                "texture data does not match {}x{} {:?}/{:?}",
                desc.width, desc.height, desc.format, desc.pixel_type
            )));
        }

        let (format, internal_format) = match (desc.format, desc.pixel_type) {
            (PixelFormat::Rgb, PixelType::UnsignedByte) => (glow::RGB, glow::RGB8),
            (PixelFormat::Rgba, PixelType::UnsignedByte) => (glow::RGBA, glow::RGBA8),
            (PixelFormat::Rgb, PixelType::Float) => (glow::RGB, glow::RGB32F),
            (PixelFormat::Rgba, PixelType::Float) => (glow::RGBA, glow::RGBA32F),
        };
        let ty = match desc.pixel_type {
            PixelType::UnsignedByte => glow::UNSIGNED_BYTE,
            PixelType::Float => glow::FLOAT,
        };

        let texture = unsafe { self.gl.create_texture() }.map_err(RenderError::ResourceCreation)?;
        unsafe {
            let gl = &self.gl;
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::NEAREST as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, filter_enum(desc.filter));
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                internal_format as i32,
                desc.width as i32,
                desc.height as i32,
                0,
                format,
                ty,
                data,
            );
            gl.bind_texture(glow::TEXTURE_2D, None);
        }

        if let Err(err) = self.check_error("glTexImage2D") {
            unsafe { self.gl.delete_texture(texture) };
            return Err(RenderError::ResourceCreation(err.to_string()));
        }
        Ok(TextureHandle(self.textures.insert(texture)))
    }

    fn set_texture_filter(&mut self, texture: TextureHandle, filter: Filter) {
        let Some(native) = self.textures.get(texture.0) else {
            warn!("set_texture_filter on unknown texture {}", texture.0);
            return;
        };
        unsafe {
            self.gl.bind_texture(glow::TEXTURE_2D, Some(native));
            self.gl
                .tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, filter_enum(filter));
        }
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        if let Some(native) = self.textures.remove(texture.0) {
            unsafe { self.gl.delete_texture(native) };
        }
    }

    fn create_framebuffer(&mut self, color: TextureHandle) -> Result<FramebufferHandle, RenderError> {
        let texture = self
            .textures
            .get(color.0)
            .ok_or_else(|| RenderError::ResourceCreation(format!("texture {} does not exist", color.0)))?;
        let framebuffer =
            unsafe { self.gl.create_framebuffer() }.map_err(RenderError::ResourceCreation)?;

        let status = unsafe {
            let gl = &self.gl;
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(framebuffer));
            gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(texture),
                0,
            );
            gl.draw_buffers(&[glow::COLOR_ATTACHMENT0]);
            let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            status
        };

        if status != glow::FRAMEBUFFER_COMPLETE {
            unsafe { self.gl.delete_framebuffer(framebuffer) };
            return Err(RenderError::ResourceCreation(format!(
                "framebuffer incomplete (status 0x{status:04x})"
            )));
        }
        Ok(FramebufferHandle(self.framebuffers.insert(framebuffer)))
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) {
        let native = framebuffer.and_then(|f| self.framebuffers.get(f.0));
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, native) };
    }

    fn viewport(&mut self, width: u32, height: u32) {
        unsafe { self.gl.viewport(0, 0, width as i32, height as i32) };
    }

    /// Leaves the visible surface bound afterwards.
    fn read_pixels(&mut self, framebuffer: FramebufferHandle, width: u32, height: u32) -> Result<Vec<f32>, RenderError> {
        let native = self
            .framebuffers
            .get(framebuffer.0)
            .ok_or_else(|| RenderError::Backend(format!("unknown framebuffer {}", framebuffer.0)))?;

        let mut bytes = vec![0u8; width as usize * height as usize * 4 * std::mem::size_of::<f32>()];
        unsafe {
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(native));
            self.gl.read_pixels(
                0,
                0,
                width as i32,
                height as i32,
                glow::RGBA,
                glow::FLOAT,
                glow::PixelPackData::Slice(&mut bytes),
            );
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, None);
        }
        self.check_error("glReadPixels")?;

        Ok(bytes
            .chunks_exact(4)
            .map(bytemuck::pod_read_unaligned::<f32>)
            .collect())
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        if let Some(native) = self.framebuffers.remove(framebuffer.0) {
            unsafe { self.gl.delete_framebuffer(native) };
        }
    }

    fn flush(&mut self) {
        unsafe { self.gl.flush() };
    }
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_table_mints_unique_ids() {
        let mut table = HandleTable::new();
        let a = table.insert(10u8);
        let b = table.insert(20u8);
        assert_ne!(a, b);
        assert_eq!(table.get(a), Some(10));
        assert_eq!(table.remove(a), Some(10));
        assert_eq!(table.get(a), None);
        // Ids are never reused.
        assert!(table.insert(30u8) > b);
    }

    #[test]
    fn test_location_table_reuses_ids_per_program() {
        let mut table = LocationTable::new();
        let tint = table.insert(1, "u_tint", 'a');
        let gain = table.insert(1, "u_gain", 'b');
        let other = table.insert(2, "u_tint", 'c');
        assert_ne!(tint, other);

        // Same program, same name.
        assert_eq!(table.insert(1, "u_tint", 'd'), tint);
        assert_eq!(table.get(tint), Some(&'d'));
        assert_eq!(table.len(), 3);

        table.forget_program(1);
        assert_eq!(table.get(tint), None);
        assert_eq!(table.get(gain), None);
        assert_eq!(table.get(other), Some(&'c'));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_filter_enum() {
        assert_eq!(filter_enum(Filter::Linear), glow::LINEAR as i32);
        assert_eq!(filter_enum(Filter::Nearest), glow::NEAREST as i32);
    }
}
