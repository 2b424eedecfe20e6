//! Headless backend: a CPU-side stand-in for a GPU.
//!
//! Emulation rules:
//!
//! - **Compile** fails when the source is blank or contains a `#error`
//!   directive; the log mimics a GLSL compiler message.
//! - **Link** fails with no shaders attached, with an uncompiled shader, or
//!   when armed with [`HeadlessBackend::reject_next_link`].
//! - **Locations**: a name is active when it is declared in one of the
//!   program's attached sources and has not been [`deactivated`]. Attribute
//!   and uniform locations are numbered independently in query order.
//! - **Draws** into a framebuffer run a "stamp" shader: the output is the
//!   texture on the lowest sampler unit written since `use_program`, with
//!   its red channel incremented by one, or `(1, 0, 0, 1)` everywhere when
//!   the program samples nothing. Sampling the render target is an error.
//!
//! Every state-changing call is recorded as a [`Command`] for inspection.
//!
//! [`deactivated`]: HeadlessBackend::deactivate

use std::collections::{HashMap, HashSet};
use std::mem;

use diffuse_core::{extract_interface, VariableDescriptor};
use hashlink::LinkedHashMap;
use log::{debug, warn};

use super::{
    Backend, BufferHandle, BuildStatus, Filter, FramebufferHandle, Location, PixelFormat,
    PixelType, ProgramHandle, ShaderHandle, ShaderStage, TextureDesc, TextureHandle, UniformData,
};
use crate::error::RenderError;

/// Owned copy of an uploaded uniform value.
#[derive(Clone, Debug, PartialEq)]
pub enum UniformRecord {
    Int(Vec<i32>),
    Float(Vec<f32>),
}

/// A recorded backend call.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    UseProgram(Option<ProgramHandle>),
    Uniform {
        location: Location,
        descriptor: VariableDescriptor,
        value: UniformRecord,
    },
    BindTexture {
        unit: u32,
        texture: TextureHandle,
    },
    EnableAttribute(Location),
    DisableAttribute(Location),
    AttributePointer {
        location: Location,
        buffer: BufferHandle,
        descriptor: VariableDescriptor,
    },
    Draw {
        program: ProgramHandle,
        target: Option<FramebufferHandle>,
        vertex_count: usize,
    },
    BindFramebuffer(Option<FramebufferHandle>),
    Viewport {
        width: u32,
        height: u32,
    },
    TextureFilter {
        texture: TextureHandle,
        filter: Filter,
    },
    Flush,
}

struct ShaderObject {
    stage: ShaderStage,
    source: String,
    compiled: bool,
}

#[derive(Default)]
struct ProgramObject {
    shaders: Vec<ShaderHandle>,
    linked: bool,
    active: HashSet<String>,
    attribute_locations: LinkedHashMap<String, Location>,
    uniform_locations: LinkedHashMap<String, Location>,
}

struct TextureObject {
    width: u32,
    height: u32,
    format: PixelFormat,
    filter: Filter,
    /// RGBA, row major.
    pixels: Vec<f32>,
}

/// CPU-side [`Backend`] used for tests and GPU-less environments.
#[derive(Default)]
pub struct HeadlessBackend {
    next_id: u32,
    shaders: HashMap<ShaderHandle, ShaderObject>,
    programs: HashMap<ProgramHandle, ProgramObject>,
    buffers: HashMap<BufferHandle, Vec<u8>>,
    textures: HashMap<TextureHandle, TextureObject>,
    framebuffers: HashMap<FramebufferHandle, TextureHandle>,

    current_program: Option<ProgramHandle>,
    current_framebuffer: Option<FramebufferHandle>,
    texture_units: HashMap<u32, TextureHandle>,
    sampled_units: Vec<u32>,
    enabled_attributes: HashSet<Location>,

    inactive: HashSet<String>,
    reject_next_link: bool,
    fail_draws_after: Option<usize>,

    draws: usize,
    surface_draws: usize,
    commands: Vec<Command>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn mint(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    // ───────────────────── Fault injection ────────────────────────

    /// Report `name` as having no active location in every program, as an
    /// optimising compiler would for an unused variable.
    pub fn deactivate(&mut self, name: impl Into<String>) {
        self.inactive.insert(name.into());
    }

    /// Make the next `link_program` call fail.
    pub fn reject_next_link(&mut self) {
        self.reject_next_link = true;
    }

    /// Let `count` more draws succeed, then fail every draw after that.
    pub fn fail_draws_after(&mut self, count: usize) {
        self.fail_draws_after = Some(self.draws + count);
    }

    // ───────────────────── Inspection ─────────────────────────────

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        mem::take(&mut self.commands)
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn current_program(&self) -> Option<ProgramHandle> {
        self.current_program
    }

    pub fn current_framebuffer(&self) -> Option<FramebufferHandle> {
        self.current_framebuffer
    }

    pub fn enabled_attribute_count(&self) -> usize {
        self.enabled_attributes.len()
    }

    /// Successful draws, off-screen and on-screen.
    pub fn draw_count(&self) -> usize {
        self.draws
    }

    /// Successful draws into the visible surface.
    pub fn surface_draws(&self) -> usize {
        self.surface_draws
    }

    pub fn texture_pixels(&self, texture: TextureHandle) -> Option<&[f32]> {
        self.textures.get(&texture).map(|t| t.pixels.as_slice())
    }

    pub fn texture_filter(&self, texture: TextureHandle) -> Option<Filter> {
        self.textures.get(&texture).map(|t| t.filter)
    }

    pub fn buffer_bytes(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(Vec::as_slice)
    }

    pub fn shader_stage(&self, shader: ShaderHandle) -> Option<ShaderStage> {
        self.shaders.get(&shader).map(|s| s.stage)
    }

    /// Number of backend objects that have been created and not deleted.
    pub fn live_objects(&self) -> usize {
        self.shaders.len()
            + self.programs.len()
            + self.buffers.len()
            + self.textures.len()
            + self.framebuffers.len()
    }

    // ───────────────────── Emulation ──────────────────────────────

    fn resolve(&mut self, program: ProgramHandle, name: &str, uniform: bool) -> Option<Location> {
        let object = self.programs.get_mut(&program)?;
        if !object.linked || !object.active.contains(name) || self.inactive.contains(name) {
            return None;
        }
        let locations = if uniform {
            &mut object.uniform_locations
        } else {
            &mut object.attribute_locations
        };
        if let Some(location) = locations.get(name) {
            return Some(*location);
        }
        let location = Location(locations.len() as u32);
        locations.insert(name.to_string(), location);
        Some(location)
    }

    fn stamp(&mut self, framebuffer: FramebufferHandle) -> Result<(), RenderError> {
        let target = *self
            .framebuffers
            .get(&framebuffer)
            .ok_or_else(|| RenderError::Backend(format!("unknown framebuffer {}", framebuffer.0)))?;

        let source = self
            .sampled_units
            .iter()
            .min()
            .and_then(|unit| self.texture_units.get(unit))
            .copied();
        if source == Some(target) {
            return Err(RenderError::Backend(format!(
                "texture {} is sampled while being rendered to",
                target.0
            )));
        }

        let source_pixels = source
            .and_then(|s| self.textures.get(&s))
            .map(|t| t.pixels.clone());
        let texture = self
            .textures
            .get_mut(&target)
            .ok_or_else(|| RenderError::Backend(format!("unknown texture {}", target.0)))?;

        texture.pixels = match source_pixels {
            Some(src) if src.len() == texture.pixels.len() => src
                .chunks_exact(4)
                .flat_map(|p| [p[0] + 1.0, p[1], p[2], p[3]])
                .collect(),
            _ => [1.0f32, 0.0, 0.0, 1.0].repeat(texture.pixels.len() / 4),
        };
        Ok(())
    }
}

fn decode_pixels(desc: &TextureDesc, data: Option<&[u8]>) -> Vec<f32> {
    let values: Vec<f32> = match (data, desc.pixel_type) {
        (None, _) => vec![0.0; desc.width as usize * desc.height as usize * desc.format.channels()],
        (Some(bytes), PixelType::Float) => bytes
            .chunks_exact(4)
            .map(bytemuck::pod_read_unaligned::<f32>)
            .collect(),
        (Some(bytes), PixelType::UnsignedByte) => {
            bytes.iter().map(|&b| f32::from(b) / 255.0).collect()
        }
    };
    match desc.format {
        PixelFormat::Rgba => values,
        PixelFormat::Rgb => values
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 1.0])
            .collect(),
    }
}

impl Backend for HeadlessBackend {
    fn create_shader(&mut self, stage: ShaderStage) -> Result<ShaderHandle, RenderError> {
        let handle = ShaderHandle(self.mint());
        self.shaders.insert(
            handle,
            ShaderObject {
                stage,
                source: String::new(),
                compiled: false,
            },
        );
        Ok(handle)
    }

    fn shader_source(&mut self, shader: ShaderHandle, source: &str) {
        match self.shaders.get_mut(&shader) {
            Some(object) => {
                object.source = source.to_string();
                object.compiled = false;
            }
            None => warn!("shader_source on unknown shader {}", shader.0),
        }
    }

    fn compile_shader(&mut self, shader: ShaderHandle) -> BuildStatus {
        let Some(object) = self.shaders.get_mut(&shader) else {
            return BuildStatus::failed(format!("unknown shader {}", shader.0));
        };
        if object.source.trim().is_empty() {
            object.compiled = false;
            return BuildStatus::failed("ERROR: 0:0: '' : empty source");
        }
        let errors: Vec<String> = object
            .source
            .lines()
            .enumerate()
            .filter_map(|(i, line)| {
                line.trim_start()
                    .strip_prefix("#error")
                    .map(|msg| format!("ERROR: 0:{}: '#error' : {}", i + 1, msg.trim()))
            })
            .collect();
        object.compiled = errors.is_empty();
        if object.compiled {
            BuildStatus::ok()
        } else {
            BuildStatus::failed(errors.join("\n"))
        }
    }

    fn delete_shader(&mut self, shader: ShaderHandle) {
        self.shaders.remove(&shader);
    }

    fn create_program(&mut self) -> Result<ProgramHandle, RenderError> {
        let handle = ProgramHandle(self.mint());
        self.programs.insert(handle, ProgramObject::default());
        Ok(handle)
    }

    fn attach_shader(&mut self, program: ProgramHandle, shader: ShaderHandle) {
        match self.programs.get_mut(&program) {
            Some(object) if !object.shaders.contains(&shader) => object.shaders.push(shader),
            Some(_) => debug!("shader {} already attached to program {}", shader.0, program.0),
            None => warn!("attach_shader on unknown program {}", program.0),
        }
    }

    fn detach_shader(&mut self, program: ProgramHandle, shader: ShaderHandle) {
        if let Some(object) = self.programs.get_mut(&program) {
            object.shaders.retain(|s| *s != shader);
        }
    }

    fn link_program(&mut self, program: ProgramHandle) -> BuildStatus {
        let Some(object) = self.programs.get(&program) else {
            return BuildStatus::failed(format!("unknown program {}", program.0));
        };
        let shaders = object.shaders.clone();

        let status = if mem::take(&mut self.reject_next_link) {
            BuildStatus::failed("error: link rejected")
        } else if shaders.is_empty() {
            BuildStatus::failed("error: no shaders attached")
        } else if let Some(bad) = shaders
            .iter()
            .find(|s| !self.shaders.get(*s).is_some_and(|o| o.compiled))
        {
            BuildStatus::failed(format!("error: shader {} is not compiled", bad.0))
        } else {
            BuildStatus::ok()
        };

        let active: HashSet<String> = if status.success {
            shaders
                .iter()
                .filter_map(|s| self.shaders.get(s))
                .flat_map(|o| {
                    extract_interface(&o.source)
                        .names()
                        .map(str::to_string)
                        .collect::<Vec<_>>()
                })
                .collect()
        } else {
            HashSet::new()
        };

        if let Some(object) = self.programs.get_mut(&program) {
            object.linked = status.success;
            object.active = active;
            object.attribute_locations.clear();
            object.uniform_locations.clear();
        }
        status
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn attribute_location(&mut self, program: ProgramHandle, name: &str) -> Option<Location> {
        self.resolve(program, name, false)
    }

    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<Location> {
        self.resolve(program, name, true)
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        self.current_program = program;
        self.sampled_units.clear();
        self.commands.push(Command::UseProgram(program));
    }

    fn upload_uniform(&mut self, location: Location, descriptor: VariableDescriptor, data: UniformData<'_>) {
        if self.current_program.is_none() {
            warn!("uniform upload to location {} with no program in use", location.0);
        }
        let value = match data {
            UniformData::Int(v) => UniformRecord::Int(v.to_vec()),
            UniformData::Float(v) => UniformRecord::Float(v.to_vec()),
        };
        if let (true, UniformRecord::Int(units)) = (descriptor.is_sampler(), &value) {
            self.sampled_units.extend(units.iter().map(|&u| u as u32));
        }
        self.commands.push(Command::Uniform {
            location,
            descriptor,
            value,
        });
    }

    fn bind_texture_unit(&mut self, unit: u32, texture: TextureHandle) {
        self.texture_units.insert(unit, texture);
        self.commands.push(Command::BindTexture { unit, texture });
    }

    fn create_buffer(&mut self) -> Result<BufferHandle, RenderError> {
        let handle = BufferHandle(self.mint());
        self.buffers.insert(handle, Vec::new());
        Ok(handle)
    }

    fn buffer_data(&mut self, buffer: BufferHandle, bytes: &[u8]) {
        match self.buffers.get_mut(&buffer) {
            Some(data) => *data = bytes.to_vec(),
            None => warn!("buffer_data on unknown buffer {}", buffer.0),
        }
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer);
    }

    fn enable_attribute(&mut self, location: Location) {
        self.enabled_attributes.insert(location);
        self.commands.push(Command::EnableAttribute(location));
    }

    fn disable_attribute(&mut self, location: Location) {
        self.enabled_attributes.remove(&location);
        self.commands.push(Command::DisableAttribute(location));
    }

    fn attribute_pointer(&mut self, location: Location, buffer: BufferHandle, descriptor: VariableDescriptor) {
        if !self.buffers.contains_key(&buffer) {
            warn!("attribute {} pointed at unknown buffer {}", location.0, buffer.0);
        }
        self.commands.push(Command::AttributePointer {
            location,
            buffer,
            descriptor,
        });
    }

    fn draw_triangles(&mut self, vertex_count: usize) -> Result<(), RenderError> {
        let program = self
            .current_program
            .ok_or_else(|| RenderError::Backend("draw issued with no program in use".into()))?;
        if self.fail_draws_after.is_some_and(|limit| self.draws >= limit) {
            return Err(RenderError::Backend(format!("draw {} failed", self.draws)));
        }

        match self.current_framebuffer {
            Some(framebuffer) => self.stamp(framebuffer)?,
            None => self.surface_draws += 1,
        }

        self.draws += 1;
        self.commands.push(Command::Draw {
            program,
            target: self.current_framebuffer,
            vertex_count,
        });
        Ok(())
    }

    fn create_texture(&mut self, desc: &TextureDesc, data: Option<&[u8]>) -> Result<TextureHandle, RenderError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RenderError::ResourceCreation(format!(
                "texture size {}x{} is empty",
                desc.width, desc.height
            )));
        }
        if let Some(bytes) = data {
            if bytes.len() != desc.byte_len() {
                return Err(RenderError::ResourceCreation(format!(
                    "texture data is {} bytes, expected {}",
                    bytes.len(),
                    desc.byte_len()
                )));
            }
        }

        let handle = TextureHandle(self.mint());
        self.textures.insert(
            handle,
            TextureObject {
                width: desc.width,
                height: desc.height,
                format: desc.format,
                filter: desc.filter,
                pixels: decode_pixels(desc, data),
            },
        );
        Ok(handle)
    }

    fn set_texture_filter(&mut self, texture: TextureHandle, filter: Filter) {
        match self.textures.get_mut(&texture) {
            Some(object) => object.filter = filter,
            None => warn!("set_texture_filter on unknown texture {}", texture.0),
        }
        self.commands.push(Command::TextureFilter { texture, filter });
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
        self.texture_units.retain(|_, t| *t != texture);
    }

    fn create_framebuffer(&mut self, color: TextureHandle) -> Result<FramebufferHandle, RenderError> {
        let format = self
            .textures
            .get(&color)
            .map(|t| t.format)
            .ok_or_else(|| RenderError::ResourceCreation(format!("texture {} does not exist", color.0)))?;
        if format != PixelFormat::Rgba {
            return Err(RenderError::ResourceCreation(
                "framebuffer incomplete: color attachment must be RGBA".into(),
            ));
        }
        let handle = FramebufferHandle(self.mint());
        self.framebuffers.insert(handle, color);
        Ok(handle)
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) {
        self.current_framebuffer = framebuffer;
        self.commands.push(Command::BindFramebuffer(framebuffer));
    }

    fn viewport(&mut self, width: u32, height: u32) {
        self.commands.push(Command::Viewport { width, height });
    }

    fn read_pixels(&mut self, framebuffer: FramebufferHandle, width: u32, height: u32) -> Result<Vec<f32>, RenderError> {
        let texture = self
            .framebuffers
            .get(&framebuffer)
            .and_then(|t| self.textures.get(t))
            .ok_or_else(|| RenderError::Backend(format!("unknown framebuffer {}", framebuffer.0)))?;
        if (texture.width, texture.height) != (width, height) {
            return Err(RenderError::Backend(format!(
                "read of {width}x{height} from a {}x{} framebuffer",
                texture.width, texture.height
            )));
        }
        Ok(texture.pixels.clone())
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.framebuffers.remove(&framebuffer);
        if self.current_framebuffer == Some(framebuffer) {
            self.current_framebuffer = None;
        }
    }

    fn flush(&mut self) {
        self.commands.push(Command::Flush);
    }
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use diffuse_core::BaseType;

    fn rgba_desc(width: u32, height: u32) -> TextureDesc {
        TextureDesc {
            width,
            height,
            format: PixelFormat::Rgba,
            pixel_type: PixelType::Float,
            filter: Filter::Nearest,
        }
    }

    fn compiled(gpu: &mut HeadlessBackend, stage: ShaderStage, src: &str) -> ShaderHandle {
        let shader = gpu.create_shader(stage).unwrap();
        gpu.shader_source(shader, src);
        assert!(gpu.compile_shader(shader).success);
        shader
    }

    #[test]
    fn test_compile_error_directive() {
        let mut gpu = HeadlessBackend::new();
        let shader = gpu.create_shader(ShaderStage::Fragment).unwrap();
        gpu.shader_source(shader, "void main() {}\n  #error unsupported target\n");
        let status = gpu.compile_shader(shader);
        assert!(!status.success);
        assert_eq!(status.log, "ERROR: 0:2: '#error' : unsupported target");
    }

    #[test]
    fn test_compile_empty_source_fails() {
        let mut gpu = HeadlessBackend::new();
        let shader = gpu.create_shader(ShaderStage::Vertex).unwrap();
        gpu.shader_source(shader, "   \n");
        assert!(!gpu.compile_shader(shader).success);
    }

    #[test]
    fn test_link_requires_compiled_shaders() {
        let mut gpu = HeadlessBackend::new();
        let program = gpu.create_program().unwrap();
        assert!(!gpu.link_program(program).success);

        let shader = gpu.create_shader(ShaderStage::Vertex).unwrap();
        gpu.shader_source(shader, "attribute vec2 a_vertex;");
        gpu.attach_shader(program, shader);
        assert!(!gpu.link_program(program).success);

        assert!(gpu.compile_shader(shader).success);
        assert!(gpu.link_program(program).success);
    }

    #[test]
    fn test_reject_next_link_is_one_shot() {
        let mut gpu = HeadlessBackend::new();
        let program = gpu.create_program().unwrap();
        let shader = compiled(&mut gpu, ShaderStage::Vertex, "attribute vec2 a_vertex;");
        gpu.attach_shader(program, shader);

        gpu.reject_next_link();
        assert!(!gpu.link_program(program).success);
        assert!(gpu.link_program(program).success);
    }

    #[test]
    fn test_locations_follow_declarations() {
        let mut gpu = HeadlessBackend::new();
        let program = gpu.create_program().unwrap();
        let shader = compiled(
            &mut gpu,
            ShaderStage::Vertex,
            "attribute vec2 a_vertex;\nuniform float u_a;\nuniform float u_b;\n",
        );
        gpu.attach_shader(program, shader);
        assert!(gpu.link_program(program).success);

        assert_eq!(gpu.attribute_location(program, "a_vertex"), Some(Location(0)));
        assert_eq!(gpu.uniform_location(program, "u_b"), Some(Location(0)));
        assert_eq!(gpu.uniform_location(program, "u_a"), Some(Location(1)));
        assert_eq!(gpu.uniform_location(program, "u_b"), Some(Location(0)));
        assert_eq!(gpu.uniform_location(program, "u_missing"), None);

        gpu.deactivate("u_a");
        assert_eq!(gpu.uniform_location(program, "u_a"), None);
    }

    #[test]
    fn test_stamp_draws() {
        let mut gpu = HeadlessBackend::new();
        let program = gpu.create_program().unwrap();
        let first = gpu.create_texture(&rgba_desc(2, 2), None).unwrap();
        let second = gpu.create_texture(&rgba_desc(2, 2), None).unwrap();
        let fb_first = gpu.create_framebuffer(first).unwrap();
        let fb_second = gpu.create_framebuffer(second).unwrap();

        // Nothing sampled: solid fill.
        gpu.use_program(Some(program));
        gpu.bind_framebuffer(Some(fb_first));
        gpu.draw_triangles(6).unwrap();
        assert!(gpu.texture_pixels(first).unwrap().chunks(4).all(|p| p == [1.0f32, 0.0, 0.0, 1.0]));

        // Sampling `first` on unit 0 increments red.
        gpu.use_program(Some(program));
        gpu.bind_texture_unit(0, first);
        gpu.upload_uniform(Location(0), VariableDescriptor::sampler(2), UniformData::Int(&[0]));
        gpu.bind_framebuffer(Some(fb_second));
        gpu.draw_triangles(6).unwrap();
        assert!(gpu.texture_pixels(second).unwrap().chunks(4).all(|p| p[0] == 2.0));

        let pixels = gpu.read_pixels(fb_second, 2, 2).unwrap();
        assert_eq!(pixels.len(), 16);
        assert_eq!(gpu.draw_count(), 2);
    }

    #[test]
    fn test_feedback_loop_is_rejected() {
        let mut gpu = HeadlessBackend::new();
        let program = gpu.create_program().unwrap();
        let texture = gpu.create_texture(&rgba_desc(1, 1), None).unwrap();
        let framebuffer = gpu.create_framebuffer(texture).unwrap();

        gpu.use_program(Some(program));
        gpu.bind_texture_unit(0, texture);
        gpu.upload_uniform(Location(0), VariableDescriptor::sampler(2), UniformData::Int(&[0]));
        gpu.bind_framebuffer(Some(framebuffer));
        assert!(matches!(gpu.draw_triangles(3), Err(RenderError::Backend(_))));
        assert_eq!(gpu.draw_count(), 0);
    }

    #[test]
    fn test_draw_without_program_fails() {
        let mut gpu = HeadlessBackend::new();
        assert!(gpu.draw_triangles(3).is_err());
    }

    #[test]
    fn test_fail_draws_after() {
        let mut gpu = HeadlessBackend::new();
        let program = gpu.create_program().unwrap();
        gpu.use_program(Some(program));
        gpu.fail_draws_after(1);
        assert!(gpu.draw_triangles(3).is_ok());
        assert!(gpu.draw_triangles(3).is_err());
        assert_eq!(gpu.surface_draws(), 1);
    }

    #[test]
    fn test_texture_upload_decoding() {
        let mut gpu = HeadlessBackend::new();
        let desc = TextureDesc {
            width: 1,
            height: 1,
            format: PixelFormat::Rgb,
            pixel_type: PixelType::UnsignedByte,
            filter: Filter::Linear,
        };
        let texture = gpu.create_texture(&desc, Some(&[255u8, 0, 51][..])).unwrap();
        assert_eq!(gpu.texture_pixels(texture).unwrap(), &[1.0f32, 0.0, 0.2, 1.0]);

        let floats = [0.5f32, 0.25, 0.0, 1.0];
        let texture = gpu
            .create_texture(&rgba_desc(1, 1), Some(bytemuck::cast_slice(&floats)))
            .unwrap();
        assert_eq!(gpu.texture_pixels(texture).unwrap(), &floats);

        assert!(gpu.create_texture(&rgba_desc(2, 2), Some(&[0u8; 4][..])).is_err());
        assert!(gpu.create_texture(&rgba_desc(0, 2), None).is_err());
    }

    #[test]
    fn test_rgb_framebuffer_is_incomplete() {
        let mut gpu = HeadlessBackend::new();
        let desc = TextureDesc {
            format: PixelFormat::Rgb,
            ..rgba_desc(4, 4)
        };
        let texture = gpu.create_texture(&desc, None).unwrap();
        assert!(matches!(
            gpu.create_framebuffer(texture),
            Err(RenderError::ResourceCreation(_))
        ));
    }

    #[test]
    fn test_commands_are_recorded() {
        let mut gpu = HeadlessBackend::new();
        let buffer = gpu.create_buffer().unwrap();
        gpu.enable_attribute(Location(3));
        gpu.attribute_pointer(Location(3), buffer, VariableDescriptor::vector(BaseType::Float, 2));
        gpu.disable_attribute(Location(3));
        gpu.flush();

        assert_eq!(gpu.enabled_attribute_count(), 0);
        let commands = gpu.take_commands();
        assert_eq!(commands.len(), 4);
        assert_eq!(commands[0], Command::EnableAttribute(Location(3)));
        assert_eq!(commands[3], Command::Flush);
        assert!(gpu.commands().is_empty());
    }

    #[test]
    fn test_live_objects_tracking() {
        let mut gpu = HeadlessBackend::new();
        let shader = gpu.create_shader(ShaderStage::Fragment).unwrap();
        let buffer = gpu.create_buffer().unwrap();
        assert_eq!(gpu.live_objects(), 2);
        gpu.delete_shader(shader);
        gpu.delete_buffer(buffer);
        assert_eq!(gpu.live_objects(), 0);
    }
}
