//! GPU storage bound to program variables: vertex buffers, textures and
//! framebuffers.
//!
//! Each type wraps a backend handle plus the metadata the binding layer
//! checks against. None of them release on drop; call `release(gpu)` while
//! the backend is still alive.

use diffuse_core::BaseType;
use log::debug;

use crate::backend::{
    Backend, BufferHandle, Filter, FramebufferHandle, PixelFormat, PixelType, TextureDesc,
    TextureHandle,
};
use crate::error::RenderError;
use crate::value::Element;

// ───────────────────────────────────────────────────────────────────
// Buffer
// ───────────────────────────────────────────────────────────────────

/// Vertex data for attributes.
#[derive(Debug)]
pub struct Buffer {
    handle: BufferHandle,
    element_type: BaseType,
    len: usize,
}

impl Buffer {
    pub fn new<T: Element>(gpu: &mut impl Backend, data: &[T]) -> Result<Self, RenderError> {
        let handle = gpu.create_buffer()?;
        gpu.buffer_data(handle, bytemuck::cast_slice(data));
        debug!("buffer {}: {} {} elements", handle.0, data.len(), T::BASE_TYPE);
        Ok(Self {
            handle,
            element_type: T::BASE_TYPE,
            len: data.len(),
        })
    }

    /// Replace the contents; the element type may change.
    pub fn update<T: Element>(&mut self, gpu: &mut impl Backend, data: &[T]) {
        gpu.buffer_data(self.handle, bytemuck::cast_slice(data));
        self.element_type = T::BASE_TYPE;
        self.len = data.len();
    }

    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    pub fn element_type(&self) -> BaseType {
        self.element_type
    }

    /// Number of scalar elements, not vertices.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn release(self, gpu: &mut impl Backend) {
        gpu.delete_buffer(self.handle);
    }
}

// ───────────────────────────────────────────────────────────────────
// Texture
// ───────────────────────────────────────────────────────────────────

/// 2D texture, clamped at the edges, minified with nearest sampling.
#[derive(Debug)]
pub struct Texture {
    handle: TextureHandle,
    desc: TextureDesc,
}

impl Texture {
    /// `data` must be tightly packed rows matching `desc`, or `None` for
    /// zero-initialised storage.
    pub fn new(gpu: &mut impl Backend, desc: TextureDesc, data: Option<&[u8]>) -> Result<Self, RenderError> {
        let handle = gpu.create_texture(&desc, data)?;
        Ok(Self { handle, desc })
    }

    /// Set the magnification filter.
    pub fn set_interpolation(&mut self, gpu: &mut impl Backend, filter: Filter) {
        gpu.set_texture_filter(self.handle, filter);
        self.desc.filter = filter;
    }

    pub fn handle(&self) -> TextureHandle {
        self.handle
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn format(&self) -> PixelFormat {
        self.desc.format
    }

    pub fn pixel_type(&self) -> PixelType {
        self.desc.pixel_type
    }

    pub fn filter(&self) -> Filter {
        self.desc.filter
    }

    pub fn release(self, gpu: &mut impl Backend) {
        gpu.delete_texture(self.handle);
    }
}

// ───────────────────────────────────────────────────────────────────
// FrameBuffer
// ───────────────────────────────────────────────────────────────────

/// Off-screen render target with one owned RGBA float color texture.
#[derive(Debug)]
pub struct FrameBuffer {
    handle: FramebufferHandle,
    texture: Texture,
}

impl FrameBuffer {
    pub fn new(gpu: &mut impl Backend, width: u32, height: u32) -> Result<Self, RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::ResourceCreation(format!(
                "framebuffer size {width}x{height} is empty"
            )));
        }
        let texture = Texture::new(
            gpu,
            TextureDesc {
                width,
                height,
                format: PixelFormat::Rgba,
                pixel_type: PixelType::Float,
                filter: Filter::Nearest,
            },
            None,
        )?;
        let handle = match gpu.create_framebuffer(texture.handle()) {
            Ok(handle) => handle,
            Err(err) => {
                texture.release(gpu);
                return Err(err);
            }
        };
        debug!("framebuffer {}: {width}x{height}", handle.0);
        Ok(Self { handle, texture })
    }

    /// Make this the render target and size the viewport to it.
    pub fn bind(&self, gpu: &mut impl Backend) {
        gpu.bind_framebuffer(Some(self.handle));
        gpu.viewport(self.texture.width(), self.texture.height());
    }

    /// Return rendering to the visible surface. The viewport is left for
    /// the caller to set.
    pub fn unbind(gpu: &mut impl Backend) {
        gpu.bind_framebuffer(None);
    }

    pub fn handle(&self) -> FramebufferHandle {
        self.handle
    }

    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub fn texture_mut(&mut self) -> &mut Texture {
        &mut self.texture
    }

    pub fn width(&self) -> u32 {
        self.texture.width()
    }

    pub fn height(&self) -> u32 {
        self.texture.height()
    }

    /// RGBA float contents, row major.
    pub fn read_pixels(&self, gpu: &mut impl Backend) -> Result<Vec<f32>, RenderError> {
        gpu.read_pixels(self.handle, self.width(), self.height())
    }

    pub fn release(self, gpu: &mut impl Backend) {
        gpu.delete_framebuffer(self.handle);
        self.texture.release(gpu);
    }
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::{Command, HeadlessBackend};

    #[test]
    fn test_buffer_records_type_and_len() {
        let mut gpu = HeadlessBackend::new();
        let mut buffer = Buffer::new(&mut gpu, &[0.0f32, 1.0, 2.0, 3.0]).unwrap();
        assert_eq!(buffer.element_type(), BaseType::Float);
        assert_eq!(buffer.len(), 4);
        assert_eq!(gpu.buffer_bytes(buffer.handle()).unwrap().len(), 16);

        buffer.update(&mut gpu, &[1i32, 2]);
        assert_eq!(buffer.element_type(), BaseType::Int);
        assert_eq!(buffer.len(), 2);
        assert_eq!(gpu.buffer_bytes(buffer.handle()).unwrap(), bytemuck::cast_slice::<i32, u8>(&[1, 2]));

        buffer.release(&mut gpu);
        assert_eq!(gpu.live_objects(), 0);
    }

    #[test]
    fn test_texture_interpolation() {
        let mut gpu = HeadlessBackend::new();
        let desc = TextureDesc {
            width: 2,
            height: 1,
            format: PixelFormat::Rgb,
            pixel_type: PixelType::UnsignedByte,
            filter: Filter::Nearest,
        };
        let mut texture = Texture::new(&mut gpu, desc, Some(&[255u8, 0, 0, 0, 255, 0][..])).unwrap();
        texture.set_interpolation(&mut gpu, Filter::Linear);
        assert_eq!(texture.filter(), Filter::Linear);
        assert_eq!(gpu.texture_filter(texture.handle()), Some(Filter::Linear));
        assert_eq!(
            gpu.texture_pixels(texture.handle()).unwrap(),
            &[1.0f32, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0]
        );
    }

    #[test]
    fn test_texture_rejects_short_data() {
        let mut gpu = HeadlessBackend::new();
        let desc = TextureDesc {
            width: 2,
            height: 2,
            format: PixelFormat::Rgba,
            pixel_type: PixelType::UnsignedByte,
            filter: Filter::Nearest,
        };
        let err = Texture::new(&mut gpu, desc, Some(&[0u8; 4][..])).unwrap_err();
        assert!(matches!(err, RenderError::ResourceCreation(_)));
    }

    #[test]
    fn test_framebuffer_bind_sets_viewport() {
        let mut gpu = HeadlessBackend::new();
        let fb = FrameBuffer::new(&mut gpu, 8, 4).unwrap();
        gpu.clear_commands();

        fb.bind(&mut gpu);
        assert_eq!(gpu.current_framebuffer(), Some(fb.handle()));
        assert_eq!(
            gpu.commands(),
            &[
                Command::BindFramebuffer(Some(fb.handle())),
                Command::Viewport { width: 8, height: 4 },
            ]
        );

        FrameBuffer::unbind(&mut gpu);
        assert_eq!(gpu.current_framebuffer(), None);
    }

    #[test]
    fn test_framebuffer_read_pixels_starts_zeroed() {
        let mut gpu = HeadlessBackend::new();
        let fb = FrameBuffer::new(&mut gpu, 3, 2).unwrap();
        let pixels = fb.read_pixels(&mut gpu).unwrap();
        assert_eq!(pixels.len(), 3 * 2 * 4);
        assert!(pixels.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_framebuffer_zero_size() {
        let mut gpu = HeadlessBackend::new();
        let err = FrameBuffer::new(&mut gpu, 0, 4).unwrap_err();
        assert!(matches!(err, RenderError::ResourceCreation(_)));
        assert_eq!(gpu.live_objects(), 0);
    }

    #[test]
    fn test_framebuffer_release_frees_texture() {
        let mut gpu = HeadlessBackend::new();
        let fb = FrameBuffer::new(&mut gpu, 2, 2).unwrap();
        assert_eq!(gpu.live_objects(), 2);
        fb.release(&mut gpu);
        assert_eq!(gpu.live_objects(), 0);
    }
}
