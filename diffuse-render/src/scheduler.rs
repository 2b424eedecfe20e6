//! Ping-pong diffusion scheduler.
//!
//! ```text
//!            seed ──▶ [A]
//!   pass i:  [A] ──diffuse──▶ [B]      then swap A ⇄ B
//!   present: [A] ──draw────▶ surface  (linear filtered)
//! ```
//!
//! `A` is always the read source holding the latest result, `B` the next
//! render target. Swapping flips an index; no GPU data moves.

use log::{debug, info};

use crate::backend::{Backend, Filter};
use crate::config::DiffusionConfig;
use crate::error::RenderError;
use crate::program::Program;
use crate::resource::{Buffer, FrameBuffer};

/// Two triangles covering clip space, as `vec2` positions.
pub const FULLSCREEN_QUAD: [f32; 12] = [
    -1.0, -1.0, 1.0, -1.0, -1.0, 1.0, //
    -1.0, 1.0, 1.0, -1.0, 1.0, 1.0,
];

/// Statistics returned after each frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Diffusion passes run.
    pub passes: u32,
    /// Draw calls issued, including the present pass.
    pub draw_calls: u32,
}

#[derive(Debug)]
pub struct DiffusionScheduler {
    config: DiffusionConfig,
    seed: Program,
    diffuse: Program,
    draw: Program,
    buffers: [FrameBuffer; 2],
    /// Index into `buffers` of the read source.
    current: usize,
    swaps: u64,
    quad: Buffer,
    surface: (u32, u32),
}

impl DiffusionScheduler {
    /// Create the framebuffer pair and bind the full-screen quad to each
    /// program's `vertex_attribute`. Takes ownership of the programs.
    pub fn new(
        gpu: &mut impl Backend,
        config: DiffusionConfig,
        seed: Program,
        diffuse: Program,
        draw: Program,
    ) -> Result<Self, RenderError> {
        let (buffers, quad) = match Self::create_targets(gpu, &config) {
            Ok(targets) => targets,
            Err(err) => {
                seed.release(gpu);
                diffuse.release(gpu);
                draw.release(gpu);
                return Err(err);
            }
        };

        let mut scheduler = Self {
            surface: (config.width, config.height),
            config,
            seed,
            diffuse,
            draw,
            buffers,
            current: 0,
            swaps: 0,
            quad,
        };
        if let Err(err) = scheduler.bind_quad() {
            scheduler.release(gpu);
            return Err(err);
        }

        info!(
            "diffusion scheduler: {}x{}, {} passes per frame",
            scheduler.config.width, scheduler.config.height, scheduler.config.passes
        );
        Ok(scheduler)
    }

    fn create_targets(
        gpu: &mut impl Backend,
        config: &DiffusionConfig,
    ) -> Result<([FrameBuffer; 2], Buffer), RenderError> {
        config.validate()?;

        let first = FrameBuffer::new(gpu, config.width, config.height)?;
        let second = match FrameBuffer::new(gpu, config.width, config.height) {
            Ok(fb) => fb,
            Err(err) => {
                first.release(gpu);
                return Err(err);
            }
        };
        match Buffer::new(gpu, &FULLSCREEN_QUAD) {
            Ok(quad) => Ok(([first, second], quad)),
            Err(err) => {
                first.release(gpu);
                second.release(gpu);
                Err(err)
            }
        }
    }

    fn bind_quad(&mut self) -> Result<(), RenderError> {
        let attribute = &self.config.vertex_attribute;
        for program in [&mut self.seed, &mut self.diffuse, &mut self.draw] {
            program.set_attribute(attribute, &self.quad)?;
        }
        Ok(())
    }

    /// Render the seed program into the current read source.
    pub fn seed(&mut self, gpu: &mut impl Backend) -> Result<(), RenderError> {
        self.buffers[self.current].bind(gpu);
        let result = self.seed.evaluate(gpu);
        FrameBuffer::unbind(gpu);
        result
    }

    /// Run every diffusion pass, then present the result.
    ///
    /// A failing pass aborts the frame; buffers already swapped stay
    /// swapped.
    pub fn render_frame(&mut self, gpu: &mut impl Backend) -> Result<FrameStats, RenderError> {
        let mut stats = FrameStats::default();

        for _ in 0..self.config.passes {
            self.buffers[self.current ^ 1].bind(gpu);
            let result = self.diffuse_pass(gpu);
            FrameBuffer::unbind(gpu);
            result?;

            self.current ^= 1;
            self.swaps += 1;
            stats.passes += 1;
            stats.draw_calls += 1;
        }

        self.present(gpu)?;
        stats.draw_calls += 1;

        debug!("frame: {stats:?}, {} swaps total", self.swaps);
        Ok(stats)
    }

    fn diffuse_pass(&mut self, gpu: &mut impl Backend) -> Result<(), RenderError> {
        let source = self.buffers[self.current].texture();
        self.diffuse.set_uniform_texture(&self.config.source_uniform, source)?;
        self.diffuse.evaluate(gpu)
    }

    fn present(&mut self, gpu: &mut impl Backend) -> Result<(), RenderError> {
        FrameBuffer::unbind(gpu);
        gpu.viewport(self.surface.0, self.surface.1);

        let current = &mut self.buffers[self.current];
        self.draw
            .set_uniform_texture(&self.config.present_uniform, current.texture())?;

        current.texture_mut().set_interpolation(gpu, Filter::Linear);
        let result = self.draw.evaluate(gpu);
        current.texture_mut().set_interpolation(gpu, Filter::Nearest);
        result?;

        gpu.flush();
        Ok(())
    }

    // ───────────────────── Accessors ──────────────────────────────

    /// The read source: holds the latest written data.
    pub fn current(&self) -> &FrameBuffer {
        &self.buffers[self.current]
    }

    /// The framebuffer the next pass writes to.
    pub fn target(&self) -> &FrameBuffer {
        &self.buffers[self.current ^ 1]
    }

    pub fn swap_count(&self) -> u64 {
        self.swaps
    }

    pub fn config(&self) -> &DiffusionConfig {
        &self.config
    }

    /// Viewport used by the present pass. Defaults to the simulation size.
    pub fn set_surface_size(&mut self, width: u32, height: u32) {
        self.surface = (width, height);
    }

    pub fn surface_size(&self) -> (u32, u32) {
        self.surface
    }

    pub fn seed_program(&self) -> &Program {
        &self.seed
    }

    pub fn seed_program_mut(&mut self) -> &mut Program {
        &mut self.seed
    }

    pub fn diffuse_program(&self) -> &Program {
        &self.diffuse
    }

    pub fn diffuse_program_mut(&mut self) -> &mut Program {
        &mut self.diffuse
    }

    pub fn draw_program(&self) -> &Program {
        &self.draw
    }

    pub fn draw_program_mut(&mut self) -> &mut Program {
        &mut self.draw
    }

    /// Destroy the framebuffer pair, the quad and the three programs.
    pub fn release(self, gpu: &mut impl Backend) {
        let [first, second] = self.buffers;
        first.release(gpu);
        second.release(gpu);
        self.quad.release(gpu);
        self.seed.release(gpu);
        self.diffuse.release(gpu);
        self.draw.release(gpu);
    }
}

// ===================================================================
// Tests
// ===================================================================
