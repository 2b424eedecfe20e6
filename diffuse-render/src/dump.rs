//! Text dump of a framebuffer's red channel.
//!
//! Every 4th row and every 4th column is written, values separated by a
//! space, one row per line.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::{error, info};

use crate::backend::Backend;
use crate::error::RenderError;
use crate::resource::FrameBuffer;

/// Subsampling stride in both axes.
pub const DUMP_STRIDE: usize = 4;

/// Write the red channel of an RGBA float image.
pub fn write_red_channel(
    writer: &mut impl Write,
    pixels: &[f32],
    width: u32,
    height: u32,
) -> Result<(), RenderError> {
    let (width, height) = (width as usize, height as usize);
    if pixels.len() < width * height * 4 {
        return Err(RenderError::Backend(format!(
            "{} values cannot hold a {width}x{height} RGBA image",
            pixels.len()
        )));
    }

    for y in (0..height).step_by(DUMP_STRIDE) {
        let row = &pixels[y * width * 4..(y + 1) * width * 4];
        let line: Vec<String> = row
            .chunks_exact(4)
            .step_by(DUMP_STRIDE)
            .map(|texel| texel[0].to_string())
            .collect();
        writeln!(writer, "{}", line.join(" "))?;
    }
    Ok(())
}

/// Read `framebuffer` back and dump its red channel to `path`.
pub fn dump_red_channel(
    gpu: &mut impl Backend,
    framebuffer: &FrameBuffer,
    path: impl AsRef<Path>,
) -> Result<(), RenderError> {
    let path = path.as_ref();
    let pixels = framebuffer.read_pixels(gpu)?;

    let file = File::create(path).map_err(|err| {
        error!("cannot open '{}' for writing: {err}", path.display());
        RenderError::Io(err)
    })?;
    let mut writer = BufWriter::new(file);
    write_red_channel(&mut writer, &pixels, framebuffer.width(), framebuffer.height())?;
    writer.flush()?;

    info!("dumped {}x{} red channel to '{}'", framebuffer.width(), framebuffer.height(), path.display());
    Ok(())
}

// ===================================================================
// Tests
// ===================================================================
