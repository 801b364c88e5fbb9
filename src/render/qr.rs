//! PNG QR renderer built on `qrcode` + `image`.
//!
//! Without a background every module is a solid `module_width` square.
//! With one, the background is scaled to the canvas, turned into black and
//! white, and each data module keeps its own colour only in the centre of a
//! 3×3 grid; the other eight cells show the background. Finder patterns
//! stay solid so scanners can lock on.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::imageops::FilterType;
use image::{GrayImage, ImageFormat, ImageReader, Luma};
use qrcode::{Color, QrCode};
use tracing::debug;

use crate::error::RenderError;
use crate::render::QrRenderer;

/// Light modules kept around the code, in modules.
const QUIET_ZONE: u32 = 4;

/// Side of a finder pattern including its separator, in modules.
const FINDER_SPAN: usize = 8;

/// Luma threshold separating dark and light background pixels.
const THRESHOLD: u8 = 128;

const DARK: Luma<u8> = Luma([0]);
const LIGHT: Luma<u8> = Luma([255]);

/// Local renderer producing grayscale PNG files.
#[derive(Debug, Clone, Default)]
pub struct ImageQrRenderer;

impl ImageQrRenderer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl QrRenderer for ImageQrRenderer {
    async fn render(
        &self,
        url: &str,
        background: Option<&Path>,
        output: &Path,
        module_width: u32,
    ) -> Result<(), RenderError> {
        let url = url.to_string();
        let background = background.map(Path::to_path_buf);
        let output = output.to_path_buf();

        tokio::task::spawn_blocking(move || {
            render_png(&url, background.as_deref(), &output, module_width)
        })
        .await
        .map_err(|e| RenderError::Task(e.to_string()))?
    }
}

/// Render synchronously. Blocks on image decoding and file I/O.
pub fn render_png(
    url: &str,
    background: Option<&Path>,
    output: &Path,
    module_width: u32,
) -> Result<(), RenderError> {
    let code = QrCode::new(url.as_bytes()).map_err(|e| RenderError::Encode {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    let module_width = module_width.max(1);
    let side = canvas_side(&code, module_width);

    let halftone = background
        .map(|path| load_halftone(path, side))
        .transpose()?;

    let canvas = rasterize(&code, module_width, halftone.as_ref());
    canvas
        .save_with_format(output, ImageFormat::Png)
        .map_err(|e| RenderError::Output {
            path: output.to_path_buf(),
            reason: e.to_string(),
        })?;

    debug!(
        output = %output.display(),
        modules = code.width(),
        side,
        halftone = halftone.is_some(),
        "Rendered QR"
    );
    Ok(())
}

fn canvas_side(code: &QrCode, module_width: u32) -> u32 {
    (code.width() as u32 + 2 * QUIET_ZONE) * module_width
}

/// Load a background and reduce it to a black/white bitmap of `side`².
fn load_halftone(path: &Path, side: u32) -> Result<GrayImage, RenderError> {
    let err = |reason: String| RenderError::Background {
        path: PathBuf::from(path),
        reason,
    };
    // Sniff the format from the content; the name is whatever the sender chose.
    let img = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| err(e.to_string()))?
        .decode()
        .map_err(|e| err(e.to_string()))?;
    let mut gray = img.resize_exact(side, side, FilterType::Triangle).to_luma8();
    for pixel in gray.pixels_mut() {
        *pixel = if pixel[0] < THRESHOLD { DARK } else { LIGHT };
    }
    Ok(gray)
}

fn is_finder(x: usize, y: usize, width: usize) -> bool {
    let near_start = |v: usize| v < FINDER_SPAN;
    let near_end = |v: usize| v + FINDER_SPAN >= width;
    (near_start(x) && near_start(y)) || (near_end(x) && near_start(y)) || (near_start(x) && near_end(y))
}

/// Draw the code onto a canvas, optionally blending a halftone background.
pub fn rasterize(code: &QrCode, module_width: u32, halftone: Option<&GrayImage>) -> GrayImage {
    let width = code.width();
    let side = canvas_side(code, module_width);
    let mut canvas = GrayImage::from_pixel(side, side, LIGHT);
    let colors = code.to_colors();

    for y in 0..width {
        for x in 0..width {
            let module = match colors[y * width + x] {
                Color::Dark => DARK,
                Color::Light => LIGHT,
            };
            let origin_x = (x as u32 + QUIET_ZONE) * module_width;
            let origin_y = (y as u32 + QUIET_ZONE) * module_width;
            let solid = halftone.is_none() || is_finder(x, y, width);

            for dy in 0..module_width {
                for dx in 0..module_width {
                    let (px, py) = (origin_x + dx, origin_y + dy);
                    let centre = dx * 3 / module_width == 1 && dy * 3 / module_width == 1;
                    let value = match halftone {
                        Some(bg) if !solid && !centre => *bg.get_pixel(px, py),
                        _ => module,
                    };
                    canvas.put_pixel(px, py, value);
                }
            }
        }
    }
    canvas
}
