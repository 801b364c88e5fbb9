//! QR image rendering.

pub mod qr;

use std::path::Path;

use async_trait::async_trait;

use crate::error::RenderError;

pub use qr::ImageQrRenderer;

/// Pixel width of one QR module.
pub const DEFAULT_MODULE_WIDTH: u32 = 21;

/// Renders a QR code for a URL into an image file.
#[async_trait]
pub trait QrRenderer: Send + Sync {
    /// Encode `url` and write a PNG to `output`.
    ///
    /// With `background`, the image is blended in as a halftone.
    async fn render(
        &self,
        url: &str,
        background: Option<&Path>,
        output: &Path,
        module_width: u32,
    ) -> Result<(), RenderError>;
}
