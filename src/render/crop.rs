//! Tight cropping and PNG output.

use std::path::Path;

use image::{ImageFormat, Rgb, RgbImage, imageops};

use super::RenderError;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// Crop `image` to the bounding box of its non-white pixels, keeping `pad`
/// pixels of margin where the canvas allows. A blank image is returned
/// unchanged.
#[must_use]
pub fn tight_crop(image: &RgbImage, pad: u32) -> RgbImage {
    let mut extent: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in image.enumerate_pixels() {
        if *pixel == BACKGROUND {
            continue;
        }
        extent = Some(match extent {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    let Some((x0, y0, x1, y1)) = extent else {
        return image.clone();
    };
    let left = x0.saturating_sub(pad);
    let top = y0.saturating_sub(pad);
    let right = x1.saturating_add(pad).min(image.width().saturating_sub(1));
    let bottom = y1.saturating_add(pad).min(image.height().saturating_sub(1));
    imageops::crop_imm(image, left, top, right - left + 1, bottom - top + 1).to_image()
}

/// Encode `image` as PNG at `path`.
///
/// # Errors
///
/// Returns [`RenderError::Save`] when the file cannot be written.
pub fn save_png(image: &RgbImage, path: &Path) -> Result<(), RenderError> {
    image
        .save_with_format(path, ImageFormat::Png)
        .map_err(|source| RenderError::Save {
            path: path.to_path_buf(),
            source,
        })?;
    log::info!("saved figure to {}", path.display());
    Ok(())
}
