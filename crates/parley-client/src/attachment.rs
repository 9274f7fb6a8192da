//! Image Attachments
//!
//! Loads a picture from disk and shrinks it for sending as an `IMG` frame.

use crate::errors::{ClientError, ClientResult};
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use parley_protocol::ImageData;
use std::path::Path;
use tracing::debug;

/// Halve both sides until they fit within `max_dimension`
pub fn fit_dimensions(mut width: u32, mut height: u32, max_dimension: u32) -> (u32, u32) {
    while width > max_dimension || height > max_dimension {
        width = (width / 2).max(1);
        height = (height / 2).max(1);
    }
    (width, height)
}

/// Convert a decoded image to an RGB payload
pub fn from_dynamic(image: &DynamicImage, max_dimension: u32) -> ClientResult<ImageData> {
    let (width, height) = image.dimensions();
    let (fit_w, fit_h) = fit_dimensions(width, height, max_dimension);

    let rgb = if (fit_w, fit_h) == (width, height) {
        image.to_rgb8()
    } else {
        debug!(width, height, fit_w, fit_h, "Scaling image down");
        image.resize_exact(fit_w, fit_h, FilterType::Nearest).to_rgb8()
    };

    ImageData::new(fit_w, fit_h, rgb.into_raw()).map_err(|e| ClientError::Image(e.to_string()))
}

/// Load and scale an image file
pub fn load_image(path: &Path, max_dimension: u32) -> ClientResult<ImageData> {
    let image = image::open(path)
        .map_err(|e| ClientError::Image(format!("{}: {}", path.display(), e)))?;
    from_dynamic(&image, max_dimension)
}
