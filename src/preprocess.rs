//! Incoming image payload → [`DigitImage`].
//!
//! The service hands the result to the same [`FeatureKind`] extractor the
//! model was trained with.
use crate::datasets::{DigitImage, IMAGE_SIDE};
use crate::error::{DigitError, Result};
use crate::features::FeatureKind;
use base64::Engine;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};

/// Drops a `data:image/png;base64,` style prefix if present.
pub fn strip_data_url(payload: &str) -> &str {
    match payload.split_once(',') {
        Some((_, data)) => data,
        None => payload,
    }
}

/// Decodes a base64 (optionally data-URL) string into raw bytes. Line
/// breaks and other ASCII whitespace inside the payload are ignored.
pub fn decode_base64(payload: &str) -> Result<Vec<u8>> {
    let data: Vec<u8> = strip_data_url(payload.trim())
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| DigitError::Preprocessing(format!("invalid base64: {}", e)))
}

/// Grayscale with ITU-R 601 weights (299/587/114), fixed point. Alpha is
/// dropped.
fn to_luma_601(img: &DynamicImage) -> GrayImage {
    let rgb = img.to_rgb8();
    let (w, h) = rgb.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let l = (r as u32 * 19595 + g as u32 * 38470 + b as u32 * 7471 + 0x8000) >> 16;
        Luma([l as u8])
    })
}

/// Decodes encoded image bytes, converts to 8-bit grayscale and resizes to
/// 28×28 with a Lanczos3 filter.
pub fn decode_image(bytes: &[u8]) -> Result<DigitImage> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| DigitError::Preprocessing(format!("cannot decode image: {}", e)))?;
    let gray = to_luma_601(&img);
    let side = IMAGE_SIDE as u32;
    let resized = if gray.dimensions() == (side, side) {
        gray
    } else {
        imageops::resize(&gray, side, side, FilterType::Lanczos3)
    };
    DigitImage::from_raw(resized.into_raw())
        .map_err(|e| DigitError::Preprocessing(e.to_string()))
}

/// Full request path: base64 payload → feature vector for `kind`.
pub fn features_from_base64(payload: &str, kind: FeatureKind) -> Result<Vec<f64>> {
    let image = decode_image(&decode_base64(payload)?)?;
    Ok(kind.extractor().extract(&image))
}
