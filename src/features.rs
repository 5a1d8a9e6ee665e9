//! Image → feature vector strategies.
//!
//! Training and serving both go through [`FeatureKind::extractor`], so the
//! vector a model is fit on and the vector it is queried with come from the
//! same code.
use crate::datasets::{DigitImage, IMAGE_PIXELS, IMAGE_SIDE};
use serde::{Deserialize, Serialize};
use std::fmt;

const BLOCK: usize = 4;
const BLOCKS_PER_SIDE: usize = IMAGE_SIDE / BLOCK;

/// Turns an image into a fixed-length vector.
pub trait FeatureExtractor: fmt::Debug + Send + Sync {
    /// Length of every vector produced by [`extract`](Self::extract).
    fn dim(&self) -> usize;
    fn extract(&self, image: &DigitImage) -> Vec<f64>;
}

/// Pixels scaled to [0, 1], row-major.
pub fn normalized_pixels(image: &DigitImage) -> Vec<f64> {
    image.pixels().iter().map(|&p| p as f64 / 255.0).collect()
}

/// Flattened pixels divided by 255.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizedPixel;

impl FeatureExtractor for NormalizedPixel {
    fn dim(&self) -> usize {
        IMAGE_PIXELS
    }
    fn extract(&self, image: &DigitImage) -> Vec<f64> {
        normalized_pixels(image)
    }
}

/// Gradient magnitude from forward differences, zero-padded on the last column/row.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeMagnitude;

impl FeatureExtractor for EdgeMagnitude {
    fn dim(&self) -> usize {
        IMAGE_PIXELS
    }
    fn extract(&self, image: &DigitImage) -> Vec<f64> {
        let img = normalized_pixels(image);
        let at = |r: usize, c: usize| img[r * IMAGE_SIDE + c];
        let mut out = Vec::with_capacity(IMAGE_PIXELS);
        for r in 0..IMAGE_SIDE {
            for c in 0..IMAGE_SIDE {
                let dx = if c + 1 < IMAGE_SIDE {
                    (at(r, c + 1) - at(r, c)).abs()
                } else {
                    0.0
                };
                let dy = if r + 1 < IMAGE_SIDE {
                    (at(r + 1, c) - at(r, c)).abs()
                } else {
                    0.0
                };
                out.push((dx * dx + dy * dy).sqrt());
            }
        }
        out
    }
}

/// Mean of each non-overlapping 4×4 block (7×7 blocks, row-major).
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockAverage;

impl FeatureExtractor for BlockAverage {
    fn dim(&self) -> usize {
        BLOCKS_PER_SIDE * BLOCKS_PER_SIDE
    }
    fn extract(&self, image: &DigitImage) -> Vec<f64> {
        let img = normalized_pixels(image);
        let mut out = Vec::with_capacity(self.dim());
        for br in 0..BLOCKS_PER_SIDE {
            for bc in 0..BLOCKS_PER_SIDE {
                let mut sum = 0.0;
                for r in br * BLOCK..(br + 1) * BLOCK {
                    for c in bc * BLOCK..(bc + 1) * BLOCK {
                        sum += img[r * IMAGE_SIDE + c];
                    }
                }
                out.push(sum / (BLOCK * BLOCK) as f64);
            }
        }
        out
    }
}

/// Serializable name of a feature strategy, recorded in model bundles.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    #[default]
    NormalizedPixel,
    EdgeMagnitude,
    BlockAverage,
}

impl FeatureKind {
    pub fn extractor(self) -> &'static dyn FeatureExtractor {
        match self {
            FeatureKind::NormalizedPixel => &NormalizedPixel,
            FeatureKind::EdgeMagnitude => &EdgeMagnitude,
            FeatureKind::BlockAverage => &BlockAverage,
        }
    }

    pub fn dim(self) -> usize {
        self.extractor().dim()
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeatureKind::NormalizedPixel => "normalized_pixel",
            FeatureKind::EdgeMagnitude => "edge_magnitude",
            FeatureKind::BlockAverage => "block_average",
        };
        f.write_str(name)
    }
}

/// Applies `kind` to every image.
pub fn extract_batch(kind: FeatureKind, images: &[DigitImage]) -> Vec<Vec<f64>> {
    let extractor = kind.extractor();
    images.iter().map(|img| extractor.extract(img)).collect()
}
