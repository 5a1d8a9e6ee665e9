//! Versioned model bundle: classifier parameters, PCA transform, metrics and
//! metadata, stored as gzipped JSON.
use crate::classifier::SoftmaxRegression;
use crate::datasets::NUM_CLASSES;
use crate::error::{DigitError, Result};
use crate::features::FeatureKind;
use crate::linalg::Matrix;
use crate::pca::Pca;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::info;

pub const FORMAT_VERSION: u32 = 1;
pub const MODEL_TYPE: &str = "softmax_regression";

/// Classifier parameters as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    #[serde(rename = "W")]
    pub weights: Matrix,
    #[serde(rename = "b")]
    pub bias: Vec<f64>,
    pub n_features: usize,
    pub n_classes: usize,
    #[serde(default)]
    pub learning_rate: f64,
    #[serde(default)]
    pub reg_lambda: f64,
}

impl ModelParams {
    pub fn from_classifier(model: &SoftmaxRegression) -> Self {
        Self {
            weights: sanitize_matrix(&model.weights),
            bias: sanitize_vec(&model.bias),
            n_features: model.n_features(),
            n_classes: model.n_classes(),
            learning_rate: model.learning_rate,
            reg_lambda: model.reg_lambda,
        }
    }

    pub fn to_classifier(&self) -> Result<SoftmaxRegression> {
        SoftmaxRegression::from_parameters(
            self.weights.clone(),
            self.bias.clone(),
            self.learning_rate,
            self.reg_lambda,
        )
    }
}

/// Evaluation results; unknown keys are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub accuracy: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// How the bundle was produced; unknown keys are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub feature_kind: FeatureKind,
    #[serde(default = "default_image_size")]
    pub image_size: usize,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_image_size() -> usize {
    crate::datasets::IMAGE_SIDE
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            feature_kind: FeatureKind::default(),
            image_size: default_image_size(),
            extra: Map::new(),
        }
    }
}

/// Everything the prediction service needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBundle {
    pub format_version: u32,
    pub model_type: String,
    pub model: ModelParams,
    pub pca: Pca,
    pub metrics: Metrics,
    pub metadata: Metadata,
}

impl ModelBundle {
    pub fn new(model: &SoftmaxRegression, pca: Pca, metrics: Metrics, metadata: Metadata) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            model_type: MODEL_TYPE.to_string(),
            model: ModelParams::from_classifier(model),
            pca,
            metrics,
            metadata,
        }
    }

    /// Checks every cross-field shape the service relies on.
    pub fn validate(&self) -> Result<()> {
        if self.format_version != FORMAT_VERSION {
            return Err(DigitError::InvalidBundle(format!(
                "unsupported format_version {} (expected {})",
                self.format_version, FORMAT_VERSION
            )));
        }
        let m = &self.model;
        if m.n_classes != NUM_CLASSES {
            return Err(DigitError::InvalidBundle(format!(
                "model.n_classes is {} but digits need {}",
                m.n_classes, NUM_CLASSES
            )));
        }
        if m.weights.len() != m.n_features {
            return Err(DigitError::InvalidBundle(format!(
                "model.W has {} rows but n_features is {}",
                m.weights.len(),
                m.n_features
            )));
        }
        if let Some(row) = m.weights.iter().find(|r| r.len() != m.n_classes) {
            return Err(DigitError::InvalidBundle(format!(
                "model.W row has {} columns but n_classes is {}",
                row.len(),
                m.n_classes
            )));
        }
        if m.bias.len() != m.n_classes {
            return Err(DigitError::InvalidBundle(format!(
                "model.b has {} entries but n_classes is {}",
                m.bias.len(),
                m.n_classes
            )));
        }
        self.pca
            .validate()
            .map_err(|e| DigitError::InvalidBundle(format!("pca: {}", e)))?;
        if self.pca.n_components != m.n_features {
            return Err(DigitError::InvalidBundle(format!(
                "pca.n_components {} does not match model.n_features {}",
                self.pca.n_components, m.n_features
            )));
        }
        let expected_dim = self.metadata.feature_kind.dim();
        if self.pca.input_dim() != expected_dim {
            return Err(DigitError::InvalidBundle(format!(
                "pca.mean has {} entries but {} features have {}",
                self.pca.input_dim(),
                self.metadata.feature_kind,
                expected_dim
            )));
        }
        Ok(())
    }

    /// Save as gzipped JSON, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        let mut enc = GzEncoder::new(BufWriter::new(file), Compression::default());
        serde_json::to_writer(&mut enc, self)?;
        enc.finish()?.flush()?;
        info!(path = %path.display(), "model bundle saved");
        Ok(())
    }

    /// Load and validate a gzipped JSON bundle.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mut dec = GzDecoder::new(BufReader::new(file));
        let mut buf = Vec::new();
        dec.read_to_end(&mut buf)
            .map_err(|e| DigitError::InvalidBundle(format!("not a gzip stream: {}", e)))?;
        Self::from_json_slice(&buf)
    }

    /// Parse and validate an uncompressed JSON document.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let bundle: ModelBundle = serde_json::from_slice(bytes)
            .map_err(|e| DigitError::InvalidBundle(e.to_string()))?;
        bundle.validate()?;
        Ok(bundle)
    }
}

fn sanitize_vec(v: &[f64]) -> Vec<f64> {
    v.iter().map(|&x| if x.is_finite() { x } else { 0.0 }).collect()
}

fn sanitize_matrix(m: &[Vec<f64>]) -> Matrix {
    m.iter().map(|row| sanitize_vec(row)).collect()
}
