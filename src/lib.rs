//! Softmax regression for handwritten digits.
//!
//! - MNIST IDX/gzip loading and download
//! - Normalized-pixel, edge and block-average features
//! - PCA projection (fit and transform)
//! - Softmax classifier trained by mini-batch gradient descent
//! - Versioned model bundle and an HTTP prediction service

pub mod activations;
pub mod bundle;
pub mod classifier;
pub mod config;
pub mod datasets;
pub mod error;
pub mod features;
pub mod linalg;
pub mod logging;
pub mod loss;
pub mod metrics;
pub mod pca;
pub mod preprocess;
pub mod service;
pub mod training;
pub mod utils;

pub use activations::{softmax, Softmax};
pub use bundle::{Metadata, Metrics, ModelBundle};
pub use classifier::SoftmaxRegression;
pub use config::{ServiceConfig, TrainConfig};
pub use datasets::{load_images, load_labels, load_split, DigitImage, LabeledSet, Split};
pub use error::{DigitError, Result};
pub use features::{extract_batch, FeatureExtractor, FeatureKind};
pub use metrics::{accuracy, confusion_matrix};
pub use pca::Pca;
pub use service::{router, AppContext, LoadedModel, Prediction};
pub use training::{EpochRecord, Trainer, TrainingHistory, TrainingState};
pub use utils::{format_confusion_matrix, format_history_table, generate_separable_data};
