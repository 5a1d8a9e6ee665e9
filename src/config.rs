//! Training and service configuration with the stock defaults.
use crate::features::FeatureKind;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Default location of the exported model bundle.
pub const DEFAULT_MODEL_PATH: &str = "models/softmax_pca_model.json.gz";

/// Hyperparameters and file locations for a training run.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub data_dir: PathBuf,
    /// Base URLs tried in order for missing MNIST files.
    pub mirrors: Vec<String>,
    pub train_samples: usize,
    pub val_samples: usize,
    pub feature_kind: FeatureKind,
    pub n_components: usize,
    pub learning_rate: f64,
    pub reg_lambda: f64,
    pub epochs: usize,
    pub batch_size: usize,
    /// Log a progress line every this many epochs.
    pub log_every: usize,
    /// Seeds weight init, shuffling and PCA; `None` draws from entropy.
    pub seed: Option<u64>,
    pub model_path: PathBuf,
    pub history_path: PathBuf,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("mnist_data"),
            mirrors: vec![
                "https://ossci-datasets.s3.amazonaws.com/mnist".to_string(),
                "http://yann.lecun.com/exdb/mnist".to_string(),
            ],
            train_samples: 10_000,
            val_samples: 2_000,
            feature_kind: FeatureKind::NormalizedPixel,
            n_components: 50,
            learning_rate: 0.5,
            reg_lambda: 0.01,
            epochs: 50,
            batch_size: 128,
            log_every: 10,
            seed: None,
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            history_path: PathBuf::from("models/training_history.csv"),
        }
    }
}

/// Where the prediction service listens and what it loads.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    pub model_path: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
        }
    }
}

impl ServiceConfig {
    /// Defaults, overridden by `MODEL_PATH` and `BIND_ADDR` when set.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let mut cfg = Self::default();
        if let Some(path) = lookup("MODEL_PATH").filter(|p| !p.is_empty()) {
            cfg.model_path = PathBuf::from(path);
        }
        if let Some(addr) = lookup("BIND_ADDR") {
            match addr.parse() {
                Ok(parsed) => cfg.bind_addr = parsed,
                Err(_) => tracing::warn!(%addr, "ignoring unparsable BIND_ADDR"),
            }
        }
        cfg
    }
}
