//! Reporting helpers and synthetic data.
use crate::training::TrainingHistory;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::f64::consts::PI;
use std::fmt::Write;

/// Generate synthetic data: `n_classes` Gaussian blobs of radius `spread`
/// centred on a circle of radius 3, returned as 2-D points with labels.
pub fn generate_separable_data(
    n_samples: usize,
    n_classes: usize,
    spread: f64,
    seed: u64,
) -> (Vec<Vec<f64>>, Vec<u8>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut x = Vec::with_capacity(n_samples);
    let mut y = Vec::with_capacity(n_samples);
    for i in 0..n_samples {
        let class = i % n_classes.max(1);
        let angle = 2.0 * PI * class as f64 / n_classes.max(1) as f64;
        let dx: f64 = rng.sample(StandardNormal);
        let dy: f64 = rng.sample(StandardNormal);
        x.push(vec![3.0 * angle.cos() + spread * dx, 3.0 * angle.sin() + spread * dy]);
        y.push(class as u8);
    }
    (x, y)
}

/// Table of per-epoch scores, every `stride` epochs plus the last one.
pub fn format_history_table(history: &TrainingHistory, stride: usize) -> String {
    let stride = stride.max(1);
    let mut out = String::new();
    let _ = writeln!(out, "+-------+------------+------------+---------+");
    let _ = writeln!(out, "| Epoch | Train Loss |  Val Loss  | Val Acc |");
    let _ = writeln!(out, "+-------+------------+------------+---------+");
    let n = history.len();
    for r in history.records() {
        if r.epoch % stride == 0 || r.epoch == n {
            let _ = writeln!(
                out,
                "| {:>5} | {:>10.6} | {:>10.6} | {:>7.4} |",
                r.epoch, r.train_loss, r.val_loss, r.val_accuracy
            );
        }
    }
    let _ = write!(out, "+-------+------------+------------+---------+");
    out
}

/// Confusion matrix with true labels down the side.
pub fn format_confusion_matrix(cm: &[Vec<usize>]) -> String {
    let mut out = String::from("true\\pred");
    for c in 0..cm.len() {
        let _ = write!(out, "{:>6}", c);
    }
    for (t, row) in cm.iter().enumerate() {
        let _ = write!(out, "\n{:>9}", t);
        for v in row {
            let _ = write!(out, "{:>6}", v);
        }
    }
    out
}
