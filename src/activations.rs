//! Softmax over score vectors and score matrices.
use crate::linalg::Matrix;

/// Softmax (vector-only)
#[derive(Debug, Clone, Copy, Default)]
pub struct Softmax;

impl Softmax {
    /// Numerically stable softmax of one score vector.
    pub fn apply_vec(&self, x: &[f64]) -> Vec<f64> {
        if x.is_empty() {
            return Vec::new();
        }
        let max = x.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        let exps: Vec<f64> = x.iter().map(|&xi| (xi - max).exp()).collect();
        let exp_sum: f64 = exps.iter().sum();
        if !exp_sum.is_finite() || exp_sum <= 0.0 {
            // non-finite scores; fall back to uniform instead of NaNs
            let n = x.len() as f64;
            return vec![1.0 / n; x.len()];
        }
        exps.into_iter().map(|e| e / exp_sum).collect()
    }

    /// Row-wise softmax of a score matrix.
    pub fn apply_rows(&self, z: &[Vec<f64>]) -> Matrix {
        z.iter().map(|row| self.apply_vec(row)).collect()
    }
}

/// Row-wise softmax.
pub fn softmax(z: &[Vec<f64>]) -> Matrix {
    Softmax.apply_rows(z)
}
