//! Principal component projection.
use crate::error::{DigitError, Result};
use crate::linalg::{self, Matrix};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

const POWER_MAX_ITERS: usize = 500;
const POWER_TOLERANCE: f64 = 1e-10;

/// A fitted PCA transform: `(x - mean) · components`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pca {
    /// Per-feature mean, length D.
    pub mean: Vec<f64>,
    /// D × K, one principal direction per column.
    pub components: Matrix,
    pub n_components: usize,
    /// Fraction of total variance captured by each component, length K.
    pub explained_variance_ratio: Vec<f64>,
}

impl Pca {
    pub fn new(mean: Vec<f64>, components: Matrix, explained_variance_ratio: Vec<f64>) -> Result<Self> {
        let pca = Self {
            n_components: linalg::cols(&components),
            mean,
            components,
            explained_variance_ratio,
        };
        pca.validate()?;
        Ok(pca)
    }

    /// Checks the internal shapes; deserialized values are not trusted.
    pub fn validate(&self) -> Result<()> {
        let d = self.mean.len();
        if self.components.len() != d {
            return Err(DigitError::shape("pca component rows", d, self.components.len()));
        }
        if let Some(row) = self.components.iter().find(|r| r.len() != self.n_components) {
            return Err(DigitError::shape("pca component columns", self.n_components, row.len()));
        }
        if self.n_components > d {
            return Err(DigitError::shape("pca components vs input dim", d, self.n_components));
        }
        if self.explained_variance_ratio.len() != self.n_components {
            return Err(DigitError::shape(
                "pca explained variance",
                self.n_components,
                self.explained_variance_ratio.len(),
            ));
        }
        Ok(())
    }

    pub fn input_dim(&self) -> usize {
        self.mean.len()
    }

    /// Total variance explained by the kept components.
    pub fn variance_explained(&self) -> f64 {
        self.explained_variance_ratio.iter().sum()
    }

    /// Projects an `M × D` batch to `M × K`.
    pub fn transform(&self, x: &[Vec<f64>]) -> Result<Matrix> {
        if self.components.len() != self.input_dim() {
            return Err(DigitError::shape(
                "pca component rows",
                self.input_dim(),
                self.components.len(),
            ));
        }
        let mut centered = Vec::with_capacity(x.len());
        for row in x {
            if row.len() != self.input_dim() {
                return Err(DigitError::shape("pca transform input", self.input_dim(), row.len()));
            }
            centered.push(row.iter().zip(&self.mean).map(|(&v, &m)| v - m).collect::<Vec<_>>());
        }
        linalg::matmul(&centered, &self.components)
    }

    /// Projects a single vector.
    pub fn transform_one(&self, x: &[f64]) -> Result<Vec<f64>> {
        let mut out = self.transform(&[x.to_vec()])?;
        Ok(out.pop().unwrap_or_default())
    }

    /// Fits the top `k` principal components of `x` (rows are samples).
    ///
    /// Uses the sample covariance and power iteration; each direction is kept
    /// orthogonal to the ones already found, so the result is ordered by
    /// decreasing eigenvalue.
    pub fn fit(x: &[Vec<f64>], k: usize, seed: u64) -> Result<Self> {
        let n = x.len();
        if n < 2 {
            return Err(DigitError::DataFormat(format!(
                "pca needs at least 2 samples, got {}",
                n
            )));
        }
        let d = linalg::cols(x);
        if k > d {
            return Err(DigitError::shape("pca components vs input dim", d, k));
        }
        if let Some(row) = x.iter().find(|r| r.len() != d) {
            return Err(DigitError::shape("pca fit input", d, row.len()));
        }

        let mut mean = vec![0.0; d];
        for row in x {
            for (m, &v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n as f64);

        let centered: Matrix = x
            .iter()
            .map(|row| row.iter().zip(&mean).map(|(&v, &m)| v - m).collect())
            .collect();
        let mut cov = linalg::matmul_transpose_a(&centered, &centered)?;
        for row in cov.iter_mut() {
            row.iter_mut().for_each(|v| *v /= (n - 1) as f64);
        }
        let trace: f64 = (0..d).map(|i| cov[i][i]).sum();

        let mut rng = StdRng::seed_from_u64(seed);
        let mut directions: Vec<Vec<f64>> = Vec::with_capacity(k);
        let mut ratios = Vec::with_capacity(k);
        for idx in 0..k {
            let (v, eigenvalue) = power_iteration(&cov, &directions, &mut rng);
            debug!(component = idx, eigenvalue, "pca component");
            ratios.push(if trace > 0.0 { eigenvalue / trace } else { 0.0 });
            directions.push(v);
        }

        // columns of `components` are the directions
        let mut components = linalg::zeros(d, k);
        for (j, v) in directions.iter().enumerate() {
            for (i, &val) in v.iter().enumerate() {
                components[i][j] = val;
            }
        }
        Self::new(mean, components, ratios)
    }
}

fn orthogonalize(v: &mut [f64], basis: &[Vec<f64>]) {
    for b in basis {
        let proj = linalg::dot(v, b);
        for (x, &y) in v.iter_mut().zip(b) {
            *x -= proj * y;
        }
    }
}

fn normalize(v: &mut [f64]) -> f64 {
    let norm = linalg::dot(v, v).sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    norm
}

/// Dominant eigenpair of the symmetric PSD matrix `a` restricted to the
/// complement of `basis`.
fn power_iteration(a: &[Vec<f64>], basis: &[Vec<f64>], rng: &mut StdRng) -> (Vec<f64>, f64) {
    let d = a.len();
    let mut v: Vec<f64> = (0..d).map(|_| rng.gen_range(-1.0..1.0)).collect();
    orthogonalize(&mut v, basis);
    if normalize(&mut v) == 0.0 {
        return (v, 0.0);
    }
    let mut eigenvalue = 0.0;
    for _ in 0..POWER_MAX_ITERS {
        let mut next: Vec<f64> = a.iter().map(|row| linalg::dot(row, &v)).collect();
        orthogonalize(&mut next, basis);
        let norm = normalize(&mut next);
        if norm == 0.0 {
            // remaining subspace carries no variance; keep an orthonormal direction anyway
            return (v, 0.0);
        }
        let delta: f64 = next.iter().zip(&v).map(|(a, b)| (a - b).abs()).sum();
        v = next;
        eigenvalue = norm;
        if delta < POWER_TOLERANCE {
            break;
        }
    }
    (v, eigenvalue)
}
