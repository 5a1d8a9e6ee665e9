//! Multinomial logistic (softmax) regression.
use crate::activations::Softmax;
use crate::error::{DigitError, Result};
use crate::linalg::{self, Matrix};
use crate::loss;
use rand::Rng;
use std::fmt;

/// Weight scale for the Gaussian initialisation.
const INIT_SCALE: f64 = 0.01;

/// Softmax regression: `softmax(X · W + b)`.
#[derive(Debug, Clone)]
pub struct SoftmaxRegression {
    /// n_features × n_classes
    pub weights: Matrix,
    /// n_classes
    pub bias: Vec<f64>,
    pub learning_rate: f64,
    /// L2 regularisation strength
    pub reg_lambda: f64,
}

/// Gradients for one mini-batch
#[derive(Debug, Clone)]
pub struct Gradients {
    pub d_w: Matrix,
    pub db: Vec<f64>,
}

impl SoftmaxRegression {
    /// Create a classifier with `N(0, 1) * 0.01` weights and zero bias.
    pub fn new<R: Rng>(
        n_features: usize,
        n_classes: usize,
        learning_rate: f64,
        reg_lambda: f64,
        rng: &mut R,
    ) -> Self {
        Self {
            weights: linalg::random_normal(n_features, n_classes, INIT_SCALE, rng),
            bias: vec![0.0; n_classes],
            learning_rate,
            reg_lambda,
        }
    }

    /// Rebuild a classifier from stored parameters.
    pub fn from_parameters(
        weights: Matrix,
        bias: Vec<f64>,
        learning_rate: f64,
        reg_lambda: f64,
    ) -> Result<Self> {
        let n_classes = bias.len();
        if let Some(row) = weights.iter().find(|r| r.len() != n_classes) {
            return Err(DigitError::shape("weight columns vs bias", n_classes, row.len()));
        }
        Ok(Self {
            weights,
            bias,
            learning_rate,
            reg_lambda,
        })
    }

    pub fn n_features(&self) -> usize {
        self.weights.len()
    }

    pub fn n_classes(&self) -> usize {
        self.bias.len()
    }

    fn check_width(&self, x: &[Vec<f64>]) -> Result<()> {
        match x.iter().find(|row| row.len() != self.n_features()) {
            Some(row) => Err(DigitError::shape(
                "classifier input",
                self.n_features(),
                row.len(),
            )),
            None => Ok(()),
        }
    }

    /// Linear scores `X · W + b`.
    pub fn scores(&self, x: &[Vec<f64>]) -> Result<Matrix> {
        self.check_width(x)?;
        let mut z = linalg::matmul(x, &self.weights)?;
        linalg::add_row_inplace(&mut z, &self.bias);
        Ok(z)
    }

    /// Class probabilities, one row per input.
    pub fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Matrix> {
        Ok(Softmax.apply_rows(&self.scores(x)?))
    }

    /// Most probable class per row (lowest index on ties).
    pub fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<usize>> {
        Ok(self
            .predict_proba(x)?
            .iter()
            .map(|p| linalg::argmax(p))
            .collect())
    }

    /// Cross-entropy of `y_pred` against one-hot `y_true`, plus the L2 penalty on W.
    pub fn loss(&self, y_true: &[Vec<f64>], y_pred: &[Vec<f64>]) -> Result<f64> {
        loss::regularized_loss(y_true, y_pred, &self.weights, self.reg_lambda)
    }

    /// Compute `(dW, db)` for a batch given its predictions.
    pub fn compute_gradients(
        &self,
        x: &[Vec<f64>],
        y_true: &[Vec<f64>],
        y_pred: &[Vec<f64>],
    ) -> Result<Gradients> {
        self.check_width(x)?;
        if x.len() != y_true.len() {
            return Err(DigitError::shape("batch rows vs targets", x.len(), y_true.len()));
        }
        let dz = loss::cross_entropy_deriv(y_true, y_pred)?;
        let mut d_w = linalg::matmul_transpose_a(x, &dz)?;
        for (g_row, w_row) in d_w.iter_mut().zip(&self.weights) {
            for (g, &w) in g_row.iter_mut().zip(w_row) {
                *g += self.reg_lambda * w;
            }
        }
        let db = linalg::column_sum(&dz);
        Ok(Gradients { d_w, db })
    }

    /// Apply gradients (SGD step).
    pub fn apply_gradients(&mut self, grads: &Gradients) {
        let lr = self.learning_rate;
        for (b, &g) in self.bias.iter_mut().zip(&grads.db) {
            *b -= lr * g;
        }
        for (w_row, g_row) in self.weights.iter_mut().zip(&grads.d_w) {
            for (w, &g) in w_row.iter_mut().zip(g_row) {
                *w -= lr * g;
            }
        }
    }

    /// Forward pass, gradient and update for one mini-batch.
    pub fn train_batch(&mut self, x: &[Vec<f64>], y_true: &[Vec<f64>]) -> Result<()> {
        let y_pred = self.predict_proba(x)?;
        let grads = self.compute_gradients(x, y_true, &y_pred)?;
        self.apply_gradients(&grads);
        Ok(())
    }
}

impl fmt::Display for SoftmaxRegression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SoftmaxRegression: {} -> {} (lr={}, lambda={})",
            self.n_features(),
            self.n_classes(),
            self.learning_rate,
            self.reg_lambda
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn model() -> SoftmaxRegression {
        SoftmaxRegression::from_parameters(
            vec![vec![1.0, -1.0, 0.0], vec![0.5, 0.5, 2.0]],
            vec![0.0, 0.1, -0.1],
            0.1,
            0.0,
        )
        .unwrap()
    }

    #[test]
    fn new_initialises_small_weights_and_zero_bias() {
        let mut rng = StdRng::seed_from_u64(1);
        let m = SoftmaxRegression::new(50, 10, 0.5, 0.01, &mut rng);
        assert_eq!(m.n_features(), 50);
        assert_eq!(m.n_classes(), 10);
        assert!(m.bias.iter().all(|&b| b == 0.0));
        assert!(m.weights.iter().flatten().all(|w| w.abs() < 0.1));
    }

    #[test]
    fn predict_is_argmax_of_probabilities() {
        let m = model();
        let x = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![-3.0, 0.2], vec![0.0, 0.0]];
        let proba = m.predict_proba(&x).unwrap();
        let pred = m.predict(&x).unwrap();
        for (row, &c) in proba.iter().zip(&pred) {
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-12);
            assert_eq!(c, linalg::argmax(row));
        }
        assert_eq!(pred[0], 0);
        assert_eq!(pred[1], 2);
    }

    #[test]
    fn ties_resolve_to_lowest_class() {
        let m = SoftmaxRegression::from_parameters(vec![vec![0.0; 4]], vec![0.0; 4], 0.1, 0.0)
            .unwrap();
        assert_eq!(m.predict(&[vec![3.0]]).unwrap(), vec![0]);
    }

    #[test]
    fn wrong_feature_width_is_rejected() {
        let err = model().predict(&[vec![1.0, 2.0, 3.0]]).unwrap_err();
        assert!(matches!(err, DigitError::ShapeMismatch { expected: 2, actual: 3, .. }));
    }

    #[test]
    fn from_parameters_checks_bias_length() {
        assert!(SoftmaxRegression::from_parameters(vec![vec![0.0; 3]], vec![0.0; 2], 0.1, 0.0).is_err());
    }

    #[test]
    fn gradients_match_closed_form() {
        let mut m = model();
        m.reg_lambda = 0.5;
        let x = vec![vec![1.0, 2.0], vec![0.0, -1.0]];
        let y = vec![vec![0.0, 1.0, 0.0], vec![1.0, 0.0, 0.0]];
        let p = m.predict_proba(&x).unwrap();
        let g = m.compute_gradients(&x, &y, &p).unwrap();
        for i in 0..2 {
            for c in 0..3 {
                let expected: f64 = (0..2)
                    .map(|r| x[r][i] * (p[r][c] - y[r][c]) / 2.0)
                    .sum::<f64>()
                    + 0.5 * m.weights[i][c];
                assert!((g.d_w[i][c] - expected).abs() < 1e-12);
            }
        }
        for c in 0..3 {
            let expected: f64 = (0..2).map(|r| (p[r][c] - y[r][c]) / 2.0).sum();
            assert!((g.db[c] - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn gradient_step_lowers_batch_loss() {
        let mut m = model();
        let x = vec![vec![1.0, 2.0], vec![0.0, -1.0], vec![2.0, 0.5]];
        let y = vec![vec![0.0, 1.0, 0.0], vec![1.0, 0.0, 0.0], vec![0.0, 0.0, 1.0]];
        let before = m.loss(&y, &m.predict_proba(&x).unwrap()).unwrap();
        for _ in 0..20 {
            m.train_batch(&x, &y).unwrap();
        }
        let after = m.loss(&y, &m.predict_proba(&x).unwrap()).unwrap();
        assert!(after < before);
    }
}
