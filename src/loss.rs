//! Cross-entropy loss with L2 weight penalty.
use crate::error::{DigitError, Result};
use crate::linalg;

/// Probabilities are clipped into `[EPS, 1 - EPS]` before the log.
pub const EPS: f64 = 1e-10;

/// Mean cross-entropy over rows: `-mean(sum_c y * ln(clip(p)))`.
pub fn cross_entropy_loss(y_true: &[Vec<f64>], y_pred: &[Vec<f64>]) -> Result<f64> {
    if y_true.len() != y_pred.len() {
        return Err(DigitError::shape("loss rows", y_true.len(), y_pred.len()));
    }
    if y_true.is_empty() {
        return Ok(0.0);
    }
    let mut total = 0.0;
    for (t_row, p_row) in y_true.iter().zip(y_pred) {
        if t_row.len() != p_row.len() {
            return Err(DigitError::shape("loss classes", t_row.len(), p_row.len()));
        }
        for (&t, &p) in t_row.iter().zip(p_row) {
            total -= t * p.clamp(EPS, 1.0 - EPS).ln();
        }
    }
    Ok(total / y_true.len() as f64)
}

/// `(lambda / 2) * sum(W^2)`
pub fn l2_penalty(weights: &[Vec<f64>], lambda: f64) -> f64 {
    0.5 * lambda * linalg::squared_norm(weights)
}

/// Regularised objective minimised during training.
pub fn regularized_loss(
    y_true: &[Vec<f64>],
    y_pred: &[Vec<f64>],
    weights: &[Vec<f64>],
    lambda: f64,
) -> Result<f64> {
    Ok(cross_entropy_loss(y_true, y_pred)? + l2_penalty(weights, lambda))
}

/// Gradient of mean cross-entropy w.r.t. the softmax scores: `(p - y) / m`.
pub fn cross_entropy_deriv(y_true: &[Vec<f64>], y_pred: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
    if y_true.len() != y_pred.len() {
        return Err(DigitError::shape("loss rows", y_true.len(), y_pred.len()));
    }
    let m = y_true.len().max(1) as f64;
    Ok(y_pred
        .iter()
        .zip(y_true)
        .map(|(p_row, t_row)| p_row.iter().zip(t_row).map(|(&p, &t)| (p - t) / m).collect())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_prediction_has_near_zero_loss() {
        let y = vec![vec![0.0, 1.0], vec![1.0, 0.0]];
        let loss = cross_entropy_loss(&y, &y).unwrap();
        assert!(loss >= 0.0 && loss < 1e-9);
    }

    #[test]
    fn zero_probability_is_clipped_not_infinite() {
        let y = vec![vec![1.0, 0.0]];
        let p = vec![vec![0.0, 1.0]];
        let loss = cross_entropy_loss(&y, &p).unwrap();
        assert!((loss - (-(EPS.ln()))).abs() < 1e-9);
        assert!(loss.is_finite());
    }

    #[test]
    fn uniform_prediction_loss_is_log_classes() {
        let y = vec![vec![0.0, 0.0, 1.0, 0.0]];
        let p = vec![vec![0.25; 4]];
        assert!((cross_entropy_loss(&y, &p).unwrap() - 4f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn l2_term_is_half_lambda_squared_norm() {
        let w = vec![vec![1.0, 2.0], vec![-2.0, 0.0]];
        assert!((l2_penalty(&w, 0.1) - 0.45).abs() < 1e-12);
        let y = vec![vec![1.0, 0.0]];
        let total = regularized_loss(&y, &y, &w, 0.1).unwrap();
        assert!((total - 0.45).abs() < 1e-9);
    }

    #[test]
    fn deriv_is_scaled_residual() {
        let y = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let p = vec![vec![0.5, 0.5], vec![0.2, 0.8]];
        let d = cross_entropy_deriv(&y, &p).unwrap();
        assert!((d[0][0] + 0.25).abs() < 1e-12);
        assert!((d[1][1] + 0.1).abs() < 1e-12);
    }

    #[test]
    fn mismatched_rows_error() {
        assert!(cross_entropy_loss(&[vec![1.0]], &[]).is_err());
    }
}
