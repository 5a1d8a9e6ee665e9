//! Dense row-major matrix helpers used by the classifier and the PCA reducer.
use crate::error::{DigitError, Result};
use rand::Rng;
use rand_distr::StandardNormal;

/// Matrix type (outer index = row)
pub type Matrix = Vec<Vec<f64>>;

/// Zero matrix with the given shape.
pub fn zeros(rows: usize, cols: usize) -> Matrix {
    vec![vec![0.0; cols]; rows]
}

/// Gaussian matrix `N(0, 1) * scale`.
pub fn random_normal<R: Rng + ?Sized>(rows: usize, cols: usize, scale: f64, rng: &mut R) -> Matrix {
    (0..rows)
        .map(|_| {
            (0..cols)
                .map(|_| rng.sample::<f64, _>(StandardNormal) * scale)
                .collect()
        })
        .collect()
}

/// Number of columns, taken from the first row (0 for an empty matrix).
pub fn cols(m: &[Vec<f64>]) -> usize {
    m.first().map_or(0, Vec::len)
}

/// `a · b` where `a` is `n × k` and `b` is `k × c`.
pub fn matmul(a: &[Vec<f64>], b: &[Vec<f64>]) -> Result<Matrix> {
    let k = b.len();
    let c = cols(b);
    let mut out = zeros(a.len(), c);
    for (row, out_row) in a.iter().zip(out.iter_mut()) {
        if row.len() != k {
            return Err(DigitError::shape("matmul inner dimension", k, row.len()));
        }
        // i-k-j order keeps the inner loop on contiguous rows of `b`
        for (&x, b_row) in row.iter().zip(b) {
            if x == 0.0 {
                continue;
            }
            for (o, &w) in out_row.iter_mut().zip(b_row) {
                *o += x * w;
            }
        }
    }
    Ok(out)
}

/// `aᵀ · b` without materialising the transpose; `a` is `n × k`, `b` is `n × c`.
pub fn matmul_transpose_a(a: &[Vec<f64>], b: &[Vec<f64>]) -> Result<Matrix> {
    if a.len() != b.len() {
        return Err(DigitError::shape("transposed matmul rows", a.len(), b.len()));
    }
    let mut out = zeros(cols(a), cols(b));
    for (a_row, b_row) in a.iter().zip(b) {
        for (&x, out_row) in a_row.iter().zip(out.iter_mut()) {
            if x == 0.0 {
                continue;
            }
            for (o, &y) in out_row.iter_mut().zip(b_row) {
                *o += x * y;
            }
        }
    }
    Ok(out)
}

/// Adds `bias` to every row in place.
pub fn add_row_inplace(m: &mut [Vec<f64>], bias: &[f64]) {
    for row in m.iter_mut() {
        for (v, &b) in row.iter_mut().zip(bias) {
            *v += b;
        }
    }
}

/// Sum over rows, one value per column.
pub fn column_sum(m: &[Vec<f64>]) -> Vec<f64> {
    let mut out = vec![0.0; cols(m)];
    for row in m {
        for (o, &v) in out.iter_mut().zip(row) {
            *o += v;
        }
    }
    out
}

/// Sum of squares of every entry.
pub fn squared_norm(m: &[Vec<f64>]) -> f64 {
    m.iter().flat_map(|row| row.iter()).map(|&v| v * v).sum()
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(&x, &y)| x * y).sum()
}

/// Index of the first maximum (lowest index wins ties).
pub fn argmax(v: &[f64]) -> usize {
    v.iter()
        .enumerate()
        .fold(0usize, |max_i, (i, &x)| if x > v[max_i] { i } else { max_i })
}
