use crate::error::{PipelineError, Result};

/// Relative ridge added to the normal equations' diagonal
pub const RIDGE_SCALE: f64 = 1e-10;

/// Least-squares coefficients for `design · β ≈ target`.
///
/// Solves the normal equations with a small ridge term scaled to the trace
/// of `XᵀX`, by Gaussian elimination with partial pivoting.
pub fn least_squares(design: &[Vec<f64>], target: &[f64]) -> Result<Vec<f64>> {
    let p = design.first().map(Vec::len).unwrap_or(0);
    if design.is_empty() || p == 0 || design.len() != target.len() {
        return Err(PipelineError::Estimation(format!(
            "least squares needs a non-empty design matching the target ({} rows, {} targets)",
            design.len(),
            target.len()
        )));
    }

    let mut gram = vec![vec![0.0; p]; p];
    let mut moment = vec![0.0; p];
    for (row, &y) in design.iter().zip(target) {
        for i in 0..p {
            moment[i] += row[i] * y;
            for j in 0..p {
                gram[i][j] += row[i] * row[j];
            }
        }
    }

    let trace: f64 = (0..p).map(|i| gram[i][i]).sum();
    let ridge = RIDGE_SCALE * trace / p as f64;
    for (i, row) in gram.iter_mut().enumerate() {
        row[i] += ridge;
    }

    solve(gram, moment)
}

/// Solve `a · x = b` in place.
pub fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>> {
    let n = b.len();

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&r, &s| a[r][col].abs().total_cmp(&a[s][col].abs()))
            .unwrap_or(col);
        if !a[pivot][col].is_finite() || a[pivot][col].abs() < f64::MIN_POSITIVE {
            return Err(PipelineError::Estimation("final-stage system is singular".to_string()));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }

    if x.iter().any(|v| !v.is_finite()) {
        return Err(PipelineError::Estimation("final-stage solution is not finite".to_string()));
    }
    Ok(x)
}
