//! Double machine learning with a linear final stage.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;
use tracing::debug;

use super::forest::Regressor;
use super::linalg::least_squares;
use crate::error::{PipelineError, Result};

/// Covariates with a standard deviation below this are dropped from the final stage.
const MIN_COVARIATE_SD: f64 = 1e-12;

/// Cross-fitted DML estimator of a treatment effect that is linear in `X`.
///
/// `Y` and `T` are residualized on `X` with out-of-fold nuisance predictions,
/// then `Y_res` is regressed on `T_res · [1, X]`.
pub struct LinearDml<MY: Regressor, MT: Regressor> {
    pub model_y: MY,
    pub model_t: MT,
    pub folds: usize,
    pub seed: u64,
}

/// Final-stage coefficients over `[1, standardized kept covariates]`
#[derive(Debug, Clone, PartialEq)]
pub struct FittedDml {
    theta: Vec<f64>,
    kept: Vec<usize>,
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl FittedDml {
    /// Constant part of the effect, at the covariate means
    pub fn intercept(&self) -> f64 {
        self.theta[0]
    }

    /// Indices of the covariates that entered the final stage
    pub fn kept_covariates(&self) -> &[usize] {
        &self.kept
    }

    /// Marginal effect of the treatment for each covariate row
    pub fn effect(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        x.iter()
            .enumerate()
            .map(|(i, row)| {
                self.kept.iter().enumerate().try_fold(self.theta[0], |acc, (j, &col)| {
                    let value = row.get(col).ok_or_else(|| {
                        PipelineError::Estimation(format!("covariate row {} has no column {}", i, col))
                    })?;
                    Ok(acc + self.theta[j + 1] * (value - self.means[j]) / self.scales[j])
                })
            })
            .collect()
    }
}

impl<MY: Regressor, MT: Regressor> LinearDml<MY, MT> {
    pub fn new(model_y: MY, model_t: MT, folds: usize, seed: u64) -> Self {
        Self {
            model_y,
            model_t,
            folds,
            seed,
        }
    }

    pub fn fit(&self, y: &[f64], t: &[f64], x: &[Vec<f64>]) -> Result<FittedDml> {
        let n = y.len();
        if t.len() != n || x.len() != n {
            return Err(PipelineError::Estimation(format!(
                "outcome, treatment and covariates differ in length ({}, {}, {})",
                n,
                t.len(),
                x.len()
            )));
        }
        let width = x.first().map(Vec::len).unwrap_or(0);
        if let Some(i) = x.iter().position(|row| row.len() != width) {
            return Err(PipelineError::Estimation(format!(
                "covariate row {} has {} columns, expected {}",
                i,
                x[i].len(),
                width
            )));
        }
        if self.folds < 2 {
            return Err(PipelineError::Estimation("cross-fitting needs at least 2 folds".to_string()));
        }
        if n < 2 * self.folds {
            return Err(PipelineError::Estimation(format!(
                "{} rows is too few for {} folds",
                n, self.folds
            )));
        }
        let all_finite = y.iter().chain(t).chain(x.iter().flatten()).all(|v| v.is_finite());
        if !all_finite {
            return Err(PipelineError::Estimation("inputs contain NaN or infinite values".to_string()));
        }

        let (y_res, t_res) = self.residualize(y, t, x)?;

        let mut kept = Vec::new();
        let mut means = Vec::new();
        let mut scales = Vec::new();
        for col in 0..width {
            let mean = x.iter().map(|row| row[col]).sum::<f64>() / n as f64;
            let variance = x.iter().map(|row| (row[col] - mean).powi(2)).sum::<f64>() / n as f64;
            let sd = variance.sqrt();
            if sd > MIN_COVARIATE_SD * mean.abs().max(1.0) {
                kept.push(col);
                means.push(mean);
                scales.push(sd);
            } else {
                debug!("Dropping constant covariate {} from the final stage", col);
            }
        }

        let design: Vec<Vec<f64>> = (0..n)
            .map(|i| {
                let mut row = Vec::with_capacity(kept.len() + 1);
                row.push(t_res[i]);
                for (j, &col) in kept.iter().enumerate() {
                    row.push(t_res[i] * (x[i][col] - means[j]) / scales[j]);
                }
                row
            })
            .collect();

        let theta = least_squares(&design, &y_res)?;
        debug!("Final-stage coefficients: {:?}", theta);

        Ok(FittedDml {
            theta,
            kept,
            means,
            scales,
        })
    }

    /// Out-of-fold residuals of `Y` and `T` on `X`.
    fn residualize(&self, y: &[f64], t: &[f64], x: &[Vec<f64>]) -> Result<(Vec<f64>, Vec<f64>)> {
        let n = y.len();
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut Pcg64Mcg::seed_from_u64(self.seed));

        let mut fold_of = vec![0; n];
        for (position, &row) in order.iter().enumerate() {
            fold_of[row] = position % self.folds;
        }

        let mut y_res = vec![0.0; n];
        let mut t_res = vec![0.0; n];

        for fold in 0..self.folds {
            let (test, train): (Vec<usize>, Vec<usize>) = (0..n).partition(|&i| fold_of[i] == fold);

            let train_x: Vec<Vec<f64>> = train.iter().map(|&i| x[i].clone()).collect();
            let test_x: Vec<Vec<f64>> = test.iter().map(|&i| x[i].clone()).collect();
            let train_y: Vec<f64> = train.iter().map(|&i| y[i]).collect();
            let train_t: Vec<f64> = train.iter().map(|&i| t[i]).collect();

            let fold_seed = self.seed.wrapping_add(fold as u64);
            let y_hat = self.model_y.fit_predict(&train_x, &train_y, &test_x, fold_seed)?;
            let t_hat = self.model_t.fit_predict(&train_x, &train_t, &test_x, fold_seed.wrapping_add(1 << 32))?;

            for (k, &i) in test.iter().enumerate() {
                y_res[i] = y[i] - y_hat[k];
                t_res[i] = t[i] - t_hat[k];
            }
        }

        Ok((y_res, t_res))
    }
}
