//! Batch normalization over the feature axis of a `(n, dim)` batch.
//!
//! Training normalizes with the batch statistics and folds them into the moving
//! averages; inference uses the moving averages only.

use crate::{Error, Result};

pub const DEFAULT_MOMENTUM: f32 = 0.99;
pub const DEFAULT_EPSILON: f32 = 1e-3;

#[derive(Debug, Clone)]
pub struct BatchNorm {
    dim: usize,
    momentum: f32,
    epsilon: f32,
    gamma: Vec<f32>,
    beta: Vec<f32>,
    moving_mean: Vec<f32>,
    moving_var: Vec<f32>,
}

/// Per-batch values kept from the training forward pass for backprop.
#[derive(Debug, Clone)]
pub struct BatchNormCache {
    x_hat: Vec<f32>,
    inv_std: Vec<f32>,
}

impl BatchNormCache {
    pub fn new(dim: usize, capacity: usize) -> Self {
        Self {
            x_hat: vec![0.0; dim * capacity],
            inv_std: vec![0.0; dim],
        }
    }
}

impl BatchNorm {
    pub fn new(dim: usize) -> Result<Self> {
        Self::with_params(dim, DEFAULT_MOMENTUM, DEFAULT_EPSILON)
    }

    pub fn with_params(dim: usize, momentum: f32, epsilon: f32) -> Result<Self> {
        if dim == 0 {
            return Err(Error::InvalidConfig("batch norm dim must be > 0".to_owned()));
        }
        if !(momentum.is_finite() && (0.0..1.0).contains(&momentum)) {
            return Err(Error::InvalidConfig(format!(
                "batch norm momentum must be in [0,1), got {momentum}"
            )));
        }
        if !(epsilon.is_finite() && epsilon > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "batch norm epsilon must be finite and > 0, got {epsilon}"
            )));
        }
        Ok(Self {
            dim,
            momentum,
            epsilon,
            gamma: vec![1.0; dim],
            beta: vec![0.0; dim],
            moving_mean: vec![0.0; dim],
            moving_var: vec![1.0; dim],
        })
    }

    /// Rebuild from stored parameters and statistics.
    pub fn from_parts(
        momentum: f32,
        epsilon: f32,
        gamma: Vec<f32>,
        beta: Vec<f32>,
        moving_mean: Vec<f32>,
        moving_var: Vec<f32>,
    ) -> Result<Self> {
        let mut bn = Self::with_params(gamma.len(), momentum, epsilon)?;
        let dim = bn.dim;
        for (name, v) in [
            ("beta", &beta),
            ("moving_mean", &moving_mean),
            ("moving_var", &moving_var),
        ] {
            if v.len() != dim {
                return Err(Error::InvalidShape(format!(
                    "batch norm {name} length {} does not match dim {dim}",
                    v.len()
                )));
            }
        }
        if gamma
            .iter()
            .chain(&beta)
            .chain(&moving_mean)
            .chain(&moving_var)
            .any(|v| !v.is_finite())
        {
            return Err(Error::InvalidData(
                "batch norm parameters must be finite".to_owned(),
            ));
        }
        if moving_var.iter().any(|&v| v < 0.0) {
            return Err(Error::InvalidData(
                "batch norm moving variance must be >= 0".to_owned(),
            ));
        }
        bn.gamma = gamma;
        bn.beta = beta;
        bn.moving_mean = moving_mean;
        bn.moving_var = moving_var;
        Ok(bn)
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    pub fn momentum(&self) -> f32 {
        self.momentum
    }

    #[inline]
    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    pub fn gamma(&self) -> &[f32] {
        &self.gamma
    }

    pub fn beta(&self) -> &[f32] {
        &self.beta
    }

    pub fn gamma_mut(&mut self) -> &mut [f32] {
        &mut self.gamma
    }

    pub fn beta_mut(&mut self) -> &mut [f32] {
        &mut self.beta
    }

    pub fn moving_mean(&self) -> &[f32] {
        &self.moving_mean
    }

    pub fn moving_var(&self) -> &[f32] {
        &self.moving_var
    }

    /// Training-mode forward over the first `n` rows.
    ///
    /// Updates the moving statistics and fills `cache` for [`BatchNorm::backward`].
    pub fn forward_train(&mut self, x: &[f32], n: usize, y: &mut [f32], cache: &mut BatchNormCache) {
        assert!(n > 0, "batch must not be empty");
        let d = self.dim;
        let x = &x[..n * d];
        let y = &mut y[..n * d];
        let x_hat = &mut cache.x_hat[..n * d];
        let inv_n = 1.0 / n as f32;
        // Moving variance tracks the unbiased estimate; a single row has none.
        let unbias = if n > 1 { n as f32 / (n - 1) as f32 } else { 1.0 };

        for j in 0..d {
            let mut mean = 0.0_f32;
            for i in 0..n {
                mean += x[i * d + j];
            }
            mean *= inv_n;

            let mut var = 0.0_f32;
            for i in 0..n {
                let c = x[i * d + j] - mean;
                var = c.mul_add(c, var);
            }
            var *= inv_n;

            let inv_std = 1.0 / (var + self.epsilon).sqrt();
            cache.inv_std[j] = inv_std;

            for i in 0..n {
                let idx = i * d + j;
                let xh = (x[idx] - mean) * inv_std;
                x_hat[idx] = xh;
                y[idx] = self.gamma[j].mul_add(xh, self.beta[j]);
            }

            let m = self.momentum;
            self.moving_mean[j] = m * self.moving_mean[j] + (1.0 - m) * mean;
            self.moving_var[j] = m * self.moving_var[j] + (1.0 - m) * var * unbias;
        }
    }

    /// Inference-mode forward over the first `n` rows, using the moving statistics.
    pub fn forward_inference(&self, x: &[f32], n: usize, y: &mut [f32]) {
        let d = self.dim;
        let x = &x[..n * d];
        let y = &mut y[..n * d];
        for (x_row, y_row) in x.chunks_exact(d).zip(y.chunks_exact_mut(d)) {
            for j in 0..d {
                let inv_std = 1.0 / (self.moving_var[j] + self.epsilon).sqrt();
                let xh = (x_row[j] - self.moving_mean[j]) * inv_std;
                y_row[j] = self.gamma[j].mul_add(xh, self.beta[j]);
            }
        }
    }

    /// Backward for the most recent [`BatchNorm::forward_train`] call.
    ///
    /// Overwrites `d_x`, `d_gamma` and `d_beta`.
    pub fn backward(
        &self,
        d_y: &[f32],
        n: usize,
        cache: &BatchNormCache,
        d_x: &mut [f32],
        d_gamma: &mut [f32],
        d_beta: &mut [f32],
    ) {
        let d = self.dim;
        assert_eq!(d_gamma.len(), d);
        assert_eq!(d_beta.len(), d);
        let d_y = &d_y[..n * d];
        let d_x = &mut d_x[..n * d];
        let x_hat = &cache.x_hat[..n * d];
        let nf = n as f32;

        for j in 0..d {
            let mut sum_dy = 0.0_f32;
            let mut sum_dy_xh = 0.0_f32;
            for i in 0..n {
                let idx = i * d + j;
                sum_dy += d_y[idx];
                sum_dy_xh = d_y[idx].mul_add(x_hat[idx], sum_dy_xh);
            }
            d_beta[j] = sum_dy;
            d_gamma[j] = sum_dy_xh;

            let k = self.gamma[j] * cache.inv_std[j] / nf;
            for i in 0..n {
                let idx = i * d + j;
                d_x[idx] = k * (nf * d_y[idx] - sum_dy - x_hat[idx] * sum_dy_xh);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    fn weighted_loss(bn: &BatchNorm, x: &[f32], n: usize, w: &[f32]) -> f32 {
        let mut bn = bn.clone();
        let mut y = vec![0.0; x.len()];
        let mut cache = BatchNormCache::new(bn.dim(), n);
        bn.forward_train(x, n, &mut y, &mut cache);
        y.iter().zip(w).map(|(a, b)| a * b).sum()
    }

    #[test]
    fn training_forward_normalizes_each_feature() {
        let mut bn = BatchNorm::new(2).unwrap();
        let x = [1.0_f32, 10.0, 2.0, 20.0, 3.0, 30.0];
        let mut y = [0.0_f32; 6];
        let mut cache = BatchNormCache::new(2, 3);
        bn.forward_train(&x, 3, &mut y, &mut cache);

        for j in 0..2 {
            let col: Vec<f32> = (0..3).map(|i| y[i * 2 + j]).collect();
            let mean = col.iter().sum::<f32>() / 3.0;
            assert_relative_eq!(mean, 0.0, epsilon = 1e-5);
        }
        // Moving stats move 1% towards the batch stats.
        assert_relative_eq!(bn.moving_mean()[0], 0.01 * 2.0, epsilon = 1e-6);
        assert_relative_eq!(bn.moving_mean()[1], 0.01 * 20.0, epsilon = 1e-5);
        // Unbiased variance of [1, 2, 3] is 1.
        assert_relative_eq!(bn.moving_var()[0], 0.99 + 0.01 * 1.0, epsilon = 1e-6);
        assert_relative_eq!(bn.moving_var()[1], 0.99 + 0.01 * 100.0, epsilon = 1e-4);
    }

    #[test]
    fn single_row_batch_keeps_moving_variance_finite() {
        let mut bn = BatchNorm::new(1).unwrap();
        let mut y = [0.0_f32];
        let mut cache = BatchNormCache::new(1, 1);
        bn.forward_train(&[5.0], 1, &mut y, &mut cache);

        assert_eq!(y[0], 0.0);
        assert_relative_eq!(bn.moving_var()[0], 0.99, epsilon = 1e-6);
        assert_relative_eq!(bn.moving_mean()[0], 0.05, epsilon = 1e-6);
    }

    #[test]
    fn inference_uses_moving_statistics() {
        let bn = BatchNorm::from_parts(
            0.99,
            1e-3,
            vec![2.0],
            vec![0.5],
            vec![1.0],
            vec![4.0 - 1e-3],
        )
        .unwrap();
        let mut y = [0.0_f32];
        bn.forward_inference(&[3.0], 1, &mut y);
        // (3 - 1) / 2 * 2 + 0.5
        assert_relative_eq!(y[0], 2.5, epsilon = 1e-5);
    }

    #[test]
    fn backward_matches_numeric_gradients() {
        let mut bn = BatchNorm::new(2).unwrap();
        bn.gamma_mut().copy_from_slice(&[1.5, 0.7]);
        bn.beta_mut().copy_from_slice(&[0.1, -0.2]);

        let n = 3;
        let x = vec![0.3_f32, -1.2, 0.8, 0.4, -0.5, 2.0];
        let w = vec![0.2_f32, -0.4, 0.9, 0.3, -0.7, 0.5];

        let mut trial = bn.clone();
        let mut y = vec![0.0; x.len()];
        let mut cache = BatchNormCache::new(2, n);
        trial.forward_train(&x, n, &mut y, &mut cache);
        let mut d_x = vec![0.0; x.len()];
        let mut d_gamma = vec![0.0; 2];
        let mut d_beta = vec![0.0; 2];
        trial.backward(&w, n, &cache, &mut d_x, &mut d_gamma, &mut d_beta);

        let eps = 1e-3_f32;
        let mut xv = x.clone();
        for i in 0..xv.len() {
            let orig = xv[i];
            xv[i] = orig + eps;
            let plus = weighted_loss(&bn, &xv, n, &w);
            xv[i] = orig - eps;
            let minus = weighted_loss(&bn, &xv, n, &w);
            xv[i] = orig;
            assert_relative_eq!(d_x[i], (plus - minus) / (2.0 * eps), epsilon = 2e-3);
        }
        for j in 0..2 {
            let orig = bn.gamma()[j];
            bn.gamma_mut()[j] = orig + eps;
            let plus = weighted_loss(&bn, &x, n, &w);
            bn.gamma_mut()[j] = orig - eps;
            let minus = weighted_loss(&bn, &x, n, &w);
            bn.gamma_mut()[j] = orig;
            assert_relative_eq!(d_gamma[j], (plus - minus) / (2.0 * eps), epsilon = 2e-3);
        }
        assert_relative_eq!(d_beta[0], 0.2 + 0.9 - 0.7, epsilon = 1e-6);
        assert_relative_eq!(d_beta[1], -0.4 + 0.3 + 0.5, epsilon = 1e-6);
    }

    #[test]
    fn from_parts_validates_lengths() {
        assert!(
            BatchNorm::from_parts(0.99, 1e-3, vec![1.0; 2], vec![0.0; 3], vec![0.0; 2], vec![1.0; 2])
                .is_err()
        );
        assert!(BatchNorm::from_parts(1.0, 1e-3, vec![1.0], vec![0.0], vec![0.0], vec![1.0]).is_err());
        assert!(
            BatchNorm::from_parts(0.99, 1e-3, vec![1.0], vec![0.0], vec![0.0], vec![-1.0]).is_err()
        );
    }
}
