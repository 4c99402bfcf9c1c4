//! Reconstruction losses.
//!
//! Every loss works on flat buffers and averages over *all* elements, so the same
//! functions serve a single sample `(dim,)` and a batch `(n, dim)`: the batch loss
//! is the mean of the per-sample losses.
//!
//! Typical use inside a training step:
//!
//! - run the forward pass
//! - compute `d_output` via [`Loss::backward`]
//! - backprop and update parameters with an optimizer

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Probabilities are clipped to `[BCE_EPS, 1 - BCE_EPS]` before taking logs.
pub const BCE_EPS: f32 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Supported loss functions.
pub enum Loss {
    /// Mean squared error, `mean((pred - target)^2)`.
    #[default]
    Mse,
    /// Mean absolute error.
    Mae,
    /// Binary cross-entropy on probabilities (e.g. a sigmoid decoder output),
    /// with targets in `[0, 1]`.
    BinaryCrossEntropy,
}

impl Loss {
    /// Framework-style name.
    pub fn name(self) -> &'static str {
        match self {
            Loss::Mse => "mse",
            Loss::Mae => "mae",
            Loss::BinaryCrossEntropy => "binary_crossentropy",
        }
    }

    /// Compute a loss value.
    ///
    /// Shape contract: `pred.len() == target.len()`.
    #[inline]
    pub fn forward(self, pred: &[f32], target: &[f32]) -> f32 {
        match self {
            Loss::Mse => mse(pred, target),
            Loss::Mae => mae(pred, target),
            Loss::BinaryCrossEntropy => binary_cross_entropy(pred, target),
        }
    }

    /// Compute loss + gradient w.r.t `pred`.
    ///
    /// Writes `d_pred = dL/d(pred)` into `d_pred` and returns the loss.
    ///
    /// Shape contract:
    /// - `pred.len() == target.len()`
    /// - `pred.len() == d_pred.len()`
    #[inline]
    pub fn backward(self, pred: &[f32], target: &[f32], d_pred: &mut [f32]) -> f32 {
        match self {
            Loss::Mse => mse_backward(pred, target, d_pred),
            Loss::Mae => mae_backward(pred, target, d_pred),
            Loss::BinaryCrossEntropy => binary_cross_entropy_backward(pred, target, d_pred),
        }
    }
}

impl fmt::Display for Loss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Loss {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mse" | "mean_squared_error" => Ok(Loss::Mse),
            "mae" | "mean_absolute_error" => Ok(Loss::Mae),
            "binary_crossentropy" | "bce" => Ok(Loss::BinaryCrossEntropy),
            other => Err(Error::InvalidConfig(format!("unknown loss {other:?}"))),
        }
    }
}

#[inline]
fn check_lens(pred: &[f32], target: &[f32]) {
    assert_eq!(
        pred.len(),
        target.len(),
        "pred len {} does not match target len {}",
        pred.len(),
        target.len()
    );
}

#[inline]
fn check_grad_len(pred: &[f32], d_pred: &[f32]) {
    assert_eq!(
        pred.len(),
        d_pred.len(),
        "pred len {} does not match d_pred len {}",
        pred.len(),
        d_pred.len()
    );
}

/// Mean squared error (MSE) loss.
#[inline]
pub fn mse(pred: &[f32], target: &[f32]) -> f32 {
    check_lens(pred, target);
    if pred.is_empty() {
        return 0.0;
    }

    let mut sum_sq = 0.0_f32;
    for (&p, &t) in pred.iter().zip(target) {
        let diff = p - t;
        sum_sq = diff.mul_add(diff, sum_sq);
    }
    sum_sq / pred.len() as f32
}

/// MSE loss + gradient w.r.t. `pred`: `d_pred[i] = 2 * (pred[i] - target[i]) / N`.
#[inline]
pub fn mse_backward(pred: &[f32], target: &[f32], d_pred: &mut [f32]) -> f32 {
    check_lens(pred, target);
    check_grad_len(pred, d_pred);
    if pred.is_empty() {
        return 0.0;
    }

    let inv_n = 1.0 / pred.len() as f32;
    let mut sum_sq = 0.0_f32;
    for i in 0..pred.len() {
        let diff = pred[i] - target[i];
        sum_sq = diff.mul_add(diff, sum_sq);
        d_pred[i] = 2.0 * diff * inv_n;
    }
    sum_sq * inv_n
}

/// Mean absolute error (MAE) loss.
#[inline]
pub fn mae(pred: &[f32], target: &[f32]) -> f32 {
    check_lens(pred, target);
    if pred.is_empty() {
        return 0.0;
    }

    let sum: f32 = pred.iter().zip(target).map(|(p, t)| (p - t).abs()).sum();
    sum / pred.len() as f32
}

/// MAE loss + gradient w.r.t `pred`.
///
/// Gradient is a subgradient at `pred == target`.
#[inline]
pub fn mae_backward(pred: &[f32], target: &[f32], d_pred: &mut [f32]) -> f32 {
    check_lens(pred, target);
    check_grad_len(pred, d_pred);
    if pred.is_empty() {
        return 0.0;
    }

    let inv_n = 1.0 / pred.len() as f32;
    let mut sum = 0.0_f32;
    for i in 0..pred.len() {
        let diff = pred[i] - target[i];
        sum += diff.abs();
        d_pred[i] = if diff > 0.0 {
            inv_n
        } else if diff < 0.0 {
            -inv_n
        } else {
            0.0
        };
    }
    sum * inv_n
}

/// Binary cross-entropy on probabilities.
///
/// `L = -mean(t * ln(p) + (1 - t) * ln(1 - p))` with `p` clipped to
/// `[BCE_EPS, 1 - BCE_EPS]`.
#[inline]
pub fn binary_cross_entropy(pred: &[f32], target: &[f32]) -> f32 {
    check_lens(pred, target);
    if pred.is_empty() {
        return 0.0;
    }

    let mut sum = 0.0_f32;
    for (&p, &t) in pred.iter().zip(target) {
        let p = p.clamp(BCE_EPS, 1.0 - BCE_EPS);
        sum -= t * p.ln() + (1.0 - t) * (1.0 - p).ln();
    }
    sum / pred.len() as f32
}

/// BCE loss + gradient w.r.t `pred`: `(p - t) / (p * (1 - p) * N)` on clipped `p`.
#[inline]
pub fn binary_cross_entropy_backward(pred: &[f32], target: &[f32], d_pred: &mut [f32]) -> f32 {
    check_lens(pred, target);
    check_grad_len(pred, d_pred);
    if pred.is_empty() {
        return 0.0;
    }

    let inv_n = 1.0 / pred.len() as f32;
    let mut sum = 0.0_f32;
    for i in 0..pred.len() {
        let p = pred[i].clamp(BCE_EPS, 1.0 - BCE_EPS);
        let t = target[i];
        sum -= t * p.ln() + (1.0 - t) * (1.0 - p).ln();
        d_pred[i] = (p - t) / (p * (1.0 - p)) * inv_n;
    }
    sum * inv_n
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn mse_is_zero_when_equal() {
        let pred = [1.0_f32, -2.0, 0.5];
        let target = pred;
        assert_eq!(mse(&pred, &target), 0.0);
    }

    #[test]
    fn mse_backward_matches_expected_gradient() {
        let pred = [1.0_f32, 3.0];
        let target = [2.0_f32, 1.0];
        let mut d_pred = [0.0_f32; 2];
        let loss = mse_backward(&pred, &target, &mut d_pred);

        // L = mean([(-1)^2, (2)^2]) = 2.5
        assert_relative_eq!(loss, 2.5, epsilon = 1e-6);
        assert_relative_eq!(d_pred[0], -1.0, epsilon = 1e-6);
        assert_relative_eq!(d_pred[1], 2.0, epsilon = 1e-6);
    }

    #[test]
    fn batch_loss_is_mean_of_sample_losses() {
        let pred = [0.1_f32, 0.9, 0.4, 0.6];
        let target = [0.0_f32, 1.0, 1.0, 0.0];
        for loss in [Loss::Mse, Loss::Mae, Loss::BinaryCrossEntropy] {
            let whole = loss.forward(&pred, &target);
            let a = loss.forward(&pred[..2], &target[..2]);
            let b = loss.forward(&pred[2..], &target[2..]);
            assert_relative_eq!(whole, 0.5 * (a + b), epsilon = 1e-6);
        }
    }

    #[test]
    fn bce_is_finite_for_saturated_predictions() {
        let pred = [1.0_f32, 0.0];
        let target = [0.0_f32, 1.0];
        let mut d = [0.0_f32; 2];
        let loss = binary_cross_entropy_backward(&pred, &target, &mut d);
        assert!(loss.is_finite());
        assert!(d.iter().all(|g| g.is_finite()));
        assert!(d[0] > 0.0 && d[1] < 0.0);
    }

    #[test]
    fn bce_backward_matches_numeric_gradient() {
        let pred = [0.3_f32, 0.8];
        let target = [1.0_f32, 0.25];
        let mut d = [0.0_f32; 2];
        binary_cross_entropy_backward(&pred, &target, &mut d);

        let eps = 1e-3_f32;
        for i in 0..2 {
            let mut plus = pred;
            plus[i] += eps;
            let mut minus = pred;
            minus[i] -= eps;
            let numeric = (binary_cross_entropy(&plus, &target)
                - binary_cross_entropy(&minus, &target))
                / (2.0 * eps);
            assert_relative_eq!(d[i], numeric, epsilon = 1e-2);
        }
    }

    #[test]
    fn parses_framework_names() {
        assert_eq!("mse".parse::<Loss>().unwrap(), Loss::Mse);
        assert_eq!("mean_absolute_error".parse::<Loss>().unwrap(), Loss::Mae);
        assert_eq!(
            "binary_crossentropy".parse::<Loss>().unwrap(),
            Loss::BinaryCrossEntropy
        );
        assert!("hinge".parse::<Loss>().is_err());
    }
}
