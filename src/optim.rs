//! Optimizers.
//!
//! Optimizers update an `AutoEncoder` from a set of `Gradients` without
//! allocating per step.
//!
//! - Optimizer *state* (momentum/Adam moments) lives outside the model, one
//!   buffer per parameter slot.
//! - The training loop owns the optimizer state and reuses it across steps.

use crate::{AutoEncoder, Error, Gradients, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
/// Optimizer choice for training.
pub enum Optimizer {
    /// Plain SGD.
    Sgd,
    /// SGD with momentum.
    SgdMomentum { momentum: f32 },
    /// Adam (bias-corrected).
    Adam { beta1: f32, beta2: f32, eps: f32 },
}

impl Default for Optimizer {
    /// SGD with momentum 0.9.
    fn default() -> Self {
        Optimizer::SgdMomentum { momentum: 0.9 }
    }
}

impl Optimizer {
    /// Adam with the usual defaults.
    pub fn adam() -> Self {
        Optimizer::Adam {
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-7,
        }
    }

    /// Validate optimizer hyperparameters.
    pub fn validate(self) -> Result<()> {
        match self {
            Optimizer::Sgd => Ok(()),
            Optimizer::SgdMomentum { momentum } => {
                if !(momentum.is_finite() && (0.0..1.0).contains(&momentum)) {
                    return Err(Error::InvalidConfig(format!(
                        "momentum must be finite and in [0,1), got {momentum}"
                    )));
                }
                Ok(())
            }
            Optimizer::Adam { beta1, beta2, eps } => {
                if !(beta1.is_finite() && (0.0..1.0).contains(&beta1)) {
                    return Err(Error::InvalidConfig(format!(
                        "adam beta1 must be finite and in [0,1), got {beta1}"
                    )));
                }
                if !(beta2.is_finite() && (0.0..1.0).contains(&beta2)) {
                    return Err(Error::InvalidConfig(format!(
                        "adam beta2 must be finite and in [0,1), got {beta2}"
                    )));
                }
                if !(eps.is_finite() && eps > 0.0) {
                    return Err(Error::InvalidConfig(format!(
                        "adam eps must be finite and > 0, got {eps}"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Allocate optimizer state for `model`.
    pub fn state(self, model: &AutoEncoder) -> Result<OptimizerState> {
        self.validate()?;

        match self {
            Optimizer::Sgd => Ok(OptimizerState::Sgd),
            Optimizer::SgdMomentum { momentum } => Ok(OptimizerState::SgdMomentum {
                momentum,
                velocity: zeros_like_params(model),
            }),
            Optimizer::Adam { beta1, beta2, eps } => Ok(OptimizerState::Adam {
                beta1,
                beta2,
                eps,
                t: 0,
                beta1_pow: 1.0,
                beta2_pow: 1.0,
                m: zeros_like_params(model),
                v: zeros_like_params(model),
            }),
        }
    }
}

#[derive(Debug, Clone, Default)]
/// Owned optimizer state.
pub enum OptimizerState {
    /// Plain SGD (no state).
    #[default]
    Sgd,
    /// SGD with momentum state.
    SgdMomentum {
        momentum: f32,
        velocity: Vec<Vec<f32>>,
    },
    /// Adam state.
    Adam {
        beta1: f32,
        beta2: f32,
        eps: f32,
        t: u64,
        beta1_pow: f32,
        beta2_pow: f32,
        m: Vec<Vec<f32>>,
        v: Vec<Vec<f32>>,
    },
}

impl OptimizerState {
    /// Apply one optimizer step.
    ///
    /// `lr` is passed in from the training loop.
    pub fn step(&mut self, model: &mut AutoEncoder, grads: &Gradients, lr: f32) {
        assert!(lr.is_finite() && lr > 0.0, "lr must be finite and > 0");
        debug_assert_eq!(grads.num_slots(), model.num_param_slots());

        match self {
            OptimizerState::Sgd => {
                model.for_each_param_mut(|slot, params| {
                    for (p, &g) in params.iter_mut().zip(grads.slot(slot)) {
                        *p -= lr * g;
                    }
                });
            }
            OptimizerState::SgdMomentum { momentum, velocity } => {
                let momentum = *momentum;
                model.for_each_param_mut(|slot, params| {
                    let vs = &mut velocity[slot];
                    debug_assert_eq!(vs.len(), params.len());
                    for ((p, v), &g) in params.iter_mut().zip(vs.iter_mut()).zip(grads.slot(slot)) {
                        *v = momentum * *v + g;
                        *p -= lr * *v;
                    }
                });
            }
            OptimizerState::Adam {
                beta1,
                beta2,
                eps,
                t,
                beta1_pow,
                beta2_pow,
                m,
                v,
            } => {
                *t += 1;
                *beta1_pow *= *beta1;
                *beta2_pow *= *beta2;

                let (b1, b2, eps) = (*beta1, *beta2, *eps);
                let corr1 = 1.0 - *beta1_pow;
                let corr2 = 1.0 - *beta2_pow;

                model.for_each_param_mut(|slot, params| {
                    let ms = &mut m[slot];
                    let vs = &mut v[slot];
                    let gs = grads.slot(slot);
                    debug_assert_eq!(ms.len(), params.len());
                    debug_assert_eq!(vs.len(), params.len());

                    for i in 0..params.len() {
                        let g = gs[i];
                        ms[i] = b1 * ms[i] + (1.0 - b1) * g;
                        vs[i] = b2 * vs[i] + (1.0 - b2) * (g * g);

                        let m_hat = ms[i] / corr1;
                        let v_hat = vs[i] / corr2;
                        params[i] -= lr * m_hat / (v_hat.sqrt() + eps);
                    }
                });
            }
        }
    }
}

fn zeros_like_params(model: &AutoEncoder) -> Vec<Vec<f32>> {
    let mut slots = Vec::with_capacity(model.num_param_slots());
    model.for_each_param(|_, params| slots.push(vec![0.0; params.len()]));
    slots
}
