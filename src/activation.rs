//! Activation functions.
//!
//! A dense layer computes a pre-activation value `z = W x + b` and then applies an
//! activation function element-wise: `y = activation(z)`.
//!
//! Only the *post-activation* outputs `y` are cached during training. Backprop
//! recovers `dL/dz` from `dL/dy` and `y`, so no separate `z` buffer is needed.
//!
//! Activations can also be parsed from the usual framework names
//! (`"relu"`, `"sigmoid"`, `"tanh"`, `"linear"`, `"leaky_relu"`).

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Slope used when `"leaky_relu"` is parsed from a string.
pub const DEFAULT_LEAKY_ALPHA: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
/// Element-wise activation function.
pub enum Activation {
    Tanh,
    #[default]
    ReLU,
    LeakyReLU {
        alpha: f32,
    },
    Sigmoid,
    Identity,
}

impl Activation {
    /// Validate activation parameters.
    pub fn validate(self) -> Result<()> {
        match self {
            Activation::LeakyReLU { alpha } => {
                if !(alpha.is_finite() && alpha >= 0.0) {
                    return Err(Error::InvalidConfig(format!(
                        "leaky ReLU alpha must be finite and >= 0, got {alpha}"
                    )));
                }
            }
            Activation::Tanh | Activation::ReLU | Activation::Sigmoid | Activation::Identity => {}
        }

        Ok(())
    }

    /// Framework-style name of this activation.
    pub fn name(self) -> &'static str {
        match self {
            Activation::Tanh => "tanh",
            Activation::ReLU => "relu",
            Activation::LeakyReLU { .. } => "leaky_relu",
            Activation::Sigmoid => "sigmoid",
            Activation::Identity => "linear",
        }
    }

    #[inline]
    pub(crate) fn forward(self, x: f32) -> f32 {
        match self {
            Activation::Tanh => x.tanh(),
            Activation::ReLU => x.max(0.0),
            Activation::LeakyReLU { alpha } => {
                if x > 0.0 {
                    x
                } else {
                    alpha * x
                }
            }
            Activation::Sigmoid => sigmoid(x),
            Activation::Identity => x,
        }
    }

    /// Derivative of the activation with respect to its input, expressed in terms
    /// of the cached post-activation output `y`.
    #[inline]
    pub(crate) fn grad_from_output(self, y: f32) -> f32 {
        match self {
            Activation::Tanh => 1.0 - y * y,
            Activation::ReLU => {
                if y > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::LeakyReLU { alpha } => {
                if y > 0.0 {
                    1.0
                } else {
                    alpha
                }
            }
            Activation::Sigmoid => y * (1.0 - y),
            Activation::Identity => 1.0,
        }
    }

    /// Apply the activation in place.
    #[inline]
    pub(crate) fn forward_in_place(self, xs: &mut [f32]) {
        if self == Activation::Identity {
            return;
        }
        for x in xs {
            *x = self.forward(*x);
        }
    }

    /// Turn `dL/dy` into `dL/dz` in place, given the cached outputs `ys`.
    #[inline]
    pub(crate) fn backward_in_place(self, ys: &[f32], d: &mut [f32]) {
        debug_assert_eq!(ys.len(), d.len());
        if self == Activation::Identity {
            return;
        }
        for (g, &y) in d.iter_mut().zip(ys) {
            *g *= self.grad_from_output(y);
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Activation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tanh" => Ok(Activation::Tanh),
            "relu" => Ok(Activation::ReLU),
            "leaky_relu" | "leakyrelu" => Ok(Activation::LeakyReLU {
                alpha: DEFAULT_LEAKY_ALPHA,
            }),
            "sigmoid" => Ok(Activation::Sigmoid),
            "linear" | "identity" => Ok(Activation::Identity),
            other => Err(Error::InvalidConfig(format!(
                "unknown activation {other:?}"
            ))),
        }
    }
}

#[inline]
pub(crate) fn sigmoid(x: f32) -> f32 {
    // Numerically stable sigmoid.
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}
