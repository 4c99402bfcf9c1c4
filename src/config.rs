//! Autoencoder configuration.
//!
//! The topology is fixed:
//!
//! ```text
//! input -> gaussian noise -> dense(encode_dim) -> [batch norm] -> [dropout] -> dense(input_dim, sigmoid)
//! ```
//!
//! `AutoEncoderConfig` only carries the knobs of that topology. Use
//! [`crate::AutoEncoderBuilder`] for a fluent, validated way to fill it in.

use crate::{Activation, Error, Result};

/// Seed used for weight initialization when none is given.
pub const DEFAULT_SEED: u64 = 123;

/// Stddev of the encoder's random normal kernel initializer.
pub const ENCODER_INIT_STDDEV: f32 = 0.01;

#[derive(Debug, Clone, PartialEq)]
pub struct AutoEncoderConfig {
    /// Width of the input and of the reconstruction.
    pub input_dim: usize,
    /// Width of the code.
    pub encode_dim: usize,
    /// L2 penalty on the encoder kernel: `l2 * sum(W^2)`.
    pub l2: f32,
    pub encode_activation: Activation,
    /// Insert batch normalization after the encoder.
    pub batch_norm: bool,
    /// Dropout rate applied to the code while training.
    pub dropout: Option<f32>,
    /// Stddev of the gaussian noise added to inputs while training.
    pub noise: f32,
    pub seed: u64,
}

impl AutoEncoderConfig {
    pub fn new(input_dim: usize, encode_dim: usize) -> Self {
        Self {
            input_dim,
            encode_dim,
            l2: 0.0,
            encode_activation: Activation::ReLU,
            batch_norm: false,
            dropout: None,
            noise: 0.0,
            seed: DEFAULT_SEED,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_dim == 0 {
            return Err(Error::InvalidConfig("input_dim must be > 0".to_owned()));
        }
        if self.encode_dim == 0 {
            return Err(Error::InvalidConfig("encode_dim must be > 0".to_owned()));
        }
        if !(self.l2.is_finite() && self.l2 >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "l2 must be finite and >= 0, got {}",
                self.l2
            )));
        }
        if !(self.noise.is_finite() && self.noise >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "noise must be finite and >= 0, got {}",
                self.noise
            )));
        }
        if let Some(rate) = self.dropout {
            if !(rate.is_finite() && (0.0..1.0).contains(&rate)) {
                return Err(Error::InvalidConfig(format!(
                    "dropout rate must be finite and in [0,1), got {rate}"
                )));
            }
        }
        self.encode_activation.validate()
    }
}
