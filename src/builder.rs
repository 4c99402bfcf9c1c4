//! Model builder.
//!
//! `AutoEncoderBuilder` is the recommended way to define a model. Every setter
//! validates its argument, so a bad value is reported where it is set rather than
//! at `build` time.

use crate::{Activation, AutoEncoder, AutoEncoderConfig, Error, Result};

#[derive(Debug, Clone)]
/// Builder for an `AutoEncoder`.
///
/// Example:
///
/// ```rust
/// use rust_autoencoder::{Activation, AutoEncoderBuilder};
///
/// # fn main() -> rust_autoencoder::Result<()> {
/// let model = AutoEncoderBuilder::new(64, 8)?
///     .encode_activation(Activation::Tanh)?
///     .l2(1e-4)?
///     .noise(0.1)?
///     .batch_norm(true)
///     .build()?;
/// assert_eq!(model.encode_dim(), 8);
/// # Ok(())
/// # }
/// ```
pub struct AutoEncoderBuilder {
    config: AutoEncoderConfig,
}

impl AutoEncoderBuilder {
    /// Start building an autoencoder for inputs of length `input_dim` compressed to
    /// `encode_dim` units.
    pub fn new(input_dim: usize, encode_dim: usize) -> Result<Self> {
        if input_dim == 0 {
            return Err(Error::InvalidConfig("input_dim must be > 0".to_owned()));
        }
        if encode_dim == 0 {
            return Err(Error::InvalidConfig("encode_dim must be > 0".to_owned()));
        }
        Ok(Self {
            config: AutoEncoderConfig::new(input_dim, encode_dim),
        })
    }

    pub fn l2(mut self, l2: f32) -> Result<Self> {
        if !(l2.is_finite() && l2 >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "l2 must be finite and >= 0, got {l2}"
            )));
        }
        self.config.l2 = l2;
        Ok(self)
    }

    pub fn encode_activation(mut self, activation: Activation) -> Result<Self> {
        activation.validate()?;
        self.config.encode_activation = activation;
        Ok(self)
    }

    pub fn batch_norm(mut self, enabled: bool) -> Self {
        self.config.batch_norm = enabled;
        self
    }

    pub fn dropout(mut self, rate: f32) -> Result<Self> {
        if !(rate.is_finite() && (0.0..1.0).contains(&rate)) {
            return Err(Error::InvalidConfig(format!(
                "dropout rate must be finite and in [0,1), got {rate}"
            )));
        }
        self.config.dropout = Some(rate);
        Ok(self)
    }

    /// Stddev of the gaussian noise added to inputs during training.
    pub fn noise(mut self, stddev: f32) -> Result<Self> {
        if !(stddev.is_finite() && stddev >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "noise must be finite and >= 0, got {stddev}"
            )));
        }
        self.config.noise = stddev;
        Ok(self)
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn config(&self) -> &AutoEncoderConfig {
        &self.config
    }

    pub fn build(self) -> Result<AutoEncoder> {
        AutoEncoder::new(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_validate_eagerly() {
        assert!(AutoEncoderBuilder::new(0, 2).is_err());
        assert!(AutoEncoderBuilder::new(2, 0).is_err());

        let b = AutoEncoderBuilder::new(4, 2).unwrap();
        assert!(b.clone().l2(-0.1).is_err());
        assert!(b.clone().dropout(1.5).is_err());
        assert!(b.clone().noise(-1.0).is_err());
        assert!(
            b.clone()
                .encode_activation(Activation::LeakyReLU { alpha: -1.0 })
                .is_err()
        );
    }

    #[test]
    fn builder_fills_config() {
        let b = AutoEncoderBuilder::new(10, 3)
            .unwrap()
            .l2(0.01)
            .unwrap()
            .dropout(0.2)
            .unwrap()
            .noise(0.3)
            .unwrap()
            .batch_norm(true)
            .seed(9);
        let cfg = b.config();
        assert_eq!(cfg.l2, 0.01);
        assert_eq!(cfg.dropout, Some(0.2));
        assert_eq!(cfg.noise, 0.3);
        assert!(cfg.batch_norm);
        assert_eq!(cfg.seed, 9);

        let model = b.build().unwrap();
        assert_eq!(model.input_dim(), 10);
        assert_eq!(model.encode_dim(), 3);
        assert!(model.batch_norm().is_some());
    }
}
