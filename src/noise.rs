//! Additive gaussian input noise.
//!
//! Active only while training; at inference the input passes through unchanged.

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianNoise {
    stddev: f32,
}

impl GaussianNoise {
    pub fn new(stddev: f32) -> Result<Self> {
        if !(stddev.is_finite() && stddev >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "noise stddev must be finite and >= 0, got {stddev}"
            )));
        }
        Ok(Self { stddev })
    }

    #[inline]
    pub fn stddev(&self) -> f32 {
        self.stddev
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.stddev > 0.0
    }

    /// Training-mode forward: `output = input + N(0, stddev^2)`.
    pub fn forward_train<R: Rng + ?Sized>(&self, input: &[f32], output: &mut [f32], rng: &mut R) {
        assert_eq!(input.len(), output.len());
        output.copy_from_slice(input);
        if !self.is_active() {
            return;
        }
        // `new` guarantees a finite, positive stddev here.
        let Ok(dist) = Normal::new(0.0, self.stddev) else {
            return;
        };
        for v in output {
            *v += dist.sample(rng);
        }
    }
}
