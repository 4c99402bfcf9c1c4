//! Inverted dropout on the code layer.
//!
//! During training each unit is kept with probability `1 - rate` and scaled by
//! `1 / (1 - rate)`, so inference is a plain pass-through.

use rand::Rng;
use rand_distr::{Bernoulli, Distribution};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dropout {
    rate: f32,
}

impl Dropout {
    pub fn new(rate: f32) -> Result<Self> {
        if !(rate.is_finite() && (0.0..1.0).contains(&rate)) {
            return Err(Error::InvalidConfig(format!(
                "dropout rate must be finite and in [0,1), got {rate}"
            )));
        }
        Ok(Self { rate })
    }

    #[inline]
    pub fn rate(&self) -> f32 {
        self.rate
    }

    /// Training-mode forward, in place. Writes the scaled keep mask into `mask`.
    pub fn forward_train<R: Rng + ?Sized>(&self, values: &mut [f32], mask: &mut [f32], rng: &mut R) {
        assert_eq!(values.len(), mask.len());
        if self.rate == 0.0 {
            mask.fill(1.0);
            return;
        }

        let keep = 1.0 - self.rate;
        let scale = 1.0 / keep;
        let Ok(dist) = Bernoulli::new(f64::from(keep)) else {
            mask.fill(1.0);
            return;
        };
        for (v, m) in values.iter_mut().zip(mask.iter_mut()) {
            *m = if dist.sample(rng) { scale } else { 0.0 };
            *v *= *m;
        }
    }

    /// Backward, in place: `d *= mask`.
    pub fn backward(&self, d: &mut [f32], mask: &[f32]) {
        assert_eq!(d.len(), mask.len());
        for (g, &m) in d.iter_mut().zip(mask) {
            *g *= m;
        }
    }
}
