//! Dense (fully-connected) layer.
//!
//! Weights are row-major with shape `(out_dim, in_dim)`. Batches are row-major
//! `(n, dim)` buffers; only the first `n * dim` scalars of a buffer are touched,
//! so callers can keep buffers sized for their largest batch.

use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};

use crate::matmul::gemm_f32;
use crate::{Activation, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
/// Kernel initializer.
pub enum Init {
    /// `N(mean, stddev^2)`.
    RandomNormal { mean: f32, stddev: f32 },
    /// Glorot/Xavier uniform: `U(-a, a)` with `a = sqrt(6 / (in + out))`.
    Xavier,
}

impl Init {
    pub fn validate(self) -> Result<()> {
        if let Init::RandomNormal { mean, stddev } = self {
            if !mean.is_finite() {
                return Err(Error::InvalidConfig(format!(
                    "random normal mean must be finite, got {mean}"
                )));
            }
            if !(stddev.is_finite() && stddev >= 0.0) {
                return Err(Error::InvalidConfig(format!(
                    "random normal stddev must be finite and >= 0, got {stddev}"
                )));
            }
        }
        Ok(())
    }

    fn fill<R: Rng + ?Sized>(
        self,
        weights: &mut [f32],
        in_dim: usize,
        out_dim: usize,
        rng: &mut R,
    ) -> Result<()> {
        match self {
            Init::RandomNormal { mean, stddev } => fill_normal(weights, mean, stddev, rng)?,
            Init::Xavier => {
                let a = (6.0 / (in_dim + out_dim) as f32).sqrt();
                let dist = Uniform::new_inclusive(-a, a);
                for w in weights {
                    *w = dist.sample(rng);
                }
            }
        }
        Ok(())
    }
}

fn fill_normal<R: Rng + ?Sized>(
    weights: &mut [f32],
    mean: f32,
    stddev: f32,
    rng: &mut R,
) -> Result<()> {
    if stddev == 0.0 {
        weights.fill(mean);
        return Ok(());
    }
    let dist = Normal::new(mean, stddev)
        .map_err(|e| Error::InvalidConfig(format!("invalid normal initializer: {e}")))?;
    for w in weights {
        *w = dist.sample(rng);
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct Layer {
    in_dim: usize,
    out_dim: usize,
    activation: Activation,
    /// Row-major matrix with shape (out_dim, in_dim).
    weights: Vec<f32>,
    biases: Vec<f32>,
}

impl Layer {
    /// Build a layer with the given kernel initializer and zero biases.
    pub fn new_with_rng<R: Rng + ?Sized>(
        in_dim: usize,
        out_dim: usize,
        init: Init,
        activation: Activation,
        rng: &mut R,
    ) -> Result<Self> {
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidConfig(format!(
                "layer dims must be > 0, got in_dim={in_dim} out_dim={out_dim}"
            )));
        }
        init.validate()?;
        activation.validate()?;

        let mut weights = vec![0.0; in_dim * out_dim];
        init.fill(&mut weights, in_dim, out_dim, rng)?;

        Ok(Self {
            in_dim,
            out_dim,
            activation,
            weights,
            biases: vec![0.0; out_dim],
        })
    }

    /// Build a layer from explicit parameters (shape- and finiteness-checked).
    pub fn from_parts(
        in_dim: usize,
        out_dim: usize,
        activation: Activation,
        weights: Vec<f32>,
        biases: Vec<f32>,
    ) -> Result<Self> {
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidConfig(format!(
                "layer dims must be > 0, got in_dim={in_dim} out_dim={out_dim}"
            )));
        }
        activation.validate()?;
        if weights.len() != in_dim * out_dim {
            return Err(Error::InvalidShape(format!(
                "weights length {} does not match out_dim * in_dim ({out_dim} * {in_dim})",
                weights.len()
            )));
        }
        if biases.len() != out_dim {
            return Err(Error::InvalidShape(format!(
                "biases length {} does not match out_dim {out_dim}",
                biases.len()
            )));
        }
        if weights.iter().chain(&biases).any(|v| !v.is_finite()) {
            return Err(Error::InvalidData(
                "layer parameters must be finite".to_owned(),
            ));
        }

        Ok(Self {
            in_dim,
            out_dim,
            activation,
            weights,
            biases,
        })
    }

    #[inline]
    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    #[inline]
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    #[inline]
    pub fn activation(&self) -> Activation {
        self.activation
    }

    #[inline]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    #[inline]
    pub fn biases(&self) -> &[f32] {
        &self.biases
    }

    #[inline]
    pub fn weights_mut(&mut self) -> &mut [f32] {
        &mut self.weights
    }

    #[inline]
    pub fn biases_mut(&mut self) -> &mut [f32] {
        &mut self.biases
    }

    /// Batched forward pass: `outputs = activation(inputs * W^T + b)`.
    ///
    /// Shape contract:
    /// - `inputs.len() >= n * in_dim`
    /// - `outputs.len() >= n * out_dim`
    pub fn forward_batch(&self, inputs: &[f32], n: usize, outputs: &mut [f32]) {
        assert!(n > 0, "batch must not be empty");
        let inputs = &inputs[..n * self.in_dim];
        let outputs = &mut outputs[..n * self.out_dim];

        for row in outputs.chunks_exact_mut(self.out_dim) {
            row.copy_from_slice(&self.biases);
        }
        gemm_f32(
            n,
            self.out_dim,
            self.in_dim,
            1.0,
            inputs,
            self.in_dim,
            1,
            &self.weights,
            1,
            self.in_dim,
            1.0,
            outputs,
            self.out_dim,
            1,
        );
        self.activation.forward_in_place(outputs);
    }

    /// Batched backward pass.
    ///
    /// `d_outputs` holds `dL/d(outputs)` on entry and is turned into `dL/dz` in
    /// place. Overwrites `d_weights` and `d_biases` (summed over the batch) and,
    /// when given, `d_inputs`.
    ///
    /// `inputs` and `outputs` must be the buffers used by the matching
    /// `forward_batch` call.
    #[allow(clippy::too_many_arguments)]
    pub fn backward_batch(
        &self,
        inputs: &[f32],
        outputs: &[f32],
        d_outputs: &mut [f32],
        n: usize,
        d_inputs: Option<&mut [f32]>,
        d_weights: &mut [f32],
        d_biases: &mut [f32],
    ) {
        assert!(n > 0, "batch must not be empty");
        assert_eq!(d_weights.len(), self.weights.len());
        assert_eq!(d_biases.len(), self.out_dim);

        let inputs = &inputs[..n * self.in_dim];
        let outputs = &outputs[..n * self.out_dim];
        let d_z = &mut d_outputs[..n * self.out_dim];

        self.activation.backward_in_place(outputs, d_z);

        d_biases.fill(0.0);
        for row in d_z.chunks_exact(self.out_dim) {
            for (db, &g) in d_biases.iter_mut().zip(row) {
                *db += g;
            }
        }

        // dW (out, in) = dZ^T (out, n) * X (n, in)
        gemm_f32(
            self.out_dim,
            self.in_dim,
            n,
            1.0,
            d_z,
            1,
            self.out_dim,
            inputs,
            self.in_dim,
            1,
            0.0,
            d_weights,
            self.in_dim,
            1,
        );

        if let Some(d_inputs) = d_inputs {
            // dX (n, in) = dZ (n, out) * W (out, in)
            gemm_f32(
                n,
                self.in_dim,
                self.out_dim,
                1.0,
                d_z,
                self.out_dim,
                1,
                &self.weights,
                self.in_dim,
                1,
                0.0,
                &mut d_inputs[..n * self.in_dim],
                self.in_dim,
                1,
            );
        }
    }

    /// `l2 * sum(W^2)`; biases are not penalized.
    pub fn l2_penalty(&self, l2: f32) -> f32 {
        if l2 == 0.0 {
            return 0.0;
        }
        l2 * self.weights.iter().map(|w| w * w).sum::<f32>()
    }

    /// Add the gradient of [`Layer::l2_penalty`] into `d_weights`.
    pub fn add_l2_grad(&self, l2: f32, d_weights: &mut [f32]) {
        if l2 == 0.0 {
            return;
        }
        debug_assert_eq!(d_weights.len(), self.weights.len());
        for (g, &w) in d_weights.iter_mut().zip(&self.weights) {
            *g = (2.0 * l2).mul_add(w, *g);
        }
    }
}
