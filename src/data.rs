//! Contiguous sample matrices.
//!
//! The training loop operates on slices to avoid per-step allocations. `Samples`
//! and `Dataset` provide validated, row-major storage for input/target matrices.

use crate::{Error, Result};

/// A collection of samples, one per row.
///
/// Stored as a contiguous buffer with row-major layout:
/// - `values.len() == len * dim`
#[derive(Debug, Clone, PartialEq)]
pub struct Samples {
    values: Vec<f32>,
    len: usize,
    dim: usize,
}

impl Samples {
    /// Build samples from a flat buffer with shape `(len, dim)`.
    pub fn from_flat(values: Vec<f32>, dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(Error::InvalidData("sample dim must be > 0".to_owned()));
        }
        if !values.len().is_multiple_of(dim) {
            return Err(Error::InvalidData(format!(
                "buffer length {} is not divisible by dim {}",
                values.len(),
                dim
            )));
        }

        let len = values.len() / dim;

        Ok(Self { values, len, dim })
    }

    /// Build samples from per-sample rows.
    ///
    /// This is a convenience constructor (it copies into contiguous storage).
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self> {
        if rows.is_empty() {
            return Err(Error::InvalidData("rows must not be empty".to_owned()));
        }

        let dim = rows[0].len();
        if dim == 0 {
            return Err(Error::InvalidData("sample dim must be > 0".to_owned()));
        }

        for (i, row) in rows.iter().enumerate() {
            if row.len() != dim {
                return Err(Error::InvalidData(format!(
                    "row {i} has len {}, expected {dim}",
                    row.len()
                )));
            }
        }

        let mut values = Vec::with_capacity(rows.len() * dim);
        for row in rows {
            values.extend_from_slice(row);
        }

        Ok(Self {
            values,
            len: rows.len(),
            dim,
        })
    }

    #[inline]
    /// Returns the number of samples.
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    /// Returns true if there are no samples.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    /// Returns the per-sample dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    /// Returns the `idx`-th row (shape: `(dim,)`).
    ///
    /// Panics if `idx >= len`.
    pub fn row(&self, idx: usize) -> &[f32] {
        let start = idx * self.dim;
        &self.values[start..start + self.dim]
    }

    /// Iterate over rows.
    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[f32]> {
        self.values.chunks_exact(self.dim)
    }

    #[inline]
    /// The whole `(len, dim)` buffer.
    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.values
    }
}

/// A supervised dataset: inputs (X) and targets (Y).
///
/// For a plain autoencoder the targets are the inputs themselves, see
/// [`Dataset::autoencoding`].
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    inputs: Samples,
    targets: Samples,
}

impl Dataset {
    /// Pair inputs with targets; both must have the same number of rows.
    pub fn new(inputs: Samples, targets: Samples) -> Result<Self> {
        if inputs.len() != targets.len() {
            return Err(Error::InvalidData(format!(
                "inputs/targets length mismatch: {} vs {}",
                inputs.len(),
                targets.len()
            )));
        }
        Ok(Self { inputs, targets })
    }

    /// A dataset whose targets are a copy of its inputs.
    pub fn autoencoding(inputs: Samples) -> Self {
        Self {
            targets: inputs.clone(),
            inputs,
        }
    }

    /// Build a dataset from flat buffers.
    ///
    /// `inputs` is `(len, input_dim)` and `targets` is `(len, target_dim)`.
    pub fn from_flat(
        inputs: Vec<f32>,
        targets: Vec<f32>,
        input_dim: usize,
        target_dim: usize,
    ) -> Result<Self> {
        let inputs = Samples::from_flat(inputs, input_dim)?;
        let targets = Samples::from_flat(targets, target_dim)?;
        Self::new(inputs, targets)
    }

    /// Build a dataset from per-sample rows.
    pub fn from_rows(inputs: &[Vec<f32>], targets: &[Vec<f32>]) -> Result<Self> {
        Self::new(Samples::from_rows(inputs)?, Samples::from_rows(targets)?)
    }

    #[inline]
    /// Returns the number of samples.
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    #[inline]
    /// Returns true if there are no samples.
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.inputs.dim()
    }

    #[inline]
    pub fn target_dim(&self) -> usize {
        self.targets.dim()
    }

    #[inline]
    pub fn inputs(&self) -> &Samples {
        &self.inputs
    }

    #[inline]
    pub fn targets(&self) -> &Samples {
        &self.targets
    }

    #[inline]
    /// Returns the `idx`-th input row.
    ///
    /// Panics if `idx >= len`.
    pub fn input(&self, idx: usize) -> &[f32] {
        self.inputs.row(idx)
    }

    #[inline]
    /// Returns the `idx`-th target row.
    ///
    /// Panics if `idx >= len`.
    pub fn target(&self, idx: usize) -> &[f32] {
        self.targets.row(idx)
    }
}
