//! A small autoencoder crate.
//!
//! `rust-autoencoder` implements a single-hidden-layer autoencoder from scratch:
//!
//! ```text
//! input -> gaussian noise -> dense(encode_dim) -> [batch norm] -> [dropout] -> dense(input_dim, sigmoid)
//! ```
//!
//! The trained model can be split into an [`Encoder`] and a [`Decoder`] that
//! share its parameters, and an [`ErrorsCallback`] records the train/test
//! reconstruction error after every epoch.
//!
//! # Design goals
//!
//! - Predictable performance: training reuses its buffers, so a step does not allocate.
//! - Clear contracts: shapes are explicit and validated at the API boundary.
//! - Reproducible: weight init, noise, dropout and shuffling are all seeded.
//!
//! # Data layout and shapes
//!
//! - Scalars are `f32`.
//! - [`Samples`] and [`Dataset`] store rows contiguously in row-major layout.
//! - Layer weights are row-major with shape `(out_dim, in_dim)`.
//!
//! # Logging
//!
//! Training reports through the [`log`] facade: one `info` record per epoch,
//! `debug` records for model construction and callback values. Install any
//! logger (e.g. `env_logger`) to see them.
//!
//! # Quick start
//!
//! ```rust
//! use rust_autoencoder::{AutoEncoderBuilder, ErrorsCallback, Samples, TrainConfig};
//!
//! # fn main() -> rust_autoencoder::Result<()> {
//! let rows: Vec<Vec<f32>> = (0..32)
//!     .map(|i| (0..8).map(|j| ((i + j) % 2) as f32).collect())
//!     .collect();
//! let x_train = Samples::from_rows(&rows[..24])?;
//! let x_test = Samples::from_rows(&rows[24..])?;
//!
//! let mut model = AutoEncoderBuilder::new(8, 3)?.noise(0.05)?.build()?;
//! let mut errors = ErrorsCallback::autoencoding(x_train.clone(), x_test)?;
//!
//! let history = model.train(
//!     &x_train,
//!     None,
//!     &mut [&mut errors],
//!     &TrainConfig {
//!         epochs: 5,
//!         batch_size: 8,
//!         ..TrainConfig::default()
//!     },
//! )?;
//! assert_eq!(history.len(), 5);
//! assert_eq!(errors.mse_test().len(), 5);
//!
//! let codes = model.encoder().predict(&x_train)?;
//! let reconstructed = model.decoder().predict(&codes)?;
//! assert_eq!(reconstructed.dim(), 8);
//! # Ok(())
//! # }
//! ```

pub mod activation;
pub mod autoencoder;
pub mod batch_norm;
pub mod builder;
pub mod callback;
pub mod config;
pub mod data;
pub mod dropout;
pub mod error;
pub mod layer;
pub mod loss;
pub(crate) mod matmul;
pub mod noise;
pub mod optim;
pub mod train;

#[cfg(feature = "serde")]
pub mod serde_model;

pub use activation::Activation;
pub use autoencoder::{AutoEncoder, Decoder, Encoder, Gradients};
pub use batch_norm::BatchNorm;
pub use builder::AutoEncoderBuilder;
pub use callback::{Callback, CallbackAction, ErrorsCallback};
pub use config::AutoEncoderConfig;
pub use data::{Dataset, Samples};
pub use dropout::Dropout;
pub use error::{Error, Result};
pub use layer::{Init, Layer};
pub use loss::Loss;
pub use noise::GaussianNoise;
pub use optim::{Optimizer, OptimizerState};
pub use train::{EpochLogs, History, Shuffle, TrainConfig};
