//! Mini-batch training.
//!
//! `AutoEncoder::train` owns the whole loop: it stages each shuffled mini-batch
//! into a reusable workspace, runs the training-mode forward/backward pass and
//! applies the optimizer. After the workspace, gradients and optimizer state are
//! allocated up front, a training step does not allocate.

use log::{info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::autoencoder::Workspace;
use crate::{
    AutoEncoder, Callback, CallbackAction, Dataset, Error, Loss, Optimizer, Result, Samples,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Sample order across epochs.
pub enum Shuffle {
    /// Visit samples in dataset order every epoch.
    None,
    /// Reshuffle every epoch with an RNG seeded once per `train` call.
    Seeded(u64),
}

impl Default for Shuffle {
    fn default() -> Self {
        Shuffle::Seeded(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainConfig {
    pub epochs: usize,
    /// Rows per mini-batch; the last batch of an epoch may be shorter.
    pub batch_size: usize,
    pub lr: f32,
    pub optimizer: Optimizer,
    pub loss: Loss,
    pub shuffle: Shuffle,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 128,
            lr: 0.1,
            optimizer: Optimizer::default(),
            loss: Loss::Mse,
            shuffle: Shuffle::default(),
        }
    }
}

impl TrainConfig {
    /// Defaults with `epochs` overridden.
    pub fn with_epochs(epochs: usize) -> Self {
        Self {
            epochs,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::InvalidConfig("epochs must be > 0".to_owned()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_owned()));
        }
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "lr must be finite and > 0, got {}",
                self.lr
            )));
        }
        self.optimizer.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
/// Metrics for one finished epoch.
pub struct EpochLogs {
    /// Zero-based epoch index.
    pub epoch: usize,
    /// Sample-weighted mean training loss, penalty included.
    pub loss: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
/// Per-epoch record of a `train` call.
pub struct History {
    pub epochs: Vec<EpochLogs>,
    /// A callback asked to stop before `epochs` ran out.
    pub stopped_early: bool,
}

impl History {
    /// Training loss per epoch, in order.
    pub fn loss(&self) -> Vec<f32> {
        self.epochs.iter().map(|e| e.loss).collect()
    }

    pub fn final_loss(&self) -> Option<f32> {
        self.epochs.last().map(|e| e.loss)
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }
}

impl AutoEncoder {
    /// Train the model.
    ///
    /// When `y_train` is `None` the model learns to reproduce `x_train`. The
    /// model keeps `cfg.loss` afterwards, so [`AutoEncoder::evaluate`] reports
    /// the same loss that was minimized. `callbacks` run in order after every
    /// epoch; if any returns [`CallbackAction::Stop`], training ends once all of
    /// them have seen that epoch.
    pub fn train(
        &mut self,
        x_train: &Samples,
        y_train: Option<&Samples>,
        callbacks: &mut [&mut dyn Callback],
        cfg: &TrainConfig,
    ) -> Result<History> {
        let targets = y_train.unwrap_or(x_train);
        self.run_training(x_train, targets, callbacks, cfg)
    }

    /// Train on explicit input/target pairs.
    pub fn fit(
        &mut self,
        data: &Dataset,
        callbacks: &mut [&mut dyn Callback],
        cfg: &TrainConfig,
    ) -> Result<History> {
        self.run_training(data.inputs(), data.targets(), callbacks, cfg)
    }

    fn run_training(
        &mut self,
        inputs: &Samples,
        targets: &Samples,
        callbacks: &mut [&mut dyn Callback],
        cfg: &TrainConfig,
    ) -> Result<History> {
        cfg.validate()?;
        self.check_pair(inputs, targets)?;

        self.set_loss(cfg.loss);

        let len = inputs.len();
        let dim = self.input_dim();
        let batch_size = cfg.batch_size.min(len);

        let mut ws = Workspace::for_training(self, batch_size);
        let mut grads = self.gradients();
        let mut opt = cfg.optimizer.state(self)?;
        let mut indices: Vec<usize> = (0..len).collect();
        let mut shuffle_rng = match cfg.shuffle {
            Shuffle::None => None,
            Shuffle::Seeded(seed) => Some(StdRng::seed_from_u64(seed)),
        };
        let mut history = History {
            epochs: Vec::with_capacity(cfg.epochs),
            stopped_early: false,
        };

        for callback in callbacks.iter_mut() {
            callback.on_train_begin(self)?;
        }

        for epoch in 0..cfg.epochs {
            if let Some(rng) = shuffle_rng.as_mut() {
                indices.shuffle(rng);
            }

            let mut total = 0.0_f64;
            for batch in indices.chunks(batch_size) {
                let n = batch.len();
                for (row, &idx) in batch.iter().enumerate() {
                    let dst = row * dim..(row + 1) * dim;
                    ws.x[dst.clone()].copy_from_slice(inputs.row(idx));
                    ws.y[dst].copy_from_slice(targets.row(idx));
                }

                let batch_loss = self.forward_backward(n, &mut ws, &mut grads);
                opt.step(self, &grads, cfg.lr);
                total += f64::from(batch_loss) * n as f64;
            }

            let loss = (total / len as f64) as f32;
            if !loss.is_finite() {
                warn!("epoch {}: non-finite training loss {loss}", epoch + 1);
            }
            info!("epoch {}/{}: loss={loss:.6}", epoch + 1, cfg.epochs);

            let logs = EpochLogs { epoch, loss };
            history.epochs.push(logs);

            // Every callback sees the finished epoch, even after one asks to stop.
            let mut stop = false;
            for callback in callbacks.iter_mut() {
                if callback.on_epoch_end(epoch, self, &logs)? == CallbackAction::Stop {
                    info!("{} stopped training after epoch {}", callback.name(), epoch + 1);
                    stop = true;
                }
            }
            if stop {
                history.stopped_early = epoch + 1 < cfg.epochs;
                break;
            }
        }

        for callback in callbacks.iter_mut() {
            callback.on_train_end(self, &history)?;
        }

        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{Activation, AutoEncoderBuilder};

    fn blobs(n: usize, dim: usize) -> Samples {
        // Two binary-ish patterns with small offsets.
        let mut values = Vec::with_capacity(n * dim);
        for i in 0..n {
            for j in 0..dim {
                let on = (j + i) % 2 == 0;
                let jitter = ((i * 13 + j * 7) % 5) as f32 * 0.02;
                values.push(if on { 0.9 - jitter } else { 0.1 + jitter });
            }
        }
        Samples::from_flat(values, dim).unwrap()
    }

    #[test]
    fn config_defaults_are_sgd_momentum_with_mse() {
        let cfg = TrainConfig::default();
        assert_eq!(cfg.batch_size, 128);
        assert_eq!(cfg.lr, 0.1);
        assert_eq!(cfg.optimizer, Optimizer::SgdMomentum { momentum: 0.9 });
        assert_eq!(cfg.loss, Loss::Mse);
        assert_eq!(cfg.shuffle, Shuffle::Seeded(0));
    }

    #[test]
    fn config_validation_rejects_bad_values() {
        assert!(TrainConfig::with_epochs(0).validate().is_err());
        assert!(
            TrainConfig {
                batch_size: 0,
                ..TrainConfig::default()
            }
            .validate()
            .is_err()
        );
        assert!(
            TrainConfig {
                lr: f32::NAN,
                ..TrainConfig::default()
            }
            .validate()
            .is_err()
        );
        assert!(
            TrainConfig {
                optimizer: Optimizer::SgdMomentum { momentum: 1.5 },
                ..TrainConfig::default()
            }
            .validate()
            .is_err()
        );
    }

    #[test]
    fn train_reduces_reconstruction_loss() {
        let x = blobs(64, 6);
        let mut model = AutoEncoderBuilder::new(6, 3)
            .unwrap()
            .encode_activation(Activation::Tanh)
            .unwrap()
            .build()
            .unwrap();

        let before = model.evaluate(&Dataset::autoencoding(x.clone())).unwrap();
        let cfg = TrainConfig {
            epochs: 60,
            batch_size: 16,
            lr: 0.5,
            ..TrainConfig::default()
        };
        let history = model.train(&x, None, &mut [], &cfg).unwrap();
        let after = model.evaluate(&Dataset::autoencoding(x)).unwrap();

        assert_eq!(history.len(), 60);
        assert!(!history.stopped_early);
        assert!(history.loss().iter().all(|l| l.is_finite()));
        assert!(after < before, "loss did not improve: {before} -> {after}");
    }

    #[test]
    fn train_is_deterministic_for_fixed_seeds() {
        let x = blobs(20, 4);
        let cfg = TrainConfig {
            epochs: 3,
            batch_size: 8,
            ..TrainConfig::default()
        };

        let mut a = AutoEncoderBuilder::new(4, 2).unwrap().noise(0.1).unwrap().build().unwrap();
        let mut b = a.clone();
        let ha = a.train(&x, None, &mut [], &cfg).unwrap();
        let hb = b.train(&x, None, &mut [], &cfg).unwrap();

        assert_eq!(ha, hb);
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn explicit_targets_are_used() {
        let x = blobs(10, 4);
        let y = Samples::from_flat(vec![0.5; 40], 4).unwrap();
        let cfg = TrainConfig {
            epochs: 80,
            batch_size: 10,
            lr: 1.0,
            optimizer: Optimizer::Sgd,
            ..TrainConfig::default()
        };
        let mut model = AutoEncoderBuilder::new(4, 2).unwrap().build().unwrap();
        model.train(&x, Some(&y), &mut [], &cfg).unwrap();

        let pred = model.predict(&x).unwrap();
        for &p in pred.as_slice() {
            assert!((p - 0.5).abs() < 0.05, "prediction {p} far from constant target");
        }
    }

    #[test]
    fn train_adopts_the_configured_loss() {
        let x = blobs(8, 3);
        let mut model = AutoEncoderBuilder::new(3, 2).unwrap().build().unwrap();
        let cfg = TrainConfig {
            epochs: 1,
            loss: Loss::BinaryCrossEntropy,
            ..TrainConfig::default()
        };
        model.train(&x, None, &mut [], &cfg).unwrap();
        assert_eq!(model.loss(), Loss::BinaryCrossEntropy);
    }

    #[test]
    fn train_rejects_mismatched_data() {
        let mut model = AutoEncoderBuilder::new(4, 2).unwrap().build().unwrap();
        let cfg = TrainConfig::with_epochs(1);

        assert!(model.train(&blobs(5, 3), None, &mut [], &cfg).is_err());
        let y = blobs(4, 4);
        assert!(model.train(&blobs(5, 4), Some(&y), &mut [], &cfg).is_err());
    }

    #[test]
    fn batch_norm_and_dropout_train_and_update_moving_stats() {
        let x = blobs(32, 5);
        let mut model = AutoEncoderBuilder::new(5, 3)
            .unwrap()
            .batch_norm(true)
            .dropout(0.2)
            .unwrap()
            .noise(0.05)
            .unwrap()
            .build()
            .unwrap();
        let cfg = TrainConfig {
            epochs: 2,
            batch_size: 8,
            ..TrainConfig::default()
        };
        let history = model.train(&x, None, &mut [], &cfg).unwrap();
        assert_eq!(history.len(), 2);

        let bn = model.batch_norm().unwrap();
        assert!(bn.moving_mean().iter().any(|&m| m != 0.0));
        assert!(model.predict(&x).unwrap().as_slice().iter().all(|v| v.is_finite()));
    }
}
