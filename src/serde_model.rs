//! Model serialization/deserialization (feature: `serde`).
//!
//! This module defines a versioned, stable on-disk format for `AutoEncoder`.
//!
//! Design notes:
//! - Internal structs are not serialized directly, so the file format stays
//!   stable even if the in-memory representation changes.
//! - All deserialization validates dimensions, parameter lengths, and that
//!   all parameters are finite.
//! - The training RNG is not stored; a loaded model restarts it from the
//!   configured seed.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    Activation, AutoEncoder, AutoEncoderConfig, BatchNorm, Error, Layer, Loss, Result,
};

pub const MODEL_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedAutoEncoder {
    pub format_version: u32,
    pub config: SerializedConfig,
    /// Loss the model was trained with, by framework name (e.g. `"mse"`).
    pub loss: String,
    pub encoder: SerializedLayer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_norm: Option<SerializedBatchNorm>,
    pub decoder: SerializedLayer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedConfig {
    pub input_dim: usize,
    pub encode_dim: usize,
    pub l2: f32,
    pub encode_activation: SerializedActivation,
    pub batch_norm: bool,
    pub dropout: Option<f32>,
    pub noise: f32,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedLayer {
    pub in_dim: usize,
    pub out_dim: usize,
    pub activation: SerializedActivation,
    /// Row-major (out_dim, in_dim).
    pub weights: Vec<f32>,
    pub biases: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedBatchNorm {
    pub momentum: f32,
    pub epsilon: f32,
    pub gamma: Vec<f32>,
    pub beta: Vec<f32>,
    pub moving_mean: Vec<f32>,
    pub moving_var: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SerializedActivation {
    Tanh,
    Relu,
    LeakyRelu { alpha: f32 },
    Sigmoid,
    Identity,
}

impl From<Activation> for SerializedActivation {
    fn from(value: Activation) -> Self {
        match value {
            Activation::Tanh => SerializedActivation::Tanh,
            Activation::ReLU => SerializedActivation::Relu,
            Activation::LeakyReLU { alpha } => SerializedActivation::LeakyRelu { alpha },
            Activation::Sigmoid => SerializedActivation::Sigmoid,
            Activation::Identity => SerializedActivation::Identity,
        }
    }
}

impl SerializedActivation {
    fn into_activation(self) -> Activation {
        match self {
            SerializedActivation::Tanh => Activation::Tanh,
            SerializedActivation::Relu => Activation::ReLU,
            SerializedActivation::LeakyRelu { alpha } => Activation::LeakyReLU { alpha },
            SerializedActivation::Sigmoid => Activation::Sigmoid,
            SerializedActivation::Identity => Activation::Identity,
        }
    }
}

impl From<&AutoEncoderConfig> for SerializedConfig {
    fn from(cfg: &AutoEncoderConfig) -> Self {
        Self {
            input_dim: cfg.input_dim,
            encode_dim: cfg.encode_dim,
            l2: cfg.l2,
            encode_activation: cfg.encode_activation.into(),
            batch_norm: cfg.batch_norm,
            dropout: cfg.dropout,
            noise: cfg.noise,
            seed: cfg.seed,
        }
    }
}

impl TryFrom<SerializedConfig> for AutoEncoderConfig {
    type Error = Error;

    fn try_from(value: SerializedConfig) -> std::result::Result<Self, Self::Error> {
        let cfg = AutoEncoderConfig {
            input_dim: value.input_dim,
            encode_dim: value.encode_dim,
            l2: value.l2,
            encode_activation: value.encode_activation.into_activation(),
            batch_norm: value.batch_norm,
            dropout: value.dropout,
            noise: value.noise,
            seed: value.seed,
        };
        cfg.validate()
            .map_err(|e| Error::InvalidData(format!("invalid config: {e}")))?;
        Ok(cfg)
    }
}

impl From<&Layer> for SerializedLayer {
    fn from(layer: &Layer) -> Self {
        Self {
            in_dim: layer.in_dim(),
            out_dim: layer.out_dim(),
            activation: SerializedActivation::from(layer.activation()),
            weights: layer.weights().to_vec(),
            biases: layer.biases().to_vec(),
        }
    }
}

impl SerializedLayer {
    fn into_layer(self, which: &str) -> Result<Layer> {
        let act = self.activation.into_activation();
        act.validate()
            .map_err(|e| Error::InvalidData(format!("{which} has invalid activation: {e}")))?;

        // Layer::from_parts performs shape validation and finiteness checks.
        Layer::from_parts(self.in_dim, self.out_dim, act, self.weights, self.biases)
            .map_err(|e| Error::InvalidData(format!("{which} invalid: {e}")))
    }
}

impl From<&BatchNorm> for SerializedBatchNorm {
    fn from(bn: &BatchNorm) -> Self {
        Self {
            momentum: bn.momentum(),
            epsilon: bn.epsilon(),
            gamma: bn.gamma().to_vec(),
            beta: bn.beta().to_vec(),
            moving_mean: bn.moving_mean().to_vec(),
            moving_var: bn.moving_var().to_vec(),
        }
    }
}

impl SerializedBatchNorm {
    fn into_batch_norm(self) -> Result<BatchNorm> {
        BatchNorm::from_parts(
            self.momentum,
            self.epsilon,
            self.gamma,
            self.beta,
            self.moving_mean,
            self.moving_var,
        )
        .map_err(|e| Error::InvalidData(format!("batch norm invalid: {e}")))
    }
}

impl From<&AutoEncoder> for SerializedAutoEncoder {
    fn from(model: &AutoEncoder) -> Self {
        Self {
            format_version: MODEL_FORMAT_VERSION,
            config: model.config().into(),
            loss: model.loss().name().to_owned(),
            encoder: model.encoder_layer().into(),
            batch_norm: model.batch_norm().map(SerializedBatchNorm::from),
            decoder: model.decoder_layer().into(),
        }
    }
}

impl TryFrom<SerializedAutoEncoder> for AutoEncoder {
    type Error = Error;

    fn try_from(value: SerializedAutoEncoder) -> std::result::Result<Self, Self::Error> {
        if value.format_version != MODEL_FORMAT_VERSION {
            return Err(Error::InvalidData(format!(
                "unsupported model format_version {}; expected {}",
                value.format_version, MODEL_FORMAT_VERSION
            )));
        }

        let config = AutoEncoderConfig::try_from(value.config)?;
        let loss: Loss = value
            .loss
            .parse()
            .map_err(|e| Error::InvalidData(format!("invalid loss: {e}")))?;
        let encoder = value.encoder.into_layer("encoder")?;
        let decoder = value.decoder.into_layer("decoder")?;
        let batch_norm = value
            .batch_norm
            .map(SerializedBatchNorm::into_batch_norm)
            .transpose()?;

        AutoEncoder::from_parts(config, encoder, batch_norm, decoder, loss)
            .map_err(|e| Error::InvalidData(format!("inconsistent model: {e}")))
    }
}

impl AutoEncoder {
    /// Serialize the model to a pretty-printed JSON string.
    pub fn to_json_string_pretty(&self) -> Result<String> {
        let ser = SerializedAutoEncoder::from(self);
        serde_json::to_string_pretty(&ser)
            .map_err(|e| Error::InvalidData(format!("failed to serialize model: {e}")))
    }

    /// Serialize the model to a compact JSON string.
    pub fn to_json_string(&self) -> Result<String> {
        let ser = SerializedAutoEncoder::from(self);
        serde_json::to_string(&ser)
            .map_err(|e| Error::InvalidData(format!("failed to serialize model: {e}")))
    }

    /// Parse a model from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let ser: SerializedAutoEncoder = serde_json::from_str(s)
            .map_err(|e| Error::InvalidData(format!("failed to parse model json: {e}")))?;
        ser.try_into()
    }

    /// Save the model to a JSON file (pretty-printed).
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let s = self.to_json_string_pretty()?;
        std::fs::write(path, s)?;
        Ok(())
    }

    /// Load a model from a JSON file.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Self::from_json_str(&s)
    }
}

impl AutoEncoderConfig {
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string(&SerializedConfig::from(self))
            .map_err(|e| Error::InvalidData(format!("failed to serialize config: {e}")))
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let ser: SerializedConfig = serde_json::from_str(s)
            .map_err(|e| Error::InvalidData(format!("failed to parse config json: {e}")))?;
        ser.try_into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{AutoEncoderBuilder, Samples, TrainConfig};

    fn trained_model() -> (AutoEncoder, Samples) {
        let x = Samples::from_flat((0..40).map(|i| (i % 7) as f32 / 6.0).collect(), 4).unwrap();
        let mut model = AutoEncoderBuilder::new(4, 2)
            .unwrap()
            .encode_activation(Activation::LeakyReLU { alpha: 0.2 })
            .unwrap()
            .batch_norm(true)
            .l2(1e-3)
            .unwrap()
            .build()
            .unwrap();
        let cfg = TrainConfig {
            epochs: 3,
            batch_size: 4,
            loss: Loss::BinaryCrossEntropy,
            ..TrainConfig::default()
        };
        model.train(&x, None, &mut [], &cfg).unwrap();
        (model, x)
    }

    #[test]
    fn json_roundtrip_preserves_predictions() {
        let (model, x) = trained_model();
        let json = model.to_json_string_pretty().unwrap();
        let loaded = AutoEncoder::from_json_str(&json).unwrap();

        assert_eq!(loaded.config(), model.config());
        assert_eq!(loaded.loss(), Loss::BinaryCrossEntropy);
        assert_eq!(
            loaded.batch_norm().unwrap().moving_var(),
            model.batch_norm().unwrap().moving_var()
        );
        assert_eq!(loaded.predict(&x).unwrap(), model.predict(&x).unwrap());
        assert_eq!(loaded.to_json_string_pretty().unwrap(), json);
    }

    #[test]
    fn save_and_load_file() {
        let (model, x) = trained_model();
        let path = std::env::temp_dir().join(format!(
            "rust_autoencoder_model_{}.json",
            std::process::id()
        ));
        model.save_json(&path).unwrap();
        let loaded = AutoEncoder::load_json(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded.predict(&x).unwrap(), model.predict(&x).unwrap());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let path = std::env::temp_dir().join(format!(
            "rust_autoencoder_missing_{}.json",
            std::process::id()
        ));
        let err = AutoEncoder::load_json(&path).unwrap_err();
        assert!(matches!(err, Error::Io(_)), "unexpected error {err:?}");
    }

    #[test]
    fn rejects_unknown_version() {
        let (model, _) = trained_model();
        let mut ser = SerializedAutoEncoder::from(&model);
        ser.format_version = 999;
        let bad = serde_json::to_string(&ser).unwrap();
        let err = AutoEncoder::from_json_str(&bad).unwrap_err();
        assert!(format!("{err}").contains("format_version"));
    }

    #[test]
    fn rejects_inconsistent_parts() {
        let (model, _) = trained_model();

        let mut missing_bn = SerializedAutoEncoder::from(&model);
        missing_bn.batch_norm = None;
        assert!(AutoEncoder::try_from(missing_bn).is_err());

        let mut short = SerializedAutoEncoder::from(&model);
        short.decoder.biases.pop();
        assert!(AutoEncoder::try_from(short).is_err());

        let mut wrong_loss = SerializedAutoEncoder::from(&model);
        wrong_loss.loss = "hinge".to_owned();
        assert!(AutoEncoder::try_from(wrong_loss).is_err());
    }

    #[test]
    fn config_json_roundtrip() {
        let cfg = AutoEncoderBuilder::new(8, 3)
            .unwrap()
            .dropout(0.25)
            .unwrap()
            .seed(7)
            .config()
            .clone();
        let json = cfg.to_json_string().unwrap();
        assert_eq!(AutoEncoderConfig::from_json_str(&json).unwrap(), cfg);
        assert!(AutoEncoderConfig::from_json_str(r#"{"input_dim":0}"#).is_err());
    }
}
