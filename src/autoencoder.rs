use log::debug;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::batch_norm::BatchNormCache;
use crate::config::ENCODER_INIT_STDDEV;
use crate::{
    Activation, AutoEncoderConfig, BatchNorm, Dataset, Dropout, Error, GaussianNoise, Init,
    Layer, Loss, Result, Samples,
};

/// Rows per chunk for inference and evaluation.
pub const INFERENCE_BATCH_SIZE: usize = 32;

/// Parameter slots, in the order optimizers see them.
pub(crate) const ENCODER_WEIGHTS: usize = 0;
pub(crate) const ENCODER_BIASES: usize = 1;
pub(crate) const DECODER_WEIGHTS: usize = 2;
pub(crate) const DECODER_BIASES: usize = 3;
pub(crate) const BN_GAMMA: usize = 4;
pub(crate) const BN_BETA: usize = 5;

/// A single-hidden-layer autoencoder.
///
/// The full model, the [`Encoder`] and the [`Decoder`] all read the same
/// parameters: the views returned by [`AutoEncoder::encoder`] and
/// [`AutoEncoder::decoder`] borrow the model instead of copying layers, so they
/// always reflect the latest training state.
#[derive(Debug, Clone)]
pub struct AutoEncoder {
    config: AutoEncoderConfig,
    noise: GaussianNoise,
    encoder: Layer,
    batch_norm: Option<BatchNorm>,
    dropout: Option<Dropout>,
    decoder: Layer,
    loss: Loss,
    rng: StdRng,
}

/// Parameter gradients for an `AutoEncoder` (overwrite semantics).
///
/// Allocate once via [`AutoEncoder::gradients`] and reuse across steps.
#[derive(Debug, Clone)]
pub struct Gradients {
    encoder_weights: Vec<f32>,
    encoder_biases: Vec<f32>,
    decoder_weights: Vec<f32>,
    decoder_biases: Vec<f32>,
    batch_norm: Option<(Vec<f32>, Vec<f32>)>,
}

impl AutoEncoder {
    pub fn new(config: AutoEncoderConfig) -> Result<Self> {
        config.validate()?;

        let mut rng = StdRng::seed_from_u64(config.seed);
        let encoder = Layer::new_with_rng(
            config.input_dim,
            config.encode_dim,
            Init::RandomNormal {
                mean: 0.0,
                stddev: ENCODER_INIT_STDDEV,
            },
            config.encode_activation,
            &mut rng,
        )?;
        let decoder = Layer::new_with_rng(
            config.encode_dim,
            config.input_dim,
            Init::Xavier,
            Activation::Sigmoid,
            &mut rng,
        )?;
        let batch_norm = if config.batch_norm {
            Some(BatchNorm::new(config.encode_dim)?)
        } else {
            None
        };
        let dropout = config.dropout.map(Dropout::new).transpose()?;
        let noise = GaussianNoise::new(config.noise)?;

        debug!(
            "built autoencoder {} -> {} ({}), batch_norm={}, dropout={:?}, noise={}, l2={}",
            config.input_dim,
            config.encode_dim,
            config.encode_activation,
            config.batch_norm,
            config.dropout,
            config.noise,
            config.l2
        );

        Ok(Self {
            config,
            noise,
            encoder,
            batch_norm,
            dropout,
            decoder,
            loss: Loss::default(),
            rng,
        })
    }

    /// Reassemble a model from trained parts.
    ///
    /// Used by deserialization; shapes must agree with `config`.
    pub fn from_parts(
        config: AutoEncoderConfig,
        encoder: Layer,
        batch_norm: Option<BatchNorm>,
        decoder: Layer,
        loss: Loss,
    ) -> Result<Self> {
        let mut model = Self::new(config)?;
        let cfg = &model.config;

        if encoder.in_dim() != cfg.input_dim || encoder.out_dim() != cfg.encode_dim {
            return Err(Error::InvalidShape(format!(
                "encoder is {}x{}, expected {}x{}",
                encoder.in_dim(),
                encoder.out_dim(),
                cfg.input_dim,
                cfg.encode_dim
            )));
        }
        if encoder.activation() != cfg.encode_activation {
            return Err(Error::InvalidData(format!(
                "encoder activation {} does not match config {}",
                encoder.activation(),
                cfg.encode_activation
            )));
        }
        if decoder.in_dim() != cfg.encode_dim || decoder.out_dim() != cfg.input_dim {
            return Err(Error::InvalidShape(format!(
                "decoder is {}x{}, expected {}x{}",
                decoder.in_dim(),
                decoder.out_dim(),
                cfg.encode_dim,
                cfg.input_dim
            )));
        }
        if decoder.activation() != Activation::Sigmoid {
            return Err(Error::InvalidData(format!(
                "decoder activation must be sigmoid, got {}",
                decoder.activation()
            )));
        }
        match (&batch_norm, cfg.batch_norm) {
            (Some(bn), true) if bn.dim() != cfg.encode_dim => {
                return Err(Error::InvalidShape(format!(
                    "batch norm dim {} does not match encode_dim {}",
                    bn.dim(),
                    cfg.encode_dim
                )));
            }
            (Some(_), true) | (None, false) => {}
            (None, true) => {
                return Err(Error::InvalidData(
                    "config enables batch norm but no batch norm parameters were given".to_owned(),
                ));
            }
            (Some(_), false) => {
                return Err(Error::InvalidData(
                    "batch norm parameters given but config disables batch norm".to_owned(),
                ));
            }
        }

        model.encoder = encoder;
        model.decoder = decoder;
        model.batch_norm = batch_norm;
        model.loss = loss;
        Ok(model)
    }

    #[inline]
    pub fn config(&self) -> &AutoEncoderConfig {
        &self.config
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.config.input_dim
    }

    #[inline]
    pub fn encode_dim(&self) -> usize {
        self.config.encode_dim
    }

    /// The loss the model was last trained with (`mse` before any training).
    ///
    /// [`AutoEncoder::evaluate`] reports this loss.
    #[inline]
    pub fn loss(&self) -> Loss {
        self.loss
    }

    #[inline]
    pub fn encoder_layer(&self) -> &Layer {
        &self.encoder
    }

    #[inline]
    pub fn decoder_layer(&self) -> &Layer {
        &self.decoder
    }

    #[inline]
    pub fn batch_norm(&self) -> Option<&BatchNorm> {
        self.batch_norm.as_ref()
    }

    /// Borrowed view of the input -> code half.
    pub fn encoder(&self) -> Encoder<'_> {
        Encoder { model: self }
    }

    /// Borrowed view of the code -> reconstruction half.
    pub fn decoder(&self) -> Decoder<'_> {
        Decoder { model: self }
    }

    /// Reconstruct `inputs` by running the encoder and then the decoder.
    pub fn predict(&self, inputs: &Samples) -> Result<Samples> {
        let codes = self.encoder().predict(inputs)?;
        self.decoder().predict(&codes)
    }

    /// L2 penalty currently contributed by the encoder kernel.
    pub fn regularization_loss(&self) -> f32 {
        self.encoder.l2_penalty(self.config.l2)
    }

    /// Mean loss over `data` (inference mode) plus the regularization penalty.
    pub fn evaluate(&self, data: &Dataset) -> Result<f32> {
        self.evaluate_samples(data.inputs(), data.targets())
    }

    pub(crate) fn evaluate_samples(&self, inputs: &Samples, targets: &Samples) -> Result<f32> {
        self.check_pair(inputs, targets)?;

        let in_dim = self.input_dim();
        let mut ws = Workspace::for_inference(self, INFERENCE_BATCH_SIZE.min(inputs.len()));
        let mut total = 0.0_f64;
        let mut start = 0;
        while start < inputs.len() {
            let n = INFERENCE_BATCH_SIZE.min(inputs.len() - start);
            let x = &inputs.as_slice()[start * in_dim..(start + n) * in_dim];
            let t = &targets.as_slice()[start * in_dim..(start + n) * in_dim];

            self.forward_inference(x, n, &mut ws);
            let batch_loss = self.loss.forward(&ws.output[..n * in_dim], t);
            total += f64::from(batch_loss) * n as f64;
            start += n;
        }

        Ok((total / inputs.len() as f64) as f32 + self.regularization_loss())
    }

    pub(crate) fn check_pair(&self, inputs: &Samples, targets: &Samples) -> Result<()> {
        if inputs.is_empty() {
            return Err(Error::InvalidData("inputs must not be empty".to_owned()));
        }
        if inputs.dim() != self.input_dim() {
            return Err(Error::InvalidData(format!(
                "inputs dim {} does not match model input_dim {}",
                inputs.dim(),
                self.input_dim()
            )));
        }
        if targets.dim() != self.input_dim() {
            return Err(Error::InvalidData(format!(
                "targets dim {} does not match model output dim {}",
                targets.dim(),
                self.input_dim()
            )));
        }
        if inputs.len() != targets.len() {
            return Err(Error::InvalidData(format!(
                "inputs/targets length mismatch: {} vs {}",
                inputs.len(),
                targets.len()
            )));
        }
        Ok(())
    }

    pub(crate) fn set_loss(&mut self, loss: Loss) {
        self.loss = loss;
    }

    /// Allocate a gradient buffer matching this model's parameter slots.
    pub fn gradients(&self) -> Gradients {
        Gradients {
            encoder_weights: vec![0.0; self.encoder.weights().len()],
            encoder_biases: vec![0.0; self.encoder.biases().len()],
            decoder_weights: vec![0.0; self.decoder.weights().len()],
            decoder_biases: vec![0.0; self.decoder.biases().len()],
            batch_norm: self
                .batch_norm
                .as_ref()
                .map(|bn| (vec![0.0; bn.dim()], vec![0.0; bn.dim()])),
        }
    }

    /// Number of trainable parameter slots.
    pub fn num_param_slots(&self) -> usize {
        if self.batch_norm.is_some() { 6 } else { 4 }
    }

    /// Total number of trainable scalars.
    pub fn num_parameters(&self) -> usize {
        let bn = self.batch_norm.as_ref().map_or(0, |bn| 2 * bn.dim());
        self.encoder.weights().len()
            + self.encoder.biases().len()
            + self.decoder.weights().len()
            + self.decoder.biases().len()
            + bn
    }

    /// Visit every trainable parameter slot mutably, in slot order.
    pub fn for_each_param_mut<F: FnMut(usize, &mut [f32])>(&mut self, mut f: F) {
        f(ENCODER_WEIGHTS, self.encoder.weights_mut());
        f(ENCODER_BIASES, self.encoder.biases_mut());
        f(DECODER_WEIGHTS, self.decoder.weights_mut());
        f(DECODER_BIASES, self.decoder.biases_mut());
        if let Some(bn) = &mut self.batch_norm {
            f(BN_GAMMA, bn.gamma_mut());
            f(BN_BETA, bn.beta_mut());
        }
    }

    /// Visit every trainable parameter slot, in slot order.
    pub fn for_each_param<F: FnMut(usize, &[f32])>(&self, mut f: F) {
        f(ENCODER_WEIGHTS, self.encoder.weights());
        f(ENCODER_BIASES, self.encoder.biases());
        f(DECODER_WEIGHTS, self.decoder.weights());
        f(DECODER_BIASES, self.decoder.biases());
        if let Some(bn) = &self.batch_norm {
            f(BN_GAMMA, bn.gamma());
            f(BN_BETA, bn.beta());
        }
    }

    /// Inference-mode encoder over the first `n` rows of `x`; the code lands in
    /// `ws.code`.
    fn encode_into(&self, x: &[f32], n: usize, ws: &mut Workspace) {
        let e = self.encode_dim();
        self.encoder.forward_batch(x, n, &mut ws.hidden);
        match &self.batch_norm {
            Some(bn) => bn.forward_inference(&ws.hidden, n, &mut ws.code),
            None => ws.code[..n * e].copy_from_slice(&ws.hidden[..n * e]),
        }
    }

    /// Inference-mode forward pass: no noise, no dropout, moving batch-norm stats.
    pub(crate) fn forward_inference(&self, x: &[f32], n: usize, ws: &mut Workspace) {
        self.encode_into(x, n, ws);
        self.decoder.forward_batch(&ws.code, n, &mut ws.output);
    }

    /// One training step on the batch staged in `ws.x` / `ws.y` (first `n` rows).
    ///
    /// Runs the training-mode forward pass, overwrites `grads` and returns the
    /// batch loss including the L2 penalty. Parameters are not updated here.
    pub(crate) fn forward_backward(
        &mut self,
        n: usize,
        ws: &mut Workspace,
        grads: &mut Gradients,
    ) -> f32 {
        let d = self.input_dim();
        let e = self.encode_dim();
        let Workspace {
            x,
            y,
            noisy,
            hidden,
            code,
            output,
            mask,
            d_output,
            d_code,
            d_hidden,
            bn_cache,
            ..
        } = ws;

        // Forward.
        self.noise
            .forward_train(&x[..n * d], &mut noisy[..n * d], &mut self.rng);
        self.encoder.forward_batch(&noisy[..], n, &mut hidden[..]);
        match (&mut self.batch_norm, bn_cache.as_mut()) {
            (Some(bn), Some(cache)) => bn.forward_train(&hidden[..], n, &mut code[..], cache),
            _ => code[..n * e].copy_from_slice(&hidden[..n * e]),
        }
        if let Some(dropout) = &self.dropout {
            dropout.forward_train(&mut code[..n * e], &mut mask[..n * e], &mut self.rng);
        }
        self.decoder.forward_batch(&code[..], n, &mut output[..]);

        let data_loss = self
            .loss
            .backward(&output[..n * d], &y[..n * d], &mut d_output[..n * d]);

        // Backward.
        self.decoder.backward_batch(
            &code[..],
            &output[..],
            &mut d_output[..],
            n,
            Some(&mut d_code[..]),
            &mut grads.decoder_weights,
            &mut grads.decoder_biases,
        );
        if let Some(dropout) = &self.dropout {
            dropout.backward(&mut d_code[..n * e], &mask[..n * e]);
        }
        let d_encoded: &mut [f32] =
            match (&self.batch_norm, bn_cache.as_ref(), grads.batch_norm.as_mut()) {
                (Some(bn), Some(cache), Some((d_gamma, d_beta))) => {
                    bn.backward(&d_code[..], n, cache, &mut d_hidden[..], d_gamma, d_beta);
                    &mut d_hidden[..]
                }
                _ => &mut d_code[..],
            };
        self.encoder.backward_batch(
            &noisy[..],
            &hidden[..],
            d_encoded,
            n,
            None,
            &mut grads.encoder_weights,
            &mut grads.encoder_biases,
        );
        self.encoder
            .add_l2_grad(self.config.l2, &mut grads.encoder_weights);

        data_loss + self.regularization_loss()
    }
}

impl Gradients {
    #[inline]
    pub fn num_slots(&self) -> usize {
        if self.batch_norm.is_some() { 6 } else { 4 }
    }

    /// Gradient for parameter slot `idx`, in [`AutoEncoder::for_each_param`] order.
    ///
    /// Panics if `idx >= num_slots()`.
    pub fn slot(&self, idx: usize) -> &[f32] {
        match (idx, &self.batch_norm) {
            (ENCODER_WEIGHTS, _) => &self.encoder_weights,
            (ENCODER_BIASES, _) => &self.encoder_biases,
            (DECODER_WEIGHTS, _) => &self.decoder_weights,
            (DECODER_BIASES, _) => &self.decoder_biases,
            (BN_GAMMA, Some((gamma, _))) => gamma,
            (BN_BETA, Some((_, beta))) => beta,
            _ => panic!("gradient slot {idx} out of range"),
        }
    }

    /// Mutable variant of [`Gradients::slot`].
    pub fn slot_mut(&mut self, idx: usize) -> &mut [f32] {
        match (idx, &mut self.batch_norm) {
            (ENCODER_WEIGHTS, _) => &mut self.encoder_weights,
            (ENCODER_BIASES, _) => &mut self.encoder_biases,
            (DECODER_WEIGHTS, _) => &mut self.decoder_weights,
            (DECODER_BIASES, _) => &mut self.decoder_biases,
            (BN_GAMMA, Some((gamma, _))) => gamma,
            (BN_BETA, Some((_, beta))) => beta,
            _ => panic!("gradient slot {idx} out of range"),
        }
    }
}

/// Reusable buffers for batched forward/backward passes, sized for `capacity` rows.
#[derive(Debug, Clone)]
pub(crate) struct Workspace {
    pub(crate) capacity: usize,
    pub(crate) x: Vec<f32>,
    pub(crate) y: Vec<f32>,
    noisy: Vec<f32>,
    hidden: Vec<f32>,
    code: Vec<f32>,
    pub(crate) output: Vec<f32>,
    mask: Vec<f32>,
    d_output: Vec<f32>,
    d_code: Vec<f32>,
    d_hidden: Vec<f32>,
    bn_cache: Option<BatchNormCache>,
}

impl Workspace {
    pub(crate) fn for_training(model: &AutoEncoder, capacity: usize) -> Self {
        let d = model.input_dim() * capacity;
        let e = model.encode_dim() * capacity;
        Self {
            capacity,
            x: vec![0.0; d],
            y: vec![0.0; d],
            noisy: vec![0.0; d],
            hidden: vec![0.0; e],
            code: vec![0.0; e],
            output: vec![0.0; d],
            mask: if model.dropout.is_some() { vec![1.0; e] } else { Vec::new() },
            d_output: vec![0.0; d],
            d_code: vec![0.0; e],
            d_hidden: if model.batch_norm.is_some() { vec![0.0; e] } else { Vec::new() },
            bn_cache: model
                .batch_norm
                .as_ref()
                .map(|bn| BatchNormCache::new(bn.dim(), capacity)),
        }
    }

    /// Only the buffers the inference path touches.
    pub(crate) fn for_inference(model: &AutoEncoder, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            x: Vec::new(),
            y: Vec::new(),
            noisy: Vec::new(),
            hidden: vec![0.0; model.encode_dim() * capacity],
            code: vec![0.0; model.encode_dim() * capacity],
            output: vec![0.0; model.input_dim() * capacity],
            mask: Vec::new(),
            d_output: Vec::new(),
            d_code: Vec::new(),
            d_hidden: Vec::new(),
            bn_cache: None,
        }
    }
}

/// The input -> code half of an [`AutoEncoder`].
#[derive(Debug, Clone, Copy)]
pub struct Encoder<'a> {
    model: &'a AutoEncoder,
}

impl Encoder<'_> {
    #[inline]
    pub fn input_dim(&self) -> usize {
        self.model.input_dim()
    }

    #[inline]
    pub fn output_dim(&self) -> usize {
        self.model.encode_dim()
    }

    /// Encode every row of `inputs`.
    pub fn predict(&self, inputs: &Samples) -> Result<Samples> {
        check_inputs(inputs, self.input_dim(), "encoder")?;

        let (d, e) = (self.input_dim(), self.output_dim());
        let mut ws = Workspace::for_inference(self.model, INFERENCE_BATCH_SIZE.min(inputs.len()));
        let mut codes = Vec::with_capacity(inputs.len() * e);
        for chunk in inputs.as_slice().chunks(INFERENCE_BATCH_SIZE * d) {
            let n = chunk.len() / d;
            self.model.encode_into(chunk, n, &mut ws);
            codes.extend_from_slice(&ws.code[..n * e]);
        }
        Samples::from_flat(codes, e)
    }
}

/// The code -> reconstruction half of an [`AutoEncoder`].
///
/// Reuses the full model's decoder layer.
#[derive(Debug, Clone, Copy)]
pub struct Decoder<'a> {
    model: &'a AutoEncoder,
}

impl Decoder<'_> {
    #[inline]
    pub fn input_dim(&self) -> usize {
        self.model.encode_dim()
    }

    #[inline]
    pub fn output_dim(&self) -> usize {
        self.model.input_dim()
    }

    /// Decode every row of `codes`.
    pub fn predict(&self, codes: &Samples) -> Result<Samples> {
        check_inputs(codes, self.input_dim(), "decoder")?;

        let (e, d) = (self.input_dim(), self.output_dim());
        let layer = &self.model.decoder;
        let mut out = vec![0.0; codes.len() * d];
        for (chunk, dst) in codes
            .as_slice()
            .chunks(INFERENCE_BATCH_SIZE * e)
            .zip(out.chunks_mut(INFERENCE_BATCH_SIZE * d))
        {
            layer.forward_batch(chunk, chunk.len() / e, dst);
        }
        Samples::from_flat(out, d)
    }
}

fn check_inputs(inputs: &Samples, dim: usize, what: &str) -> Result<()> {
    if inputs.is_empty() {
        return Err(Error::InvalidData(format!("{what} inputs must not be empty")));
    }
    if inputs.dim() != dim {
        return Err(Error::InvalidData(format!(
            "{what} inputs dim {} does not match expected dim {dim}",
            inputs.dim()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    use crate::AutoEncoderBuilder;

    fn samples(n: usize, dim: usize) -> Samples {
        let values = (0..n * dim).map(|i| ((i * 7) % 11) as f32 / 10.0).collect();
        Samples::from_flat(values, dim).unwrap()
    }

    fn stage(ws: &mut Workspace, data: &Samples) {
        let len = data.as_slice().len();
        ws.x[..len].copy_from_slice(data.as_slice());
        ws.y[..len].copy_from_slice(data.as_slice());
    }

    #[test]
    fn seeded_init_is_deterministic() {
        let a = AutoEncoderBuilder::new(6, 3).unwrap().build().unwrap();
        let b = AutoEncoderBuilder::new(6, 3).unwrap().build().unwrap();
        let x = samples(4, 6);
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());

        let c = AutoEncoderBuilder::new(6, 3).unwrap().seed(1).build().unwrap();
        assert_ne!(a.encoder_layer().weights(), c.encoder_layer().weights());
    }

    #[test]
    fn predict_composes_encoder_and_decoder() {
        let model = AutoEncoderBuilder::new(5, 2)
            .unwrap()
            .batch_norm(true)
            .build()
            .unwrap();
        // More rows than one inference chunk.
        let x = samples(INFERENCE_BATCH_SIZE + 5, 5);

        let codes = model.encoder().predict(&x).unwrap();
        assert_eq!(codes.len(), x.len());
        assert_eq!(codes.dim(), 2);

        let via_halves = model.decoder().predict(&codes).unwrap();
        let full = model.predict(&x).unwrap();
        assert_eq!(full, via_halves);
        assert_eq!(full.dim(), 5);
        assert!(full.as_slice().iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn views_reject_wrong_dims() {
        let model = AutoEncoderBuilder::new(5, 2).unwrap().build().unwrap();
        assert!(model.encoder().predict(&samples(2, 4)).is_err());
        assert!(model.decoder().predict(&samples(2, 5)).is_err());
        assert!(model.predict(&samples(2, 2)).is_err());
    }

    #[test]
    fn evaluate_adds_regularization_penalty() {
        let plain = AutoEncoderBuilder::new(4, 2).unwrap().build().unwrap();
        let reg = AutoEncoderBuilder::new(4, 2).unwrap().l2(0.5).unwrap().build().unwrap();
        let data = Dataset::autoencoding(samples(3, 4));

        let base = plain.evaluate(&data).unwrap();
        let penalized = reg.evaluate(&data).unwrap();
        assert_relative_eq!(penalized - base, reg.regularization_loss(), epsilon = 1e-6);
        assert!(reg.regularization_loss() > 0.0);
    }

    #[test]
    fn evaluate_matches_manual_mse() {
        let model = AutoEncoderBuilder::new(3, 2).unwrap().build().unwrap();
        let x = samples(40, 3);
        let recon = model.predict(&x).unwrap();
        let manual = crate::loss::mse(recon.as_slice(), x.as_slice());
        let eval = model.evaluate(&Dataset::autoencoding(x)).unwrap();
        assert_relative_eq!(eval, manual, epsilon = 1e-5);
    }

    #[test]
    fn forward_backward_matches_numeric_gradients() {
        let mut model = AutoEncoderBuilder::new(4, 3)
            .unwrap()
            .encode_activation(Activation::Tanh)
            .unwrap()
            .l2(0.1)
            .unwrap()
            .batch_norm(true)
            .build()
            .unwrap();
        // Larger encoder weights so the gradient check is not dominated by rounding.
        for (i, w) in model.encoder.weights_mut().iter_mut().enumerate() {
            *w = ((i % 5) as f32 - 2.0) * 0.3;
        }

        let n = 5;
        let data = samples(n, 4);
        let mut ws = Workspace::for_training(&model, n);
        let mut grads = model.gradients();
        stage(&mut ws, &data);
        model.forward_backward(n, &mut ws, &mut grads);

        // Loss as seen by a training step, without touching the model's state.
        let loss_at = |m: &AutoEncoder| {
            let mut scratch = m.clone();
            let mut ws = Workspace::for_training(&scratch, n);
            let mut grads = scratch.gradients();
            stage(&mut ws, &data);
            scratch.forward_backward(n, &mut ws, &mut grads)
        };

        let eps = 1e-2_f32;
        for slot in 0..model.num_param_slots() {
            let len = grads.slot(slot).len();
            for p in 0..len {
                let mut plus = model.clone();
                plus.for_each_param_mut(|s, v| {
                    if s == slot {
                        v[p] += eps;
                    }
                });
                let mut minus = model.clone();
                minus.for_each_param_mut(|s, v| {
                    if s == slot {
                        v[p] -= eps;
                    }
                });
                let numeric = (loss_at(&plus) - loss_at(&minus)) / (2.0 * eps);
                assert_relative_eq!(grads.slot(slot)[p], numeric, epsilon = 2e-3, max_relative = 2e-2);
            }
        }
    }

    #[test]
    fn inference_ignores_noise_and_dropout() {
        let x = samples(12, 5);
        let mut noisy = AutoEncoderBuilder::new(5, 3)
            .unwrap()
            .noise(1.0)
            .unwrap()
            .dropout(0.5)
            .unwrap()
            .batch_norm(true)
            .build()
            .unwrap();
        // Move the batch-norm statistics away from their initial values.
        let mut ws = Workspace::for_training(&noisy, x.len());
        let mut grads = noisy.gradients();
        stage(&mut ws, &x);
        noisy.forward_backward(x.len(), &mut ws, &mut grads);

        let first = noisy.predict(&x).unwrap();
        assert_eq!(noisy.predict(&x).unwrap(), first);

        let clean_config = AutoEncoderConfig {
            noise: 0.0,
            dropout: None,
            ..noisy.config().clone()
        };
        let clean = AutoEncoder::from_parts(
            clean_config,
            noisy.encoder_layer().clone(),
            noisy.batch_norm().cloned(),
            noisy.decoder_layer().clone(),
            noisy.loss(),
        )
        .unwrap();
        assert_eq!(clean.predict(&x).unwrap(), first);

        let data = Dataset::autoencoding(x);
        assert_eq!(noisy.evaluate(&data).unwrap(), clean.evaluate(&data).unwrap());
    }

    #[test]
    fn parameter_slots_cover_all_trainable_values() {
        let model = AutoEncoderBuilder::new(4, 3)
            .unwrap()
            .batch_norm(true)
            .build()
            .unwrap();
        let grads = model.gradients();
        assert_eq!(grads.num_slots(), model.num_param_slots());

        let mut total = 0;
        model.for_each_param(|slot, values| {
            assert_eq!(values.len(), grads.slot(slot).len());
            total += values.len();
        });
        assert_eq!(total, model.num_parameters());
        assert_eq!(total, 4 * 3 + 3 + 3 * 4 + 4 + 2 * 3);
    }
}
