//! Training callbacks.
//!
//! A [`Callback`] observes the training loop. Hooks run in registration order;
//! an error from any hook aborts `train` and is returned to the caller.

use log::debug;

use crate::{AutoEncoder, EpochLogs, Error, History, Result, Samples};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// What the training loop should do after an epoch hook.
pub enum CallbackAction {
    #[default]
    Continue,
    /// Finish the current epoch and stop.
    Stop,
}

/// Observer of the training loop.
///
/// All hooks except [`Callback::name`] have no-op defaults.
pub trait Callback {
    /// Called once before the first epoch.
    fn on_train_begin(&mut self, _model: &AutoEncoder) -> Result<()> {
        Ok(())
    }

    /// Called after every epoch with the model in its post-epoch state.
    fn on_epoch_end(
        &mut self,
        _epoch: usize,
        _model: &AutoEncoder,
        _logs: &EpochLogs,
    ) -> Result<CallbackAction> {
        Ok(CallbackAction::Continue)
    }

    /// Called once after the last epoch, including after an early stop.
    fn on_train_end(&mut self, _model: &AutoEncoder, _history: &History) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str;
}

/// Records the model's loss on a fixed train split and a fixed test split after
/// every epoch.
///
/// `mse_train()[i]` and `mse_test()[i]` are the losses after epoch `i`. Each
/// value is [`AutoEncoder::evaluate`] on the stored split, so it uses the
/// model's training loss and includes the regularization penalty.
#[derive(Debug, Clone)]
pub struct ErrorsCallback {
    train_inputs: Samples,
    train_targets: Samples,
    test_inputs: Samples,
    test_targets: Samples,
    mse_train: Vec<f32>,
    mse_test: Vec<f32>,
}

impl ErrorsCallback {
    pub fn new(
        train_inputs: Samples,
        train_targets: Samples,
        test_inputs: Samples,
        test_targets: Samples,
    ) -> Result<Self> {
        check_split("train", &train_inputs, &train_targets)?;
        check_split("test", &test_inputs, &test_targets)?;
        if train_inputs.dim() != test_inputs.dim() {
            return Err(Error::InvalidData(format!(
                "train inputs dim {} does not match test inputs dim {}",
                train_inputs.dim(),
                test_inputs.dim()
            )));
        }
        Ok(Self {
            train_inputs,
            train_targets,
            test_inputs,
            test_targets,
            mse_train: Vec::new(),
            mse_test: Vec::new(),
        })
    }

    /// Both splits reconstruct their own inputs.
    pub fn autoencoding(train: Samples, test: Samples) -> Result<Self> {
        Self::new(train.clone(), train, test.clone(), test)
    }

    /// Train-split loss per completed epoch.
    pub fn mse_train(&self) -> &[f32] {
        &self.mse_train
    }

    /// Test-split loss per completed epoch.
    pub fn mse_test(&self) -> &[f32] {
        &self.mse_test
    }
}

impl Callback for ErrorsCallback {
    fn on_train_begin(&mut self, model: &AutoEncoder) -> Result<()> {
        if self.train_inputs.dim() != model.input_dim() {
            return Err(Error::InvalidData(format!(
                "errors callback data dim {} does not match model input_dim {}",
                self.train_inputs.dim(),
                model.input_dim()
            )));
        }
        Ok(())
    }

    fn on_epoch_end(
        &mut self,
        epoch: usize,
        model: &AutoEncoder,
        _logs: &EpochLogs,
    ) -> Result<CallbackAction> {
        let train = model.evaluate_samples(&self.train_inputs, &self.train_targets)?;
        let test = model.evaluate_samples(&self.test_inputs, &self.test_targets)?;
        self.mse_train.push(train);
        self.mse_test.push(test);
        debug!(
            "epoch {}: {} train={train:.6} test={test:.6}",
            epoch + 1,
            model.loss()
        );
        Ok(CallbackAction::Continue)
    }

    fn name(&self) -> &str {
        "errors"
    }
}

fn check_split(which: &str, inputs: &Samples, targets: &Samples) -> Result<()> {
    if inputs.is_empty() {
        return Err(Error::InvalidData(format!("{which} inputs must not be empty")));
    }
    if inputs.len() != targets.len() {
        return Err(Error::InvalidData(format!(
            "{which} inputs/targets length mismatch: {} vs {}",
            inputs.len(),
            targets.len()
        )));
    }
    if inputs.dim() != targets.dim() {
        return Err(Error::InvalidData(format!(
            "{which} inputs dim {} does not match targets dim {}",
            inputs.dim(),
            targets.dim()
        )));
    }
    Ok(())
}
