use anyhow::{anyhow, Result};
use burn::{
    nn::{
        loss::{MseLoss, Reduction},
        lstm::{Lstm, LstmConfig},
        Dropout, DropoutConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally, do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct LstmRegressorConfig {
    pub feature_count: usize,
    pub hidden_units:  usize,
    pub dropout:       f64,
}

impl LstmRegressorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> LstmRegressor<B> {
        let lstm    = LstmConfig::new(self.feature_count, self.hidden_units, true).init(device);
        let dropout = DropoutConfig::new(self.dropout).init();
        let head    = LinearConfig::new(self.hidden_units, 1).init(device);
        LstmRegressor { lstm, dropout, head }
    }
}

/// One recurrent layer, dropout on its final hidden state, and a
/// single-unit linear head with no output activation.
#[derive(Module, Debug)]
pub struct LstmRegressor<B: Backend> {
    pub lstm:    Lstm<B>,
    pub dropout: Dropout,
    pub head:    Linear<B>,
}

impl<B: Backend> LstmRegressor<B> {
    /// windows: [batch, window_length, feature_count] → [batch, 1]
    pub fn forward(&self, windows: Tensor<B, 3>) -> Tensor<B, 2> {
        let (_sequence, state) = self.lstm.forward(windows, None);
        // state.hidden is the last time step's output: [batch, hidden_units]
        let last = self.dropout.forward(state.hidden);
        self.head.forward(last)
    }

    /// Mean squared error against targets of shape [batch, 1].
    pub fn forward_loss(
        &self,
        windows: Tensor<B, 3>,
        targets: Tensor<B, 2>,
    ) -> (Tensor<B, 1>, Tensor<B, 2>) {
        let output = self.forward(windows);
        let loss = MseLoss::new().forward(output.clone(), targets, Reduction::Mean);
        (loss, output)
    }
}

/// Serialize the weights with Burn's binary bytes recorder.
pub fn weights_to_bytes<B: Backend>(model: &LstmRegressor<B>) -> Result<Vec<u8>> {
    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    <BinBytesRecorder<FullPrecisionSettings> as Recorder<B>>::record(
        &recorder,
        model.clone().into_record(),
        (),
    )
    .map_err(|e| anyhow!("Cannot serialize model weights: {e:?}"))
}

/// Rebuild a model from its config and serialized weights.
/// Fails if the weights were recorded for a different architecture.
pub fn model_from_bytes<B: Backend>(
    config:  &LstmRegressorConfig,
    weights: Vec<u8>,
    device:  &B::Device,
) -> Result<LstmRegressor<B>> {
    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    let record = <BinBytesRecorder<FullPrecisionSettings> as Recorder<B>>::load(
        &recorder,
        weights,
        device,
    )
    .map_err(|e| anyhow!("Cannot load model weights: {e:?}"))?;
    Ok(config.init::<B>(device).load_record(record))
}
