//! # Additive Attention
//!
//! Bahdanau-style scorer: `score_t = V · tanh(W1·enc_t + W2·query)`,
//! normalised with a softmax over the source-time axis.

use candle_core::{Module, Tensor};
use candle_nn::{Linear, VarBuilder};

use crate::error::Result;
use crate::model::shape;

/// Context vector and alignment weights for one decoding step.
#[derive(Debug, Clone)]
pub struct Alignment {
    /// Weighted sum of encoder outputs `[batch, hidden]`.
    pub context: Tensor,
    /// Distribution over source positions `[batch, time]`.
    pub weights: Tensor,
}

#[derive(Debug, Clone)]
pub struct BahdanauAttention {
    w1: Linear,
    w2: Linear,
    v: Linear,
    hidden_units: usize,
}

impl BahdanauAttention {
    pub fn new(hidden_units: usize, attention_units: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            w1: candle_nn::linear(hidden_units, attention_units, vb.pp("w1"))?,
            w2: candle_nn::linear(hidden_units, attention_units, vb.pp("w2"))?,
            v: candle_nn::linear(attention_units, 1, vb.pp("v"))?,
            hidden_units,
        })
    }

    /// Scores `encoder_outputs` (`[batch, time, hidden]`) against
    /// `decoder_hidden` (`[batch, hidden]`).
    pub fn score(&self, decoder_hidden: &Tensor, encoder_outputs: &Tensor) -> Result<Alignment> {
        let (batch, hidden) = shape::dims2(decoder_hidden, "attention query")?;
        let (enc_batch, _time, enc_hidden) = shape::dims3(encoder_outputs, "attention keys")?;
        shape::expect(
            "attention query",
            format!("[{enc_batch}, {}]", self.hidden_units),
            decoder_hidden,
            batch == enc_batch && hidden == self.hidden_units,
        )?;
        shape::expect(
            "attention keys",
            format!("[{batch}, time, {}]", self.hidden_units),
            encoder_outputs,
            enc_hidden == self.hidden_units,
        )?;

        let keys = self.w1.forward(encoder_outputs)?;
        let query = self.w2.forward(&decoder_hidden.unsqueeze(1)?)?;
        let energy = keys.broadcast_add(&query)?.tanh()?;

        // [batch, time, 1] -> [batch, time]; softmax along time, not batch or features
        let scores = self.v.forward(&energy)?.squeeze(2)?;
        let weights = candle_nn::ops::softmax(&scores, 1)?;

        let context = weights
            .unsqueeze(2)?
            .broadcast_mul(encoder_outputs)?
            .sum(1)?;

        Ok(Alignment { context, weights })
    }
}
