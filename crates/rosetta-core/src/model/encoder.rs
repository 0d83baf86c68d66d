//! # Recurrent Encoder
//!
//! Embeds a padded source batch and runs a recurrent cell across the time
//! axis, producing one output per position plus the final state.

use candle_core::{Module, Tensor};
use candle_nn::{Embedding, VarBuilder};

use crate::error::Result;
use crate::model::shape;
use crate::model::state::{CellKind, HiddenState, RecurrentCell};
use crate::vocab::PAD_ID;

/// Everything the decoder may read from the encoder.
#[derive(Debug, Clone)]
pub struct EncoderOutput {
    /// Per-position hidden outputs `[batch, time, hidden]`.
    pub outputs: Tensor,
    /// State after the last position.
    pub state: HiddenState,
}

/// Embedding table followed by a GRU or LSTM.
#[derive(Debug, Clone)]
pub struct RecurrentEncoder {
    embedding: Embedding,
    cell: RecurrentCell,
    hidden_units: usize,
    mask_padding: bool,
}

impl RecurrentEncoder {
    /// Builds the encoder. With `mask_padding` the state is carried over
    /// unchanged at padded positions.
    pub fn new(
        vocab_size: usize,
        embedding_dim: usize,
        hidden_units: usize,
        kind: CellKind,
        mask_padding: bool,
        vb: VarBuilder,
    ) -> Result<Self> {
        let embedding = candle_nn::embedding(vocab_size, embedding_dim, vb.pp("embedding"))?;
        let cell = RecurrentCell::new(kind, embedding_dim, hidden_units, vb.pp("rnn"))?;
        Ok(Self {
            embedding,
            cell,
            hidden_units,
            mask_padding,
        })
    }

    pub fn hidden_units(&self) -> usize {
        self.hidden_units
    }

    /// Zero state for a batch.
    pub fn initialize_hidden_state(&self, batch_size: usize) -> Result<HiddenState> {
        self.cell.zero_state(batch_size)
    }

    /// Runs the encoder over `ids` (`[batch, time]`, u32) from `initial`.
    pub fn forward(&self, ids: &Tensor, initial: &HiddenState) -> Result<EncoderOutput> {
        let (batch, time) = shape::ids2(ids, "encoder input")?;
        shape::expect("encoder input", "at least one time step", ids, time > 0)?;
        shape::expect(
            "encoder initial state",
            format!("[{batch}, {}]", self.hidden_units),
            initial.h(),
            initial.h().dims() == [batch, self.hidden_units],
        )?;

        let embedded = self.embedding.forward(ids)?;
        let keep = if self.mask_padding {
            Some(ids.ne(PAD_ID)?.to_dtype(initial.h().dtype())?)
        } else {
            None
        };

        let mut state = initial.clone();
        let mut outputs = Vec::with_capacity(time);
        for t in 0..time {
            let x = embedded.narrow(1, t, 1)?.squeeze(1)?;
            let next = self.cell.step(&x, &state)?;
            state = match &keep {
                Some(keep) => state.carry_over(next, &keep.narrow(1, t, 1)?)?,
                None => next,
            };
            outputs.push(state.h().clone());
        }

        Ok(EncoderOutput {
            outputs: Tensor::stack(&outputs, 1)?,
            state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn encoder(kind: CellKind, mask_padding: bool, varmap: &VarMap) -> RecurrentEncoder {
        let vb = VarBuilder::from_varmap(varmap, DType::F32, &Device::Cpu);
        RecurrentEncoder::new(10, 4, 6, kind, mask_padding, vb).unwrap()
    }

    #[test]
    fn test_forward_shapes() {
        let varmap = VarMap::new();
        let encoder = encoder(CellKind::Gru, false, &varmap);
        let ids = Tensor::new(&[[1u32, 2, 3, 0], [4, 5, 0, 0]], &Device::Cpu).unwrap();

        let hidden = encoder.initialize_hidden_state(2).unwrap();
        let zeros = hidden.h().flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert!(zeros.iter().all(|&v| v == 0.0));

        let out = encoder.forward(&ids, &hidden).unwrap();
        assert_eq!(out.outputs.dims(), &[2, 4, 6]);
        assert_eq!(out.state.h().dims(), &[2, 6]);
    }

    #[test]
    fn test_final_state_matches_last_output() {
        let varmap = VarMap::new();
        let encoder = encoder(CellKind::Gru, false, &varmap);
        let ids = Tensor::new(&[[1u32, 2, 3]], &Device::Cpu).unwrap();
        let out = encoder
            .forward(&ids, &encoder.initialize_hidden_state(1).unwrap())
            .unwrap();

        let last = out.outputs.narrow(1, 2, 1).unwrap().squeeze(1).unwrap();
        assert_eq!(
            last.to_vec2::<f32>().unwrap(),
            out.state.h().to_vec2::<f32>().unwrap()
        );
    }

    #[test]
    fn test_masking_ignores_trailing_padding() {
        let varmap = VarMap::new();
        let encoder = encoder(CellKind::Lstm, true, &varmap);
        let short = Tensor::new(&[[3u32, 7]], &Device::Cpu).unwrap();
        let padded = Tensor::new(&[[3u32, 7, 0, 0]], &Device::Cpu).unwrap();

        let a = encoder
            .forward(&short, &encoder.initialize_hidden_state(1).unwrap())
            .unwrap();
        let b = encoder
            .forward(&padded, &encoder.initialize_hidden_state(1).unwrap())
            .unwrap();

        let a = a.state.h().to_vec2::<f32>().unwrap();
        let b = b.state.h().to_vec2::<f32>().unwrap();
        for (x, y) in a[0].iter().zip(&b[0]) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_rejects_bad_inputs() {
        let varmap = VarMap::new();
        let encoder = encoder(CellKind::Gru, false, &varmap);
        let hidden = encoder.initialize_hidden_state(2).unwrap();

        let floats = Tensor::zeros((2, 3), DType::F32, &Device::Cpu).unwrap();
        assert!(encoder.forward(&floats, &hidden).is_err());

        let ids = Tensor::new(&[[1u32, 2, 3]], &Device::Cpu).unwrap();
        assert!(encoder.forward(&ids, &hidden).is_err());
    }
}
