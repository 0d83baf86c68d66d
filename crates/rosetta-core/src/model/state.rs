//! # Recurrent Cells
//!
//! A single enum over the two cell types used by the model: GRU for the
//! attention variant and LSTM for the vanilla variant. The hidden state is
//! a single tensor for the GRU and an `(h, c)` pair for the LSTM.

use candle_core::Tensor;
use candle_nn::VarBuilder;
use candle_nn::rnn::{GRU, GRUConfig, GRUState, LSTM, LSTMConfig, LSTMState, RNN};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RosettaError};

/// Kind of recurrent cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    Gru,
    Lstm,
}

/// Recurrent memory produced by one cell step.
#[derive(Debug, Clone)]
pub enum HiddenState {
    Gru(GRUState),
    Lstm(LSTMState),
}

impl HiddenState {
    /// The hidden vector `[batch, hidden]`, which is also the step output.
    pub fn h(&self) -> &Tensor {
        match self {
            Self::Gru(state) => &state.h,
            Self::Lstm(state) => &state.h,
        }
    }

    /// Keeps `next` where `keep` is 1 and `self` where it is 0.
    ///
    /// `keep` has shape `[batch, 1]` and the dtype of the state.
    pub(crate) fn carry_over(&self, next: HiddenState, keep: &Tensor) -> Result<HiddenState> {
        let drop = keep.affine(-1.0, 1.0)?;
        let mix = |new: &Tensor, old: &Tensor| -> Result<Tensor> {
            Ok(new
                .broadcast_mul(keep)?
                .add(&old.broadcast_mul(&drop)?)?)
        };

        match (self, next) {
            (Self::Gru(old), Self::Gru(new)) => Ok(Self::Gru(GRUState {
                h: mix(&new.h, &old.h)?,
            })),
            (Self::Lstm(old), Self::Lstm(new)) => Ok(Self::Lstm(LSTMState::new(
                mix(&new.h, &old.h)?,
                mix(&new.c, &old.c)?,
            ))),
            _ => Err(state_kind_mismatch()),
        }
    }
}

/// A GRU or LSTM cell stepped one time position at a time.
#[derive(Debug, Clone)]
pub enum RecurrentCell {
    Gru(GRU),
    Lstm(LSTM),
}

impl RecurrentCell {
    pub fn new(kind: CellKind, in_dim: usize, hidden_dim: usize, vb: VarBuilder) -> Result<Self> {
        Ok(match kind {
            CellKind::Gru => Self::Gru(candle_nn::rnn::gru(
                in_dim,
                hidden_dim,
                GRUConfig::default(),
                vb,
            )?),
            CellKind::Lstm => Self::Lstm(candle_nn::rnn::lstm(
                in_dim,
                hidden_dim,
                LSTMConfig::default(),
                vb,
            )?),
        })
    }

    pub fn kind(&self) -> CellKind {
        match self {
            Self::Gru(_) => CellKind::Gru,
            Self::Lstm(_) => CellKind::Lstm,
        }
    }

    /// All-zero state for a batch.
    pub fn zero_state(&self, batch_size: usize) -> Result<HiddenState> {
        Ok(match self {
            Self::Gru(cell) => HiddenState::Gru(cell.zero_state(batch_size)?),
            Self::Lstm(cell) => HiddenState::Lstm(cell.zero_state(batch_size)?),
        })
    }

    /// Advances the cell by one position. `input` is `[batch, in_dim]`.
    pub fn step(&self, input: &Tensor, state: &HiddenState) -> Result<HiddenState> {
        match (self, state) {
            (Self::Gru(cell), HiddenState::Gru(state)) => {
                Ok(HiddenState::Gru(cell.step(input, state)?))
            }
            (Self::Lstm(cell), HiddenState::Lstm(state)) => {
                Ok(HiddenState::Lstm(cell.step(input, state)?))
            }
            _ => Err(state_kind_mismatch()),
        }
    }
}

fn state_kind_mismatch() -> RosettaError {
    RosettaError::ShapeMismatch {
        context: "recurrent state",
        expected: "a state produced by the same cell kind".to_string(),
        actual: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn test_zero_state_shapes() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);

        let gru = RecurrentCell::new(CellKind::Gru, 4, 6, vb.pp("gru")).unwrap();
        let state = gru.zero_state(3).unwrap();
        assert_eq!(state.h().dims(), &[3, 6]);
        assert_eq!(gru.kind(), CellKind::Gru);

        let lstm = RecurrentCell::new(CellKind::Lstm, 4, 5, vb.pp("lstm")).unwrap();
        let state = lstm.zero_state(2).unwrap();
        assert_eq!(state.h().dims(), &[2, 5]);
        assert!(matches!(state, HiddenState::Lstm(_)));
    }

    #[test]
    fn test_step_rejects_foreign_state() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let gru = RecurrentCell::new(CellKind::Gru, 4, 4, vb.pp("gru")).unwrap();
        let lstm = RecurrentCell::new(CellKind::Lstm, 4, 4, vb.pp("lstm")).unwrap();

        let input = Tensor::zeros((1, 4), DType::F32, &Device::Cpu).unwrap();
        let lstm_state = lstm.zero_state(1).unwrap();
        assert!(gru.step(&input, &lstm_state).is_err());
    }

    #[test]
    fn test_carry_over_keeps_masked_rows() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let gru = RecurrentCell::new(CellKind::Gru, 2, 3, vb).unwrap();

        let old = gru.zero_state(2).unwrap();
        let input = Tensor::ones((2, 2), DType::F32, &Device::Cpu).unwrap();
        let next = gru.step(&input, &old).unwrap();
        let keep = Tensor::new(&[[1f32], [0f32]], &Device::Cpu).unwrap();

        let mixed = old.carry_over(next.clone(), &keep).unwrap();
        let rows = mixed.h().to_vec2::<f32>().unwrap();
        let expected = next.h().to_vec2::<f32>().unwrap();
        assert_eq!(rows[0], expected[0]);
        assert!(rows[1].iter().all(|&v| v == 0.0));
    }
}
