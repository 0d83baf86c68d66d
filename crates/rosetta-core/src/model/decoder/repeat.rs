use candle_core::{D, Module, Tensor};
use candle_nn::{Linear, VarBuilder};

use super::{Decoder, Generation, StopReason, TeacherForced};
use crate::error::Result;
use crate::model::encoder::EncoderOutput;
use crate::model::sampling::TokenSampler;
use crate::model::shape;
use crate::model::state::{CellKind, RecurrentCell};
use crate::vocab::PAD_ID;

/// LSTM decoder fed the encoder's final hidden vector at every position.
///
/// The target sequence is produced in one pass of fixed length; the decoder
/// never sees its own predictions or the per-step encoder outputs.
#[derive(Debug, Clone)]
pub struct RepeatVectorDecoder {
    cell: RecurrentCell,
    projection: Linear,
    target_len: usize,
}

impl RepeatVectorDecoder {
    pub fn new(
        vocab_size: usize,
        hidden_units: usize,
        target_len: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        Ok(Self {
            cell: RecurrentCell::new(CellKind::Lstm, hidden_units, hidden_units, vb.pp("rnn"))?,
            projection: candle_nn::linear(hidden_units, vocab_size, vb.pp("fc"))?,
            target_len,
        })
    }

    /// Logits for every target position, `[batch, target_len, vocab]`.
    pub fn forward(&self, encoded: &EncoderOutput) -> Result<Tensor> {
        let summary = encoded.state.h();
        let (batch, _) = shape::dims2(summary, "repeat-vector input")?;

        let mut state = self.cell.zero_state(batch)?;
        let mut outputs = Vec::with_capacity(self.target_len);
        for _ in 0..self.target_len {
            state = self.cell.step(summary, &state)?;
            outputs.push(state.h().clone());
        }

        let sequence = Tensor::stack(&outputs, 1)?;
        Ok(self.projection.forward(&sequence)?)
    }
}

impl Decoder for RepeatVectorDecoder {
    fn teacher_forced(&self, encoded: &EncoderOutput, targets: &Tensor) -> Result<TeacherForced> {
        let (_, time) = shape::ids2(targets, "decoder targets")?;
        shape::expect(
            "decoder targets",
            format!("[batch, {}]", self.target_len),
            targets,
            time == self.target_len,
        )?;

        Ok(TeacherForced {
            logits: self.forward(encoded)?,
            labels: targets.clone(),
        })
    }

    /// Arg-max over the pre-computed sequence; the sampler is not consulted.
    fn generate(
        &self,
        encoded: &EncoderOutput,
        max_len: usize,
        _sampler: &mut TokenSampler,
    ) -> Result<Generation> {
        let logits = self.forward(encoded)?;
        let (batch, _, _) = shape::dims3(&logits, "decoder logits")?;
        shape::expect("decoder logits", "a batch of one", &logits, batch == 1)?;

        let predicted = logits.argmax(D::Minus1)?.squeeze(0)?.to_vec1::<u32>()?;
        let mut ids = Vec::with_capacity(predicted.len());
        for id in predicted.into_iter().take(max_len) {
            if id == PAD_ID {
                return Ok(Generation {
                    ids,
                    attention: None,
                    stop: StopReason::Padding,
                });
            }
            ids.push(id);
        }

        Ok(Generation {
            ids,
            attention: None,
            stop: StopReason::MaxLength,
        })
    }

    fn masks_padding(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::encoder::RecurrentEncoder;
    use crate::model::sampling::Sampling;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn build(varmap: &VarMap) -> (RecurrentEncoder, RepeatVectorDecoder) {
        let vb = VarBuilder::from_varmap(varmap, DType::F32, &Device::Cpu);
        let encoder =
            RecurrentEncoder::new(9, 5, 5, CellKind::Lstm, true, vb.pp("encoder")).unwrap();
        let decoder = RepeatVectorDecoder::new(6, 5, 3, vb.pp("decoder")).unwrap();
        (encoder, decoder)
    }

    fn encode(encoder: &RecurrentEncoder, rows: Vec<u32>, batch: usize) -> EncoderOutput {
        let width = rows.len() / batch;
        let ids = Tensor::from_vec(rows, (batch, width), &Device::Cpu).unwrap();
        let hidden = encoder.initialize_hidden_state(batch).unwrap();
        encoder.forward(&ids, &hidden).unwrap()
    }

    #[test]
    fn test_whole_sequence_logits() {
        let varmap = VarMap::new();
        let (encoder, decoder) = build(&varmap);
        let encoded = encode(&encoder, vec![1, 2, 3, 4, 5, 0], 2);

        let targets = Tensor::new(&[[1u32, 2, 0], [3, 0, 0]], &Device::Cpu).unwrap();
        let forced = decoder.teacher_forced(&encoded, &targets).unwrap();
        assert_eq!(forced.logits.dims(), &[2, 3, 6]);
        assert_eq!(forced.labels.dims(), &[2, 3]);
    }

    #[test]
    fn test_rejects_wrong_target_width() {
        let varmap = VarMap::new();
        let (encoder, decoder) = build(&varmap);
        let encoded = encode(&encoder, vec![1, 2, 3], 1);
        let targets = Tensor::new(&[[1u32, 2]], &Device::Cpu).unwrap();
        assert!(decoder.teacher_forced(&encoded, &targets).is_err());
    }

    #[test]
    fn test_generate_is_deterministic_and_padding_free() {
        let varmap = VarMap::new();
        let (encoder, decoder) = build(&varmap);
        let encoded = encode(&encoder, vec![4, 2, 0], 1);

        let mut sampler = TokenSampler::new(Sampling::default());
        let first = decoder.generate(&encoded, 3, &mut sampler).unwrap();
        let second = decoder.generate(&encoded, 3, &mut sampler).unwrap();
        assert_eq!(first.ids, second.ids);
        assert!(first.attention.is_none());
        assert!(first.ids.iter().all(|&id| id != PAD_ID));
        assert!(first.ids.len() <= 3);
        if first.stop == StopReason::MaxLength {
            assert_eq!(first.ids.len(), 3);
        }
    }
}
