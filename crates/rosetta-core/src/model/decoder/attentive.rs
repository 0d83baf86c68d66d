use candle_core::{Module, Tensor};
use candle_nn::{Embedding, Linear, VarBuilder};

use super::{Decoder, Generation, StopReason, TeacherForced};
use crate::error::Result;
use crate::model::attention::BahdanauAttention;
use crate::model::config::Sentinels;
use crate::model::encoder::EncoderOutput;
use crate::model::sampling::TokenSampler;
use crate::model::shape;
use crate::model::state::{CellKind, HiddenState, RecurrentCell};

/// Result of one decoder step.
#[derive(Debug, Clone)]
pub struct DecoderStep {
    /// Unnormalised scores `[batch, vocab]`.
    pub logits: Tensor,
    pub hidden: HiddenState,
    /// Attention weights `[batch, time]`.
    pub weights: Tensor,
}

/// GRU decoder reading an additive-attention context at every step.
#[derive(Debug, Clone)]
pub struct AttentionDecoder {
    embedding: Embedding,
    attention: BahdanauAttention,
    cell: RecurrentCell,
    projection: Linear,
    sentinels: Sentinels,
}

impl AttentionDecoder {
    pub fn new(
        vocab_size: usize,
        embedding_dim: usize,
        hidden_units: usize,
        sentinels: Sentinels,
        vb: VarBuilder,
    ) -> Result<Self> {
        Ok(Self {
            embedding: candle_nn::embedding(vocab_size, embedding_dim, vb.pp("embedding"))?,
            attention: BahdanauAttention::new(hidden_units, hidden_units, vb.pp("attention"))?,
            cell: RecurrentCell::new(
                CellKind::Gru,
                embedding_dim + hidden_units,
                hidden_units,
                vb.pp("rnn"),
            )?,
            projection: candle_nn::linear(hidden_units, vocab_size, vb.pp("fc"))?,
            sentinels,
        })
    }

    /// One step: `input` holds the previous token per batch row (`[batch, 1]`).
    pub fn step(
        &self,
        input: &Tensor,
        hidden: &HiddenState,
        encoder_outputs: &Tensor,
    ) -> Result<DecoderStep> {
        let (batch, width) = shape::ids2(input, "decoder input")?;
        shape::expect("decoder input", format!("[{batch}, 1]"), input, width == 1)?;

        let alignment = self.attention.score(hidden.h(), encoder_outputs)?;
        let embedded = self.embedding.forward(input)?.squeeze(1)?;
        let x = Tensor::cat(&[&alignment.context, &embedded], 1)?;

        let hidden = self.cell.step(&x, hidden)?;
        let logits = self.projection.forward(hidden.h())?;

        Ok(DecoderStep {
            logits,
            hidden,
            weights: alignment.weights,
        })
    }
}

impl Decoder for AttentionDecoder {
    fn teacher_forced(&self, encoded: &EncoderOutput, targets: &Tensor) -> Result<TeacherForced> {
        let (batch, time) = shape::ids2(targets, "decoder targets")?;
        shape::expect(
            "decoder targets",
            "at least two positions (start sentinel and one token)",
            targets,
            time >= 2,
        )?;

        let mut input = Tensor::full(self.sentinels.start, (batch, 1), targets.device())?;
        let mut hidden = encoded.state.clone();
        let mut logits = Vec::with_capacity(time - 1);

        for t in 1..time {
            let step = self.step(&input, &hidden, &encoded.outputs)?;
            logits.push(step.logits);
            hidden = step.hidden;
            // ground truth, not the prediction, feeds the next step
            input = targets.narrow(1, t, 1)?;
        }

        Ok(TeacherForced {
            logits: Tensor::stack(&logits, 1)?,
            labels: targets.narrow(1, 1, time - 1)?,
        })
    }

    fn generate(
        &self,
        encoded: &EncoderOutput,
        max_len: usize,
        sampler: &mut TokenSampler,
    ) -> Result<Generation> {
        let (batch, _, _) = shape::dims3(&encoded.outputs, "decoder encoder outputs")?;
        shape::expect("decoder encoder outputs", "a batch of one", &encoded.outputs, batch == 1)?;

        let device = encoded.outputs.device();
        let mut input = Tensor::new(&[[self.sentinels.start]], device)?;
        let mut hidden = encoded.state.clone();
        let mut ids = Vec::with_capacity(max_len);
        let mut attention = Vec::with_capacity(max_len);

        for _ in 0..max_len {
            let step = self.step(&input, &hidden, &encoded.outputs)?;
            attention.push(step.weights.squeeze(0)?.to_vec1::<f32>()?);

            let id = sampler.sample(&step.logits.squeeze(0)?)?;
            ids.push(id);
            if id == self.sentinels.end {
                return Ok(Generation {
                    ids,
                    attention: Some(attention),
                    stop: StopReason::EndSentinel,
                });
            }

            hidden = step.hidden;
            input = Tensor::new(&[[id]], device)?;
        }

        Ok(Generation {
            ids,
            attention: Some(attention),
            stop: StopReason::MaxLength,
        })
    }

    fn masks_padding(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::encoder::RecurrentEncoder;
    use crate::model::sampling::Sampling;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    const SENTINELS: Sentinels = Sentinels { start: 1, end: 2 };

    fn build(varmap: &VarMap) -> (RecurrentEncoder, AttentionDecoder) {
        let vb = VarBuilder::from_varmap(varmap, DType::F32, &Device::Cpu);
        let encoder =
            RecurrentEncoder::new(9, 4, 6, CellKind::Gru, false, vb.pp("encoder")).unwrap();
        let decoder = AttentionDecoder::new(7, 4, 6, SENTINELS, vb.pp("decoder")).unwrap();
        (encoder, decoder)
    }

    fn encode(encoder: &RecurrentEncoder, rows: &[[u32; 4]]) -> EncoderOutput {
        let ids = Tensor::from_vec(rows.concat(), (rows.len(), 4), &Device::Cpu).unwrap();
        let hidden = encoder.initialize_hidden_state(rows.len()).unwrap();
        encoder.forward(&ids, &hidden).unwrap()
    }

    #[test]
    fn test_step_shapes_and_weights() {
        let varmap = VarMap::new();
        let (encoder, decoder) = build(&varmap);
        let encoded = encode(&encoder, &[[1, 3, 4, 2], [1, 5, 2, 0]]);

        let input = Tensor::new(&[[1u32], [1]], &Device::Cpu).unwrap();
        let step = decoder.step(&input, &encoded.state, &encoded.outputs).unwrap();
        assert_eq!(step.logits.dims(), &[2, 7]);
        assert_eq!(step.hidden.h().dims(), &[2, 6]);
        assert_eq!(step.weights.dims(), &[2, 4]);

        for row in step.weights.to_vec2::<f32>().unwrap() {
            assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_teacher_forced_alignment() {
        let varmap = VarMap::new();
        let (encoder, decoder) = build(&varmap);
        let encoded = encode(&encoder, &[[1, 3, 4, 2], [1, 5, 2, 0]]);
        let targets = Tensor::new(&[[1u32, 3, 4, 2, 0], [1, 5, 2, 0, 0]], &Device::Cpu).unwrap();

        let forced = decoder.teacher_forced(&encoded, &targets).unwrap();
        assert_eq!(forced.logits.dims(), &[2, 4, 7]);
        assert_eq!(
            forced.labels.to_vec2::<u32>().unwrap(),
            vec![vec![3, 4, 2, 0], vec![5, 2, 0, 0]]
        );
    }

    #[test]
    fn test_generate_respects_bound() {
        let varmap = VarMap::new();
        let (encoder, decoder) = build(&varmap);
        let encoded = encode(&encoder, &[[1, 3, 4, 2]]);
        let mut sampler = TokenSampler::new(Sampling::Greedy);

        let generation = decoder.generate(&encoded, 5, &mut sampler).unwrap();
        assert!(!generation.ids.is_empty());
        assert!(generation.ids.len() <= 5);
        let attention = generation.attention.unwrap();
        assert_eq!(attention.len(), generation.ids.len());
        assert!(attention.iter().all(|row| row.len() == 4));
        match generation.stop {
            StopReason::EndSentinel => assert_eq!(generation.ids.last(), Some(&SENTINELS.end)),
            StopReason::MaxLength => assert_eq!(generation.ids.len(), 5),
            StopReason::Padding => panic!("attention decoder never stops on padding"),
        }
    }

    #[test]
    fn test_generate_requires_single_sentence() {
        let varmap = VarMap::new();
        let (encoder, decoder) = build(&varmap);
        let encoded = encode(&encoder, &[[1, 3, 4, 2], [1, 5, 2, 0]]);
        let mut sampler = TokenSampler::new(Sampling::Greedy);
        assert!(decoder.generate(&encoded, 5, &mut sampler).is_err());
    }
}
