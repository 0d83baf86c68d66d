//! # Sequence-to-Sequence Model
//!
//! Owns the shared encoder and one of the two decoder strategies, and exposes
//! the operations the training loop and translator need.

use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;

use crate::error::{Result, RosettaError};
use crate::model::config::{Architecture, Seq2SeqConfig};
use crate::model::decoder::{
    AttentionDecoder, Decoder, Generation, RepeatVectorDecoder, TeacherForced,
};
use crate::model::encoder::{EncoderOutput, RecurrentEncoder};
use crate::model::loss;
use crate::model::sampling::TokenSampler;
use crate::model::shape;
use crate::text::END_TOKEN;

pub struct Seq2Seq {
    config: Seq2SeqConfig,
    encoder: RecurrentEncoder,
    decoder: Box<dyn Decoder>,
    device: Device,
}

impl Seq2Seq {
    /// Creates (or, with a loaded `VarMap`, restores) the model parameters.
    pub fn new(config: Seq2SeqConfig, vb: VarBuilder) -> Result<Self> {
        let architecture = config.architecture;
        let encoder = RecurrentEncoder::new(
            config.source_vocab_size,
            config.embedding_dim,
            config.hidden_units,
            architecture.cell(),
            architecture.masks_source_padding(),
            vb.pp("encoder"),
        )?;

        let decoder: Box<dyn Decoder> = match architecture {
            Architecture::Attention => {
                let sentinels = config.sentinels.ok_or(RosettaError::MissingSentinel(END_TOKEN))?;
                Box::new(AttentionDecoder::new(
                    config.target_vocab_size,
                    config.embedding_dim,
                    config.hidden_units,
                    sentinels,
                    vb.pp("decoder"),
                )?)
            }
            Architecture::Vanilla => Box::new(RepeatVectorDecoder::new(
                config.target_vocab_size,
                config.hidden_units,
                config.target_len,
                vb.pp("decoder"),
            )?),
        };

        Ok(Self {
            device: vb.device().clone(),
            config,
            encoder,
            decoder,
        })
    }

    pub fn config(&self) -> &Seq2SeqConfig {
        &self.config
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn masks_padding(&self) -> bool {
        self.decoder.masks_padding()
    }

    /// Encodes a `[batch, source_len]` batch from a zero hidden state.
    pub fn encode(&self, source: &Tensor) -> Result<EncoderOutput> {
        let (batch, width) = shape::ids2(source, "model source")?;
        shape::expect(
            "model source",
            format!("[batch, {}]", self.config.source_len),
            source,
            width == self.config.source_len,
        )?;
        let hidden = self.encoder.initialize_hidden_state(batch)?;
        self.encoder.forward(source, &hidden)
    }

    /// Teacher-forced logits for a source/target batch.
    pub fn teacher_forced(&self, source: &Tensor, target: &Tensor) -> Result<TeacherForced> {
        let (source_batch, _) = shape::ids2(source, "model source")?;
        let (target_batch, _) = shape::ids2(target, "model target")?;
        shape::expect(
            "model target",
            format!("batch of {source_batch}"),
            target,
            source_batch == target_batch,
        )?;

        let encoded = self.encode(source)?;
        self.decoder.teacher_forced(&encoded, target)
    }

    /// Training loss of a batch, masked on padding when the decoder asks for it.
    pub fn loss(&self, source: &Tensor, target: &Tensor) -> Result<Tensor> {
        let forced = self.teacher_forced(source, target)?;
        self.loss_of(&forced)
    }

    pub fn loss_of(&self, forced: &TeacherForced) -> Result<Tensor> {
        if self.masks_padding() {
            loss::masked_cross_entropy(&forced.logits, &forced.labels)
        } else {
            loss::cross_entropy(&forced.logits, &forced.labels)
        }
    }

    /// Autoregressively decodes a `[1, source_len]` sentence.
    pub fn generate(&self, source: &Tensor, sampler: &mut TokenSampler) -> Result<Generation> {
        let encoded = self.encode(source)?;
        self.decoder
            .generate(&encoded, self.config.target_len, sampler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config::Sentinels;
    use crate::model::decoder::StopReason;
    use crate::model::sampling::Sampling;
    use candle_core::DType;
    use candle_nn::VarMap;

    fn config(architecture: Architecture) -> Seq2SeqConfig {
        Seq2SeqConfig {
            architecture,
            source_vocab_size: 8,
            target_vocab_size: 7,
            embedding_dim: 4,
            hidden_units: 6,
            source_len: 4,
            target_len: 5,
            sentinels: Some(Sentinels { start: 1, end: 2 }),
        }
    }

    fn batch() -> (Tensor, Tensor) {
        let source = Tensor::new(&[[1u32, 4, 5, 2], [1, 6, 2, 0]], &Device::Cpu).unwrap();
        let target = Tensor::new(&[[1u32, 3, 4, 2, 0], [1, 5, 2, 0, 0]], &Device::Cpu).unwrap();
        (source, target)
    }

    #[test]
    fn test_both_architectures_produce_finite_loss() {
        for architecture in [Architecture::Attention, Architecture::Vanilla] {
            let varmap = VarMap::new();
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
            let model = Seq2Seq::new(config(architecture), vb).unwrap();
            let (source, target) = batch();

            let loss = model.loss(&source, &target).unwrap().to_scalar::<f32>().unwrap();
            assert!(loss.is_finite() && loss > 0.0, "{architecture}: {loss}");
            assert_eq!(model.masks_padding(), architecture == Architecture::Attention);
        }
    }

    #[test]
    fn test_attention_requires_sentinels() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let mut config = config(Architecture::Attention);
        config.sentinels = None;
        assert!(matches!(
            Seq2Seq::new(config, vb),
            Err(RosettaError::MissingSentinel(_))
        ));
    }

    #[test]
    fn test_rejects_mismatched_batches() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let model = Seq2Seq::new(config(Architecture::Attention), vb).unwrap();
        let (source, target) = batch();
        let one = target.narrow(0, 0, 1).unwrap();
        assert!(model.loss(&source, &one).is_err());

        let narrow = source.narrow(1, 0, 3).unwrap();
        assert!(model.loss(&narrow, &target).is_err());
    }

    #[test]
    fn test_generate_bounded_by_target_len() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let model = Seq2Seq::new(config(Architecture::Attention), vb).unwrap();
        let source = Tensor::new(&[[1u32, 4, 5, 2]], &Device::Cpu).unwrap();
        let mut sampler = TokenSampler::new(Sampling::default());

        let generation = model.generate(&source, &mut sampler).unwrap();
        assert!(generation.ids.len() <= 5);
        if generation.stop == StopReason::MaxLength {
            assert_eq!(generation.ids.len(), 5);
        }
    }
}
