//! # Decoders
//!
//! Two decoding strategies behind one trait:
//!
//! - [`AttentionDecoder`]: one GRU step per target token, each step reading
//!   an attention context over all encoder outputs.
//! - [`RepeatVectorDecoder`]: the encoder's final hidden vector is fed to an
//!   LSTM at every target position and the whole sequence is produced in a
//!   single pass, with no access to per-step encoder outputs.

mod attentive;
mod repeat;

pub use attentive::{AttentionDecoder, DecoderStep};
pub use repeat::RepeatVectorDecoder;

use candle_core::Tensor;

use crate::error::Result;
use crate::model::encoder::EncoderOutput;
use crate::model::sampling::TokenSampler;

/// Logits aligned with the labels they are scored against.
#[derive(Debug, Clone)]
pub struct TeacherForced {
    /// `[batch, steps, vocab]`
    pub logits: Tensor,
    /// `[batch, steps]`
    pub labels: Tensor,
}

/// Why autoregressive decoding stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// The end sentinel was produced.
    EndSentinel,
    /// Padding was predicted (vanilla variant).
    Padding,
    /// The target length bound was reached.
    MaxLength,
}

/// Output of decoding one source sentence.
#[derive(Debug, Clone)]
pub struct Generation {
    /// Predicted ids, including the end sentinel when it was produced.
    pub ids: Vec<u32>,
    /// One row of source-position weights per produced id.
    pub attention: Option<Vec<Vec<f32>>>,
    pub stop: StopReason,
}

/// Common interface of the decoding strategies.
pub trait Decoder {
    /// Target-side logits for a whole batch given the ground-truth targets.
    fn teacher_forced(&self, encoded: &EncoderOutput, targets: &Tensor) -> Result<TeacherForced>;

    /// Decodes a single sentence (batch of one), at most `max_len` ids.
    fn generate(
        &self,
        encoded: &EncoderOutput,
        max_len: usize,
        sampler: &mut TokenSampler,
    ) -> Result<Generation>;

    /// Whether padding labels are excluded from the loss.
    fn masks_padding(&self) -> bool;
}
