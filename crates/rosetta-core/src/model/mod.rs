pub mod attention;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod loss;
pub mod sampling;
pub mod seq2seq;
mod shape;
pub mod state;

pub use attention::{Alignment, BahdanauAttention};
pub use config::{Architecture, Sentinels, Seq2SeqConfig};
pub use decoder::{
    AttentionDecoder, Decoder, DecoderStep, Generation, RepeatVectorDecoder, StopReason,
    TeacherForced,
};
pub use encoder::{EncoderOutput, RecurrentEncoder};
pub use sampling::{Sampling, TokenSampler};
pub use seq2seq::Seq2Seq;
pub use state::{CellKind, HiddenState, RecurrentCell};
