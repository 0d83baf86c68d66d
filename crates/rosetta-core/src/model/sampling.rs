use candle_core::{DType, Tensor};
use candle_transformers::generation::LogitsProcessor;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How the next token is picked from a logit vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Sampling {
    /// Arg-max.
    Greedy,
    /// Draw from `softmax(logits / temperature)`.
    Multinomial { seed: u64, temperature: f64 },
}

impl Default for Sampling {
    fn default() -> Self {
        Self::Multinomial {
            seed: 299_792_458,
            temperature: 1.0,
        }
    }
}

/// Stateful token picker.
pub struct TokenSampler {
    processor: LogitsProcessor,
}

impl TokenSampler {
    pub fn new(sampling: Sampling) -> Self {
        let processor = match sampling {
            Sampling::Greedy => LogitsProcessor::new(0, None, None),
            Sampling::Multinomial { seed, temperature } => {
                LogitsProcessor::new(seed, Some(temperature), None)
            }
        };
        Self { processor }
    }

    /// Picks one id from a `[vocab]` logit vector.
    pub fn sample(&mut self, logits: &Tensor) -> Result<u32> {
        let logits = logits.to_dtype(DType::F32)?;
        Ok(self.processor.sample(&logits)?)
    }
}
