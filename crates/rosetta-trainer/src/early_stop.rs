//! Epoch-level early stopping.

use serde::{Deserialize, Serialize};

/// How non-improving epochs are counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StallCounting {
    /// Compare against the last loss that improved by at least `min_delta`;
    /// such an improvement resets the counter.
    #[default]
    Consecutive,
    /// Compare against the previous epoch (starting from 0) and never reset.
    Cumulative,
}

/// Outcome of recording one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochVerdict {
    /// Loss is the lowest seen so far.
    pub new_best: bool,
    /// Epoch counted as non-improving.
    pub stalled: bool,
    /// Patience is exhausted.
    pub stop: bool,
}

#[derive(Debug, Clone)]
pub struct EarlyStopping {
    min_delta: f64,
    patience: usize,
    counting: StallCounting,
    best: Option<f64>,
    baseline: Option<f64>,
    previous: f64,
    stalls: usize,
}

impl EarlyStopping {
    pub fn new(min_delta: f64, patience: usize, counting: StallCounting) -> Self {
        Self {
            min_delta,
            patience,
            counting,
            best: None,
            baseline: None,
            previous: 0.0,
            stalls: 0,
        }
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    pub fn stalls(&self) -> usize {
        self.stalls
    }

    /// Records an epoch's monitored loss.
    pub fn record(&mut self, loss: f64) -> EpochVerdict {
        let new_best = self.best.is_none_or(|best| loss < best);

        let stalled = match self.counting {
            StallCounting::Consecutive => {
                let improved = self
                    .baseline
                    .is_none_or(|baseline| baseline - loss >= self.min_delta);
                if improved {
                    self.baseline = Some(loss);
                    self.stalls = 0;
                } else {
                    self.stalls += 1;
                }
                !improved
            }
            StallCounting::Cumulative => {
                let stalled = self.previous - loss < self.min_delta;
                if stalled {
                    self.stalls += 1;
                }
                self.previous = loss;
                stalled
            }
        };

        if new_best {
            self.best = Some(loss);
        }

        EpochVerdict {
            new_best,
            stalled,
            stop: self.stalls >= self.patience,
        }
    }
}
