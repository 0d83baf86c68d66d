//! Cross-entropy losses and token accuracy over `[.., vocab]` logits.

use candle_core::{D, DType, Tensor};

use crate::error::Result;
use crate::model::shape;
use crate::vocab::PAD_ID;

/// Flattens `[.., vocab]` logits to `[n, vocab]` and labels to `[n]`.
fn flatten(logits: &Tensor, labels: &Tensor) -> Result<(Tensor, Tensor)> {
    let vocab = logits.dim(D::Minus1)?;
    let n = labels.elem_count();
    shape::expect(
        "loss logits",
        format!("{n} rows of {vocab} classes"),
        logits,
        logits.elem_count() == n * vocab,
    )?;
    let logits = logits.contiguous()?.reshape((n, vocab))?;
    let labels = labels.contiguous()?.flatten_all()?;
    Ok((logits, labels))
}

/// Cross-entropy that ignores positions labelled with padding.
///
/// The sum over non-padding positions is divided by their count, so a
/// padded position changes neither the value nor the gradient. A batch of
/// padding only yields zero.
pub fn masked_cross_entropy(logits: &Tensor, labels: &Tensor) -> Result<Tensor> {
    let (logits, labels) = flatten(logits, labels)?;
    let log_probs = candle_nn::ops::log_softmax(&logits, D::Minus1)?;
    let picked = log_probs.gather(&labels.unsqueeze(1)?, 1)?.squeeze(1)?;

    let mask = labels.ne(PAD_ID)?.to_dtype(picked.dtype())?;
    let count = mask.sum_all()?.to_dtype(DType::F32)?.to_scalar::<f32>()?;
    let total = picked.neg()?.mul(&mask)?.sum_all()?;
    Ok(total.affine(1.0 / f64::from(count.max(1.0)), 0.0)?)
}

/// Mean cross-entropy over every position, padding included.
pub fn cross_entropy(logits: &Tensor, labels: &Tensor) -> Result<Tensor> {
    let (logits, labels) = flatten(logits, labels)?;
    Ok(candle_nn::loss::cross_entropy(&logits, &labels)?)
}

/// Correct and counted predictions of an arg-max over the last axis.
pub fn token_accuracy(
    logits: &Tensor,
    labels: &Tensor,
    mask_padding: bool,
) -> Result<(usize, usize)> {
    let (logits, labels) = flatten(logits, labels)?;
    let predicted = logits.argmax(D::Minus1)?;
    let hits = predicted.eq(&labels)?.to_dtype(DType::F32)?;

    if mask_padding {
        let mask = labels.ne(PAD_ID)?.to_dtype(DType::F32)?;
        let correct = hits.mul(&mask)?.sum_all()?.to_scalar::<f32>()?;
        let total = mask.sum_all()?.to_scalar::<f32>()?;
        Ok((correct.round() as usize, total.round() as usize))
    } else {
        let correct = hits.sum_all()?.to_scalar::<f32>()?;
        Ok((correct.round() as usize, labels.elem_count()))
    }
}
