//! Shape checks applied where tensors cross component boundaries.

use candle_core::{DType, Tensor};

use crate::error::{Result, RosettaError};

pub(crate) fn dims2(tensor: &Tensor, context: &'static str) -> Result<(usize, usize)> {
    match *tensor.dims() {
        [a, b] => Ok((a, b)),
        _ => Err(mismatch(context, "[batch, n]", tensor)),
    }
}

pub(crate) fn dims3(tensor: &Tensor, context: &'static str) -> Result<(usize, usize, usize)> {
    match *tensor.dims() {
        [a, b, c] => Ok((a, b, c)),
        _ => Err(mismatch(context, "[batch, time, n]", tensor)),
    }
}

pub(crate) fn ids2(tensor: &Tensor, context: &'static str) -> Result<(usize, usize)> {
    if tensor.dtype() != DType::U32 {
        return Err(RosettaError::ShapeMismatch {
            context,
            expected: format!("u32 token ids, got {:?}", tensor.dtype()),
            actual: tensor.dims().to_vec(),
        });
    }
    dims2(tensor, context)
}

pub(crate) fn expect(
    context: &'static str,
    expected: impl Into<String>,
    tensor: &Tensor,
    ok: bool,
) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(RosettaError::ShapeMismatch {
            context,
            expected: expected.into(),
            actual: tensor.dims().to_vec(),
        })
    }
}

fn mismatch(context: &'static str, expected: &str, tensor: &Tensor) -> RosettaError {
    RosettaError::ShapeMismatch {
        context,
        expected: expected.to_string(),
        actual: tensor.dims().to_vec(),
    }
}
