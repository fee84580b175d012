use anyhow::{ensure, Result};
use candle_core::{DType, Tensor};

/// Mean of the unmasked token states, L2-normalized: `[B,T,H]` + `[B,T]` -> `[B,H]`.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let dims = hidden.dims();
    ensure!(dims.len() == 3, "hidden shape must be [B,T,H], got {dims:?}");
    let (batch, hidden_dim) = (dims[0], dims[2]);

    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?;
    let mask_3d = mask.unsqueeze(2)?.broadcast_as(hidden.shape())?;
    let sum = (hidden * &mask_3d)?.sum(1)?;
    // an all-padding row would divide by zero
    let lengths = mask.sum_keepdim(1)?.clamp(1.0, f64::MAX)?;
    let mean = sum.broadcast_div(&lengths)?;

    let eps = match hidden.dtype() {
        DType::F16 | DType::BF16 => 1e-6,
        _ => 1e-12,
    };
    let norm = (mean.sqr()?.sum_keepdim(1)?.sqrt()? + eps)?;
    let out = mean.broadcast_div(&norm)?;
    ensure!(out.dims() == [batch, hidden_dim], "pooled shape {:?}", out.dims());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn padding_rows_are_ignored_per_item() {
        let dev = Device::Cpu;
        // item 0: two real tokens; item 1: one real token then padding
        let h = Tensor::from_slice(
            &[1.0f32, 0.0, 3.0, 0.0, 0.0, 4.0, 9.0, 9.0],
            (2, 2, 2),
            &dev,
        )
        .unwrap();
        let mask = Tensor::from_slice(&[1f32, 1.0, 1.0, 0.0], (2, 2), &dev).unwrap();
        let out: Vec<Vec<f32>> = masked_mean_l2(&h, &mask).unwrap().to_vec2().unwrap();
        // item 0 mean [2,0] -> [1,0]; item 1 mean [0,4] -> [0,1]
        assert!((out[0][0] - 1.0).abs() < 1e-5 && out[0][1].abs() < 1e-5);
        assert!(out[1][0].abs() < 1e-5 && (out[1][1] - 1.0).abs() < 1e-5);
    }
}
