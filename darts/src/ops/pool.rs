use candle_core::Tensor;

use super::{FeatureShape, subsample};
use crate::Result;

/// Output shape of a 3x3 window with padding 1 and the given stride.
fn pooled(input: FeatureShape, stride: usize) -> FeatureShape {
    input.strided(stride)
}

/// The `none` operation: a zero tensor with the strided shape of the input.
#[derive(Debug, Clone, Copy)]
pub struct Zero {
    stride: usize,
}

impl Zero {
    pub fn new(stride: usize) -> Self {
        Self { stride }
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let x = subsample(&subsample(x, 2, self.stride)?, 3, self.stride)?;
        Ok(x.zeros_like()?)
    }

    pub fn output(&self, input: FeatureShape) -> FeatureShape {
        input.strided(self.stride)
    }
}

/// 3x3 average pooling with padding 1, averaging only over the in-bounds pixels.
#[derive(Debug, Clone, Copy)]
pub struct AvgPool {
    stride: usize,
}

impl AvgPool {
    pub fn new(stride: usize) -> Self {
        Self { stride }
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let (_, _, h, w) = x.dims4()?;
        let s = self.stride;

        let sums = x
            .pad_with_zeros(2, 1, 1)?
            .pad_with_zeros(3, 1, 1)?
            .avg_pool2d_with_stride(3, s)?;

        // Share of each window that falls inside the image.
        let coverage = Tensor::ones((1, 1, h, w), x.dtype(), x.device())?
            .pad_with_zeros(2, 1, 1)?
            .pad_with_zeros(3, 1, 1)?
            .avg_pool2d_with_stride(3, s)?;

        Ok(sums.broadcast_div(&coverage)?)
    }

    pub fn output(&self, input: FeatureShape) -> FeatureShape {
        pooled(input, self.stride)
    }
}

/// 3x3 max pooling with padding 1.
#[derive(Debug, Clone, Copy)]
pub struct MaxPool {
    stride: usize,
}

impl MaxPool {
    pub fn new(stride: usize) -> Self {
        Self { stride }
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        // Every window already contains the border pixel, so replicating it acts as -inf padding.
        let padded = x.pad_with_same(2, 1, 1)?.pad_with_same(3, 1, 1)?;
        Ok(padded.max_pool2d_with_stride(3, self.stride)?)
    }

    pub fn output(&self, input: FeatureShape) -> FeatureShape {
        pooled(input, self.stride)
    }
}

#[cfg(test)]
mod tests {
    use candle_core::{Device, Tensor};

    use super::*;

    fn grid() -> Tensor {
        Tensor::arange(0f32, 16., &Device::Cpu)
            .unwrap()
            .reshape((1, 1, 4, 4))
            .unwrap()
    }

    #[test]
    fn avg_pool_excludes_padding() {
        let out = AvgPool::new(1).forward(&grid()).unwrap();
        let out = out.flatten_all().unwrap().to_vec1::<f32>().unwrap();

        // Corner window covers 0, 1, 4, 5.
        assert!((out[0] - 2.5).abs() < 1e-5);
        // Interior window covers 0..=2, 4..=6, 8..=10.
        assert!((out[5] - 5.0).abs() < 1e-5);
    }

    #[test]
    fn max_pool_with_stride_halves_resolution() {
        let out = MaxPool::new(2).forward(&grid()).unwrap();
        assert_eq!(out.dims4().unwrap(), (1, 1, 2, 2));

        let out = out.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(out, [5., 7., 13., 15.]);
    }

    #[test]
    fn zero_subsamples_and_clears() {
        let out = Zero::new(2).forward(&grid()).unwrap();
        assert_eq!(out.dims4().unwrap(), (1, 1, 2, 2));
        assert_eq!(out.sum_all().unwrap().to_scalar::<f32>().unwrap(), 0.);
    }
}
