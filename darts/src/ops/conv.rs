use candle_core::{ModuleT, Tensor};
use candle_nn::{BatchNorm, Conv2d, Conv2dConfig, VarBuilder, batch_norm, conv2d_no_bias};

use super::{FeatureShape, subsample};
use crate::{DartsErr, Result};

pub(crate) const BN_EPS: f64 = 1e-5;

/// A bias-free square convolution that remembers its geometry so it can be profiled without
/// running it.
#[derive(Debug, Clone)]
pub struct ConvUnit {
    conv: Conv2d,
    c_out: usize,
    c_in: usize,
    kernel: usize,
    cfg: Conv2dConfig,
}

impl ConvUnit {
    pub fn new(
        c_in: usize,
        c_out: usize,
        kernel: usize,
        cfg: Conv2dConfig,
        vb: VarBuilder,
    ) -> Result<Self> {
        let conv = conv2d_no_bias(c_in, c_out, kernel, cfg, vb)?;
        Ok(Self {
            conv,
            c_out,
            c_in,
            kernel,
            cfg,
        })
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        Ok(x.apply(&self.conv)?)
    }

    pub fn output(&self, input: FeatureShape) -> FeatureShape {
        let Conv2dConfig {
            padding,
            stride,
            dilation,
            ..
        } = self.cfg;
        let out = |size: usize| (size + 2 * padding - dilation * (self.kernel - 1) - 1) / stride + 1;

        FeatureShape::new(self.c_out, out(input.height), out(input.width))
    }

    /// Multiply-accumulates needed to convolve an input of the given shape.
    pub fn macs(&self, input: FeatureShape) -> u64 {
        let out = self.output(input);
        let per_output = (self.c_in / self.cfg.groups) * self.kernel * self.kernel;
        (out.elems() * per_output) as u64
    }

    pub fn num_params(&self) -> usize {
        self.conv.weight().elem_count()
    }
}

/// Batch normalization always evaluated with its running statistics.
#[derive(Debug, Clone)]
pub struct Norm {
    bn: BatchNorm,
}

impl Norm {
    pub fn new(channels: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            bn: batch_norm(channels, BN_EPS, vb)?,
        })
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        Ok(self.bn.forward_t(x, false)?)
    }

    pub fn num_params(&self) -> usize {
        self.bn
            .weight_and_bias()
            .map(|(w, b)| w.elem_count() + b.elem_count())
            .unwrap_or_default()
    }
}

fn square(stride: usize, padding: usize) -> Conv2dConfig {
    Conv2dConfig {
        stride,
        padding,
        ..Default::default()
    }
}

/// `relu -> conv -> bn`, used for cell preprocessing.
#[derive(Debug, Clone)]
pub struct ReluConvBn {
    conv: ConvUnit,
    bn: Norm,
}

impl ReluConvBn {
    pub fn new(
        c_in: usize,
        c_out: usize,
        kernel: usize,
        stride: usize,
        padding: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        let conv = ConvUnit::new(c_in, c_out, kernel, square(stride, padding), vb.pp("op.1"))?;
        let bn = Norm::new(c_out, vb.pp("op.2"))?;
        Ok(Self { conv, bn })
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        self.bn.forward(&self.conv.forward(&x.relu()?)?)
    }

    pub fn profile(&self, input: FeatureShape) -> (u64, FeatureShape) {
        (self.conv.macs(input), self.conv.output(input))
    }

    pub fn num_params(&self) -> usize {
        self.conv.num_params() + self.bn.num_params()
    }
}

/// `relu -> depthwise dilated conv -> pointwise conv -> bn`.
#[derive(Debug, Clone)]
pub struct DilConv {
    depthwise: ConvUnit,
    pointwise: ConvUnit,
    bn: Norm,
}

impl DilConv {
    pub fn new(
        c_in: usize,
        c_out: usize,
        kernel: usize,
        stride: usize,
        padding: usize,
        dilation: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        let dw_cfg = Conv2dConfig {
            stride,
            padding,
            dilation,
            groups: c_in,
            ..Default::default()
        };
        let depthwise = ConvUnit::new(c_in, c_in, kernel, dw_cfg, vb.pp("op.1"))?;
        let pointwise = ConvUnit::new(c_in, c_out, 1, square(1, 0), vb.pp("op.2"))?;
        let bn = Norm::new(c_out, vb.pp("op.3"))?;

        Ok(Self {
            depthwise,
            pointwise,
            bn,
        })
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let x = self.depthwise.forward(&x.relu()?)?;
        self.bn.forward(&self.pointwise.forward(&x)?)
    }

    pub fn profile(&self, input: FeatureShape) -> (u64, FeatureShape) {
        let mid = self.depthwise.output(input);
        let macs = self.depthwise.macs(input) + self.pointwise.macs(mid);
        (macs, self.pointwise.output(mid))
    }

    pub fn num_params(&self) -> usize {
        self.depthwise.num_params() + self.pointwise.num_params() + self.bn.num_params()
    }
}

/// Two stacked depthwise-separable convolutions, only the first one strided.
#[derive(Debug, Clone)]
pub struct SepConv {
    first: DilConv,
    second: DilConv,
}

impl SepConv {
    pub fn new(
        c_in: usize,
        c_out: usize,
        kernel: usize,
        stride: usize,
        padding: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        // Checkpoint layout: op.1/op.2/op.3 for the first half, op.5/op.6/op.7 for the second.
        let first = DilConv::new(c_in, c_in, kernel, stride, padding, 1, vb.clone())?;
        let second = DilConv {
            depthwise: ConvUnit::new(
                c_in,
                c_in,
                kernel,
                Conv2dConfig {
                    padding,
                    groups: c_in,
                    ..Default::default()
                },
                vb.pp("op.5"),
            )?,
            pointwise: ConvUnit::new(c_in, c_out, 1, square(1, 0), vb.pp("op.6"))?,
            bn: Norm::new(c_out, vb.pp("op.7"))?,
        };

        Ok(Self { first, second })
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        self.second.forward(&self.first.forward(x)?)
    }

    pub fn profile(&self, input: FeatureShape) -> (u64, FeatureShape) {
        let (first, mid) = self.first.profile(input);
        let (second, out) = self.second.profile(mid);
        (first + second, out)
    }

    pub fn num_params(&self) -> usize {
        self.first.num_params() + self.second.num_params()
    }
}

/// Halves the resolution with two offset 1x1 convolutions whose outputs are concatenated.
#[derive(Debug, Clone)]
pub struct FactorizedReduce {
    conv_1: ConvUnit,
    conv_2: ConvUnit,
    bn: Norm,
}

impl FactorizedReduce {
    pub fn new(c_in: usize, c_out: usize, vb: VarBuilder) -> Result<Self> {
        if c_out % 2 != 0 {
            return Err(DartsErr::InvalidConfig(format!(
                "factorized reduce needs an even number of output channels, got {c_out}"
            )));
        }

        let conv_1 = ConvUnit::new(c_in, c_out / 2, 1, square(2, 0), vb.pp("conv_1"))?;
        let conv_2 = ConvUnit::new(c_in, c_out / 2, 1, square(2, 0), vb.pp("conv_2"))?;
        let bn = Norm::new(c_out, vb.pp("bn"))?;

        Ok(Self { conv_1, conv_2, bn })
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let x = x.relu()?;
        let (_, _, h, w) = x.dims4()?;
        let shifted = x.narrow(2, 1, h - 1)?.narrow(3, 1, w - 1)?;

        let out = Tensor::cat(
            &[self.conv_1.forward(&x)?, self.conv_2.forward(&shifted)?],
            1,
        )?;
        self.bn.forward(&out)
    }

    pub fn profile(&self, input: FeatureShape) -> (u64, FeatureShape) {
        let shifted = FeatureShape::new(input.channels, input.height - 1, input.width - 1);
        let half = self.conv_1.output(input);
        let macs = self.conv_1.macs(input) + self.conv_2.macs(shifted);
        (macs, FeatureShape::new(2 * half.channels, half.height, half.width))
    }

    pub fn num_params(&self) -> usize {
        self.conv_1.num_params() + self.conv_2.num_params() + self.bn.num_params()
    }
}

/// `relu -> 1x7 conv -> 7x1 conv -> bn`, strided along one axis per convolution.
#[derive(Debug, Clone)]
pub struct ConvPair {
    w_1x7: Tensor,
    w_7x1: Tensor,
    bn: Norm,
    channels: usize,
    stride: usize,
}

impl ConvPair {
    pub fn new(channels: usize, stride: usize, vb: VarBuilder) -> Result<Self> {
        let w_1x7 = vb.pp("op.1").get((channels, channels, 1, 7), "weight")?;
        let w_7x1 = vb.pp("op.2").get((channels, channels, 7, 1), "weight")?;
        let bn = Norm::new(channels, vb.pp("op.3"))?;

        Ok(Self {
            w_1x7,
            w_7x1,
            bn,
            channels,
            stride,
        })
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        // Non-square padding and strides are expressed as explicit padding plus subsampling.
        let x = x.relu()?.pad_with_zeros(3, 3, 3)?;
        let x = subsample(&x.conv2d(&self.w_1x7, 0, 1, 1, 1)?, 3, self.stride)?;

        let x = x.pad_with_zeros(2, 3, 3)?;
        let x = subsample(&x.conv2d(&self.w_7x1, 0, 1, 1, 1)?, 2, self.stride)?;

        self.bn.forward(&x)
    }

    pub fn profile(&self, input: FeatureShape) -> (u64, FeatureShape) {
        let wide = FeatureShape::new(self.channels, input.height, input.width.div_ceil(self.stride));
        let out = FeatureShape::new(self.channels, wide.height.div_ceil(self.stride), wide.width);
        let per_output = (self.channels * 7) as u64;
        (
            (wide.elems() + out.elems()) as u64 * per_output,
            out,
        )
    }

    pub fn num_params(&self) -> usize {
        self.w_1x7.elem_count() + self.w_7x1.elem_count() + self.bn.num_params()
    }
}
