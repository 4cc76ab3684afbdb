mod conv;
mod pool;

use candle_core::Tensor;
use candle_nn::VarBuilder;

pub use conv::{ConvPair, ConvUnit, DilConv, FactorizedReduce, Norm, ReluConvBn, SepConv};
pub use pool::{AvgPool, MaxPool, Zero};

use crate::{Result, genotype::Op};

/// Channels and spatial size of a single feature map, without the batch dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureShape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl FeatureShape {
    pub fn new(channels: usize, height: usize, width: usize) -> Self {
        Self {
            channels,
            height,
            width,
        }
    }

    /// The shape left after a stride `s` window with "same" padding.
    pub fn strided(self, s: usize) -> Self {
        Self::new(self.channels, self.height.div_ceil(s), self.width.div_ceil(s))
    }

    pub fn elems(&self) -> usize {
        self.channels * self.height * self.width
    }
}

/// Keeps every `stride`-th element of `x` along `dim`, starting at the first.
pub(crate) fn subsample(x: &Tensor, dim: usize, stride: usize) -> Result<Tensor> {
    if stride == 1 {
        return Ok(x.clone());
    }

    let len = x.dim(dim)?;
    let idx = Tensor::arange_step(0u32, len as u32, stride as u32, x.device())?;
    Ok(x.index_select(&idx, dim)?)
}

/// A mixed-edge operation, instantiated from an `Op` for a given channel count and stride.
#[derive(Debug, Clone)]
pub enum Operation {
    Zero(Zero),
    Identity,
    AvgPool(AvgPool),
    MaxPool(MaxPool),
    FactorizedReduce(FactorizedReduce),
    SepConv(SepConv),
    DilConv(DilConv),
    ConvPair(ConvPair),
}

impl Operation {
    /// Builds the operation named by `op`.
    ///
    /// # Arguments
    /// * `op` - Which operation to build.
    /// * `channels` - Input and output channels of the edge.
    /// * `stride` - 2 on the input edges of a reduction cell, 1 otherwise.
    /// * `vb` - Where the operation's parameters live.
    ///
    /// # Errors
    /// Returns an error if a parameter is missing or has the wrong shape.
    pub fn new(op: Op, channels: usize, stride: usize, vb: VarBuilder) -> Result<Self> {
        let c = channels;
        let operation = match op {
            Op::None => Self::Zero(Zero::new(stride)),
            Op::AvgPool3x3 => Self::AvgPool(AvgPool::new(stride)),
            Op::MaxPool3x3 => Self::MaxPool(MaxPool::new(stride)),
            Op::SkipConnect if stride == 1 => Self::Identity,
            Op::SkipConnect => Self::FactorizedReduce(FactorizedReduce::new(c, c, vb)?),
            Op::SepConv3x3 => Self::SepConv(SepConv::new(c, c, 3, stride, 1, vb)?),
            Op::SepConv5x5 => Self::SepConv(SepConv::new(c, c, 5, stride, 2, vb)?),
            Op::SepConv7x7 => Self::SepConv(SepConv::new(c, c, 7, stride, 3, vb)?),
            Op::DilConv3x3 => Self::DilConv(DilConv::new(c, c, 3, stride, 2, 2, vb)?),
            Op::DilConv5x5 => Self::DilConv(DilConv::new(c, c, 5, stride, 4, 2, vb)?),
            Op::Conv7x1And1x7 => Self::ConvPair(ConvPair::new(c, stride, vb)?),
        };

        Ok(operation)
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        match self {
            Self::Zero(op) => op.forward(x),
            Self::Identity => Ok(x.clone()),
            Self::AvgPool(op) => op.forward(x),
            Self::MaxPool(op) => op.forward(x),
            Self::FactorizedReduce(op) => op.forward(x),
            Self::SepConv(op) => op.forward(x),
            Self::DilConv(op) => op.forward(x),
            Self::ConvPair(op) => op.forward(x),
        }
    }

    /// Returns the multiply-accumulates of running the operation on `input`, and its output
    /// shape. Only convolutions count.
    pub fn profile(&self, input: FeatureShape) -> (u64, FeatureShape) {
        match self {
            Self::Zero(op) => (0, op.output(input)),
            Self::Identity => (0, input),
            Self::AvgPool(op) => (0, op.output(input)),
            Self::MaxPool(op) => (0, op.output(input)),
            Self::FactorizedReduce(op) => op.profile(input),
            Self::SepConv(op) => op.profile(input),
            Self::DilConv(op) => op.profile(input),
            Self::ConvPair(op) => op.profile(input),
        }
    }

    pub fn num_params(&self) -> usize {
        match self {
            Self::Zero(_) | Self::Identity | Self::AvgPool(_) | Self::MaxPool(_) => 0,
            Self::FactorizedReduce(op) => op.num_params(),
            Self::SepConv(op) => op.num_params(),
            Self::DilConv(op) => op.num_params(),
            Self::ConvPair(op) => op.num_params(),
        }
    }

    /// Whether this is the identity, which drop path leaves untouched.
    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity)
    }
}
