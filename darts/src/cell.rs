use candle_core::Tensor;
use candle_nn::VarBuilder;

use crate::{
    Result,
    genotype::Genotype,
    ops::{FactorizedReduce, FeatureShape, Operation, ReluConvBn},
};

/// Adapts the cell's first input to the cell's channel count.
#[derive(Debug, Clone)]
enum Preprocess {
    Reduce(FactorizedReduce),
    Conv(ReluConvBn),
}

impl Preprocess {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        match self {
            Preprocess::Reduce(p) => p.forward(x),
            Preprocess::Conv(p) => p.forward(x),
        }
    }

    fn profile(&self, input: FeatureShape) -> (u64, FeatureShape) {
        match self {
            Preprocess::Reduce(p) => p.profile(input),
            Preprocess::Conv(p) => p.profile(input),
        }
    }

    fn num_params(&self) -> usize {
        match self {
            Preprocess::Reduce(p) => p.num_params(),
            Preprocess::Conv(p) => p.num_params(),
        }
    }
}

/// Channel counts a cell is built with.
#[derive(Debug, Clone, Copy)]
pub struct CellChannels {
    /// Channels of the output of the cell two positions back.
    pub prev_prev: usize,
    /// Channels of the output of the previous cell.
    pub prev: usize,
    /// Channels of every state inside this cell.
    pub current: usize,
}

/// A cell of the evaluation network: two preprocessed inputs feeding a DAG of operation pairs,
/// whose selected states are concatenated along the channel axis.
#[derive(Debug, Clone)]
pub struct Cell {
    preprocess0: Preprocess,
    preprocess1: ReluConvBn,
    ops: Vec<Operation>,
    indices: Vec<usize>,
    concat: Vec<usize>,
    channels: usize,
    reduction: bool,
}

impl Cell {
    /// Builds a cell from a genotype.
    ///
    /// # Arguments
    /// * `genotype` - The architecture to instantiate.
    /// * `channels` - Input and inner channel counts.
    /// * `reduction` - Whether this cell halves the resolution.
    /// * `reduction_prev` - Whether the previous cell did, so the first input has twice the
    ///   resolution of the second one.
    /// * `vb` - Where the cell's parameters live.
    ///
    /// # Errors
    /// Returns an error if a parameter is missing or has the wrong shape.
    pub fn new(
        genotype: &Genotype,
        channels: CellChannels,
        reduction: bool,
        reduction_prev: bool,
        vb: VarBuilder,
    ) -> Result<Self> {
        let CellChannels {
            prev_prev,
            prev,
            current,
        } = channels;

        let preprocess0 = if reduction_prev {
            Preprocess::Reduce(FactorizedReduce::new(prev_prev, current, vb.pp("preprocess0"))?)
        } else {
            Preprocess::Conv(ReluConvBn::new(prev_prev, current, 1, 1, 0, vb.pp("preprocess0"))?)
        };
        let preprocess1 = ReluConvBn::new(prev, current, 1, 1, 0, vb.pp("preprocess1"))?;

        let (edges, concat) = genotype.cell(reduction);
        let ops_vb = vb.pp("_ops");
        let ops = edges
            .iter()
            .enumerate()
            .map(|(j, &(op, index))| {
                let stride = if reduction && index < 2 { 2 } else { 1 };
                Operation::new(op, current, stride, ops_vb.pp(j))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            preprocess0,
            preprocess1,
            ops,
            indices: edges.iter().map(|&(_, index)| index).collect(),
            concat: concat.to_vec(),
            channels: current,
            reduction,
        })
    }

    /// How many states get concatenated into the output.
    pub fn multiplier(&self) -> usize {
        self.concat.len()
    }

    pub fn out_channels(&self) -> usize {
        self.multiplier() * self.channels
    }

    pub fn is_reduction(&self) -> bool {
        self.reduction
    }

    /// Runs the cell.
    ///
    /// # Arguments
    /// * `s0` - Output of the cell two positions back.
    /// * `s1` - Output of the previous cell.
    /// * `drop_prob` - Drop path probability, only applied when `train` is set.
    /// * `train` - Whether the network is in training mode.
    ///
    /// # Errors
    /// Returns an error if any tensor operation fails.
    pub fn forward(&self, s0: &Tensor, s1: &Tensor, drop_prob: f64, train: bool) -> Result<Tensor> {
        let mut states = vec![self.preprocess0.forward(s0)?, self.preprocess1.forward(s1)?];

        for (pair, indices) in self.ops.chunks(2).zip(self.indices.chunks(2)) {
            let mut sum: Option<Tensor> = None;
            for (op, &index) in pair.iter().zip(indices) {
                let mut h = op.forward(&states[index])?;
                if train && drop_prob > 0. && !op.is_identity() {
                    h = drop_path(&h, drop_prob)?;
                }
                sum = Some(match sum {
                    Some(acc) => (acc + h)?,
                    None => h,
                });
            }
            if let Some(s) = sum {
                states.push(s);
            }
        }

        let selected: Vec<&Tensor> = self.concat.iter().map(|&i| &states[i]).collect();
        Ok(Tensor::cat(&selected, 1)?)
    }

    /// Returns the multiply-accumulates of running the cell and its output shape.
    pub fn profile(&self, s0: FeatureShape, s1: FeatureShape) -> (u64, FeatureShape) {
        let (mut macs, s0) = self.preprocess0.profile(s0);
        let (pre1, s1) = self.preprocess1.profile(s1);
        macs += pre1;

        let mut states = vec![s0, s1];
        for (pair, indices) in self.ops.chunks(2).zip(self.indices.chunks(2)) {
            let mut out = states[indices[0]];
            for (op, &index) in pair.iter().zip(indices) {
                let (op_macs, shape) = op.profile(states[index]);
                macs += op_macs;
                out = shape;
            }
            states.push(out);
        }

        let out = states[self.concat[0]];
        (macs, FeatureShape::new(self.out_channels(), out.height, out.width))
    }

    pub fn num_params(&self) -> usize {
        self.preprocess0.num_params()
            + self.preprocess1.num_params()
            + self.ops.iter().map(Operation::num_params).sum::<usize>()
    }
}

/// Zeroes whole samples with probability `drop_prob`, rescaling the survivors.
fn drop_path(x: &Tensor, drop_prob: f64) -> Result<Tensor> {
    let keep = 1. - drop_prob;
    let batch = x.dim(0)?;
    let mask = Tensor::rand(0f32, 1f32, (batch, 1, 1, 1), x.device())?
        .lt(keep)?
        .to_dtype(x.dtype())?;

    Ok(x.affine(1. / keep, 0.)?.broadcast_mul(&mask)?)
}
