use std::{num::NonZeroUsize, path::Path};

use candle_core::{DType, Device, Tensor};
use candle_nn::{Linear, VarBuilder, linear};

use crate::{
    DartsErr, Result,
    cell::{Cell, CellChannels},
    checkpoint,
    genotype::Genotype,
    ops::{ConvUnit, FeatureShape, Norm},
};

const STEM_MULTIPLIER: usize = 3;
const INPUT_CHANNELS: usize = 3;

/// Shape of a single CIFAR image.
pub const CIFAR_INPUT: FeatureShape = FeatureShape {
    channels: INPUT_CHANNELS,
    height: 32,
    width: 32,
};

/// Immutable hyperparameters of a CIFAR evaluation network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkConfig {
    init_channels: NonZeroUsize,
    num_classes: NonZeroUsize,
    layers: NonZeroUsize,
    auxiliary: bool,
}

impl NetworkConfig {
    /// Creates a new network configuration.
    ///
    /// # Args
    /// * `init_channels` - Channels of the first cells; doubled at every reduction cell.
    /// * `num_classes` - Width of the classifier output.
    /// * `layers` - Number of cells.
    /// * `auxiliary` - Whether the checkpoint was trained with an auxiliary head. The head only
    ///   takes part in training, so it is never built here.
    ///
    /// # Returns
    /// A `NetworkConfig` instance.
    pub fn new(
        init_channels: NonZeroUsize,
        num_classes: NonZeroUsize,
        layers: NonZeroUsize,
        auxiliary: bool,
    ) -> Self {
        Self {
            init_channels,
            num_classes,
            layers,
            auxiliary,
        }
    }

    /// Creates a new network configuration from plain counts.
    ///
    /// # Errors
    /// Returns `DartsErr::InvalidConfig` if any count is zero.
    pub fn from_counts(
        init_channels: usize,
        num_classes: usize,
        layers: usize,
        auxiliary: bool,
    ) -> Result<Self> {
        let nonzero = |value: usize, name: &str| {
            NonZeroUsize::new(value)
                .ok_or_else(|| DartsErr::InvalidConfig(format!("{name} must be greater than 0")))
        };

        Ok(Self::new(
            nonzero(init_channels, "init_channels")?,
            nonzero(num_classes, "num_classes")?,
            nonzero(layers, "layers")?,
            auxiliary,
        ))
    }

    /// The evaluation setup used for CIFAR-10 search candidates: 36 channels, 20 cells.
    pub fn cifar_default() -> Self {
        const INIT_CHANNELS: NonZeroUsize = NonZeroUsize::new(36).unwrap();
        const NUM_CLASSES: NonZeroUsize = NonZeroUsize::new(10).unwrap();
        const LAYERS: NonZeroUsize = NonZeroUsize::new(20).unwrap();

        Self::new(INIT_CHANNELS, NUM_CLASSES, LAYERS, false)
    }

    pub fn init_channels(&self) -> usize {
        self.init_channels.get()
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes.get()
    }

    pub fn layers(&self) -> usize {
        self.layers.get()
    }

    pub fn auxiliary(&self) -> bool {
        self.auxiliary
    }

    /// Whether the cell at position `i` is a reduction cell.
    pub fn is_reduction(&self, i: usize) -> bool {
        let layers = self.layers();
        i == layers / 3 || i == 2 * layers / 3
    }
}

/// The DARTS evaluation network for 32x32 images: a convolutional stem, a stack of normal and
/// reduction cells and a linear classifier over globally pooled features.
#[derive(Debug, Clone)]
pub struct NetworkCifar {
    stem_conv: ConvUnit,
    stem_bn: Norm,
    cells: Vec<Cell>,
    classifier: Linear,
    config: NetworkConfig,
    drop_path_prob: f64,
}

impl NetworkCifar {
    /// Builds the network for a genotype, taking its parameters from `vb`.
    ///
    /// # Arguments
    /// * `config` - The network hyperparameters.
    /// * `genotype` - The cell architecture.
    /// * `vb` - Where the parameters live, following the `stem` / `cells.{i}` / `classifier`
    ///   naming of saved checkpoints.
    ///
    /// # Errors
    /// Returns an error if a parameter is missing or has the wrong shape.
    pub fn new(config: NetworkConfig, genotype: &Genotype, vb: VarBuilder) -> Result<Self> {
        let stem_channels = STEM_MULTIPLIER * config.init_channels();
        let stem_conv = ConvUnit::new(
            INPUT_CHANNELS,
            stem_channels,
            3,
            candle_nn::Conv2dConfig {
                padding: 1,
                ..Default::default()
            },
            vb.pp("stem.0"),
        )?;
        let stem_bn = Norm::new(stem_channels, vb.pp("stem.1"))?;

        let (mut prev_prev, mut prev, mut current) =
            (stem_channels, stem_channels, config.init_channels());
        let mut reduction_prev = false;
        let mut cells = Vec::with_capacity(config.layers());

        let cells_vb = vb.pp("cells");
        for i in 0..config.layers() {
            let reduction = config.is_reduction(i);
            if reduction {
                current *= 2;
            }

            let channels = CellChannels {
                prev_prev,
                prev,
                current,
            };
            let cell = Cell::new(genotype, channels, reduction, reduction_prev, cells_vb.pp(i))?;

            reduction_prev = reduction;
            prev_prev = prev;
            prev = cell.out_channels();
            cells.push(cell);
        }

        let classifier = linear(prev, config.num_classes(), vb.pp("classifier"))?;

        Ok(Self {
            stem_conv,
            stem_bn,
            cells,
            classifier,
            config,
            drop_path_prob: 0.,
        })
    }

    /// Builds the network for a genotype with the parameters stored in a checkpoint file.
    ///
    /// # Arguments
    /// * `config` - The network hyperparameters.
    /// * `genotype` - The cell architecture.
    /// * `path` - The checkpoint, either a PyTorch `state_dict` archive or a safetensors file.
    /// * `device` - Where the parameters are placed.
    ///
    /// # Errors
    /// Returns an error if the checkpoint can't be read or doesn't match the architecture.
    pub fn load(
        config: NetworkConfig,
        genotype: &Genotype,
        path: &Path,
        device: &Device,
    ) -> Result<Self> {
        let tensors = checkpoint::load_state_dict(path)?;
        let vb = VarBuilder::from_tensors(tensors, DType::F32, device);
        Self::new(config, genotype, vb)
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn drop_path_prob(&self) -> f64 {
        self.drop_path_prob
    }

    /// Sets the drop path probability used by training-mode forward passes.
    pub fn set_drop_path_prob(&mut self, drop_path_prob: f64) {
        self.drop_path_prob = drop_path_prob;
    }

    /// Computes class scores in evaluation mode.
    ///
    /// # Arguments
    /// * `x` - A `[batch, 3, height, width]` image tensor.
    ///
    /// # Returns
    /// The `[batch, num_classes]` logits.
    ///
    /// # Errors
    /// Returns an error if the input has the wrong shape or a tensor operation fails.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        self.forward_t(x, false)
    }

    /// Computes class scores, applying drop path when `train` is set.
    ///
    /// # Errors
    /// Returns an error if the input has the wrong shape or a tensor operation fails.
    pub fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let stem = self.stem_bn.forward(&self.stem_conv.forward(x)?)?;

        let mut s0 = stem.clone();
        let mut s1 = stem;
        for cell in &self.cells {
            let out = cell.forward(&s0, &s1, self.drop_path_prob, train)?;
            s0 = std::mem::replace(&mut s1, out);
        }

        let pooled = s1.flatten_from(2)?.mean(2)?;
        Ok(pooled.apply(&self.classifier)?)
    }

    /// Number of parameters of the evaluation network, auxiliary head excluded.
    pub fn num_params(&self) -> usize {
        let classifier = self.classifier.weight().elem_count()
            + self.classifier.bias().map_or(0, Tensor::elem_count);

        self.stem_conv.num_params()
            + self.stem_bn.num_params()
            + self.cells.iter().map(Cell::num_params).sum::<usize>()
            + classifier
    }

    /// Multiply-accumulates of the convolutions and the classifier for one input image.
    pub fn macs(&self, input: FeatureShape) -> u64 {
        let mut macs = self.stem_conv.macs(input);
        let stem = self.stem_conv.output(input);

        let (mut s0, mut s1) = (stem, stem);
        for cell in &self.cells {
            let (cell_macs, out) = cell.profile(s0, s1);
            macs += cell_macs;
            s0 = std::mem::replace(&mut s1, out);
        }

        macs + (s1.channels * self.config.num_classes()) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduction_cells_sit_at_thirds() {
        let config = NetworkConfig::cifar_default();
        let reductions: Vec<_> = (0..config.layers())
            .filter(|&i| config.is_reduction(i))
            .collect();
        assert_eq!(reductions, [6, 13]);
    }

    #[test]
    fn zero_counts_are_rejected() {
        assert!(matches!(
            NetworkConfig::from_counts(36, 0, 20, false),
            Err(DartsErr::InvalidConfig(_))
        ));
        assert_eq!(
            NetworkConfig::from_counts(36, 10, 20, false).unwrap(),
            NetworkConfig::cifar_default()
        );
    }
}
