use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use clap::Parser;
use darts::NetworkConfig;

use crate::{EnsembleErr, Result, data::DatasetKind};

/// Command line of the `ensemble` binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "ensemble",
    about = "Weights and evaluates an ensemble of trained DARTS networks on CIFAR"
)]
pub struct EnsembleArgs {
    /// Location of the data corpus.
    #[arg(long, default_value = "data")]
    pub data: PathBuf,

    /// Dataset to evaluate on.
    #[arg(long, value_enum, default_value_t = DatasetKind::Cifar10)]
    pub set: DatasetKind,

    #[arg(long = "batch_size", default_value_t = 96)]
    pub batch_size: usize,

    /// Number of report lines per stage.
    #[arg(long = "report_lines", default_value_t = 5)]
    pub report_lines: usize,

    /// Accelerator device id.
    #[arg(long, default_value_t = 0)]
    pub gpu: usize,

    /// Number of initial channels of the networks.
    #[arg(long = "init_channels", default_value_t = 36)]
    pub init_channels: usize,

    /// Total number of cells of the networks.
    #[arg(long, default_value_t = 20)]
    pub layers: usize,

    /// Whether the networks were trained with an auxiliary tower.
    #[arg(long)]
    pub auxiliary: bool,

    /// Apply cutout to the training split.
    #[arg(long)]
    pub cutout: bool,

    #[arg(long = "cutout_length", default_value_t = 16)]
    pub cutout_length: usize,

    #[arg(long = "drop_path_prob", default_value_t = 0.2)]
    pub drop_path_prob: f64,

    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Portion of the training set used as the train split; the rest is the validation split.
    #[arg(long = "train_portion", default_value_t = 0.9)]
    pub train_portion: f64,

    /// Parent folder of the trained models.
    #[arg(long = "models_folder")]
    pub models_folder: PathBuf,

    /// Calculate the ensemble weights on the validation split.
    #[arg(long)]
    pub calculate: bool,

    /// Calculate one weight per model and class.
    #[arg(long = "per_class")]
    pub per_class: bool,

    /// JSON file with extra genotypes, keyed by architecture name.
    #[arg(long)]
    pub genotypes: Option<PathBuf>,

    /// Run on the cpu when no accelerator is available.
    #[arg(long)]
    pub cpu: bool,
}

impl EnsembleArgs {
    /// Validates the arguments into a run configuration.
    ///
    /// # Errors
    /// Returns `EnsembleErr::InvalidConfig` if a count is zero or a ratio is out of range.
    pub fn into_config(self) -> Result<EnsembleConfig> {
        let nonzero = |value: usize, name: &str| {
            NonZeroUsize::new(value)
                .ok_or_else(|| EnsembleErr::InvalidConfig(format!("{name} must be greater than 0")))
        };

        if !(self.train_portion > 0. && self.train_portion < 1.) {
            return Err(EnsembleErr::InvalidConfig(format!(
                "train_portion must be in (0, 1), got {}",
                self.train_portion
            )));
        }
        if !(0. ..1.).contains(&self.drop_path_prob) {
            return Err(EnsembleErr::InvalidConfig(format!(
                "drop_path_prob must be in [0, 1), got {}",
                self.drop_path_prob
            )));
        }

        let network = NetworkConfig::from_counts(
            self.init_channels,
            self.set.num_classes(),
            self.layers,
            self.auxiliary,
        )?;
        let cutout = if self.cutout {
            Some(nonzero(self.cutout_length, "cutout_length")?.get())
        } else {
            None
        };

        Ok(EnsembleConfig {
            data: self.data,
            set: self.set,
            models_folder: self.models_folder,
            genotypes: self.genotypes,
            network,
            drop_path_prob: self.drop_path_prob,
            batch_size: nonzero(self.batch_size, "batch_size")?,
            report_lines: nonzero(self.report_lines, "report_lines")?,
            gpu: self.gpu,
            allow_cpu: self.cpu,
            cutout,
            seed: self.seed,
            train_portion: self.train_portion,
            calculate: self.calculate,
            per_class: self.per_class,
        })
    }
}

/// Immutable, validated configuration of an ensemble run.
#[derive(Debug, Clone)]
pub struct EnsembleConfig {
    data: PathBuf,
    set: DatasetKind,
    models_folder: PathBuf,
    genotypes: Option<PathBuf>,
    network: NetworkConfig,
    drop_path_prob: f64,
    batch_size: NonZeroUsize,
    report_lines: NonZeroUsize,
    gpu: usize,
    allow_cpu: bool,
    cutout: Option<usize>,
    seed: u64,
    train_portion: f64,
    calculate: bool,
    per_class: bool,
}

impl EnsembleConfig {
    pub fn data(&self) -> &Path {
        &self.data
    }

    pub fn set(&self) -> DatasetKind {
        self.set
    }

    pub fn models_folder(&self) -> &Path {
        &self.models_folder
    }

    pub fn genotypes(&self) -> Option<&Path> {
        self.genotypes.as_deref()
    }

    /// Hyperparameters every loaded network is built with. The classifier width follows the
    /// dataset.
    pub fn network(&self) -> NetworkConfig {
        self.network
    }

    pub fn drop_path_prob(&self) -> f64 {
        self.drop_path_prob
    }

    pub fn batch_size(&self) -> NonZeroUsize {
        self.batch_size
    }

    pub fn report_lines(&self) -> NonZeroUsize {
        self.report_lines
    }

    pub fn gpu(&self) -> usize {
        self.gpu
    }

    pub fn allow_cpu(&self) -> bool {
        self.allow_cpu
    }

    /// Side of the cutout square applied to training images, if enabled.
    pub fn cutout(&self) -> Option<usize> {
        self.cutout
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn train_portion(&self) -> f64 {
        self.train_portion
    }

    pub fn calculate(&self) -> bool {
        self.calculate
    }

    /// Number of classes to weight per class, when per-class weighting was requested.
    pub fn per_class(&self) -> Option<usize> {
        self.per_class.then(|| self.set.num_classes())
    }
}
