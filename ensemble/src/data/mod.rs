mod cifar;
mod dataloader;
mod transform;

use std::sync::Arc;

use candle_core::{Device, Tensor};
use ndarray::Array1;

pub use cifar::{CifarDataset, DatasetKind, IMAGE_BYTES};
pub use dataloader::{DataLoader, LoaderConfig};
pub use transform::{CIFAR_MEAN, CIFAR_STD, Transform};

use crate::{EnsembleErr, Result, config::EnsembleConfig};

/// One evaluation batch: images on the run device and their class indices.
#[derive(Debug, Clone)]
pub struct Batch {
    pub images: Tensor,
    pub targets: Array1<usize>,
}

impl Batch {
    #[inline]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// A finite, restartable sequence of batches.
pub trait BatchSource {
    /// Number of batches in one pass.
    fn num_batches(&self) -> usize;

    /// Rewinds to the start of a new pass.
    fn reset(&mut self);

    /// Returns the next batch of the current pass, or `None` once the pass is over.
    fn next_batch(&mut self) -> Result<Option<Batch>>;
}

/// Batches already held in memory, yielded in order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBatches {
    batches: Vec<Batch>,
    cursor: usize,
}

impl InMemoryBatches {
    pub fn new(batches: Vec<Batch>) -> Self {
        Self { batches, cursor: 0 }
    }
}

impl BatchSource for InMemoryBatches {
    fn num_batches(&self) -> usize {
        self.batches.len()
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }

    fn next_batch(&mut self) -> Result<Option<Batch>> {
        let batch = self.batches.get(self.cursor).cloned();
        if batch.is_some() {
            self.cursor += 1;
        }
        Ok(batch)
    }
}

/// The three loaders of a run.
#[derive(Debug)]
pub struct CifarSplits {
    /// First `train_portion` of the training set, augmented, reshuffled every pass.
    pub train: DataLoader,
    /// Rest of the training set with the test transform, reshuffled every pass.
    pub valid: DataLoader,
    /// The test set in file order.
    pub test: DataLoader,
}

impl CifarSplits {
    /// Reads the dataset named by the config and splits it.
    ///
    /// # Errors
    /// Returns an error if the dataset can't be read or the split leaves a side empty.
    pub fn load(config: &EnsembleConfig, device: &Device) -> Result<Self> {
        let root = config.data();
        let kind = config.set();
        let train_set = Arc::new(CifarDataset::load(root, kind, true)?);
        let test_set = Arc::new(CifarDataset::load(root, kind, false)?);

        let split = (config.train_portion() * train_set.len() as f64).floor() as usize;
        if split == 0 || split >= train_set.len() {
            return Err(EnsembleErr::InvalidConfig(format!(
                "train_portion {} leaves an empty split of {} samples",
                config.train_portion(),
                train_set.len()
            )));
        }

        let batch_size = config.batch_size();
        let seed = config.seed();
        let train_transform = Transform::Train {
            cutout: config.cutout(),
        };

        // Distinct seeds keep the two shuffled loaders independent.
        let train = DataLoader::new(
            Arc::clone(&train_set),
            (0..split).collect(),
            LoaderConfig::new(batch_size, true, seed),
            train_transform,
            device.clone(),
        );
        let valid = DataLoader::new(
            Arc::clone(&train_set),
            (split..train_set.len()).collect(),
            LoaderConfig::new(batch_size, true, seed.wrapping_add(1)),
            Transform::Test,
            device.clone(),
        );
        let test = DataLoader::new(
            Arc::clone(&test_set),
            (0..test_set.len()).collect(),
            LoaderConfig::new(batch_size, false, seed),
            Transform::Test,
            device.clone(),
        );

        Ok(Self { train, valid, test })
    }
}
