use std::{num::NonZeroUsize, sync::Arc};

use candle_core::{Device, Tensor};
use ndarray::Array1;
use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};
use rayon::prelude::*;

use super::{
    Batch, BatchSource,
    cifar::{CifarDataset, IMAGE_CHANNELS, IMAGE_SIDE},
    transform::Transform,
};
use crate::Result;

/// How a loader walks its samples.
#[derive(Debug, Clone, Copy)]
pub struct LoaderConfig {
    batch_size: NonZeroUsize,
    shuffle: bool,
    seed: u64,
}

impl LoaderConfig {
    /// Creates a new loader configuration.
    ///
    /// # Args
    /// * `batch_size` - Samples per batch; the last batch of a pass may be smaller.
    /// * `shuffle` - Whether the sample order is reshuffled on every pass.
    /// * `seed` - Seed of the loader's shuffling and augmentation randomness.
    pub fn new(batch_size: NonZeroUsize, shuffle: bool, seed: u64) -> Self {
        Self {
            batch_size,
            shuffle,
            seed,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.get()
    }

    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

/// Batches a subset of a CIFAR split, materializing every batch on the run device.
///
/// Samples of a batch are decoded and augmented in parallel, each one with its own rng seeded
/// from the loader's rng, so a given seed always yields the same batches.
#[derive(Debug)]
pub struct DataLoader {
    dataset: Arc<CifarDataset>,
    order: Vec<usize>,
    config: LoaderConfig,
    transform: Transform,
    device: Device,
    rng: StdRng,
    cursor: usize,
}

impl DataLoader {
    /// Creates a new `DataLoader`.
    ///
    /// # Arguments
    /// * `dataset` - The split to read from, shared with other loaders.
    /// * `indices` - The dataset indices this loader yields.
    /// * `config` - Batch size, shuffling and seed.
    /// * `transform` - What to apply to every image.
    /// * `device` - Where batches are placed.
    pub fn new(
        dataset: Arc<CifarDataset>,
        indices: Vec<usize>,
        config: LoaderConfig,
        transform: Transform,
        device: Device,
    ) -> Self {
        let mut loader = Self {
            dataset,
            order: indices,
            rng: StdRng::seed_from_u64(config.seed()),
            config,
            transform,
            device,
            cursor: 0,
        };
        loader.reset();
        loader
    }

    /// Number of samples per pass.
    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl BatchSource for DataLoader {
    fn num_batches(&self) -> usize {
        self.order.len().div_ceil(self.config.batch_size())
    }

    fn reset(&mut self) {
        self.cursor = 0;
        if self.config.shuffle() {
            self.order.shuffle(&mut self.rng);
        }
    }

    fn next_batch(&mut self) -> Result<Option<Batch>> {
        if self.cursor >= self.order.len() {
            return Ok(None);
        }

        let end = (self.cursor + self.config.batch_size()).min(self.order.len());
        let samples: Vec<(usize, u64)> = self.order[self.cursor..end]
            .iter()
            .map(|&i| (i, self.rng.random()))
            .collect();
        self.cursor = end;

        let images: Vec<f32> = samples
            .par_iter()
            .flat_map_iter(|&(i, seed)| {
                let mut rng = StdRng::seed_from_u64(seed);
                self.transform.apply(self.dataset.image(i), &mut rng)
            })
            .collect();
        let targets: Array1<usize> = samples.iter().map(|&(i, _)| self.dataset.label(i)).collect();

        let shape = (samples.len(), IMAGE_CHANNELS, IMAGE_SIDE, IMAGE_SIDE);
        let images = Tensor::from_vec(images, shape, &self.device)?;

        Ok(Some(Batch { images, targets }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::cifar::IMAGE_BYTES;

    fn dataset(n: u8) -> Arc<CifarDataset> {
        let images = (0..n).flat_map(|i| std::iter::repeat_n(i, IMAGE_BYTES)).collect();
        let labels = (0..n).map(|i| i % 10).collect();
        Arc::new(CifarDataset::new(images, labels, 10).unwrap())
    }

    fn config(batch_size: usize, shuffle: bool) -> LoaderConfig {
        LoaderConfig::new(NonZeroUsize::new(batch_size).unwrap(), shuffle, 0)
    }

    fn pass(loader: &mut DataLoader) -> Vec<usize> {
        loader.reset();
        let mut targets = Vec::new();
        while let Some(batch) = loader.next_batch().unwrap() {
            targets.extend(batch.targets.iter().copied());
        }
        targets
    }

    #[test]
    fn sequential_loader_keeps_index_order() {
        let mut loader = DataLoader::new(
            dataset(12),
            (2..9).collect(),
            config(3, false),
            Transform::Test,
            Device::Cpu,
        );
        assert_eq!(loader.num_batches(), 3);

        let batch = loader.next_batch().unwrap().unwrap();
        assert_eq!(batch.images.dims4().unwrap(), (3, 3, 32, 32));
        assert_eq!(batch.targets.to_vec(), [2, 3, 4]);

        assert_eq!(pass(&mut loader), [2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn shuffled_loader_visits_every_sample_once_per_pass() {
        let mut loader = DataLoader::new(
            dataset(10),
            (0..10).collect(),
            config(4, true),
            Transform::Train { cutout: None },
            Device::Cpu,
        );

        let mut first = pass(&mut loader);
        let mut second = pass(&mut loader);
        first.sort_unstable();
        second.sort_unstable();
        assert_eq!(first, (0..10).collect::<Vec<_>>());
        assert_eq!(second, first);
    }

    #[test]
    fn equal_seeds_give_equal_batches() {
        let make = || {
            DataLoader::new(
                dataset(8),
                (0..8).collect(),
                config(8, true),
                Transform::Train { cutout: Some(8) },
                Device::Cpu,
            )
        };
        let (mut a, mut b) = (make(), make());

        let a = a.next_batch().unwrap().unwrap();
        let b = b.next_batch().unwrap().unwrap();
        assert_eq!(a.targets, b.targets);
        assert_eq!(
            a.images.flatten_all().unwrap().to_vec1::<f32>().unwrap(),
            b.images.flatten_all().unwrap().to_vec1::<f32>().unwrap()
        );
    }
}
