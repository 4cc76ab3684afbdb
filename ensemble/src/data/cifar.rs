use std::{
    fs,
    path::{Path, PathBuf},
};

use clap::ValueEnum;

use crate::{EnsembleErr, Result};

pub const IMAGE_SIDE: usize = 32;
pub const IMAGE_CHANNELS: usize = 3;
/// Bytes of one image: three 32x32 planes, red first.
pub const IMAGE_BYTES: usize = IMAGE_CHANNELS * IMAGE_SIDE * IMAGE_SIDE;

/// Which CIFAR distribution to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DatasetKind {
    Cifar10,
    Cifar100,
}

impl DatasetKind {
    pub fn num_classes(&self) -> usize {
        match self {
            DatasetKind::Cifar10 => 10,
            DatasetKind::Cifar100 => 100,
        }
    }

    /// Label bytes preceding every image, and which of them is the label used.
    fn label_layout(&self) -> (usize, usize) {
        match self {
            DatasetKind::Cifar10 => (1, 0),
            // Coarse label first, fine label second.
            DatasetKind::Cifar100 => (2, 1),
        }
    }

    /// The binary files holding the requested split.
    fn files(&self, root: &Path, train: bool) -> Vec<PathBuf> {
        match (self, train) {
            (DatasetKind::Cifar10, true) => (1..=5)
                .map(|i| root.join("cifar-10-batches-bin").join(format!("data_batch_{i}.bin")))
                .collect(),
            (DatasetKind::Cifar10, false) => {
                vec![root.join("cifar-10-batches-bin").join("test_batch.bin")]
            }
            (DatasetKind::Cifar100, true) => vec![root.join("cifar-100-binary").join("train.bin")],
            (DatasetKind::Cifar100, false) => vec![root.join("cifar-100-binary").join("test.bin")],
        }
    }
}

/// A split of a CIFAR dataset held in memory as raw bytes.
#[derive(Debug, Clone)]
pub struct CifarDataset {
    images: Vec<u8>,
    labels: Vec<u8>,
    num_classes: usize,
}

impl CifarDataset {
    /// Creates a dataset from raw images and labels.
    ///
    /// # Arguments
    /// * `images` - `IMAGE_BYTES` bytes per image, planes in channel order.
    /// * `labels` - One class index per image.
    /// * `num_classes` - How many classes the labels range over.
    ///
    /// # Errors
    /// Returns an error if the lengths don't match or a label is out of range.
    pub fn new(images: Vec<u8>, labels: Vec<u8>, num_classes: usize) -> Result<Self> {
        if images.len() != labels.len() * IMAGE_BYTES {
            return Err(EnsembleErr::InvalidConfig(format!(
                "{} image bytes for {} labels",
                images.len(),
                labels.len()
            )));
        }
        if let Some(&label) = labels.iter().find(|&&l| l as usize >= num_classes) {
            return Err(EnsembleErr::LabelOutOfRange {
                label: label as usize,
                num_classes,
            });
        }

        Ok(Self {
            images,
            labels,
            num_classes,
        })
    }

    /// Reads a split of the binary distribution under `root`.
    ///
    /// # Arguments
    /// * `root` - Directory holding `cifar-10-batches-bin` or `cifar-100-binary`.
    /// * `kind` - Which dataset to read.
    /// * `train` - Whether to read the training split instead of the test split.
    ///
    /// # Errors
    /// Returns an error if a file is missing or doesn't hold whole records.
    pub fn load(root: &Path, kind: DatasetKind, train: bool) -> Result<Self> {
        let (label_bytes, label_offset) = kind.label_layout();
        let record = label_bytes + IMAGE_BYTES;

        let mut images = Vec::new();
        let mut labels = Vec::new();
        for path in kind.files(root, train) {
            let raw = fs::read(&path).map_err(|source| EnsembleErr::Io {
                path: path.clone(),
                source,
            })?;
            if raw.len() % record != 0 {
                return Err(EnsembleErr::MalformedDataset {
                    path,
                    len: raw.len(),
                    record,
                });
            }

            for chunk in raw.chunks_exact(record) {
                labels.push(chunk[label_offset]);
                images.extend_from_slice(&chunk[label_bytes..]);
            }
        }

        Self::new(images, labels, kind.num_classes())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[inline]
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Returns the raw bytes of image `i`.
    pub fn image(&self, i: usize) -> &[u8] {
        &self.images[i * IMAGE_BYTES..(i + 1) * IMAGE_BYTES]
    }

    pub fn label(&self, i: usize) -> usize {
        self.labels[i] as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(labels: &[u8], fill: u8) -> Vec<u8> {
        let mut rec = labels.to_vec();
        rec.extend(std::iter::repeat_n(fill, IMAGE_BYTES));
        rec
    }

    #[test]
    fn reads_cifar100_fine_labels() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("cifar-100-binary");
        fs::create_dir(&bin).unwrap();

        let mut raw = record(&[3, 42], 7);
        raw.extend(record(&[1, 99], 9));
        fs::write(bin.join("test.bin"), raw).unwrap();

        let ds = CifarDataset::load(dir.path(), DatasetKind::Cifar100, false).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.label(0), 42);
        assert_eq!(ds.label(1), 99);
        assert!(ds.image(1).iter().all(|&p| p == 9));
    }

    #[test]
    fn reads_all_cifar10_training_batches() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("cifar-10-batches-bin");
        fs::create_dir(&bin).unwrap();
        for i in 1..=5u8 {
            fs::write(bin.join(format!("data_batch_{i}.bin")), record(&[i], i)).unwrap();
        }

        let ds = CifarDataset::load(dir.path(), DatasetKind::Cifar10, true).unwrap();
        assert_eq!(ds.len(), 5);
        assert_eq!((0..5).map(|i| ds.label(i)).collect::<Vec<_>>(), [1, 2, 3, 4, 5]);
    }

    #[test]
    fn truncated_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("cifar-10-batches-bin");
        fs::create_dir(&bin).unwrap();
        fs::write(bin.join("test_batch.bin"), vec![0u8; IMAGE_BYTES]).unwrap();

        let err = CifarDataset::load(dir.path(), DatasetKind::Cifar10, false).unwrap_err();
        assert!(matches!(err, EnsembleErr::MalformedDataset { .. }));
    }

    #[test]
    fn missing_dataset_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = CifarDataset::load(dir.path(), DatasetKind::Cifar10, false).unwrap_err();
        assert!(matches!(err, EnsembleErr::Io { .. }));
    }

    #[test]
    fn out_of_range_labels_are_rejected() {
        let err = CifarDataset::new(vec![0; IMAGE_BYTES], vec![10], 10).unwrap_err();
        assert!(matches!(
            err,
            EnsembleErr::LabelOutOfRange {
                label: 10,
                num_classes: 10
            }
        ));
    }
}
