use std::{fs, path::Path};

use candle_core::{DType, Device, Tensor};
use darts::{GenotypeRegistry, NetworkCifar, NetworkConfig};
use indexmap::IndexMap;
use log::{info, warn};
use ndarray::Array2;

use crate::{EnsembleErr, Result};

/// Checkpoint file expected inside every model folder.
pub const CHECKPOINT_FILE: &str = "weights.pt";
/// Prefix of the folders holding trained models.
const MODEL_DIR_PREFIX: &str = "eval";

/// Something that scores a batch of images.
pub trait Classifier {
    /// Returns the raw `[batch, class]` scores for a `[batch, 3, h, w]` image tensor.
    fn logits(&self, images: &Tensor) -> Result<Array2<f32>>;
}

/// Copies a 2-D tensor into host memory.
pub fn tensor_to_array2(tensor: &Tensor) -> Result<Array2<f32>> {
    let (rows, cols) = tensor.dims2()?;
    let data = tensor.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?;
    Ok(Array2::from_shape_vec((rows, cols), data)?)
}

/// A trained network loaded from a model folder, evaluated in eval mode.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    folder: String,
    network: NetworkCifar,
}

impl TrainedModel {
    pub fn new(folder: String, network: NetworkCifar) -> Self {
        Self { folder, network }
    }

    /// Name of the folder the model was loaded from.
    pub fn folder(&self) -> &str {
        &self.folder
    }

    pub fn network(&self) -> &NetworkCifar {
        &self.network
    }
}

impl Classifier for TrainedModel {
    fn logits(&self, images: &Tensor) -> Result<Array2<f32>> {
        tensor_to_array2(&self.network.forward(images)?)
    }
}

/// Models keyed by architecture name, in insertion order.
///
/// Inserting an existing key replaces the model but keeps its original position.
#[derive(Debug, Clone)]
pub struct ModelCollection<M = TrainedModel> {
    models: IndexMap<String, M>,
}

impl<M> ModelCollection<M> {
    pub fn new() -> Self {
        Self {
            models: IndexMap::new(),
        }
    }

    /// Inserts a model, returning the one it replaced.
    pub fn insert(&mut self, key: String, model: M) -> Option<M> {
        self.models.insert(key, model)
    }

    pub fn get(&self, key: &str) -> Option<&M> {
        self.models.get(key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &M)> {
        self.models.iter().map(|(k, m)| (k.as_str(), m))
    }
}

impl<M> Default for ModelCollection<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> FromIterator<(String, M)> for ModelCollection<M> {
    fn from_iter<T: IntoIterator<Item = (String, M)>>(iter: T) -> Self {
        Self {
            models: iter.into_iter().collect(),
        }
    }
}

/// Discovers and loads the trained models under a folder.
#[derive(Debug, Clone)]
pub struct ModelRegistry<'a> {
    genotypes: &'a GenotypeRegistry,
    network: NetworkConfig,
    drop_path_prob: f64,
}

impl<'a> ModelRegistry<'a> {
    /// Creates a new `ModelRegistry`.
    ///
    /// # Arguments
    /// * `genotypes` - Where architecture keys are resolved.
    /// * `network` - The hyperparameters every network is built with.
    /// * `drop_path_prob` - Set on every loaded network.
    pub fn new(genotypes: &'a GenotypeRegistry, network: NetworkConfig, drop_path_prob: f64) -> Self {
        Self {
            genotypes,
            network,
            drop_path_prob,
        }
    }

    /// Loads every model under `root`.
    ///
    /// Model folders are the subfolders whose name starts with `eval`, visited in name order.
    /// The architecture key is the second `-` separated token of the folder name. Folders
    /// without a checkpoint are ignored; folders without a key or whose key is unknown are
    /// skipped with a warning.
    ///
    /// # Arguments
    /// * `root` - The parent folder of the model folders.
    /// * `device` - Where the networks are placed.
    ///
    /// # Returns
    /// The loaded models keyed by architecture; a later folder with the same key replaces the
    /// model of an earlier one.
    ///
    /// # Errors
    /// Returns `EnsembleErr::NotADirectory` if `root` isn't a readable directory,
    /// `EnsembleErr::NoModels` if nothing was loaded, or the error of a failed checkpoint read.
    pub fn load(&self, root: &Path, device: &Device) -> Result<ModelCollection> {
        if !root.is_dir() {
            return Err(EnsembleErr::NotADirectory(root.to_path_buf()));
        }
        let entries = fs::read_dir(root).map_err(|_| EnsembleErr::NotADirectory(root.to_path_buf()))?;

        let mut folders: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.starts_with(MODEL_DIR_PREFIX))
            .collect();
        folders.sort_unstable();

        let mut models = ModelCollection::new();
        for folder in folders {
            let weights_file = root.join(&folder).join(CHECKPOINT_FILE);
            if !weights_file.exists() {
                continue;
            }

            let Some(key) = folder.split('-').nth(1) else {
                warn!("ignoring {folder} because its name has no architecture key");
                continue;
            };
            let Some(genotype) = self.genotypes.get(key) else {
                warn!("ignoring {folder} because there is no genotype {key}");
                continue;
            };

            let mut network = NetworkCifar::load(self.network, genotype, &weights_file, device)?;
            network.set_drop_path_prob(self.drop_path_prob);
            info!(
                "{folder} param size = {:.6}MB",
                network.num_params() as f64 / 1e6
            );

            models.insert(key.to_string(), TrainedModel::new(folder, network));
        }

        if models.is_empty() {
            return Err(EnsembleErr::NoModels(root.to_path_buf()));
        }

        Ok(models)
    }
}
