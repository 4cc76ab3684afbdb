use std::{collections::HashMap, fs::File, io::Read, path::Path};

use candle_core::{Device, Tensor};
use log::debug;

use crate::{DartsErr, Result};

/// PyTorch saves `state_dict`s as zip archives.
const ZIP_MAGIC: [u8; 2] = *b"PK";

/// Prefix left on every parameter name by data-parallel training.
const PARALLEL_PREFIX: &str = "module.";

/// Reads every tensor of a checkpoint into host memory, keyed by parameter name.
///
/// # Arguments
/// * `path` - A PyTorch `state_dict` archive or a safetensors file.
///
/// # Errors
/// Returns an error if the file can't be opened or isn't a valid checkpoint.
pub fn load_state_dict(path: &Path) -> Result<HashMap<String, Tensor>> {
    let io_err = |source| DartsErr::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut magic = [0u8; 2];
    File::open(path)
        .and_then(|mut file| file.read_exact(&mut magic))
        .map_err(io_err)?;

    let tensors: Vec<(String, Tensor)> = if magic == ZIP_MAGIC {
        let mut tensors = candle_core::pickle::read_all_with_key(path, None)?;
        if tensors.is_empty() {
            // Checkpoints saved as `{"state_dict": ...}`.
            tensors = candle_core::pickle::read_all_with_key(path, Some("state_dict"))?;
        }
        tensors
    } else {
        candle_core::safetensors::load(path, &Device::Cpu)?
            .into_iter()
            .collect()
    };

    debug!("read {} tensors from {}", tensors.len(), path.display());

    Ok(tensors
        .into_iter()
        .map(|(name, tensor)| match name.strip_prefix(PARALLEL_PREFIX) {
            Some(stripped) => (stripped.to_string(), tensor),
            None => (name, tensor),
        })
        .collect())
}
