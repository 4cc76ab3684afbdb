pub mod config;
pub mod data;
pub mod error;
pub mod inference;
pub mod loss;
pub mod meter;
pub mod metrics;
pub mod registry;
pub mod run;
pub mod weights;

pub use config::{EnsembleArgs, EnsembleConfig};
pub use error::{EnsembleErr, Result};
pub use inference::{InferenceReport, infer};
pub use registry::{Classifier, ModelCollection, ModelRegistry, TrainedModel};
pub use run::run;
pub use weights::{EnsembleWeights, calculate_weights};
