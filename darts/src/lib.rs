pub mod cell;
pub mod checkpoint;
pub mod device;
pub mod error;
pub mod genotype;
pub mod network;
pub mod ops;
pub mod profile;
pub mod registry;

pub use device::select_device;
pub use error::{DartsErr, Result};
pub use genotype::{Edge, Genotype, Op};
pub use network::{CIFAR_INPUT, NetworkCifar, NetworkConfig};
pub use profile::{ModelProfile, Profiler};
pub use registry::GenotypeRegistry;
