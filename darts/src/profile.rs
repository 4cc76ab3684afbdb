use std::{num::NonZeroUsize, time::Instant};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use log::debug;

use crate::{
    Result,
    device::device_name,
    genotype::Genotype,
    network::{CIFAR_INPUT, NetworkCifar, NetworkConfig},
};

/// Drop path probability candidates are profiled with.
const PROFILE_DROP_PATH_PROB: f64 = 0.3;

/// Cost figures of one architecture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelProfile {
    /// Parameters in millions, auxiliary head excluded.
    pub parameters: f64,
    /// Multiply-accumulates in millions for one 32x32 image.
    pub flops: f64,
    /// Mean milliseconds per single-image forward on the accelerator, if one was used.
    pub latency_gpu: Option<f64>,
    /// Mean milliseconds per single-image forward on the cpu.
    pub latency_cpu: f64,
}

/// Measures the size, compute and latency of architectures instantiated with a fixed config.
#[derive(Debug, Clone)]
pub struct Profiler {
    config: NetworkConfig,
    accelerator: Option<Device>,
    runs: NonZeroUsize,
}

impl Profiler {
    /// Creates a new `Profiler`.
    ///
    /// # Args
    /// * `config` - The network hyperparameters every genotype is instantiated with.
    /// * `accelerator` - The device to measure accelerator latency on, if any.
    /// * `runs` - Timed forward passes per device, after one warm-up pass.
    pub fn new(config: NetworkConfig, accelerator: Option<Device>, runs: NonZeroUsize) -> Self {
        Self {
            config,
            accelerator,
            runs,
        }
    }

    /// Profiles a genotype.
    ///
    /// # Errors
    /// Returns an error if the network can't be built or a forward pass fails.
    pub fn profile(&self, genotype: &Genotype) -> Result<ModelProfile> {
        let cpu_model = self.build(genotype, &Device::Cpu)?;

        let parameters = cpu_model.num_params() as f64 / 1e6;
        let flops = cpu_model.macs(CIFAR_INPUT) as f64 / 1e6;
        let latency_cpu = self.latency(&cpu_model, &Device::Cpu)?;

        let latency_gpu = match &self.accelerator {
            Some(device) => {
                let model = self.build(genotype, device)?;
                Some(self.latency(&model, device)?)
            }
            None => None,
        };

        Ok(ModelProfile {
            parameters,
            flops,
            latency_gpu,
            latency_cpu,
        })
    }

    fn build(&self, genotype: &Genotype, device: &Device) -> Result<NetworkCifar> {
        let vb = VarBuilder::zeros(DType::F32, device);
        let mut model = NetworkCifar::new(self.config, genotype, vb)?;
        model.set_drop_path_prob(PROFILE_DROP_PATH_PROB);
        Ok(model)
    }

    fn latency(&self, model: &NetworkCifar, device: &Device) -> Result<f64> {
        let shape = (1, CIFAR_INPUT.channels, CIFAR_INPUT.height, CIFAR_INPUT.width);
        let x = Tensor::randn(0f32, 1f32, shape, device)?;

        // Copying the logits back waits for the device to finish.
        model.forward(&x)?.to_vec2::<f32>()?;

        let runs = self.runs.get();
        let start = Instant::now();
        for _ in 0..runs {
            model.forward(&x)?.to_vec2::<f32>()?;
        }
        let ms = start.elapsed().as_secs_f64() * 1e3 / runs as f64;

        debug!("{} latency {ms:.3}ms over {runs} runs", device_name(device));
        Ok(ms)
    }
}
