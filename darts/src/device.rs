use candle_core::Device;
use log::{info, warn};

use crate::{DartsErr, Result};

/// Picks the device a run executes on.
///
/// CUDA is tried first, then Metal. Without either, the CPU is used only if the caller allows
/// it.
///
/// # Arguments
/// * `gpu` - Ordinal of the accelerator to use.
/// * `allow_cpu` - Whether to fall back to the CPU when no accelerator is available.
///
/// # Errors
/// Returns `DartsErr::NoAccelerator` if no accelerator is found and `allow_cpu` is false.
pub fn select_device(gpu: usize, allow_cpu: bool) -> Result<Device> {
    if let Some(device) = accelerator(gpu) {
        info!("using {} device {gpu}", device_name(&device));
        return Ok(device);
    }

    if allow_cpu {
        warn!("no gpu device available, running on cpu");
        return Ok(Device::Cpu);
    }

    Err(DartsErr::NoAccelerator { gpu })
}

/// Returns the accelerator with the given ordinal, if one is available.
pub fn accelerator(gpu: usize) -> Option<Device> {
    match Device::cuda_if_available(gpu) {
        Ok(device) if device.is_cuda() => return Some(device),
        _ => {}
    }

    match Device::metal_if_available(gpu) {
        Ok(device) if device.is_metal() => Some(device),
        _ => None,
    }
}

/// A short name of the device's backend for log lines.
pub fn device_name(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "cpu",
        Device::Cuda(_) => "cuda",
        Device::Metal(_) => "metal",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_fallback_is_opt_in() {
        if accelerator(0).is_some() {
            return;
        }

        assert!(matches!(
            select_device(0, false),
            Err(DartsErr::NoAccelerator { gpu: 0 })
        ));
        assert!(select_device(0, true).unwrap().is_cpu());
    }
}
