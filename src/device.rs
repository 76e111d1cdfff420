//! # Device Selection
//!
//! Maps the `device` string from model configuration onto a candle compute
//! device. Accelerator requests fall back to CPU with a warning instead of
//! failing the model load; an unrecognized string is a configuration error
//! and is reported as such by the registry.

use candle_core::Device;
use tracing::warn;

/// Device preference parsed from a model's configuration entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    /// Pick the best available accelerator, falling back to CPU
    Auto,
    /// Force CPU usage
    #[default]
    Cpu,
    /// CUDA GPU (falls back to CPU if unavailable)
    Cuda,
    /// Metal GPU (falls back to CPU if unavailable)
    Metal,
}

impl std::str::FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" | "automatic" => Ok(DevicePreference::Auto),
            "cpu" => Ok(DevicePreference::Cpu),
            "cuda" | "gpu" => Ok(DevicePreference::Cuda),
            "metal" => Ok(DevicePreference::Metal),
            _ => Err(format!("Unknown device preference: {}", s)),
        }
    }
}

impl DevicePreference {
    /// Resolve the preference to a concrete candle device.
    pub fn resolve(self) -> Device {
        match self {
            DevicePreference::Cpu => Device::Cpu,
            DevicePreference::Cuda => match Device::new_cuda(0) {
                Ok(device) => device,
                Err(err) => {
                    warn!("CUDA requested but unavailable ({}), using CPU", err);
                    Device::Cpu
                }
            },
            DevicePreference::Metal => match Device::new_metal(0) {
                Ok(device) => device,
                Err(err) => {
                    warn!("Metal requested but unavailable ({}), using CPU", err);
                    Device::Cpu
                }
            },
            DevicePreference::Auto => Device::new_cuda(0)
                .or_else(|_| Device::new_metal(0))
                .unwrap_or(Device::Cpu),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_preference_parsing() {
        assert_eq!("cpu".parse::<DevicePreference>().unwrap(), DevicePreference::Cpu);
        assert_eq!("CUDA".parse::<DevicePreference>().unwrap(), DevicePreference::Cuda);
        assert_eq!("auto".parse::<DevicePreference>().unwrap(), DevicePreference::Auto);
        assert!("tpu".parse::<DevicePreference>().is_err());
    }

    #[test]
    fn test_cpu_resolution() {
        let device = DevicePreference::Cpu.resolve();
        assert!(matches!(device, Device::Cpu));
    }
}
