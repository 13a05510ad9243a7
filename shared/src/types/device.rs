//! Device and platform descriptors

use serde::{Deserialize, Serialize};
use std::fmt;

use super::events::DeviceId;

/// GPU vendor platform a backend drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PlatformType {
    #[default]
    Unknown,
    Cuda,
    Rocm,
    Metal,
    Maca,
    Simulation,
}

impl PlatformType {
    pub fn as_str(self) -> &'static str {
        match self {
            PlatformType::Unknown => "unknown",
            PlatformType::Cuda => "cuda",
            PlatformType::Rocm => "rocm",
            PlatformType::Metal => "metal",
            PlatformType::Maca => "maca",
            PlatformType::Simulation => "simulation",
        }
    }
}

impl fmt::Display for PlatformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlatformType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cuda" => Ok(PlatformType::Cuda),
            "rocm" => Ok(PlatformType::Rocm),
            "metal" => Ok(PlatformType::Metal),
            "maca" => Ok(PlatformType::Maca),
            "sim" | "simulation" => Ok(PlatformType::Simulation),
            _ => anyhow::bail!("Invalid platform: {}", s),
        }
    }
}

/// Static snapshot of one device, immutable once queried
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_id: DeviceId,
    pub name: String,
    pub vendor: String,
    pub compute_major: u32,
    pub compute_minor: u32,

    /// Total device memory in bytes
    pub total_memory: u64,

    pub multiprocessor_count: u32,

    /// Core clock in kHz
    pub clock_rate: u32,

    pub warp_size: u32,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            device_id: 0,
            name: String::new(),
            vendor: String::new(),
            compute_major: 0,
            compute_minor: 0,
            total_memory: 0,
            multiprocessor_count: 0,
            clock_rate: 0,
            warp_size: 32,
        }
    }
}

impl DeviceInfo {
    /// Compute capability formatted as `major.minor`
    pub fn compute_capability(&self) -> String {
        format!("{}.{}", self.compute_major, self.compute_minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_info_default() {
        let info = DeviceInfo::default();
        assert_eq!(info.device_id, 0);
        assert!(info.name.is_empty());
        assert_eq!(info.compute_major, 0);
        assert_eq!(info.compute_minor, 0);
        assert_eq!(info.warp_size, 32);
    }

    #[test]
    fn test_platform_parse() {
        assert_eq!("CUDA".parse::<PlatformType>().unwrap(), PlatformType::Cuda);
        assert_eq!("sim".parse::<PlatformType>().unwrap(), PlatformType::Simulation);
        assert!("opencl".parse::<PlatformType>().is_err());
    }
}
