//! Capture configuration

use std::path::Path;

use serde::{Deserialize, Serialize};
use streamscope_shared::EventType;

use crate::error::{CaptureError, Result};

/// Default capture buffer capacity, in events.
///
/// The bounded channel allocates every slot up front, roughly 150 bytes per
/// event, so this default costs about 150 MB at `initialize`. Size
/// `buffer_size` to the expected burst rather than relying on it.
pub const DEFAULT_BUFFER_SIZE: usize = 1_000_000;

/// Largest accepted buffer; the channel preallocates every slot
pub const MAX_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// Environment variable overriding `buffer_size`
pub const BUFFER_SIZE_ENV: &str = "STREAMSCOPE_BUFFER_SIZE";

/// Profiler configuration. Immutable once a session is initialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    pub capture_kernels: bool,
    pub capture_memcpy: bool,
    pub capture_memset: bool,
    pub capture_sync: bool,

    /// Attach host call stacks to events (expensive, off by default)
    pub capture_callstacks: bool,

    /// Capture buffer capacity in events
    pub buffer_size: usize,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            capture_kernels: true,
            capture_memcpy: true,
            capture_memset: true,
            capture_sync: true,
            capture_callstacks: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl ProfilerConfig {
    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| CaptureError::Config(e.to_string()))
    }

    /// Load a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CaptureError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    /// Apply overrides from the process environment
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup. Unparseable values are
    /// ignored.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(size) = lookup(BUFFER_SIZE_ENV).and_then(|s| s.trim().parse().ok()) {
            self.buffer_size = size;
        }
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(CaptureError::InvalidBufferSize);
        }

        if self.buffer_size > MAX_BUFFER_SIZE {
            return Err(CaptureError::Config(format!(
                "buffer_size {} exceeds maximum {}",
                self.buffer_size, MAX_BUFFER_SIZE
            )));
        }

        Ok(())
    }

    /// Whether events of this type pass the capture filters
    pub fn captures(&self, event_type: EventType) -> bool {
        if event_type.is_kernel() {
            self.capture_kernels
        } else if event_type.is_memcpy() {
            self.capture_memcpy
        } else if event_type.is_memset() {
            self.capture_memset
        } else if event_type.is_sync() {
            self.capture_sync
        } else {
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProfilerConfig::default();
        assert!(config.capture_kernels);
        assert!(config.capture_memcpy);
        assert!(config.capture_memset);
        assert!(config.capture_sync);
        assert!(!config.capture_callstacks);
        assert_eq!(config.buffer_size, 1_000_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_buffer_is_rejected() {
        let config = ProfilerConfig {
            buffer_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CaptureError::InvalidBufferSize)
        ));
    }

    #[test]
    fn test_oversized_buffer_is_rejected() {
        let config = ProfilerConfig {
            buffer_size: MAX_BUFFER_SIZE + 1,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CaptureError::Config(_))));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ProfilerConfig::from_toml_str(
            r#"
            capture_memcpy = false
            buffer_size = 4096
            "#,
        )
        .unwrap();
        assert!(!config.capture_memcpy);
        assert!(config.capture_kernels);
        assert_eq!(config.buffer_size, 4096);
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(
            ProfilerConfig::from_toml_str("buffer_size = \"lots\""),
            Err(CaptureError::Config(_))
        ));
    }

    #[test]
    fn test_env_override() {
        let config = ProfilerConfig::default().with_overrides_from(|key| {
            (key == BUFFER_SIZE_ENV).then(|| "2048".to_string())
        });
        assert_eq!(config.buffer_size, 2048);

        let untouched =
            ProfilerConfig::default().with_overrides_from(|_| Some("not a number".to_string()));
        assert_eq!(untouched.buffer_size, DEFAULT_BUFFER_SIZE);
    }

    #[test]
    fn test_filters() {
        let config = ProfilerConfig {
            capture_kernels: false,
            capture_sync: false,
            ..Default::default()
        };
        assert!(!config.captures(EventType::KernelLaunch));
        assert!(!config.captures(EventType::KernelComplete));
        assert!(!config.captures(EventType::StreamSync));
        assert!(!config.captures(EventType::DeviceSync));
        assert!(config.captures(EventType::MemcpyH2D));
        assert!(config.captures(EventType::MemsetAsync));
        assert!(config.captures(EventType::Marker));
    }
}
