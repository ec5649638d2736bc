//! Runtime configuration
//!
//! Loaded from TOML. Every field has a default so a partial file (or none at all)
//! is valid.

use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default granularity of temporary ring blocks (4 MiB)
pub const DEFAULT_TEMPORARY_BLOCK_SIZE: u64 = 4 * 1024 * 1024;

/// Default alignment of temporary sub-allocations, matching the usual storage offset alignment
pub const DEFAULT_TEMPORARY_ALIGNMENT: u64 = 256;

/// Default particle pool capacity
pub const DEFAULT_PARTICLE_CAPACITY: u32 = 65536;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub memory: MemoryConfig,
    pub particles: ParticleConfig,
}

/// Buffer manager configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Temporary blocks are sized to a multiple of this
    pub temporary_block_size: u64,

    /// Alignment of every temporary sub-range
    pub temporary_alignment: u64,

    /// Panic when a temporary handle is used after the ring was reset.
    /// When off, the use is reported as `BufferError::StaleTemporary`.
    pub assert_temporary_lifetime: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            temporary_block_size: DEFAULT_TEMPORARY_BLOCK_SIZE,
            temporary_alignment: DEFAULT_TEMPORARY_ALIGNMENT,
            assert_temporary_lifetime: cfg!(debug_assertions),
        }
    }
}

/// Particle pool and point sprite configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleConfig {
    /// Number of particle slots, fixed for the lifetime of the system
    pub capacity: u32,

    /// Base point size in pixels
    pub point_size: f32,

    pub point_size_min: f32,
    pub point_size_max: f32,

    /// Distance attenuation `(a, b, c)`: `size / (a + b*d + c*d*d)`; a TOML array of three
    pub attenuation: Vec3,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_PARTICLE_CAPACITY,
            point_size: 8.0,
            point_size_min: 1.0,
            point_size_max: 64.0,
            attenuation: Vec3::new(1.0, 0.0, 0.01),
        }
    }
}

impl ParticleConfig {
    /// Point size after distance attenuation, as evaluated by the particle vertex stage
    pub fn attenuated_size(&self, distance: f32) -> f32 {
        let [a, b, c] = self.attenuation.to_array();
        let denom = a + b * distance + c * distance * distance;
        let size = if denom > 0.0 { self.point_size / denom } else { self.point_size_max };
        size.clamp(self.point_size_min, self.point_size_max)
    }
}

impl RuntimeConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&text)?;
        log::info!(
            "[RuntimeConfig] Loaded {} (capacity {}, block size {} bytes)",
            path.as_ref().display(),
            config.particles.capacity,
            config.memory.temporary_block_size
        );
        Ok(config)
    }

    /// Check the invariants the runtime relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        let memory = &self.memory;
        if memory.temporary_alignment == 0 || !memory.temporary_alignment.is_power_of_two() {
            return Err(ConfigError::Invalid(format!(
                "temporary_alignment must be a power of two, got {}",
                memory.temporary_alignment
            )));
        }
        if !memory.temporary_block_size.is_power_of_two()
            || memory.temporary_block_size < memory.temporary_alignment
        {
            return Err(ConfigError::Invalid(format!(
                "temporary_block_size must be a power of two no smaller than the alignment, got {}",
                memory.temporary_block_size
            )));
        }

        let particles = &self.particles;
        if particles.capacity == 0 {
            return Err(ConfigError::Invalid("particle capacity must be at least 1".into()));
        }
        if particles.point_size_min > particles.point_size_max {
            return Err(ConfigError::Invalid(format!(
                "point_size_min ({}) exceeds point_size_max ({})",
                particles.point_size_min, particles.point_size_max
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = RuntimeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.memory.temporary_block_size, 4 * 1024 * 1024);
        assert_eq!(config.memory.temporary_alignment, 256);
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let config = RuntimeConfig::from_toml_str("[particles]\ncapacity = 4\n").unwrap();
        assert_eq!(config.particles.capacity, 4);
        assert_eq!(config.memory, MemoryConfig::default());
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let err = RuntimeConfig::from_toml_str("[particles]\ncapacity = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_unaligned_block_size() {
        let text = "[memory]\ntemporary_block_size = 1000\n";
        assert!(matches!(
            RuntimeConfig::from_toml_str(text),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        assert!(matches!(
            RuntimeConfig::from_toml_str("[particles\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[memory]\ntemporary_block_size = 65536\n[particles]\ncapacity = 128").unwrap();

        let config = RuntimeConfig::load(file.path()).unwrap();
        assert_eq!(config.memory.temporary_block_size, 65536);
        assert_eq!(config.particles.capacity, 128);
    }

    #[test]
    fn test_attenuated_size_clamps() {
        let config = ParticleConfig {
            point_size: 10.0,
            point_size_min: 2.0,
            point_size_max: 6.0,
            attenuation: Vec3::new(1.0, 0.0, 1.0),
            ..ParticleConfig::default()
        };
        assert_eq!(config.attenuated_size(0.0), 6.0);
        assert_eq!(config.attenuated_size(1.0), 5.0);
        assert_eq!(config.attenuated_size(100.0), 2.0);
    }

    #[test]
    fn test_attenuation_reads_as_an_array() {
        let text = "[particles]\nattenuation = [0.5, 0.25, 0.125]\n";
        let config = RuntimeConfig::from_toml_str(text).unwrap();
        assert_eq!(config.particles.attenuation, Vec3::new(0.5, 0.25, 0.125));

        let written = toml::to_string(&config).unwrap();
        assert_eq!(RuntimeConfig::from_toml_str(&written).unwrap(), config);
    }
}
