//! Engine configuration for the terrain and collision cores

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::Result;
use crate::terrain::generator::GeneratorKind;

/// Source heightmap settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeightMapConfig {
    /// Samples per side of the finest level (power of two)
    pub size: u32,
    /// World height of a stored value of 1.0
    pub scale_factor: f32,
    pub generator: GeneratorKind,
}

impl Default for HeightMapConfig {
    fn default() -> Self {
        Self {
            size: 1024,
            scale_factor: 64.0,
            generator: GeneratorKind::default(),
        }
    }
}

/// Clipmap terrain settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipMapConfig {
    /// Number of nested levels
    pub num_levels: u32,
    /// Vertices per level side; must be `2^k - 1` and at least 7
    pub level_size: u32,
    /// A level is skipped while its width is below this multiple of the
    /// observer's height above ground
    pub lod_altitude_factor: f32,
    /// Frustum-cull blocks against their bounding boxes
    pub culling: bool,
    /// Draw degenerate perimeter strips between levels
    pub perimeter_stitching: bool,
}

impl Default for ClipMapConfig {
    fn default() -> Self {
        Self {
            num_levels: 6,
            level_size: 255,
            lod_altitude_factor: 2.5,
            culling: true,
            perimeter_stitching: true,
        }
    }
}

impl ClipMapConfig {
    pub fn new(num_levels: u32, level_size: u32) -> Self {
        Self {
            num_levels,
            level_size,
            ..Default::default()
        }
    }

    /// Check the level-size and level-count preconditions
    pub fn validate(&self) -> Result<()> {
        if self.level_size < 7 || !(self.level_size + 1).is_power_of_two() {
            return Err(Error::InvalidLevelSize(self.level_size));
        }
        if self.num_levels == 0 || self.num_levels > 24 {
            return Err(Error::InvalidConfig(format!(
                "clipmap needs between 1 and 24 levels, got {}",
                self.num_levels
            )));
        }
        Ok(())
    }
}

/// Collision manager settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionConfig {
    /// Body pool capacity
    pub max_bodies: usize,
    pub quadtree_max_depth: u32,
    /// Items a quadtree leaf holds before splitting
    pub quadtree_node_capacity: usize,
    /// Horizontal separation applied when two boxes share a centre
    pub degenerate_nudge: f32,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self {
            max_bodies: 1024,
            quadtree_max_depth: 8,
            quadtree_node_capacity: 8,
            degenerate_nudge: 0.01,
        }
    }
}

impl CollisionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_bodies == 0 || self.max_bodies > u16::MAX as usize + 1 {
            return Err(Error::InvalidConfig(format!(
                "max_bodies must be in 1..=65536, got {}",
                self.max_bodies
            )));
        }
        if !(self.degenerate_nudge > 0.0) {
            return Err(Error::InvalidConfig("degenerate_nudge must be positive".into()));
        }
        Ok(())
    }
}

/// Top-level configuration file
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub heightmap: HeightMapConfig,
    pub clipmap: ClipMapConfig,
    pub collision: CollisionConfig,
}

impl EngineConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let config: EngineConfig = serde_json::from_str(&json)?;
        config.clipmap.validate()?;
        config.collision.validate()?;
        Ok(config)
    }

    /// Save as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_size_validation() {
        for ok in [7, 15, 63, 255, 1023] {
            assert!(ClipMapConfig::new(4, ok).validate().is_ok(), "{} should be valid", ok);
        }
        for bad in [0, 3, 6, 8, 64, 100, 256] {
            assert!(
                matches!(ClipMapConfig::new(4, bad).validate(), Err(Error::InvalidLevelSize(_))),
                "{} should be rejected",
                bad
            );
        }
        assert!(ClipMapConfig::new(0, 63).validate().is_err());
    }

    #[test]
    fn test_collision_validation() {
        assert!(CollisionConfig::default().validate().is_ok());
        let bad = CollisionConfig { max_bodies: 0, ..Default::default() };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "clipmap": { "num_levels": 3 } }"#).unwrap();
        assert_eq!(config.clipmap.num_levels, 3);
        assert_eq!(config.clipmap.level_size, 255);
        assert_eq!(config.collision.max_bodies, 1024);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        let mut config = EngineConfig::default();
        config.clipmap.level_size = 63;
        config.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_rejects_bad_level_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{ "clipmap": { "level_size": 64 } }"#).unwrap();
        assert!(matches!(EngineConfig::load(&path), Err(Error::InvalidLevelSize(64))));
    }
}
