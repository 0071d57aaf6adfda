//! Heightmaps and clipmap terrain

pub mod heightmap;
pub use heightmap::{GridRect, HeightLevel, HeightMap, HeightSource};

pub mod generator;
pub use generator::{GeneratorKind, PerlinParams};

pub mod clipmap;
pub use clipmap::{ClipMap, ClipMapLevel, ClipMapStats, Orientation};
