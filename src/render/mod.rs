//! wgpu backend for the terrain clipmap

pub mod clipmap_pipeline;
pub mod clipmap_textures;

pub use clipmap_pipeline::{FrameUniforms, WgpuClipMapRenderer};
pub use clipmap_textures::WgpuTerrainTextures;
