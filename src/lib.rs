//! Dukat - geometry clipmap terrain and 2D collision cores

pub mod core;
pub mod math;
pub mod config;
pub mod terrain;
pub mod collision;
pub mod render;
