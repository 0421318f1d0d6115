pub mod engine;
pub mod terraform;

pub use engine::{EngineError, IacEngine};
pub use terraform::TerraformEngine;
