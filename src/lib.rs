pub mod error;
pub mod math;
pub mod operations;
pub mod pipeline;
pub mod terrain;
pub mod tessellation;
pub mod topology;

pub use error::{Degeneracy, DegeneracyKind, Result, TerrameshError};
pub use pipeline::{BuildScene, PipelineParams, SceneInput, SceneOutput};
