mod point;
mod registry;

pub use point::Point;
pub use registry::{HookRegistry, PipeId};

/// Dispatch priority. Lower values fire first.
pub type Priority = i32;
