//! The generator: drives the six phases from declarative configuration to a
//! submittable task graph.

pub mod artifacts;
pub mod generator;
pub mod morph;
pub mod registration;
pub mod submit;
pub mod target;
pub mod verify;

pub use generator::{Generator, GeneratorBuilder};
pub use registration::register_hook;
pub use submit::submit_task_graph;
pub use target::{register_filter, register_target_tasks_method};
