//! Core types and errors shared across the kindling workspace.

pub mod constants;
pub mod errors;
pub mod task;

pub use constants::*;
pub use errors::{Error, Result};
pub use task::Task;
