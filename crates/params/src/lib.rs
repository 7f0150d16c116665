//! Parameters: the typed, validated, immutable bundle describing the event
//! that triggered a generation.

pub mod loader;
pub mod parameters;

pub use loader::{defaults_from_vcs, load_parameters, ParametersSpec};
pub use parameters::test_support;
pub use parameters::{register_parameters_extension, EnableAlwaysTarget, Parameters};
