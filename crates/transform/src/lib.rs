//! The transform engine: a composable pipeline from raw task stubs to
//! concrete tasks, with validation checkpoints and process-wide registries.

pub mod context;
pub mod loaders;
pub mod registry;
pub mod sequence;
pub mod stub;
pub mod transforms;

pub use context::TransformContext;
pub use registry::{
    register_group_by, register_loader, register_run_using, register_transform,
};
pub use sequence::TransformSequence;
pub use stub::stub_to_task;

/// Register every built-in loader, transform, group-by, and run-using
/// implementation. Idempotent; called once by the generator before any kind
/// is loaded.
pub fn register_builtins() {
    use once_cell::sync::OnceCell;
    static DONE: OnceCell<()> = OnceCell::new();
    DONE.get_or_init(|| {
        loaders::register().expect("builtin loaders clash");
        transforms::register().expect("builtin transforms clash");
    });
}
