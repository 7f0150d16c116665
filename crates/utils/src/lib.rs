//! Shared helpers for the kindling workspace.

pub mod merge;
pub mod path;
pub mod slugid;
pub mod time;
pub mod yaml;

pub use merge::deep_merge;
pub use path::{get_path, set_path, visit_path};
pub use slugid::slugid;
pub use time::{current_json_time, json_time_from_now, parse_time_offset};
pub use yaml::{load_yaml, load_yaml_cached};
