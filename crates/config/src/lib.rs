//! Configuration surfaces: the declarative schema validator, `by-*`
//! conditional resolution, the repository-level `GraphConfig`, and per-kind
//! `kind.yml` handling.

pub mod graph_config;
pub mod keyed_by;
pub mod kind;
pub mod schema;

pub use graph_config::GraphConfig;
pub use keyed_by::resolve_keyed_by;
pub use kind::Kind;
pub use schema::{Field, Schema};
