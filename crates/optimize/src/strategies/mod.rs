//! Built-in optimization strategies.

mod index_search;
mod skip_unless_changed;

pub use index_search::IndexSearch;
pub use skip_unless_changed::SkipUnlessChanged;
