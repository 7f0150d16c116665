//! Abstractions over the task-execution platform and version control.

pub mod client;
pub mod http;
pub mod retry;
pub mod vcs;

pub use client::{PlatformClient, TaskState, TaskStatus};
pub use http::HttpPlatformClient;
pub use retry::RetryPolicy;
pub use vcs::{GitRepo, Vcs};
