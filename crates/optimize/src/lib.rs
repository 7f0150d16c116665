//! The optimizer: prunes tasks whose work can be skipped or substituted by
//! previously-computed results.

pub mod engine;
pub mod log;
pub mod strategies;
pub mod strategy;

pub use engine::{optimize_task_graph, OptimizedGraph};
pub use log::{OptimizationLog, OptimizationRecord};
pub use strategy::{
    default_strategies, register_strategy, OptimizationStrategy, PlatformData, StrategyMap,
};
