//! Invoice workflow engine: definition loading, graph compilation, and
//! pause/resume execution.
//!
//! - `spec` -- JSON/YAML workflow parsing and validation
//! - `ability` -- closed set of abilities and their state merge rules
//! - `pool` -- tool selection from capability pools
//! - `payload` -- state projection handed to every tool call
//! - `context` -- per-run correlation id and tool preferences
//! - `graph` -- main/resume graph compilation and conditional routing
//! - `executor` -- single-stage execution, checkpointing, decision reload
//! - `runner` -- drives a compiled graph to completion or pause

pub mod ability;
pub mod context;
pub mod executor;
pub mod graph;
pub mod payload;
pub mod pool;
pub mod runner;
pub mod spec;

#[cfg(test)]
pub(crate) mod test_support;

pub use ability::Ability;
pub use context::RunContext;
pub use executor::{StageError, StageExecutor};
pub use graph::{CompiledGraph, Edge, GraphCompiler, GraphMode, Router};
pub use runner::{ResumeError, RunError, WorkflowRunner};
pub use spec::{ConfigError, WorkflowSpec, load_workflow_file, parse_workflow_json, parse_workflow_yaml};
