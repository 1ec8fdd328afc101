//! Shared domain types for the invoice workflow engine.
//!
//! This crate contains the data that crosses crate and process boundaries:
//! the workflow document shapes, `WorkflowState` and its nested invoice
//! records, review checkpoints, application config, and repository errors.
//!
//! Zero infrastructure dependencies -- only serde, serde_json, chrono, thiserror.

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod invoice;
pub mod state;
pub mod workflow;
