//! Workflow engine and port definitions for invoiceflow.
//!
//! This crate defines the "ports" (`CheckpointStore`, `ToolInvoker`) that the
//! infrastructure layer implements, plus the stage-graph engine that drives
//! them. It depends only on `invoiceflow-types` -- never on
//! `invoiceflow-infra` or any database/IO crate.

pub mod repository;
pub mod tool;
pub mod workflow;
