//! Infrastructure layer for invoiceflow.
//!
//! Contains implementations of the ports defined in `invoiceflow-core`:
//! the SQLite review queue, the local `COMMON`/`ATLAS` tool providers, and
//! the data-directory and `config.toml` adapters.

pub mod config;
pub mod filesystem;
pub mod sqlite;
pub mod tools;
