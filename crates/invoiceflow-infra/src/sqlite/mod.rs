//! SQLite storage layer.
//!
//! The human review queue, backed by SQLite with WAL mode and split
//! read/write connection pools.

pub mod checkpoint;
pub mod pool;
