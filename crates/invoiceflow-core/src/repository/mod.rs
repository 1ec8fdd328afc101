//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (invoiceflow-infra) implements. The core crate never depends on any
//! specific storage technology; `memory` provides an in-process store for
//! tests and single-process use.

pub mod checkpoint;
pub mod memory;

/// Default page size for review-queue listings.
pub const DEFAULT_LIST_LIMIT: u32 = 50;
