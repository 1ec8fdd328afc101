//! Review HTTP surface: axum router, handlers, error mapping, response envelope.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
