//! Operational HTTP surface: health and moderation hooks

pub mod middleware;
pub mod routes;

pub use routes::{build_router, ApiError};
