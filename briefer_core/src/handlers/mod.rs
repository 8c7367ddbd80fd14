//! HTTP handlers

pub mod ai;
pub mod files;
pub mod routes;

pub use routes::{bridge_prefix, create_ai_routes, create_bridge_routes};
