//! Middleware components for the HTTP servers

pub mod auth;
pub mod cors;
pub mod logging;

pub use auth::{basic_auth_middleware, constant_time_eq, token_auth_middleware};
pub use cors::cors_layer_from_config;
pub use logging::logging_layer;
