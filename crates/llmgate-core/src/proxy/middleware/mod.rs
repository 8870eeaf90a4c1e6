// Middleware module - Axum middleware

pub mod auth;
pub mod monitor;
pub mod recover;

pub use auth::{auth_middleware, AccessGate};
pub use monitor::monitor_middleware;
pub use recover::recover_middleware;
