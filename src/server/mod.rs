//! Server module
//!
//! The axum HTTP server: feedback routes, CORS middleware, and the
//! startup/shutdown handle used by both `main` and the integration
//! tests.

pub mod cors;
pub mod http;
pub mod startup;

pub use http::{create_router, AppState};
pub use startup::{run_server_with_config, ServerConfig, ServerHandle};
