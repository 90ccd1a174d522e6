//! HTTP API
//!
//! Player endpoints, admin endpoints and the server wrapper around them.

pub mod admin;
pub mod errors;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use handlers::AppState;
pub use server::ApiServer;
