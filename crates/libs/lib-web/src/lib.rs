//! # Web Library
//!
//! Gateway HTTP surface: own endpoints, guard middleware, the reverse proxy and server wiring.

pub mod cookies;
pub mod handlers;
pub mod middleware;
pub mod proxy;
pub mod server;

pub use server::{create_router, start_server, AppState, ServerConfig};
