pub mod client;
pub mod config;
pub mod dirs;
pub mod handlers;
pub mod install;
pub mod registrar;
pub mod server;
pub mod signing;
pub mod store;

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub registrar: registrar::Registrar,
}

pub use server::{run, ServerConfig};
