//! HTTP surface of the registration service.

pub mod api;
pub mod server;

#[cfg(test)]
mod server_tests;

pub use api::*;
pub use server::{build_router, start_server, start_server_with_shutdown, AppState, SharedState};
