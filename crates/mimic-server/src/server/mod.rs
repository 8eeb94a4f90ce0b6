//! HTTP mock server: compiled routes, dispatch engine, hot reload.

pub mod handler;
pub mod reload;
pub mod router;
#[allow(clippy::module_inception)]
pub mod server;
mod tls;

pub use server::{BoundServer, MockServer};
