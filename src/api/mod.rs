//! HTTP API for the settlement engine.
//!
//! One route per operation, JSON in and out. Player routes authenticate via
//! the identity-integrity header; service routes via the shared API key.

pub mod auth;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
pub mod service;

pub use server::ApiServer;
