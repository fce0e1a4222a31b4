//! HTTP API service
//!
//! The table's HTTP face: routing, handlers, middleware, response models,
//! and the read caches that keep hot rows off the database.

pub mod cache;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use server::ApiServer;
