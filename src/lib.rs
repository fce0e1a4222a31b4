//! Pontoon - blackjack game-state and settlement service
//!
//! A single-process table service: RocksDB-backed records, a pure game
//! engine, idempotent settlement, and an axum HTTP front. Games survive
//! restarts; money moves only through atomic write batches.

pub mod api;
pub mod config;
pub mod errors;
pub mod game;
pub mod metrics;
pub mod record_store;
pub mod storage;

pub use config::PontoonConfig;
pub use errors::{GameError, PontoonResult};
