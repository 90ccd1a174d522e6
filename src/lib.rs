//! Void Collector - economy backend for an idle clicker game
//!
//! Server-authoritative ledger for particles, daily-capped conversion of particles
//! into withdrawable tokens, a batch payout processor, VRF-backed spins and the
//! engagement features around them. State lives in RocksDB; every mutation runs in
//! a pessimistic storage transaction.

pub mod api;
pub mod config;
pub mod conversion;
pub mod engagement;
pub mod errors;
pub mod games;
pub mod ledger;
pub mod limits;
pub mod metrics;
pub mod payout;
pub mod sanitizer;
pub mod services;
pub mod storage;

pub use config::{AppConfig, ConfigBuilder, ConfigLoader};
pub use errors::{VoidError, VoidResult};
pub use services::ServiceContainer;
