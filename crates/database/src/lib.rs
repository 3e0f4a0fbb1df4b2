//! # Telemetry Database Crate
//!
//! This crate acts as a high-level, application-specific interface to the
//! SQLite store that holds every account's equity curve and position
//! snapshots.
//!
//! ## Layout
//!
//! Each account owns a pair of tables, namespaced by its id:
//!
//! - `{account}_total_equity (timestamp INTEGER, equity REAL)`, append-only.
//! - `{account}_net_positions (timestamp INTEGER, symbol TEXT, contracts REAL)`,
//!   unique on `(timestamp, symbol)` so writes are upserts.
//!
//! Table names are only ever built by [`AccountTables`] from a validated
//! [`core_types::AccountId`].
//!
//! ## Public API
//!
//! - `connect`: opens the pooled SQLite store.
//! - `AccountTables`: the typed per-account table pair.
//! - `DbRepository`: schema creation, append/upsert, atomic snapshot writes and
//!   read-back queries.
//! - `DbError`: the specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod connection;
pub mod error;
pub mod repository;
pub mod schema;

// Re-export the key components to create a clean, public-facing API.
pub use connection::{connect, connect_in_memory};
pub use error::DbError;
pub use repository::DbRepository;
pub use schema::AccountTables;
