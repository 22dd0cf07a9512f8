//! # Database Crate
//!
//! High-level, application-specific interface to the PostgreSQL database.
//! The system's permanent archive for the eight persisted entities described
//! in the data model: Portfolio, PortfolioRule, Strategy, Trade, Position,
//! GridOrder, PerformanceMetric, SystemLog.
//!
//! ## Architectural Principles
//!
//! - **Adapter layer:** encapsulates all SQL, hiding the underlying schema
//!   from the rest of the application.
//! - **Asynchronous & pooled:** every operation runs against a shared
//!   `PgPool` for concurrent access from the Capital Manager, Exchange
//!   Connector, and Core Engine.
//!
//! ## Public API
//!
//! - `connect`: establish the database connection pool.
//! - `run_migrations`: apply `migrations/` via `sqlx::migrate!` at startup.
//! - `DbRepository`: the data-access struct.
//! - `DbError`: the error type returned from this crate.

pub mod connection;
pub mod error;
pub mod repository;

pub use connection::{connect, run_migrations};
pub use error::DbError;
pub use repository::DbRepository;
