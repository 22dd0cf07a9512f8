//! # Strategy Worker Crate
//!
//! Supervises one `tokio::task` per running strategy instance: subscribes
//! it to market data, feeds bars through `populate_indicators`/`on_data`,
//! forwards any resulting proposal to the Capital Manager, and restarts it
//! on crash or resource-cap breach.
//!
//! Generalizes the teacher's `engine::Engine.bots: HashMap<String, Bot>`
//! (a static map populated once at startup) into a full supervisor with an
//! `add`/`remove`/`start`/`stop`/`restart`/`start_all`/`stop_all`/
//! `health_check_all` operation set, status state machine, heartbeat, and
//! resource-cap enforcement, per the design spec's Strategy Worker & Manager
//! section.

pub mod error;
pub mod manager;
pub mod resources;
pub mod status;
pub mod worker;

pub use error::WorkerError;
pub use manager::{FleetHealth, StrategyWorkerManager};
pub use resources::{ResourceSampler, ResourceUsage};
pub use status::WorkerStatus;
pub use worker::{Worker, WorkerHealth};
