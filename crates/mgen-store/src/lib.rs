//! Job state store.
//!
//! This crate provides:
//! - The `JobStateStore` trait with monotonic, TTL-bounded snapshots
//! - In-memory and Redis backends
//! - Per-job event streams for live progress
//! - Reconciliation of tracker and store status

pub mod config;
pub mod error;
pub mod memory;
pub mod reconcile;
pub mod redis_store;
pub mod store;

pub use config::{StoreBackend, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryJobStore;
pub use reconcile::{reconcile, TrackerStatus};
pub use redis_store::RedisJobStore;
pub use store::{EventStream, JobStateStore, DEFAULT_TTL_SECS};
