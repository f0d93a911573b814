//! # selfclean_pool
//!
//! Thread-safe resource pool that reuses released resources and drops the
//! ones left idle, without any explicit shutdown from callers.
//!
//! ## Features
//!
//! - Most-recently-released resources are reused first
//! - Idle entries are swept by a single one-shot timer, re-armed on every change
//! - Free entries can be downgraded to weak references under memory pressure
//! - Pluggable timer scheduling: tokio runtime or a manually driven scheduler
//! - RAII leases that release on drop
//! - Metrics with optional Prometheus export
//!
//! ## Quick Start
//!
//! ```rust
//! use selfclean_pool::{PoolConfiguration, SelfCleaningPool};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), selfclean_pool::PoolError> {
//! let config = PoolConfiguration::new().with_idle_timeout(Duration::from_secs(30));
//! let pool = SelfCleaningPool::on_current_runtime(|| String::with_capacity(1024), config)?;
//!
//! {
//!     let buffer = pool.checkout();
//!     println!("capacity: {}", buffer.capacity());
//!     // Returned to the pool when `buffer` goes out of scope
//! }
//! assert_eq!(pool.free_count(), 1);
//! # Ok(())
//! # }
//! ```

mod config;
mod entry;
mod errors;
mod metrics;
mod pool;
mod scheduler;

pub use config::{DEFAULT_IDLE_TIMEOUT, PoolConfiguration};
pub use errors::{PoolError, PoolResult};
#[cfg(feature = "metrics")]
pub use metrics::MetricsExporter;
pub use metrics::PoolMetrics;
pub use pool::{PoolPhase, PooledObject, SelfCleaningPool};
pub use scheduler::{
    ManualScheduler, ManualTimer, OneShotTimer, Scheduler, TimerCallback, TokioScheduler,
    TokioTimer,
};
