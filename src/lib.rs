//! # EsoxSolutions.ResourcePool
//!
//! Capacity-bounded pool of expensive resources (database connections,
//! sockets, buffers) for async code made of many small tasks.
//!
//! ## Features
//!
//! - Lazy creation through a caller-supplied factory, never beyond capacity
//! - Strict FIFO hand-over to queued acquire calls
//! - Automatic return of resources via RAII (Drop trait)
//! - Manual leases with double-release detection
//! - Acquire timeouts and cancellation without leaking capacity
//! - Discarding broken resources, warm-up and graceful close
//! - Metrics with Prometheus export
//! - Database connection pool specialization
//!
//! ## Quick Start
//!
//! ```rust
//! use esox_resourcepool::{FactoryError, Pool, PoolConfiguration};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let pool = Pool::new(
//!     || async { Ok::<_, FactoryError>(String::from("connection")) },
//!     PoolConfiguration::new().with_max_pool_size(8),
//! )
//! .unwrap();
//!
//! {
//!     let conn = pool.acquire().await.unwrap();
//!     println!("Got: {}", *conn);
//!     // Resource automatically returned when `conn` goes out of scope
//! }
//! # }
//! ```

mod config;
mod db;
mod errors;
mod factory;
mod lease;
mod metrics;
mod pool;

pub use config::{DEFAULT_POOL_SIZE, PoolConfiguration};
pub use db::{Connector, DbConfig, DbPool};
pub use errors::{FactoryError, PoolError, PoolResult};
pub use factory::ResourceFactory;
pub use lease::{Lease, Pooled, ResourceId};
pub use metrics::{MetricsExporter, PoolMetrics};
pub use pool::Pool;
