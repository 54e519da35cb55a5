//! Error types for the resource pool

use crate::lease::ResourceId;
use std::time::Duration;
use thiserror::Error;

/// Error produced by a resource factory
pub type FactoryError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Resource factory failed: {0}")]
    FactoryFailed(#[source] FactoryError),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Resource {0} is not checked out from this pool")]
    DoubleRelease(ResourceId),

    #[error("Pool is closed")]
    PoolClosed,

    #[error("Invalid pool configuration: {0}")]
    InvalidConfiguration(String),
}

pub type PoolResult<T> = Result<T, PoolError>;
