//! Pool configuration options

use crate::errors::{PoolError, PoolResult};
use std::time::Duration;

/// Default capacity of a pool
pub const DEFAULT_POOL_SIZE: usize = 64;

/// Configuration for resource pool behavior
///
/// # Examples
///
/// ```
/// use esox_resourcepool::PoolConfiguration;
/// use std::time::Duration;
///
/// let config = PoolConfiguration::<i32>::new()
///     .with_max_pool_size(10)
///     .with_timeout(Duration::from_secs(5));
///
/// assert_eq!(config.max_pool_size, 10);
/// assert_eq!(config.operation_timeout, Some(Duration::from_secs(5)));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct PoolConfiguration<T> {
    /// Maximum number of resources alive at the same time
    pub max_pool_size: usize,

    /// Default bound for acquire calls that don't pass their own timeout.
    /// `None` waits until a resource is available or the pool is closed.
    pub operation_timeout: Option<Duration>,

    /// Invoked for every resource the pool tears down
    pub destructor: Option<fn(T)>,
}

impl<T> Default for PoolConfiguration<T> {
    fn default() -> Self {
        Self {
            max_pool_size: DEFAULT_POOL_SIZE,
            operation_timeout: None,
            destructor: None,
        }
    }
}

impl<T> PoolConfiguration<T> {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum pool size
    pub fn with_max_pool_size(mut self, size: usize) -> Self {
        self.max_pool_size = size;
        self
    }

    /// Set the default acquire timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    /// Set the hook that tears resources down
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_resourcepool::PoolConfiguration;
    ///
    /// fn close_socket(fd: i32) {
    ///     println!("closing {fd}");
    /// }
    ///
    /// let config = PoolConfiguration::new().with_destructor(close_socket);
    /// assert!(config.destructor.is_some());
    /// ```
    pub fn with_destructor(mut self, destructor: fn(T)) -> Self {
        self.destructor = Some(destructor);
        self
    }

    /// Validate the configuration, returning an error if it cannot back a pool.
    pub fn validate(&self) -> PoolResult<()> {
        if self.max_pool_size == 0 {
            return Err(PoolError::InvalidConfiguration(
                "max_pool_size must be greater than 0".to_string(),
            ));
        }
        if self.operation_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(PoolError::InvalidConfiguration(
                "operation_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfiguration::<u8>::default();

        assert_eq!(config.max_pool_size, 64);
        assert!(config.operation_timeout.is_none());
        assert!(config.destructor.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = PoolConfiguration::<u8>::new().with_max_pool_size(0);
        assert!(matches!(
            config.validate(),
            Err(PoolError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = PoolConfiguration::<u8>::new().with_timeout(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(PoolError::InvalidConfiguration(_))
        ));
    }
}
