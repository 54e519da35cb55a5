//! Resource factories

use crate::errors::FactoryError;
use async_trait::async_trait;
use std::future::Future;

/// Produces the resources a pool hands out
///
/// Any `Fn() -> impl Future<Output = Result<T, FactoryError>>` closure is a
/// factory, so most pools never implement this trait by hand.
///
/// # Examples
///
/// ```
/// use esox_resourcepool::{FactoryError, Pool, PoolConfiguration};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let pool = Pool::new(
///     || async { Ok::<_, FactoryError>(String::from("session")) },
///     PoolConfiguration::new().with_max_pool_size(2),
/// )
/// .unwrap();
///
/// let session = pool.acquire().await.unwrap();
/// assert_eq!(session.as_str(), "session");
/// # }
/// ```
#[async_trait]
pub trait ResourceFactory: Send + Sync {
    type Resource;

    /// Create one resource
    async fn create(&self) -> Result<Self::Resource, FactoryError>;
}

#[async_trait]
impl<F, Fut, T> ResourceFactory for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, FactoryError>> + Send + 'static,
    T: Send + 'static,
{
    type Resource = T;

    async fn create(&self) -> Result<T, FactoryError> {
        (self)().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter;

    #[async_trait]
    impl ResourceFactory for Counter {
        type Resource = u32;

        async fn create(&self) -> Result<u32, FactoryError> {
            Ok(7)
        }
    }

    #[tokio::test]
    async fn test_closure_factory() {
        let factory = || async { Ok::<_, FactoryError>(42) };
        assert_eq!(factory.create().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_struct_factory_as_trait_object() {
        let factory: Box<dyn ResourceFactory<Resource = u32>> = Box::new(Counter);
        assert_eq!(factory.create().await.unwrap(), 7);
    }
}
