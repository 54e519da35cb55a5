//! Checked-out resources
//!
//! A [`Lease`] is the raw form of a checkout and should be handed back with
//! [`Pool::release`] or [`Pool::discard`]. A lease that is dropped instead
//! is discarded, so its slot is never lost. A [`Pooled`] wraps a checkout
//! and returns it for reuse by itself when it goes out of scope.
//!
//! [`Pool::release`]: crate::Pool::release
//! [`Pool::discard`]: crate::Pool::discard

use crate::errors::PoolResult;
use crate::pool::PoolInner;

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Weak};

/// Identity of a resource inside the pool that created it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId {
    pub(crate) pool: u64,
    pub(crate) serial: u64,
}

impl ResourceId {
    /// Id of the owning pool
    pub fn pool(&self) -> u64 {
        self.pool
    }

    /// Creation order of the resource within its pool, starting at 0
    pub fn serial(&self) -> u64 {
        self.serial
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool-{}/resource-{}", self.pool, self.serial)
    }
}

/// A resource and its identity, as the pool keeps it
pub(crate) struct Entry<T> {
    pub(crate) id: ResourceId,
    pub(crate) resource: T,
}

/// A resource checked out from a pool that must be released by hand
///
/// Dropping a lease without [`Pool::release`] destroys the resource and
/// frees its slot, as [`Pool::discard`] would.
///
/// [`Pool::release`]: crate::Pool::release
/// [`Pool::discard`]: crate::Pool::discard
#[must_use = "a lease that is dropped without being released destroys its resource"]
pub struct Lease<T> {
    entry: Option<Entry<T>>,
    pool: Weak<PoolInner<T>>,
}

impl<T> Lease<T> {
    pub(crate) fn new(entry: Entry<T>, pool: Weak<PoolInner<T>>) -> Self {
        Self {
            entry: Some(entry),
            pool,
        }
    }

    pub fn id(&self) -> ResourceId {
        self.entry().id
    }

    pub(crate) fn into_entry(mut self) -> Entry<T> {
        self.entry.take().expect("Lease already returned")
    }

    fn entry(&self) -> &Entry<T> {
        self.entry.as_ref().expect("Lease already returned")
    }
}

impl<T> Deref for Lease<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.entry().resource
    }
}

impl<T> DerefMut for Lease<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.entry.as_mut().expect("Lease already returned").resource
    }
}

impl<T: fmt::Debug> fmt::Debug for Lease<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entry = self.entry();
        f.debug_struct("Lease")
            .field("id", &entry.id)
            .field("resource", &entry.resource)
            .finish()
    }
}

impl<T> Drop for Lease<T> {
    fn drop(&mut self) {
        let Some(entry) = self.entry.take() else {
            return;
        };
        // Without a pool there is no slot left to free
        let Some(pool) = self.pool.upgrade() else {
            return;
        };
        let id = entry.id;
        tracing::warn!(resource = %id, "lease dropped without release, discarding resource");
        if let Err(err) = pool.discard(entry) {
            tracing::warn!(resource = %id, error = %err, "failed to discard dropped lease");
        }
    }
}

/// A pooled resource that automatically returns to the pool when dropped
///
/// Derefs to the resource, so it can be used wherever the resource can.
/// `Display` and `Debug` print the resource itself.
///
/// # Examples
///
/// ```
/// use esox_resourcepool::{FactoryError, Pool, PoolConfiguration};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let pool = Pool::new(|| async { Ok::<_, FactoryError>(vec![1, 2]) }, PoolConfiguration::new()).unwrap();
///
/// {
///     let mut buffer = pool.acquire().await.unwrap();
///     buffer.push(3);
///     assert_eq!(buffer.len(), 3);
/// }
///
/// assert_eq!(pool.idle_count(), 1);
/// # }
/// ```
pub struct Pooled<T> {
    entry: Option<Entry<T>>,
    pool: Arc<PoolInner<T>>,
}

impl<T> Pooled<T> {
    pub(crate) fn new(entry: Entry<T>, pool: Arc<PoolInner<T>>) -> Self {
        Self {
            entry: Some(entry),
            pool,
        }
    }

    pub fn id(&self) -> ResourceId {
        self.entry().id
    }

    /// Return the resource to the pool now instead of at drop
    pub fn release(mut self) -> PoolResult<()> {
        match self.entry.take() {
            Some(entry) => self.pool.release(entry),
            None => Ok(()),
        }
    }

    /// Destroy the resource instead of returning it, freeing its slot
    pub fn discard(mut self) -> PoolResult<()> {
        match self.entry.take() {
            Some(entry) => self.pool.discard(entry),
            None => Ok(()),
        }
    }

    /// Turn off automatic return; the caller takes over the lease
    pub fn detach(mut self) -> Lease<T> {
        let entry = self.entry.take().expect("Lease already returned");
        Lease::new(entry, Arc::downgrade(&self.pool))
    }

    fn entry(&self) -> &Entry<T> {
        self.entry.as_ref().expect("Lease already returned")
    }
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.entry().resource
    }
}

impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.entry.as_mut().expect("Lease already returned").resource
    }
}

impl<T> AsRef<T> for Pooled<T> {
    fn as_ref(&self) -> &T {
        self
    }
}

impl<T> AsMut<T> for Pooled<T> {
    fn as_mut(&mut self) -> &mut T {
        self
    }
}

impl<T: fmt::Display> fmt::Display for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&**self, f)
    }
}

impl<T: fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<T> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            let id = entry.id;
            if let Err(err) = self.pool.release(entry) {
                tracing::warn!(resource = %id, error = %err, "failed to return pooled resource");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfiguration;
    use crate::errors::FactoryError;
    use crate::pool::Pool;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn counting_pool(capacity: usize) -> Pool<u32> {
        let next = Arc::new(AtomicU32::new(0));
        Pool::new(
            move || {
                let next = Arc::clone(&next);
                async move { Ok::<_, FactoryError>(next.fetch_add(1, Ordering::SeqCst)) }
            },
            PoolConfiguration::new().with_max_pool_size(capacity),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_drop_returns_resource() {
        let pool = counting_pool(1);

        {
            let obj = pool.acquire().await.unwrap();
            assert_eq!(*obj, 0);
            assert_eq!(pool.idle_count(), 0);
        }

        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.get_metrics().total_released, 1);
    }

    #[tokio::test]
    async fn test_explicit_release_then_drop_returns_once() {
        let pool = counting_pool(1);

        let obj = pool.acquire().await.unwrap();
        obj.release().unwrap();

        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.get_metrics().total_released, 1);
    }

    #[tokio::test]
    async fn test_detach_hands_over_lease() {
        let pool = counting_pool(1);

        let lease = pool.acquire().await.unwrap().detach();
        assert_eq!(pool.idle_count(), 0);

        pool.release(lease).unwrap();
        assert_eq!(pool.idle_count(), 1);
    }

    #[tokio::test]
    async fn test_discard_frees_slot() {
        let pool = counting_pool(1);

        pool.acquire().await.unwrap().discard().unwrap();
        assert_eq!(pool.created_count(), 0);

        let obj = pool.acquire().await.unwrap();
        assert_eq!(*obj, 1);
    }

    #[tokio::test]
    async fn test_formatting_delegates_to_resource() {
        let pool = Pool::new(
            || async { Ok::<_, FactoryError>(String::from("conn#1")) },
            PoolConfiguration::new(),
        )
        .unwrap();

        let obj = pool.acquire().await.unwrap();
        assert_eq!(obj.to_string(), "conn#1");
        assert_eq!(format!("{obj:?}"), "\"conn#1\"");
        assert_eq!(obj.as_ref().len(), 6);
    }

    #[tokio::test]
    async fn test_dropped_lease_is_discarded() {
        let pool = counting_pool(1);

        {
            let _lease = pool.lease().await.unwrap();
        }

        assert_eq!(pool.created_count(), 0);
        assert_eq!(pool.get_metrics().total_discarded, 1);
        let next = pool.lease_timeout(Duration::from_millis(50)).await.unwrap();
        assert_eq!(*next, 1);
        pool.release(next).unwrap();
    }

    #[tokio::test]
    async fn test_detached_lease_dropped_frees_slot() {
        let pool = counting_pool(1);

        drop(pool.acquire().await.unwrap().detach());

        assert_eq!(pool.created_count(), 0);
        assert_eq!(pool.outstanding_count(), 0);
    }

    #[tokio::test]
    async fn test_lease_outliving_pool_drops_quietly() {
        let pool = counting_pool(1);
        let lease = pool.lease().await.unwrap();

        drop(pool);
        assert_eq!(*lease, 0);
        drop(lease);
    }

    #[test]
    fn test_resource_id_display() {
        let id = ResourceId { pool: 3, serial: 9 };
        assert_eq!(id.to_string(), "pool-3/resource-9");
    }
}
