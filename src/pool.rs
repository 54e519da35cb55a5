//! Core resource pool implementation

use crate::config::PoolConfiguration;
use crate::errors::{PoolError, PoolResult};
use crate::factory::ResourceFactory;
use crate::lease::{Entry, Lease, Pooled, ResourceId};
use crate::metrics::{MetricsExporter, MetricsTracker, Occupancy, PoolMetrics};

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(0);

/// What a queued acquire call is woken up with
enum Grant<T> {
    /// A released resource; it stays registered as checked out
    Resource(Entry<T>),
    /// A capacity slot, already counted in `created`
    Slot,
}

struct Waiter<T> {
    id: u64,
    grant: oneshot::Sender<Grant<T>>,
}

struct PoolState<T> {
    /// Most recently returned resource last
    idle: Vec<Entry<T>>,
    checked_out: HashSet<u64>,
    created: usize,
    waiters: VecDeque<Waiter<T>>,
    closed: bool,
    next_serial: u64,
    next_waiter: u64,
}

impl<T> PoolState<T> {
    fn new(capacity: usize) -> Self {
        Self {
            idle: Vec::with_capacity(capacity),
            checked_out: HashSet::with_capacity(capacity),
            created: 0,
            waiters: VecDeque::new(),
            closed: false,
            next_serial: 0,
            next_waiter: 0,
        }
    }

    fn owns(&self, pool: u64, id: ResourceId) -> bool {
        id.pool == pool && self.checked_out.contains(&id.serial)
    }

    /// Give `grant` to the oldest waiter still listening. Hands it back if
    /// nobody took it.
    fn hand_off(&mut self, mut grant: Grant<T>) -> Option<Grant<T>> {
        while let Some(waiter) = self.waiters.pop_front() {
            match waiter.grant.send(grant) {
                Ok(()) => return None,
                Err(unclaimed) => grant = unclaimed,
            }
        }
        Some(grant)
    }

    /// Park a checked-out entry. Returns it when the pool is closed and the
    /// resource has to be destroyed instead.
    fn check_in(&mut self, entry: Entry<T>) -> Option<Entry<T>> {
        let Some(Grant::Resource(entry)) = self.hand_off(Grant::Resource(entry)) else {
            return None;
        };
        self.checked_out.remove(&entry.id.serial);
        if self.closed {
            self.created -= 1;
            Some(entry)
        } else {
            self.idle.push(entry);
            None
        }
    }

    /// Pass a freed slot to the oldest waiter, or give it up.
    fn free_slot(&mut self) {
        if self.hand_off(Grant::Slot).is_some() {
            self.created -= 1;
        }
    }
}

pub(crate) struct PoolInner<T> {
    id: u64,
    factory: Box<dyn ResourceFactory<Resource = T>>,
    config: PoolConfiguration<T>,
    state: Mutex<PoolState<T>>,
    metrics: MetricsTracker,
}

/// A counted slot whose resource has not been created yet.
///
/// Dropping it unused frees the slot, so a failed or cancelled creation
/// never leaks capacity.
struct SlotReservation<'a, T> {
    inner: &'a PoolInner<T>,
    armed: bool,
}

impl<T> SlotReservation<'_, T> {
    fn commit(mut self) {
        self.armed = false;
    }
}

impl<T> Drop for SlotReservation<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.state.lock().free_slot();
        }
    }
}

/// A queued acquire call. Dropped before it is granted, it leaves the queue
/// and passes on anything it was handed in the meantime.
struct PendingWaiter<'a, T> {
    inner: &'a PoolInner<T>,
    id: u64,
    grant: Option<oneshot::Receiver<Grant<T>>>,
}

impl<T> PendingWaiter<'_, T> {
    async fn wait(&mut self) -> PoolResult<Grant<T>> {
        let Some(receiver) = self.grant.as_mut() else {
            return Err(PoolError::PoolClosed);
        };
        let received = receiver.await;
        self.grant = None;
        // The sender only goes away without a grant when the pool closes
        received.map_err(|_| PoolError::PoolClosed)
    }
}

impl<T> Drop for PendingWaiter<'_, T> {
    fn drop(&mut self) {
        if let Some(mut receiver) = self.grant.take() {
            self.inner.state.lock().waiters.retain(|waiter| waiter.id != self.id);
            receiver.close();
            match receiver.try_recv() {
                Ok(Grant::Resource(entry)) => self.inner.check_in(entry),
                Ok(Grant::Slot) => self.inner.state.lock().free_slot(),
                Err(_) => {}
            }
        }
    }
}

enum Checkout<T> {
    Ready(Entry<T>),
    Create,
    Wait(u64, oneshot::Receiver<Grant<T>>),
}

impl<T> PoolInner<T> {
    fn reserve(&self) -> SlotReservation<'_, T> {
        SlotReservation {
            inner: self,
            armed: true,
        }
    }

    /// Check out a resource, giving up after `timeout`.
    ///
    /// The limit covers queueing and creation alike. Whatever is in flight
    /// when it runs out is released by the waiter and reservation guards.
    async fn checkout(&self, timeout: Option<Duration>) -> PoolResult<Entry<T>> {
        let Some(limit) = timeout else {
            return self.try_checkout().await;
        };
        match tokio::time::timeout(limit, self.try_checkout()).await {
            Ok(result) => result,
            Err(_) => {
                MetricsTracker::bump(&self.metrics.timeouts);
                tracing::debug!(pool = self.id, ?limit, "checkout timed out");
                Err(PoolError::Timeout(limit))
            }
        }
    }

    async fn try_checkout(&self) -> PoolResult<Entry<T>> {
        let step = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(PoolError::PoolClosed);
            }
            if let Some(entry) = state.idle.pop() {
                state.checked_out.insert(entry.id.serial);
                Checkout::Ready(entry)
            } else if state.created < self.config.max_pool_size {
                state.created += 1;
                Checkout::Create
            } else {
                let (sender, receiver) = oneshot::channel();
                let id = state.next_waiter;
                state.next_waiter += 1;
                state.waiters.push_back(Waiter { id, grant: sender });
                Checkout::Wait(id, receiver)
            }
        };

        let entry = match step {
            Checkout::Ready(entry) => {
                tracing::trace!(resource = %entry.id, "checked out idle resource");
                entry
            }
            Checkout::Create => self.create(self.reserve()).await?,
            Checkout::Wait(id, receiver) => {
                MetricsTracker::bump(&self.metrics.wait_events);
                tracing::trace!(pool = self.id, waiter = id, "pool exhausted, queueing");
                let mut waiter = PendingWaiter {
                    inner: self,
                    id,
                    grant: Some(receiver),
                };
                match waiter.wait().await? {
                    Grant::Resource(entry) => entry,
                    Grant::Slot => self.create(self.reserve()).await?,
                }
            }
        };

        MetricsTracker::bump(&self.metrics.acquired);
        Ok(entry)
    }

    /// Run the factory for a slot that is already counted in `created`.
    async fn create(&self, reservation: SlotReservation<'_, T>) -> PoolResult<Entry<T>> {
        let resource = match self.factory.create().await {
            Ok(resource) => resource,
            Err(err) => {
                MetricsTracker::bump(&self.metrics.factory_failures);
                tracing::warn!(pool = self.id, error = %err, "resource factory failed");
                return Err(PoolError::FactoryFailed(err));
            }
        };
        reservation.commit();
        MetricsTracker::bump(&self.metrics.created);

        let mut state = self.state.lock();
        let id = ResourceId {
            pool: self.id,
            serial: state.next_serial,
        };
        state.next_serial += 1;
        let entry = Entry { id, resource };
        if state.closed {
            state.created -= 1;
            drop(state);
            self.destroy(entry);
            return Err(PoolError::PoolClosed);
        }
        state.checked_out.insert(id.serial);
        tracing::debug!(resource = %id, created = state.created, "created resource");
        Ok(entry)
    }

    fn owns(&self, id: ResourceId) -> bool {
        self.state.lock().owns(self.id, id)
    }

    /// Return an entry known to be checked out from this pool.
    fn check_in(&self, entry: Entry<T>) {
        let drained = self.state.lock().check_in(entry);
        if let Some(entry) = drained {
            self.destroy(entry);
        }
    }

    /// Hand a checked-out resource back for reuse.
    pub(crate) fn release(&self, entry: Entry<T>) -> PoolResult<()> {
        let id = entry.id;
        let drained = {
            let mut state = self.state.lock();
            if !state.owns(self.id, id) {
                drop(state);
                tracing::warn!(resource = %id, "rejected release of a resource that is not checked out");
                return Err(PoolError::DoubleRelease(id));
            }
            state.check_in(entry)
        };
        if let Some(entry) = drained {
            self.destroy(entry);
        }
        MetricsTracker::bump(&self.metrics.released);
        Ok(())
    }

    /// Destroy a checked-out resource and free its slot.
    pub(crate) fn discard(&self, entry: Entry<T>) -> PoolResult<()> {
        let id = entry.id;
        {
            let mut state = self.state.lock();
            if !state.owns(self.id, id) {
                drop(state);
                tracing::warn!(resource = %id, "rejected discard of a resource that is not checked out");
                return Err(PoolError::DoubleRelease(id));
            }
            state.checked_out.remove(&id.serial);
            state.free_slot();
        }
        MetricsTracker::bump(&self.metrics.discarded);
        self.destroy(entry);
        Ok(())
    }

    fn destroy(&self, entry: Entry<T>) {
        tracing::debug!(resource = %entry.id, "destroying resource");
        MetricsTracker::bump(&self.metrics.destroyed);
        match self.config.destructor {
            Some(destructor) => destructor(entry.resource),
            None => drop(entry.resource),
        }
    }
}

/// Capacity-bounded pool of lazily created resources
///
/// Resources are created by the factory on demand, at most
/// `max_pool_size` at a time. When every resource is checked out,
/// acquire calls queue and are served strictly in arrival order. An idle
/// resource is reused before a new one is created, most recently returned
/// first.
///
/// Cloning a pool is cheap; clones share the same resources.
///
/// # Examples
///
/// ```
/// use esox_resourcepool::{FactoryError, Pool, PoolConfiguration};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let pool = Pool::new(
///     || async { Ok::<_, FactoryError>(Vec::<u8>::with_capacity(1024)) },
///     PoolConfiguration::new().with_max_pool_size(4),
/// )
/// .unwrap();
///
/// // Returned automatically at the end of scope
/// {
///     let mut buffer = pool.acquire().await.unwrap();
///     buffer.extend_from_slice(b"hello");
/// }
///
/// // Or by hand
/// let lease = pool.lease().await.unwrap();
/// pool.release(lease).unwrap();
///
/// assert_eq!(pool.created_count(), 1);
/// # }
/// ```
pub struct Pool<T> {
    inner: Arc<PoolInner<T>>,
}

impl<T> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Pool")
            .field("id", &self.inner.id)
            .field("capacity", &self.inner.config.max_pool_size)
            .field("created", &state.created)
            .field("idle", &state.idle.len())
            .field("waiting", &state.waiters.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl<T> Pool<T> {
    /// Create a pool around a factory
    ///
    /// # Errors
    /// Returns `InvalidConfiguration` if `config` does not validate.
    pub fn new<F>(factory: F, config: PoolConfiguration<T>) -> PoolResult<Self>
    where
        F: ResourceFactory<Resource = T> + 'static,
    {
        config.validate()?;
        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(pool = id, capacity = config.max_pool_size, "pool created");

        Ok(Self {
            inner: Arc::new(PoolInner {
                id,
                factory: Box::new(factory),
                state: Mutex::new(PoolState::new(config.max_pool_size)),
                config,
                metrics: MetricsTracker::new(),
            }),
        })
    }

    /// Get a resource that returns to the pool when dropped
    ///
    /// Waits for at most the configured `operation_timeout`, or until a
    /// resource is free if none is configured.
    pub async fn acquire(&self) -> PoolResult<Pooled<T>> {
        let entry = self.inner.checkout(self.inner.config.operation_timeout).await?;
        Ok(Pooled::new(entry, Arc::clone(&self.inner)))
    }

    /// Get a resource, waiting at most `timeout` for it
    ///
    /// The limit includes creating the resource when the pool has room for
    /// a new one.
    pub async fn acquire_timeout(&self, timeout: Duration) -> PoolResult<Pooled<T>> {
        let entry = self.inner.checkout(Some(timeout)).await?;
        Ok(Pooled::new(entry, Arc::clone(&self.inner)))
    }

    /// Get a resource that must be handed back with [`Pool::release`] or
    /// [`Pool::discard`]
    ///
    /// A lease dropped without either is discarded.
    pub async fn lease(&self) -> PoolResult<Lease<T>> {
        let entry = self.inner.checkout(self.inner.config.operation_timeout).await?;
        Ok(Lease::new(entry, Arc::downgrade(&self.inner)))
    }

    /// Like [`Pool::lease`], waiting at most `timeout`
    pub async fn lease_timeout(&self, timeout: Duration) -> PoolResult<Lease<T>> {
        let entry = self.inner.checkout(Some(timeout)).await?;
        Ok(Lease::new(entry, Arc::downgrade(&self.inner)))
    }

    /// Return a resource to the pool
    ///
    /// The oldest queued acquire call gets it directly; otherwise it becomes
    /// idle. After [`Pool::close`] the resource is destroyed instead.
    ///
    /// # Errors
    /// `DoubleRelease` if the lease is not currently checked out from this
    /// pool. The pool is left untouched and the lease is discarded by the
    /// pool it came from.
    pub fn release(&self, lease: Lease<T>) -> PoolResult<()> {
        let id = lease.id();
        if !self.inner.owns(id) {
            tracing::warn!(resource = %id, "rejected release of a resource that is not checked out");
            return Err(PoolError::DoubleRelease(id));
        }
        self.inner.release(lease.into_entry())
    }

    /// Destroy a checked-out resource instead of returning it
    ///
    /// For resources the caller found broken. Its slot goes to the oldest
    /// queued acquire call, or is freed so the next acquire creates a fresh
    /// resource.
    ///
    /// # Errors
    /// `DoubleRelease` if the lease is not currently checked out from this
    /// pool.
    pub fn discard(&self, lease: Lease<T>) -> PoolResult<()> {
        let id = lease.id();
        if !self.inner.owns(id) {
            tracing::warn!(resource = %id, "rejected discard of a resource that is not checked out");
            return Err(PoolError::DoubleRelease(id));
        }
        self.inner.discard(lease.into_entry())
    }

    /// Create up to `count` resources ahead of demand
    ///
    /// Stops early once the pool is at capacity and returns how many
    /// resources were created.
    ///
    /// # Errors
    /// `FactoryFailed` aborts the warm-up; resources created before the
    /// failure stay in the pool. `PoolClosed` once the pool is closed.
    pub async fn warmup(&self, count: usize) -> PoolResult<usize> {
        let mut created = 0;
        while created < count {
            {
                let mut state = self.inner.state.lock();
                if state.closed {
                    return Err(PoolError::PoolClosed);
                }
                if state.created >= self.inner.config.max_pool_size {
                    break;
                }
                state.created += 1;
            }
            let entry = self.inner.create(self.inner.reserve()).await?;
            self.inner.check_in(entry);
            created += 1;
        }
        tracing::debug!(pool = self.inner.id, created, "pool warmed up");
        Ok(created)
    }

    /// Close the pool
    ///
    /// Queued acquire calls fail with `PoolClosed` and idle resources are
    /// destroyed. Checked-out resources are destroyed when they come back.
    /// Closing twice is a no-op.
    pub fn close(&self) {
        let (waiters, idle) = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let idle = std::mem::take(&mut state.idle);
            state.created -= idle.len();
            (std::mem::take(&mut state.waiters), idle)
        };

        tracing::debug!(
            pool = self.inner.id,
            waiters = waiters.len(),
            idle = idle.len(),
            "closing pool"
        );
        drop(waiters);
        for entry in idle {
            self.inner.destroy(entry);
        }
    }

    /// Whether [`Pool::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Process-unique id of this pool, as found in [`ResourceId::pool`]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Maximum number of resources alive at once
    pub fn capacity(&self) -> usize {
        self.inner.config.max_pool_size
    }

    /// Resources currently alive, idle or not
    pub fn created_count(&self) -> usize {
        self.inner.state.lock().created
    }

    /// Resources waiting in the pool to be checked out
    pub fn idle_count(&self) -> usize {
        self.inner.state.lock().idle.len()
    }

    /// Resources checked out or being created
    pub fn outstanding_count(&self) -> usize {
        let state = self.inner.state.lock();
        state.created - state.idle.len()
    }

    /// Acquire calls currently queued
    pub fn waiting_count(&self) -> usize {
        self.inner.state.lock().waiters.len()
    }

    /// Get pool metrics
    pub fn get_metrics(&self) -> PoolMetrics {
        let occupancy = {
            let state = self.inner.state.lock();
            Occupancy {
                idle: state.idle.len(),
                created: state.created,
                waiting: state.waiters.len(),
                capacity: self.inner.config.max_pool_size,
            }
        };
        self.inner.metrics.get_metrics(occupancy)
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.get_metrics().export()
    }

    /// Export metrics in Prometheus format
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        MetricsExporter::export_prometheus(&self.get_metrics(), pool_name, tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FactoryError;
    use std::sync::atomic::AtomicUsize;

    fn counting_pool(capacity: usize) -> (Pool<usize>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let pool = Pool::new(
            move || {
                let counter = Arc::clone(&counter);
                async move { Ok::<_, FactoryError>(counter.fetch_add(1, Ordering::SeqCst)) }
            },
            PoolConfiguration::new().with_max_pool_size(capacity),
        )
        .unwrap();
        (pool, calls)
    }

    fn assert_accounting<T>(pool: &Pool<T>) {
        let state = pool.inner.state.lock();
        assert!(state.created <= pool.inner.config.max_pool_size);
        assert!(state.idle.len() <= state.created);
        assert!(state.waiters.is_empty() || (state.idle.is_empty() && state.created == pool.inner.config.max_pool_size));
    }

    #[tokio::test]
    async fn test_lazy_creation() {
        let (pool, calls) = counting_pool(3);
        assert_eq!(pool.created_count(), 0);

        let a = pool.lease().await.unwrap();
        let b = pool.lease().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(pool.created_count(), 2);
        assert_eq!(pool.outstanding_count(), 2);
        assert_ne!(a.id(), b.id());
        assert_accounting(&pool);
    }

    #[tokio::test]
    async fn test_most_recently_idle_is_reused_first() {
        let (pool, _) = counting_pool(3);

        let a = pool.lease().await.unwrap();
        let b = pool.lease().await.unwrap();
        let b_id = b.id();
        pool.release(a).unwrap();
        pool.release(b).unwrap();

        let next = pool.lease().await.unwrap();
        assert_eq!(next.id(), b_id);
    }

    #[tokio::test]
    async fn test_release_to_other_pool_is_rejected() {
        let (first, _) = counting_pool(1);
        let (second, _) = counting_pool(1);

        let lease = first.lease().await.unwrap();
        let id = lease.id();
        let err = second.release(lease).unwrap_err();

        assert!(matches!(err, PoolError::DoubleRelease(rejected) if rejected == id));
        assert_eq!(second.idle_count(), 0);
        // The rejected lease is discarded by the pool it came from
        assert_eq!(first.outstanding_count(), 0);
        assert_eq!(first.created_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_lease_is_rejected() {
        let (pool, _) = counting_pool(2);

        let lease = pool.lease().await.unwrap();
        let (id, value) = (lease.id(), *lease);
        pool.release(lease).unwrap();

        let stale = Lease::new(Entry { id, resource: value }, Arc::downgrade(&pool.inner));
        let err = pool.release(stale).unwrap_err();

        assert!(matches!(err, PoolError::DoubleRelease(rejected) if rejected == id));
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.created_count(), 1);
        let metrics = pool.get_metrics();
        assert_eq!(metrics.total_released, 1);
        assert_eq!(metrics.total_discarded, 0);
        assert_accounting(&pool);
    }

    async fn round_trip<T>(pool: &Pool<T>) -> PoolResult<ResourceId> {
        let lease = pool.lease().await?;
        let id = lease.id();
        pool.release(lease)?;
        Ok(id)
    }

    #[tokio::test]
    async fn test_generic_callers_need_no_static_bound() {
        let (pool, calls) = counting_pool(1);

        let first = round_trip(&pool).await.unwrap();
        let second = round_trip(&pool).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_configuration() {
        let result = Pool::new(
            || async { Ok::<_, FactoryError>(0u8) },
            PoolConfiguration::new().with_max_pool_size(0),
        );
        assert!(matches!(result, Err(PoolError::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn test_cancelled_creation_frees_slot() {
        let pool = Pool::new(
            || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, FactoryError>(0u8)
            },
            PoolConfiguration::new().with_max_pool_size(1),
        )
        .unwrap();

        let result = tokio::time::timeout(Duration::from_millis(10), pool.lease()).await;
        assert!(result.is_err());
        assert_eq!(pool.created_count(), 0);
    }

    #[tokio::test]
    async fn test_debug_output() {
        let (pool, _) = counting_pool(2);
        let _lease = pool.lease().await.unwrap();

        let debug = format!("{pool:?}");
        assert!(debug.contains("capacity: 2"));
        assert!(debug.contains("created: 1"));
    }
}
