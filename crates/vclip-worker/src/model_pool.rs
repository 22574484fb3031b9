//! Model pool: a fixed-capacity cooperative pool of classifier
//! replicas. Borrowing suspends the caller cooperatively when every replica
//! is already checked out rather than erroring; returning a replica is
//! unconditional and happens even if the borrower is cancelled mid-use.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Fixed-capacity pool of `M` instances, checked out FIFO via a semaphore so
/// waiters are served in arrival order and never spin.
///
/// `free` is a plain `std::sync::Mutex` rather than `tokio::sync::Mutex`: a
/// borrowed replica must be pushed back onto it synchronously, inside
/// `PoolGuard::drop`, strictly before that guard's semaphore permit is
/// released — otherwise a waiter woken by the permit release could find the
/// free list still empty.
pub struct ModelPool<M> {
    free: Arc<Mutex<VecDeque<M>>>,
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl<M: Send + 'static> ModelPool<M> {
    /// Build a pool from exactly `instances.len()` replicas; that count is
    /// the pool's capacity for the remainder of its life.
    pub fn new(instances: Vec<M>) -> Self {
        let capacity = instances.len();
        Self {
            free: Arc::new(Mutex::new(instances.into_iter().collect())),
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current count of replicas not checked out. Racy by construction (a
    /// concurrent borrow/return can change it before the caller observes the
    /// result); intended for metrics, not for synchronization.
    pub async fn available(&self) -> usize {
        self.free.lock().expect("model pool free-list lock poisoned").len()
    }

    /// Check out a replica, suspending the caller until one is free. The
    /// returned guard returns the replica to the pool on drop, including
    /// when the borrowing task is cancelled.
    pub async fn borrow(&self) -> PoolGuard<M> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .expect("model pool semaphore is never closed");
        let model = self
            .free
            .lock()
            .expect("model pool free-list lock poisoned")
            .pop_front()
            .expect("a held permit guarantees a free replica");
        PoolGuard {
            model: Some(model),
            free: Arc::clone(&self.free),
            _permit: permit,
        }
    }

    /// Borrow a replica, run `f` against it, and guarantee the replica is
    /// returned before this call resolves — the common case for a single
    /// inference invocation.
    pub async fn with_model<F, Fut, R>(&self, f: F) -> R
    where
        F: FnOnce(&M) -> Fut,
        Fut: std::future::Future<Output = R>,
    {
        let guard = self.borrow().await;
        f(&guard).await
    }
}

/// RAII handle on a borrowed replica. Returns it to the pool's free list
/// unconditionally when dropped, whether by normal completion or by the
/// borrowing task being cancelled.
pub struct PoolGuard<M> {
    model: Option<M>,
    free: Arc<Mutex<VecDeque<M>>>,
    _permit: OwnedSemaphorePermit,
}

impl<M> std::ops::Deref for PoolGuard<M> {
    type Target = M;

    fn deref(&self) -> &M {
        self.model.as_ref().expect("model taken only by Drop")
    }
}

impl<M> Drop for PoolGuard<M> {
    fn drop(&mut self) {
        let Some(model) = self.model.take() else {
            return;
        };
        // Must happen before `_permit` is released (the field drop that
        // follows this function returning): otherwise a waiter woken by the
        // permit could pop the free list before this push lands.
        self.free
            .lock()
            .expect("model pool free-list lock poisoned")
            .push_back(model);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn borrow_blocks_until_capacity_is_returned() {
        let pool = Arc::new(ModelPool::new(vec![1u32]));
        let first = pool.borrow().await;
        assert_eq!(pool.available().await, 0);

        let pool_clone = Arc::clone(&pool);
        let waiter = tokio::spawn(async move {
            let _second = pool_clone.borrow().await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn with_model_always_returns_the_replica() {
        let pool = ModelPool::new(vec!["a".to_string(), "b".to_string()]);
        let out = pool.with_model(|m| async move { m.clone() }).await;
        assert_eq!(out, "a".to_string());
        assert_eq!(pool.available().await, 2);
    }

    #[tokio::test]
    async fn cancelled_borrower_still_returns_the_replica() {
        let pool = Arc::new(ModelPool::new(vec![1u32]));
        let pool_clone = Arc::clone(&pool);
        let handle = tokio::spawn(async move {
            let _guard = pool_clone.borrow().await;
            futures_never_finishes().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.abort();
        let _ = handle.await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(pool.available().await, 1);
    }

    async fn futures_never_finishes() {
        loop {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
    }
}
