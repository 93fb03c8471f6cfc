//! C6: the per-browser page pool.
//!
//! A LIFO stack of idle page targets plus a total-outstanding counter.
//! Acquisition never blocks: once `max_pages` pages are either idle-in-stack
//! or checked out, a further `acquire` fails immediately with
//! [`PoolLimitReached`] and the caller decides whether to retry (spec §4.6).

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Mutex;

/// Surfaced when every slot in a browser's page pool is already either idle
/// or checked out. Distinct from [`crate::error::CdpError`] because it is a
/// purely local admission-control signal, never a transport failure.
#[derive(Debug, thiserror::Error)]
#[error("page pool is at capacity")]
pub struct PoolLimitReached;

/// One browser's pool of page target ids. Idle pages are recycled LIFO so
/// the most recently used renderer process stays warm; new pages are only
/// created once the idle stack is empty and the total count is under cap.
#[derive(Debug)]
pub struct PagePool {
    idle: Mutex<Vec<String>>,
    total: AtomicUsize,
    max_pages: usize,
}

impl PagePool {
    pub fn new(max_pages: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            total: AtomicUsize::new(0),
            max_pages,
        }
    }

    /// Attempts to acquire a page target: pops an idle one if available,
    /// otherwise increments the total and signals the caller to create a
    /// fresh target, unless the pool is already at capacity.
    ///
    /// Returns `Ok(Some(id))` for a reused idle page, `Ok(None)` meaning
    /// "create a new target, the slot is reserved", or `Err` if the pool is
    /// saturated.
    pub async fn acquire(&self) -> Result<Option<String>, PoolLimitReached> {
        let mut idle = self.idle.lock().await;
        if let Some(id) = idle.pop() {
            return Ok(Some(id));
        }
        drop(idle);

        // Reserve a slot before creating, backing off if we'd exceed cap.
        let mut current = self.total.load(Ordering::SeqCst);
        loop {
            if current >= self.max_pages {
                return Err(PoolLimitReached);
            }
            match self.total.compare_exchange_weak(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Ok(None),
                Err(observed) => current = observed,
            }
        }
    }

    /// Returns a target id to the idle stack for reuse by a later
    /// `acquire`. Does not touch `total`: the slot stays reserved.
    pub async fn release(&self, target_id: String) {
        self.idle.lock().await.push(target_id);
    }

    /// Permanently discards a slot, e.g. after the underlying target died
    /// and should not be reused. Decrements `total` exactly once.
    pub fn discard(&self) {
        self.total.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn outstanding(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_signals_new_target_until_cap_then_fails() {
        let pool = PagePool::new(2);
        assert!(matches!(pool.acquire().await, Ok(None)));
        assert!(matches!(pool.acquire().await, Ok(None)));
        assert!(matches!(pool.acquire().await, Err(PoolLimitReached)));
        assert_eq!(pool.outstanding(), 2);
    }

    #[tokio::test]
    async fn released_pages_are_reused_lifo() {
        let pool = PagePool::new(2);
        pool.acquire().await.unwrap(); // reserve slot 1, caller creates "a"
        pool.release("a".to_string()).await;
        pool.release("b_never_created_but_released_for_test".to_string())
            .await;
        let got = pool.acquire().await.unwrap();
        assert_eq!(got, Some("b_never_created_but_released_for_test".to_string()));
        let got = pool.acquire().await.unwrap();
        assert_eq!(got, Some("a".to_string()));
    }

    #[tokio::test]
    async fn discard_frees_a_slot_for_reuse() {
        let pool = PagePool::new(1);
        assert!(matches!(pool.acquire().await, Ok(None)));
        assert!(matches!(pool.acquire().await, Err(PoolLimitReached)));
        pool.discard();
        assert!(matches!(pool.acquire().await, Ok(None)));
    }
}
