use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use statusline_core::errors::{Result, StatusLineError};
use tokio::sync::{Mutex as KeyMutex, OwnedMutexGuard};
use tracing::debug;

use super::{LockProvider, LockToken};

type Slots = Arc<Mutex<HashMap<String, Arc<KeyMutex<()>>>>>;

/// Removes `key` once nobody holds or awaits its mutex.
fn prune(slots: &Slots, key: &str) {
    let mut slots = slots.lock();
    if slots
        .get(key)
        .is_some_and(|slot| Arc::strong_count(slot) == 1)
    {
        slots.remove(key);
    }
}

/// A held key. Dropping it unlocks the key and prunes its slot, whether the
/// token went through `release` or its future was cancelled.
pub(crate) struct HeldSlot {
    slots: Slots,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for HeldSlot {
    fn drop(&mut self) {
        self.guard.take();
        prune(&self.slots, &self.key);
    }
}

impl fmt::Debug for HeldSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeldSlot").field("key", &self.key).finish()
    }
}

/// In-process lock provider backed by one tokio mutex per key.
///
/// Tokio's mutex queues waiters fairly. A slot lives only while its key is
/// held or awaited.
#[derive(Clone)]
pub struct MemoryLockProvider {
    slots: Slots,
    timeout: Duration,
}

impl MemoryLockProvider {
    pub fn new(timeout: Duration) -> Self {
        Self {
            slots: Slots::default(),
            timeout,
        }
    }

    /// Number of keys currently held or awaited.
    pub fn active_keys(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| Arc::strong_count(slot) > 1)
            .count()
    }

    fn slot(&self, key: &str) -> Arc<KeyMutex<()>> {
        let mut slots = self.slots.lock();
        // Waiters cancelled mid-acquire leave idle slots behind.
        slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        slots.entry(key.to_string()).or_default().clone()
    }
}

impl Default for MemoryLockProvider {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl LockProvider for MemoryLockProvider {
    async fn lock(&self, key: &str) -> Result<LockToken> {
        let started = Instant::now();
        let acquired = tokio::time::timeout(self.timeout, self.slot(key).lock_owned()).await;

        let Ok(guard) = acquired else {
            prune(&self.slots, key);
            return Err(StatusLineError::LockTimeout {
                key: key.to_string(),
                waited_ms: started.elapsed().as_millis() as u64,
            });
        };

        debug!(key, waited_ms = started.elapsed().as_millis() as u64, "lock acquired");
        Ok(LockToken::guarded(
            key,
            HeldSlot {
                slots: self.slots.clone(),
                key: key.to_string(),
                guard: Some(guard),
            },
        ))
    }

    async fn release(&self, mut token: LockToken) -> Result<()> {
        let Some(slot) = token.slot.take() else {
            return Err(StatusLineError::Lock(format!(
                "token for {} was not issued by the in-memory provider",
                token.key
            )));
        };

        drop(slot);
        debug!(key = %token.key, held_ms = token.held_for().as_millis() as u64, "lock released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serializes_holders_of_the_same_key() {
        let locks = MemoryLockProvider::new(Duration::from_millis(50));
        let token = locks.lock("monitor-a").await.unwrap();

        let err = locks.lock("monitor-a").await.unwrap_err();
        assert!(matches!(err, StatusLineError::LockTimeout { ref key, .. } if key == "monitor-a"));
        assert!(err.is_retryable());

        locks.release(token).await.unwrap();
        let again = locks.lock("monitor-a").await.unwrap();
        locks.release(again).await.unwrap();
        assert_eq!(locks.active_keys(), 0);
    }

    #[tokio::test]
    async fn different_keys_do_not_contend() {
        let locks = MemoryLockProvider::new(Duration::from_millis(50));
        let a = locks.lock("monitor-a").await.unwrap();
        let b = locks.lock("monitor-b").await.unwrap();
        assert_eq!(locks.active_keys(), 2);
        locks.release(a).await.unwrap();
        locks.release(b).await.unwrap();
    }

    #[tokio::test]
    async fn dropping_a_token_frees_the_key() {
        let locks = MemoryLockProvider::new(Duration::from_millis(50));
        drop(locks.lock("monitor-a").await.unwrap());
        assert_eq!(locks.active_keys(), 0);
        let token = locks.lock("monitor-a").await.unwrap();
        locks.release(token).await.unwrap();
    }

    #[tokio::test]
    async fn dropped_tokens_leave_no_slots_behind() {
        let locks = MemoryLockProvider::new(Duration::from_millis(50));
        for i in 0..100 {
            let token = locks.lock(&format!("monitor-{i}")).await.unwrap();
            drop(token);
        }

        assert_eq!(locks.active_keys(), 0);
        assert!(locks.slots.lock().is_empty());
    }

    #[tokio::test]
    async fn timed_out_and_cancelled_waiters_leave_no_slots_behind() {
        let locks = MemoryLockProvider::new(Duration::from_secs(5));
        let held = locks.lock("monitor-a").await.unwrap();

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.lock("monitor-a").await.map(drop) })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());

        locks.release(held).await.unwrap();
        assert_eq!(locks.active_keys(), 0);
        assert!(locks.slots.lock().is_empty());

        let short = MemoryLockProvider::new(Duration::from_millis(20));
        let held = short.lock("monitor-b").await.unwrap();
        assert!(short.lock("monitor-b").await.is_err());
        assert_eq!(short.active_keys(), 1);
        drop(held);
        assert!(short.slots.lock().is_empty());
    }

    #[tokio::test]
    async fn waiter_acquires_after_release() {
        let locks = MemoryLockProvider::new(Duration::from_secs(5));
        let token = locks.lock("monitor-a").await.unwrap();

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let token = locks.lock("monitor-a").await?;
                locks.release(token).await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        locks.release(token).await.unwrap();
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn rejects_foreign_tokens() {
        let locks = MemoryLockProvider::default();
        let foreign = LockToken::leased("monitor-a", uuid::Uuid::new_v4(), None);
        assert!(matches!(
            locks.release(foreign).await,
            Err(StatusLineError::Lock(_))
        ));
    }
}
