//! Process-local guard for single-instance deployments and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{ActionGuard, GuardError, GuardKey};

#[derive(Debug, Default)]
pub struct InMemoryGuard {
    held: Mutex<HashMap<String, Instant>>,
}

impl InMemoryGuard {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ActionGuard for InMemoryGuard {
    async fn try_acquire(&self, key: &GuardKey, ttl: Duration) -> Result<bool, GuardError> {
        let now = Instant::now();
        let mut held = self
            .held
            .lock()
            .map_err(|_| GuardError::Backend("guard table poisoned".to_string()))?;

        // Lazily evict lapsed entries.
        held.retain(|_, expires| *expires > now);

        let key = key.to_string();
        if held.contains_key(&key) {
            return Ok(false);
        }
        held.insert(key, now + ttl);
        Ok(true)
    }

    async fn release(&self, key: &GuardKey) -> Result<(), GuardError> {
        let mut held = self
            .held
            .lock()
            .map_err(|_| GuardError::Backend("guard table poisoned".to_string()))?;
        held.remove(&key.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PlayerId;

    fn key(player: &str) -> GuardKey {
        GuardKey::economy(PlayerId::new(player))
    }

    #[tokio::test]
    async fn test_second_acquire_fails_while_held() {
        let guard = InMemoryGuard::new();
        let ttl = Duration::from_secs(15);
        assert!(guard.try_acquire(&key("p1"), ttl).await.unwrap());
        assert!(!guard.try_acquire(&key("p1"), ttl).await.unwrap());

        guard.release(&key("p1")).await.unwrap();
        assert!(guard.try_acquire(&key("p1"), ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_lock_lapses_after_ttl() {
        let guard = InMemoryGuard::new();
        assert!(guard
            .try_acquire(&key("p1"), Duration::from_millis(20))
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(guard
            .try_acquire(&key("p1"), Duration::from_secs(15))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let guard = InMemoryGuard::new();
        guard.release(&key("p1")).await.unwrap();
        guard.release(&key("p1")).await.unwrap();
        assert!(guard
            .try_acquire(&key("p1"), Duration::from_secs(1))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let guard = InMemoryGuard::new();
        let ttl = Duration::from_secs(15);
        assert!(guard.try_acquire(&key("p1"), ttl).await.unwrap());
        assert!(guard.try_acquire(&key("p2"), ttl).await.unwrap());
        assert!(guard
            .try_acquire(&GuardKey::new("OTHER", PlayerId::new("p1")), ttl)
            .await
            .unwrap());
    }

    #[test]
    fn test_key_format() {
        assert_eq!(key("p1").to_string(), "TPET_API:p1");
    }
}
