//! Per-player mutual exclusion for economy actions.
//!
//! A guard is a best-effort short-lived lock, not a correctness primitive:
//! correctness comes from the conditional writes. It keeps the common
//! double-submit case from reaching the database at all, and its TTL bounds
//! how long a crashed holder can block a player.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::domain::PlayerId;

pub mod memory;
pub mod redis;

pub use memory::InMemoryGuard;
pub use self::redis::RedisGuard;

/// Namespace used for every economy action lock.
pub const ECONOMY_NAMESPACE: &str = "TPET_API";

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("guard backend unavailable: {0}")]
    Backend(String),
}

impl From<::redis::RedisError> for GuardError {
    fn from(err: ::redis::RedisError) -> Self {
        GuardError::Backend(err.to_string())
    }
}

/// Lock key scoped to one player within a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GuardKey {
    namespace: String,
    player: PlayerId,
}

impl GuardKey {
    pub fn new(namespace: impl Into<String>, player: PlayerId) -> Self {
        Self {
            namespace: namespace.into(),
            player,
        }
    }

    pub fn economy(player: PlayerId) -> Self {
        Self::new(ECONOMY_NAMESPACE, player)
    }

    pub fn player(&self) -> &PlayerId {
        &self.player
    }
}

impl fmt::Display for GuardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.player)
    }
}

/// Short-lived exclusive lock keyed by player.
#[async_trait]
pub trait ActionGuard: Send + Sync + fmt::Debug {
    /// Take the lock if nobody holds it. Returns false when it is held.
    ///
    /// The lock lapses on its own after `ttl`.
    async fn try_acquire(&self, key: &GuardKey, ttl: Duration) -> Result<bool, GuardError>;

    /// Drop the lock. Releasing a lock that is not held is a no-op.
    async fn release(&self, key: &GuardKey) -> Result<(), GuardError>;
}
