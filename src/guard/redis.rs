//! Shared guard backed by Redis `SET NX EX`, for multi-instance deployments.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

use super::{ActionGuard, GuardError, GuardKey};

type Connection = ::redis::aio::ConnectionManager;

pub struct RedisGuard {
    client: ::redis::Client,
    connection: Mutex<Option<Connection>>,
}

impl std::fmt::Debug for RedisGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisGuard").finish_non_exhaustive()
    }
}

impl RedisGuard {
    /// Parses the URL; the connection itself is opened lazily.
    pub fn new(url: &str) -> Result<Self, GuardError> {
        let client = ::redis::Client::open(url)?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
        })
    }

    async fn ensure_connection(&self) -> Result<MutexGuard<'_, Option<Connection>>, GuardError> {
        let mut guard = self.connection.lock().await;
        if guard.is_none() {
            *guard = Some(self.client.get_connection_manager().await?);
        }
        Ok(guard)
    }
}

#[async_trait]
impl ActionGuard for RedisGuard {
    async fn try_acquire(&self, key: &GuardKey, ttl: Duration) -> Result<bool, GuardError> {
        let mut guard = self.ensure_connection().await?;
        let Some(conn) = guard.as_mut() else {
            return Err(GuardError::Backend("no redis connection".to_string()));
        };

        let reply: ::redis::RedisResult<Option<String>> = ::redis::cmd("SET")
            .arg(key.to_string())
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(conn)
            .await;

        match reply {
            Ok(reply) => Ok(reply.is_some()),
            Err(err) => {
                tracing::warn!(key = %key, "Redis guard acquire failed: {err}");
                *guard = None;
                Err(err.into())
            }
        }
    }

    async fn release(&self, key: &GuardKey) -> Result<(), GuardError> {
        let mut guard = self.ensure_connection().await?;
        let Some(conn) = guard.as_mut() else {
            return Err(GuardError::Backend("no redis connection".to_string()));
        };

        let reply: ::redis::RedisResult<i64> = ::redis::cmd("DEL")
            .arg(key.to_string())
            .query_async(conn)
            .await;

        if let Err(err) = reply {
            tracing::warn!(key = %key, "Redis guard release failed: {err}");
            *guard = None;
            return Err(err.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url_rejected() {
        assert!(RedisGuard::new("not a url").is_err());
    }

    #[test]
    fn test_valid_url_does_not_connect_eagerly() {
        assert!(RedisGuard::new("redis://127.0.0.1:1/").is_ok());
    }
}
