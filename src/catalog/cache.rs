//! Process-wide read-through cache over the `game_config` table.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{CatalogError, CatalogSnapshot};
use crate::db::Repository;
use crate::domain::TimeMs;

/// Holds the latest parsed snapshot; readers clone an `Arc` and never block on refresh.
#[derive(Debug, Default)]
pub struct ConfigCache {
    current: RwLock<Arc<CatalogSnapshot>>,
}

impl ConfigCache {
    pub fn new(snapshot: CatalogSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Build a cache from documents already in hand.
    pub fn from_documents(
        documents: BTreeMap<String, serde_json::Value>,
    ) -> Result<Self, CatalogError> {
        Ok(Self::new(CatalogSnapshot::from_documents(
            documents,
            TimeMs::now(),
        )?))
    }

    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Latest locally cached value for `key`.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.snapshot().get(key).cloned()
    }

    pub fn replace(&self, snapshot: CatalogSnapshot) {
        let snapshot = Arc::new(snapshot);
        match self.current.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
    }

    /// Reload documents from the repository; returns whether the snapshot changed.
    ///
    /// A set that fails to parse leaves the previous snapshot in place.
    pub async fn refresh(&self, repo: &Repository) -> Result<bool, CatalogError> {
        let documents = repo.load_config_documents().await?;
        if self.snapshot().documents() == &documents {
            return Ok(false);
        }

        let snapshot = CatalogSnapshot::from_documents(documents, TimeMs::now())?;
        self.replace(snapshot);
        Ok(true)
    }

    /// Poll the repository every `every`; staleness is bounded by this interval.
    pub fn spawn_refresh(self: Arc<Self>, repo: Arc<Repository>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match self.refresh(&repo).await {
                    Ok(true) => info!("Game config refreshed"),
                    Ok(false) => debug!("Game config unchanged"),
                    Err(e) => warn!(error = %e, "Game config refresh failed, keeping previous snapshot"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::sample_documents;
    use crate::catalog::{FARM_DATA, GAME_ITEMS};
    use crate::db::init_db;
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup_repo() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Repository::new(pool), temp_dir)
    }

    #[test]
    fn test_get_reads_latest_snapshot() {
        let cache = ConfigCache::from_documents(sample_documents()).unwrap();
        assert!(cache.get(FARM_DATA).is_some());

        let mut docs = sample_documents();
        docs.remove(FARM_DATA);
        cache.replace(CatalogSnapshot::from_documents(docs, TimeMs::new(2)).unwrap());
        assert!(cache.get(FARM_DATA).is_none());
    }

    #[test]
    fn test_held_snapshot_is_not_torn_by_replace() {
        let cache = ConfigCache::from_documents(sample_documents()).unwrap();
        let held = cache.snapshot();
        cache.replace(CatalogSnapshot::default());
        assert!(held.farm_rate().is_ok());
        assert!(cache.snapshot().farm_rate().is_err());
    }

    #[tokio::test]
    async fn test_refresh_picks_up_table_changes() {
        let (repo, _temp) = setup_repo().await;
        let cache = ConfigCache::default();

        for (key, doc) in sample_documents() {
            repo.upsert_config_document(&key, &doc).await.unwrap();
        }
        assert!(cache.refresh(&repo).await.unwrap());
        assert!(cache.snapshot().item("apple").is_some());

        assert!(!cache.refresh(&repo).await.unwrap());

        repo.upsert_config_document(
            GAME_ITEMS,
            &json!({ "items": { "pear": { "mana": 1, "cost": 1 } } }),
        )
        .await
        .unwrap();
        assert!(cache.refresh(&repo).await.unwrap());
        assert!(cache.snapshot().item("apple").is_none());
        assert!(cache.snapshot().item("pear").is_some());
    }

    #[tokio::test]
    async fn test_refresh_keeps_previous_snapshot_on_bad_document() {
        let (repo, _temp) = setup_repo().await;
        for (key, doc) in sample_documents() {
            repo.upsert_config_document(&key, &doc).await.unwrap();
        }
        let cache = ConfigCache::default();
        cache.refresh(&repo).await.unwrap();

        repo.upsert_config_document(FARM_DATA, &json!({ "x_average_TGP": "nope" }))
            .await
            .unwrap();
        assert!(cache.refresh(&repo).await.is_err());
        assert!(cache.snapshot().farm_rate().is_ok());
    }
}
