//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by domain:
//! - `ledger.rs` - Conditional economy writes and audit records
//!
//! Reads that must observe a transaction's own view take a
//! `&mut SqliteConnection` (pass `scope.conn()?`); the rest go through the pool.

mod ledger;

pub use ledger::ApplyError;

use crate::domain::{Boost, Decimal, Pet, PetId, Player, PlayerId, TimeMs, Token};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqliteRow};
use sqlx::{Row, Sqlite};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{info, warn};

/// Repository for database operations.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

pub(crate) fn parse_decimal(column: &str, raw: &str) -> Result<Decimal, sqlx::Error> {
    Decimal::from_str(raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

fn pet_from_row(row: &SqliteRow) -> Result<Pet, sqlx::Error> {
    let level: i64 = row.get("level");
    let cost: String = row.get("accumulate_total_cost");
    let carried: String = row.get("carried_balance");
    let farm_started_at: Option<i64> = row.get("farm_started_at_ms");

    Ok(Pet {
        id: PetId::new(row.get::<String, _>("pet_id")),
        owner: PlayerId::new(row.get::<String, _>("player_id")),
        pet_type: row.get("pet_type"),
        level: u32::try_from(level).map_err(|e| sqlx::Error::ColumnDecode {
            index: "level".to_string(),
            source: Box::new(e),
        })?,
        accumulate_total_cost: parse_decimal("accumulate_total_cost", &cost)?,
        mana_expiry: TimeMs::new(row.get("mana_expiry_ms")),
        farm_started_at: farm_started_at.map(TimeMs::new),
        carried_balance: parse_decimal("carried_balance", &carried)?,
        revision: row.get("revision"),
    })
}

/// Write transaction opened with `BEGIN IMMEDIATE`.
///
/// The write lock is taken before the first read, so scopes for different
/// players queue on the busy timeout instead of failing when a deferred read
/// snapshot is upgraded. A scope dropped without `commit` or `rollback`
/// closes its connection, which rolls the transaction back.
#[derive(Debug)]
pub struct WriteScope {
    conn: Option<PoolConnection<Sqlite>>,
}

impl WriteScope {
    async fn begin(pool: &SqlitePool) -> Result<Self, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(Self { conn: Some(conn) })
    }

    /// Connection holding the open transaction.
    pub fn conn(&mut self) -> Result<&mut SqliteConnection, sqlx::Error> {
        self.conn
            .as_deref_mut()
            .ok_or_else(|| sqlx::Error::Protocol("write scope already finished".to_string()))
    }

    pub async fn commit(mut self) -> Result<(), sqlx::Error> {
        self.finish("COMMIT").await
    }

    pub async fn rollback(mut self) -> Result<(), sqlx::Error> {
        self.finish("ROLLBACK").await
    }

    async fn finish(&mut self, statement: &'static str) -> Result<(), sqlx::Error> {
        sqlx::query(statement).execute(self.conn()?).await?;
        // Back to the pool in autocommit mode.
        self.conn.take();
        Ok(())
    }
}

impl Drop for WriteScope {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            drop(conn.detach());
        }
    }
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open an atomic multi-entity write scope.
    pub async fn begin(&self) -> Result<WriteScope, sqlx::Error> {
        WriteScope::begin(&self.pool).await
    }

    /// Make sure a player row exists, with no balances.
    pub async fn ensure_player(&self, player_id: &PlayerId) -> Result<(), sqlx::Error> {
        if self.create_player(player_id, &[]).await? {
            info!(player = %player_id, "Registered new player");
        }
        Ok(())
    }

    // =========================================================================
    // Player operations
    // =========================================================================

    /// Register a player with opening balances; a no-op if the player exists.
    ///
    /// Returns true when the player was newly created.
    pub async fn create_player(
        &self,
        player_id: &PlayerId,
        opening_balances: &[(Token, Decimal)],
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO players (player_id, revision, last_claimed_ms, created_ms)
            VALUES (?, 0, NULL, ?)
            ON CONFLICT(player_id) DO NOTHING
            "#,
        )
        .bind(player_id.as_str())
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        for (token, amount) in opening_balances {
            sqlx::query("INSERT INTO player_balances (player_id, token, amount) VALUES (?, ?, ?)")
                .bind(player_id.as_str())
                .bind(token.as_str())
                .bind(amount.non_negative().to_canonical_string())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    /// Load a player with balances, totals, inventory and boosts.
    pub async fn load_player(
        conn: &mut SqliteConnection,
        player_id: &PlayerId,
    ) -> Result<Option<Player>, sqlx::Error> {
        let Some(row) =
            sqlx::query("SELECT revision, last_claimed_ms FROM players WHERE player_id = ?")
                .bind(player_id.as_str())
                .fetch_optional(&mut *conn)
                .await?
        else {
            return Ok(None);
        };

        let mut player = Player::new(player_id.clone());
        player.revision = row.get("revision");
        player.last_claimed_at = row.get::<Option<i64>, _>("last_claimed_ms").map(TimeMs::new);

        let rows = sqlx::query("SELECT token, amount FROM player_balances WHERE player_id = ?")
            .bind(player_id.as_str())
            .fetch_all(&mut *conn)
            .await?;
        for row in rows {
            let token: String = row.get("token");
            let amount: String = row.get("amount");
            match Token::from_str(&token) {
                Ok(token) => {
                    player
                        .balances
                        .insert(token, parse_decimal("amount", &amount)?);
                }
                Err(e) => warn!(player = %player_id, error = %e, "Skipping balance row"),
            }
        }

        let rows = sqlx::query("SELECT metric, amount FROM player_totals WHERE player_id = ?")
            .bind(player_id.as_str())
            .fetch_all(&mut *conn)
            .await?;
        for row in rows {
            let amount: String = row.get("amount");
            player
                .totals
                .insert(row.get("metric"), parse_decimal("amount", &amount)?);
        }

        let rows = sqlx::query("SELECT item, quantity FROM player_inventory WHERE player_id = ?")
            .bind(player_id.as_str())
            .fetch_all(&mut *conn)
            .await?;
        for row in rows {
            let quantity: i64 = row.get("quantity");
            player
                .inventory
                .insert(row.get("item"), u32::try_from(quantity).unwrap_or(0));
        }

        player.boosts = Self::load_boosts(&mut *conn, player_id).await?;

        Ok(Some(player))
    }

    /// Load a player outside any transaction.
    pub async fn get_player(&self, player_id: &PlayerId) -> Result<Option<Player>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        Self::load_player(&mut *conn, player_id).await
    }

    // =========================================================================
    // Boost operations
    // =========================================================================

    /// Append a boost for a player. Boosts are never updated once written.
    pub async fn insert_boost(&self, player_id: &PlayerId, boost: &Boost) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO boosts (player_id, percent, start_ms, end_ms, created_ms)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(player_id.as_str())
        .bind(boost.percent.to_canonical_string())
        .bind(boost.start_at.as_ms())
        .bind(boost.end_at.as_ms())
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_boosts(
        conn: &mut SqliteConnection,
        player_id: &PlayerId,
    ) -> Result<Vec<Boost>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT percent, start_ms, end_ms FROM boosts WHERE player_id = ? ORDER BY start_ms ASC, id ASC",
        )
        .bind(player_id.as_str())
        .fetch_all(&mut *conn)
        .await?;

        rows.iter()
            .map(|row| -> Result<Boost, sqlx::Error> {
                let percent: String = row.get("percent");
                Ok(Boost::new(
                    parse_decimal("percent", &percent)?,
                    TimeMs::new(row.get("start_ms")),
                    TimeMs::new(row.get("end_ms")),
                ))
            })
            .collect()
    }

    // =========================================================================
    // Pet operations
    // =========================================================================

    /// Load a player's pets, optionally narrowed to one pet id.
    pub async fn load_pets(
        conn: &mut SqliteConnection,
        player_id: &PlayerId,
        pet_id: Option<&PetId>,
    ) -> Result<Vec<Pet>, sqlx::Error> {
        let rows = match pet_id {
            Some(pet_id) => {
                sqlx::query(
                    r#"
                    SELECT pet_id, player_id, pet_type, level, accumulate_total_cost,
                           mana_expiry_ms, farm_started_at_ms, carried_balance, revision
                    FROM pets
                    WHERE player_id = ? AND pet_id = ?
                    "#,
                )
                .bind(player_id.as_str())
                .bind(pet_id.as_str())
                .fetch_all(&mut *conn)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT pet_id, player_id, pet_type, level, accumulate_total_cost,
                           mana_expiry_ms, farm_started_at_ms, carried_balance, revision
                    FROM pets
                    WHERE player_id = ?
                    ORDER BY created_ms ASC, pet_id ASC
                    "#,
                )
                .bind(player_id.as_str())
                .fetch_all(&mut *conn)
                .await?
            }
        };

        rows.iter().map(pet_from_row).collect()
    }

    /// List a player's pets outside any transaction.
    pub async fn list_pets(&self, player_id: &PlayerId) -> Result<Vec<Pet>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        Self::load_pets(&mut *conn, player_id, None).await
    }

    // =========================================================================
    // Game config operations
    // =========================================================================

    /// Load every config document keyed by `config_type`.
    pub async fn load_config_documents(
        &self,
    ) -> Result<BTreeMap<String, serde_json::Value>, sqlx::Error> {
        let rows = sqlx::query("SELECT config_type, body FROM game_config")
            .fetch_all(&self.pool)
            .await?;

        let mut documents = BTreeMap::new();
        for row in rows {
            let config_type: String = row.get("config_type");
            let body: String = row.get("body");
            match serde_json::from_str(&body) {
                Ok(value) => {
                    documents.insert(config_type, value);
                }
                Err(e) => {
                    return Err(sqlx::Error::ColumnDecode {
                        index: format!("game_config.{}", config_type),
                        source: Box::new(e),
                    })
                }
            }
        }

        Ok(documents)
    }

    /// Insert or replace a config document.
    pub async fn upsert_config_document(
        &self,
        config_type: &str,
        body: &serde_json::Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO game_config (config_type, body, updated_ms)
            VALUES (?, ?, ?)
            ON CONFLICT(config_type) DO UPDATE SET
                body = excluded.body,
                updated_ms = excluded.updated_ms
            "#,
        )
        .bind(config_type)
        .bind(body.to_string())
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
