//! Conditional economy writes and audit records for the repository.
//!
//! Every statement here re-asserts the pre-image it was planned against
//! (entity revision, exact balance, inventory on hand). A statement that
//! matches no row means a concurrent writer got there first; the caller must
//! abort the whole transaction.

use sqlx::sqlite::SqliteConnection;
use sqlx::Row;
use std::str::FromStr;
use thiserror::Error;

use super::Repository;
use crate::domain::{ActionKind, AuditRecord, Outcome, Pet, PetId, PlayerId, TimeMs};
use crate::economy::plan::{
    BalanceWrite, InventoryWrite, PetWrite, PlayerWrite, TotalWrite, WritePlan,
};

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("conditional write on {target} matched no row")]
    Conflict { target: String },
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

fn expect_one(rows: u64, target: impl FnOnce() -> String) -> Result<(), ApplyError> {
    if rows == 1 {
        Ok(())
    } else {
        Err(ApplyError::Conflict { target: target() })
    }
}

fn action_kind_from_str(s: &str) -> Option<ActionKind> {
    match s {
        "claim" => Some(ActionKind::Claim),
        "farm_start" => Some(ActionKind::FarmStart),
        "feed" => Some(ActionKind::Feed),
        "upgrade" => Some(ActionKind::Upgrade),
        "purchase" => Some(ActionKind::Purchase),
        _ => None,
    }
}

impl Repository {
    /// Apply every sub-write of a plan inside the caller's transaction.
    ///
    /// # Errors
    /// Returns `ApplyError::Conflict` as soon as one sub-write does not match.
    pub async fn apply_plan(
        conn: &mut SqliteConnection,
        plan: &WritePlan,
    ) -> Result<(), ApplyError> {
        if let Some(player) = &plan.player {
            Self::apply_player_write(&mut *conn, player).await?;
        }

        for pet in &plan.pets {
            match pet {
                PetWrite::Insert(pet) => Self::insert_pet(&mut *conn, pet).await?,
                PetWrite::Update {
                    expected_revision,
                    after,
                } => Self::update_pet(&mut *conn, *expected_revision, after).await?,
            }
        }

        Ok(())
    }

    async fn apply_player_write(
        conn: &mut SqliteConnection,
        write: &PlayerWrite,
    ) -> Result<(), ApplyError> {
        let player_id = write.player_id.as_str();

        let result = sqlx::query(
            r#"
            UPDATE players
            SET revision = revision + 1,
                last_claimed_ms = COALESCE(?, last_claimed_ms)
            WHERE player_id = ? AND revision = ?
            "#,
        )
        .bind(write.last_claimed_at.map(|t| t.as_ms()))
        .bind(player_id)
        .bind(write.expected_revision)
        .execute(&mut *conn)
        .await?;
        expect_one(result.rows_affected(), || format!("player {}", player_id))?;

        for balance in &write.balances {
            Self::write_balance(&mut *conn, &write.player_id, balance).await?;
        }
        for total in &write.totals {
            Self::write_total(&mut *conn, &write.player_id, total).await?;
        }
        for change in &write.inventory {
            Self::write_inventory(&mut *conn, &write.player_id, change).await?;
        }

        Ok(())
    }

    async fn write_balance(
        conn: &mut SqliteConnection,
        player_id: &PlayerId,
        write: &BalanceWrite,
    ) -> Result<(), ApplyError> {
        let target = || format!("balance {}/{}", player_id, write.token);
        let after = write.after();
        if after.is_negative() {
            return Err(ApplyError::Conflict { target: target() });
        }

        let result = if write.expected.is_zero() {
            // Row may not exist yet; an existing row must still read zero.
            sqlx::query(
                r#"
                INSERT INTO player_balances (player_id, token, amount)
                VALUES (?, ?, ?)
                ON CONFLICT(player_id, token) DO UPDATE SET amount = excluded.amount
                WHERE player_balances.amount = ?
                "#,
            )
            .bind(player_id.as_str())
            .bind(write.token.as_str())
            .bind(after.to_canonical_string())
            .bind(write.expected.to_canonical_string())
            .execute(&mut *conn)
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE player_balances SET amount = ?
                WHERE player_id = ? AND token = ? AND amount = ?
                "#,
            )
            .bind(after.to_canonical_string())
            .bind(player_id.as_str())
            .bind(write.token.as_str())
            .bind(write.expected.to_canonical_string())
            .execute(&mut *conn)
            .await?
        };

        expect_one(result.rows_affected(), target)
    }

    async fn write_total(
        conn: &mut SqliteConnection,
        player_id: &PlayerId,
        write: &TotalWrite,
    ) -> Result<(), ApplyError> {
        sqlx::query(
            r#"
            INSERT INTO player_totals (player_id, metric, amount)
            VALUES (?, ?, ?)
            ON CONFLICT(player_id, metric) DO UPDATE SET amount = excluded.amount
            "#,
        )
        .bind(player_id.as_str())
        .bind(write.metric.as_str())
        .bind(write.after().to_canonical_string())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    async fn write_inventory(
        conn: &mut SqliteConnection,
        player_id: &PlayerId,
        write: &InventoryWrite,
    ) -> Result<(), ApplyError> {
        let result = if write.delta >= 0 {
            sqlx::query(
                r#"
                INSERT INTO player_inventory (player_id, item, quantity)
                VALUES (?, ?, ?)
                ON CONFLICT(player_id, item) DO UPDATE SET quantity = quantity + excluded.quantity
                "#,
            )
            .bind(player_id.as_str())
            .bind(write.item.as_str())
            .bind(write.delta)
            .execute(&mut *conn)
            .await?
        } else {
            let units = -write.delta;
            sqlx::query(
                r#"
                UPDATE player_inventory SET quantity = quantity - ?
                WHERE player_id = ? AND item = ? AND quantity >= ?
                "#,
            )
            .bind(units)
            .bind(player_id.as_str())
            .bind(write.item.as_str())
            .bind(units)
            .execute(&mut *conn)
            .await?
        };

        expect_one(result.rows_affected(), || {
            format!("inventory {}/{}", player_id, write.item)
        })
    }

    async fn insert_pet(conn: &mut SqliteConnection, pet: &Pet) -> Result<(), ApplyError> {
        let result = sqlx::query(
            r#"
            INSERT INTO pets (
                pet_id, player_id, pet_type, level, accumulate_total_cost,
                mana_expiry_ms, farm_started_at_ms, carried_balance, revision, created_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
            ON CONFLICT(pet_id) DO NOTHING
            "#,
        )
        .bind(pet.id.as_str())
        .bind(pet.owner.as_str())
        .bind(pet.pet_type.as_str())
        .bind(i64::from(pet.level))
        .bind(pet.accumulate_total_cost.to_canonical_string())
        .bind(pet.mana_expiry.as_ms())
        .bind(pet.farm_started_at.map(|t| t.as_ms()))
        .bind(pet.carried_balance.to_canonical_string())
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&mut *conn)
        .await?;

        expect_one(result.rows_affected(), || format!("new pet {}", pet.id))
    }

    async fn update_pet(
        conn: &mut SqliteConnection,
        expected_revision: i64,
        after: &Pet,
    ) -> Result<(), ApplyError> {
        let result = sqlx::query(
            r#"
            UPDATE pets
            SET level = ?,
                accumulate_total_cost = ?,
                mana_expiry_ms = ?,
                farm_started_at_ms = ?,
                carried_balance = ?,
                revision = revision + 1
            WHERE pet_id = ? AND player_id = ? AND revision = ?
            "#,
        )
        .bind(i64::from(after.level))
        .bind(after.accumulate_total_cost.to_canonical_string())
        .bind(after.mana_expiry.as_ms())
        .bind(after.farm_started_at.map(|t| t.as_ms()))
        .bind(after.carried_balance.to_canonical_string())
        .bind(after.id.as_str())
        .bind(after.owner.as_str())
        .bind(expected_revision)
        .execute(&mut *conn)
        .await?;

        expect_one(result.rows_affected(), || format!("pet {}", after.id))
    }

    // =========================================================================
    // Audit operations
    // =========================================================================

    /// Append an audit record. Records are never updated or deleted.
    pub async fn insert_audit(
        conn: &mut SqliteConnection,
        record: &AuditRecord,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (
                action, player_id, pet_id, pre_state, deltas, outcome, reason, created_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.kind.as_str())
        .bind(record.player_id.as_str())
        .bind(record.pet_id.as_ref().map(|p| p.as_str()))
        .bind(record.pre_state.to_string())
        .bind(record.deltas.to_string())
        .bind(record.outcome.as_str())
        .bind(record.reason.as_deref())
        .bind(record.created_at.as_ms())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Append an audit record in its own implicit transaction.
    pub async fn append_audit(&self, record: &AuditRecord) -> Result<(), sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        Self::insert_audit(&mut *conn, record).await
    }

    /// Audit records for a player, oldest first. Used for reconciliation only.
    pub async fn list_audit(&self, player_id: &PlayerId) -> Result<Vec<AuditRecord>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT action, player_id, pet_id, pre_state, deltas, outcome, reason, created_ms
            FROM audit_log
            WHERE player_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(player_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let action: String = row.get("action");
            let Some(kind) = action_kind_from_str(&action) else {
                tracing::warn!(action = %action, "Skipping audit row with unknown action");
                continue;
            };
            let outcome: String = row.get("outcome");
            let pre_state: String = row.get("pre_state");
            let deltas: String = row.get("deltas");

            records.push(AuditRecord {
                kind,
                player_id: PlayerId::new(row.get::<String, _>("player_id")),
                pet_id: row.get::<Option<String>, _>("pet_id").map(PetId::new),
                pre_state: serde_json::Value::from_str(&pre_state)
                    .unwrap_or(serde_json::Value::Null),
                deltas: serde_json::Value::from_str(&deltas).unwrap_or(serde_json::Value::Null),
                outcome: if outcome == Outcome::Applied.as_str() {
                    Outcome::Applied
                } else {
                    Outcome::Aborted
                },
                reason: row.get("reason"),
                created_at: TimeMs::new(row.get("created_ms")),
            });
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::init_db;
    use crate::domain::{Decimal, Token};
    use crate::economy::plan::ActionReceipt;
    use std::collections::BTreeMap;
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

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn plan_with(player: PlayerWrite) -> WritePlan {
        WritePlan {
            kind: ActionKind::Purchase,
            player: Some(player),
            pets: Vec::new(),
            receipt: ActionReceipt {
                action: ActionKind::Purchase,
                points: Decimal::zero(),
                boost_points: Decimal::zero(),
                costs: BTreeMap::new(),
                balances: BTreeMap::new(),
                pet: None,
                at: TimeMs::new(0),
            },
        }
    }

    fn debit(player_id: &PlayerId, revision: i64, expected: &str, delta: &str) -> WritePlan {
        let mut write = PlayerWrite::new(player_id.clone(), revision);
        write.balances.push(BalanceWrite {
            token: Token::Tgp,
            expected: d(expected),
            delta: d(delta),
        });
        plan_with(write)
    }

    #[tokio::test]
    async fn test_apply_debit_and_bump_revision() {
        let (repo, _temp) = setup_repo().await;
        let id = PlayerId::new("p1");
        repo.create_player(&id, &[(Token::Tgp, d("100"))]).await.unwrap();

        let mut tx = repo.begin().await.unwrap();
        Repository::apply_plan(tx.conn().unwrap(), &debit(&id, 0, "100", "-40"))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let player = repo.get_player(&id).await.unwrap().unwrap();
        assert_eq!(player.balance(Token::Tgp), d("60"));
        assert_eq!(player.revision, 1);
    }

    #[tokio::test]
    async fn test_stale_revision_conflicts() {
        let (repo, _temp) = setup_repo().await;
        let id = PlayerId::new("p1");
        repo.create_player(&id, &[(Token::Tgp, d("100"))]).await.unwrap();

        let mut tx = repo.begin().await.unwrap();
        Repository::apply_plan(tx.conn().unwrap(), &debit(&id, 0, "100", "-40"))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = repo.begin().await.unwrap();
        let err = Repository::apply_plan(tx.conn().unwrap(), &debit(&id, 0, "100", "-40"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApplyError::Conflict { .. }));
        tx.rollback().await.unwrap();

        let player = repo.get_player(&id).await.unwrap().unwrap();
        assert_eq!(player.balance(Token::Tgp), d("60"));
    }

    #[tokio::test]
    async fn test_balance_preimage_mismatch_conflicts() {
        let (repo, _temp) = setup_repo().await;
        let id = PlayerId::new("p1");
        repo.create_player(&id, &[(Token::Tgp, d("100"))]).await.unwrap();

        let mut tx = repo.begin().await.unwrap();
        let err = Repository::apply_plan(tx.conn().unwrap(), &debit(&id, 0, "90", "-40"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApplyError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_negative_result_refused() {
        let (repo, _temp) = setup_repo().await;
        let id = PlayerId::new("p1");
        repo.create_player(&id, &[(Token::Tgp, d("10"))]).await.unwrap();

        let mut tx = repo.begin().await.unwrap();
        let err = Repository::apply_plan(tx.conn().unwrap(), &debit(&id, 0, "10", "-10.01"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApplyError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_credit_creates_missing_balance_row() {
        let (repo, _temp) = setup_repo().await;
        let id = PlayerId::new("p1");
        repo.create_player(&id, &[]).await.unwrap();

        let mut tx = repo.begin().await.unwrap();
        Repository::apply_plan(tx.conn().unwrap(), &debit(&id, 0, "0", "12.34"))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let player = repo.get_player(&id).await.unwrap().unwrap();
        assert_eq!(player.balance(Token::Tgp), d("12.34"));
    }

    #[tokio::test]
    async fn test_inventory_debit_requires_stock() {
        let (repo, _temp) = setup_repo().await;
        let id = PlayerId::new("p1");
        repo.create_player(&id, &[]).await.unwrap();

        let mut write = PlayerWrite::new(id.clone(), 0);
        write.inventory.push(InventoryWrite {
            item: "apple".to_string(),
            delta: 2,
        });
        write.totals.push(TotalWrite {
            metric: "spent".to_string(),
            before: Decimal::zero(),
            delta: d("5"),
        });
        let mut tx = repo.begin().await.unwrap();
        Repository::apply_plan(tx.conn().unwrap(), &plan_with(write)).await.unwrap();
        tx.commit().await.unwrap();

        let mut write = PlayerWrite::new(id.clone(), 1);
        write.inventory.push(InventoryWrite {
            item: "apple".to_string(),
            delta: -3,
        });
        let mut tx = repo.begin().await.unwrap();
        let err = Repository::apply_plan(tx.conn().unwrap(), &plan_with(write))
            .await
            .unwrap_err();
        assert!(matches!(err, ApplyError::Conflict { .. }));
        tx.rollback().await.unwrap();

        let player = repo.get_player(&id).await.unwrap().unwrap();
        assert_eq!(player.item_count("apple"), 2);
        assert_eq!(player.total("spent"), d("5"));
    }

    #[tokio::test]
    async fn test_audit_roundtrip_in_order() {
        let (repo, _temp) = setup_repo().await;
        let id = PlayerId::new("p1");

        for (kind, outcome) in [
            (ActionKind::Claim, Outcome::Applied),
            (ActionKind::Feed, Outcome::Aborted),
        ] {
            repo.append_audit(&AuditRecord {
                kind,
                player_id: id.clone(),
                pet_id: None,
                pre_state: serde_json::json!({ "revision": 0 }),
                deltas: serde_json::Value::Null,
                outcome,
                reason: (outcome == Outcome::Aborted).then(|| "NOT_ENOUGH_FOOD".to_string()),
                created_at: TimeMs::new(42),
            })
            .await
            .unwrap();
        }

        let records = repo.list_audit(&id).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, ActionKind::Claim);
        assert_eq!(records[0].pre_state["revision"], 0);
        assert_eq!(records[1].outcome, Outcome::Aborted);
        assert_eq!(records[1].reason.as_deref(), Some("NOT_ENOUGH_FOOD"));
    }
}
