//! Economy transaction engine.
//!
//! Every action runs the same state machine:
//! 1. Input check against the current game config
//! 2. Per-player guard (rejected as `Contended` when held)
//! 3. Begin an immediate write scope, snapshot, validate and compute deltas
//! 4. Conditional write of every delta, then the audit record
//! 5. Commit; any mismatch aborts with `WriteConflict`
//!
//! Nothing is retried here. A conflicting attempt is reported to the caller,
//! who resubmits the whole action against fresh state.

pub mod action;
pub mod error;
pub mod plan;
pub mod snapshot;

pub use action::{Action, Purchase, CLAIM_TOTAL, MAX_FOOD_AMOUNT};
pub use error::{EconomyError, Reason};
pub use plan::{ActionReceipt, PetWrite, PlayerWrite, WritePlan};
pub use snapshot::{PetScope, Snapshot};

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::catalog::{CatalogSnapshot, ConfigCache};
use crate::db::{ApplyError, Repository};
use crate::domain::{AuditRecord, Outcome, PlayerId, TimeMs};
use crate::guard::{ActionGuard, GuardKey};

/// Tunables that are not part of the game config documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EconomyRules {
    pub claim_cooldown: Duration,
    pub guard_ttl: Duration,
}

impl Default for EconomyRules {
    fn default() -> Self {
        Self {
            claim_cooldown: Duration::from_secs(600),
            guard_ttl: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EconomyEngine {
    repo: Arc<Repository>,
    guard: Arc<dyn ActionGuard>,
    config: Arc<ConfigCache>,
    rules: EconomyRules,
}

impl EconomyEngine {
    pub fn new(
        repo: Arc<Repository>,
        guard: Arc<dyn ActionGuard>,
        config: Arc<ConfigCache>,
        rules: EconomyRules,
    ) -> Self {
        Self {
            repo,
            guard,
            config,
            rules,
        }
    }

    pub fn rules(&self) -> &EconomyRules {
        &self.rules
    }

    pub async fn execute(
        &self,
        player_id: &PlayerId,
        action: &Action,
    ) -> Result<ActionReceipt, EconomyError> {
        self.execute_at(player_id, action, TimeMs::now()).await
    }

    /// Run one action as of `now`.
    ///
    /// Every attempt leaves one audit record, including those rejected
    /// before a snapshot was read.
    pub async fn execute_at(
        &self,
        player_id: &PlayerId,
        action: &Action,
        now: TimeMs,
    ) -> Result<ActionReceipt, EconomyError> {
        let catalog = self.config.snapshot();
        if let Err(e) = action.check_input(&catalog) {
            self.record_abort(player_id, action, Value::Null, &e, now).await;
            return Err(e);
        }

        let key = GuardKey::economy(player_id.clone());
        if !self.guard.try_acquire(&key, self.rules.guard_ttl).await? {
            debug!(player = %player_id, action = %action.kind(), "Guard held, rejecting action");
            let e = EconomyError::Contended;
            self.record_abort(player_id, action, Value::Null, &e, now).await;
            return Err(e);
        }

        let result = self.run(player_id, action, &catalog, now).await;

        if let Err(e) = self.guard.release(&key).await {
            warn!(player = %player_id, error = %e, "Failed to release action guard");
        }

        result
    }

    async fn run(
        &self,
        player_id: &PlayerId,
        action: &Action,
        catalog: &CatalogSnapshot,
        now: TimeMs,
    ) -> Result<ActionReceipt, EconomyError> {
        let mut scope = self.repo.begin().await?;

        let loaded = Snapshot::load(scope.conn()?, player_id, action.pet_scope()).await;
        let snapshot = match loaded {
            Ok(snapshot) => snapshot,
            Err(e) => {
                scope.rollback().await?;
                self.record_abort(player_id, action, Value::Null, &e, now).await;
                return Err(e);
            }
        };
        let pre_state = serde_json::to_value(&snapshot).unwrap_or(Value::Null);

        let plan = match action.plan(&snapshot, catalog, &self.rules, now) {
            Ok(plan) => plan,
            Err(e) => {
                scope.rollback().await?;
                debug!(player = %player_id, action = %action.kind(), reason = e.code(), "Action rejected");
                self.record_abort(player_id, action, pre_state, &e, now).await;
                return Err(e);
            }
        };

        let applied = Repository::apply_plan(scope.conn()?, &plan).await;
        if let Err(e) = applied {
            let e = match e {
                ApplyError::Conflict { target } => {
                    warn!(player = %player_id, action = %action.kind(), conflict = %target, "Conditional write lost a race");
                    EconomyError::WriteConflict
                }
                ApplyError::Db(e) => EconomyError::from(e),
            };
            if let Err(rollback) = scope.rollback().await {
                warn!(error = %rollback, "Rollback after failed write also failed");
            }
            if matches!(e, EconomyError::Internal(_)) {
                error!(player = %player_id, action = %action.kind(), error = %e, "Economy write failed");
            }
            self.record_abort(player_id, action, pre_state, &e, now).await;
            return Err(e);
        }

        let record = AuditRecord {
            kind: plan.kind,
            player_id: player_id.clone(),
            pet_id: plan.pet_id().or(action.pet_id()).cloned(),
            pre_state,
            deltas: plan.deltas_json(),
            outcome: Outcome::Applied,
            reason: None,
            created_at: now,
        };
        Repository::insert_audit(scope.conn()?, &record).await?;

        scope.commit().await?;

        info!(
            player = %player_id,
            action = %plan.kind,
            points = %plan.receipt.points,
            boost = %plan.receipt.boost_points,
            pets = plan.pets.len(),
            noop = plan.is_noop(),
            "Economy action committed"
        );

        Ok(plan.receipt)
    }

    /// Best-effort audit of an attempt that changed nothing.
    async fn record_abort(
        &self,
        player_id: &PlayerId,
        action: &Action,
        pre_state: Value,
        err: &EconomyError,
        now: TimeMs,
    ) {
        let record = AuditRecord {
            kind: action.kind(),
            player_id: player_id.clone(),
            pet_id: action.pet_id().cloned(),
            pre_state,
            deltas: serde_json::to_value(action).unwrap_or(Value::Null),
            outcome: Outcome::Aborted,
            reason: Some(err.code().to_string()),
            created_at: now,
        };
        if let Err(e) = self.repo.append_audit(&record).await {
            warn!(player = %player_id, error = %e, "Failed to write aborted audit record");
        }
    }
}
