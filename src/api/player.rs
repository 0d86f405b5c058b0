//! Player read model with a live preview of unclaimed accrual.

use crate::api::{amounts, token_balances, AppState, Caller, PetDto};
use crate::domain::{Decimal, TimeMs, BALANCE_DP};
use crate::economy::EconomyError;
use crate::engine::FarmCalculator;
use crate::error::AppError;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
pub struct BoostDto {
    pub percent: String,
    pub start_ms: i64,
    pub end_ms: i64,
}

#[derive(Debug, Serialize)]
pub struct PetView {
    #[serde(flatten)]
    pub pet: PetDto,
    pub farm_speed: String,
    /// Unclaimed points including carried balance and boosts.
    pub pending_points: String,
}

#[derive(Debug, Serialize)]
pub struct SelfResponse {
    pub player_id: String,
    pub balances: BTreeMap<String, String>,
    pub totals: BTreeMap<String, String>,
    pub inventory: BTreeMap<String, u32>,
    pub boosts: Vec<BoostDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_claimed_at_ms: Option<i64>,
    pub pets: Vec<PetView>,
    /// What a claim would credit right now, before cooldown checks.
    pub claimable: String,
    pub as_of_ms: i64,
}

pub async fn get_self(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<SelfResponse>, AppError> {
    let player = state
        .repo
        .get_player(&caller.0)
        .await?
        .ok_or_else(|| EconomyError::NotFound(format!("player {}", caller.0)))?;
    let pets = state.repo.list_pets(&caller.0).await?;

    let now = TimeMs::now();
    let rate = state.config_cache.snapshot().farm_rate()?;
    let calc = FarmCalculator::new(rate);

    let mut claimable = Decimal::zero();
    let views: Vec<PetView> = pets
        .iter()
        .map(|pet| {
            let pending = calc.settle(pet, &player.boosts, now).total();
            claimable += pending;
            PetView {
                pet: PetDto::from(pet),
                farm_speed: pet.farm_speed(&rate).to_canonical_string(),
                pending_points: pending.to_canonical_string(),
            }
        })
        .collect();

    Ok(Json(SelfResponse {
        player_id: player.id.to_string(),
        balances: token_balances(&player.balances),
        totals: amounts(&player.totals),
        inventory: player.inventory.clone(),
        boosts: player
            .boosts
            .iter()
            .map(|b| BoostDto {
                percent: b.percent.to_canonical_string(),
                start_ms: b.start_at.as_ms(),
                end_ms: b.end_at.as_ms(),
            })
            .collect(),
        last_claimed_at_ms: player.last_claimed_at.map(|t| t.as_ms()),
        pets: views,
        claimable: claimable.floor_dp(BALANCE_DP).to_canonical_string(),
        as_of_ms: now.as_ms(),
    }))
}
