pub mod game;
pub mod health;
pub mod player;
pub mod store;

use crate::catalog::ConfigCache;
use crate::db::Repository;
use crate::domain::{Decimal, Pet, PlayerId, Token};
use crate::economy::{ActionReceipt, EconomyEngine};
use crate::error::AppError;
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::{
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Header carrying the authenticated player identity, set by the auth proxy.
pub const PLAYER_HEADER: &str = "x-player-id";

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub engine: Arc<EconomyEngine>,
    pub config_cache: Arc<ConfigCache>,
}

impl AppState {
    pub fn new(
        repo: Arc<Repository>,
        engine: Arc<EconomyEngine>,
        config_cache: Arc<ConfigCache>,
    ) -> Self {
        Self {
            repo,
            engine,
            config_cache,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/self", get(player::get_self))
        .route("/v1/game/claim", post(game::claim))
        .route("/v1/game/farm", post(game::farm))
        .route("/v1/game/feed", post(game::feed))
        .route("/v1/game/upgrade", post(game::upgrade))
        .route("/v1/store/pet", post(store::buy_pet))
        .route("/v1/store/food", post(store::buy_food))
        .layer(cors)
        .with_state(state)
}

/// Player identity taken from [`PLAYER_HEADER`].
///
/// A player seen for the first time is registered with empty balances.
#[derive(Debug, Clone)]
pub struct Caller(pub PlayerId);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(PLAYER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::Unauthorized(format!("missing {} header", PLAYER_HEADER)))?;
        let player_id = PlayerId::new(raw);
        state.repo.ensure_player(&player_id).await?;
        Ok(Caller(player_id))
    }
}

// =============================================================================
// Shared response shapes
// =============================================================================

pub(crate) fn amounts<K: ToString>(map: &BTreeMap<K, Decimal>) -> BTreeMap<String, String> {
    map.iter()
        .map(|(k, v)| (k.to_string(), v.to_canonical_string()))
        .collect()
}

pub(crate) fn token_balances(balances: &BTreeMap<Token, Decimal>) -> BTreeMap<String, String> {
    Token::PAYMENT_ORDER
        .iter()
        .map(|t| {
            (
                t.to_string(),
                balances.get(t).copied().unwrap_or_default().to_canonical_string(),
            )
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct PetDto {
    pub pet_id: String,
    pub pet_type: String,
    pub level: u32,
    pub accumulate_total_cost: String,
    pub mana_expiry_ms: i64,
    pub mana_expiry: String,
    pub farming: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub farm_started_at_ms: Option<i64>,
    pub carried_balance: String,
}

impl From<&Pet> for PetDto {
    fn from(pet: &Pet) -> Self {
        Self {
            pet_id: pet.id.to_string(),
            pet_type: pet.pet_type.clone(),
            level: pet.level,
            accumulate_total_cost: pet.accumulate_total_cost.to_canonical_string(),
            mana_expiry_ms: pet.mana_expiry.as_ms(),
            mana_expiry: pet.mana_expiry.to_rfc3339(),
            farming: pet.is_farming(),
            farm_started_at_ms: pet.farm_started_at.map(|t| t.as_ms()),
            carried_balance: pet.carried_balance.to_canonical_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub action: String,
    pub points: String,
    pub boost_points: String,
    pub costs: BTreeMap<String, String>,
    pub balances: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pet: Option<PetDto>,
    pub at_ms: i64,
}

impl From<ActionReceipt> for ActionResponse {
    fn from(receipt: ActionReceipt) -> Self {
        Self {
            action: receipt.action.to_string(),
            points: receipt.points.to_canonical_string(),
            boost_points: receipt.boost_points.to_canonical_string(),
            costs: amounts(&receipt.costs),
            balances: token_balances(&receipt.balances),
            pet: receipt.pet.as_ref().map(PetDto::from),
            at_ms: receipt.at.as_ms(),
        }
    }
}
