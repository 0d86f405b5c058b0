//! Farming actions: claim, farm start, feed and upgrade.

use crate::api::{ActionResponse, AppState, Caller};
use crate::domain::PetId;
use crate::economy::Action;
use crate::error::AppError;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct PetRequest {
    pub pet_id: String,
}

#[derive(Debug, Deserialize)]
pub struct FeedRequest {
    pub pet_id: String,
    pub item_name: String,
}

async fn run(state: &AppState, caller: Caller, action: Action) -> Result<Json<ActionResponse>, AppError> {
    let receipt = state.engine.execute(&caller.0, &action).await?;
    Ok(Json(receipt.into()))
}

pub async fn claim(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<ActionResponse>, AppError> {
    run(&state, caller, Action::Claim).await
}

pub async fn farm(
    State(state): State<AppState>,
    caller: Caller,
    Json(body): Json<PetRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let action = Action::FarmStart {
        pet_id: PetId::new(body.pet_id),
    };
    run(&state, caller, action).await
}

pub async fn feed(
    State(state): State<AppState>,
    caller: Caller,
    Json(body): Json<FeedRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let action = Action::Feed {
        pet_id: PetId::new(body.pet_id),
        item: body.item_name,
    };
    run(&state, caller, action).await
}

pub async fn upgrade(
    State(state): State<AppState>,
    caller: Caller,
    Json(body): Json<PetRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let action = Action::Upgrade {
        pet_id: PetId::new(body.pet_id),
    };
    run(&state, caller, action).await
}
