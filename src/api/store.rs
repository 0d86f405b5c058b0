use crate::api::{ActionResponse, AppState, Caller};
use crate::economy::{Action, Purchase};
use crate::error::AppError;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct BuyPetRequest {
    pub pet_name: String,
    pub pet_level: u32,
}

#[derive(Debug, Deserialize)]
pub struct BuyFoodRequest {
    pub food_name: String,
    pub food_amount: u32,
}

pub async fn buy_pet(
    State(state): State<AppState>,
    caller: Caller,
    Json(body): Json<BuyPetRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let action = Action::Purchase(Purchase::Pet {
        pet_type: body.pet_name,
        level: body.pet_level,
    });
    let receipt = state.engine.execute(&caller.0, &action).await?;
    Ok(Json(receipt.into()))
}

pub async fn buy_food(
    State(state): State<AppState>,
    caller: Caller,
    Json(body): Json<BuyFoodRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let action = Action::Purchase(Purchase::Food {
        item: body.food_name,
        amount: body.food_amount,
    });
    let receipt = state.engine.execute(&caller.0, &action).await?;
    Ok(Json(receipt.into()))
}
