use axum::{extract::State, Json};
use std::sync::Arc;

use super::error::ApiError;
use super::validation::validate_vehicle_number;
use crate::accounts::normalize_vehicle_number;
use crate::db::{Account, AccountResponse, SetVehicleRequest};
use crate::AppState;

/// GET /api/me
pub async fn me(account: Account) -> Json<AccountResponse> {
    Json(AccountResponse::from(account))
}

/// PUT /api/me/vehicle
///
/// The registration can be recorded once; later changes are refused.
pub async fn set_vehicle(
    State(state): State<Arc<AppState>>,
    account: Account,
    Json(request): Json<SetVehicleRequest>,
) -> Result<Json<AccountResponse>, ApiError> {
    let vehicle = normalize_vehicle_number(&request.vehicle_number);
    validate_vehicle_number(&vehicle).map_err(|e| ApiError::validation_field("vehicle_number", e))?;

    let account = state.accounts.set_vehicle_once(&account.id, &vehicle).await?;
    Ok(Json(AccountResponse::from(account)))
}
