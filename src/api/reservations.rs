use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::error::ApiError;
use super::metrics::{booking_outcome, record_booking, record_cancellation};
use super::validation::parse_booking_window;
use crate::db::{Account, CreateReservationRequest, ReservationResponse};
use crate::AppState;

/// POST /api/reservations
pub async fn create_reservation(
    State(state): State<Arc<AppState>>,
    account: Account,
    Json(request): Json<CreateReservationRequest>,
) -> Result<(StatusCode, Json<ReservationResponse>), ApiError> {
    let now = state.now();
    let window = parse_booking_window(&request.date, &request.entry, &request.exit, now.date())?;

    let result = state.ledger.reserve(&account, &request.slot, &window).await;
    record_booking(booking_outcome(result.as_ref().err()));
    if let Err(e) = &result {
        if e.is_conflict() {
            tracing::info!(account = %account.id, slot = %request.slot, window = %window, "Booking refused: {}", e);
        }
    }

    let reservation = result?;
    Ok((StatusCode::CREATED, Json(reservation.to_response(now))))
}

/// GET /api/reservations
pub async fn list_reservations(
    State(state): State<Arc<AppState>>,
    account: Account,
) -> Result<Json<Vec<ReservationResponse>>, ApiError> {
    let now = state.now();
    let reservations = state.ledger.list_for_account(&account).await?;
    Ok(Json(
        reservations.iter().map(|r| r.to_response(now)).collect(),
    ))
}

/// GET /api/reservations/:id
pub async fn get_reservation(
    State(state): State<Arc<AppState>>,
    account: Account,
    Path(id): Path<String>,
) -> Result<Json<ReservationResponse>, ApiError> {
    let reservation = state.ledger.get(&id).await?;
    if reservation.account_id != account.id {
        return Err(ApiError::forbidden("Reservation belongs to another account"));
    }
    Ok(Json(reservation.to_response(state.now())))
}

/// DELETE /api/reservations/:id
pub async fn cancel_reservation(
    State(state): State<Arc<AppState>>,
    account: Account,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.ledger.cancel(&account, &id).await?;
    record_cancellation();
    Ok(StatusCode::NO_CONTENT)
}
