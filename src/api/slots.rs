use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::ApiError;
use super::validation::{parse_booking_window, parse_instant};
use crate::db::Account;
use crate::ledger::window::format_timestamp;
use crate::ledger::SlotId;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct SlotsResponse {
    pub slots: Vec<SlotId>,
}

#[derive(Debug, Deserialize)]
pub struct OccupancyQuery {
    pub at: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SlotState {
    pub slot: SlotId,
    pub occupied: bool,
}

#[derive(Debug, Serialize)]
pub struct OccupancyResponse {
    pub at: String,
    pub occupied_count: usize,
    pub total: usize,
    pub slots: Vec<SlotState>,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub date: String,
    pub entry: String,
    pub exit: String,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub start_at: String,
    pub end_at: String,
    pub available: Vec<SlotId>,
    pub blocked: Vec<SlotId>,
    /// Whether the caller already holds an overlapping booking
    pub has_conflict: bool,
}

/// GET /api/slots
pub async fn list_slots(State(state): State<Arc<AppState>>) -> Json<SlotsResponse> {
    Json(SlotsResponse {
        slots: state.ledger.catalogue().slots().to_vec(),
    })
}

/// GET /api/occupancy?at=
pub async fn occupancy(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OccupancyQuery>,
) -> Result<Json<OccupancyResponse>, ApiError> {
    let at = parse_instant(query.at.as_deref(), state.now())?;
    let occupied = state.ledger.occupancy(at).await?;

    let slots: Vec<SlotState> = state
        .ledger
        .catalogue()
        .slots()
        .iter()
        .map(|slot| SlotState {
            occupied: occupied.contains(slot),
            slot: slot.clone(),
        })
        .collect();

    Ok(Json(OccupancyResponse {
        at: format_timestamp(at),
        occupied_count: occupied.len(),
        total: slots.len(),
        slots,
    }))
}

/// GET /api/availability?date=&entry=&exit=
pub async fn availability(
    State(state): State<Arc<AppState>>,
    account: Account,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let window = parse_booking_window(
        &query.date,
        &query.entry,
        &query.exit,
        state.now().date(),
    )?;

    let available = state.ledger.available_slots(&window).await?;
    let blocked = state.ledger.blocked_slots(&window).await?;
    let has_conflict = state.ledger.has_conflict(&account, &window).await?;

    Ok(Json(AvailabilityResponse {
        start_at: window.start_text(),
        end_at: window.end_text(),
        available,
        blocked,
        has_conflict,
    }))
}
