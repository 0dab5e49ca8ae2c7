use axum::{
    extract::{Path, State},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::found;
use crate::{error::AppError, models::trip::NewTrip, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_trip))
        .route("/:trip_id", get(trip_detail))
        .route("/:trip_id/confirm", get(confirm_trip))
        .route("/:trip_id/invites", post(create_invite))
        .route("/:trip_id/participants", get(participants_list))
}

async fn create_trip(
    State(state): State<AppState>,
    Json(body): Json<NewTrip>,
) -> Result<Json<Value>, AppError> {
    let trip_id = state.trips.create_trip(body).await?;
    Ok(Json(json!({ "tripId": trip_id })))
}

async fn trip_detail(
    State(state): State<AppState>,
    Path(trip_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let trip = state.trips.get_trip(&trip_id).await?;
    Ok(Json(json!({ "trip": trip })))
}

async fn confirm_trip(
    State(state): State<AppState>,
    Path(trip_id): Path<String>,
) -> Result<Response, AppError> {
    let confirmation = state.trips.confirm_trip(&trip_id).await?;
    Ok(found(&confirmation.redirect_to))
}

#[derive(Deserialize)]
struct InviteBody {
    email: String,
}

async fn create_invite(
    State(state): State<AppState>,
    Path(trip_id): Path<String>,
    Json(body): Json<InviteBody>,
) -> Result<Json<Value>, AppError> {
    let participant_id = state.trips.create_invite(&trip_id, &body.email).await?;
    Ok(Json(json!({ "participantId": participant_id })))
}

async fn participants_list(
    State(state): State<AppState>,
    Path(trip_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let participants = state.trips.participants(&trip_id).await?;
    Ok(Json(json!({ "participants": participants })))
}
