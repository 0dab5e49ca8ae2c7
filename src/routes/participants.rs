use axum::{
    extract::{Path, State},
    response::Response,
    routing::get,
    Router,
};

use super::found;
use crate::{error::AppError, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new().route("/:participant_id/confirm", get(confirm_participant))
}

async fn confirm_participant(
    State(state): State<AppState>,
    Path(participant_id): Path<String>,
) -> Result<Response, AppError> {
    let target = state.trips.confirm_participant(&participant_id).await?;
    Ok(found(&target))
}
