pub mod participants;
pub mod trips;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/trips", trips::router())
        .nest("/participants", participants::router())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// `302 Found` pointing at `target`.
pub(crate) fn found(target: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, target.to_string())]).into_response()
}
